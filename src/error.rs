use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// Occurs when the external resolver fails outright. The document instance is left
    /// untouched, as resolved values are only applied after the batched call returns.
    Resolution(Box<dyn std::error::Error + Send + Sync>),
    /// Occurs when a resolver's response doesn't line up with the request list: either the
    /// response list has a different length than the request list, or a per-request value
    /// list has a different length than the identifiers that were sent.
    ResponseLength {
        step: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl Error {
    /// Wrap an arbitrary resolver failure.
    pub fn resolution(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Resolution(err.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Resolution(ref err) => write!(f, "Resolution failed: {}", err),
            Error::ResponseLength {
                step,
                expected,
                actual,
            } => write!(
                f,
                "Expected {} resolved entries, but got {} on step [{}]",
                expected, actual, step
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Resolution(ref err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
