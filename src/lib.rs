//! doc-refresh keeps the reference fields of schema-driven documents fresh. A schema
//! describes a tree of named fields, some of which hold identifiers pointing at
//! documents in other collections; fields marked with a refresh directive are resolved
//! into their target documents on demand, in one batched call against the storage
//! layer.
//!
//! The work splits into two pieces:
//!
//! - The **path analyzer** walks the schema tree once, when the schema is built, and
//!   produces an immutable [`RefreshPlan`]: an ordered mapping from dotted field path
//!   (`"family.members.person"`) to a [`Directive`] carrying the target collection and
//!   the merged [`RefreshOptions`]. Nesting through sub-documents and arrays of
//!   sub-documents accumulates into the dotted path to arbitrary depth.
//! - The **refresh executor** applies a plan to one document instance: it copies the
//!   plan into a request list, extracts each path's current identifiers, makes a single
//!   batched call through a [`Resolver`], and merges the fetched documents back in
//!   place. Arrays keep their order and length; a missing target leaves its slot as the
//!   original identifier; a resolver error surfaces verbatim with the document
//!   untouched.
//!
//! The storage layer itself is a collaborator, not part of this crate: anything
//! implementing [`Resolver`] (or [`AsyncResolver`], for future-based storage driven
//! through [`Refreshing`]) will do. [`MemoryStore`] is a ready-made in-memory
//! implementation for tests and examples.
//!
//! The owning document system is expected to expose [`Schema::autorefresh`] as an
//! instance operation and to invoke it from its pre-validation hook, so that every
//! marked reference is populated by the time validation rules run. The hook wiring
//! stays outside this crate; it amounts to running the refresh in front of the
//! system's own rules:
//!
//! ```
//! use doc_refresh::{Resolver, Result, Schema, Value};
//!
//! struct Model<R> {
//!     schema: Schema,
//!     resolver: R,
//! }
//!
//! impl<R: Resolver> Model<R> {
//!     /// Pre-validate hook: refresh marked references, then run validation rules.
//!     fn validate(&self, doc: &mut Value) -> Result<()> {
//!         self.schema.autorefresh(doc, &self.resolver)?;
//!         self.check_rules(doc)
//!     }
//! #   fn check_rules(&self, _doc: &Value) -> Result<()> { Ok(()) }
//! }
//! ```
//!
//! ```
//! use doc_refresh::{Field, MemoryStore, RefreshOptions, Schema, Value};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let person = Schema::builder()
//!     .field("name", Field::new())
//!     .field("father", Field::reference("Person").refresh())
//!     .field(
//!         "relatives",
//!         Field::reference("Person")
//!             .array()
//!             .refresh_with(RefreshOptions::new().project("name")),
//!     )
//!     .build();
//!
//! let mut store = MemoryStore::new();
//! store.insert("Person", "p1", serde_json::from_value(json!({"name": "A"}))?);
//! store.insert("Person", "p2", serde_json::from_value(json!({"name": "B"}))?);
//! store.insert("Person", "p3", serde_json::from_value(json!({"name": "C"}))?);
//!
//! let mut doc: Value = serde_json::from_value(json!({
//!     "name": "D",
//!     "father": {"$id": "p1"},
//!     "relatives": [{"$id": "p2"}, {"$id": "p3"}],
//! }))?;
//!
//! person.autorefresh(&mut doc, &store)?;
//! assert_eq!(doc["father"]["name"].as_str(), Some("A"));
//! assert_eq!(doc["relatives"][1]["name"].as_str(), Some("C"));
//! # Ok(())
//! # }
//! ```

mod error;
mod plan;
mod refresh;
mod schema;
mod value;

pub use self::error::{Error, Result};
pub use self::plan::{Directive, RefreshOptions, RefreshPlan};
pub use self::refresh::{
    refresh, AsyncResolver, MemoryStore, Refreshing, Resolved, ResolveRequest, Resolver,
};
pub use self::schema::{Field, Refresh, Schema, SchemaBuilder};
pub use self::value::{Id, Value, ID_FIELD};

/// Default resolution depth when a directive doesn't set one: targets are fetched, but
/// references inside the fetched documents are not followed.
pub const DEFAULT_MAX_DEPTH: u32 = 1;
