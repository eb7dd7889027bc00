use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::future::FusedFuture;
use futures_core::ready;
use pin_project_lite::pin_project;

use crate::error::{Error, Result};
use crate::plan::{RefreshOptions, RefreshPlan};
use crate::value::{for_each_slot, for_each_slot_mut, Id, Value, ID_FIELD};

/// One resolution request, covering a single plan directive.
///
/// `ids` holds the identifiers currently sitting in the document's slots at `path`, in
/// slot order: a bare [`Id`], or the [`ID_FIELD`] of an already (partially) populated
/// map. Slots without an extractable identifier are not requested and stay untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolveRequest {
    pub path: String,
    pub collection: String,
    pub options: RefreshOptions,
    pub ids: Vec<Id>,
}

/// The resolver's answer to one [`ResolveRequest`]: one entry per requested identifier,
/// in the same order. `None` means the target doesn't exist; its slot keeps the
/// original identifier.
pub type Resolved = Vec<Option<Value>>;

/// The consumed storage-layer primitive: given the whole batch of requests for one
/// refresh invocation, fetch every target document.
///
/// The executor makes exactly one call per invocation, so a resolver is free to batch
/// however it likes internally; grouping by distinct target collection is the natural
/// first cut. Failures wrap into [`Error::Resolution`] and surface verbatim to the
/// caller.
pub trait Resolver {
    fn resolve(&self, requests: &[ResolveRequest]) -> Result<Vec<Resolved>>;
}

/// Future-returning counterpart of [`Resolver`], for storage layers that complete
/// asynchronously. Drives [`Refreshing`].
pub trait AsyncResolver {
    type Resolving: Future<Output = Result<Vec<Resolved>>>;
    fn resolve(&self, requests: Vec<ResolveRequest>) -> Self::Resolving;
}

/// Build the request list for one refresh invocation: a defensive copy of every plan
/// directive, in plan order, with the identifiers extracted from the document's current
/// slots.
fn build_requests(doc: &Value, plan: &RefreshPlan) -> Vec<ResolveRequest> {
    plan.iter()
        .map(|directive| {
            let mut ids = Vec::new();
            for_each_slot(doc, &directive.path, &mut |slot| {
                if let Some(id) = slot.id() {
                    ids.push(id.clone());
                }
            });
            ResolveRequest {
                path: directive.path.clone(),
                collection: directive.collection.clone(),
                options: directive.options.clone(),
                ids,
            }
        })
        .collect()
}

/// Merge resolved values back into the document. Arity is checked for the whole
/// response before anything is written, so a malformed response leaves the document
/// unmodified.
fn apply(doc: &mut Value, requests: &[ResolveRequest], results: Vec<Resolved>) -> Result<()> {
    if results.len() != requests.len() {
        return Err(Error::ResponseLength {
            step: "request list",
            expected: requests.len(),
            actual: results.len(),
        });
    }
    for (request, resolved) in requests.iter().zip(&results) {
        if resolved.len() != request.ids.len() {
            return Err(Error::ResponseLength {
                step: "identifier list",
                expected: request.ids.len(),
                actual: resolved.len(),
            });
        }
    }

    for (request, resolved) in requests.iter().zip(results) {
        let mut values = resolved.into_iter();
        for_each_slot_mut(doc, &request.path, &mut |slot| {
            if slot.id().is_none() {
                return;
            }
            // A missing target keeps its original identifier in place.
            if let Some(Some(value)) = values.next() {
                *slot = value;
            }
        });
    }
    Ok(())
}

/// Resolve every directive of `plan` on `doc` through `resolver`, in one batched call.
///
/// On success each addressed slot is overwritten in place: a scalar reference becomes
/// the fetched document, an array of references becomes an array of fetched documents
/// with its original order and length. On failure the error is returned and `doc` is
/// left exactly as it was.
pub fn refresh<R: Resolver>(doc: &mut Value, plan: &RefreshPlan, resolver: &R) -> Result<()> {
    let requests = build_requests(doc, plan);
    let results = resolver.resolve(&requests)?;
    apply(doc, &requests, results)
}

pin_project! {
    /// A refresh in flight against an [`AsyncResolver`].
    ///
    /// Created with [`Refreshing::new`]; the batched resolution call is issued
    /// immediately, and the future suspends until the storage layer completes it. On
    /// completion the resolved values are merged into the document and the result is
    /// yielded exactly once.
    #[must_use = "futures do nothing unless polled"]
    pub struct Refreshing<'a, R>
        where
            R: AsyncResolver,
    {
        #[pin]
        resolving: R::Resolving,
        doc: Option<&'a mut Value>,
        requests: Vec<ResolveRequest>,
    }
}

impl<'a, R> Refreshing<'a, R>
where
    R: AsyncResolver,
{
    pub fn new(doc: &'a mut Value, plan: &RefreshPlan, resolver: &R) -> Self {
        let requests = build_requests(doc, plan);
        let resolving = resolver.resolve(requests.clone());
        Self {
            resolving,
            doc: Some(doc),
            requests,
        }
    }
}

impl<'a, R> Future for Refreshing<'a, R>
where
    R: AsyncResolver,
{
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.project();
        if this.doc.is_none() {
            // Already yielded on an earlier poll.
            return Poll::Pending;
        }
        let result = ready!(this.resolving.poll(cx));
        let out = match this.doc.take() {
            Some(doc) => result.and_then(|results| apply(doc, this.requests, results)),
            None => Ok(()),
        };
        Poll::Ready(out)
    }
}

impl<'a, R> FusedFuture for Refreshing<'a, R>
where
    R: AsyncResolver,
{
    fn is_terminated(&self) -> bool {
        self.doc.is_none()
    }
}

/// A toy document store: collections of documents in memory, resolving requests with
/// straight map lookups.
///
/// Implements both resolver traits, which makes it the natural harness for tests and
/// examples. Projections are honored, with [`ID_FIELD`] always retained so that a
/// projected refresh stays idempotent.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    collections: BTreeMap<String, BTreeMap<Id, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `doc` under `id` in `collection`. If `doc` is a map, its [`ID_FIELD`] is
    /// set to `id`.
    pub fn insert(&mut self, collection: impl Into<String>, id: impl Into<Id>, mut doc: Value) {
        let id = id.into();
        if let Some(map) = doc.as_map_mut() {
            map.insert(ID_FIELD.into(), Value::Id(id.clone()));
        }
        self.collections
            .entry(collection.into())
            .or_default()
            .insert(id, doc);
    }

    pub fn get(&self, collection: &str, id: &Id) -> Option<&Value> {
        self.collections.get(collection)?.get(id)
    }
}

fn project(doc: &Value, projection: &BTreeMap<String, bool>) -> Value {
    if projection.is_empty() {
        return doc.clone();
    }
    match doc {
        Value::Map(map) => Value::Map(
            map.iter()
                .filter(|(name, _)| {
                    name.as_str() == ID_FIELD
                        || projection.get(name.as_str()).copied().unwrap_or(false)
                })
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl Resolver for MemoryStore {
    fn resolve(&self, requests: &[ResolveRequest]) -> Result<Vec<Resolved>> {
        Ok(requests
            .iter()
            .map(|request| {
                let collection = self.collections.get(&request.collection);
                request
                    .ids
                    .iter()
                    .map(|id| {
                        collection
                            .and_then(|docs| docs.get(id))
                            .map(|doc| project(doc, &request.options.projection))
                    })
                    .collect()
            })
            .collect())
    }
}

impl AsyncResolver for MemoryStore {
    type Resolving = std::future::Ready<Result<Vec<Resolved>>>;

    fn resolve(&self, requests: Vec<ResolveRequest>) -> Self::Resolving {
        std::future::ready(Resolver::resolve(self, &requests))
    }
}
