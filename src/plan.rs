use std::collections::BTreeMap;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::schema::Schema;

#[inline]
fn depth_is_default(v: &u32) -> bool {
    *v == crate::DEFAULT_MAX_DEPTH
}

/// Options applied when resolving one reference path.
///
/// Built-in defaults are merged with whatever the per-field directive sets: keys the
/// directive carries win, all other keys keep their defaults.
#[derive(Clone, Debug, PartialEq, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields, default)]
pub struct RefreshOptions {
    /// Fields to retain on fetched target documents. Empty means the whole document.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub projection: BTreeMap<String, bool>,
    /// How many levels of nested references the resolver should populate.
    #[educe(Default = crate::DEFAULT_MAX_DEPTH)]
    #[serde(skip_serializing_if = "depth_is_default")]
    pub max_depth: u32,
}

impl RefreshOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain a single field on fetched documents, in addition to any already retained.
    pub fn project(mut self, field: impl Into<String>) -> Self {
        self.projection.insert(field.into(), true);
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }
}

/// One entry of a [`RefreshPlan`]: a reference path marked for refresh, the collection
/// its identifiers point into, and the fully merged resolution options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub path: String,
    pub collection: String,
    pub options: RefreshOptions,
}

/// The product of analyzing a schema tree: an ordered mapping from dotted field path to
/// [`Directive`].
///
/// A plan is built exactly once per schema, is immutable afterwards, and is shared by
/// every document instance of that schema. The [executor][crate::refresh] only ever
/// reads it; it never re-walks the schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshPlan {
    directives: Vec<Directive>,
}

impl RefreshPlan {
    /// Walk a schema tree and collect a directive for every refreshable field.
    ///
    /// A field is refreshable iff it declares a reference target and carries an enabled
    /// refresh directive. Children of a field are visited before the field itself, so a
    /// refreshable field with refreshable descendants contributes independent entries
    /// for both, the descendants' first. Pure function of the schema tree.
    pub fn analyze(schema: &Schema) -> Self {
        let mut plan = RefreshPlan::default();
        walk(schema, None, &mut plan.directives);
        plan
    }

    pub fn get(&self, path: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.path == path)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.directives.iter()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

impl<'a> IntoIterator for &'a RefreshPlan {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;
    fn into_iter(self) -> Self::IntoIter {
        self.directives.iter()
    }
}

fn walk(schema: &Schema, prefix: Option<&str>, acc: &mut Vec<Directive>) {
    for (name, field) in schema.fields() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.clone(),
        };

        // Children first, so nested paths accumulate under this field's path.
        if let Some(nested) = field.nested() {
            walk(nested, Some(&path), acc);
        }

        // Refreshable means both a reference target and an enabled directive. A
        // directive without a target is silently skipped, not an error.
        let options = field.directive().and_then(|refresh| refresh.options());
        if let (Some(collection), Some(options)) = (field.reference_collection(), options) {
            insert(
                acc,
                Directive {
                    path,
                    collection: collection.into(),
                    options,
                },
            );
        }
    }
}

// Last write wins on a duplicate path. Each reachable path is visited once, so this is
// a safety net rather than an override mechanism.
fn insert(acc: &mut Vec<Directive>, directive: Directive) {
    match acc.iter_mut().find(|d| d.path == directive.path) {
        Some(slot) => *slot = directive,
        None => acc.push(directive),
    }
}
