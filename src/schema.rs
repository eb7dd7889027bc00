use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::plan::{RefreshOptions, RefreshPlan};
use crate::refresh::{refresh, Resolver};
use crate::value::Value;

#[inline]
fn is_false(v: &bool) -> bool {
    !v
}

/// A per-field refresh directive: the literal flag form, or an options object.
///
/// `Flag(true)` refreshes with the built-in defaults, `Flag(false)` disables the
/// directive, and `Options` carries explicit keys that override the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Refresh {
    Flag(bool),
    Options(RefreshOptions),
}

impl Refresh {
    /// The merged options this directive asks for, or `None` if it is disabled.
    pub fn options(&self) -> Option<RefreshOptions> {
        match self {
            Refresh::Flag(true) => Some(RefreshOptions::default()),
            Refresh::Flag(false) => None,
            Refresh::Options(options) => Some(options.clone()),
        }
    }
}

/// One node of a schema tree.
///
/// The attributes are independent: a field may declare a reference target, carry a
/// refresh directive, embed a nested schema for sub-documents, and be array-shaped, in
/// any combination. Fields are built up in the chaining style:
///
/// ```
/// # use doc_refresh::{Field, RefreshOptions};
/// let father = Field::reference("Person").refresh();
/// let relatives = Field::reference("Person")
///     .array()
///     .refresh_with(RefreshOptions::new().project("name"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Field {
    /// Collection this field's identifier(s) point into.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
    /// Auto-refresh directive, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<Refresh>,
    /// Nested schema, for embedded sub-documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Box<Schema>>,
    /// Array shape: the field holds an array of whatever the other attributes describe.
    #[serde(skip_serializing_if = "is_false")]
    array: bool,
}

impl Field {
    /// A plain scalar field.
    pub fn new() -> Self {
        Self::default()
    }

    /// A field holding the identifier of a document in `collection`.
    pub fn reference(collection: impl Into<String>) -> Self {
        Self::new().with_reference(collection)
    }

    /// A field embedding a sub-document conforming to `schema`.
    pub fn embedded(schema: Schema) -> Self {
        Field {
            fields: Some(Box::new(schema)),
            ..Self::default()
        }
    }

    /// Declare a reference target on this field.
    pub fn with_reference(mut self, collection: impl Into<String>) -> Self {
        self.reference = Some(collection.into());
        self
    }

    /// Make this field array-shaped.
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Mark this field for auto-refresh with the built-in defaults.
    pub fn refresh(self) -> Self {
        self.refresh_flag(true)
    }

    /// Set the literal flag form of the refresh directive.
    pub fn refresh_flag(mut self, enabled: bool) -> Self {
        self.refresh = Some(Refresh::Flag(enabled));
        self
    }

    /// Mark this field for auto-refresh with explicit options.
    pub fn refresh_with(mut self, options: RefreshOptions) -> Self {
        self.refresh = Some(Refresh::Options(options));
        self
    }

    pub fn reference_collection(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// The field's refresh directive, if any.
    pub fn directive(&self) -> Option<&Refresh> {
        self.refresh.as_ref()
    }

    /// The nested schema of an embedded sub-document field.
    pub fn nested(&self) -> Option<&Schema> {
        self.fields.as_deref()
    }

    pub fn is_array(&self) -> bool {
        self.array
    }
}

/// A document schema: an ordered tree of named [`Field`]s, plus the [`RefreshPlan`]
/// computed from it.
///
/// The plan is built exactly once, when the schema is built, and never changes
/// afterwards. Every document instance of the schema shares it.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    fields: Vec<(String, Field)>,
    plan: RefreshPlan,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// The schema's fields, in declaration order.
    pub fn fields(&self) -> &[(String, Field)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find_map(|(n, f)| (n == name).then_some(f))
    }

    /// The refresh plan computed when this schema was built.
    pub fn plan(&self) -> &RefreshPlan {
        &self.plan
    }

    /// Resolve every marked reference on `doc` through `resolver`.
    ///
    /// This is the instance-level operation the owning document system exposes, and the
    /// one it should invoke from its pre-validation hook so that references are fresh by
    /// the time validation rules run. Equivalent to
    /// [`refresh(doc, self.plan(), resolver)`][refresh].
    pub fn autorefresh<R: Resolver>(&self, doc: &mut Value, resolver: &R) -> Result<()> {
        refresh(doc, &self.plan, resolver)
    }
}

/// Builder for [`Schema`]. Finishing with [`build`][SchemaBuilder::build] runs the path
/// analyzer once over the finished tree.
#[derive(Clone, Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn build(self) -> Schema {
        let mut schema = Schema {
            fields: self.fields,
            plan: RefreshPlan::default(),
        };
        schema.plan = RefreshPlan::analyze(&schema);
        schema
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_map(self.fields.iter().map(|(name, field)| (name, field)))
    }
}

struct SchemaVisitor;

impl<'de> Visitor<'de> for SchemaVisitor {
    type Value = Schema;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of field descriptors")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schema, A::Error> {
        let mut builder = SchemaBuilder::new();
        while let Some((name, field)) = access.next_entry::<String, Field>()? {
            builder = builder.field(name, field);
        }
        // Rebuilding runs the analyzer, so a deserialized schema carries its plan too.
        Ok(builder.build())
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Schema, D::Error> {
        de.deserialize_map(SchemaVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_keeps_declaration_order() {
        let schema = Schema::builder()
            .field("name", Field::new())
            .field("father", Field::reference("Person").refresh())
            .build();
        let names: Vec<&str> = schema.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name", "father"]);
        assert!(schema.field("father").unwrap().reference_collection() == Some("Person"));
    }

    #[test]
    fn directive_forms_deserialize() {
        let field: Field = serde_json::from_value(json!({
            "ref": "Person",
            "refresh": true,
        }))
        .unwrap();
        assert_eq!(field.refresh, Some(Refresh::Flag(true)));

        let field: Field = serde_json::from_value(json!({
            "ref": "Person",
            "refresh": { "projection": { "name": true } },
            "array": true,
        }))
        .unwrap();
        assert!(field.is_array());
        match field.refresh.unwrap() {
            Refresh::Options(options) => {
                assert_eq!(options.projection.get("name"), Some(&true))
            }
            other => panic!("expected options directive, got {:?}", other),
        }
    }

    #[test]
    fn schema_round_trip_rebuilds_plan() {
        let schema = Schema::builder()
            .field("name", Field::new())
            .field("father", Field::reference("Person").refresh())
            .field(
                "family",
                Field::embedded(
                    Schema::builder()
                        .field("members", Field::reference("Person").array().refresh())
                        .build(),
                ),
            )
            .build();

        let encoded = serde_json::to_value(&schema).unwrap();
        assert_eq!(encoded["father"], json!({ "ref": "Person", "refresh": true }));

        // serde_json reorders object keys, so compare field-by-field rather than whole
        // schemas.
        let decoded: Schema = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.fields().len(), 3);
        assert_eq!(decoded.field("father"), schema.field("father"));
        assert_eq!(decoded.field("family"), schema.field("family"));
        assert_eq!(decoded.plan().len(), 2);
        assert!(decoded.plan().get("father").is_some());
        assert!(decoded.plan().get("family.members").is_some());
    }
}
