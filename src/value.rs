use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Well-known identifier field of a stored document. A partially or fully populated
/// reference carries its own identifier under this key, letting a later refresh re-fetch
/// it.
pub const ID_FIELD: &str = "_id";

/// Key used to tag an [`Id`] when a [`Value`] passes through a self-describing format.
const ID_TAG: &str = "$id";

/// An opaque document identifier, pointing at one document within a collection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Id(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(v: &str) -> Self {
        Id(v.into())
    }
}

impl From<String> for Id {
    fn from(v: String) -> Self {
        Id(v)
    }
}

/// A dynamic document value.
///
/// Document instances conforming to a [`Schema`][crate::Schema] are trees of `Value`:
/// maps of named fields, arrays, scalars, and [`Id`] references pointing into other
/// collections. When serialized through a self-describing format, an `Id` becomes the
/// single-entry map `{"$id": "..."}` so that references survive round-trips.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    F64(f64),
    Str(String),
    Id(Id),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_f64(&self) -> bool {
        matches!(self, Value::F64(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn is_id(&self) -> bool {
        matches!(self, Value::Id(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        if let Value::Int(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        if let Value::F64(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::Str(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_id(&self) -> Option<&Id> {
        if let Value::Id(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        if let Value::Array(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        if let Value::Array(ref mut v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        if let Value::Map(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        if let Value::Map(ref mut v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Fetch a named field of a map value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(field))
    }

    /// The identifier of the document this value refers to: the value itself if it is an
    /// [`Id`], or its [`ID_FIELD`] entry if it is a (partially) populated map.
    pub fn id(&self) -> Option<&Id> {
        match self {
            Value::Id(id) => Some(id),
            Value::Map(map) => match map.get(ID_FIELD) {
                Some(Value::Id(id)) => Some(id),
                _ => None,
            },
            _ => None,
        }
    }
}

static NULL: Value = Value::Null;

impl Index<&str> for Value {
    type Output = Value;
    fn index(&self, field: &str) -> &Value {
        self.get(field).unwrap_or(&NULL)
    }
}

impl Index<usize> for Value {
    type Output = Value;
    fn index(&self, index: usize) -> &Value {
        match self {
            Value::Array(items) => items.get(index).unwrap_or(&NULL),
            _ => &NULL,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Id> for Value {
    fn from(v: Id) -> Self {
        Value::Id(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Visit every slot addressed by a dotted path, in depth-first order.
///
/// Intermediate segments descend into map fields; an array met before the final segment
/// is transparent, fanning out over its elements (dotted paths never carry indices). At
/// the final segment, an array contributes one slot per element, anything else is a
/// single slot. Missing fields contribute no slots.
pub(crate) fn for_each_slot<'a, F>(value: &'a Value, path: &str, f: &mut F)
where
    F: FnMut(&'a Value),
{
    let segments: Vec<&str> = path.split('.').collect();
    walk_slots(value, &segments, f)
}

fn walk_slots<'a, F>(value: &'a Value, segments: &[&str], f: &mut F)
where
    F: FnMut(&'a Value),
{
    match segments.split_first() {
        None => match value {
            Value::Array(items) => items.iter().for_each(|item| f(item)),
            other => f(other),
        },
        Some((segment, rest)) => match value {
            Value::Map(map) => {
                if let Some(inner) = map.get(*segment) {
                    walk_slots(inner, rest, f)
                }
            }
            Value::Array(items) => items.iter().for_each(|item| walk_slots(item, segments, f)),
            _ => {}
        },
    }
}

/// Mutable counterpart of [`for_each_slot`], visiting slots in the identical order.
pub(crate) fn for_each_slot_mut<F>(value: &mut Value, path: &str, f: &mut F)
where
    F: FnMut(&mut Value),
{
    let segments: Vec<&str> = path.split('.').collect();
    walk_slots_mut(value, &segments, f)
}

fn walk_slots_mut<F>(value: &mut Value, segments: &[&str], f: &mut F)
where
    F: FnMut(&mut Value),
{
    match segments.split_first() {
        None => match value {
            Value::Array(items) => items.iter_mut().for_each(|item| f(item)),
            other => f(other),
        },
        Some((segment, rest)) => match value {
            Value::Map(map) => {
                if let Some(inner) = map.get_mut(*segment) {
                    walk_slots_mut(inner, rest, f)
                }
            }
            Value::Array(items) => items
                .iter_mut()
                .for_each(|item| walk_slots_mut(item, segments, f)),
            _ => {}
        },
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => ser.serialize_unit(),
            Value::Bool(v) => ser.serialize_bool(*v),
            Value::Int(v) => ser.serialize_i64(*v),
            Value::F64(v) => ser.serialize_f64(*v),
            Value::Str(v) => ser.serialize_str(v),
            Value::Id(v) => {
                let mut map = ser.serialize_map(Some(1))?;
                map.serialize_entry(ID_TAG, v.as_str())?;
                map.end()
            }
            Value::Array(v) => ser.collect_seq(v),
            Value::Map(v) => ser.collect_map(v),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a document value")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: serde::de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, de: D) -> Result<Value, D::Error> {
        de.deserialize_any(ValueVisitor)
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Value, E> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| E::custom("integer out of range"))
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::F64(v))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Str(v.into()))
    }

    fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Str(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(item) = access.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        // A lone `$id` entry is a tagged identifier, not a map.
        if map.len() == 1 {
            if let Some(Value::Str(id)) = map.get(ID_TAG) {
                return Ok(Value::Id(Id::new(id.clone())));
            }
        }
        Ok(Value::Map(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Value, D::Error> {
        de.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Value {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn id_extraction() {
        let id = Value::Id(Id::new("p1"));
        assert_eq!(id.id(), Some(&Id::new("p1")));

        let populated = doc(json!({ "_id": {"$id": "p1"}, "name": "A" }));
        assert_eq!(populated.id(), Some(&Id::new("p1")));

        assert_eq!(doc(json!({ "name": "A" })).id(), None);
        assert_eq!(Value::Str("p1".into()).id(), None);
    }

    #[test]
    fn serde_round_trip() {
        let original = doc(json!({
            "name": "A",
            "age": 40,
            "score": 0.5,
            "father": {"$id": "p1"},
            "relatives": [{"$id": "p2"}, {"$id": "p3"}],
            "extra": null,
        }));
        assert!(original["father"].is_id());
        assert!(original["relatives"][1].is_id());
        assert_eq!(original["age"].as_i64(), Some(40));

        let encoded = serde_json::to_value(&original).unwrap();
        assert_eq!(encoded["father"], json!({"$id": "p1"}));
        let decoded: Value = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn tagged_id_needs_lone_key() {
        let not_an_id = doc(json!({ "$id": "p1", "name": "A" }));
        assert!(not_an_id.is_map());
    }

    #[test]
    fn slots_scalar_and_array() {
        let value = doc(json!({
            "father": {"$id": "p1"},
            "relatives": [{"$id": "p2"}, {"$id": "p3"}],
        }));

        let mut seen = Vec::new();
        for_each_slot(&value, "father", &mut |slot| seen.push(slot.clone()));
        assert_eq!(seen, vec![Value::Id(Id::new("p1"))]);

        let mut seen = Vec::new();
        for_each_slot(&value, "relatives", &mut |slot| seen.push(slot.clone()));
        assert_eq!(
            seen,
            vec![Value::Id(Id::new("p2")), Value::Id(Id::new("p3"))]
        );

        let mut seen = Vec::new();
        for_each_slot(&value, "missing", &mut |slot| seen.push(slot.clone()));
        assert!(seen.is_empty());
    }

    #[test]
    fn slots_fan_out_through_arrays() {
        let value = doc(json!({
            "family": {
                "members": [
                    { "person": {"$id": "p1"} },
                    { "person": {"$id": "p2"} },
                    { "note": "no reference here" },
                ]
            }
        }));

        let mut seen = Vec::new();
        for_each_slot(&value, "family.members.person", &mut |slot| {
            seen.push(slot.clone())
        });
        assert_eq!(
            seen,
            vec![Value::Id(Id::new("p1")), Value::Id(Id::new("p2"))]
        );
    }

    #[test]
    fn slots_mut_matches_order() {
        let mut value = doc(json!({
            "relatives": [{"$id": "p2"}, {"$id": "p3"}],
        }));
        let mut n = 0;
        for_each_slot_mut(&mut value, "relatives", &mut |slot| {
            n += 1;
            *slot = Value::Int(n);
        });
        assert_eq!(value["relatives"], doc(json!([1, 2])));
    }
}
