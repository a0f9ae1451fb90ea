use std::collections::HashMap;
use std::mem;

/// In-memory representation of a JSON value
///
/// Numbers are split into a 32-bit integer and a 64-bit double. The parser
/// produces `Int` whenever the parsed number has no fractional part and fits
/// in an `i32`, and `Double` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(HashMap<String, JsonValue>),
}

impl JsonValue {
    pub fn null() -> Self {
        JsonValue::Null
    }

    pub fn bool(value: bool) -> Self {
        JsonValue::Bool(value)
    }

    pub fn int(value: i32) -> Self {
        JsonValue::Int(value)
    }

    pub fn double(value: f64) -> Self {
        JsonValue::Double(value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        JsonValue::String(value.into())
    }

    pub fn array(values: impl IntoIterator<Item = JsonValue>) -> Self {
        JsonValue::Array(values.into_iter().collect())
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, JsonValue)>) -> Self {
        JsonValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Name of the JSON type, as used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            JsonValue::Null => "null",
            JsonValue::Bool(_) => "bool",
            JsonValue::Int(_) => "int",
            JsonValue::Double(_) => "double",
            JsonValue::String(_) => "string",
            JsonValue::Array(_) => "array",
            JsonValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsonValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            JsonValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric value as a double, for either number representation
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Int(value) => Some(f64::from(*value)),
            JsonValue::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, JsonValue>> {
        match self {
            JsonValue::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a member of an object
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.as_object().and_then(|entries| entries.get(key))
    }

    /// Approximate number of bytes this value occupies, used for memory accounting
    pub fn heap_size(&self) -> usize {
        let own = mem::size_of::<JsonValue>();
        match self {
            JsonValue::String(value) => own + value.len(),
            JsonValue::Array(values) => own + values.iter().map(JsonValue::heap_size).sum::<usize>(),
            JsonValue::Object(entries) => {
                own + entries
                    .iter()
                    .map(|(key, value)| key.len() + value.heap_size())
                    .sum::<usize>()
            }
            _ => own,
        }
    }
}

impl From<bool> for JsonValue {
    fn from(value: bool) -> Self {
        JsonValue::Bool(value)
    }
}

impl From<i32> for JsonValue {
    fn from(value: i32) -> Self {
        JsonValue::Int(value)
    }
}

impl From<f64> for JsonValue {
    fn from(value: f64) -> Self {
        JsonValue::Double(value)
    }
}

impl From<&str> for JsonValue {
    fn from(value: &str) -> Self {
        JsonValue::String(value.to_string())
    }
}

impl From<String> for JsonValue {
    fn from(value: String) -> Self {
        JsonValue::String(value)
    }
}

impl From<Vec<JsonValue>> for JsonValue {
    fn from(values: Vec<JsonValue>) -> Self {
        JsonValue::Array(values)
    }
}

impl From<HashMap<String, JsonValue>> for JsonValue {
    fn from(entries: HashMap<String, JsonValue>) -> Self {
        JsonValue::Object(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(JsonValue::null().is_null());
        assert_eq!(JsonValue::bool(true).as_bool(), Some(true));
        assert_eq!(JsonValue::int(-3).as_i32(), Some(-3));
        assert_eq!(JsonValue::double(3.4).as_f64(), Some(3.4));
        assert_eq!(JsonValue::string("hello").as_str(), Some("hello"));
    }

    #[test]
    fn test_accessors_reject_other_types() {
        let value = JsonValue::string("42");
        assert_eq!(value.as_i32(), None);
        assert_eq!(value.as_f64(), None);
        assert!(value.as_array().is_none());
        assert!(value.get("42").is_none());
    }

    #[test]
    fn test_object_lookup() {
        let value = JsonValue::object([
            ("foo", JsonValue::array([JsonValue::int(1), JsonValue::bool(true)])),
            ("bar", JsonValue::null()),
        ]);

        assert_eq!(value.type_name(), "object");
        assert_eq!(value.get("foo").and_then(JsonValue::as_array).map(<[_]>::len), Some(2));
        assert!(value.get("bar").unwrap().is_null());
        assert!(value.get("baz").is_none());
    }

    #[test]
    fn test_heap_size_grows_with_content() {
        let small = JsonValue::string("a");
        let large = JsonValue::string("a".repeat(100));
        assert!(large.heap_size() > small.heap_size());

        let nested = JsonValue::array([small.clone(), small.clone()]);
        assert!(nested.heap_size() > 2 * small.heap_size());
    }
}
