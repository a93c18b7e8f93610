/// Value types shared by the storage engine and the wire protocol
pub mod ids;
pub mod rank;
pub mod table;

pub use ids::ExternId;
pub use rank::Rank;
pub use table::Table;

use serde::{Deserialize, Serialize};

/// A single key/value pair of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Value of the first pair with the given key
pub fn lookup<'a>(pairs: &'a [KeyValue], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|kv| kv.key == key)
        .map(|kv| kv.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_wire_names() {
        let kv = KeyValue::new("name", "Canis");
        let json = serde_json::to_string(&kv).unwrap();
        assert_eq!(json, r#"{"Key":"name","Value":"Canis"}"#);
    }

    #[test]
    fn test_lookup_returns_first_match() {
        let pairs = vec![
            KeyValue::new("id", "4"),
            KeyValue::new("rank", "genus"),
            KeyValue::new("rank", "species"),
        ];
        assert_eq!(lookup(&pairs, "rank"), Some("genus"));
        assert_eq!(lookup(&pairs, "parent"), None);
    }
}
