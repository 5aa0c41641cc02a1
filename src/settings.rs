use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

pub type Settings = IndexMap<String, Value>;

/// A builder setting after decoding.
///
/// Source content mixes plain scalars, nested objects and arrays that were
/// stored as JSON text. Everything is decoded into this shape once, at the
/// boundary, so converters only ever match on variants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    Scalar(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    #[default]
    None,
}

impl Value {
    pub fn decode(raw: &serde_json::Value) -> Self {
        match raw {
            serde_json::Value::Null | serde_json::Value::Bool(false) => Value::None,
            serde_json::Value::Bool(true) => Value::Scalar("1".to_string()),
            serde_json::Value::Number(number) => Value::Scalar(number.to_string()),
            serde_json::Value::String(text) => Value::decode_str(text),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::decode).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::decode(value)))
                    .collect(),
            ),
        }
    }

    pub fn decode_str(text: &str) -> Self {
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(trimmed) {
                if parsed.is_array() || parsed.is_object() {
                    return Value::decode(&parsed);
                }
            }
        }
        Value::Scalar(text.to_string())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|entries| entries.get(key))
    }

    /// Builder "empty": missing, blank, `"0"`, or an empty collection.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(text) => text.is_empty() || text == "0",
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            Value::None => true,
        }
    }

    /// Scalar text that is not builder-empty.
    pub fn text(&self) -> Option<&str> {
        match self {
            Value::Scalar(text) if !text.is_empty() && text != "0" => Some(text.as_str()),
            _ => None,
        }
    }

    /// Scalar text where zero is a meaningful value.
    pub fn present(&self) -> Option<&str> {
        match self {
            Value::Scalar(text) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    /// Colors are either plain strings or picker objects carrying a `raw` field.
    pub fn color(&self) -> Option<&str> {
        match self {
            Value::Map(entries) => entries.get("raw").and_then(Value::text),
            _ => self.text(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Scalar(text) => !text.is_empty() && text != "0" && text != "false",
            _ => !self.is_empty(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::decode(&raw))
    }
}

pub fn decode_settings(raw: &serde_json::Value) -> Settings {
    match Value::decode(raw) {
        Value::Map(entries) => entries,
        _ => Settings::new(),
    }
}

pub fn deserialize_settings<'de, D>(deserializer: D) -> Result<Settings, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(decode_settings(&raw))
}

pub fn text<'a>(settings: &'a Settings, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(Value::text)
}

pub fn present<'a>(settings: &'a Settings, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(Value::present)
}

pub fn non_empty<'a>(settings: &'a Settings, key: &str) -> Option<&'a Value> {
    settings.get(key).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{Settings, Value, decode_settings, present, text};
    use serde_json::json;

    #[test]
    fn decodes_numbers_and_booleans_as_scalars() {
        let settings = decode_settings(&json!({
            "_opacity": 0,
            "_zIndex": 10,
            "_flexGrow": 1.5,
            "inset": true,
            "hidden": false,
        }));
        assert_eq!(settings["_opacity"], Value::Scalar("0".to_string()));
        assert_eq!(settings["_zIndex"], Value::Scalar("10".to_string()));
        assert_eq!(settings["_flexGrow"], Value::Scalar("1.5".to_string()));
        assert_eq!(settings["inset"], Value::Scalar("1".to_string()));
        assert_eq!(settings["hidden"], Value::None);
    }

    #[test]
    fn decodes_string_encoded_json_once_at_the_boundary() {
        let settings = decode_settings(&json!({
            "_cssGlobalClasses": "[\"abc123\",\"def456\"]",
            "_typography": "{\"font-size\":\"2rem\"}",
            "_gridTemplateColumns": "[full-start] 1fr [full-end]",
        }));
        assert_eq!(
            settings["_cssGlobalClasses"],
            Value::List(vec![
                Value::Scalar("abc123".to_string()),
                Value::Scalar("def456".to_string()),
            ])
        );
        assert_eq!(
            settings["_typography"].get("font-size").and_then(Value::text),
            Some("2rem")
        );
        assert_eq!(
            settings["_gridTemplateColumns"].as_scalar(),
            Some("[full-start] 1fr [full-end]")
        );
    }

    #[test]
    fn empty_list_settings_decode_to_empty_map() {
        assert!(decode_settings(&json!([])).is_empty());
    }

    #[test]
    fn keeps_insertion_order() {
        let settings = decode_settings(&json!({"b": "1", "a": "2", "c": "3"}));
        let keys: Vec<&str> = settings.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn zero_is_empty_for_text_but_present_for_zero_aware_keys() {
        let mut settings = Settings::new();
        settings.insert("_opacity".to_string(), Value::Scalar("0".to_string()));
        assert_eq!(text(&settings, "_opacity"), None);
        assert_eq!(present(&settings, "_opacity"), Some("0"));
        assert_eq!(present(&settings, "_missing"), None);
    }

    #[test]
    fn color_reads_raw_field_from_picker_objects() {
        let value = Value::decode(&json!({"hex": "#fff", "raw": "var(--white)"}));
        assert_eq!(value.color(), Some("var(--white)"));
        assert_eq!(Value::Scalar("red".to_string()).color(), Some("red"));
        assert_eq!(Value::decode(&json!({"hex": "#fff"})).color(), None);
    }
}
