use std::collections::BTreeMap;

/// A single delivered stream entry: its redis-assigned id and its fields.
/// Every payload in this system is a flat JSON map with string values
///, so fields are kept as plain strings end to end — callers
/// parse nested JSON (e.g. a `context` blob) themselves.
#[derive(Debug, Clone)]
pub struct ConsumedMessage {
    pub id: String,
    pub stream: String,
    pub fields: BTreeMap<String, String>,
}

impl ConsumedMessage {
    pub fn field(&self, key: &str) -> crate::error::Result<&str> {
        self.fields
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| crate::error::StreamError::Malformed(format!("missing field '{key}'")))
    }
}

/// Flatten a JSON object into the string-valued field map stream payloads
/// use. String
/// values pass through unchanged; everything else is re-serialised to its
/// JSON text so nested structures (e.g. `context`) survive the round trip.
pub fn fields_from_json(value: &serde_json::Value) -> crate::error::Result<BTreeMap<String, String>> {
    let obj = value
        .as_object()
        .ok_or_else(|| crate::error::StreamError::Malformed("payload is not a JSON object".into()))?;
    let mut fields = BTreeMap::new();
    for (k, v) in obj {
        let s = match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => continue,
            other => other.to_string(),
        };
        fields.insert(k.clone(), s);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_values_pass_through_unchanged() {
        let payload = serde_json::json!({"job_id": "abc", "user_id": "42"});
        let fields = fields_from_json(&payload).unwrap();
        assert_eq!(fields.get("job_id").unwrap(), "abc");
        assert_eq!(fields.get("user_id").unwrap(), "42");
    }

    #[test]
    fn null_values_are_dropped() {
        let payload = serde_json::json!({"job_id": "abc", "caption": null});
        let fields = fields_from_json(&payload).unwrap();
        assert!(!fields.contains_key("caption"));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let payload = serde_json::json!(["not", "an", "object"]);
        assert!(fields_from_json(&payload).is_err());
    }
}
