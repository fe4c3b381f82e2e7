//! The inbound chat-completion body. The gateway is a hollow proxy: only
//! `model`, `stream` and `messages` are semantically inspected; every other
//! field passes through untouched.

use serde_json::Value;

use crate::error::GatewayError;

pub struct ChatCompletionRequest {
    raw: Value,
}

impl ChatCompletionRequest {
    pub fn parse(bytes: &[u8]) -> Result<Self, GatewayError> {
        let raw: Value = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::SchemaInvalid(format!("invalid JSON body: {e}")))?;

        if !raw.is_object() {
            return Err(GatewayError::SchemaInvalid(
                "request body must be a JSON object".into(),
            ));
        }
        if raw.get("model").and_then(Value::as_str).is_none() {
            return Err(GatewayError::SchemaInvalid(
                "\"model\" field is required and must be a string".into(),
            ));
        }

        Ok(Self { raw })
    }

    pub fn model(&self) -> &str {
        self.raw
            .get("model")
            .and_then(Value::as_str)
            .expect("validated in parse()")
    }

    pub fn is_stream(&self) -> bool {
        self.raw
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `messages` array, used only for the admission token estimate.
    /// Absent or non-array `messages` estimate as an empty array.
    pub fn messages(&self) -> Value {
        self.raw
            .get("messages")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// The full, unmodified request body. The gateway is a hollow proxy —
    /// what arrives is what is forwarded, modulo authentication header
    /// replacement, so this is sent upstream byte-for-byte.
    pub fn body(&self) -> &Value {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_valid_request() {
        let body = json!({"model": "gpt-4o", "messages": [], "stream": false});
        let req = ChatCompletionRequest::parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(req.model(), "gpt-4o");
        assert!(!req.is_stream());
    }

    #[test]
    fn missing_model_is_schema_invalid() {
        let body = json!({"messages": []});
        let result = ChatCompletionRequest::parse(body.to_string().as_bytes());
        assert!(matches!(result, Err(GatewayError::SchemaInvalid(_))));
    }

    #[test]
    fn opaque_fields_are_preserved_verbatim() {
        let body = json!({"model": "gpt-4o", "messages": [], "temperature": 0.7, "n": 2});
        let req = ChatCompletionRequest::parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(req.body(), &body);
    }

    #[test]
    fn stream_defaults_to_false() {
        let body = json!({"model": "gpt-4o", "messages": []});
        let req = ChatCompletionRequest::parse(body.to_string().as_bytes()).unwrap();
        assert!(!req.is_stream());
    }
}
