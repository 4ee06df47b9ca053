// handlers/function_call.rs - POST /api/functions/:name

use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension,
};
use serde_json::Value;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::security::Caller;

/// Invoke a registered function with the request body as its payload.
/// An empty body is treated as `{}`.
pub async fn function_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> ApiResult<Value> {
    let payload = parse_payload(&body)?;
    let data = state.registry.invoke(&name, payload, caller).await?;
    Ok(ApiResponse::success(data))
}

fn parse_payload(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Invalid JSON body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_is_empty_object() {
        assert_eq!(parse_payload(b"").unwrap(), json!({}));
        assert_eq!(parse_payload(b"  \n").unwrap(), json!({}));
    }

    #[test]
    fn malformed_body_is_invalid_json() {
        let err = parse_payload(b"{not json").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(matches!(err, ApiError::InvalidJson(_)));
    }

    #[test]
    fn parses_object_body() {
        assert_eq!(parse_payload(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
    }
}
