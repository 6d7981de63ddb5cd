//! Response envelope helpers.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// 200 with `{"success": true, "data": ...}`.
pub fn ok<T: Serialize>(data: T) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": data })),
    )
}

/// Error with `{"success": false, "error": ...}`.
pub fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelopes() {
        let (status, body) = ok(json!({"n": 1}));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0["success"], true);
        assert_eq!(body.0["data"]["n"], 1);

        let (status, body) = error(StatusCode::NOT_FOUND, "missing");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.0["error"], "missing");
    }
}
