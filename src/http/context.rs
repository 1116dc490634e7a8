//! Per-request data handed to route handlers, and the value they hand back

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::http::query::{query_to_json, QueryMap, QueryValue};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub path_params: Vec<(String, String)>,
    pub query: QueryMap,
    /// Header names are lower-cased by the listener.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RequestContext {
    /// Looks a name up in the path parameters, then in the query string.
    pub fn get<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.path_param(name)
            .or_else(|| self.query.get(name).and_then(QueryValue::as_str))
            .unwrap_or(default)
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&QueryValue> {
        self.query.get(name)
    }

    pub fn query_json(&self) -> Value {
        query_to_json(&self.query)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parses the body as a JSON object; an empty body is an empty object.
    pub fn body_json(&self) -> Result<Value, AppError> {
        if self.body.trim().is_empty() {
            return Ok(json!({}));
        }

        let value: Value = serde_json::from_str(&self.body)
            .map_err(|err| AppError::invalid_arguments(format!("request body is not valid JSON: {err}")))?;
        if !value.is_object() {
            return Err(AppError::invalid_arguments(
                "request body must be a JSON object",
            ));
        }
        Ok(value)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub status: u16,
    pub content_type: String,
    pub payload: Value,
}

impl Default for RouteResult {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: JSON_CONTENT_TYPE.to_string(),
            payload: Value::Null,
        }
    }
}

impl RouteResult {
    pub fn ok(payload: Value) -> Self {
        Self::with_status(200, payload)
    }

    pub fn with_status(status: u16, payload: Value) -> Self {
        Self {
            status,
            payload,
            ..Self::default()
        }
    }

    pub fn no_content() -> Self {
        Self::with_status(204, Value::Null)
    }

    pub fn error(status: u16, message: &str) -> Self {
        let payload = serde_json::to_value(ErrorBody {
            error: message,
            code: status,
        })
        .unwrap_or_else(|_| json!({ "code": status }));
        Self::with_status(status, payload)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::error(400, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::error(404, message)
    }

    pub fn payload_too_large(message: &str) -> Self {
        Self::error(413, message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::error(500, message)
    }

    pub fn from_app_error(err: &AppError) -> Self {
        Self::error(err.status(), &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::query::decode;

    fn context() -> RequestContext {
        RequestContext {
            method: "GET".to_string(),
            path: "/tools/echo".to_string(),
            path_params: vec![("toolName".to_string(), "echo".to_string())],
            query: decode("toolName=shadowed&limit=5&nested[a]=1&gone=__null__"),
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: String::new(),
        }
    }

    #[test]
    fn get_prefers_path_params_over_query() {
        let ctx = context();
        assert_eq!(ctx.get("toolName", "-"), "echo");
        assert_eq!(ctx.get("limit", "-"), "5");
    }

    #[test]
    fn get_falls_back_to_default_for_missing_or_non_leaf() {
        let ctx = context();
        assert_eq!(ctx.get("absent", "fallback"), "fallback");
        assert_eq!(ctx.get("nested", "fallback"), "fallback");
        assert_eq!(ctx.get("gone", "fallback"), "fallback");
        assert!(ctx.query_value("gone").is_some_and(QueryValue::is_null));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let ctx = context();
        assert_eq!(ctx.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn body_json_handles_empty_invalid_and_non_object() {
        let mut ctx = context();
        assert_eq!(ctx.body_json().expect("empty body"), json!({}));

        ctx.body = "{\"a\":1}".to_string();
        assert_eq!(ctx.body_json().expect("object body"), json!({"a": 1}));

        ctx.body = "{".to_string();
        assert_eq!(ctx.body_json().expect_err("invalid json").status(), 400);

        ctx.body = "[1,2]".to_string();
        assert_eq!(ctx.body_json().expect_err("array body").status(), 400);
    }

    #[test]
    fn error_constructors_carry_envelope() {
        let result = RouteResult::not_found("No route found for GET /nope");
        assert_eq!(result.status, 404);
        assert_eq!(result.content_type, JSON_CONTENT_TYPE);
        assert_eq!(
            result.payload,
            json!({"error": "No route found for GET /nope", "code": 404})
        );
        assert_eq!(RouteResult::bad_request("x").payload["code"], 400);
        assert_eq!(RouteResult::internal_error("x").payload["code"], 500);
        assert_eq!(RouteResult::ok(json!({"a": 1})).status, 200);
    }

    #[test]
    fn from_app_error_uses_error_status() {
        let result = RouteResult::from_app_error(&AppError::tool_not_found("nope"));
        assert_eq!(result.status, 404);
        assert_eq!(result.payload["error"], "Tool 'nope' not found");
    }
}
