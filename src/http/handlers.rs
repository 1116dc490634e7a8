//! Route handlers for the discovery, health and tool invocation endpoints

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::tools::ToolProvider;
use crate::errors::AppError;
use crate::http::context::{RequestContext, RouteResult};
use crate::http::router::HandlerResult;

pub const TOOL_NAME_PARAM: &str = "toolName";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

pub async fn health(_ctx: RequestContext) -> HandlerResult {
    let body = HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    Ok(RouteResult::ok(to_payload(&body)?))
}

pub async fn manifest(provider: Arc<dyn ToolProvider>, ctx: RequestContext) -> HandlerResult {
    let manual = provider.manual(&base_url(&ctx));
    Ok(RouteResult::ok(to_payload(&manual)?))
}

pub async fn list_tools(provider: Arc<dyn ToolProvider>, ctx: RequestContext) -> HandlerResult {
    let manual = provider.manual(&base_url(&ctx));
    Ok(RouteResult::ok(json!({ "tools": to_payload(&manual.tools)? })))
}

/// GET takes arguments from the decoded query string, every other method
/// from the JSON body.
pub async fn invoke_tool(provider: Arc<dyn ToolProvider>, ctx: RequestContext) -> HandlerResult {
    let name = ctx.get(TOOL_NAME_PARAM, "").to_string();
    let arguments = if ctx.method.eq_ignore_ascii_case("GET") {
        Ok(ctx.query_json())
    } else {
        ctx.body_json()
    };

    let outcome = match arguments {
        Ok(arguments) => {
            debug!(tool = %name, "invoking tool");
            provider.call_tool(&name, arguments).await
        }
        Err(err) => Err(err),
    };

    match outcome {
        Ok(result) => Ok(RouteResult::ok(json!({ "result": result }))),
        Err(err) => {
            warn!(tool = %name, status = err.status(), error = %err, "tool call failed");
            Ok(RouteResult::from_app_error(&err))
        }
    }
}

fn base_url(ctx: &RequestContext) -> String {
    let host = ctx
        .header("host")
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|err| AppError::execution(format!("failed to serialize response: {err}")))
}
