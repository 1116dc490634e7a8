use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod main_thread;

use domain::tools::ToolProvider;
use errors::RouterError;
use http::handlers;
use http::router::Router;

pub fn build_router(provider: Arc<dyn ToolProvider>) -> Result<Router, RouterError> {
    let mut router = Router::new();
    let tool_route = format!("/tools/{{{}}}", handlers::TOOL_NAME_PARAM);

    let manifest_provider = Arc::clone(&provider);
    let list_provider = Arc::clone(&provider);
    let get_provider = Arc::clone(&provider);
    let post_provider = provider;

    router
        .get("/utcp", move |ctx| {
            handlers::manifest(Arc::clone(&manifest_provider), ctx)
        })?
        .get("/health", handlers::health)?
        .get("/tools", move |ctx| {
            handlers::list_tools(Arc::clone(&list_provider), ctx)
        })?
        .get(&tool_route, move |ctx| {
            handlers::invoke_tool(Arc::clone(&get_provider), ctx)
        })?
        .post(&tool_route, move |ctx| {
            handlers::invoke_tool(Arc::clone(&post_provider), ctx)
        })?;

    Ok(router)
}
