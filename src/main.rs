use std::{sync::Arc, thread};

use tracing::{error, info};
use utcp_bridge::{
    build_router,
    config::Config,
    domain::{builtin::register_builtin_tools, tools::ToolRegistry},
    http::listener::HttpServer,
    logging, main_thread,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;

    let (dispatcher, queue) = main_thread::channel();
    thread::Builder::new()
        .name("host-main".to_string())
        .spawn(move || queue.run_blocking())?;

    let mut registry = ToolRegistry::new(config.manual_version.clone()).with_dispatcher(dispatcher);
    register_builtin_tools(&mut registry)?;
    let tool_count = registry.len();

    let router = build_router(Arc::new(registry))?;
    let server = HttpServer::new(router).with_max_body_bytes(config.max_body_bytes);

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        tools = tool_count,
        "server starting"
    );
    let port = server.start(&config.bind_addr, config.bind_port).await?;
    info!(port, "server ready; GET /utcp for the tool manual");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }

    info!("shutting down");
    server.stop().await;
    Ok(())
}
