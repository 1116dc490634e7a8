//! Tool registry and the provider contract the HTTP layer calls into
//!
//! A `ToolProvider` answers two questions for the routes: which tools exist
//! (the manual) and how to run one by name. `ToolRegistry` is the in-process
//! implementation: an ordered list of definitions, each bound to a plain
//! function and an execution affinity.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::manual::{HttpCallTemplate, ToolDescriptor, UtcpManual, PROTOCOL_VERSION};
use crate::errors::{AppError, RegistryError};
use crate::main_thread::MainThreadDispatcher;

pub type ToolFn = Arc<dyn Fn(Value) -> Result<Value, AppError> + Send + Sync>;

#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Manual with call templates pointing at `base_url`.
    fn manual(&self, base_url: &str) -> UtcpManual;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    /// Runs on whichever runtime worker handles the request.
    #[default]
    Any,
    /// Runs on the host thread that drains the `MainThreadQueue`.
    MainThread,
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub tags: Vec<String>,
    pub http_method: String,
    pub affinity: Affinity,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs: json!({"type": "object", "properties": {}}),
            outputs: None,
            tags: Vec::new(),
            http_method: "POST".to_string(),
            affinity: Affinity::Any,
        }
    }

    pub fn inputs(mut self, schema: Value) -> Self {
        self.inputs = schema;
        self
    }

    pub fn outputs(mut self, schema: Value) -> Self {
        self.outputs = Some(schema);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn http_method(mut self, method: &str) -> Self {
        self.http_method = method.to_ascii_uppercase();
        self
    }

    pub fn on_main_thread(mut self) -> Self {
        self.affinity = Affinity::MainThread;
        self
    }

    fn descriptor(&self, base_url: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            tags: self.tags.clone(),
            tool_call_template: HttpCallTemplate::http(base_url, &self.name, &self.http_method),
        }
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    invoke: ToolFn,
}

pub struct ToolRegistry {
    manual_version: String,
    dispatcher: Option<MainThreadDispatcher>,
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new(manual_version: impl Into<String>) -> Self {
        Self {
            manual_version: manual_version.into(),
            dispatcher: None,
            tools: Vec::new(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: MainThreadDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn register<F>(&mut self, definition: ToolDefinition, invoke: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(Value) -> Result<Value, AppError> + Send + Sync + 'static,
    {
        if self.find(&definition.name).is_some() {
            return Err(RegistryError::DuplicateTool(definition.name));
        }
        if definition.affinity == Affinity::MainThread && self.dispatcher.is_none() {
            return Err(RegistryError::MissingDispatcher(definition.name));
        }

        debug!(tool = %definition.name, affinity = ?definition.affinity, "tool registered");
        self.tools.push(RegisteredTool {
            definition,
            invoke: Arc::new(invoke),
        });
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|tool| tool.definition.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.definition.name == name)
    }
}

#[async_trait]
impl ToolProvider for ToolRegistry {
    fn manual(&self, base_url: &str) -> UtcpManual {
        UtcpManual {
            protocol_version: PROTOCOL_VERSION.to_string(),
            manual_version: self.manual_version.clone(),
            tools: self
                .tools
                .iter()
                .map(|tool| tool.definition.descriptor(base_url))
                .collect(),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, AppError> {
        let tool = self
            .find(name)
            .ok_or_else(|| AppError::tool_not_found(name))?;

        match tool.definition.affinity {
            Affinity::Any => (tool.invoke)(arguments),
            Affinity::MainThread => {
                let dispatcher = self
                    .dispatcher
                    .as_ref()
                    .ok_or(AppError::DispatcherClosed)?;
                let invoke = Arc::clone(&tool.invoke);
                dispatcher.run(move || invoke(arguments)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::main_thread;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new("1.2.3");
        registry
            .register(
                ToolDefinition::new("double", "Doubles x")
                    .inputs(json!({"type": "object", "properties": {"x": {"type": "number"}}}))
                    .tags(["math"])
                    .http_method("get"),
                |arguments| {
                    let x = arguments["x"].as_f64().ok_or_else(|| AppError::invalid_arguments("x"))?;
                    Ok(json!(x * 2.0))
                },
            )
            .expect("register double");
        registry
    }

    #[test]
    fn manual_lists_tools_in_registration_order() {
        let mut registry = registry();
        registry
            .register(ToolDefinition::new("second", "Second tool"), |_| Ok(Value::Null))
            .expect("register second");

        let manual = registry.manual("http://host:9");
        assert_eq!(manual.protocol_version, PROTOCOL_VERSION);
        assert_eq!(manual.manual_version, "1.2.3");
        assert_eq!(registry.names(), vec!["double", "second"]);
        assert_eq!(manual.tools[0].tags, vec!["math"]);
        assert_eq!(manual.tools[0].tool_call_template.http_method, "GET");
        assert_eq!(manual.tools[0].tool_call_template.url, "http://host:9/tools/double");
        assert_eq!(manual.tools[1].tool_call_template.http_method, "POST");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry();
        let err = registry
            .register(ToolDefinition::new("double", "again"), |_| Ok(Value::Null))
            .err()
            .expect("duplicate");
        assert!(matches!(err, RegistryError::DuplicateTool(name) if name == "double"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn main_thread_tools_need_a_dispatcher() {
        let mut registry = ToolRegistry::new("1");
        let err = registry
            .register(ToolDefinition::new("ui", "touches UI").on_main_thread(), |_| Ok(Value::Null))
            .err()
            .expect("no dispatcher");
        assert!(matches!(err, RegistryError::MissingDispatcher(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn call_tool_runs_registered_function() {
        let result = registry()
            .call_tool("double", json!({"x": 21}))
            .await
            .expect("call succeeds");
        assert_eq!(result, json!(42.0));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = registry()
            .call_tool("triple", json!({}))
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, AppError::ToolNotFound { .. }));
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn main_thread_tools_run_on_the_host_thread() {
        let (dispatcher, queue) = main_thread::channel();
        let host = thread::Builder::new()
            .name("editor-main".to_string())
            .spawn(move || queue.run_blocking())
            .expect("spawn host thread");

        let mut registry = ToolRegistry::new("1").with_dispatcher(dispatcher);
        registry
            .register(
                ToolDefinition::new("where", "Reports the executing thread").on_main_thread(),
                |_| Ok(json!(thread::current().name())),
            )
            .expect("register where");

        let result = registry
            .call_tool("where", json!({}))
            .await
            .expect("call succeeds");
        assert_eq!(result, json!("editor-main"));

        drop(registry);
        host.join().expect("host thread exits");
    }
}
