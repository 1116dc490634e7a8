//! Demo tools registered by the binary

use std::thread;

use serde_json::{json, Value};

use crate::domain::tools::{ToolDefinition, ToolRegistry};
use crate::domain::utils::{number_argument, number_to_json, object_arguments, optional_string_argument};
use crate::errors::{AppError, RegistryError};

pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry
        .register(
            ToolDefinition::new("echo", "Returns the arguments it was called with")
                .inputs(json!({"type": "object", "additionalProperties": true}))
                .tags(["demo"]),
            echo,
        )?
        .register(
            ToolDefinition::new("add", "Adds two numbers")
                .inputs(json!({
                    "type": "object",
                    "properties": {
                        "a": {"type": "number"},
                        "b": {"type": "number"}
                    },
                    "required": ["a", "b"]
                }))
                .outputs(json!({"type": "number"}))
                .tags(["demo", "math"])
                .http_method("GET"),
            add,
        )?
        .register(
            ToolDefinition::new(
                "host_info",
                "Reports the host thread that executed the call and the bridge version",
            )
            .inputs(json!({
                "type": "object",
                "properties": {"label": {"type": "string"}}
            }))
            .outputs(json!({
                "type": "object",
                "properties": {
                    "thread": {"type": "string"},
                    "version": {"type": "string"},
                    "label": {"type": "string"}
                }
            }))
            .tags(["demo", "host"])
            .on_main_thread(),
            host_info,
        )?;
    Ok(())
}

fn echo(arguments: Value) -> Result<Value, AppError> {
    object_arguments(&arguments)?;
    Ok(arguments)
}

fn add(arguments: Value) -> Result<Value, AppError> {
    let a = number_argument(&arguments, "a")?;
    let b = number_argument(&arguments, "b")?;
    Ok(number_to_json(a + b))
}

fn host_info(arguments: Value) -> Result<Value, AppError> {
    let label = optional_string_argument(&arguments, "label")?;
    Ok(json!({
        "thread": thread::current().name().unwrap_or("unnamed"),
        "version": env!("CARGO_PKG_VERSION"),
        "label": label,
    }))
}
