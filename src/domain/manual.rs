//! Tool manual documents served on discovery

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "1.0.1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UtcpManual {
    pub protocol_version: String,
    pub manual_version: String,
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub inputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub tool_call_template: HttpCallTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpCallTemplate {
    pub call_template_type: String,
    pub url: String,
    pub http_method: String,
    pub content_type: String,
}

impl HttpCallTemplate {
    pub fn http(base_url: &str, tool_name: &str, http_method: &str) -> Self {
        Self {
            call_template_type: "http".to_string(),
            url: format!("{}/tools/{tool_name}", base_url.trim_end_matches('/')),
            http_method: http_method.to_string(),
            content_type: "application/json".to_string(),
        }
    }
}
