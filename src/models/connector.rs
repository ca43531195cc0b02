use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "connector_method", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectorMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ConnectorMethod {
    pub fn as_http_method(&self) -> reqwest::Method {
        match self {
            ConnectorMethod::Get => reqwest::Method::GET,
            ConnectorMethod::Post => reqwest::Method::POST,
            ConnectorMethod::Put => reqwest::Method::PUT,
            ConnectorMethod::Patch => reqwest::Method::PATCH,
            ConnectorMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single parameter accepted by a connector, exposed as a typed LLM
/// tool-function argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ConnectorParamType,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorParamType {
    Str,
    Number,
    Bool,
}

/// A caller-configured HTTP endpoint exposed to the LLM as a typed tool
/// function. The endpoint must resolve to a non-private address at
/// create time (same SSRF guard the indexing pipeline applies to URLs).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Connector {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub datasource_id: Uuid,
    pub name: String,
    pub purpose: Option<String>,
    pub endpoint: String,
    pub method: ConnectorMethod,
    pub parameter_schema: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateConnectorRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub purpose: Option<String>,
    #[validate(url)]
    pub endpoint: String,
    pub method: ConnectorMethod,
    pub parameters: Vec<ConnectorParameter>,
}

/// Convert a connector name into a valid tool-function identifier:
/// lowercase, non-alphanumeric runs collapse to `_`, a leading digit gets
/// a `_` prefix. Collision resolution (short random suffix) is the
/// caller's responsibility since it requires the full set of in-scope names.
pub fn connector_function_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_').to_string();
    let base = if trimmed.is_empty() { "connector".to_string() } else { trimmed };
    if base.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("_{base}")
    } else {
        base
    }
}

fn parameter_type_schema(param_type: ConnectorParamType) -> &'static str {
    match param_type {
        ConnectorParamType::Str => "string",
        ConnectorParamType::Number => "number",
        ConnectorParamType::Bool => "boolean",
    }
}

/// Builds a JSON Schema `input_schema` object for a connector's
/// parameters, as required by the tool-use `ToolSpec` offered to the
/// model (sec 4.7 BUILD_TOOLS).
pub fn parameters_to_json_schema(parameters: &[ConnectorParameter]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for param in parameters {
        let mut entry = serde_json::Map::new();
        entry.insert("type".to_string(), json!(parameter_type_schema(param.param_type)));
        if let Some(description) = &param.description {
            entry.insert("description".to_string(), json!(description));
        }
        properties.insert(param.name.clone(), Value::Object(entry));
        if param.required {
            required.push(param.name.clone());
        }
    }
    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_to_json_schema_marks_required_fields() {
        let parameters = vec![
            ConnectorParameter {
                name: "ticket_id".to_string(),
                param_type: ConnectorParamType::Str,
                required: true,
                description: Some("the ticket identifier".to_string()),
            },
            ConnectorParameter {
                name: "verbose".to_string(),
                param_type: ConnectorParamType::Bool,
                required: false,
                description: None,
            },
        ];
        let schema = parameters_to_json_schema(&parameters);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["ticket_id"]["type"], "string");
        assert_eq!(schema["properties"]["verbose"]["type"], "boolean");
        assert_eq!(schema["required"], json!(["ticket_id"]));
    }

    #[test]
    fn function_name_lowercases_and_collapses_punctuation() {
        assert_eq!(connector_function_name("Ticket Lookup!!"), "ticket_lookup");
    }

    #[test]
    fn function_name_prefixes_leading_digit() {
        assert_eq!(connector_function_name("2fa-check"), "_2fa_check");
    }

    #[test]
    fn function_name_falls_back_when_empty() {
        assert_eq!(connector_function_name("!!!"), "connector");
    }
}
