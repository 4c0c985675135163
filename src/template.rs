//! Template interpolation for job files
//!
//! Handles `{{ variable }}` interpolation in job definitions, so that secrets
//! never have to be written into the file itself. Two roots are available:
//! `{{ env.NAME }}` reads an environment variable and `{{ vars.path }}` reads
//! a value from the job's `vars` block.

use crate::error::{Error, Result};
use crate::types::StringMap;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}")
        .expect("template regex is valid")
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Explicit environment values (checked before the process environment)
    pub env: StringMap,
    /// Job variables
    pub vars: Value,
    /// Whether to fall back to the process environment
    inherit_env: bool,
}

impl TemplateContext {
    /// Create a new empty context that does not see the process environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context backed by the process environment
    pub fn from_process_env() -> Self {
        Self {
            inherit_env: true,
            ..Default::default()
        }
    }

    /// Set an environment value
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set job variables
    pub fn set_vars(&mut self, vars: Value) -> &mut Self {
        self.vars = vars;
        self
    }

    /// Get a value by path (e.g., "env.SQLDW_PASSWORD" or "vars.account")
    pub fn get(&self, path: &str) -> Option<String> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["env", name] => self.env.get(*name).cloned().or_else(|| {
                if self.inherit_env {
                    std::env::var(name).ok()
                } else {
                    None
                }
            }),
            ["vars", rest @ ..] if !rest.is_empty() => {
                get_nested_value(&self.vars, rest).map(value_to_string)
            }
            // Bare names resolve against vars
            _ => get_nested_value(&self.vars, &parts).map(value_to_string),
        }
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        match current {
            Value::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut result = template.to_string();
    let mut errors = Vec::new();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let (Some(full_match), Some(var_path)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        match ctx.get(var_path.as_str()) {
            Some(replacement) => {
                result = result.replace(full_match.as_str(), &replacement);
            }
            None => errors.push(var_path.as_str().to_string()),
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render all string values in a JSON object/value
pub fn render_value(value: &Value, ctx: &TemplateContext) -> Result<Value> {
    match value {
        Value::String(s) => {
            if has_templates(s) {
                Ok(Value::String(render(s, ctx)?))
            } else {
                Ok(value.clone())
            }
        }
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (k, v) in map {
                // Keys carry templates too, e.g. account-scoped session keys
                let new_key = if has_templates(k) {
                    render(k, ctx)?
                } else {
                    k.clone()
                };
                new_map.insert(new_key, render_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => {
            let new_arr: Result<Vec<Value>> = arr.iter().map(|v| render_value(v, ctx)).collect();
            Ok(Value::Array(new_arr?))
        }
        _ => Ok(value.clone()),
    }
}
