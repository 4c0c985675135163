//! YAML parser for job definitions
//!
//! Parses, renders and validates job files. Templates are resolved before
//! deserialization, so every string field (and every `session` key) may use
//! `{{ env.NAME }}` or `{{ vars.name }}`.

use crate::connector::is_supported_format;
use crate::error::{Error, Result};
use crate::job::types::{JobDefinition, WriteSource};
use crate::template::{render_value, TemplateContext};
use crate::types::{JsonValue, WriteMode};
use crate::warehouse::{JdbcUrl, TableName};
use std::fs;
use std::path::Path;

/// Load a job definition from a file, resolving templates against the process environment
pub fn load_job(path: impl AsRef<Path>) -> Result<JobDefinition> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!("Failed to read job file '{}': {e}", path.display()))
        }
    })?;
    load_job_from_str(&content)
}

/// Load a job definition from a YAML string, resolving templates against the process environment
pub fn load_job_from_str(yaml: &str) -> Result<JobDefinition> {
    load_job_with_context(yaml, TemplateContext::from_process_env())
}

/// Load a job definition from a YAML string with an explicit template context
pub fn load_job_with_context(yaml: &str, mut ctx: TemplateContext) -> Result<JobDefinition> {
    let mut raw: JsonValue = serde_yaml::from_str(yaml)?;

    // Vars may reference the environment, everything else may reference vars
    let vars = match raw.as_object_mut().and_then(|doc| doc.remove("vars")) {
        Some(vars) => render_value(&vars, &ctx)?,
        None => JsonValue::Null,
    };
    ctx.set_vars(vars.clone());

    let mut rendered = render_value(&raw, &ctx)?;
    if let Some(doc) = rendered.as_object_mut() {
        doc.insert("vars".to_string(), vars);
    }

    let def: JobDefinition = serde_json::from_value(rendered)
        .map_err(|e| Error::config(format!("Invalid job definition: {e}")))?;

    validate_job(&def)?;
    Ok(def)
}

/// Validate a job definition
pub fn validate_job(def: &JobDefinition) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::config("Job name cannot be empty"));
    }

    // Session values are checked the same way the session builder checks them
    def.session_config()?;

    let warehouse = &def.warehouse;
    JdbcUrl::parse(&warehouse.url)?;
    if warehouse.temp_dir.trim().is_empty() {
        return Err(Error::missing_field("warehouse.temp_dir"));
    }
    if !is_supported_format(&warehouse.format) {
        return Err(Error::invalid_value(
            "warehouse.format",
            format!("unsupported format '{}'", warehouse.format),
        ));
    }

    if def.read.is_none() && def.write.is_none() {
        return Err(Error::config("Job must have a read or a write step"));
    }

    if let Some(read) = &def.read {
        match (&read.table, &read.query) {
            (Some(table), None) => {
                TableName::parse(table)?;
            }
            (None, Some(query)) if !query.trim().is_empty() => {}
            (Some(_), Some(_)) => {
                return Err(Error::config("Read step takes either 'table' or 'query', not both"))
            }
            _ => return Err(Error::config("Read step needs a 'table' or a 'query'")),
        }
    }

    if let Some(write) = &def.write {
        TableName::parse(&write.table)?;

        match &write.source {
            WriteSource::Range(range) => {
                if range.step == 0 {
                    return Err(Error::invalid_value("write.source.range.step", "must not be zero"));
                }
                if range.column.trim().is_empty() {
                    return Err(Error::missing_field("write.source.range.column"));
                }
            }
            WriteSource::Read => {
                if def.read.is_none() {
                    return Err(Error::config("Write source 'read' needs a read step"));
                }
            }
        }

        if write.mode == WriteMode::Overwrite && !write.confirm_overwrite {
            tracing::warn!(
                table = %write.table,
                "Overwrite is not confirmed; the write step will be refused"
            );
        }
    }

    Ok(())
}
