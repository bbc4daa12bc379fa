use std::path::Path;

use interpreter::{Map, RuntimeValue};

/// Load a merge context from a TOML or JSON file, chosen by extension.
pub fn load_context(path: &Path) -> Result<Map, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;

    let value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let json: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| format!("JSON parse error in '{}': {}", path.display(), e))?;
            from_json(&json)
        }
        Some("toml") => {
            let table: toml::Table = toml::from_str(&content)
                .map_err(|e| format!("TOML parse error in '{}': {}", path.display(), e))?;
            from_toml_table(&table)
        }
        _ => {
            return Err(format!(
                "unsupported context file '{}' (expected .toml or .json)",
                path.display()
            ));
        }
    };

    match value {
        RuntimeValue::Map(map) => Ok(map),
        other => Err(format!(
            "context in '{}' must be a table, found {}",
            path.display(),
            other.type_name()
        )),
    }
}

pub fn from_toml_table(table: &toml::Table) -> RuntimeValue {
    RuntimeValue::Map(
        table
            .iter()
            .map(|(k, v)| (k.clone(), from_toml(v)))
            .collect(),
    )
}

pub fn from_toml(value: &toml::Value) -> RuntimeValue {
    match value {
        toml::Value::String(s) => RuntimeValue::String(s.clone()),
        toml::Value::Integer(n) => RuntimeValue::Integer(*n),
        toml::Value::Float(f) => RuntimeValue::Float(*f),
        toml::Value::Boolean(b) => RuntimeValue::Boolean(*b),
        toml::Value::Datetime(d) => RuntimeValue::String(d.to_string()),
        toml::Value::Array(items) => RuntimeValue::List(items.iter().map(from_toml).collect()),
        toml::Value::Table(table) => from_toml_table(table),
    }
}

pub fn from_json(value: &serde_json::Value) -> RuntimeValue {
    match value {
        serde_json::Value::Null => RuntimeValue::Nil,
        serde_json::Value::Bool(b) => RuntimeValue::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => RuntimeValue::Integer(i),
            None => RuntimeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => RuntimeValue::String(s.clone()),
        serde_json::Value::Array(items) => RuntimeValue::List(items.iter().map(from_json).collect()),
        serde_json::Value::Object(entries) => RuntimeValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}
