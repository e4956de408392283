//! Emitters for evaluated values
//!
//! Converts evaluated Value trees to JSON, YAML, or HCL attribute syntax.
//! HCL output is what generated values files are written in.

mod hcl;
mod json;
mod yaml;

pub use hcl::HclEmitter;
pub use json::JsonEmitter;
pub use yaml::YamlEmitter;

use crate::errors::{EngineError, EngineResult};
use crate::evaluator::Value;

/// Output format for emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    JsonPretty,
    Yaml,
    Hcl,
}

impl OutputFormat {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "hcl" => Some(OutputFormat::Hcl),
            _ => None,
        }
    }
}

/// Trait for output emitters
pub trait Emitter {
    /// Emit a value to string
    fn emit(&self, value: &Value) -> EngineResult<String>;

    /// Emit a value to a writer
    fn emit_to_writer<W: std::io::Write>(&self, value: &Value, writer: &mut W) -> EngineResult<()> {
        let output = self.emit(value)?;
        writer
            .write_all(output.as_bytes())
            .map_err(|e| EngineError::io_error(e.to_string()))
    }
}

/// Emit a value to a string in the specified format
pub fn emit(value: &Value, format: OutputFormat) -> EngineResult<String> {
    match format {
        OutputFormat::Json => JsonEmitter::new(false).emit(value),
        OutputFormat::JsonPretty => JsonEmitter::new(true).emit(value),
        OutputFormat::Yaml => YamlEmitter::new().emit(value),
        OutputFormat::Hcl => HclEmitter::new().emit(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        let mut map = IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        Value::Map(map)
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("yml"), Some(OutputFormat::Yaml));
        assert_eq!(
            OutputFormat::parse("json-pretty"),
            Some(OutputFormat::JsonPretty)
        );
        assert_eq!(OutputFormat::parse("hcl"), Some(OutputFormat::Hcl));
        assert_eq!(OutputFormat::parse("toml"), None);
    }

    #[test]
    fn test_emit_json() {
        let value = obj(&[("name", Value::from("test"))]);
        let json = emit(&value, OutputFormat::Json).unwrap();
        assert_eq!(json, r#"{"name":"test"}"#);
    }

    #[test]
    fn test_emit_yaml() {
        let value = obj(&[("name", Value::from("test"))]);
        let yaml = emit(&value, OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("name: test"));
    }

    #[test]
    fn test_emit_hcl() {
        let value = obj(&[("name", Value::from("test"))]);
        assert_eq!(emit(&value, OutputFormat::Hcl).unwrap(), "name = \"test\"\n");
    }
}
