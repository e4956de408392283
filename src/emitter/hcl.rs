//! HCL attribute emitter
//!
//! Renders a top-level map as one `key = value` assignment per entry,
//! which is the format generated values files use.

use super::Emitter;
use crate::errors::{EngineError, EngineResult};
use crate::evaluator::Value;

/// HCL output emitter
pub struct HclEmitter {
    /// Indentation string (spaces or tabs)
    indent: String,
}

impl Default for HclEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl HclEmitter {
    pub fn new() -> Self {
        Self {
            indent: "  ".to_string(),
        }
    }

    fn emit_value(&self, value: &Value, depth: usize) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            // HCL has no literal for NaN or infinity
            Value::Float(n) if !n.is_finite() => "null".to_string(),
            Value::Float(_) => value.to_string(),
            Value::String(s) => self.escape_string(s),
            Value::List(items) => self.emit_list(items, depth),
            Value::Map(map) => self.emit_map(map, depth),
        }
    }

    fn emit_list(&self, items: &[Value], depth: usize) -> String {
        if items.is_empty() {
            return "[]".to_string();
        }
        if items.iter().all(Value::is_primitive) {
            let rendered: Vec<_> = items.iter().map(|v| self.emit_value(v, depth)).collect();
            return format!("[{}]", rendered.join(", "));
        }

        let inner_indent = self.indent.repeat(depth + 1);
        let mut result = String::from("[\n");
        for item in items {
            result.push_str(&inner_indent);
            result.push_str(&self.emit_value(item, depth + 1));
            result.push_str(",\n");
        }
        result.push_str(&self.indent.repeat(depth));
        result.push(']');
        result
    }

    fn emit_map(&self, map: &indexmap::IndexMap<String, Value>, depth: usize) -> String {
        if map.is_empty() {
            return "{}".to_string();
        }
        let inner_indent = self.indent.repeat(depth + 1);
        let mut result = String::from("{\n");
        for (key, value) in map {
            result.push_str(&inner_indent);
            result.push_str(&self.escape_key(key));
            result.push_str(" = ");
            result.push_str(&self.emit_value(value, depth + 1));
            result.push('\n');
        }
        result.push_str(&self.indent.repeat(depth));
        result.push('}');
        result
    }

    /// Keys that are valid identifiers are written bare
    fn escape_key(&self, key: &str) -> String {
        if is_identifier(key) {
            key.to_string()
        } else {
            self.escape_string(key)
        }
    }

    /// Quote a string, escaping template sequences so they stay literal
    fn escape_string(&self, s: &str) -> String {
        let mut result = String::with_capacity(s.len() + 2);
        result.push('"');
        let mut chars = s.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '"' => result.push_str("\\\""),
                '\\' => result.push_str("\\\\"),
                '\n' => result.push_str("\\n"),
                '\r' => result.push_str("\\r"),
                '\t' => result.push_str("\\t"),
                '$' | '%' if chars.peek() == Some(&'{') => {
                    result.push(ch);
                    result.push(ch);
                }
                c if c.is_control() => result.push_str(&format!("\\u{:04x}", c as u32)),
                c => result.push(c),
            }
        }
        result.push('"');
        result
    }
}

impl Emitter for HclEmitter {
    fn emit(&self, value: &Value) -> EngineResult<String> {
        let Value::Map(map) = value else {
            return Err(EngineError::io_error(format!(
                "HCL output requires a top-level map, found {}",
                value.type_name()
            )));
        };

        let mut result = String::new();
        for (key, value) in map {
            if !is_identifier(key) {
                return Err(EngineError::invalid_declaration(format!(
                    "'{}' cannot be used as an HCL attribute name",
                    key
                )));
            }
            result.push_str(key);
            result.push_str(" = ");
            result.push_str(&self.emit_value(value, 0));
            result.push('\n');
        }
        Ok(result)
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nested_values() {
        let mut tags = IndexMap::new();
        tags.insert("Name".to_string(), Value::from("web"));
        tags.insert("cost center".to_string(), Value::Int(42));
        let mut values = IndexMap::new();
        values.insert("zones".to_string(), Value::from(vec!["a", "b"]));
        values.insert("tags".to_string(), Value::Map(tags));
        values.insert("ratio".to_string(), Value::Float(0.5));

        let hcl = HclEmitter::new().emit(&Value::Map(values)).unwrap();
        assert_eq!(
            hcl,
            "zones = [\"a\", \"b\"]\ntags = {\n  Name = \"web\"\n  \"cost center\" = 42\n}\nratio = 0.5\n"
        );
    }

    #[test]
    fn test_template_sequences_escaped() {
        let mut values = IndexMap::new();
        values.insert("s".to_string(), Value::from("${literal} \"q\"\n"));
        let hcl = HclEmitter::new().emit(&Value::Map(values)).unwrap();
        assert_eq!(hcl, "s = \"$${literal} \\\"q\\\"\\n\"\n");
    }

    #[test]
    fn test_top_level_keys_must_be_identifiers() {
        let mut values = IndexMap::new();
        values.insert("cost center".to_string(), Value::Int(42));
        let err = HclEmitter::new().emit(&Value::Map(values)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDeclaration { .. }));
        assert!(err.to_string().contains("'cost center'"));
    }

    #[test]
    fn test_requires_map() {
        assert!(HclEmitter::new().emit(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_output_parses_back() {
        let mut values = IndexMap::new();
        values.insert(
            "list".to_string(),
            Value::List(vec![Value::empty_map(), Value::from("x")]),
        );
        let hcl = HclEmitter::new().emit(&Value::Map(values)).unwrap();
        assert!(crate::parser::parse(&hcl, "values.hcl").is_ok());
    }
}
