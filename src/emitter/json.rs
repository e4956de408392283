//! JSON emitter

use super::Emitter;
use crate::errors::{EngineError, EngineResult};
use crate::evaluator::Value;

/// JSON output emitter
pub struct JsonEmitter {
    /// Whether to pretty-print with indentation
    pretty: bool,
}

impl JsonEmitter {
    /// Create a new JSON emitter
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl Emitter for JsonEmitter {
    fn emit(&self, value: &Value) -> EngineResult<String> {
        let json = value.to_serde_json();
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        rendered.map_err(|e| EngineError::io_error(format!("failed to encode JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_key_order_kept() {
        let mut map = IndexMap::new();
        map.insert("zeta".to_string(), Value::Int(1));
        map.insert("alpha".to_string(), Value::from(vec!["a"]));
        let json = JsonEmitter::new(false).emit(&Value::Map(map)).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":["a"]}"#);
    }

    #[test]
    fn test_pretty() {
        let json = JsonEmitter::new(true)
            .emit(&Value::from(vec![1i64, 2]))
            .unwrap();
        assert_eq!(json, "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_non_finite_float_is_null() {
        let json = JsonEmitter::new(false).emit(&Value::Float(f64::NAN)).unwrap();
        assert_eq!(json, "null");
    }
}
