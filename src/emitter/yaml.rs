//! YAML emitter

use super::Emitter;
use crate::errors::{EngineError, EngineResult};
use crate::evaluator::Value;

/// YAML output emitter
#[derive(Default)]
pub struct YamlEmitter;

impl YamlEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for YamlEmitter {
    fn emit(&self, value: &Value) -> EngineResult<String> {
        serde_yaml::to_string(&value.to_serde_json())
            .map_err(|e| EngineError::io_error(format!("failed to encode YAML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_nested() {
        let mut inner = IndexMap::new();
        inner.insert("region".to_string(), Value::from("us-east-1"));
        let mut outer = IndexMap::new();
        outer.insert("aws".to_string(), Value::Map(inner));
        outer.insert("zones".to_string(), Value::from(vec!["a", "b"]));

        let yaml = YamlEmitter::new().emit(&Value::Map(outer)).unwrap();
        assert_eq!(yaml, "aws:\n  region: us-east-1\nzones:\n- a\n- b\n");
    }
}
