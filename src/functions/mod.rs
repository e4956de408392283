//! Callable functions available to configuration expressions
//!
//! The registry is a static table from function name to a [`FunctionDef`]
//! describing its parameters and implementation. Arguments are evaluated
//! by the caller, then checked against the declared parameter types before
//! the implementation runs.

mod helpers;
mod stdlib;

use std::collections::HashMap;
use std::path::Path;

use crate::context::EvalContext;
use crate::errors::{suggestion_help, EngineError, EngineResult};
use crate::evaluator::Value;
use crate::lexer::token::SourceLocation;

pub use helpers::{
    find_in_parent_folders, TERRAFORM_COMMANDS_NEED_INPUT, TERRAFORM_COMMANDS_NEED_LOCKING,
    TERRAFORM_COMMANDS_NEED_PARALLELISM, TERRAFORM_COMMANDS_NEED_VARS,
};

/// Declared type of a function parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    /// Strings; numbers and bools are converted to their string form
    String,
    Number,
    Bool,
    List,
    Map,
}

impl ParamType {
    fn name(self) -> &'static str {
        match self {
            ParamType::Any => "any value",
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Map => "map",
        }
    }

    /// Check `value` against this type, applying the implicit
    /// primitive-to-string conversion
    fn coerce(self, value: Value) -> Result<Value, Value> {
        match (self, value) {
            (ParamType::Any, v) => Ok(v),
            (ParamType::String, v @ Value::String(_)) => Ok(v),
            (ParamType::String, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_string()))
            }
            (ParamType::Number, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
            (ParamType::Bool, v @ Value::Bool(_)) => Ok(v),
            (ParamType::List, v @ Value::List(_)) => Ok(v),
            (ParamType::Map, v @ Value::Map(_)) => Ok(v),
            (_, v) => Err(v),
        }
    }
}

/// Signature of a function implementation
pub type FunctionImpl = fn(&FunctionCall<'_>, Vec<Value>) -> EngineResult<Value>;

/// One registry entry
#[derive(Clone, Copy)]
pub struct FunctionDef {
    /// Required parameters, in order
    pub params: &'static [ParamType],
    /// Optional trailing parameters
    pub optional: &'static [ParamType],
    /// Type of any further arguments; `None` means no more are accepted
    pub variadic: Option<ParamType>,
    pub call: FunctionImpl,
}

impl FunctionDef {
    pub const fn fixed(params: &'static [ParamType], call: FunctionImpl) -> Self {
        Self {
            params,
            optional: &[],
            variadic: None,
            call,
        }
    }

    pub const fn with_optional(
        params: &'static [ParamType],
        optional: &'static [ParamType],
        call: FunctionImpl,
    ) -> Self {
        Self {
            params,
            optional,
            variadic: None,
            call,
        }
    }

    pub const fn variadic(
        params: &'static [ParamType],
        rest: ParamType,
        call: FunctionImpl,
    ) -> Self {
        Self {
            params,
            optional: &[],
            variadic: Some(rest),
            call,
        }
    }

    fn arity_text(&self) -> String {
        let min = self.params.len();
        let max = min + self.optional.len();
        match (self.variadic, min == max) {
            (Some(_), _) => format!("at least {}", min),
            (None, true) => min.to_string(),
            (None, false) => format!("{} to {}", min, max),
        }
    }

    fn param_type(&self, index: usize) -> Option<ParamType> {
        self.params
            .iter()
            .chain(self.optional.iter())
            .nth(index)
            .copied()
            .or(self.variadic)
    }
}

/// Everything an implementation may need about the call site
pub struct FunctionCall<'a> {
    pub name: &'a str,
    pub ctx: &'a EvalContext,
    pub location: &'a SourceLocation,
    pub source: &'a str,
}

impl FunctionCall<'_> {
    /// Build a function-evaluation error for this call
    pub fn fail(&self, message: impl Into<String>) -> EngineError {
        EngineError::function_failed(self.source, self.location, self.name, message)
    }

    /// Directory of the file being evaluated
    pub fn dir(&self) -> &Path {
        self.ctx.dir()
    }
}

/// Static table of callable functions
pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    /// The standard library plus the host-tool helpers
    pub fn standard() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        stdlib::register(&mut registry);
        helpers::register(&mut registry);
        registry
    }

    pub fn insert(&mut self, name: &'static str, def: FunctionDef) {
        self.functions.insert(name, def);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Sorted function names (for suggestions)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    /// Check arguments against the declared signature and run the function
    pub fn call(&self, call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
        let def = self.functions.get(call.name).ok_or_else(|| {
            EngineError::UnknownFunction {
                src: call.source.to_string(),
                span: call.location.span(),
                name: call.name.to_string(),
                help: suggestion_help(call.name, &self.names(), "functions"),
            }
        })?;

        let min = def.params.len();
        let max = min + def.optional.len();
        if args.len() < min || (def.variadic.is_none() && args.len() > max) {
            return Err(EngineError::ArgumentCount {
                src: call.source.to_string(),
                span: call.location.span(),
                function: call.name.to_string(),
                expected: def.arity_text(),
                found: args.len(),
            });
        }

        let mut checked = Vec::with_capacity(args.len());
        for (index, arg) in args.into_iter().enumerate() {
            let expected = def.param_type(index).unwrap_or(ParamType::Any);
            match expected.coerce(arg) {
                Ok(value) => checked.push(value),
                Err(value) => {
                    return Err(EngineError::type_mismatch(
                        call.source,
                        call.location,
                        expected.name(),
                        value.type_name(),
                        format!("argument {} of {}() must be a {}", index + 1, call.name, expected.name()),
                    ))
                }
            }
        }

        tracing::trace!(function = call.name, "calling function");
        (def.call)(call, checked)
    }
}

/// Unwrap a string argument already checked by the registry
pub(crate) fn string_arg(args: &[Value], index: usize) -> &str {
    args.get(index).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EvalContext, RunContext};
    use crate::options::EngineOptions;
    use std::sync::Arc;

    pub(crate) fn call_fn(name: &str, args: Vec<Value>) -> EngineResult<Value> {
        let ctx = EvalContext::new(
            Arc::new(EngineOptions::new("/tmp/live/terragrunt.hcl")),
            Arc::new(RunContext::new()),
        );
        let location = SourceLocation::new(None, 1, 1, 0, 1);
        let call = FunctionCall {
            name,
            ctx: &ctx,
            location: &location,
            source: "x",
        };
        ctx.functions().call(&call, args)
    }

    #[test]
    fn test_unknown_function_suggests() {
        match call_fn("uper", vec![Value::from("x")]) {
            Err(EngineError::UnknownFunction { help, .. }) => {
                assert_eq!(help, "did you mean 'upper'?");
            }
            other => panic!("expected unknown function, got {:?}", other),
        }
    }

    #[test]
    fn test_arity_checked() {
        assert!(matches!(
            call_fn("upper", vec![]),
            Err(EngineError::ArgumentCount { found: 0, .. })
        ));
        assert!(matches!(
            call_fn("upper", vec![Value::from("a"), Value::from("b")]),
            Err(EngineError::ArgumentCount { found: 2, .. })
        ));
    }

    #[test]
    fn test_types_checked_and_coerced() {
        assert!(matches!(
            call_fn("upper", vec![Value::List(vec![])]),
            Err(EngineError::TypeMismatch { .. })
        ));
        assert_eq!(
            call_fn("upper", vec![Value::Int(5)]).unwrap(),
            Value::from("5")
        );
    }
}
