//! Expression evaluator
//!
//! The evaluator turns one parsed expression into a [`Value`] against an
//! [`EvalContext`]. It handles:
//! - Root variables and attribute/index traversals
//! - String templates
//! - Arithmetic, comparison and logical operators
//! - Conditionals and for-expressions
//! - Function calls through the context's registry

pub mod scope;
pub mod value;

use indexmap::IndexMap;

use crate::context::EvalContext;
use crate::errors::{suggestion_help, EngineError, EngineResult};
use crate::functions::FunctionCall;
use crate::lexer::token::SourceLocation;
use crate::parser::ast::*;

pub use scope::{Scope, ScopeStack};
pub use value::Value;

/// Maximum expression nesting depth before the evaluator bails out
const MAX_EVAL_DEPTH: usize = 128;

/// Evaluate `expr` in `ctx`. `source` is the text of the file the
/// expression was parsed from.
pub fn evaluate(expr: &Expr, ctx: &EvalContext, source: &str) -> EngineResult<Value> {
    Evaluator::new(ctx, source).eval_expr(expr)
}

/// Evaluator for one expression tree
pub struct Evaluator<'a> {
    ctx: &'a EvalContext,
    /// Root variables plus for-expression bindings
    scopes: ScopeStack,
    /// Source code (for error messages)
    source: &'a str,
    /// Current recursion depth
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a EvalContext, source: &'a str) -> Self {
        let mut global = Scope::new();
        for (name, value) in ctx.variables() {
            global.define(name.clone(), value.clone());
        }
        Self {
            ctx,
            scopes: ScopeStack::new(global),
            source,
            depth: 0,
        }
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> EngineResult<Value> {
        self.depth += 1;
        if self.depth > MAX_EVAL_DEPTH {
            self.depth -= 1;
            return Err(EngineError::RecursionLimitExceeded {
                src: self.source.to_string(),
                span: expr.location().span(),
                limit: MAX_EVAL_DEPTH,
            });
        }
        let result = self.eval_expr_inner(expr);
        self.depth -= 1;
        result
    }

    fn eval_expr_inner(&mut self, expr: &Expr) -> EngineResult<Value> {
        match expr {
            Expr::Null(_) => Ok(Value::Null),
            Expr::Bool(b, _) => Ok(Value::Bool(*b)),
            Expr::Integer(n, _) => Ok(Value::Int(*n)),
            Expr::Float(n, _) => Ok(Value::Float(*n)),
            Expr::Template(t) => self.eval_template(t),
            Expr::Variable(name, loc) => self.eval_variable(name, loc),
            Expr::Traversal(t) => self.eval_traversal(t),
            Expr::Array(arr) => {
                let mut result = Vec::with_capacity(arr.elements.len());
                for elem in &arr.elements {
                    result.push(self.eval_expr(elem)?);
                }
                Ok(Value::List(result))
            }
            Expr::Object(obj) => self.eval_object(obj),
            Expr::Call(call) => self.eval_call(call),
            Expr::Binary(bin) => self.eval_binary(bin),
            Expr::Unary(unary) => self.eval_unary(unary),
            Expr::Conditional(cond) => self.eval_conditional(cond),
            Expr::For(for_expr) => self.eval_for(for_expr),
            Expr::Paren(inner, _) => self.eval_expr(inner),
        }
    }

    /// Evaluate a template. A template that is exactly one interpolation
    /// yields the interpolated value as-is.
    fn eval_template(&mut self, template: &TemplateExpr) -> EngineResult<Value> {
        if let Some(inner) = template.single_interpolation() {
            return self.eval_expr(inner);
        }

        let mut result = String::new();
        for part in &template.parts {
            match part {
                TemplatePart::Literal(s) => result.push_str(s),
                TemplatePart::Interpolation(e) => {
                    let value = self.eval_expr(e)?;
                    match value.to_template_string() {
                        Some(s) => result.push_str(&s),
                        None => {
                            return Err(EngineError::type_mismatch(
                                self.source,
                                e.location(),
                                "string",
                                value.type_name(),
                                format!(
                                    "a {} cannot be interpolated into a string; use jsonencode() or join()",
                                    value.type_name()
                                ),
                            ))
                        }
                    }
                }
            }
        }
        Ok(Value::String(result))
    }

    fn eval_variable(&self, name: &str, loc: &SourceLocation) -> EngineResult<Value> {
        match self.scopes.get(name) {
            Some(value) => Ok(value.clone()),
            None => {
                let available = self.scopes.available_names();
                Err(EngineError::undefined_variable(
                    self.source,
                    loc,
                    name,
                    suggestion_help(name, &available, "variables"),
                ))
            }
        }
    }

    /// Walk `base.attr[index]...`, naming the path walked so far in errors
    fn eval_traversal(&mut self, traversal: &TraversalExpr) -> EngineResult<Value> {
        let mut path = match traversal.base.as_ref() {
            Expr::Variable(name, _) => name.clone(),
            _ => "value".to_string(),
        };
        let mut current = self.eval_expr(&traversal.base)?;

        for step in &traversal.steps {
            current = match step {
                TraversalStep::Attr(name) => {
                    let parent = path.clone();
                    path.push('.');
                    path.push_str(name);
                    match current {
                        Value::Map(mut map) => match map.swap_remove(name) {
                            Some(value) => value,
                            None => {
                                let keys: Vec<String> = map.keys().cloned().collect();
                                return Err(EngineError::undefined_variable(
                                    self.source,
                                    &traversal.location,
                                    path,
                                    suggestion_help(name, &keys, &format!("attributes of {}", parent)),
                                ));
                            }
                        },
                        other => {
                            return Err(EngineError::type_mismatch(
                                self.source,
                                &traversal.location,
                                "map",
                                other.type_name(),
                                format!("cannot access .{} on {} ({})", name, parent, other.type_name()),
                            ))
                        }
                    }
                }
                TraversalStep::Index(index_expr) => {
                    let index = self.eval_expr(index_expr)?;
                    self.index_value(current, &index, &mut path, &traversal.location)?
                }
            };
        }

        Ok(current)
    }

    fn index_value(
        &self,
        current: Value,
        index: &Value,
        path: &mut String,
        loc: &SourceLocation,
    ) -> EngineResult<Value> {
        match current {
            Value::List(mut list) => {
                let Some(i) = index.as_int() else {
                    return Err(EngineError::type_mismatch(
                        self.source,
                        loc,
                        "number",
                        index.type_name(),
                        format!("{} is a list and must be indexed by a number", path),
                    ));
                };
                path.push_str(&format!("[{}]", i));
                if i < 0 || i as usize >= list.len() {
                    return Err(EngineError::type_mismatch(
                        self.source,
                        loc,
                        format!("index < {}", list.len()),
                        i.to_string(),
                        format!("{} is out of range", path),
                    ));
                }
                Ok(list.swap_remove(i as usize))
            }
            Value::Map(mut map) => {
                let Some(key) = index.to_template_string().filter(|_| !index.is_null()) else {
                    return Err(EngineError::type_mismatch(
                        self.source,
                        loc,
                        "string",
                        index.type_name(),
                        format!("{} is a map and must be indexed by a string", path),
                    ));
                };
                path.push_str(&format!("[\"{}\"]", key));
                match map.swap_remove(&key) {
                    Some(value) => Ok(value),
                    None => Err(EngineError::undefined_variable(
                        self.source,
                        loc,
                        path.clone(),
                        format!("the map has no key \"{}\"", key),
                    )),
                }
            }
            other => Err(EngineError::type_mismatch(
                self.source,
                loc,
                "list or map",
                other.type_name(),
                format!("cannot index {} ({})", path, other.type_name()),
            )),
        }
    }

    fn eval_object(&mut self, obj: &ObjectExpr) -> EngineResult<Value> {
        let mut result = IndexMap::new();
        for item in &obj.items {
            let key = match &item.key {
                ObjectKey::Ident(name) => name.clone(),
                ObjectKey::Expr(e) => self.eval_key(e)?,
            };
            let value = self.eval_expr(&item.value)?;
            result.insert(key, value);
        }
        Ok(Value::Map(result))
    }

    /// Evaluate an expression used as a map key
    fn eval_key(&mut self, expr: &Expr) -> EngineResult<String> {
        let key = self.eval_expr(expr)?;
        match key {
            Value::Null | Value::List(_) | Value::Map(_) => Err(EngineError::type_mismatch(
                self.source,
                expr.location(),
                "string",
                key.type_name(),
                "map keys must be strings",
            )),
            other => Ok(other.to_template_string().unwrap_or_default()),
        }
    }

    fn eval_call(&mut self, call: &CallExpr) -> EngineResult<Value> {
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.eval_expr(arg)?);
        }

        if call.expand_final {
            match args.pop() {
                Some(Value::List(items)) => args.extend(items),
                Some(other) => {
                    let loc = call.args.last().map(Expr::location).unwrap_or(&call.location);
                    return Err(EngineError::type_mismatch(
                        self.source,
                        loc,
                        "list",
                        other.type_name(),
                        "only a list can be expanded with '...'",
                    ));
                }
                None => {}
            }
        }

        let function_call = FunctionCall {
            name: &call.name,
            ctx: self.ctx,
            location: &call.location,
            source: self.source,
        };
        self.ctx.functions().call(&function_call, args)
    }

    fn eval_binary(&mut self, bin: &BinaryExpr) -> EngineResult<Value> {
        // && and || short-circuit
        match bin.op {
            BinaryOp::And => {
                if !self.eval_bool(&bin.left, "&&")? {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval_bool(&bin.right, "&&")?));
            }
            BinaryOp::Or => {
                if self.eval_bool(&bin.left, "||")? {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval_bool(&bin.right, "||")?));
            }
            _ => {}
        }

        let left = self.eval_expr(&bin.left)?;
        let right = self.eval_expr(&bin.right)?;

        match bin.op {
            BinaryOp::Eq => Ok(Value::Bool(left.equals(&right))),
            BinaryOp::NotEq => Ok(Value::Bool(!left.equals(&right))),
            BinaryOp::Lt => self.eval_comparison(&left, &right, bin, |a, b| a < b),
            BinaryOp::Gt => self.eval_comparison(&left, &right, bin, |a, b| a > b),
            BinaryOp::LtEq => self.eval_comparison(&left, &right, bin, |a, b| a <= b),
            BinaryOp::GtEq => self.eval_comparison(&left, &right, bin, |a, b| a >= b),
            BinaryOp::Add => self.eval_arithmetic(&left, &right, bin, i64::checked_add, |a, b| a + b),
            BinaryOp::Sub => self.eval_arithmetic(&left, &right, bin, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => self.eval_arithmetic(&left, &right, bin, i64::checked_mul, |a, b| a * b),
            BinaryOp::Div => {
                let divisor = self.numeric_operand(&right, bin)?;
                if divisor.to_number() == Some(0.0) {
                    return Err(EngineError::DivisionByZero {
                        src: self.source.to_string(),
                        span: bin.location.span(),
                    });
                }
                let dividend = self.numeric_operand(&left, bin)?;
                match (&dividend, &divisor) {
                    // Integer division only when it is exact
                    (Value::Int(a), Value::Int(b)) if a.checked_rem(*b) == Some(0) => {
                        self.eval_arithmetic(&dividend, &divisor, bin, i64::checked_div, |a, b| a / b)
                    }
                    _ => Ok(Value::Float(
                        dividend.to_number().unwrap_or_default()
                            / divisor.to_number().unwrap_or_default(),
                    )),
                }
            }
            BinaryOp::Mod => {
                let divisor = self.numeric_operand(&right, bin)?;
                if divisor.to_number() == Some(0.0) {
                    return Err(EngineError::DivisionByZero {
                        src: self.source.to_string(),
                        span: bin.location.span(),
                    });
                }
                self.eval_arithmetic(&left, &divisor, bin, i64::checked_rem, |a, b| a % b)
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    /// Operands of arithmetic must be numbers; numeric strings are
    /// converted
    fn numeric_operand(&self, value: &Value, bin: &BinaryExpr) -> EngineResult<Value> {
        match value {
            Value::Int(_) | Value::Float(_) => Ok(value.clone()),
            Value::String(s) => parse_number(s.trim()).ok_or_else(|| {
                EngineError::type_mismatch(
                    self.source,
                    &bin.location,
                    "number",
                    "string",
                    format!("\"{}\" is not a number; operator {} needs numbers", s, bin.op),
                )
            }),
            other => Err(EngineError::type_mismatch(
                self.source,
                &bin.location,
                "number",
                other.type_name(),
                format!("operator {} needs numbers", bin.op),
            )),
        }
    }

    /// Shared numeric arithmetic: checked for two integers, float otherwise
    fn eval_arithmetic(
        &self,
        left: &Value,
        right: &Value,
        bin: &BinaryExpr,
        checked_int: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> EngineResult<Value> {
        let left = self.numeric_operand(left, bin)?;
        let right = self.numeric_operand(right, bin)?;
        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                checked_int(*a, *b)
                    .map(Value::Int)
                    .ok_or_else(|| EngineError::ArithmeticOverflow {
                        src: self.source.to_string(),
                        span: bin.location.span(),
                        operation: format!("{} {} {}", a, bin.op, b),
                    })
            }
            _ => Ok(Value::Float(float_op(
                left.to_number().unwrap_or_default(),
                right.to_number().unwrap_or_default(),
            ))),
        }
    }

    fn eval_comparison(
        &self,
        left: &Value,
        right: &Value,
        bin: &BinaryExpr,
        op: fn(f64, f64) -> bool,
    ) -> EngineResult<Value> {
        let left = self.numeric_operand(left, bin)?;
        let right = self.numeric_operand(right, bin)?;
        Ok(Value::Bool(op(
            left.to_number().unwrap_or_default(),
            right.to_number().unwrap_or_default(),
        )))
    }

    /// Evaluate an operand that must be a bool. The strings "true" and
    /// "false" are accepted.
    fn eval_bool(&mut self, expr: &Expr, context: &str) -> EngineResult<bool> {
        let value = self.eval_expr(expr)?;
        match value {
            Value::Bool(b) => Ok(b),
            Value::String(ref s) if s == "true" => Ok(true),
            Value::String(ref s) if s == "false" => Ok(false),
            other => Err(EngineError::type_mismatch(
                self.source,
                expr.location(),
                "bool",
                other.type_name(),
                format!("{} requires a bool", context),
            )),
        }
    }

    fn eval_unary(&mut self, unary: &UnaryExpr) -> EngineResult<Value> {
        match unary.op {
            UnaryOp::Not => Ok(Value::Bool(!self.eval_bool(&unary.operand, "!")?)),
            UnaryOp::Neg => {
                let operand = self.eval_expr(&unary.operand)?;
                match operand {
                    Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| {
                        EngineError::ArithmeticOverflow {
                            src: self.source.to_string(),
                            span: unary.location.span(),
                            operation: format!("-{}", n),
                        }
                    }),
                    Value::Float(n) => Ok(Value::Float(-n)),
                    other => Err(EngineError::type_mismatch(
                        self.source,
                        &unary.location,
                        "number",
                        other.type_name(),
                        "unary minus requires a number",
                    )),
                }
            }
        }
    }

    fn eval_conditional(&mut self, cond: &ConditionalExpr) -> EngineResult<Value> {
        if self.eval_bool(&cond.condition, "a conditional")? {
            self.eval_expr(&cond.then_expr)
        } else {
            self.eval_expr(&cond.else_expr)
        }
    }

    /// `[for k, v in coll : expr if cond]` and `{for k, v in coll : k => v}`
    fn eval_for(&mut self, for_expr: &ForExpr) -> EngineResult<Value> {
        let collection = self.eval_expr(&for_expr.collection)?;
        let pairs: Vec<(Value, Value)> = match collection {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v))
                .collect(),
            Value::Map(map) => {
                let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), v))
                    .collect()
            }
            other => {
                return Err(EngineError::type_mismatch(
                    self.source,
                    for_expr.collection.location(),
                    "list or map",
                    other.type_name(),
                    "a for expression needs a collection to iterate",
                ))
            }
        };

        let mut list = Vec::new();
        let mut object: IndexMap<String, Value> = IndexMap::new();

        for (key, value) in pairs {
            self.scopes.push();
            if let Some(key_var) = &for_expr.key_var {
                self.scopes.define(key_var.clone(), key);
            }
            self.scopes.define(for_expr.value_var.clone(), value);

            let result = self.eval_for_item(for_expr, &mut list, &mut object);
            self.scopes.pop();
            result?;
        }

        if for_expr.key_expr.is_some() {
            Ok(Value::Map(object))
        } else {
            Ok(Value::List(list))
        }
    }

    fn eval_for_item(
        &mut self,
        for_expr: &ForExpr,
        list: &mut Vec<Value>,
        object: &mut IndexMap<String, Value>,
    ) -> EngineResult<()> {
        if let Some(condition) = &for_expr.condition {
            if !self.eval_bool(condition, "a for expression condition")? {
                return Ok(());
            }
        }

        let Some(key_expr) = &for_expr.key_expr else {
            list.push(self.eval_expr(&for_expr.value_expr)?);
            return Ok(());
        };

        let key = self.eval_key(key_expr)?;
        let value = self.eval_expr(&for_expr.value_expr)?;
        if for_expr.grouping {
            match object.entry(key).or_insert_with(|| Value::List(Vec::new())) {
                Value::List(group) => group.push(value),
                _ => unreachable!("grouped values are always lists"),
            }
        } else if object.contains_key(&key) {
            return Err(EngineError::type_mismatch(
                self.source,
                key_expr.location(),
                "unique key",
                format!("duplicate key \"{}\"", key),
                "use '...' after the value to group values with the same key",
            ));
        } else {
            object.insert(key, value);
        }
        Ok(())
    }
}

/// Parse a numeric string the way arithmetic operands are converted
fn parse_number(s: &str) -> Option<Value> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Int(n));
    }
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(Value::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::options::EngineOptions;
    use crate::parser::parse;
    use std::sync::Arc;

    fn context() -> EvalContext {
        EvalContext::new(
            Arc::new(EngineOptions::new("/live/app/terragrunt.hcl")),
            Arc::new(RunContext::new()),
        )
    }

    fn eval_with(ctx: &EvalContext, expr: &str) -> EngineResult<Value> {
        let source = format!("x = {}\n", expr);
        let file = parse(&source, "/live/app/terragrunt.hcl")?;
        let value = &file.ast.body.attribute("x").unwrap().value;
        evaluate(value, ctx, &file.source)
    }

    fn eval(expr: &str) -> EngineResult<Value> {
        eval_with(&context(), expr)
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("null").unwrap(), Value::Null);
        assert_eq!(eval("true").unwrap(), Value::Bool(true));
        assert_eq!(eval("42").unwrap(), Value::Int(42));
        assert_eq!(eval("1.5").unwrap(), Value::Float(1.5));
        assert_eq!(eval("\"hi\"").unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("8 / 2").unwrap(), Value::Int(4));
        assert_eq!(eval("7 % 3").unwrap(), Value::Int(1));
        assert_eq!(eval("\"3\" + 4").unwrap(), Value::Int(7));
        assert_eq!(eval("-5 + 1.5").unwrap(), Value::Float(-3.5));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert!(matches!(
            eval("9223372036854775807 + 1"),
            Err(EngineError::ArithmeticOverflow { .. })
        ));
        assert!(matches!(eval("1 / 0"), Err(EngineError::DivisionByZero { .. })));
        assert!(matches!(eval("5 % 0"), Err(EngineError::DivisionByZero { .. })));
        assert!(matches!(
            eval("\"abc\" * 2"),
            Err(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval("1 < 2 && 3 >= 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("\"a\" == \"a\"").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 == 1.0").unwrap(), Value::Bool(true));
        assert_eq!(eval("!false || false").unwrap(), Value::Bool(true));
        // right side is never evaluated
        assert_eq!(eval("false && local.missing").unwrap(), Value::Bool(false));
        assert!(matches!(eval("1 && true"), Err(EngineError::TypeMismatch { .. })));
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval("true ? \"a\" : \"b\"").unwrap(), Value::from("a"));
        assert_eq!(eval("1 > 2 ? \"a\" : \"b\"").unwrap(), Value::from("b"));
        assert!(eval("1 ? 2 : 3").is_err());
    }

    #[test]
    fn test_templates() {
        let mut locals = IndexMap::new();
        locals.insert("n".to_string(), Value::Int(3));
        locals.insert("tags".to_string(), Value::from(vec!["a", "b"]));
        let ctx = context().with_locals(locals);

        assert_eq!(
            eval_with(&ctx, "\"n=${local.n}\"").unwrap(),
            Value::from("n=3")
        );
        // a lone interpolation keeps the value's type
        assert_eq!(
            eval_with(&ctx, "\"${local.tags}\"").unwrap(),
            Value::from(vec!["a", "b"])
        );
        assert!(matches!(
            eval_with(&ctx, "\"tags: ${local.tags}\""),
            Err(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_traversal() {
        let mut inner = IndexMap::new();
        inner.insert("vpc_id".to_string(), Value::from("vpc-1"));
        inner.insert("subnets".to_string(), Value::from(vec!["s1", "s2"]));
        let mut locals = IndexMap::new();
        locals.insert("net".to_string(), Value::Map(inner));
        let ctx = context().with_locals(locals);

        assert_eq!(eval_with(&ctx, "local.net.vpc_id").unwrap(), Value::from("vpc-1"));
        assert_eq!(eval_with(&ctx, "local.net.subnets[1]").unwrap(), Value::from("s2"));
        assert_eq!(eval_with(&ctx, "local.net[\"vpc_id\"]").unwrap(), Value::from("vpc-1"));
        assert_eq!(eval_with(&ctx, "local.net.subnets.0").unwrap(), Value::from("s1"));
        assert!(eval_with(&ctx, "local.net.subnets[5]").is_err());
    }

    #[test]
    fn test_missing_local_names_path() {
        match eval("local.region") {
            Err(err @ EngineError::UndefinedVariable { .. }) => {
                assert!(err.is_local_reference());
                if let EngineError::UndefinedVariable { name, .. } = err {
                    assert_eq!(name, "local.region");
                }
            }
            other => panic!("expected undefined variable, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_root_variable() {
        match eval("locals.x") {
            Err(EngineError::UndefinedVariable { name, help, .. }) => {
                assert_eq!(name, "locals");
                assert_eq!(help, "did you mean 'local'?");
            }
            other => panic!("expected undefined variable, got {:?}", other),
        }
    }

    #[test]
    fn test_objects() {
        let value = eval("{ a = 1, \"b\" = 2, (\"c${1}\") = 3 }").unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
        assert_eq!(map.get("b"), Some(&Value::Int(2)));
        assert_eq!(map.get("c1"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_for_expressions() {
        assert_eq!(
            eval("[for s in [\"a\", \"b\"] : upper(s)]").unwrap(),
            Value::from(vec!["A", "B"])
        );
        assert_eq!(
            eval("[for i, v in [10, 20, 30] : i if v > 10]").unwrap(),
            Value::from(vec![1i64, 2])
        );
        // maps iterate in key order
        assert_eq!(
            eval("[for k, v in { b = 2, a = 1 } : k]").unwrap(),
            Value::from(vec!["a", "b"])
        );
        let grouped = eval(
            "{for p in [{ k = \"a\", v = 1 }, { k = \"a\", v = 2 }, { k = \"b\", v = 3 }] : p.k => p.v...}",
        )
        .unwrap();
        assert_eq!(grouped.get_path(&["a"]), Some(&Value::from(vec![1i64, 2])));
        assert_eq!(grouped.get_path(&["b"]), Some(&Value::from(vec![3i64])));
    }

    #[test]
    fn test_for_object_duplicate_key() {
        assert!(matches!(
            eval("{for s in [\"a\", \"a\"] : s => 1}"),
            Err(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_function_call_expansion() {
        assert_eq!(
            eval("concat([\"a\"], [[\"b\"], [\"c\"]]...)").unwrap(),
            Value::from(vec!["a", "b", "c"])
        );
        assert!(eval("upper(\"a\"...)").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let loc = SourceLocation::default();
        let mut expr = Expr::Integer(1, loc.clone());
        for _ in 0..200 {
            expr = Expr::Array(ArrayExpr {
                elements: vec![expr],
                location: loc.clone(),
            });
        }
        assert!(matches!(
            evaluate(&expr, &context(), ""),
            Err(EngineError::RecursionLimitExceeded { limit: 128, .. })
        ));
    }
}
