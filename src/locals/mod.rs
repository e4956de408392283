//! Fixed-point evaluation of a file's `locals` block
//!
//! Locals may reference each other in any declaration order. Each pass
//! evaluates every local whose referenced locals are already known, against
//! the locals known at the start of the pass. A pass that makes no progress
//! ends the loop; whatever is left is either part of a cycle or refers to a
//! local that does not exist.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::context::EvalContext;
use crate::errors::{display_path, EngineError, EngineResult};
use crate::evaluator::Value;
use crate::parser::ast::Expr;
use crate::parser::{blocks_of_type, just_attributes, ParsedFile};

/// Upper bound on passes, independent of how many locals there are
pub const MAX_LOCALS_PASSES: usize = 1000;

/// Result of evaluating a `locals` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedLocals {
    /// Values in declaration order
    pub values: IndexMap<String, Value>,
    /// Number of passes it took
    pub passes: usize,
}

struct Pending<'a> {
    name: String,
    expr: &'a Expr,
    references: BTreeSet<String>,
    /// Uses `local` as a whole value, so it waits for every other local
    whole_map: bool,
}

/// Evaluate the single `locals` block of `file`, if any
pub fn evaluate_locals(file: &ParsedFile, ctx: &EvalContext) -> EngineResult<EvaluatedLocals> {
    let blocks = blocks_of_type(&file.ast.body, "locals");
    let block = match blocks.as_slice() {
        [] => return Ok(EvaluatedLocals::default()),
        [block] => *block,
        _ => {
            return Err(EngineError::MultipleLocalsBlocks {
                file: display_path(&file.path),
                count: blocks.len(),
            })
        }
    };

    let attributes = just_attributes(block, &file.source)?;
    let declared: Vec<String> = attributes.keys().cloned().collect();
    let mut pending: Vec<Pending<'_>> = attributes
        .into_iter()
        .map(|(name, expr)| Pending {
            references: expr.local_references(),
            whole_map: expr.references_bare_local(),
            name,
            expr,
        })
        .collect();

    let mut evaluated: IndexMap<String, Value> = IndexMap::new();
    let mut passes = 0;

    while !pending.is_empty() {
        if passes >= MAX_LOCALS_PASSES {
            return Err(convergence_error(file, &pending));
        }
        passes += 1;

        let pass_ctx = ctx.clone().with_locals(evaluated.clone());
        let mut resolved = Vec::new();
        let mut still_pending = Vec::new();

        for local in pending {
            if !is_ready(&local, &evaluated, &declared) {
                still_pending.push(local);
                continue;
            }
            match pass_ctx.evaluate(local.expr, &file.source) {
                Ok(value) => resolved.push((local.name, value)),
                // refers to a local that is not known yet
                Err(err) if err.is_local_reference() => still_pending.push(local),
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(
            file = %file.path.display(),
            pass = passes,
            resolved = resolved.len(),
            remaining = still_pending.len(),
            "evaluated locals pass"
        );

        pending = still_pending;
        if resolved.is_empty() {
            return Err(convergence_error(file, &pending));
        }
        evaluated.extend(resolved);
    }

    let values = declared
        .iter()
        .filter_map(|name| evaluated.swap_remove(name).map(|v| (name.clone(), v)))
        .collect();
    Ok(EvaluatedLocals { values, passes })
}

fn is_ready(local: &Pending<'_>, evaluated: &IndexMap<String, Value>, declared: &[String]) -> bool {
    if local.whole_map {
        return declared
            .iter()
            .all(|name| name == &local.name || evaluated.contains_key(name));
    }
    local.references.iter().all(|name| evaluated.contains_key(name))
}

fn convergence_error(file: &ParsedFile, pending: &[Pending<'_>]) -> EngineError {
    let unresolved: Vec<String> = pending.iter().map(|p| p.name.clone()).collect();
    EngineError::LocalsConvergence {
        file: display_path(&file.path),
        names: unresolved.join(", "),
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::options::EngineOptions;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn locals(source: &str) -> EngineResult<EvaluatedLocals> {
        let file = parse(source, "/live/app/terragrunt.hcl")?;
        let ctx = EvalContext::new(
            Arc::new(EngineOptions::new("/live/app/terragrunt.hcl")),
            Arc::new(RunContext::new()),
        );
        evaluate_locals(&file, &ctx)
    }

    #[test]
    fn test_no_locals_block() {
        let result = locals("inputs = {}\n").unwrap();
        assert!(result.values.is_empty());
        assert_eq!(result.passes, 0);
    }

    #[test]
    fn test_forward_reference() {
        let result = locals(
            r#"
locals {
  s3_url = "com.amazonaws.${local.region}.s3"
  region = "us-east-1"
}
"#,
        )
        .unwrap();
        assert_eq!(result.values["region"], Value::from("us-east-1"));
        assert_eq!(result.values["s3_url"], Value::from("com.amazonaws.us-east-1.s3"));
        // declaration order is kept
        let names: Vec<_> = result.values.keys().cloned().collect();
        assert_eq!(names, vec!["s3_url", "region"]);
        assert_eq!(result.passes, 2);
    }

    #[test]
    fn test_independent_locals_resolve_in_one_pass() {
        let result = locals("locals {\n  a = 1\n  b = \"x\"\n  c = [1, 2]\n}\n").unwrap();
        assert_eq!(result.values.len(), 3);
        assert_eq!(result.passes, 1);
    }

    #[test]
    fn test_cycle_fails() {
        let err = locals("locals {\n  a = local.b\n  b = local.a\n  c = 1\n}\n").unwrap_err();
        match err {
            EngineError::LocalsConvergence { unresolved, .. } => {
                assert_eq!(unresolved, vec!["a", "b"]);
            }
            other => panic!("expected convergence error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_local_fails() {
        let err = locals("locals {\n  a = local.nope\n}\n").unwrap_err();
        assert!(matches!(err, EngineError::LocalsConvergence { .. }));
    }

    #[test]
    fn test_two_blocks_fail() {
        let err = locals("locals {\n  a = 1\n}\nlocals {\n  b = 2\n}\n").unwrap_err();
        assert!(matches!(err, EngineError::MultipleLocalsBlocks { count: 2, .. }));
    }

    #[test]
    fn test_other_errors_fail_fast() {
        let err = locals("locals {\n  a = 1 / 0\n}\n").unwrap_err();
        assert!(matches!(err, EngineError::DivisionByZero { .. }));
    }

    #[test]
    fn test_whole_local_map() {
        let result = locals("locals {\n  all = keys(local)\n  a = 1\n  b = local.a + 1\n}\n").unwrap();
        assert_eq!(result.values["all"], Value::from(vec!["a", "b"]));
        assert_eq!(result.values["b"], Value::Int(2));
    }

    #[test]
    fn test_nested_local_access() {
        let result = locals(
            "locals {\n  region = local.cfg.region\n  cfg = { region = \"eu-west-1\" }\n}\n",
        )
        .unwrap();
        assert_eq!(result.values["region"], Value::from("eu-west-1"));
    }
}
