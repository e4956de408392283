//! Stack file validation
//!
//! Every problem in a stack file is collected and reported together.

use std::collections::HashMap;

use super::config::{Declaration, StackFile};
use crate::errors::{EngineError, EngineResult, ErrorCollection};

/// Check a stack file before anything is generated from it
pub fn validate_stack_file(stack: &StackFile) -> EngineResult<()> {
    let mut errors = ErrorCollection::new();

    if stack.units.is_empty() && stack.stacks.is_empty() {
        errors.push(EngineError::invalid_declaration(
            "stack file must contain at least one unit or stack",
        ));
    }

    for declarations in [&stack.units, &stack.stacks] {
        check_fields(declarations, &mut errors);
        check_unique(declarations, &mut errors);
    }

    errors.into_stack_result(&stack.path)
}

fn check_fields(declarations: &[Declaration], errors: &mut ErrorCollection) {
    for decl in declarations {
        if decl.name.trim().is_empty() {
            errors.push(EngineError::invalid_declaration(format!(
                "a {} has an empty name",
                decl.kind
            )));
        }
        for (field, value) in [("source", &decl.source), ("path", &decl.path)] {
            if value.trim().is_empty() {
                errors.push(EngineError::invalid_declaration(format!(
                    "{} '{}' has an empty {}",
                    decl.kind, decl.name, field
                )));
            }
        }
    }
}

/// Names and destination paths must be unique within one kind
fn check_unique(declarations: &[Declaration], errors: &mut ErrorCollection) {
    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut paths: HashMap<&str, &str> = HashMap::new();

    for decl in declarations {
        let name = decl.name.trim();
        if !name.is_empty() {
            let seen = names.entry(name).or_insert(0);
            *seen += 1;
            if *seen == 2 {
                errors.push(EngineError::invalid_declaration(format!(
                    "duplicate {} name '{}'",
                    decl.kind, name
                )));
            }
        }

        let path = decl.path.trim();
        if path.is_empty() {
            continue;
        }
        match paths.get(path) {
            Some(first) if *first != name => {
                errors.push(EngineError::invalid_declaration(format!(
                    "{}s '{}' and '{}' have the same path '{}'",
                    decl.kind, first, name, path
                )));
            }
            Some(_) => {}
            None => {
                paths.insert(path, name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::DeclKind;
    use super::*;
    use std::path::PathBuf;

    fn unit(name: &str, source: &str, path: &str) -> Declaration {
        Declaration {
            kind: DeclKind::Unit,
            name: name.to_string(),
            source: source.to_string(),
            path: path.to_string(),
            values: None,
            no_stack: false,
        }
    }

    fn stack_of(units: Vec<Declaration>, stacks: Vec<Declaration>) -> StackFile {
        StackFile {
            path: PathBuf::from("/live/terragrunt.stack.hcl"),
            locals: Default::default(),
            units,
            stacks,
        }
    }

    fn messages(result: EngineResult<()>) -> Vec<String> {
        match result {
            Err(EngineError::StackValidation { errors, .. }) => {
                errors.iter().map(|e| e.to_string()).collect()
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_stack() {
        let stack = stack_of(
            vec![unit("a", "../a", "a"), unit("b", "../b", "b")],
            vec![],
        );
        assert!(validate_stack_file(&stack).is_ok());
    }

    #[test]
    fn test_empty_stack() {
        let errors = messages(validate_stack_file(&stack_of(vec![], vec![])));
        assert_eq!(errors, vec!["stack file must contain at least one unit or stack"]);
    }

    #[test]
    fn test_duplicate_names() {
        let stack = stack_of(vec![unit("a", "../a", "x"), unit("a", "../b", "y")], vec![]);
        let errors = messages(validate_stack_file(&stack));
        assert_eq!(errors, vec!["duplicate unit name 'a'"]);
    }

    #[test]
    fn test_duplicate_paths() {
        let stack = stack_of(vec![unit("a", "../a", "x"), unit("b", "../b", "x")], vec![]);
        let errors = messages(validate_stack_file(&stack));
        assert_eq!(errors, vec!["units 'a' and 'b' have the same path 'x'"]);
    }

    #[test]
    fn test_same_name_across_kinds_allowed() {
        let mut nested = unit("a", "../s", "a");
        nested.kind = DeclKind::Stack;
        let stack = stack_of(vec![unit("a", "../a", "a")], vec![nested]);
        assert!(validate_stack_file(&stack).is_ok());
    }

    #[test]
    fn test_errors_are_aggregated() {
        let stack = stack_of(
            vec![unit(" ", "", "x"), unit("b", "../b", "  "), unit("c", "../c", "x")],
            vec![],
        );
        let errors = messages(validate_stack_file(&stack));
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&"a unit has an empty name".to_string()));
        assert!(errors.contains(&"unit ' ' has an empty source".to_string()));
        assert!(errors.contains(&"unit 'b' has an empty path".to_string()));
    }
}
