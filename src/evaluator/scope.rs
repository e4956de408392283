//! Variable scoping for expression evaluation
//!
//! The global scope holds the root variables of a file (`local`,
//! `dependency`, ...). For-expressions push a scope for their loop
//! variables and pop it when the iteration is done.

use std::collections::HashMap;

use super::value::Value;

/// A scope containing variable bindings
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a variable in this scope
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// A stack of scopes, searched innermost first
#[derive(Debug)]
pub struct ScopeStack {
    global: Scope,
    nested: Vec<Scope>,
}

impl ScopeStack {
    /// Create a scope stack around the given global scope
    pub fn new(global: Scope) -> Self {
        Self {
            global,
            nested: Vec::new(),
        }
    }

    /// Push a new scope onto the stack
    pub fn push(&mut self) {
        self.nested.push(Scope::new());
    }

    /// Pop a scope from the stack; the global scope is never popped
    pub fn pop(&mut self) -> Option<Scope> {
        self.nested.pop()
    }

    /// Define a variable in the innermost scope
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        match self.nested.last_mut() {
            Some(scope) => scope.define(name, value),
            None => self.global.define(name, value),
        }
    }

    /// Look up a variable (searches all scopes from top to bottom)
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.nested
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.global.get(name))
    }

    /// All visible variable names (for error suggestions)
    pub fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for scope in std::iter::once(&self.global).chain(self.nested.iter()) {
            for key in scope.bindings.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        names.sort();
        names
    }
}
