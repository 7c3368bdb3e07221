//! Scoped symbol table mapping variable names to frame slots.
//!
//! Scopes form a strict stack that mirrors the lexical block structure of the
//! function being parsed. A new binding always receives the next free slot
//! across *all* open scopes, so nested blocks never reuse a slot that is still
//! visible and every local of a function fits in one flat frame.

use std::collections::HashMap;

use snafu::Snafu;
use tracing::trace;

/// Failures reported back to the parser, which attaches a source position.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum SymbolError {
  #[snafu(display("variable name '{name}' is already declared in this scope"))]
  AlreadyDeclared { name: String },
  #[snafu(display("variable name '{name}' is not declared"))]
  Undeclared { name: String },
}

#[derive(Debug, Default)]
pub struct SymbolTable {
  scopes: Vec<HashMap<String, usize>>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Open a new innermost scope.
  pub fn push_scope(&mut self) {
    self.scopes.push(HashMap::new());
    trace!(depth = self.scopes.len(), "push scope");
  }

  /// Close the innermost scope, discarding its bindings.
  ///
  /// # Panics
  ///
  /// Panics when no scope is open; the parser pairs every pop with a push.
  pub fn pop_scope(&mut self) {
    let Some(scope) = self.scopes.pop() else {
      panic!("pop_scope called with no open scope");
    };
    trace!(depth = self.scopes.len(), dropped = scope.len(), "pop scope");
  }

  /// Bind `name` in the innermost scope and return its slot.
  ///
  /// Shadowing a name from an enclosing scope is allowed; repeating a name
  /// within the same scope is not.
  ///
  /// # Panics
  ///
  /// Panics when no scope is open.
  pub fn add_var(&mut self, name: &str) -> Result<usize, SymbolError> {
    let slot = self.var_count();
    let Some(scope) = self.scopes.last_mut() else {
      panic!("add_var called with no open scope");
    };
    if scope.contains_key(name) {
      return AlreadyDeclaredSnafu { name }.fail();
    }
    scope.insert(name.to_string(), slot);
    trace!(name, slot, "bind variable");
    Ok(slot)
  }

  /// Resolve `name`, searching from the innermost scope outwards.
  pub fn find_var(&self, name: &str) -> Result<usize, SymbolError> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(name).copied())
      .ok_or_else(|| UndeclaredSnafu { name }.build())
  }

  /// Number of bindings visible across every open scope.
  pub fn var_count(&self) -> usize {
    self.scopes.iter().map(HashMap::len).sum()
  }
}
