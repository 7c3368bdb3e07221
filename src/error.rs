//! Shared error utilities used across the compilation pipeline.
//!
//! Every user-facing failure is fatal: the first error aborts the run. Errors
//! carry a 1-based line and column so the driver can point at the offending
//! character with a caret, chibicc style.

use snafu::Snafu;

use crate::symtab::SymbolError;
use crate::tokenizer::Token;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  /// A specific construct was required but something else was found.
  #[snafu(display("expected {expected}, found '{found}' near line {line}, column {column}"))]
  Syntax {
    expected: String,
    found: String,
    line: usize,
    column: usize,
  },
  /// Declaration conflict or reference to an undeclared name.
  #[snafu(display("{source} near line {line}, column {column}"))]
  Scope {
    source: SymbolError,
    line: usize,
    column: usize,
  },
}

impl CompileError {
  /// Syntax error anchored at `token`.
  pub fn expected(token: &Token, expected: impl Into<String>) -> Self {
    Self::Syntax {
      expected: expected.into(),
      found: token.describe(),
      line: token.line,
      column: token.column,
    }
  }

  pub fn line(&self) -> usize {
    match self {
      Self::Syntax { line, .. } | Self::Scope { line, .. } => *line,
    }
  }

  pub fn column(&self) -> usize {
    match self {
      Self::Syntax { column, .. } | Self::Scope { column, .. } => *column,
    }
  }

  /// True for a name declared twice in the same scope.
  pub fn is_declaration_conflict(&self) -> bool {
    matches!(
      self,
      Self::Scope {
        source: SymbolError::AlreadyDeclared { .. },
        ..
      }
    )
  }

  /// True for a reference to a name no open scope binds.
  pub fn is_undeclared(&self) -> bool {
    matches!(
      self,
      Self::Scope {
        source: SymbolError::Undeclared { .. },
        ..
      }
    )
  }

  /// Render the message followed by the offending source line and a caret
  /// under the reported column.
  pub fn render(&self, source: &str) -> String {
    let message = self.to_string();
    let Some(text) = source.lines().nth(self.line().saturating_sub(1)) else {
      return message;
    };
    let offset = text
      .chars()
      .count()
      .min(self.column().saturating_sub(1));
    let marker = format!("{}^", " ".repeat(offset));
    format!("{message}\n{text}\n{marker}")
  }
}
