//! Syntax tree produced by the parser and consumed by the code generator.
//!
//! Variable references are resolved to frame slots while parsing, so the tree
//! is ready for code generation as soon as it is built. Nodes are never
//! mutated afterwards.

use std::fmt;

/// Expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  /// Constant text forwarded verbatim to the VM.
  Literal(String),
  Fetch(usize),
  Store {
    slot: usize,
    value: Box<Expr>,
  },
  /// Function or operator invocation; the arity is `args.len()`.
  Call {
    name: String,
    args: Vec<Expr>,
  },
  Return(Box<Expr>),
  If1 {
    cond: Box<Expr>,
    then: Body,
  },
  If2 {
    cond: Box<Expr>,
    then: Body,
    otherwise: Body,
  },
  Body(Body),
  While {
    cond: Box<Expr>,
    body: Body,
  },
  Or(Box<Expr>, Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Not(Box<Expr>),
  /// Initializer of a local declaration; its value becomes the new slot.
  Variable(Box<Expr>),
}

impl Expr {
  pub fn literal(text: impl Into<String>) -> Self {
    Self::Literal(text.into())
  }

  pub fn null() -> Self {
    Self::literal("null")
  }

  pub fn store(slot: usize, value: Expr) -> Self {
    Self::Store {
      slot,
      value: Box::new(value),
    }
  }

  pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
    Self::Call {
      name: name.into(),
      args,
    }
  }

  pub fn ret(value: Expr) -> Self {
    Self::Return(Box::new(value))
  }

  /// Build an `If1` or `If2` depending on whether an else branch exists.
  pub fn if_else(cond: Expr, then: Body, otherwise: Option<Body>) -> Self {
    let cond = Box::new(cond);
    match otherwise {
      Some(otherwise) => Self::If2 {
        cond,
        then,
        otherwise,
      },
      None => Self::If1 { cond, then },
    }
  }

  pub fn while_loop(cond: Expr, body: Body) -> Self {
    Self::While {
      cond: Box::new(cond),
      body,
    }
  }

  pub fn or(left: Expr, right: Expr) -> Self {
    Self::Or(Box::new(left), Box::new(right))
  }

  pub fn and(left: Expr, right: Expr) -> Self {
    Self::And(Box::new(left), Box::new(right))
  }

  pub fn not(value: Expr) -> Self {
    Self::Not(Box::new(value))
  }

  pub fn variable(initializer: Expr) -> Self {
    Self::Variable(Box::new(initializer))
  }
}

/// Non-empty sequence of expressions; its value is the value of the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
  exprs: Vec<Expr>,
}

impl Body {
  /// # Panics
  ///
  /// Panics on an empty list. The grammar never produces one.
  pub fn new(exprs: Vec<Expr>) -> Self {
    assert!(!exprs.is_empty(), "a body holds at least one expression");
    Self { exprs }
  }

  pub fn single(expr: Expr) -> Self {
    Self { exprs: vec![expr] }
  }

  pub fn exprs(&self) -> &[Expr] {
    &self.exprs
  }

  /// Split into the leading expressions and the one producing the value.
  pub fn split_last(&self) -> (&[Expr], &Expr) {
    match self.exprs.split_last() {
      Some((last, init)) => (init, last),
      None => unreachable!("body constructed without expressions"),
    }
  }
}

/// One top-level `fun` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub name: String,
  pub arity: usize,
  pub body: Body,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub functions: Vec<Function>,
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Literal(text) => write!(f, "(literal {text})"),
      Expr::Fetch(slot) => write!(f, "(fetch {slot})"),
      Expr::Store { slot, value } => write!(f, "(store {slot} {value})"),
      Expr::Call { name, args } => {
        write!(f, "(call {name}")?;
        for arg in args {
          write!(f, " {arg}")?;
        }
        f.write_str(")")
      }
      Expr::Return(value) => write!(f, "(return {value})"),
      Expr::If1 { cond, then } => write!(f, "(if {cond} {then})"),
      Expr::If2 {
        cond,
        then,
        otherwise,
      } => write!(f, "(if {cond} {then} {otherwise})"),
      Expr::Body(body) => body.fmt(f),
      Expr::While { cond, body } => write!(f, "(while {cond} {body})"),
      Expr::Or(left, right) => write!(f, "(or {left} {right})"),
      Expr::And(left, right) => write!(f, "(and {left} {right})"),
      Expr::Not(value) => write!(f, "(not {value})"),
      Expr::Variable(init) => write!(f, "(var {init})"),
    }
  }
}

impl fmt::Display for Body {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("(body")?;
    for expr in &self.exprs {
      write!(f, " {expr}")?;
    }
    f.write_str(")")
  }
}

impl fmt::Display for Function {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "(fun {}/{} {})", self.name, self.arity, self.body)
  }
}

impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for function in &self.functions {
      writeln!(f, "{function}")?;
    }
    Ok(())
  }
}
