//! Code generation: lower the parsed AST into Morpho assembly instructions.
//!
//! The Morpho VM keeps the most recent value in an accumulator; `Push` moves
//! it onto the stack, which holds both call arguments and local slots. Every
//! recursive step carries a tail flag meaning "the value produced here is the
//! function's result". In tail position an instruction that has a returning
//! variant (`MakeValR`, `FetchR`, `StoreR`, `NotR`, `CallR`) uses it, so no
//! separate `Return` follows. The flag selects instructions; it never changes
//! the shape of the control flow.

use std::fmt;

use tracing::debug;

use crate::ast::{Body, Expr, Function, Program};

/// Branch target. Rendered as `_N`; unique across one generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(usize);

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "_{}", self.0)
  }
}

/// One line of Morpho assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
  MakeVal(String),
  MakeValR(String),
  /// Push the accumulator, then load the literal.
  MakeValP(String),
  Fetch(usize),
  FetchR(usize),
  Store(usize),
  StoreR(usize),
  Push,
  Call { name: String, argc: usize },
  CallR { name: String, argc: usize },
  Return,
  Go(Label),
  GoFalse(Label),
  GoTrue(Label),
  Not,
  NotR,
  Label(Label),
}

impl Instruction {
  /// Jump target, for branch instructions.
  pub fn target(&self) -> Option<Label> {
    match self {
      Self::Go(label) | Self::GoFalse(label) | Self::GoTrue(label) => Some(*label),
      _ => None,
    }
  }

  /// True when executing the instruction leaves the function.
  #[cfg(test)]
  fn returns(&self) -> bool {
    matches!(
      self,
      Self::MakeValR(_)
        | Self::FetchR(_)
        | Self::StoreR(_)
        | Self::CallR { .. }
        | Self::NotR
        | Self::Return
    )
  }
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MakeVal(value) => write!(f, "(MakeVal {value})"),
      Self::MakeValR(value) => write!(f, "(MakeValR {value})"),
      Self::MakeValP(value) => write!(f, "(MakeValP {value})"),
      Self::Fetch(slot) => write!(f, "(Fetch {slot})"),
      Self::FetchR(slot) => write!(f, "(FetchR {slot})"),
      Self::Store(slot) => write!(f, "(Store {slot})"),
      Self::StoreR(slot) => write!(f, "(StoreR {slot})"),
      Self::Push => f.write_str("(Push)"),
      Self::Call { name, argc } => write!(f, "(Call #\"{name}[f{argc}]\" {argc})"),
      Self::CallR { name, argc } => write!(f, "(CallR #\"{name}[f{argc}]\" {argc})"),
      Self::Return => f.write_str("(Return)"),
      Self::Go(label) => write!(f, "(Go {label})"),
      Self::GoFalse(label) => write!(f, "(GoFalse {label})"),
      Self::GoTrue(label) => write!(f, "(GoTrue {label})"),
      Self::Not => f.write_str("(Not)"),
      Self::NotR => f.write_str("(NotR)"),
      Self::Label(label) => write!(f, "{label}:"),
    }
  }
}

/// Generated code for one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
  pub name: String,
  pub arity: usize,
  pub code: Vec<Instruction>,
}

/// Emit code for every function of a program, in declaration order, sharing
/// one label counter.
pub fn generate(program: &Program) -> Vec<CompiledFunction> {
  let mut generator = Generator::new();
  program
    .functions
    .iter()
    .map(|function| generator.function(function))
    .collect()
}

/// Owns the label counter for one compilation run.
#[derive(Debug, Default)]
pub struct Generator {
  next_label: usize,
}

impl Generator {
  pub fn new() -> Self {
    Self::default()
  }

  /// The body runs with the parameters already in slots `0..arity` and must
  /// leave the result via a returning instruction.
  pub fn function(&mut self, function: &Function) -> CompiledFunction {
    let mut code = Vec::new();
    self.emit_body(&function.body, true, &mut code);
    debug!(
      name = %function.name,
      arity = function.arity,
      instructions = code.len(),
      "generated function"
    );
    CompiledFunction {
      name: function.name.clone(),
      arity: function.arity,
      code,
    }
  }

  fn new_label(&mut self) -> Label {
    let label = Label(self.next_label);
    self.next_label += 1;
    label
  }

  /// Every expression but the last is evaluated for effect only.
  fn emit_body(&mut self, body: &Body, tail: bool, code: &mut Vec<Instruction>) {
    let (init, last) = body.split_last();
    for expr in init {
      self.emit_expr(expr, false, code);
    }
    self.emit_expr(last, tail, code);
  }

  fn emit_expr(&mut self, expr: &Expr, tail: bool, code: &mut Vec<Instruction>) {
    match expr {
      Expr::Literal(value) => code.push(if tail {
        Instruction::MakeValR(value.clone())
      } else {
        Instruction::MakeVal(value.clone())
      }),
      Expr::Fetch(slot) => code.push(if tail {
        Instruction::FetchR(*slot)
      } else {
        Instruction::Fetch(*slot)
      }),
      Expr::Store { slot, value } => {
        self.emit_expr(value, false, code);
        code.push(if tail {
          Instruction::StoreR(*slot)
        } else {
          Instruction::Store(*slot)
        });
      }
      Expr::Call { name, args } => self.emit_call(name, args, tail, code),
      Expr::Return(value) => match value.as_ref() {
        // These already return when generated in tail position.
        Expr::Fetch(_) | Expr::Literal(_) | Expr::Call { .. } => {
          self.emit_expr(value, true, code);
        }
        _ => {
          self.emit_expr(value, false, code);
          code.push(Instruction::Return);
        }
      },
      Expr::If1 { cond, then } => {
        let end = self.new_label();
        self.emit_expr(cond, false, code);
        code.push(Instruction::GoFalse(end));
        self.emit_body(then, tail, code);
        code.push(Instruction::Label(end));
        // a false condition falls through with its own value
        Self::close_tail(tail, code);
      }
      Expr::If2 {
        cond,
        then,
        otherwise,
      } => {
        let else_label = self.new_label();
        let end = self.new_label();
        self.emit_expr(cond, false, code);
        code.push(Instruction::GoFalse(else_label));
        self.emit_body(then, tail, code);
        code.push(Instruction::Go(end));
        code.push(Instruction::Label(else_label));
        self.emit_body(otherwise, tail, code);
        code.push(Instruction::Label(end));
      }
      Expr::Body(body) => self.emit_body(body, tail, code),
      Expr::While { cond, body } => {
        let start = self.new_label();
        let end = self.new_label();
        code.push(Instruction::Label(start));
        self.emit_expr(cond, false, code);
        code.push(Instruction::GoFalse(end));
        self.emit_body(body, false, code);
        code.push(Instruction::Go(start));
        code.push(Instruction::Label(end));
        Self::close_tail(tail, code);
      }
      Expr::Or(left, right) => self.emit_short_circuit(left, right, true, tail, code),
      Expr::And(left, right) => self.emit_short_circuit(left, right, false, tail, code),
      Expr::Not(value) => {
        self.emit_expr(value, false, code);
        code.push(if tail {
          Instruction::NotR
        } else {
          Instruction::Not
        });
      }
      Expr::Variable(initializer) => {
        self.emit_expr(initializer, false, code);
        code.push(Instruction::Push);
        Self::close_tail(tail, code);
      }
    }
  }

  /// The first argument lands in the accumulator; each later one pushes its
  /// predecessor first. Literal arguments fuse the push into `MakeValP`.
  fn emit_call(&mut self, name: &str, args: &[Expr], tail: bool, code: &mut Vec<Instruction>) {
    if let Some((first, rest)) = args.split_first() {
      self.emit_expr(first, false, code);
      for arg in rest {
        if let Expr::Literal(value) = arg {
          code.push(Instruction::MakeValP(value.clone()));
        } else {
          code.push(Instruction::Push);
          self.emit_expr(arg, false, code);
        }
      }
    }

    let name = name.to_string();
    let argc = args.len();
    code.push(if tail {
      Instruction::CallR { name, argc }
    } else {
      Instruction::Call { name, argc }
    });
  }

  /// `or` skips the right operand when the left is true, `and` when it is
  /// false; the left value is then the result.
  fn emit_short_circuit(
    &mut self,
    left: &Expr,
    right: &Expr,
    skip_when: bool,
    tail: bool,
    code: &mut Vec<Instruction>,
  ) {
    let end = self.new_label();
    self.emit_expr(left, false, code);
    code.push(if skip_when {
      Instruction::GoTrue(end)
    } else {
      Instruction::GoFalse(end)
    });
    self.emit_expr(right, tail, code);
    code.push(Instruction::Label(end));
    Self::close_tail(tail, code);
  }

  /// Return the accumulator when control reaches a tail-position join point
  /// without having returned yet.
  fn close_tail(tail: bool, code: &mut Vec<Instruction>) {
    if tail {
      code.push(Instruction::Return);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::Body;
  use std::collections::HashSet;

  use proptest::prelude::*;

  use Instruction::{
    Fetch, FetchR, Go, GoFalse, GoTrue, MakeVal, MakeValP, MakeValR, Not, NotR, Push, Return,
    Store, StoreR,
  };

  fn function(arity: usize, exprs: Vec<Expr>) -> Function {
    Function {
      name: "f".into(),
      arity,
      body: Body::new(exprs),
    }
  }

  fn code_of(arity: usize, exprs: Vec<Expr>) -> Vec<Instruction> {
    Generator::new().function(&function(arity, exprs)).code
  }

  fn call(name: &str, argc: usize) -> Instruction {
    Instruction::Call {
      name: name.into(),
      argc,
    }
  }

  fn call_r(name: &str, argc: usize) -> Instruction {
    Instruction::CallR {
      name: name.into(),
      argc,
    }
  }

  #[test]
  fn instructions_render_as_morpho_assembly() {
    assert_eq!(MakeVal("1".into()).to_string(), "(MakeVal 1)");
    assert_eq!(MakeValP("\"s\"".into()).to_string(), "(MakeValP \"s\")");
    assert_eq!(FetchR(3).to_string(), "(FetchR 3)");
    assert_eq!(call_r("+", 2).to_string(), "(CallR #\"+[f2]\" 2)");
    assert_eq!(GoTrue(Label(4)).to_string(), "(GoTrue _4)");
    assert_eq!(Instruction::Label(Label(4)).to_string(), "_4:");
  }

  #[test]
  fn tail_leaves_use_returning_variants() {
    assert_eq!(code_of(0, vec![Expr::literal("1")]), vec![MakeValR("1".into())]);
    assert_eq!(code_of(1, vec![Expr::Fetch(0)]), vec![FetchR(0)]);
    assert_eq!(
      code_of(1, vec![Expr::store(0, Expr::literal("2"))]),
      vec![MakeVal("2".into()), StoreR(0)]
    );
    assert_eq!(
      code_of(1, vec![Expr::not(Expr::Fetch(0))]),
      vec![Fetch(0), NotR]
    );
  }

  #[test]
  fn body_only_tails_its_last_expression() {
    let code = code_of(
      1,
      vec![Expr::Fetch(0), Expr::call("g", Vec::new()), Expr::Fetch(0)],
    );
    assert_eq!(code, vec![Fetch(0), call("g", 0), FetchR(0)]);
  }

  #[test]
  fn return_of_call_is_a_tail_call_without_return() {
    let code = code_of(
      2,
      vec![Expr::ret(Expr::call(
        "f",
        vec![Expr::Fetch(0), Expr::Fetch(1)],
      ))],
    );
    assert_eq!(code, vec![Fetch(0), Push, Fetch(1), call_r("f", 2)]);
  }

  #[test]
  fn return_of_other_kinds_emits_return_once() {
    let code = code_of(1, vec![Expr::ret(Expr::store(0, Expr::literal("5")))]);
    assert_eq!(code, vec![MakeVal("5".into()), Store(0), Return]);

    let code = code_of(1, vec![Expr::ret(Expr::not(Expr::Fetch(0))), Expr::Fetch(0)]);
    assert_eq!(code, vec![Fetch(0), Not, Return, FetchR(0)]);
  }

  #[test]
  fn return_in_non_tail_position_still_returns() {
    let code = code_of(1, vec![Expr::ret(Expr::literal("0")), Expr::Fetch(0)]);
    assert_eq!(code, vec![MakeValR("0".into()), FetchR(0)]);
  }

  #[test]
  fn later_literal_arguments_fuse_the_push() {
    let code = code_of(
      1,
      vec![Expr::call(
        "g",
        vec![Expr::literal("1"), Expr::literal("2"), Expr::Fetch(0)],
      )],
    );
    assert_eq!(
      code,
      vec![
        MakeVal("1".into()),
        MakeValP("2".into()),
        Push,
        Fetch(0),
        call_r("g", 3),
      ]
    );
  }

  #[test]
  fn if_without_else_returns_condition_on_fall_through() {
    let code = code_of(
      1,
      vec![Expr::if_else(
        Expr::Fetch(0),
        Body::single(Expr::literal("1")),
        None,
      )],
    );
    assert_eq!(
      code,
      vec![
        Fetch(0),
        GoFalse(Label(0)),
        MakeValR("1".into()),
        Instruction::Label(Label(0)),
        Return,
      ]
    );
  }

  #[test]
  fn if_else_branches_inherit_tail_position() {
    let code = code_of(
      1,
      vec![Expr::if_else(
        Expr::Fetch(0),
        Body::single(Expr::call("g", vec![Expr::Fetch(0)])),
        Some(Body::single(Expr::literal("0"))),
      )],
    );
    assert_eq!(
      code,
      vec![
        Fetch(0),
        GoFalse(Label(0)),
        Fetch(0),
        call_r("g", 1),
        Go(Label(1)),
        Instruction::Label(Label(0)),
        MakeValR("0".into()),
        Instruction::Label(Label(1)),
      ]
    );
  }

  #[test]
  fn if_else_in_non_tail_position() {
    let code = code_of(
      1,
      vec![
        Expr::if_else(
          Expr::Fetch(0),
          Body::single(Expr::literal("1")),
          Some(Body::single(Expr::literal("2"))),
        ),
        Expr::Fetch(0),
      ],
    );
    assert_eq!(
      code,
      vec![
        Fetch(0),
        GoFalse(Label(0)),
        MakeVal("1".into()),
        Go(Label(1)),
        Instruction::Label(Label(0)),
        MakeVal("2".into()),
        Instruction::Label(Label(1)),
        FetchR(0),
      ]
    );
  }

  #[test]
  fn while_body_is_never_tail() {
    let code = code_of(
      1,
      vec![Expr::while_loop(
        Expr::Fetch(0),
        Body::single(Expr::store(0, Expr::call("-", vec![Expr::Fetch(0)]))),
      )],
    );
    assert_eq!(
      code,
      vec![
        Instruction::Label(Label(0)),
        Fetch(0),
        GoFalse(Label(1)),
        Fetch(0),
        call("-", 1),
        Store(0),
        Go(Label(0)),
        Instruction::Label(Label(1)),
        Return,
      ]
    );
  }

  #[test]
  fn or_branches_past_the_right_operand() {
    let code = code_of(
      1,
      vec![
        Expr::or(Expr::literal("true"), Expr::call("g", Vec::new())),
        Expr::Fetch(0),
      ],
    );
    assert_eq!(
      code,
      vec![
        MakeVal("true".into()),
        GoTrue(Label(0)),
        call("g", 0),
        Instruction::Label(Label(0)),
        FetchR(0),
      ]
    );
  }

  #[test]
  fn and_in_tail_position() {
    let code = code_of(2, vec![Expr::and(Expr::Fetch(0), Expr::Fetch(1))]);
    assert_eq!(
      code,
      vec![
        Fetch(0),
        GoFalse(Label(0)),
        FetchR(1),
        Instruction::Label(Label(0)),
        Return,
      ]
    );
  }

  #[test]
  fn declarations_push_their_initializers() {
    let code = code_of(
      0,
      vec![
        Expr::Body(Body::new(vec![
          Expr::variable(Expr::literal("1")),
          Expr::variable(Expr::null()),
        ])),
        Expr::Fetch(1),
      ],
    );
    assert_eq!(
      code,
      vec![
        MakeVal("1".into()),
        Push,
        MakeVal("null".into()),
        Push,
        FetchR(1),
      ]
    );
  }

  #[test]
  fn labels_continue_across_functions() {
    let program = Program {
      functions: vec![
        function(1, vec![Expr::while_loop(Expr::Fetch(0), Body::single(Expr::Fetch(0)))]),
        function(1, vec![Expr::or(Expr::Fetch(0), Expr::Fetch(0))]),
      ],
    };
    let compiled = generate(&program);
    assert_eq!(compiled.len(), 2);
    assert_eq!(compiled[0].code[0], Instruction::Label(Label(0)));
    assert!(compiled[1].code.contains(&GoTrue(Label(2))));
  }

  fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
      (0usize..4).prop_map(Expr::Fetch),
      "[0-9]{1,3}".prop_map(Expr::Literal),
    ];
    leaf.prop_recursive(4, 48, 3, |inner| {
      let body = prop::collection::vec(inner.clone(), 1..3).prop_map(Body::new);
      prop_oneof![
        (inner.clone(), body.clone()).prop_map(|(cond, then)| Expr::if_else(cond, then, None)),
        (inner.clone(), body.clone(), body.clone())
          .prop_map(|(cond, then, otherwise)| Expr::if_else(cond, then, Some(otherwise))),
        (inner.clone(), body.clone()).prop_map(|(cond, body)| Expr::while_loop(cond, body)),
        (inner.clone(), inner.clone()).prop_map(|(left, right)| Expr::or(left, right)),
        (inner.clone(), inner.clone()).prop_map(|(left, right)| Expr::and(left, right)),
        (0usize..4, inner.clone()).prop_map(|(slot, value)| Expr::store(slot, value)),
        inner.clone().prop_map(Expr::not),
        inner.clone().prop_map(Expr::ret),
        inner.clone().prop_map(Expr::variable),
        prop::collection::vec(inner, 0..4).prop_map(|args| Expr::call("g", args)),
      ]
    })
  }

  proptest! {
    /// Labels are defined once across the whole program and every branch
    /// targets a label of its own function.
    #[test]
    fn labels_are_unique_and_resolved(
      bodies in prop::collection::vec(prop::collection::vec(arb_expr(), 1..4), 1..4)
    ) {
      let program = Program {
        functions: bodies.into_iter().map(|exprs| function(4, exprs)).collect(),
      };
      let compiled = generate(&program);
      prop_assert_eq!(compiled.len(), program.functions.len());

      let mut all_defined = HashSet::new();
      for function in &compiled {
        let labels: Vec<Label> = function
          .code
          .iter()
          .filter_map(|instruction| match instruction {
            Instruction::Label(label) => Some(*label),
            _ => None,
          })
          .collect();
        for label in &labels {
          prop_assert!(all_defined.insert(*label), "label {} defined twice", label);
        }
        let defined: HashSet<Label> = labels.into_iter().collect();
        for target in function.code.iter().filter_map(Instruction::target) {
          prop_assert!(defined.contains(&target), "branch to undefined {}", target);
        }
      }
    }

    /// Straight-line execution never runs off the end of a function.
    #[test]
    fn functions_end_by_returning(exprs in prop::collection::vec(arb_expr(), 1..4)) {
      let code = code_of(4, exprs);
      let last = code.iter().rev().find(|instruction| !matches!(instruction, Instruction::Label(_)));
      prop_assert!(last.is_some_and(Instruction::returns), "{:?}", code);
    }
  }
}
