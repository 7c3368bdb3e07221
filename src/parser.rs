//! Recursive-descent parser producing a code-generation-ready AST.
//!
//! Names are resolved to frame slots while parsing, so the symbol table is
//! driven from here: the function scope holds the parameters, and every nested
//! brace-delimited body opens its own scope. The grammar needs two tokens of
//! lookahead at exactly one point, telling `NAME = expr` apart from a bare
//! `NAME`.
//!
//! Binary operators come in seven precedence classes. Every class is
//! left-associative except OP2, which is right-associative.

use snafu::ResultExt;
use tracing::debug;

use crate::ast::{Body, Expr, Function, Program};
use crate::error::{CompileError, CompileResult, ScopeSnafu};
use crate::symtab::SymbolTable;
use crate::tokenizer::{Token, TokenKind};

const LOWEST_OPERATOR_LEVEL: usize = 1;
const HIGHEST_OPERATOR_LEVEL: usize = 7;
const RIGHT_ASSOCIATIVE_LEVEL: usize = 2;

/// Parse a whole program: zero or more function declarations.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut parser = Parser {
    stream: TokenStream::new(tokens),
    symbols: SymbolTable::new(),
  };
  parser.program()
}

struct Parser {
  stream: TokenStream,
  symbols: SymbolTable,
}

impl Parser {
  fn program(&mut self) -> CompileResult<Program> {
    let mut functions = Vec::new();
    while !self.stream.is_eof() {
      functions.push(self.function()?);
    }
    Ok(Program { functions })
  }

  // function = 'fun' NAME '(' params ')' '=' body ;
  fn function(&mut self) -> CompileResult<Function> {
    self.stream.skip(TokenKind::Fun)?;
    let name = self.stream.skip(TokenKind::Name)?.lexeme;

    self.symbols.push_scope();
    self.stream.skip(TokenKind::Punct('('))?;
    let arity = self.params()?;
    self.stream.skip(TokenKind::Punct(')'))?;
    self.stream.skip(TokenKind::Punct('='))?;
    // The outermost braces share the parameter scope, so a local cannot
    // redeclare a parameter.
    let body = self.body(false)?;
    self.symbols.pop_scope();

    debug!(name = %name, arity, "parsed function");
    Ok(Function { name, arity, body })
  }

  fn params(&mut self) -> CompileResult<usize> {
    if !self.stream.check(TokenKind::Name) {
      return Ok(0);
    }
    let mut arity = 0;
    loop {
      let param = self.stream.skip(TokenKind::Name)?;
      self.declare(&param)?;
      arity += 1;
      if !self.stream.equal(TokenKind::Punct(',')) {
        return Ok(arity);
      }
    }
  }

  // body = expr | '{' expr ';' { expr ';' } '}' ;
  fn body(&mut self, opens_scope: bool) -> CompileResult<Body> {
    if !self.stream.equal(TokenKind::Punct('{')) {
      return Ok(Body::single(self.expr()?));
    }

    if opens_scope {
      self.symbols.push_scope();
    }
    let mut exprs = Vec::new();
    loop {
      exprs.push(self.expr()?);
      self.stream.skip(TokenKind::Punct(';'))?;
      if self.stream.equal(TokenKind::Punct('}')) {
        break;
      }
    }
    if opens_scope {
      self.symbols.pop_scope();
    }
    Ok(Body::new(exprs))
  }

  fn expr(&mut self) -> CompileResult<Expr> {
    match self.stream.current().kind {
      TokenKind::Return => {
        self.stream.advance();
        Ok(Expr::ret(self.expr()?))
      }
      TokenKind::Var => self.declaration(),
      TokenKind::Name if self.stream.peek_second().kind == TokenKind::Punct('=') => {
        let name = self.stream.advance();
        let slot = self.resolve(&name)?;
        self.stream.advance();
        Ok(Expr::store(slot, self.expr()?))
      }
      _ => self.or_expr(),
    }
  }

  // 'var' NAME [ '=' expr ] { ',' NAME [ '=' expr ] }
  fn declaration(&mut self) -> CompileResult<Expr> {
    self.stream.skip(TokenKind::Var)?;
    let mut vars = Vec::new();
    loop {
      let name = self.stream.skip(TokenKind::Name)?;
      let initializer = if self.stream.equal(TokenKind::Punct('=')) {
        self.expr()?
      } else {
        Expr::null()
      };
      // Bound only now, so the initializer may still read an outer `name`.
      self.declare(&name)?;
      vars.push(Expr::variable(initializer));
      if !self.stream.equal(TokenKind::Punct(',')) {
        break;
      }
    }
    Ok(Expr::Body(Body::new(vars)))
  }

  fn or_expr(&mut self) -> CompileResult<Expr> {
    let left = self.and_expr()?;
    if self.stream.equal(TokenKind::Or) {
      let right = self.or_expr()?;
      return Ok(Expr::or(left, right));
    }
    Ok(left)
  }

  fn and_expr(&mut self) -> CompileResult<Expr> {
    let left = self.not_expr()?;
    if self.stream.equal(TokenKind::And) {
      let right = self.not_expr()?;
      return Ok(Expr::and(left, right));
    }
    Ok(left)
  }

  fn not_expr(&mut self) -> CompileResult<Expr> {
    if self.stream.equal(TokenKind::Not) {
      return Ok(Expr::not(self.not_expr()?));
    }
    self.binary(LOWEST_OPERATOR_LEVEL)
  }

  /// Binary operator chain for precedence class `level`.
  fn binary(&mut self, level: usize) -> CompileResult<Expr> {
    let Some(op) = TokenKind::operator(level) else {
      return self.small_expr();
    };
    debug_assert!((LOWEST_OPERATOR_LEVEL..=HIGHEST_OPERATOR_LEVEL).contains(&level));

    let mut left = self.binary(level + 1)?;
    if level == RIGHT_ASSOCIATIVE_LEVEL {
      if self.stream.check(op) {
        let op = self.stream.advance();
        let right = self.binary(level)?;
        left = Expr::call(op.lexeme, vec![left, right]);
      }
      return Ok(left);
    }

    while self.stream.check(op) {
      let op = self.stream.advance();
      let right = self.binary(level + 1)?;
      left = Expr::call(op.lexeme, vec![left, right]);
    }
    Ok(left)
  }

  fn small_expr(&mut self) -> CompileResult<Expr> {
    let token = self.stream.current().clone();
    match token.kind {
      TokenKind::Name => {
        self.stream.advance();
        if self.stream.equal(TokenKind::Punct('(')) {
          let args = self.arguments()?;
          return Ok(Expr::call(token.lexeme, args));
        }
        Ok(Expr::Fetch(self.resolve(&token)?))
      }
      TokenKind::Literal => {
        self.stream.advance();
        Ok(Expr::Literal(token.lexeme))
      }
      TokenKind::Punct('(') => {
        self.stream.advance();
        let expr = self.expr()?;
        self.stream.skip(TokenKind::Punct(')'))?;
        Ok(expr)
      }
      kind if kind.is_operator() => {
        self.stream.advance();
        let operand = self.small_expr()?;
        Ok(Expr::call(token.lexeme, vec![operand]))
      }
      TokenKind::If => self.if_expr(),
      TokenKind::While => {
        self.stream.advance();
        let cond = self.expr()?;
        let body = self.body(true)?;
        Ok(Expr::while_loop(cond, body))
      }
      TokenKind::Else => Err(CompileError::expected(&token, "'if' before 'else'")),
      _ => Err(CompileError::expected(&token, "an expression")),
    }
  }

  /// Call arguments after the opening parenthesis, through the closing one.
  fn arguments(&mut self) -> CompileResult<Vec<Expr>> {
    let mut args = Vec::new();
    if self.stream.equal(TokenKind::Punct(')')) {
      return Ok(args);
    }
    loop {
      args.push(self.expr()?);
      if !self.stream.equal(TokenKind::Punct(',')) {
        break;
      }
    }
    self.stream.skip(TokenKind::Punct(')'))?;
    Ok(args)
  }

  // ifexpr = 'if' expr body [ 'else' body ] ;
  fn if_expr(&mut self) -> CompileResult<Expr> {
    self.stream.skip(TokenKind::If)?;
    let cond = self.expr()?;
    let then = self.body(true)?;
    let otherwise = if self.stream.equal(TokenKind::Else) {
      Some(self.body(true)?)
    } else {
      None
    };
    Ok(Expr::if_else(cond, then, otherwise))
  }

  fn declare(&mut self, name: &Token) -> CompileResult<usize> {
    self.symbols.add_var(&name.lexeme).context(ScopeSnafu {
      line: name.line,
      column: name.column,
    })
  }

  fn resolve(&self, name: &Token) -> CompileResult<usize> {
    self.symbols.find_var(&name.lexeme).context(ScopeSnafu {
      line: name.line,
      column: name.column,
    })
  }
}

/// Cursor over the token vector with two tokens of lookahead.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  /// Take ownership of the tokens, appending an `Eof` marker if the producer
  /// did not.
  fn new(mut tokens: Vec<Token>) -> Self {
    if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
      let (line, column) = tokens
        .last()
        .map_or((1, 1), |token| (token.line, token.column + token.lexeme.chars().count()));
      tokens.push(Token::eof(line, column));
    }
    Self { tokens, pos: 0 }
  }

  fn current(&self) -> &Token {
    &self.tokens[self.pos]
  }

  fn peek_second(&self) -> &Token {
    let last = self.tokens.len() - 1;
    &self.tokens[(self.pos + 1).min(last)]
  }

  /// Consume and return the current token. `Eof` is never consumed.
  fn advance(&mut self) -> Token {
    let token = self.tokens[self.pos].clone();
    if token.kind != TokenKind::Eof {
      self.pos += 1;
    }
    token
  }

  fn check(&self, kind: TokenKind) -> bool {
    self.current().kind == kind
  }

  /// Consume the current token if it has the given kind.
  fn equal(&mut self, kind: TokenKind) -> bool {
    if self.check(kind) {
      self.advance();
      return true;
    }
    false
  }

  /// Consume a token of the given kind or fail naming what was expected.
  fn skip(&mut self, kind: TokenKind) -> CompileResult<Token> {
    if self.check(kind) {
      Ok(self.advance())
    } else {
      Err(CompileError::expected(self.current(), kind.to_string()))
    }
  }

  fn is_eof(&self) -> bool {
    self.check(TokenKind::Eof)
  }
}
