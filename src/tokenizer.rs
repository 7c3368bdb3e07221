//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about the grammar beyond classifying lexemes.
//! Binary operators are any run of operator characters; the first character
//! decides which of the seven precedence classes the operator belongs to.
//! Literals are kept as verbatim text because the VM parses them itself.

use std::fmt;

use crate::error::{CompileResult, SyntaxSnafu};

const OPERATOR_CHARS: &[u8] = b"+-*/!%&=><:^~|?";

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Eof,
  Fun,
  Var,
  Return,
  If,
  Else,
  While,
  And,
  Or,
  Not,
  Name,
  Literal,
  Op1,
  Op2,
  Op3,
  Op4,
  Op5,
  Op6,
  Op7,
  /// One of `( ) { } , ; =`.
  Punct(char),
}

impl TokenKind {
  /// Operator class for precedence level `1..=7`.
  pub fn operator(level: usize) -> Option<Self> {
    Some(match level {
      1 => Self::Op1,
      2 => Self::Op2,
      3 => Self::Op3,
      4 => Self::Op4,
      5 => Self::Op5,
      6 => Self::Op6,
      7 => Self::Op7,
      _ => return None,
    })
  }

  pub fn is_operator(self) -> bool {
    matches!(
      self,
      Self::Op1 | Self::Op2 | Self::Op3 | Self::Op4 | Self::Op5 | Self::Op6 | Self::Op7
    )
  }

  fn keyword(text: &str) -> Option<Self> {
    Some(match text {
      "fun" => Self::Fun,
      "var" => Self::Var,
      "return" => Self::Return,
      "if" => Self::If,
      "else" => Self::Else,
      "while" => Self::While,
      "and" => Self::And,
      "or" => Self::Or,
      "not" => Self::Not,
      "true" | "false" | "null" => Self::Literal,
      _ => return None,
    })
  }

  fn classify_operator(first: u8) -> Self {
    match first {
      b'^' | b'?' | b'~' => Self::Op1,
      b':' => Self::Op2,
      b'|' => Self::Op3,
      b'&' => Self::Op4,
      b'!' | b'=' | b'<' | b'>' => Self::Op5,
      b'+' | b'-' => Self::Op6,
      _ => Self::Op7,
    }
  }
}

/// Describes the kind the way diagnostics name an expected construct.
impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Eof => f.write_str("end of file"),
      Self::Fun => f.write_str("'fun'"),
      Self::Var => f.write_str("'var'"),
      Self::Return => f.write_str("'return'"),
      Self::If => f.write_str("'if'"),
      Self::Else => f.write_str("'else'"),
      Self::While => f.write_str("'while'"),
      Self::And => f.write_str("'and'"),
      Self::Or => f.write_str("'or'"),
      Self::Not => f.write_str("'not'"),
      Self::Name => f.write_str("a name"),
      Self::Literal => f.write_str("a literal"),
      Self::Op1 => f.write_str("an OP1 operator"),
      Self::Op2 => f.write_str("an OP2 operator"),
      Self::Op3 => f.write_str("an OP3 operator"),
      Self::Op4 => f.write_str("an OP4 operator"),
      Self::Op5 => f.write_str("an OP5 operator"),
      Self::Op6 => f.write_str("an OP6 operator"),
      Self::Op7 => f.write_str("an OP7 operator"),
      Self::Punct(c) => write!(f, "'{c}'"),
    }
  }
}

/// A classified lexeme with the 1-based position of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub line: usize,
  pub column: usize,
}

impl Token {
  pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
    Self {
      kind,
      lexeme: lexeme.into(),
      line,
      column,
    }
  }

  pub fn eof(line: usize, column: usize) -> Self {
    Self::new(TokenKind::Eof, "", line, column)
  }

  /// Human-friendly description used in diagnostics.
  pub fn describe(&self) -> String {
    match self.kind {
      TokenKind::Eof => "end of file".to_string(),
      _ => self.lexeme.clone(),
    }
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut cursor = Cursor::new(input);
  let mut tokens = Vec::new();

  loop {
    cursor.skip_trivia();
    let (start, line, column) = (cursor.pos, cursor.line, cursor.column);
    let Some(c) = cursor.peek() else {
      tokens.push(Token::eof(line, column));
      return Ok(tokens);
    };

    let kind = if c.is_ascii_digit() {
      cursor.number();
      TokenKind::Literal
    } else if c == b'"' || c == b'\'' {
      cursor.quoted(c)?;
      TokenKind::Literal
    } else if c.is_ascii_alphabetic() || c == b'_' {
      cursor.eat_while(|b| b.is_ascii_alphanumeric() || b == b'_');
      TokenKind::keyword(&input[start..cursor.pos]).unwrap_or(TokenKind::Name)
    } else if OPERATOR_CHARS.contains(&c) {
      cursor.eat_while(|b| OPERATOR_CHARS.contains(&b));
      if &input[start..cursor.pos] == "=" {
        TokenKind::Punct('=')
      } else {
        TokenKind::classify_operator(c)
      }
    } else if b"(){},;".contains(&c) {
      cursor.bump();
      TokenKind::Punct(char::from(c))
    } else {
      let found = input[start..].chars().next().unwrap_or('\0');
      return SyntaxSnafu {
        expected: "a token",
        found: found.to_string(),
        line,
        column,
      }
      .fail();
    };

    tokens.push(Token::new(kind, &input[start..cursor.pos], line, column));
  }
}

/// Byte cursor tracking the 1-based line and column of the next character.
struct Cursor<'a> {
  bytes: &'a [u8],
  pos: usize,
  line: usize,
  column: usize,
}

impl<'a> Cursor<'a> {
  fn new(input: &'a str) -> Self {
    Self {
      bytes: input.as_bytes(),
      pos: 0,
      line: 1,
      column: 1,
    }
  }

  fn peek(&self) -> Option<u8> {
    self.bytes.get(self.pos).copied()
  }

  fn peek_at(&self, offset: usize) -> Option<u8> {
    self.bytes.get(self.pos + offset).copied()
  }

  fn bump(&mut self) -> Option<u8> {
    let b = self.peek()?;
    self.pos += 1;
    if b == b'\n' {
      self.line += 1;
      self.column = 1;
    } else if b & 0xC0 != 0x80 {
      // continuation bytes belong to the character already counted
      self.column += 1;
    }
    Some(b)
  }

  fn eat_while(&mut self, pred: impl Fn(u8) -> bool) {
    while self.peek().is_some_and(&pred) {
      self.bump();
    }
  }

  /// Skip whitespace and `;;;` comments.
  fn skip_trivia(&mut self) {
    loop {
      match self.peek() {
        Some(b) if b.is_ascii_whitespace() => {
          self.bump();
        }
        Some(b';') if self.bytes[self.pos..].starts_with(b";;;") => {
          self.eat_while(|b| b != b'\n');
        }
        _ => return,
      }
    }
  }

  /// Integer or decimal literal with optional fraction and exponent.
  fn number(&mut self) {
    self.eat_while(|b| b.is_ascii_digit());
    if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
      self.bump();
      self.eat_while(|b| b.is_ascii_digit());
    }
    if matches!(self.peek(), Some(b'e' | b'E')) {
      let digits_at = if matches!(self.peek_at(1), Some(b'+' | b'-')) {
        2
      } else {
        1
      };
      if self.peek_at(digits_at).is_some_and(|b| b.is_ascii_digit()) {
        for _ in 0..digits_at {
          self.bump();
        }
        self.eat_while(|b| b.is_ascii_digit());
      }
    }
  }

  /// String or character literal delimited by `quote`, with backslash escapes.
  fn quoted(&mut self, quote: u8) -> CompileResult<()> {
    let (line, column) = (self.line, self.column);
    self.bump();
    loop {
      match self.bump() {
        Some(b) if b == quote => return Ok(()),
        Some(b'\\') if self.peek().is_some_and(|b| b != b'\n') => {
          self.bump();
        }
        end @ (Some(b'\n') | None) => {
          return SyntaxSnafu {
            expected: format!("closing {}", char::from(quote)),
            found: if end.is_some() {
              "end of line"
            } else {
              "end of file"
            },
            line,
            column,
          }
          .fail();
        }
        Some(_) => {}
      }
    }
  }
}
