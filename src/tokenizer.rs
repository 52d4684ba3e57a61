//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The vector doubles as the token chain: the successor of token `i` is token
//! `i + 1`, and the last entry is always an `Eof` marker. Two-character
//! punctuators are matched before single-character ones, and identifiers that
//! spell a keyword are reclassified in one pass once the stream is complete.

use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult};

/// Words that stop being identifiers after tokenization.
const KEYWORDS: [&str; 5] = ["return", "if", "else", "for", "while"];

/// Punctuators longer than one byte, tried before the single-byte fallback.
const MULTI_CHAR_PUNCTUATORS: [&str; 4] = ["==", "!=", "<=", ">="];

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Punctuator,
  Keyword,
  Num,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<i64>,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize, value: Option<i64>) -> Self {
    Self {
      kind,
      value,
      loc,
      len,
    }
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if is_space(c) {
      i += 1;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      // A run of digits only fails to parse when it does not fit in 64 bits.
      let value = input[start..i]
        .parse::<i64>()
        .map_err(|_| CompileError::lexical(input, start, "number literal out of range"))?;
      tokens.push(Token::new(TokenKind::Num, start, i - start, Some(value)));
      continue;
    }

    if is_ident_start(c) {
      let start = i;
      i += 1;
      while i < bytes.len() && is_ident_continue(bytes[i]) {
        i += 1;
      }
      tokens.push(Token::new(TokenKind::Ident, start, i - start, None));
      continue;
    }

    if let Some(op) = MULTI_CHAR_PUNCTUATORS
      .into_iter()
      .find(|op| input[i..].starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Punctuator, i, op.len(), None));
      i += op.len();
      continue;
    }

    if c.is_ascii_punctuation() {
      tokens.push(Token::new(TokenKind::Punctuator, i, 1, None));
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::lexical(
      input,
      i,
      format!("invalid token: '{invalid_char}'"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, None));
  convert_keywords(&mut tokens, input);

  debug!(count = tokens.len(), "tokenized source");
  Ok(tokens)
}

/// Reclassify identifiers that spell a keyword.
fn convert_keywords(tokens: &mut [Token], source: &str) {
  for token in tokens.iter_mut().filter(|t| t.kind == TokenKind::Ident) {
    if KEYWORDS.contains(&token_text(token, source)) {
      trace!(keyword = token_text(token, source), loc = token.loc, "keyword");
      token.kind = TokenKind::Keyword;
    }
  }
}

// Matches C's isspace, which also accepts vertical tab.
fn is_space(c: u8) -> bool {
  c.is_ascii_whitespace() || c == b'\x0b'
}

fn is_ident_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
  is_ident_start(c) || c.is_ascii_digit()
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
