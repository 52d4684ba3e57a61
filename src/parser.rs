//! Recursive-descent parser producing a statement list and expression AST.
//!
//! The parser mirrors the classic chibicc structure: one helper per
//! precedence level, each taking the index of the token it starts at and
//! returning the parsed node together with the index of the first token it
//! did not consume. Nodes live in an [`Ast`] arena and refer to each other by
//! [`NodeId`]; statements inside a block are chained through `Node::next`.
//!
//! ```text
//! program    = stmt*
//! stmt       = "return" expr ";"
//!            | "if" "(" expr ")" stmt ("else" stmt)?
//!            | "for" "(" exprStmt expr? ";" expr? ")" stmt
//!            | "while" "(" expr ")" stmt
//!            | "{" stmt* "}"
//!            | exprStmt
//! exprStmt   = expr? ";"
//! expr       = assign
//! assign     = equality ("=" assign)?
//! equality   = relational ("==" relational | "!=" relational)*
//! relational = add ("<" add | "<=" add | ">" add | ">=" add)*
//! add        = mul ("+" mul | "-" mul)*
//! mul        = unary ("*" unary | "/" unary)*
//! unary      = ("+" | "-") unary | primary
//! primary    = "(" expr ")" | ident | num
//! ```

use std::ops::Index;

use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};

/// Binary operators that survive parsing. `>` and `>=` are rewritten into
/// `Lt` and `Le` with swapped operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

/// Index of a node inside its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
  Num {
    value: i64,
  },
  /// Reference to `Function::locals[obj]`.
  Var {
    obj: usize,
  },
  Neg {
    operand: NodeId,
  },
  Binary {
    op: BinaryOp,
    lhs: NodeId,
    rhs: NodeId,
  },
  Assign {
    lhs: NodeId,
    rhs: NodeId,
  },
  ExprStmt {
    expr: NodeId,
  },
  Return {
    expr: NodeId,
  },
  /// First statement of the block; the rest follow through `Node::next`.
  Block {
    body: Option<NodeId>,
  },
  If {
    cond: NodeId,
    then: NodeId,
    els: Option<NodeId>,
  },
  /// Also used for `while`, which has neither `init` nor `inc`.
  For {
    init: Option<NodeId>,
    cond: Option<NodeId>,
    inc: Option<NodeId>,
    then: NodeId,
  },
}

impl NodeKind {
  /// Short name used in internal diagnostics and logs.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Num { .. } => "number",
      Self::Var { .. } => "variable",
      Self::Neg { .. } => "negation",
      Self::Binary { .. } => "binary expression",
      Self::Assign { .. } => "assignment",
      Self::ExprStmt { .. } => "expression statement",
      Self::Return { .. } => "return statement",
      Self::Block { .. } => "block",
      Self::If { .. } => "if statement",
      Self::For { .. } => "loop",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
  pub kind: NodeKind,
  /// Byte offset of the token this node was built from.
  pub loc: usize,
  /// Next statement in the enclosing block.
  pub next: Option<NodeId>,
}

/// Arena owning every node of one compilation.
#[derive(Debug, Default)]
pub struct Ast {
  nodes: Vec<Node>,
}

impl Ast {
  fn push(&mut self, kind: NodeKind, loc: usize) -> NodeId {
    let id = NodeId(self.nodes.len());
    self.nodes.push(Node {
      kind,
      loc,
      next: None,
    });
    id
  }

  /// Chain `stmts` through their `next` links, returning the head.
  fn link(&mut self, stmts: &[NodeId]) -> Option<NodeId> {
    for pair in stmts.windows(2) {
      self.nodes[pair[0].0].next = Some(pair[1]);
    }
    stmts.first().copied()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Iterate a statement chain starting at `first`.
  pub fn siblings(&self, first: Option<NodeId>) -> Siblings<'_> {
    Siblings {
      ast: self,
      current: first,
    }
  }
}

impl Index<NodeId> for Ast {
  type Output = Node;

  fn index(&self, id: NodeId) -> &Node {
    &self.nodes[id.0]
  }
}

pub struct Siblings<'a> {
  ast: &'a Ast,
  current: Option<NodeId>,
}

impl Iterator for Siblings<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<Self::Item> {
    let id = self.current?;
    self.current = self.ast[id].next;
    Some(id)
  }
}

/// A local variable. Every distinct name maps to exactly one `Obj`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obj {
  pub name: String,
  /// Offset from the frame pointer; assigned by the code generator.
  pub offset: i64,
}

/// The parse result: the whole program is the body of a single function.
#[derive(Debug)]
pub struct Function {
  pub ast: Ast,
  /// A `Block` holding the top-level statements in source order.
  pub body: NodeId,
  /// Locals in order of first appearance.
  pub locals: Vec<Obj>,
  pub stack_size: i64,
}

type Parsed = CompileResult<(NodeId, usize)>;

/// How many statements, parenthesised expressions, unary operators and
/// assignments may enclose one another before parsing gives up.
pub const MAX_NESTING: usize = 256;

/// Parse a sequence of statements from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Function> {
  if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
    return Err(CompileError::syntax(
      source,
      source.len(),
      "token stream is not terminated",
    ));
  }

  let mut parser = Parser::new(tokens, source);
  let mut stmts = Vec::new();
  let mut tok = 0;
  while !parser.is_eof(tok) {
    let (stmt, rest) = parser.stmt(tok)?;
    stmts.push(stmt);
    tok = rest;
  }

  let head = parser.ast.link(&stmts);
  let body = parser.ast.push(NodeKind::Block { body: head }, 0);
  debug!(
    statements = stmts.len(),
    nodes = parser.ast.len(),
    locals = parser.locals.len(),
    "parsed program"
  );

  Ok(Function {
    ast: parser.ast,
    body,
    locals: parser.locals,
    stack_size: 0,
  })
}

struct Parser<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  ast: Ast,
  locals: Vec<Obj>,
  /// Grammar levels currently entered through `nested`.
  depth: usize,
}

impl<'a> Parser<'a> {
  /// Take ownership of an `Eof`-terminated token stream.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      ast: Ast::default(),
      locals: Vec::new(),
      depth: 0,
    }
  }

  /// Run `level` at `tok` one nesting level deeper.
  fn nested(&mut self, tok: usize, level: fn(&mut Self, usize) -> Parsed) -> Parsed {
    if self.depth >= MAX_NESTING {
      return Err(CompileError::syntax(
        self.source,
        self.loc(tok),
        "nested too deeply",
      ));
    }

    self.depth += 1;
    let result = level(self, tok);
    self.depth -= 1;
    result
  }

  fn stmt(&mut self, tok: usize) -> Parsed {
    self.nested(tok, Self::statement)
  }

  // stmt = "return" expr ";" | "if" ... | "for" ... | "while" ... | "{" ... | exprStmt
  fn statement(&mut self, tok: usize) -> Parsed {
    let loc = self.loc(tok);

    if self.equal(tok, "return") {
      let (expr, tok) = self.expr(tok + 1)?;
      let rest = self.skip(tok, ";")?;
      return Ok((self.ast.push(NodeKind::Return { expr }, loc), rest));
    }

    if self.equal(tok, "if") {
      let tok = self.skip(tok + 1, "(")?;
      let (cond, tok) = self.expr(tok)?;
      let tok = self.skip(tok, ")")?;
      let (then, tok) = self.stmt(tok)?;
      let (els, rest) = if self.equal(tok, "else") {
        let (els, rest) = self.stmt(tok + 1)?;
        (Some(els), rest)
      } else {
        (None, tok)
      };
      return Ok((self.ast.push(NodeKind::If { cond, then, els }, loc), rest));
    }

    if self.equal(tok, "for") {
      let tok = self.skip(tok + 1, "(")?;
      let (init, tok) = if self.equal(tok, ";") {
        (None, tok + 1)
      } else {
        let (init, tok) = self.expr_stmt(tok)?;
        (Some(init), tok)
      };
      let (cond, tok) = self.optional_expr(tok, ";")?;
      let tok = self.skip(tok, ";")?;
      let (inc, tok) = self.optional_expr(tok, ")")?;
      let tok = self.skip(tok, ")")?;
      let (then, rest) = self.stmt(tok)?;
      let node = NodeKind::For {
        init,
        cond,
        inc,
        then,
      };
      return Ok((self.ast.push(node, loc), rest));
    }

    if self.equal(tok, "while") {
      let tok = self.skip(tok + 1, "(")?;
      let (cond, tok) = self.expr(tok)?;
      let tok = self.skip(tok, ")")?;
      let (then, rest) = self.stmt(tok)?;
      let node = NodeKind::For {
        init: None,
        cond: Some(cond),
        inc: None,
        then,
      };
      return Ok((self.ast.push(node, loc), rest));
    }

    if self.equal(tok, "{") {
      return self.compound_stmt(tok + 1);
    }

    self.expr_stmt(tok)
  }

  /// Parse the statements of a block whose `{` sits just before `tok`.
  fn compound_stmt(&mut self, tok: usize) -> Parsed {
    let loc = self.loc(tok - 1);
    let mut stmts = Vec::new();
    let mut tok = tok;

    while !self.equal(tok, "}") {
      if self.is_eof(tok) {
        self.skip(tok, "}")?;
      }
      let (stmt, rest) = self.stmt(tok)?;
      stmts.push(stmt);
      tok = rest;
    }

    let body = self.ast.link(&stmts);
    Ok((self.ast.push(NodeKind::Block { body }, loc), tok + 1))
  }

  // exprStmt = expr? ";"
  fn expr_stmt(&mut self, tok: usize) -> Parsed {
    let loc = self.loc(tok);

    if self.equal(tok, ";") {
      return Ok((self.ast.push(NodeKind::Block { body: None }, loc), tok + 1));
    }

    let (expr, tok) = self.expr(tok)?;
    let rest = self.skip(tok, ";")?;
    Ok((self.ast.push(NodeKind::ExprStmt { expr }, loc), rest))
  }

  /// Parse an expression unless the next token is `terminator`.
  fn optional_expr(
    &mut self,
    tok: usize,
    terminator: &str,
  ) -> CompileResult<(Option<NodeId>, usize)> {
    if self.equal(tok, terminator) {
      return Ok((None, tok));
    }
    let (node, rest) = self.expr(tok)?;
    Ok((Some(node), rest))
  }

  fn expr(&mut self, tok: usize) -> Parsed {
    self.nested(tok, Self::assign)
  }

  // assign = equality ("=" assign)?
  fn assign(&mut self, tok: usize) -> Parsed {
    let (lhs, tok) = self.equality(tok)?;

    if self.equal(tok, "=") {
      let loc = self.loc(tok);
      let (rhs, rest) = self.expr(tok + 1)?;
      return Ok((self.ast.push(NodeKind::Assign { lhs, rhs }, loc), rest));
    }

    Ok((lhs, tok))
  }

  // equality = relational ("==" relational | "!=" relational)*
  fn equality(&mut self, tok: usize) -> Parsed {
    let (mut node, mut tok) = self.relational(tok)?;

    loop {
      let op = match self.punctuator(tok) {
        Some("==") => BinaryOp::Eq,
        Some("!=") => BinaryOp::Ne,
        _ => break,
      };

      let (rhs, rest) = self.relational(tok + 1)?;
      node = self.binary(op, node, rhs, tok);
      tok = rest;
    }

    Ok((node, tok))
  }

  // relational = add ("<" add | "<=" add | ">" add | ">=" add)*
  fn relational(&mut self, tok: usize) -> Parsed {
    let (mut node, mut tok) = self.add(tok)?;

    loop {
      // `x > y` is `y < x`, so only the swapped flag distinguishes them.
      let (op, swapped) = match self.punctuator(tok) {
        Some("<") => (BinaryOp::Lt, false),
        Some("<=") => (BinaryOp::Le, false),
        Some(">") => (BinaryOp::Lt, true),
        Some(">=") => (BinaryOp::Le, true),
        _ => break,
      };

      let (rhs, rest) = self.add(tok + 1)?;
      node = if swapped {
        self.binary(op, rhs, node, tok)
      } else {
        self.binary(op, node, rhs, tok)
      };
      tok = rest;
    }

    Ok((node, tok))
  }

  // add = mul ("+" mul | "-" mul)*
  fn add(&mut self, tok: usize) -> Parsed {
    let (mut node, mut tok) = self.mul(tok)?;

    loop {
      let op = match self.punctuator(tok) {
        Some("+") => BinaryOp::Add,
        Some("-") => BinaryOp::Sub,
        _ => break,
      };

      let (rhs, rest) = self.mul(tok + 1)?;
      node = self.binary(op, node, rhs, tok);
      tok = rest;
    }

    Ok((node, tok))
  }

  // mul = unary ("*" unary | "/" unary)*
  fn mul(&mut self, tok: usize) -> Parsed {
    let (mut node, mut tok) = self.unary(tok)?;

    loop {
      let op = match self.punctuator(tok) {
        Some("*") => BinaryOp::Mul,
        Some("/") => BinaryOp::Div,
        _ => break,
      };

      let (rhs, rest) = self.unary(tok + 1)?;
      node = self.binary(op, node, rhs, tok);
      tok = rest;
    }

    Ok((node, tok))
  }

  // unary = ("+" | "-") unary | primary
  fn unary(&mut self, tok: usize) -> Parsed {
    if self.equal(tok, "+") {
      return self.nested(tok + 1, Self::unary);
    }

    if self.equal(tok, "-") {
      let loc = self.loc(tok);
      let (operand, rest) = self.nested(tok + 1, Self::unary)?;
      return Ok((self.ast.push(NodeKind::Neg { operand }, loc), rest));
    }

    self.primary(tok)
  }

  // primary = "(" expr ")" | ident | num
  fn primary(&mut self, tok: usize) -> Parsed {
    if self.equal(tok, "(") {
      let (node, tok) = self.expr(tok + 1)?;
      let rest = self.skip(tok, ")")?;
      return Ok((node, rest));
    }

    let token = &self.tokens[tok];
    let (kind, loc, value) = (token.kind, token.loc, token.value);
    let text = token_text(token, self.source);
    match kind {
      TokenKind::Ident => {
        let obj = self.find_or_create_var(text);
        Ok((self.ast.push(NodeKind::Var { obj }, loc), tok + 1))
      }
      TokenKind::Num => {
        let value = value.ok_or_else(|| {
          CompileError::syntax(self.source, loc, "internal error: numeric token missing value")
        })?;
        Ok((self.ast.push(NodeKind::Num { value }, loc), tok + 1))
      }
      _ => {
        let got = describe_token(Some(&self.tokens[tok]), self.source);
        Err(CompileError::syntax(
          self.source,
          loc,
          format!("expected an expression, but got \"{got}\""),
        ))
      }
    }
  }

  fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId, tok: usize) -> NodeId {
    let loc = self.loc(tok);
    self.ast.push(NodeKind::Binary { op, lhs, rhs }, loc)
  }

  /// Resolve `name`, declaring it on first use.
  fn find_or_create_var(&mut self, name: &str) -> usize {
    if let Some(obj) = self.locals.iter().position(|obj| obj.name == name) {
      return obj;
    }

    trace!(name, "new local");
    self.locals.push(Obj {
      name: name.to_string(),
      offset: 0,
    });
    self.locals.len() - 1
  }

  fn loc(&self, tok: usize) -> usize {
    self.tokens[tok].loc
  }

  /// The text of the token at `tok` if it is a punctuator.
  fn punctuator(&self, tok: usize) -> Option<&'a str> {
    let token = &self.tokens[tok];
    (token.kind == TokenKind::Punctuator).then(|| token_text(token, self.source))
  }

  /// Whether the token at `tok` is the punctuator or keyword `op`.
  fn equal(&self, tok: usize, op: &str) -> bool {
    let token = &self.tokens[tok];
    matches!(token.kind, TokenKind::Punctuator | TokenKind::Keyword)
      && token_text(token, self.source) == op
  }

  /// Require `op` at `tok`, returning the index just past it.
  fn skip(&self, tok: usize, op: &str) -> CompileResult<usize> {
    if self.equal(tok, op) {
      return Ok(tok + 1);
    }

    let token = &self.tokens[tok];
    let got = describe_token(Some(token), self.source);
    Err(CompileError::syntax(
      self.source,
      token.loc,
      format!("expected \"{op}\", but got \"{got}\""),
    ))
  }

  fn is_eof(&self, tok: usize) -> bool {
    self.tokens[tok].kind == TokenKind::Eof
  }
}
