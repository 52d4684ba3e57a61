//! Code generation: lower the parsed AST into RISC-V (RV64) assembly.
//!
//! The emitter is a simple stack machine. Every expression leaves its value in
//! `a0`; a binary operator evaluates its right operand first, pushes it onto
//! the machine stack, evaluates the left operand into `a0` and pops the right
//! one back into `a1`. Locals live below the frame pointer `fp`.
//!
//! Frame layout after the prologue:
//!
//! ```text
//! | saved fp, pad   | <- fp (16 bytes, keeps sp 16-byte aligned)
//! | locals          |    fp-8, fp-16, ...
//! | scratch values  | <- sp = fp - stack_size - 8*depth
//! ```
//!
//! `addi` only takes a 12-bit signed immediate, so frame sizes and offsets
//! outside that range go through the scratch register `t0`.

use snafu::ensure;
use tracing::{debug, trace};

use crate::Options;
use crate::error::{CompileError, CompileResult, InvalidNodeSnafu, StackImbalanceSnafu};
use crate::parser::{BinaryOp, Function, NodeId, NodeKind};

/// Immediates encodable in an I-type instruction.
const IMM12: std::ops::RangeInclusive<i64> = -2048..=2047;

/// Deepest expression tree the recursive emitter will walk. Left-associative
/// chains such as `1+1+...` grow this without any parser recursion.
pub const MAX_EXPR_DEPTH: usize = 512;

/// Lay out locals, then emit assembly for the whole program.
pub fn generate(func: &mut Function, source: &str, options: &Options) -> CompileResult<String> {
  assign_lvar_offsets(func);

  let mut codegen = Codegen::new(func, source, options.annotate);
  codegen.emit_program()?;
  debug!(
    labels = codegen.label_count,
    bytes = codegen.asm.len(),
    "generated assembly"
  );
  Ok(codegen.asm)
}

/// Give every local an 8-byte slot below `fp` and size the frame, keeping `sp`
/// 16-byte aligned.
pub fn assign_lvar_offsets(func: &mut Function) {
  let mut offset = 0;
  for obj in &mut func.locals {
    offset += 8;
    obj.offset = -offset;
  }
  func.stack_size = align_to(offset, 16);
  debug!(
    locals = func.locals.len(),
    stack_size = func.stack_size,
    "assigned local offsets"
  );
}

/// Round `n` up to the nearest multiple of `align`.
fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

/// Emission state for one compilation.
struct Codegen<'a> {
  func: &'a Function,
  source: &'a str,
  annotate: bool,
  asm: String,
  /// Values currently pushed onto the machine stack.
  depth: i64,
  /// Active `gen_expr` calls.
  nesting: usize,
  label_count: usize,
}

impl<'a> Codegen<'a> {
  fn new(func: &'a Function, source: &'a str, annotate: bool) -> Self {
    Self {
      func,
      source,
      annotate,
      asm: String::new(),
      depth: 0,
      nesting: 0,
      label_count: 0,
    }
  }

  fn emit_program(&mut self) -> CompileResult<()> {
    let func = self.func;

    self.emit(".globl main");
    self.label("main");

    self.comment("save the caller's fp and point fp at it");
    self.emit("addi sp, sp, -16");
    self.emit("sd fp, 0(sp)");
    self.emit("mv fp, sp");
    if func.stack_size > 0 {
      self.comment(&format!("reserve {} bytes for locals", func.stack_size));
      self.emit_addi("sp", "sp", -func.stack_size);
    }

    let top_level = match &func.ast[func.body].kind {
      NodeKind::Block { body } => *body,
      _ => Some(func.body),
    };
    for stmt in func.ast.siblings(top_level) {
      self.gen_stmt(stmt)?;
      ensure!(self.depth == 0, StackImbalanceSnafu { depth: self.depth });
    }

    self.label(".L.return");
    self.comment("restore the caller's fp and sp");
    self.emit("mv sp, fp");
    self.emit("ld fp, 0(sp)");
    self.emit("addi sp, sp, 16");
    self.emit("ret");
    Ok(())
  }

  fn gen_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let func = self.func;
    let node = &func.ast[id];
    trace!(kind = node.kind.name(), loc = node.loc, "statement");

    match &node.kind {
      NodeKind::If { cond, then, els } => {
        let c = self.next_label();
        self.comment(&format!("if #{c}"));
        self.gen_expr(*cond)?;
        self.emit(&format!("beqz a0, .L.else.{c}"));
        self.gen_stmt(*then)?;
        self.emit(&format!("j .L.end.{c}"));
        self.label(&format!(".L.else.{c}"));
        if let Some(els) = els {
          self.gen_stmt(*els)?;
        }
        self.label(&format!(".L.end.{c}"));
        Ok(())
      }
      NodeKind::For {
        init,
        cond,
        inc,
        then,
      } => {
        let c = self.next_label();
        self.comment(&format!("loop #{c}"));
        if let Some(init) = init {
          self.gen_stmt(*init)?;
        }
        self.label(&format!(".L.begin.{c}"));
        if let Some(cond) = cond {
          self.gen_expr(*cond)?;
          self.emit(&format!("beqz a0, .L.end.{c}"));
        }
        self.gen_stmt(*then)?;
        if let Some(inc) = inc {
          self.gen_expr(*inc)?;
        }
        self.emit(&format!("j .L.begin.{c}"));
        self.label(&format!(".L.end.{c}"));
        Ok(())
      }
      NodeKind::Block { body } => {
        for stmt in func.ast.siblings(*body) {
          self.gen_stmt(stmt)?;
        }
        Ok(())
      }
      NodeKind::Return { expr } => {
        self.gen_expr(*expr)?;
        self.comment("return a0");
        self.emit("j .L.return");
        Ok(())
      }
      NodeKind::ExprStmt { expr } => self.gen_expr(*expr),
      NodeKind::Num { .. }
      | NodeKind::Var { .. }
      | NodeKind::Neg { .. }
      | NodeKind::Binary { .. }
      | NodeKind::Assign { .. } => InvalidNodeSnafu {
        node: node.kind.name(),
        expected: "statement",
      }
      .fail(),
    }
  }

  fn gen_expr(&mut self, id: NodeId) -> CompileResult<()> {
    if self.nesting >= MAX_EXPR_DEPTH {
      let loc = self.func.ast[id].loc;
      return Err(CompileError::syntax(
        self.source,
        loc,
        "expression nested too deeply",
      ));
    }

    self.nesting += 1;
    let result = self.gen_expr_node(id);
    self.nesting -= 1;
    result
  }

  fn gen_expr_node(&mut self, id: NodeId) -> CompileResult<()> {
    let func = self.func;
    let node = &func.ast[id];

    match &node.kind {
      NodeKind::Num { value } => {
        self.emit(&format!("li a0, {value}"));
        Ok(())
      }
      NodeKind::Neg { operand } => {
        self.gen_expr(*operand)?;
        self.emit("neg a0, a0");
        Ok(())
      }
      NodeKind::Var { .. } => {
        self.gen_addr(id)?;
        self.emit("ld a0, 0(a0)");
        Ok(())
      }
      NodeKind::Assign { lhs, rhs } => {
        self.gen_addr(*lhs)?;
        self.push();
        self.gen_expr(*rhs)?;
        self.pop("a1");
        self.comment("store a0 at the address in a1");
        self.emit("sd a0, 0(a1)");
        Ok(())
      }
      NodeKind::Binary { op, lhs, rhs } => {
        self.gen_expr(*rhs)?;
        self.push();
        self.gen_expr(*lhs)?;
        self.pop("a1");
        self.gen_binary(*op);
        Ok(())
      }
      NodeKind::ExprStmt { .. }
      | NodeKind::Return { .. }
      | NodeKind::Block { .. }
      | NodeKind::If { .. }
      | NodeKind::For { .. } => InvalidNodeSnafu {
        node: node.kind.name(),
        expected: "expression",
      }
      .fail(),
    }
  }

  /// Combine `a0` (left) and `a1` (right) into `a0`.
  fn gen_binary(&mut self, op: BinaryOp) {
    match op {
      BinaryOp::Add => self.emit("add a0, a0, a1"),
      BinaryOp::Sub => self.emit("sub a0, a0, a1"),
      BinaryOp::Mul => self.emit("mul a0, a0, a1"),
      BinaryOp::Div => self.emit("div a0, a0, a1"),
      BinaryOp::Eq => {
        self.emit("xor a0, a0, a1");
        self.emit("seqz a0, a0");
      }
      BinaryOp::Ne => {
        self.emit("xor a0, a0, a1");
        self.emit("snez a0, a0");
      }
      BinaryOp::Lt => self.emit("slt a0, a0, a1"),
      BinaryOp::Le => {
        // a0 <= a1 is !(a1 < a0)
        self.emit("slt a0, a1, a0");
        self.emit("xori a0, a0, 1");
      }
    }
  }

  /// Load the address of an lvalue into `a0`.
  fn gen_addr(&mut self, id: NodeId) -> CompileResult<()> {
    let func = self.func;
    let node = &func.ast[id];

    match &node.kind {
      NodeKind::Var { obj } => {
        let local = &func.locals[*obj];
        self.comment(&format!("&{} = fp{}", local.name, local.offset));
        self.emit_addi("a0", "fp", local.offset);
        Ok(())
      }
      _ => Err(CompileError::not_lvalue(self.source, node.loc)),
    }
  }

  fn push(&mut self) {
    self.emit("addi sp, sp, -8");
    self.emit("sd a0, 0(sp)");
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.emit(&format!("ld {reg}, 0(sp)"));
    self.emit("addi sp, sp, 8");
    self.depth -= 1;
  }

  fn next_label(&mut self) -> usize {
    self.label_count += 1;
    self.label_count
  }

  /// `rd = rs + imm` for any 64-bit `imm`.
  fn emit_addi(&mut self, rd: &str, rs: &str, imm: i64) {
    if IMM12.contains(&imm) {
      self.emit(&format!("addi {rd}, {rs}, {imm}"));
    } else {
      self.emit(&format!("li t0, {imm}"));
      self.emit(&format!("add {rd}, {rs}, t0"));
    }
  }

  fn emit(&mut self, instruction: &str) {
    self.asm.push_str("  ");
    self.asm.push_str(instruction);
    self.asm.push('\n');
  }

  fn label(&mut self, name: &str) {
    self.asm.push_str(name);
    self.asm.push_str(":\n");
  }

  fn comment(&mut self, text: &str) {
    if self.annotate {
      self.asm.push_str(&format!("  # {text}\n"));
    }
  }
}
