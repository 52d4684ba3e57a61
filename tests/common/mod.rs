//! A tiny interpreter for the RV64 subset the compiler emits, so tests can
//! check what a program computes rather than how its assembly is spelled.

use std::collections::HashMap;

const STACK_TOP: i64 = 0x10_0000;
const STEP_LIMIT: usize = 1_000_000;

/// Run `asm` from `main` until its `ret`, returning `a0`.
///
/// Panics on anything outside the supported subset, on an unbalanced stack at
/// exit, or when the step limit is hit.
pub fn run(asm: &str) -> i64 {
  let mut program: Vec<Vec<String>> = Vec::new();
  let mut labels = HashMap::new();

  for line in asm.lines().map(str::trim) {
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    if let Some(label) = line.strip_suffix(':') {
      labels.insert(label.to_string(), program.len());
      continue;
    }
    if line.starts_with('.') {
      continue;
    }
    let (mnemonic, operands) = line.split_once(' ').unwrap_or((line, ""));
    let mut instruction = vec![mnemonic.to_string()];
    instruction.extend(
      operands
        .split(',')
        .map(str::trim)
        .filter(|operand| !operand.is_empty())
        .map(String::from),
    );
    program.push(instruction);
  }

  let mut machine = Machine {
    regs: HashMap::from([("sp".to_string(), STACK_TOP), ("fp".to_string(), 0)]),
    memory: HashMap::new(),
  };
  let mut pc = labels["main"];

  for _ in 0..STEP_LIMIT {
    let ins = &program[pc];
    pc += 1;
    let op: Vec<&str> = ins.iter().map(String::as_str).collect();
    match op.as_slice() {
      ["li", rd, imm] => machine.set(rd, imm.parse().unwrap()),
      ["mv", rd, rs] => machine.set(rd, machine.get(rs)),
      ["neg", rd, rs] => machine.set(rd, machine.get(rs).wrapping_neg()),
      ["addi", rd, rs, imm] => {
        machine.set(rd, machine.get(rs).wrapping_add(imm.parse::<i64>().unwrap()))
      }
      ["xori", rd, rs, imm] => machine.set(rd, machine.get(rs) ^ imm.parse::<i64>().unwrap()),
      ["seqz", rd, rs] => machine.set(rd, i64::from(machine.get(rs) == 0)),
      ["snez", rd, rs] => machine.set(rd, i64::from(machine.get(rs) != 0)),
      [name @ ("add" | "sub" | "mul" | "div" | "xor" | "slt"), rd, rs1, rs2] => {
        let (a, b) = (machine.get(rs1), machine.get(rs2));
        let value = match *name {
          "add" => a.wrapping_add(b),
          "sub" => a.wrapping_sub(b),
          "mul" => a.wrapping_mul(b),
          "div" if b == 0 => -1,
          "div" => a.wrapping_div(b),
          "xor" => a ^ b,
          _ => i64::from(a < b),
        };
        machine.set(rd, value);
      }
      ["sd", rs, mem] => {
        let addr = machine.address(mem);
        machine.memory.insert(addr, machine.get(rs));
      }
      ["ld", rd, mem] => {
        let addr = machine.address(mem);
        let value = *machine
          .memory
          .get(&addr)
          .unwrap_or_else(|| panic!("load from uninitialised address {addr:#x}"));
        machine.set(rd, value);
      }
      ["beqz", rs, label] => {
        if machine.get(rs) == 0 {
          pc = labels[*label];
        }
      }
      ["j", label] => pc = labels[*label],
      ["ret"] => {
        assert_eq!(machine.get("sp"), STACK_TOP, "stack pointer not restored");
        return machine.get("a0");
      }
      other => panic!("unsupported instruction: {other:?}"),
    }
  }

  panic!("program did not finish within {STEP_LIMIT} steps");
}

struct Machine {
  regs: HashMap<String, i64>,
  memory: HashMap<i64, i64>,
}

impl Machine {
  fn get(&self, reg: &str) -> i64 {
    self.regs.get(reg).copied().unwrap_or(0)
  }

  fn set(&mut self, reg: &str, value: i64) {
    self.regs.insert(reg.to_string(), value);
  }

  /// Resolve an `offset(base)` operand.
  fn address(&self, operand: &str) -> i64 {
    let (offset, base) = operand
      .strip_suffix(')')
      .and_then(|operand| operand.split_once('('))
      .unwrap_or_else(|| panic!("bad memory operand: {operand}"));
    offset.parse::<i64>().unwrap() + self.get(base)
  }
}
