use std::fs;
use std::process::{Command, Output};

fn rvcc(args: &[&str]) -> Output {
  Command::new(env!("CARGO_BIN_EXE_rvcc"))
    .args(args)
    .output()
    .expect("failed to spawn rvcc")
}

fn stdout(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn prints_assembly_for_a_valid_program() {
  let output = rvcc(&["a=3; b=5; return a+b;"]);
  assert!(output.status.success());
  let asm = stdout(&output);
  assert!(asm.starts_with("  .globl main\nmain:\n"));
  assert!(asm.ends_with("  ret\n"));
  assert!(stderr(&output).is_empty());
}

#[test]
fn source_may_begin_with_a_minus() {
  let output = rvcc(&["-1;"]);
  assert!(output.status.success(), "{}", stderr(&output));
  assert!(stdout(&output).contains("neg a0, a0"));
}

#[test]
fn missing_source_is_a_usage_error() {
  let output = rvcc(&[]);
  assert!(!output.status.success());
  assert!(stdout(&output).is_empty());
  assert!(stderr(&output).contains("Usage"));
}

#[test]
fn extra_arguments_are_a_usage_error() {
  let output = rvcc(&["1;", "2;"]);
  assert!(!output.status.success());
  assert!(stdout(&output).is_empty());
}

#[test]
fn syntax_error_prints_caret_and_nothing_on_stdout() {
  let output = rvcc(&["(1+2)*3"]);
  assert_eq!(output.status.code(), Some(1));
  assert!(stdout(&output).is_empty());
  assert_eq!(
    stderr(&output),
    "(1+2)*3\n       ^ expected \";\", but got \"EOF\"\n"
  );
}

#[test]
fn lvalue_error_exits_non_zero() {
  let output = rvcc(&["1=2;"]);
  assert_eq!(output.status.code(), Some(1));
  assert!(stdout(&output).is_empty());
  assert!(stderr(&output).contains("not an lvalue"));
}

#[test]
fn lexical_error_exits_non_zero() {
  let output = rvcc(&["a = 1 $ 2;"]);
  assert_eq!(output.status.code(), Some(1));
  assert!(stdout(&output).is_empty());
  assert!(stderr(&output).contains("^ invalid token: '$'"));
}

#[test]
fn output_flag_writes_a_file() {
  let path = std::env::temp_dir().join(format!("rvcc-cli-{}.s", std::process::id()));
  let path_arg = path.to_str().unwrap();

  let output = rvcc(&["--annotate", "-o", path_arg, "return 42;"]);
  assert!(output.status.success(), "{}", stderr(&output));
  assert!(stdout(&output).is_empty());

  let asm = fs::read_to_string(&path).unwrap();
  assert!(asm.contains("li a0, 42"));
  assert!(asm.contains("  # return a0\n"));
  fs::remove_file(&path).unwrap();
}

#[test]
fn verbose_logging_goes_to_stderr() {
  let output = rvcc(&["-vv", "x=1;"]);
  assert!(output.status.success());
  assert!(!stdout(&output).contains("parsed program"));
  assert!(stderr(&output).contains("parsed program"));
}

#[test]
fn deep_parentheses_are_a_diagnostic_not_a_crash() {
  let n = 50_000;
  let source = format!("{}1{};", "(".repeat(n), ")".repeat(n));
  let output = rvcc(&[&source]);
  assert_eq!(output.status.code(), Some(1));
  assert!(stdout(&output).is_empty());
  assert!(stderr(&output).ends_with("^ nested too deeply\n"));
}

#[test]
fn long_operator_chain_is_a_diagnostic_not_a_crash() {
  let source = format!("{}1;", "1+".repeat(50_000));
  let output = rvcc(&[&source]);
  assert_eq!(output.status.code(), Some(1));
  assert!(stdout(&output).is_empty());
  assert!(stderr(&output).ends_with("^ expression nested too deeply\n"));
}
