use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap().parent().unwrap().to_path_buf()
}

fn ember() -> Command {
    let mut cmd = Command::cargo_bin("ember").unwrap();
    cmd.env_remove("EMBER_OPT_LEVEL").env_remove("RUST_LOG");
    cmd
}

fn demo(name: &str) -> PathBuf {
    workspace_root().join("demos").join(name)
}

#[test]
fn runs_hello_demo() {
    ember()
        .arg("run")
        .arg(demo("hello.ember"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, Ember!"));
}

#[test]
fn runs_counting_demo_at_both_levels() {
    for level in ["0", "1"] {
        ember()
            .args(["run", "--opt", level])
            .arg(demo("counting.ember"))
            .assert()
            .success()
            .stdout(predicate::str::contains("while 1"))
            .stdout(predicate::str::contains("for 3"))
            .stdout(predicate::str::contains("loop\nloop\nloop\n"));
    }
}

#[test]
fn runs_fizzbuzz_demo() {
    ember()
        .arg("run")
        .arg(demo("fizzbuzz.ember"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("1\n2\nFizz\n4\nBuzz\n"))
        .stdout(predicate::str::contains("14\nFizzBuzz\n"));
}

#[test]
fn passes_inputs_and_prints_return_value() {
    ember()
        .arg("run")
        .arg(demo("inputs.ember"))
        .args(["--in", "count=2", "--in", "NAME=Ada"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hi Ada\nHi Ada\n"))
        .stdout(predicate::str::contains("20"));
}

#[test]
fn in_var_type_error_fails() {
    ember()
        .arg("run")
        .arg(demo("inputs.ember"))
        .args(["--in", "count=many"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E511"));
}

#[test]
fn runs_list_and_math_demos() {
    ember()
        .arg("run")
        .arg(demo("lists.ember"))
        .assert()
        .success()
        .stdout(predicate::str::contains("count 3"))
        .stdout(predicate::str::contains("total 12"));
    ember()
        .arg("run")
        .arg(demo("math.ember"))
        .assert()
        .success()
        .stdout(predicate::eq("4\n2\n9\ntrue\n"));
}

#[test]
fn runtime_error_is_nonzero() {
    ember()
        .arg("run")
        .arg(demo("bad_type.ember"))
        .args(["--in", "a=text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Runtime Error"))
        .stderr(predicate::str::contains("E501"));
}

#[test]
fn parse_error_shows_position() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let bad_path = tmp_dir.path().join("bad.ember");
    std::fs::write(&bad_path, "print [1]\nif [true]\n").unwrap();

    ember()
        .arg("run")
        .arg(&bad_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parser Error"))
        .stderr(predicate::str::contains("line"));
}

#[test]
fn check_reports_semantic_errors() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let good = tmp_dir.path().join("good.ember");
    let bad = tmp_dir.path().join("bad.ember");
    std::fs::write(&good, "var [x] = [1]\nprint [x]\n").unwrap();
    std::fs::write(&bad, "print [y]\n").unwrap();

    ember().arg("check").arg(&good).assert().success().stdout(predicate::str::contains("ok"));
    ember()
        .arg("check")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Semantic Error"));
}

#[test]
fn disasm_lists_opcodes() {
    ember()
        .arg("disasm")
        .arg(demo("counting.ember"))
        .assert()
        .success()
        .stdout(predicate::str::contains("LessNum"))
        .stdout(predicate::str::contains("Exit"));
    ember()
        .args(["disasm", "--json"])
        .arg(demo("hello.ember"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"string_pool\""));
}

#[test]
fn config_file_limits_the_stack() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let config = tmp_dir.path().join("tiny.json");
    std::fs::write(&config, r#"{ "stack_capacity": 1 }"#).unwrap();

    ember()
        .arg("run")
        .arg(demo("counting.ember"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E503"));
}

#[test]
fn opt_level_env_var_is_read() {
    ember()
        .env("EMBER_OPT_LEVEL", "0")
        .args(["disasm"])
        .arg(demo("counting.ember"))
        .assert()
        .success()
        .stdout(predicate::str::contains("LoopNum").not())
        .stdout(predicate::str::contains("Loop ").not());
}

#[test]
fn missing_file_fails() {
    ember()
        .args(["run", "does-not-exist.ember"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}
