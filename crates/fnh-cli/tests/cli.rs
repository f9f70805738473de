use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use fnh_abi::{Contract, FieldDecl, FieldType, OperationDecl, TypeDecl, embed_contract};
use predicates::prelude::*;

const FUNCTION: &str = "com.mattwelke.Function";

const FUNCTION_WAT: &str = r#"(module
  (import "fnh" "log" (func $log (param i32 i32)))
  (import "fnh" "raise" (func $raise (param i32 i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 0) "refused")
  (func (export "alloc") (param i32) (result i32)
    (local $old i32)
    global.get $heap
    local.tee $old
    local.get 0
    i32.add
    global.set $heap
    local.get $old)
  (func (export "function_new") (result i32)
    i32.const 1)
  (func (export "function_invoke") (param i32 i32 i32)
    local.get 1
    local.get 2
    call $log)
  (func (export "refuser_invoke") (param i32 i32 i32)
    i32.const 0
    i32.const 7
    call $raise)
)"#;

fn write_artifact(dir: &Path) -> PathBuf {
    let contract = Contract::new(vec![
        TypeDecl::handler(
            FUNCTION,
            Some("function_new"),
            vec![OperationDecl::new(
                "invoke",
                "function_invoke",
                vec![format!("{FUNCTION}$Event")],
            )],
        ),
        TypeDecl::record(
            format!("{FUNCTION}$Event"),
            vec![
                FieldDecl::new("name", FieldType::Text),
                FieldDecl::new("age", FieldType::Integer),
            ],
        ),
        TypeDecl::handler(
            "com.mattwelke.Refuser",
            Some("function_new"),
            vec![OperationDecl::new(
                "invoke",
                "refuser_invoke",
                vec!["com.mattwelke.Refuser$Event".into()],
            )],
        ),
        TypeDecl::record("com.mattwelke.Refuser$Event", Vec::new()),
    ]);
    let wasm = wat::parse_str(FUNCTION_WAT).unwrap();
    let path = dir.join("function.wasm");
    std::fs::write(&path, embed_contract(&wasm, &contract).unwrap()).unwrap();
    path
}

fn fnh() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fnh"));
    cmd.env("RUST_LOG", "error").env_remove("FNH_FUEL").env_remove("FNH_CACHE_DIR");
    cmd
}

#[test]
fn invokes_handler_and_prints_output() {
    let temp = tempfile::tempdir().unwrap();
    let artifact = write_artifact(temp.path());
    fnh()
        .current_dir(temp.path())
        .arg(&artifact)
        .arg(FUNCTION)
        .arg(r#"{"name":"Alice","age":30}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"Alice""#))
        .stdout(predicate::str::contains(r#""age":30"#));
}

#[test]
fn malformed_payload_exits_nonzero() {
    let temp = tempfile::tempdir().unwrap();
    let artifact = write_artifact(temp.path());
    fnh()
        .current_dir(temp.path())
        .arg(&artifact)
        .arg(FUNCTION)
        .arg(r#"{"name":"#)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error: decode stage failed"))
        .stderr(predicate::str::contains("payload is not valid JSON"));
}

#[test]
fn missing_artifact_reports_load_stage() {
    let temp = tempfile::tempdir().unwrap();
    fnh()
        .current_dir(temp.path())
        .arg(temp.path().join("absent.wasm"))
        .arg(FUNCTION)
        .arg("{}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: load stage failed"))
        .stderr(predicate::str::contains("artifact not found"));
}

#[test]
fn unknown_handler_reports_resolve_stage() {
    let temp = tempfile::tempdir().unwrap();
    let artifact = write_artifact(temp.path());
    fnh()
        .current_dir(temp.path())
        .arg(&artifact)
        .arg("com.mattwelke.Missing")
        .arg("{}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: resolve stage failed"))
        .stderr(predicate::str::contains("type 'com.mattwelke.Missing' not found"));
}

#[test]
fn handler_error_is_surfaced() {
    let temp = tempfile::tempdir().unwrap();
    let artifact = write_artifact(temp.path());
    fnh()
        .current_dir(temp.path())
        .arg(&artifact)
        .arg("com.mattwelke.Refuser")
        .arg("{}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: invoke stage failed"))
        .stderr(predicate::str::contains("handler raised: refused"));
}

#[test]
fn dotenv_supplies_cache_dir() {
    let temp = tempfile::tempdir().unwrap();
    let artifact = write_artifact(temp.path());
    let cache = temp.path().join("cache");
    std::fs::write(
        temp.path().join(".env"),
        format!("FNH_CACHE_DIR={}\n", cache.display()),
    )
    .unwrap();
    fnh()
        .current_dir(temp.path())
        .arg(&artifact)
        .arg(FUNCTION)
        .arg("{}")
        .assert()
        .success();
    assert!(cache.exists(), "cache dir not created from .env");
}
