//! Handler fixtures for unit tests.

use fnh_abi::{
    Contract, FieldDecl, FieldType, OperationDecl, TypeDecl, embed_contract, event_type_name,
};

pub(crate) const GREETER: &str = "com.acme.Greeter";

/// One module backing every fixture handler type.
///
/// `greeter_invoke` echoes its payload through `fnh.log`, so tests can see
/// exactly what the handler received.
pub(crate) const FIXTURE_WAT: &str = r#"(module
  (import "fnh" "log" (func $log (param i32 i32)))
  (import "fnh" "raise" (func $raise (param i32 i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 0) "greeter exploded")
  (func (export "alloc") (param i32) (result i32)
    (local $old i32)
    global.get $heap
    local.tee $old
    local.get 0
    i32.add
    global.set $heap
    local.get $old)
  (func (export "new") (result i32)
    i32.const 1)
  (func (export "greeter_invoke") (param i32 i32 i32)
    local.get 1
    local.get 2
    call $log)
  (func (export "faulty_invoke") (param i32 i32 i32)
    i32.const 0
    i32.const 16
    call $raise)
  (func (export "trapping_invoke") (param i32 i32 i32)
    unreachable)
  (func (export "spinner_invoke") (param i32 i32 i32)
    (loop $spin
      br $spin))
  (func (export "pair_invoke") (param i32 i32 i32 i32 i32))
  (func (export "nullary_invoke") (param i32))
  (func (export "returning_invoke") (param i32 i32 i32) (result i32)
    local.get 0)
)"#;

fn handler(name: &str, constructor: Option<&str>, export: &str) -> TypeDecl {
    TypeDecl::handler(
        name,
        constructor,
        vec![OperationDecl::new("invoke", export, vec![event_type_name(name)])],
    )
}

fn empty_event(handler: &str) -> TypeDecl {
    TypeDecl::record(event_type_name(handler), Vec::new())
}

pub(crate) fn fixture_contract() -> Contract {
    let mut types = vec![
        handler(GREETER, Some("new"), "greeter_invoke"),
        TypeDecl::record(
            event_type_name(GREETER),
            vec![
                FieldDecl::new("name", FieldType::Text),
                FieldDecl::new("age", FieldType::Integer),
                FieldDecl::new("address", FieldType::object("com.acme.Address")),
                FieldDecl::new("tags", FieldType::list(FieldType::Text)),
            ],
        ),
        TypeDecl::record(
            "com.acme.Address",
            vec![
                FieldDecl::new("city", FieldType::Text),
                FieldDecl::new("zip", FieldType::Integer),
            ],
        ),
    ];
    for (name, constructor, export) in [
        ("com.acme.Faulty", Some("new"), "faulty_invoke"),
        ("com.acme.Trapping", Some("new"), "trapping_invoke"),
        ("com.acme.Spinner", Some("new"), "spinner_invoke"),
        ("com.acme.Returning", Some("new"), "returning_invoke"),
        ("com.acme.Abstract", None, "greeter_invoke"),
        ("com.acme.BrokenCtor", Some("missing_new"), "greeter_invoke"),
    ] {
        types.push(handler(name, constructor, export));
        types.push(empty_event(name));
    }

    // no com.acme.Orphan$Event
    types.push(handler("com.acme.Orphan", Some("new"), "greeter_invoke"));

    types.push(TypeDecl::handler(
        "com.acme.Pair",
        Some("new"),
        vec![OperationDecl::new(
            "invoke",
            "pair_invoke",
            vec![event_type_name(GREETER), event_type_name(GREETER)],
        )],
    ));
    types.push(TypeDecl::handler(
        "com.acme.Nullary",
        Some("new"),
        vec![OperationDecl::new("invoke", "nullary_invoke", Vec::new())],
    ));
    types.push(TypeDecl::handler(
        "com.acme.Overloaded",
        Some("new"),
        vec![
            OperationDecl::new(
                "invoke",
                "greeter_invoke",
                vec![event_type_name("com.acme.Overloaded")],
            ),
            OperationDecl::new("invoke", "nullary_invoke", Vec::new()),
        ],
    ));
    types.push(empty_event("com.acme.Overloaded"));
    types.push(TypeDecl::handler(
        "com.acme.Silent",
        Some("new"),
        vec![OperationDecl::new("run", "nullary_invoke", Vec::new())],
    ));
    types.push(TypeDecl::handler(
        "com.acme.Mislabeled",
        Some("new"),
        vec![OperationDecl::new(
            "invoke",
            "greeter_invoke",
            vec![event_type_name(GREETER)],
        )],
    ));
    types.push(empty_event("com.acme.Mislabeled"));

    Contract::new(types)
}

pub(crate) fn artifact(wat: &str, contract: &Contract) -> Vec<u8> {
    let wasm = wat::parse_str(wat).expect("fixture wat");
    embed_contract(&wasm, contract).expect("embed contract")
}

pub(crate) fn fixture_artifact() -> Vec<u8> {
    artifact(FIXTURE_WAT, &fixture_contract())
}
