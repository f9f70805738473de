//! Handler contract shared by the harness and the modules it invokes.
//!
//! A handler artifact is a wasm module that carries its type declarations as
//! JSON inside the [`CONTRACT_SECTION`] custom section. The harness never links
//! against handler code at build time; everything it knows about a handler comes
//! from this contract and from the module's exports.

mod section;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use section::{SectionError, append_custom_section, read_custom_sections};

/// Current contract version carried in the custom section.
pub const CONTRACT_VERSION: u8 = 1;

/// Name of the wasm custom section holding the JSON contract.
pub const CONTRACT_SECTION: &str = "fnh.contract";

/// Operation name the harness calls on a handler type.
pub const ENTRY_OPERATION: &str = "invoke";

/// Suffix appended to a handler type name to find its parameter type.
pub const EVENT_TYPE_SUFFIX: &str = "$Event";

/// Linear memory export every handler module must provide.
pub const MEMORY_EXPORT: &str = "memory";

/// Guest allocator export: `(len: i32) -> ptr: i32`.
pub const ALLOC_EXPORT: &str = "alloc";

/// Import module name for host functions offered to handlers.
pub const HOST_MODULE: &str = "fnh";

/// Host import `(ptr: i32, len: i32)` emitting one output line.
pub const LOG_IMPORT: &str = "log";

/// Host import `(ptr: i32, len: i32)` failing the invocation with a message.
pub const RAISE_IMPORT: &str = "raise";

/// Name of the parameter type expected for `handler` (`<handler>$Event`).
pub fn event_type_name(handler: &str) -> String {
    format!("{handler}{EVENT_TYPE_SUFFIX}")
}

/// Type declarations of one artifact.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Contract {
    pub version: u8,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
}

impl Contract {
    pub fn new(types: Vec<TypeDecl>) -> Self {
        Self {
            version: CONTRACT_VERSION,
            types,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContractDecodeError> {
        let contract: Contract = serde_json::from_slice(bytes)?;
        if contract.version != CONTRACT_VERSION {
            return Err(ContractDecodeError::UnsupportedVersion {
                found: contract.version,
            });
        }
        Ok(contract)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ContractEncodeError> {
        serde_json::to_vec(self).map_err(ContractEncodeError::Json)
    }
}

/// One named type: a handler (constructor + operations), a record (fields), or both.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    /// Export `() -> i32` producing a fresh instance handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDecl>,
}

impl TypeDecl {
    pub fn record(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            operations: Vec::new(),
            fields,
        }
    }

    pub fn handler(
        name: impl Into<String>,
        constructor: Option<&str>,
        operations: Vec<OperationDecl>,
    ) -> Self {
        Self {
            name: name.into(),
            constructor: constructor.map(str::to_owned),
            operations,
            fields: Vec::new(),
        }
    }
}

/// Operation declared on a type and the function export implementing it.
///
/// The export takes the instance handle followed by one `(ptr, len)` pair of
/// UTF-8 JSON per declared parameter, all as `i32`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct OperationDecl {
    pub name: String,
    pub export: String,
    /// Parameter type names.
    #[serde(default)]
    pub params: Vec<String>,
}

impl OperationDecl {
    pub fn new(name: impl Into<String>, export: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            export: export.into(),
            params,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of `i32` arguments the export must accept.
    pub fn wasm_arity(&self) -> usize {
        1 + 2 * self.arity()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Semantic type of a record field.
///
/// Scalars are written as plain strings (`"text"`), composites as single-key
/// objects (`{"object": "com.acme.Address"}`, `{"list": "integer"}`).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Object(String),
    List(Box<FieldType>),
}

impl FieldType {
    pub fn list(elem: FieldType) -> Self {
        FieldType::List(Box::new(elem))
    }

    pub fn object(name: impl Into<String>) -> Self {
        FieldType::Object(name.into())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => f.write_str("text"),
            FieldType::Integer => f.write_str("integer"),
            FieldType::Float => f.write_str("float"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Object(name) => write!(f, "object {name}"),
            FieldType::List(elem) => write!(f, "list of {elem}"),
        }
    }
}

/// Append `contract` to `wasm` as a [`CONTRACT_SECTION`] custom section.
pub fn embed_contract(wasm: &[u8], contract: &Contract) -> Result<Vec<u8>, ContractEncodeError> {
    let payload = contract.encode()?;
    Ok(append_custom_section(wasm, CONTRACT_SECTION, &payload)?)
}

#[derive(Debug, Error)]
pub enum ContractDecodeError {
    #[error("contract version {found} is not supported (expected {CONTRACT_VERSION})")]
    UnsupportedVersion { found: u8 },
    #[error("failed to decode contract: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ContractEncodeError {
    #[error("failed to encode contract: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to embed contract: {0}")]
    Section(#[from] SectionError),
}
