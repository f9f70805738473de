//! Artifact loading: raw module bytes to a validated [`Namespace`].

use std::fs;
use std::path::Path;

use fnh_abi::{CONTRACT_SECTION, Contract, read_custom_sections};
use log::debug;
use wasmtime::{Engine, ExternType, Module, ValType};

use crate::cache::{ArtifactKey, ModuleCache};
use crate::error::HarnessError;
use crate::namespace::{Namespace, TypeCatalog};

pub(crate) fn load_path(
    cache: &ModuleCache,
    engine: &Engine,
    path: &Path,
) -> Result<Namespace, HarnessError> {
    let bytes = fs::read(path).map_err(|source| HarnessError::ArtifactNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    load_bytes(cache, engine, &bytes)
}

pub(crate) fn load_bytes(
    cache: &ModuleCache,
    engine: &Engine,
    bytes: &[u8],
) -> Result<Namespace, HarnessError> {
    let sections = read_custom_sections(bytes, CONTRACT_SECTION)
        .map_err(|err| HarnessError::corrupt(err.to_string()))?;
    let raw = match sections.as_slice() {
        [only] => *only,
        [] => {
            return Err(HarnessError::corrupt(format!(
                "missing '{CONTRACT_SECTION}' custom section"
            )));
        }
        many => {
            return Err(HarnessError::corrupt(format!(
                "found {} '{CONTRACT_SECTION}' custom sections, expected one",
                many.len()
            )));
        }
    };
    let contract = Contract::decode(raw).map_err(|err| HarnessError::corrupt(err.to_string()))?;
    let catalog = TypeCatalog::from_contract(contract)
        .map_err(|err| HarnessError::corrupt(err.to_string()))?;

    let key = ArtifactKey::from_bytes(bytes);
    let module = cache
        .module(&key, bytes)
        .map_err(|err| HarnessError::corrupt(format!("invalid wasm module: {err:#}")))?;
    check_operation_exports(&module, &catalog)?;

    debug!(
        "loaded artifact {} declaring {} types",
        key.hex(),
        catalog.len()
    );
    Ok(Namespace::new(key, engine.clone(), module, catalog))
}

/// Every declared operation must be backed by a function export taking the
/// instance handle plus one `(ptr, len)` pair per parameter.
fn check_operation_exports(
    module: &Module,
    catalog: &TypeCatalog,
) -> Result<(), HarnessError> {
    for ty in catalog.iter() {
        for op in ty.all_operations() {
            let func = match module.get_export(&op.export) {
                Some(ExternType::Func(func)) => func,
                Some(_) => {
                    return Err(HarnessError::corrupt(format!(
                        "export '{}' for '{}.{}' is not a function",
                        op.export,
                        ty.name(),
                        op.name
                    )));
                }
                None => {
                    return Err(HarnessError::corrupt(format!(
                        "export '{}' for '{}.{}' is missing",
                        op.export,
                        ty.name(),
                        op.name
                    )));
                }
            };
            let params: Vec<ValType> = func.params().collect();
            let all_i32 = params.iter().all(|param| matches!(param, ValType::I32));
            if params.len() != op.wasm_arity() || !all_i32 {
                return Err(HarnessError::corrupt(format!(
                    "export '{}' for '{}.{}' must take {} i32 parameters",
                    op.export,
                    ty.name(),
                    op.name,
                    op.wasm_arity()
                )));
            }
        }
    }
    Ok(())
}
