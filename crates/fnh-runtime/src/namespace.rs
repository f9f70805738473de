//! Code namespace of one loaded artifact and its type catalog.

use std::collections::HashSet;
use std::sync::Arc;

use fnh_abi::{Contract, FieldDecl, FieldType, OperationDecl, TypeDecl};
use indexmap::IndexMap;
use thiserror::Error;
use wasmtime::{Engine, Module};

use crate::cache::ArtifactKey;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("type '{name}' is declared twice")]
    DuplicateType { name: String },
    #[error("type '{owner}' declares field '{field}' twice")]
    DuplicateField { owner: String, field: String },
    #[error("field '{owner}.{field}' references undeclared type '{target}'")]
    UndeclaredType {
        owner: String,
        field: String,
        target: String,
    },
}

/// Types declared by one artifact, indexed by fully-qualified name.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: IndexMap<String, TypeDecl>,
}

impl TypeCatalog {
    /// Index a contract, rejecting duplicate names and dangling field references.
    pub fn from_contract(contract: Contract) -> Result<Self, CatalogError> {
        let mut types = IndexMap::with_capacity(contract.types.len());
        for decl in contract.types {
            let mut seen = HashSet::new();
            for field in &decl.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(CatalogError::DuplicateField {
                        owner: decl.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            if types.contains_key(&decl.name) {
                return Err(CatalogError::DuplicateType {
                    name: decl.name.clone(),
                });
            }
            types.insert(decl.name.clone(), decl);
        }
        let catalog = Self { types };
        for decl in catalog.types.values() {
            for field in &decl.fields {
                catalog.check_reference(&decl.name, field, &field.ty)?;
            }
        }
        Ok(catalog)
    }

    fn check_reference(
        &self,
        owner: &str,
        field: &FieldDecl,
        ty: &FieldType,
    ) -> Result<(), CatalogError> {
        match ty {
            FieldType::Object(name) if !self.types.contains_key(name) => {
                Err(CatalogError::UndeclaredType {
                    owner: owner.to_owned(),
                    field: field.name.clone(),
                    target: name.clone(),
                })
            }
            FieldType::List(elem) => self.check_reference(owner, field, elem),
            _ => Ok(()),
        }
    }

    pub fn get(&self, name: &str) -> Option<TypeDescriptor<'_>> {
        self.types.get(name).map(|decl| TypeDescriptor { decl })
    }

    pub fn iter(&self) -> impl Iterator<Item = TypeDescriptor<'_>> {
        self.types.values().map(|decl| TypeDescriptor { decl })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Read-only view of one declared type.
#[derive(Clone, Copy, Debug)]
pub struct TypeDescriptor<'a> {
    decl: &'a TypeDecl,
}

impl<'a> TypeDescriptor<'a> {
    pub fn name(&self) -> &'a str {
        &self.decl.name
    }

    pub fn constructor(&self) -> Option<&'a str> {
        self.decl.constructor.as_deref()
    }

    pub fn fields(&self) -> &'a [FieldDecl] {
        &self.decl.fields
    }

    /// Every operation (overload) called `name`.
    pub fn operations(self, name: &'a str) -> impl Iterator<Item = &'a OperationDecl> + 'a {
        self.decl.operations.iter().filter(move |op| op.name == name)
    }

    pub fn find_operation(&self, name: &str, arity: usize) -> Option<&'a OperationDecl> {
        self.decl
            .operations
            .iter()
            .find(|op| op.name == name && op.arity() == arity)
    }

    pub(crate) fn all_operations(&self) -> &'a [OperationDecl] {
        &self.decl.operations
    }
}

/// Everything resolvable from one loaded artifact.
///
/// Dropping the namespace releases its compiled module reference; the module
/// itself may stay alive in the harness cache.
pub struct Namespace {
    key: ArtifactKey,
    engine: Engine,
    module: Arc<Module>,
    catalog: Arc<TypeCatalog>,
}

impl Namespace {
    pub(crate) fn new(
        key: ArtifactKey,
        engine: Engine,
        module: Arc<Module>,
        catalog: TypeCatalog,
    ) -> Self {
        Self {
            key,
            engine,
            module,
            catalog: Arc::new(catalog),
        }
    }

    /// Hex SHA-256 of the artifact bytes.
    pub fn artifact_id(&self) -> String {
        self.key.hex()
    }

    pub fn resolve_type(&self, name: &str) -> Option<TypeDescriptor<'_>> {
        self.catalog.get(name)
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn module(&self) -> &Module {
        &self.module
    }
}
