//! Handler contract resolution.
//!
//! A handler type must declare exactly one [`ENTRY_OPERATION`] taking exactly
//! one parameter, and that parameter must be the handler's nested event type,
//! found by naming convention: `<handler>` + [`fnh_abi::EVENT_TYPE_SUFFIX`].

use fnh_abi::{ENTRY_OPERATION, event_type_name};

use crate::decoder::ParameterShape;
use crate::error::HarnessError;
use crate::namespace::Namespace;

/// Resolved entry point of one handler type.
#[derive(Clone, Debug)]
pub struct HandlerDescriptor {
    handler: String,
    constructor: Option<String>,
    entry: EntryOperation,
    parameter: ParameterShape,
}

impl HandlerDescriptor {
    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn constructor(&self) -> Option<&str> {
        self.constructor.as_deref()
    }

    pub fn entry(&self) -> &EntryOperation {
        &self.entry
    }

    pub fn parameter(&self) -> &ParameterShape {
        &self.parameter
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryOperation {
    pub name: String,
    /// Function export implementing the operation.
    pub export: String,
}

pub fn resolve(namespace: &Namespace, type_name: &str) -> Result<HandlerDescriptor, HarnessError> {
    let handler = namespace
        .resolve_type(type_name)
        .ok_or_else(|| HarnessError::TypeNotFound {
            name: type_name.to_owned(),
        })?;

    let candidates: Vec<_> = handler.operations(ENTRY_OPERATION).collect();
    let entry = match candidates.as_slice() {
        [only] => *only,
        [] => {
            return Err(HarnessError::EntryOperationMissing {
                handler: type_name.to_owned(),
                operation: ENTRY_OPERATION.to_owned(),
            });
        }
        many => {
            return Err(HarnessError::AmbiguousEntryOperation {
                handler: type_name.to_owned(),
                operation: ENTRY_OPERATION.to_owned(),
                count: many.len(),
            });
        }
    };

    if entry.arity() != 1 {
        return Err(HarnessError::InvalidArity {
            handler: type_name.to_owned(),
            operation: ENTRY_OPERATION.to_owned(),
            arity: entry.arity(),
        });
    }

    let event_name = event_type_name(type_name);
    let parameter = ParameterShape::of(namespace.catalog().clone(), &event_name).ok_or_else(|| {
        HarnessError::ParameterTypeNotFound {
            handler: type_name.to_owned(),
            expected: event_name.clone(),
        }
    })?;
    if entry.params[0] != event_name {
        // the event type exists, but there is no invoke(<handler>$Event)
        return Err(HarnessError::EntryOperationMissing {
            handler: type_name.to_owned(),
            operation: format!("{ENTRY_OPERATION}({event_name})"),
        });
    }

    Ok(HandlerDescriptor {
        handler: type_name.to_owned(),
        constructor: handler.constructor().map(str::to_owned),
        entry: EntryOperation {
            name: entry.name.clone(),
            export: entry.export.clone(),
        },
        parameter,
    })
}
