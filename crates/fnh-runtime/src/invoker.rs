//! Handler instantiation and entry operation calls.
//!
//! Every invocation gets its own `Store`, so the handler instance and the guest
//! memory holding the decoded parameter are dropped when the call returns,
//! whatever the outcome.

use anyhow::{Context, Result, anyhow};
use fnh_abi::{ALLOC_EXPORT, HOST_MODULE, LOG_IMPORT, MEMORY_EXPORT, RAISE_IMPORT};
use log::{debug, info};
use thiserror::Error;
use wasmtime::{Caller, Engine, Linker, Store, Trap, Val};

use crate::error::HarnessError;
use crate::namespace::Namespace;
use crate::resolver::HandlerDescriptor;
use crate::value::Record;

/// Outcome of one completed invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub handler: String,
    /// Lines the handler emitted through `fnh.log`, in order.
    pub output: Vec<String>,
}

/// Error a handler raises through `fnh.raise`.
#[derive(Debug, Error)]
#[error("handler raised: {message}")]
pub struct HandlerRaised {
    pub message: String,
}

#[derive(Default)]
struct HostState {
    output: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Invoker {
    fuel: Option<u64>,
}

impl Invoker {
    pub(crate) fn new(fuel: Option<u64>) -> Self {
        Self { fuel }
    }

    pub(crate) fn invoke(
        &self,
        namespace: &Namespace,
        descriptor: &HandlerDescriptor,
        instance: Record,
    ) -> Result<Invocation, HarnessError> {
        let handler = descriptor.handler();
        let mut store = Store::new(namespace.engine(), HostState::default());
        if let Some(fuel) = self.fuel {
            store
                .set_fuel(fuel)
                .map_err(|err| HarnessError::instantiation(handler, format!("{err:#}")))?;
        }

        let linker = host_linker(namespace.engine())
            .map_err(|err| HarnessError::instantiation(handler, format!("{err:#}")))?;
        let wasm = linker
            .instantiate(&mut store, namespace.module())
            .map_err(|err| self.classify(handler, err, instantiation_failed(handler)))?;

        let memory = wasm.get_memory(&mut store, MEMORY_EXPORT).ok_or_else(|| {
            HarnessError::instantiation(handler, format!("export '{MEMORY_EXPORT}' not found"))
        })?;
        let alloc = wasm
            .get_typed_func::<i32, i32>(&mut store, ALLOC_EXPORT)
            .map_err(|err| HarnessError::instantiation(handler, format!("{err:#}")))?;

        let constructor = descriptor.constructor().ok_or_else(|| {
            HarnessError::instantiation(handler, "type declares no constructor")
        })?;
        let new = wasm
            .get_typed_func::<(), i32>(&mut store, constructor)
            .with_context(|| format!("constructor export '{constructor}'"))
            .map_err(|err| HarnessError::instantiation(handler, format!("{err:#}")))?;
        let this = new
            .call(&mut store, ())
            .context("constructor trapped")
            .map_err(|err| self.classify(handler, err, instantiation_failed(handler)))?;

        let payload = instance.to_json().to_string().into_bytes();
        let payload_len = i32::try_from(payload.len())
            .map_err(|_| HarnessError::instantiation(handler, "payload too large for wasm32"))?;
        let payload_ptr = alloc
            .call(&mut store, payload_len)
            .context("allocate parameter")
            .map_err(|err| self.classify(handler, err, instantiation_failed(handler)))?;
        let offset = usize::try_from(payload_ptr).map_err(|_| {
            HarnessError::instantiation(handler, "alloc returned a negative pointer")
        })?;
        memory.write(&mut store, offset, &payload).map_err(|err| {
            HarnessError::instantiation(handler, format!("write parameter: {err}"))
        })?;

        let entry = &descriptor.entry().export;
        let func = wasm.get_func(&mut store, entry).ok_or_else(|| {
            HarnessError::instantiation(handler, format!("export '{entry}' not found"))
        })?;
        let mut results: Vec<Val> = func
            .ty(&store)
            .results()
            .map(|_| Val::I32(0))
            .collect();
        debug!("calling {handler}.{} via export '{entry}'", descriptor.entry().name);
        func.call(
            &mut store,
            &[
                Val::I32(this),
                Val::I32(payload_ptr),
                Val::I32(payload_len),
            ],
            &mut results,
        )
        .map_err(|err| {
            self.classify(handler, err, |source| HarnessError::HandlerExecutionFailed {
                handler: handler.to_owned(),
                source,
            })
        })?;
        if !results.is_empty() {
            debug!("discarding {} return value(s) from {handler}", results.len());
        }

        let output = store.into_data().output;
        info!("invoked {handler} ({} output lines)", output.len());
        Ok(Invocation {
            handler: handler.to_owned(),
            output,
        })
    }

    /// Map a wasm failure, singling out exhausted fuel.
    fn classify(
        &self,
        handler: &str,
        err: anyhow::Error,
        otherwise: impl FnOnce(anyhow::Error) -> HarnessError,
    ) -> HarnessError {
        match (self.fuel, err.downcast_ref::<Trap>()) {
            (Some(fuel), Some(Trap::OutOfFuel)) => HarnessError::ExecutionBudgetExceeded {
                handler: handler.to_owned(),
                fuel,
            },
            _ => otherwise(err),
        }
    }
}

fn instantiation_failed(handler: &str) -> impl FnOnce(anyhow::Error) -> HarnessError + '_ {
    move |err| HarnessError::instantiation(handler, format!("{err:#}"))
}

fn host_linker(engine: &Engine) -> Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);
    linker.func_wrap(
        HOST_MODULE,
        LOG_IMPORT,
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> Result<()> {
            let line = read_guest_str(&mut caller, ptr, len)?;
            info!(target: "fnh::guest", "{line}");
            caller.data_mut().output.push(line);
            Ok(())
        },
    )?;
    linker.func_wrap(
        HOST_MODULE,
        RAISE_IMPORT,
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> Result<()> {
            let message = read_guest_str(&mut caller, ptr, len)?;
            Err(HandlerRaised { message }.into())
        },
    )?;
    Ok(linker)
}

fn read_guest_str(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> Result<String> {
    let memory = caller
        .get_export(MEMORY_EXPORT)
        .and_then(|export| export.into_memory())
        .ok_or_else(|| anyhow!("wasm export '{MEMORY_EXPORT}' not found"))?;
    let start = usize::try_from(ptr).context("negative pointer")?;
    let len = usize::try_from(len).context("negative length")?;
    let bytes = start
        .checked_add(len)
        .and_then(|end| memory.data(&*caller).get(start..end))
        .context("guest string out of bounds")?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
