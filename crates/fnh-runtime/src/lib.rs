//! Function invocation harness: loads a wasm handler artifact, resolves the
//! handler's entry operation, decodes a JSON payload into the handler's event
//! type and invokes it.

mod cache;
mod config;
mod decoder;
mod error;
mod invoker;
mod loader;
mod namespace;
mod pipeline;
mod resolver;
mod value;

#[cfg(test)]
mod testutil;

use std::path::Path;

use anyhow::Result;
use wasmtime::{Config, Engine};

use crate::cache::ModuleCache;
use crate::invoker::Invoker;
use crate::pipeline::{ArtifactSource, Pipeline};

pub use cache::ArtifactKey;
pub use config::HarnessConfig;
pub use decoder::{ParameterShape, decode};
pub use error::{HarnessError, Stage};
pub use invoker::{HandlerRaised, Invocation};
pub use namespace::{CatalogError, Namespace, TypeCatalog, TypeDescriptor};
pub use pipeline::{PipelineError, PipelineState};
pub use resolver::{EntryOperation, HandlerDescriptor, resolve};
pub use value::{Record, Value};

/// Wasmtime engine plus compiled module cache shared by every run.
///
/// Namespaces, stores and decoded instances are created per run; only
/// compiled code is reused.
pub struct Harness {
    engine: Engine,
    cache: ModuleCache,
    invoker: Invoker,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_config(HarnessConfig::default())
    }

    pub fn with_config(config: HarnessConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.wasm_multi_value(true);
        cfg.wasm_threads(false);
        cfg.consume_fuel(config.fuel.is_some());
        cfg.debug_info(false);
        cfg.cranelift_nan_canonicalization(true);
        let engine = Engine::new(&cfg)?;
        let cache = ModuleCache::new(
            engine.clone(),
            config.module_cache_dir,
            config.fuel.is_some(),
        )?;
        Ok(Self {
            engine,
            cache,
            invoker: Invoker::new(config.fuel),
        })
    }

    /// Load the artifact at `path` into a fresh namespace.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Namespace, HarnessError> {
        loader::load_path(&self.cache, &self.engine, path.as_ref())
    }

    pub fn load_bytes(&self, bytes: &[u8]) -> Result<Namespace, HarnessError> {
        loader::load_bytes(&self.cache, &self.engine, bytes)
    }

    pub fn resolve(
        &self,
        namespace: &Namespace,
        handler: &str,
    ) -> Result<HandlerDescriptor, HarnessError> {
        resolver::resolve(namespace, handler)
    }

    pub fn decode(
        &self,
        payload: &str,
        descriptor: &HandlerDescriptor,
    ) -> Result<Record, HarnessError> {
        decoder::decode(payload, descriptor.parameter())
    }

    /// Construct a fresh handler instance and call its entry operation once.
    pub fn invoke(
        &self,
        namespace: &Namespace,
        descriptor: &HandlerDescriptor,
        instance: Record,
    ) -> Result<Invocation, HarnessError> {
        self.invoker.invoke(namespace, descriptor, instance)
    }

    /// Run the whole pipeline against the artifact at `path`.
    pub fn run(
        &self,
        path: impl AsRef<Path>,
        handler: &str,
        payload: &str,
    ) -> Result<Invocation, PipelineError> {
        Pipeline::new(self).run(ArtifactSource::Path(path.as_ref()), handler, payload)
    }

    pub fn run_bytes(
        &self,
        artifact: &[u8],
        handler: &str,
        payload: &str,
    ) -> Result<Invocation, PipelineError> {
        Pipeline::new(self).run(ArtifactSource::Bytes(artifact), handler, payload)
    }
}
