//! Compiled module cache keyed by artifact content.
//!
//! Artifacts are addressed by the SHA-256 of their bytes, so a changed artifact
//! never hits a stale entry. The optional disk layer lives under a directory
//! named after the engine configuration fingerprint.

use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::debug;
use sha2::{Digest, Sha256};
use wasmtime::{Engine, Module};

const WASMTIME_VERSION: &str = "36.0.3";

pub(crate) struct ModuleCache {
    engine: Engine,
    modules: Mutex<HashMap<ArtifactKey, Arc<Module>>>,
    disk: Option<DiskCache>,
}

impl ModuleCache {
    pub(crate) fn new(engine: Engine, cache_dir: Option<PathBuf>, fuel: bool) -> Result<Self> {
        let disk = match cache_dir {
            Some(root) => {
                let fingerprint = engine_cache_fingerprint(fuel);
                let engine_dir = root.join(&fingerprint);
                fs::create_dir_all(&engine_dir)
                    .with_context(|| format!("create cache dir {}", engine_dir.display()))?;
                Some(DiskCache {
                    root,
                    engine_fingerprint: fingerprint,
                })
            }
            None => None,
        };
        Ok(Self {
            engine,
            modules: Mutex::new(HashMap::new()),
            disk,
        })
    }

    /// Obtain a compiled module for `key`, compiling `wasm_bytes` on a miss.
    pub(crate) fn module(&self, key: &ArtifactKey, wasm_bytes: &[u8]) -> Result<Arc<Module>> {
        if let Some(existing) = self.lock().get(key).cloned() {
            debug!("module cache hit for {}", key.hex());
            return Ok(existing);
        }

        if let Some(serialized) = self.load_serialized(key) {
            debug!("loaded serialized module for {}", key.hex());
            return Ok(self.insert(*key, serialized));
        }

        let compiled = Arc::new(Module::new(&self.engine, wasm_bytes)?);
        if let Err(err) = self.store_serialized(key, &compiled) {
            debug!("skipping module cache write for {}: {err:#}", key.hex());
        }
        Ok(self.insert(*key, compiled))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ArtifactKey, Arc<Module>>> {
        self.modules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, key: ArtifactKey, module: Arc<Module>) -> Arc<Module> {
        self.lock().entry(key).or_insert(module).clone()
    }

    fn load_serialized(&self, key: &ArtifactKey) -> Option<Arc<Module>> {
        let path = self.disk.as_ref()?.module_path(key);
        let bytes = fs::read(&path).ok()?;
        // Safety: entries are only written by `store_serialized` under a
        // directory fingerprinted with this engine's configuration.
        match unsafe { Module::deserialize(&self.engine, &bytes) } {
            Ok(module) => Some(Arc::new(module)),
            Err(_) => {
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn store_serialized(&self, key: &ArtifactKey, module: &Module) -> Result<()> {
        let Some(disk) = &self.disk else {
            return Ok(());
        };
        let bytes = module.serialize().context("serialize compiled module")?;
        let path = disk.module_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create cache dir {}", parent.display()))?;
        }
        write_file_atomic(&path, &bytes)
            .with_context(|| format!("write serialized module {}", path.display()))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn disk_path(&self, key: &ArtifactKey) -> Option<PathBuf> {
        self.disk.as_ref().map(|disk| disk.module_path(key))
    }
}

struct DiskCache {
    root: PathBuf,
    engine_fingerprint: String,
}

impl DiskCache {
    fn module_path(&self, key: &ArtifactKey) -> PathBuf {
        self.root
            .join(&self.engine_fingerprint)
            .join(key.hex())
            .join("module.cmod")
    }
}

/// Write through a sibling temp file so concurrent readers never see a partial module.
fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path '{}' has no parent", path.display()))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid file name '{}'", path.display()))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{name}.fnh-tmp-{}-{nanos}", process::id()));

    fs::write(&tmp_path, bytes)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

/// Content address of an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactKey([u8; 32]);

impl ArtifactKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        Self(digest)
    }

    pub fn hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            let _ = write!(&mut out, "{:02x}", byte);
        }
        out
    }
}

fn engine_cache_fingerprint(fuel: bool) -> String {
    let desc = format!(
        "wasmtime:{version};arch:{arch};os:{os};multi_value:1;threads:0;fuel:{fuel};\
         debug:0;nan_canon:1",
        version = WASMTIME_VERSION,
        arch = std::env::consts::ARCH,
        os = std::env::consts::OS,
        fuel = u8::from(fuel),
    );
    let digest = Sha256::digest(desc.as_bytes());
    format!("engine-{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_content_addressed() {
        let a = ArtifactKey::from_bytes(b"one");
        let b = ArtifactKey::from_bytes(b"one");
        let c = ArtifactKey::from_bytes(b"two");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.hex().len(), 64);
    }

    #[test]
    fn disk_layer_leaves_only_the_serialized_module() {
        let temp = tempfile::tempdir().unwrap();
        let engine = Engine::default();
        let cache = ModuleCache::new(engine, Some(temp.path().to_path_buf()), false).unwrap();
        let wasm = wat::parse_str("(module (func (export \"f\")))").unwrap();
        let key = ArtifactKey::from_bytes(&wasm);
        cache.module(&key, &wasm).unwrap();

        let path = cache.disk_path(&key).unwrap();
        let entries: Vec<String> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["module.cmod".to_string()]);
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("module.cmod");
        fs::write(&path, b"stale").unwrap();
        write_file_atomic(&path, b"fresh").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"fresh");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn fingerprint_tracks_fuel_setting() {
        assert_ne!(
            engine_cache_fingerprint(true),
            engine_cache_fingerprint(false)
        );
    }
}
