use std::path::PathBuf;

/// Harness-wide settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Persist compiled modules under this directory.
    pub module_cache_dir: Option<PathBuf>,
    /// Fuel granted to each invocation; `None` runs unbounded.
    pub fuel: Option<u64>,
}

impl HarnessConfig {
    pub fn with_module_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_cache_dir = Some(dir.into());
        self
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }
}
