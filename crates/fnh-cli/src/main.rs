use std::path::{Path, PathBuf};
use std::process;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::Parser;
use fnh_runtime::{Harness, HarnessConfig};
use log::debug;

#[derive(Parser, Debug)]
#[command(name = "fnh", version, about = "Invoke a handler packaged in a wasm artifact")]
struct Cli {
    /// Path to the wasm artifact
    artifact: PathBuf,

    /// Fully-qualified handler type name (e.g. com.acme.Greeter)
    handler: String,

    /// JSON payload for the handler's event type
    payload: String,

    /// Persist compiled modules under this directory (env: FNH_CACHE_DIR)
    #[arg(long, env = "FNH_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Fuel budget per invocation; unbounded when unset (env: FNH_FUEL)
    #[arg(long, env = "FNH_FUEL")]
    fuel: Option<u64>,
}

fn main() {
    if let Err(err) = load_dotenv(Path::new(".env")) {
        eprintln!("warning: {err:#}");
    }
    init_logging();
    if let Err(err) = run_cli() {
        eprintln!("error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        process::exit(1);
    }
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .try_init();
    });
}

/// Load `.env` without overriding variables already set in the environment.
fn load_dotenv(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for item in dotenvy::from_path_iter(path).context("load .env")? {
        let (key, val) = item?;
        if std::env::var_os(&key).is_none() {
            unsafe {
                std::env::set_var(&key, &val);
            }
        }
    }
    Ok(())
}

fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = HarnessConfig {
        module_cache_dir: cli.cache_dir,
        fuel: cli.fuel,
    };
    debug!("harness config: {config:?}");
    let harness = Harness::with_config(config).context("initialize harness")?;
    let invocation = harness.run(&cli.artifact, &cli.handler, &cli.payload)?;
    for line in &invocation.output {
        println!("{line}");
    }
    Ok(())
}
