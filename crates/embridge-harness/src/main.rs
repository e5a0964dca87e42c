//! embridge Harness - Main Entry Point

use anyhow::{bail, Context, Result};
use embridge_harness::Harness;
use embridge_host::HostConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Quiet by default; the module's console output is the interesting part
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args_os().skip(1);
    let (Some(module), None) = (args.next(), args.next()) else {
        bail!("usage: embridge-harness <module.js>");
    };
    let module = PathBuf::from(module);

    let config = HostConfig::from_env().context("invalid EMBRIDGE_* configuration")?;
    let harness = Harness::new(&config)?;
    let completion = harness
        .run_file(&module)
        .with_context(|| format!("module {} failed", module.display()))?;

    std::process::exit(completion.exit_code);
}
