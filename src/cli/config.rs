//! `kubecast config`: print the effective configuration

use crate::server::load_config;
use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    print!("{rendered}");
    Ok(())
}
