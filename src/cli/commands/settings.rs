//! Config file commands.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{self, Config};

fn target_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config::config_path().context("Could not determine config directory"),
    }
}

/// Print where the config lives and what is in effect
pub fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> anyhow::Result<()> {
    let path = target_path(explicit)?;
    let state = if path.exists() { "" } else { " (not created, using defaults)" };
    println!("# {}{}", path.display(), state);
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the settings in effect out as a config file
pub fn cmd_config_init(config: &Config, explicit: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = target_path(explicit)?;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace it)", path.display());
    }
    config::save_to(config, &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
