//! Config file commands.

use std::path::{Path, PathBuf};

use crate::config::{self, Config, ConfigError};
use crate::error::ResultExt;

fn resolve_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config::config_path()
            .ok_or(ConfigError::NoConfigDir)
            .with_context("Locating config file")?),
    }
}

/// Print the effective configuration as TOML
pub fn cmd_config_show(explicit: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(explicit);
    if !config.server.password.is_empty() {
        config.server.password = "********".to_string();
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Print where the config file lives
pub fn cmd_config_path(explicit: Option<&Path>) -> anyhow::Result<()> {
    let path = resolve_path(explicit)?;
    let state = if path.exists() { "" } else { " (not created yet)" };
    println!("{}{}", path.display(), state);
    Ok(())
}

/// Write a default config file
pub fn cmd_config_init(explicit: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = resolve_path(explicit)?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }
    config::save_to(&Config::default(), &path)
        .with_context(format!("Writing default config to {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        cmd_config_init(Some(&path), false).unwrap();
        assert!(path.exists());
        assert!(cmd_config_init(Some(&path), false).is_err());
        assert!(cmd_config_init(Some(&path), true).is_ok());
    }
}
