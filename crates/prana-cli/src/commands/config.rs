//! Config command implementation.

use std::path::Path;

use anyhow::{Result, bail};

use crate::cli::ConfigAction;
use crate::config::{Config, DeviceSection};

pub fn cmd_config(action: &ConfigAction, path: &Path, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => print!("{}", toml::to_string_pretty(config)?),
        ConfigAction::Init { device, force } => {
            if path.exists() && !force {
                bail!(
                    "Config file {} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let config = Config {
                device: DeviceSection {
                    address: device.clone(),
                },
                ..Default::default()
            };
            config.validate()?;
            config.save(path)?;
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}
