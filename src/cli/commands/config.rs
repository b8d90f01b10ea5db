//! Config command implementation.

use crate::cli::ConfigAction;
use crate::config::Settings;
use anyhow::Result;
use std::path::PathBuf;

/// Run the config command.
pub fn run_config(action: &ConfigAction, config_path: Option<&str>, mut settings: Settings) -> Result<()> {
    match action {
        ConfigAction::Show => {
            redact(&mut settings.models.api_key);
            redact(&mut settings.youtube.api_key);
            let toml_str = toml::to_string_pretty(&settings)
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Path => {
            let path = config_path
                .map(PathBuf::from)
                .unwrap_or_else(Settings::default_config_path);
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn redact(key: &mut Option<String>) {
    if key.is_some() {
        *key = Some("<redacted>".to_string());
    }
}
