use std::path::{Path, PathBuf};

use sshkit::config::ConfigError;

const APP_DIR: &str = "sshkit";
const CONFIG_FILE: &str = "ssh.json";

/// Default connection config file: `<config dir>/sshkit/ssh.json`.
///
/// `--config` and `SSHKIT_CONFIG` take precedence; this is only consulted
/// when neither a config file nor `--host` was given.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_path_in(&base))
}

fn config_path_in(base: &Path) -> PathBuf {
    base.join(APP_DIR).join(CONFIG_FILE)
}
