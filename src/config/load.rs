use super::{default_state_root_path, resolve_config_path, ConfigError, Settings};

/// Loads settings from the resolved config path, falling back to defaults when
/// no file exists yet. A relative or empty `state_root` resolves under `$HOME`.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let path = resolve_config_path()?;
    let mut settings = if path.is_file() {
        Settings::from_path(&path)?
    } else {
        Settings::default()
    };
    if settings.state_root.as_os_str().is_empty() {
        settings.state_root = default_state_root_path()?;
    }
    settings.validate()?;
    Ok(settings)
}
