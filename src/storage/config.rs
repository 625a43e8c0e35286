use std::path::Path;

use anyhow::Context;
use udb_core::models::settings::AppSettings;

/// Reads settings from `path`. A missing or unreadable file yields defaults;
/// a file that does not parse is reported and replaced by defaults as well.
pub fn load_settings(path: &Path) -> AppSettings {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("[config] {} not found, using defaults", path.display());
            return AppSettings::default();
        }
        Err(e) => {
            tracing::warn!("[config] cannot read {}: {}", path.display(), e);
            return AppSettings::default();
        }
    };

    match serde_json::from_str::<AppSettings>(&text) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("[config] invalid settings in {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
