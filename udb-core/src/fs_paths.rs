use std::path::PathBuf;

pub trait AppPaths: Send + Sync {
    fn downloads_dir(&self) -> PathBuf;
    fn config_dir(&self) -> PathBuf;
    fn bin_dir(&self) -> Option<PathBuf>;

    fn settings_file(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn downloads_dir(&self) -> PathBuf {
        dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    fn config_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("UDB_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .map(|d| d.join("udb"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("udb").join("bin"))
    }
}
