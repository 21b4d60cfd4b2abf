//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\qgis-plugin-generator\
//!   macOS:   ~/Library/Application Support/qgis-plugin-generator/
//!   Linux:   ~/.config/qgis-plugin-generator/
//!
//! Data dir (generated plugins, history, whisper models):
//!   Windows: %LOCALAPPDATA%\qgis-plugin-generator\
//!   macOS:   ~/Library/Application Support/qgis-plugin-generator/
//!   Linux:   ~/.local/share/qgis-plugin-generator/
//!
//! QGIS default profile plugins (install target):
//!   Windows: %APPDATA%\QGIS\QGIS3\profiles\default\python\plugins\
//!   macOS:   ~/Library/Application Support/QGIS/QGIS3/profiles/default/python/plugins/
//!   Linux:   ~/.local/share/QGIS/QGIS3/profiles/default/python/plugins/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Root of the per-user data directory.
    pub data_dir: PathBuf,
    /// Default output directory for generated plugin archives.
    pub output_dir: PathBuf,
    /// Plugin directory of the default QGIS 3 profile.
    pub qgis_plugins_dir: PathBuf,
    /// Full path to `history.json`.
    pub history_file: PathBuf,
    /// Directory for downloaded GGML whisper models.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "qgis-plugin-generator";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let qgis_plugins_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("QGIS")
            .join("QGIS3")
            .join("profiles")
            .join("default")
            .join("python")
            .join("plugins");

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            output_dir: data_dir.join("plugins"),
            qgis_plugins_dir,
            history_file: data_dir.join("history.json"),
            models_dir: data_dir.join("models"),
            data_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.output_dir.starts_with(&paths.data_dir));
        assert!(paths.qgis_plugins_dir.ends_with("python/plugins"));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .history_file
            .file_name()
            .is_some_and(|n| n == "history.json"));
    }
}
