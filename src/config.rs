use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CLI_JAR: &str = "patches/revanced-cli-5.0.1-all.jar";
const SETTINGS_KEY: &str = "updateOnStart";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default = "default_java")]
    pub java: String,
    #[serde(default = "default_cli_jar")]
    pub cli_jar: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_package_name")]
    pub custom_package_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            java: default_java(),
            cli_jar: default_cli_jar(),
            app_name: default_app_name(),
            custom_package_name: default_package_name(),
        }
    }
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_in(&base_data_dir()?)
    }

    pub fn load_or_create_in(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig::default();
        config.save_in(base_dir)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_in(&base_data_dir()?)
    }

    pub fn save_in(&self, base_dir: &Path) -> Result<()> {
        fs::create_dir_all(base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }
}

/// The single persisted toggle, stored as one `key=value` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    pub update_on_start: bool,
}

impl Settings {
    /// Anything other than the exact enabled line reads as disabled.
    pub fn load(path: &Path) -> Self {
        let update_on_start = fs::read_to_string(path)
            .map(|raw| raw == Self { update_on_start: true }.render())
            .unwrap_or(false);
        Self { update_on_start }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render()).context("write settings")
    }

    fn render(&self) -> String {
        format!("{SETTINGS_KEY}={}\n", self.update_on_start)
    }
}

/// Fixed locations the patcher and its helper files live at, relative to the
/// workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        match &config.workspace_root {
            Some(root) => Ok(Self::new(root.clone())),
            None => Ok(Self::new(
                std::env::current_dir().context("resolve working directory")?,
            )),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.root.join("patches")
    }

    pub fn source_dir(&self, source: &str) -> PathBuf {
        self.patches_dir().join(source)
    }

    pub fn sources_file(&self) -> PathBuf {
        self.patches_dir().join("sources.json")
    }

    pub fn catalog_file(&self) -> PathBuf {
        self.root.join("patches.json")
    }

    pub fn options_export_file(&self) -> PathBuf {
        self.root.join("options.json")
    }

    pub fn selection_file(&self) -> PathBuf {
        self.patches_dir().join("patches-to-use.txt")
    }

    pub fn options_file(&self) -> PathBuf {
        self.patches_dir().join("patchsmith-patch-options.json")
    }

    pub fn seeded_file(&self) -> PathBuf {
        self.patches_dir().join("patchsmith-seeded-apps.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.txt")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("apps").join("patched")
    }

    pub fn error_log_file(&self) -> PathBuf {
        self.root.join("logs").join("error_log.txt")
    }
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("patchsmith"))
}

fn default_java() -> String {
    "java".to_string()
}

fn default_cli_jar() -> String {
    DEFAULT_CLI_JAR.to_string()
}

fn default_app_name() -> String {
    "Youtube".to_string()
}

fn default_package_name() -> String {
    "com.google.android.youtube".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_created_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let created = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert_eq!(created, AppConfig::default());
        assert!(dir.path().join("config.json").exists());

        let mut changed = created.clone();
        changed.app_name = "Tube".to_string();
        changed.save_in(dir.path()).unwrap();
        assert_eq!(AppConfig::load_or_create_in(dir.path()).unwrap(), changed);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"java": "/opt/jdk/bin/java"}"#).unwrap();
        let config = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert_eq!(config.java, "/opt/jdk/bin/java");
        assert_eq!(config.cli_jar, DEFAULT_CLI_JAR);
        assert_eq!(config.app_name, "Youtube");
    }

    #[test]
    fn settings_round_trip_exact_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.txt");
        assert_eq!(Settings::load(&path), Settings::default());

        Settings { update_on_start: true }.save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "updateOnStart=true\n");
        assert!(Settings::load(&path).update_on_start);

        fs::write(&path, "updateOnStart=true").unwrap();
        assert!(!Settings::load(&path).update_on_start);
    }

    #[test]
    fn workspace_paths_are_fixed_relative_locations() {
        let workspace = Workspace::new("/work");
        assert_eq!(
            workspace.selection_file(),
            Path::new("/work/patches/patches-to-use.txt")
        );
        assert_eq!(workspace.source_dir("revanced"), Path::new("/work/patches/revanced"));
        assert_eq!(workspace.error_log_file(), Path::new("/work/logs/error_log.txt"));
    }
}
