use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// アプリケーション名（設定・データディレクトリ名）
pub const APP_NAME: &str = "telemetry-reset";

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 対象アプリの設定ディレクトリ名（`~/.config/<app_dir>` など）
    pub app_dir: String,
    /// 終了させるプロセス名
    pub process_names: Vec<String>,
    /// 起動コマンド
    pub launch_command: String,
    /// 手動指定した `storage.json` のパス
    pub storage_path: Option<PathBuf>,
    /// バックアップ保存先（未指定ならデータディレクトリ配下）
    pub backup_dir: Option<PathBuf>,
    /// 整理時に残すバックアップ数
    pub keep_backups: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_dir: "Code".to_string(),
            process_names: vec!["code".to_string(), "Code".to_string()],
            launch_command: "code".to_string(),
            storage_path: None,
            backup_dir: None,
            keep_backups: 5,
        }
    }
}

impl Settings {
    /// バックアップ保存先
    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("backups")),
        }
    }
}

/// `~/.config/telemetry-reset`
fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Failed to get config directory")?
        .join(APP_NAME))
}

/// ログやバックアップの保存先
pub fn data_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .context("Failed to get data directory")?
        .join(APP_NAME))
}

/// 設定ファイルのパスを取得
///
/// `~/.config/telemetry-reset/settings.json`
pub fn settings_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.json"))
}

/// 設定ファイルを読み込み
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&settings_path()?)
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        log::info!("Settings file not found, using defaults");
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;

    let settings: Settings = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

    log::info!("✓ Loaded settings from {:?}", path);
    log::debug!("Target app dir: {}", settings.app_dir);

    Ok(settings)
}

/// 設定ファイルに保存
pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&settings_path()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
            log::info!("Created config directory: {:?}", dir);
        }
    }

    let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;

    log::info!("✓ Saved settings to {:?}", path);
    Ok(())
}
