use crate::backup::{self, BackupDir, IdentifierStore};
use crate::config::Settings;
use crate::ids::IdFormat;
use crate::platform::{display_path, BaseDirs, Platform};
use crate::process;
use crate::storage::{self, StorageFile};
use anyhow::Result;
use std::path::Path;

/// メニュー操作の実行環境（起動時に一度作る）
pub struct Environment {
    pub platform: Platform,
    pub base: BaseDirs,
    pub settings: Settings,
    pub backups: BackupDir,
}

impl Environment {
    pub fn new(platform: Platform, base: BaseDirs, settings: Settings) -> Result<Self> {
        let backups = BackupDir::open(settings.backup_dir()?)?;
        Ok(Self {
            platform,
            base,
            settings,
            backups,
        })
    }

    fn stores(&self, storage: &Path) -> Vec<Box<dyn IdentifierStore>> {
        let mut stores: Vec<Box<dyn IdentifierStore>> = vec![Box::new(StorageFile::new(storage))];
        stores.extend(self.platform.system_store());
        stores
    }
}

/// 対象アプリを止め、全ストアの識別子を再生成する
pub fn reset_identifiers(env: &Environment, storage: &Path) -> Result<Vec<String>> {
    let mut report = Vec::new();

    let stopped = process::terminate_all(env.platform, &env.settings.process_names)?;
    if stopped > 0 {
        report.push(format!("Stopped {} running process(es)", stopped));
    }

    let file = StorageFile::new(storage);
    let reset = storage::reset_storage_file(&file, &env.backups)?;
    report.push(format!("Storage: {}", display_path(storage, &env.base)));
    if reset.changes.is_empty() {
        report.push("  no known identifiers present, file left unchanged".to_string());
    }
    for change in &reset.changes {
        report.push(format!("  {} = {}", change.key, change.new));
    }
    if let Some(entry) = &reset.backup {
        report.push(format!("  backup: {}", display_path(&entry.path, &env.base)));
    }

    if let Some(store) = env.platform.system_store() {
        let new = IdFormat::BracedGuid.generate();
        let entry = backup::backup_write_verify(store.as_ref(), &env.backups, new.as_bytes())?;
        report.push(format!("{} = {}", store.describe(), new));
        report.push(format!("  backup: {}", display_path(&entry.path, &env.base)));
    }

    report.push("✓ Reset complete".to_string());
    Ok(report)
}

/// 現在の識別子を表示
pub fn show_identifiers(env: &Environment, storage: &Path) -> Result<Vec<String>> {
    let mut report = vec![format!("Storage: {}", display_path(storage, &env.base))];
    for (key, value) in storage::current_identifiers(&StorageFile::new(storage))? {
        report.push(format!(
            "  {} = {}",
            key,
            value.as_deref().unwrap_or("(not set)")
        ));
    }

    if let Some(store) = env.platform.system_store() {
        let line = match store.read() {
            Ok(value) => format!("{} = {}", store.describe(), String::from_utf8_lossy(&value)),
            Err(e) => format!("{}: {:#}", store.describe(), e),
        };
        report.push(line);
    }

    report.push(format!(
        "Backups: {} in {}",
        env.backups.list()?.len(),
        display_path(env.backups.root(), &env.base)
    ));
    Ok(report)
}

pub fn list_backups(env: &Environment) -> Result<Vec<String>> {
    let entries = env.backups.list()?;
    if entries.is_empty() {
        return Ok(vec!["No backups yet".to_string()]);
    }
    Ok(entries
        .iter()
        .map(|e| format!("{}  {}", e.timestamp, e.original))
        .collect())
}

/// 各ストアを最新のバックアップに戻す
pub fn restore_latest(env: &Environment, storage: &Path) -> Result<Vec<String>> {
    let mut report = Vec::new();
    process::terminate_all(env.platform, &env.settings.process_names)?;

    for store in env.stores(storage) {
        match env.backups.latest_for(store.backup_name())? {
            Some(entry) => {
                backup::restore(store.as_ref(), &env.backups, &entry)?;
                report.push(format!(
                    "✓ Restored {} from backup {}",
                    store.describe(),
                    entry.timestamp
                ));
            }
            None => report.push(format!("No backup for {}", store.describe())),
        }
    }
    Ok(report)
}

/// 古いバックアップの整理
pub fn prune_backups(env: &Environment) -> Result<Vec<String>> {
    let removed = env.backups.prune(env.settings.keep_backups)?;
    Ok(vec![format!(
        "Removed {} backup(s), kept newest {} per target",
        removed.len(),
        env.settings.keep_backups
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;

    fn env_in(dir: &Path) -> Environment {
        let settings = Settings {
            process_names: Vec::new(),
            backup_dir: Some(dir.join("backups")),
            keep_backups: 1,
            ..Settings::default()
        };
        let base = BaseDirs {
            home: dir.to_path_buf(),
            roaming: None,
        };
        Environment::new(Platform::Linux, base, settings).unwrap()
    }

    fn storage_in(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("storage.json");
        let value = json!({
            "telemetry.machineId": "old-machine",
            "telemetry.devDeviceId": "old-device",
            "window.zoom": 1,
        });
        fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        path
    }

    #[test]
    fn reset_then_restore_round_trips_file() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let storage = storage_in(dir.path());
        let original = fs::read(&storage).unwrap();

        let report = reset_identifiers(&env, &storage).unwrap();
        assert!(report.iter().any(|l| l.contains("telemetry.machineId")));
        assert_ne!(fs::read(&storage).unwrap(), original);

        restore_latest(&env, &storage).unwrap();
        assert_eq!(fs::read(&storage).unwrap(), original);
    }

    #[test]
    fn show_lists_every_known_key() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let storage = storage_in(dir.path());

        let report = show_identifiers(&env, &storage).unwrap();

        assert!(report.iter().any(|l| l.contains("old-device")));
        assert!(report.iter().any(|l| l.contains("telemetry.sqmId = (not set)")));
        assert!(report.last().unwrap().starts_with("Backups: 0"));
    }

    #[test]
    fn prune_honours_keep_setting() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let storage = storage_in(dir.path());
        reset_identifiers(&env, &storage).unwrap();
        reset_identifiers(&env, &storage).unwrap();
        assert_eq!(env.backups.list().unwrap().len(), 2);

        prune_backups(&env).unwrap();

        let left = env.backups.list().unwrap();
        assert_eq!(left.len(), 1);
        let kept: Value = serde_json::from_slice(&left[0].read().unwrap()).unwrap();
        assert_ne!(kept["telemetry.machineId"], json!("old-machine"));
    }

    #[test]
    fn restore_without_backups_reports_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_in(dir.path());
        let storage = storage_in(dir.path());

        let report = restore_latest(&env, &storage).unwrap();

        assert!(report[0].starts_with("No backup for"));
        assert_eq!(list_backups(&env).unwrap(), vec!["No backups yet".to_string()]);
    }
}
