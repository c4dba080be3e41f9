use crate::backup::{self, BackupDir, BackupEntry, IdentifierStore};
use crate::ids::IdFormat;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// 書き換え対象のキーと書式
pub const KNOWN_KEYS: &[(&str, IdFormat)] = &[
    ("telemetry.machineId", IdFormat::Hex(32)),
    ("telemetry.macMachineId", IdFormat::Hex(32)),
    ("telemetry.devDeviceId", IdFormat::UuidV4),
    ("telemetry.sqmId", IdFormat::BracedGuid),
    ("storage.serviceMachineId", IdFormat::UuidV4),
];

/// 1キー分の変更
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierChange {
    pub key: &'static str,
    pub old: Value,
    pub new: String,
}

/// JSON 設定ファイル（`storage.json`）
#[derive(Debug, Clone)]
pub struct StorageFile {
    path: PathBuf,
}

impl StorageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ファイルを読み込み、トップレベルのオブジェクトを返す
    pub fn load(&self) -> Result<Map<String, Value>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage file: {:?}", self.path))?;
        parse_object(&content)
            .with_context(|| format!("Failed to parse storage file: {:?}", self.path))
    }
}

impl IdentifierStore for StorageFile {
    fn describe(&self) -> String {
        format!("{:?}", self.path)
    }

    fn backup_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("storage.json")
    }

    fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("Failed to read {:?}", self.path))
    }

    fn write(&self, content: &[u8]) -> Result<()> {
        fs::write(&self.path, content).with_context(|| format!("Failed to write {:?}", self.path))
    }
}

fn parse_object(content: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(content)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, found {}", type_name(&other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 既知キーのうち存在するものだけ新しい値に置き換える
///
/// 未知のキーと順序はそのまま。存在しない既知キーは追加しない。
pub fn regenerate_identifiers(map: &mut Map<String, Value>) -> Vec<IdentifierChange> {
    let mut changes = Vec::new();
    for &(key, format) in KNOWN_KEYS {
        let Some(slot) = map.get_mut(key) else {
            continue;
        };

        let mut new = format.generate();
        while slot.as_str() == Some(new.as_str()) {
            new = format.generate();
        }

        let old = std::mem::replace(slot, Value::String(new.clone()));
        changes.push(IdentifierChange { key, old, new });
    }
    changes
}

/// リセット結果
#[derive(Debug)]
pub struct StorageReset {
    pub changes: Vec<IdentifierChange>,
    /// 変更がなかった場合は `None`
    pub backup: Option<BackupEntry>,
}

/// `storage.json` の識別子をバックアップ付きで再生成する
pub fn reset_storage_file(file: &StorageFile, backups: &BackupDir) -> Result<StorageReset> {
    let mut map = file.load()?;
    let changes = regenerate_identifiers(&mut map);

    if changes.is_empty() {
        log::info!("No known identifiers in {:?}, nothing to change", file.path());
        return Ok(StorageReset {
            changes,
            backup: None,
        });
    }

    let content = serde_json::to_string_pretty(&Value::Object(map))
        .context("Failed to serialize storage file")?;
    let entry = backup::backup_write_verify(file, backups, content.as_bytes())?;

    for change in &changes {
        log::debug!("{}: {} -> {}", change.key, change.old, change.new);
    }

    Ok(StorageReset {
        changes,
        backup: Some(entry),
    })
}

/// 既知キーの現在値（無ければ `None`）
pub fn current_identifiers(file: &StorageFile) -> Result<Vec<(&'static str, Option<String>)>> {
    let map = file.load()?;
    Ok(KNOWN_KEYS
        .iter()
        .map(|&(key, _)| {
            let value = map.get(key).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            (key, value)
        })
        .collect())
}
