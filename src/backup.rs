use anyhow::{Context, Result};
use chrono::Local;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// バックアップファイルの拡張子
const BACKUP_EXT: &str = "bak";

/// タイムスタンプ書式（固定幅なので辞書順 = 時系列順）
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// 書き換え対象の識別子ストア
///
/// JSON ファイルとレジストリ値の両方がこれを実装し、
/// 同じ「バックアップ → 書き込み → 検証 → ロールバック」手順を通る。
pub trait IdentifierStore {
    /// ログ・画面表示用の説明
    fn describe(&self) -> String;
    /// バックアップファイル名の接頭辞（パス区切りを含まないこと）
    fn backup_name(&self) -> &str;
    fn read(&self) -> Result<Vec<u8>>;
    fn write(&self, content: &[u8]) -> Result<()>;
}

/// バックアップ1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// 元データの名前（`IdentifierStore::backup_name`）
    pub original: String,
    /// バックアップファイルのパス
    pub path: PathBuf,
    /// `YYYYmmdd-HHMMSS-mmm`
    pub timestamp: String,
}

impl BackupEntry {
    /// ファイル名 `<original>.<timestamp>.bak` を解析
    fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(&format!(".{}", BACKUP_EXT))?;
        let (original, timestamp) = stem.rsplit_once('.')?;
        if original.is_empty() || timestamp.len() < 19 {
            return None;
        }
        Some(Self {
            original: original.to_string(),
            path: path.to_path_buf(),
            timestamp: timestamp.to_string(),
        })
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("Failed to read backup: {:?}", self.path))
    }
}

/// ロールバックの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollback {
    /// バックアップ内容に戻せた
    Restored,
    /// 戻せなかった（再試行はしない）
    Failed(String),
}

/// 書き込みまたは検証の失敗
#[derive(Debug)]
pub struct MutationFailed {
    pub target: String,
    pub cause: String,
    pub backup: PathBuf,
    pub rollback: Rollback,
}

impl fmt::Display for MutationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to update {}: {}; ", self.target, self.cause)?;
        match &self.rollback {
            Rollback::Restored => write!(f, "original restored from {:?}", self.backup),
            Rollback::Failed(err) => write!(
                f,
                "rollback FAILED ({}), original is kept at {:?}",
                err, self.backup
            ),
        }
    }
}

impl std::error::Error for MutationFailed {}

/// バックアップ保存先ディレクトリ
#[derive(Debug, Clone)]
pub struct BackupDir {
    root: PathBuf,
}

impl BackupDir {
    /// ディレクトリを開く（無ければ作成）
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create backup directory: {:?}", root))?;
            log::info!("Created backup directory: {:?}", root);
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 内容をタイムスタンプ付きで保存
    pub fn save(&self, original: &str, content: &[u8]) -> Result<BackupEntry> {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let mut path = self
            .root
            .join(format!("{}.{}.{}", original, timestamp, BACKUP_EXT));

        // 同一ミリ秒の衝突は連番で回避
        let mut n = 1;
        while path.exists() {
            path = self
                .root
                .join(format!("{}.{}-{}.{}", original, timestamp, n, BACKUP_EXT));
            n += 1;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write backup: {:?}", path))?;

        log::info!("✓ Backed up {} to {:?}", original, path);
        BackupEntry::from_path(&path)
            .with_context(|| format!("Unexpected backup file name: {:?}", path))
    }

    /// 全バックアップ（古い順）
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        let mut entries = Vec::new();
        if !self.root.exists() {
            return Ok(entries);
        }

        for dir_entry in fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read backup directory: {:?}", self.root))?
        {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            if let Some(entry) = BackupEntry::from_path(&dir_entry.path()) {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| (&a.timestamp, &a.original).cmp(&(&b.timestamp, &b.original)));
        Ok(entries)
    }

    /// 指定データのバックアップ（古い順）
    pub fn list_for(&self, original: &str) -> Result<Vec<BackupEntry>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|e| e.original == original)
            .collect())
    }

    pub fn latest_for(&self, original: &str) -> Result<Option<BackupEntry>> {
        Ok(self.list_for(original)?.pop())
    }

    /// 各データにつき新しい `keep` 件を残して削除
    ///
    /// バックアップが消えるのはこの明示的な操作のときだけ。
    pub fn prune(&self, keep: usize) -> Result<Vec<BackupEntry>> {
        let all = self.list()?;
        let mut originals: Vec<&str> = all.iter().map(|e| e.original.as_str()).collect();
        originals.sort_unstable();
        originals.dedup();

        let mut removed = Vec::new();
        for original in originals {
            let group: Vec<&BackupEntry> = all.iter().filter(|e| e.original == original).collect();
            let excess = group.len().saturating_sub(keep);
            for entry in group.into_iter().take(excess) {
                fs::remove_file(&entry.path)
                    .with_context(|| format!("Failed to remove backup: {:?}", entry.path))?;
                log::info!("Removed old backup {:?}", entry.path);
                removed.push(entry.clone());
            }
        }
        Ok(removed)
    }
}

/// バックアップを取ってから書き込み、読み戻して検証する
///
/// 書き込みエラーか検証不一致のときはディスク上のバックアップから復元し、
/// その成否を `MutationFailed` として返す。
pub fn backup_write_verify(
    store: &dyn IdentifierStore,
    backups: &BackupDir,
    new_content: &[u8],
) -> Result<BackupEntry> {
    let current = store
        .read()
        .with_context(|| format!("Failed to read {}", store.describe()))?;
    let entry = backups.save(store.backup_name(), &current)?;

    let failure = match store.write(new_content) {
        Err(e) => Some(format!("write error: {:#}", e)),
        Ok(()) => match store.read() {
            Ok(written) if written == new_content => None,
            Ok(_) => Some("verification failed: re-read content differs".to_string()),
            Err(e) => Some(format!("verification read error: {:#}", e)),
        },
    };

    match failure {
        None => {
            log::info!("✓ Updated {}", store.describe());
            Ok(entry)
        }
        Some(cause) => {
            log::warn!("{} failed: {}, rolling back", store.describe(), cause);
            let rollback = roll_back(store, &entry);
            Err(MutationFailed {
                target: store.describe(),
                cause,
                backup: entry.path.clone(),
                rollback,
            }
            .into())
        }
    }
}

/// バックアップを書き戻す（書き戻し自体も新しいバックアップを取る）
pub fn restore(
    store: &dyn IdentifierStore,
    backups: &BackupDir,
    entry: &BackupEntry,
) -> Result<BackupEntry> {
    let content = entry.read()?;
    backup_write_verify(store, backups, &content)
}

fn roll_back(store: &dyn IdentifierStore, entry: &BackupEntry) -> Rollback {
    let original = match entry.read() {
        Ok(content) => content,
        Err(e) => return Rollback::Failed(format!("{:#}", e)),
    };
    if let Err(e) = store.write(&original) {
        return Rollback::Failed(format!("{:#}", e));
    }
    match store.read() {
        Ok(restored) if restored == original => {
            log::info!("✓ Restored {} from {:?}", store.describe(), entry.path);
            Rollback::Restored
        }
        Ok(_) => Rollback::Failed("restored content differs from backup".to_string()),
        Err(e) => Rollback::Failed(format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// メモリ上のストア。`fail_writes` 回まで書き込みを壊して失敗させる
    struct FlakyStore {
        content: RefCell<Vec<u8>>,
        fail_writes: Cell<usize>,
        corrupt_silently: bool,
    }

    impl FlakyStore {
        fn new(content: &[u8], fail_writes: usize) -> Self {
            Self {
                content: RefCell::new(content.to_vec()),
                fail_writes: Cell::new(fail_writes),
                corrupt_silently: false,
            }
        }
    }

    impl IdentifierStore for FlakyStore {
        fn describe(&self) -> String {
            "flaky store".to_string()
        }
        fn backup_name(&self) -> &str {
            "flaky"
        }
        fn read(&self) -> Result<Vec<u8>> {
            Ok(self.content.borrow().clone())
        }
        fn write(&self, content: &[u8]) -> Result<()> {
            if self.fail_writes.get() > 0 {
                self.fail_writes.set(self.fail_writes.get() - 1);
                // 途中まで書かれた状態を再現
                *self.content.borrow_mut() = content[..content.len() / 2].to_vec();
                if self.corrupt_silently {
                    return Ok(());
                }
                anyhow::bail!("disk full");
            }
            *self.content.borrow_mut() = content.to_vec();
            Ok(())
        }
    }

    #[test]
    fn successful_write_keeps_backup_of_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupDir::open(dir.path().join("backups")).unwrap();
        let store = FlakyStore::new(b"before", 0);

        let entry = backup_write_verify(&store, &backups, b"after").unwrap();

        assert_eq!(store.read().unwrap(), b"after");
        assert_eq!(entry.original, "flaky");
        assert_eq!(fs::read(&entry.path).unwrap(), b"before");
    }

    #[test]
    fn write_failure_restores_exact_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupDir::open(dir.path()).unwrap();
        let original = b"{\"telemetry.machineId\": \"old\",\n  \"x\": [1, 2]}\r\n".to_vec();
        let store = FlakyStore::new(&original, 1);

        let err = backup_write_verify(&store, &backups, b"replacement content").unwrap_err();

        let failed = err.downcast_ref::<MutationFailed>().expect("typed failure");
        assert_eq!(failed.rollback, Rollback::Restored);
        assert!(failed.cause.contains("disk full"));
        assert_eq!(store.read().unwrap(), original);
    }

    #[test]
    fn verification_mismatch_triggers_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupDir::open(dir.path()).unwrap();
        let mut store = FlakyStore::new(b"original value", 1);
        store.corrupt_silently = true;

        let err = backup_write_verify(&store, &backups, b"new value!").unwrap_err();

        let failed = err.downcast_ref::<MutationFailed>().unwrap();
        assert!(failed.cause.contains("verification failed"));
        assert_eq!(failed.rollback, Rollback::Restored);
        assert_eq!(store.read().unwrap(), b"original value");
    }

    #[test]
    fn failed_rollback_is_reported_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupDir::open(dir.path()).unwrap();
        let store = FlakyStore::new(b"original", 2);

        let err = backup_write_verify(&store, &backups, b"new content").unwrap_err();

        let failed = err.downcast_ref::<MutationFailed>().unwrap();
        assert!(matches!(failed.rollback, Rollback::Failed(_)));
        assert!(err.to_string().contains("rollback FAILED"));
        // バックアップは残っている
        assert_eq!(fs::read(&failed.backup).unwrap(), b"original");
    }

    #[test]
    fn list_and_latest_are_chronological() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupDir::open(dir.path()).unwrap();
        backups.save("storage.json", b"one").unwrap();
        backups.save("storage.json", b"two").unwrap();
        backups.save("other", b"x").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"ignored").unwrap();

        let entries = backups.list_for("storage.json").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].read().unwrap(), b"one");

        let latest = backups.latest_for("storage.json").unwrap().unwrap();
        assert_eq!(latest.read().unwrap(), b"two");
        assert_eq!(backups.list().unwrap().len(), 3);
        assert!(backups.latest_for("missing").unwrap().is_none());
    }

    #[test]
    fn prune_keeps_newest_per_original() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupDir::open(dir.path()).unwrap();
        for i in 0..4 {
            backups.save("storage.json", format!("v{}", i).as_bytes()).unwrap();
        }
        backups.save("registry", b"r").unwrap();

        let removed = backups.prune(2).unwrap();

        assert_eq!(removed.len(), 2);
        let left = backups.list_for("storage.json").unwrap();
        assert_eq!(left.len(), 2);
        assert_eq!(left[0].read().unwrap(), b"v2");
        assert_eq!(left[1].read().unwrap(), b"v3");
        assert_eq!(backups.list_for("registry").unwrap().len(), 1);
    }

    #[test]
    fn restore_writes_backup_content_back() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupDir::open(dir.path()).unwrap();
        let store = FlakyStore::new(b"first", 0);
        let first = backup_write_verify(&store, &backups, b"second").unwrap();

        restore(&store, &backups, &first).unwrap();

        assert_eq!(store.read().unwrap(), b"first");
        // 復元前の "second" もバックアップされている
        let latest = backups.latest_for("flaky").unwrap().unwrap();
        assert_eq!(latest.read().unwrap(), b"second");
    }
}
