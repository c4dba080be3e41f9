use crate::backup::IdentifierStore;
use crate::config::Settings;
use std::path::{Path, PathBuf};

/// 探索結果。見つからない場合の扱いは呼び出し側が決める
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound { searched: Vec<PathBuf> },
}

/// 対応プラットフォーム（起動時に一度だけ決定）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

/// パス解決に使うベースディレクトリ
#[derive(Debug, Clone)]
pub struct BaseDirs {
    pub home: PathBuf,
    /// Windows の `%APPDATA%`
    pub roaming: Option<PathBuf>,
}

impl BaseDirs {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            home: dirs::home_dir()?,
            roaming: if cfg!(windows) { dirs::config_dir() } else { None },
        })
    }
}

/// `User/globalStorage/storage.json`
const STORAGE_FILE: [&str; 3] = ["User", "globalStorage", "storage.json"];

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }

    /// 対象アプリの設定ディレクトリ候補（優先順）
    pub fn config_dir_candidates(self, base: &BaseDirs, app_dir: &str) -> Vec<PathBuf> {
        match self {
            Platform::Windows => {
                let roaming = base
                    .roaming
                    .clone()
                    .unwrap_or_else(|| base.home.join("AppData").join("Roaming"));
                vec![roaming.join(app_dir)]
            }
            Platform::MacOs => vec![base
                .home
                .join("Library")
                .join("Application Support")
                .join(app_dir)],
            Platform::Linux => {
                let config = base.home.join(".config");
                let mut dirs = vec![config.join(app_dir)];
                let lower = app_dir.to_lowercase();
                if lower != app_dir {
                    dirs.push(config.join(lower));
                }
                dirs
            }
        }
    }

    /// `storage.json` の候補
    pub fn storage_candidates(self, base: &BaseDirs, app_dir: &str) -> Vec<PathBuf> {
        self.config_dir_candidates(base, app_dir)
            .into_iter()
            .map(|dir| STORAGE_FILE.iter().fold(dir, |p, part| p.join(part)))
            .collect()
    }

    /// 設定の上書きパス、続いて候補の順で存在するファイルを探す
    pub fn resolve_storage(self, base: &BaseDirs, settings: &Settings) -> Lookup<PathBuf> {
        let mut searched = Vec::new();
        let overrides = settings.storage_path.iter().cloned();
        for candidate in overrides.chain(self.storage_candidates(base, &settings.app_dir)) {
            if candidate.is_file() {
                log::debug!("Found storage file: {:?}", candidate);
                return Lookup::Found(candidate);
            }
            searched.push(candidate);
        }
        log::info!("Storage file not found, searched {:?}", searched);
        Lookup::NotFound { searched }
    }

    /// OS レベルの識別子ストア（Windows のレジストリのみ）
    pub fn system_store(self) -> Option<Box<dyn IdentifierStore>> {
        match self {
            #[cfg(windows)]
            Platform::Windows => Some(Box::new(crate::registry::SqmMachineId)),
            _ => None,
        }
    }

    /// HKLM への書き込みに管理者権限が必要
    pub fn requires_elevation(self) -> bool {
        self == Platform::Windows
    }

    /// プロセス一覧・強制終了に使う実行ファイル名
    pub fn image_name(self, process: &str) -> String {
        match self {
            Platform::Windows if !process.to_lowercase().ends_with(".exe") => {
                format!("{}.exe", process)
            }
            _ => process.to_string(),
        }
    }
}

/// パスを `~` 付きで短く表示
pub fn display_path(path: &Path, base: &BaseDirs) -> String {
    match path.strip_prefix(&base.home) {
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn base(home: &Path) -> BaseDirs {
        BaseDirs {
            home: home.to_path_buf(),
            roaming: Some(home.join("Roaming")),
        }
    }

    #[test]
    fn each_platform_has_its_own_layout() {
        let base = base(Path::new("/h"));

        assert_eq!(
            Platform::Windows.storage_candidates(&base, "Code"),
            vec![PathBuf::from("/h/Roaming/Code/User/globalStorage/storage.json")]
        );
        assert_eq!(
            Platform::MacOs.storage_candidates(&base, "Code"),
            vec![PathBuf::from(
                "/h/Library/Application Support/Code/User/globalStorage/storage.json"
            )]
        );
        assert_eq!(
            Platform::Linux.storage_candidates(&base, "Code"),
            vec![
                PathBuf::from("/h/.config/Code/User/globalStorage/storage.json"),
                PathBuf::from("/h/.config/code/User/globalStorage/storage.json"),
            ]
        );
    }

    #[test]
    fn linux_falls_back_to_lowercase_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join(".config/vscodium/User/globalStorage");
        fs::create_dir_all(&storage).unwrap();
        fs::write(storage.join("storage.json"), "{}").unwrap();
        let settings = Settings {
            app_dir: "VSCodium".to_string(),
            ..Settings::default()
        };

        let found = Platform::Linux.resolve_storage(&base(dir.path()), &settings);

        assert_eq!(found, Lookup::Found(storage.join("storage.json")));
    }

    #[test]
    fn missing_storage_reports_every_searched_path() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            storage_path: Some(dir.path().join("manual.json")),
            ..Settings::default()
        };

        match Platform::Linux.resolve_storage(&base(dir.path()), &settings) {
            Lookup::NotFound { searched } => {
                assert_eq!(searched.len(), 3);
                assert_eq!(searched[0], dir.path().join("manual.json"));
            }
            found => panic!("unexpected {:?}", found),
        }
    }

    #[test]
    fn manual_path_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let manual = dir.path().join("manual.json");
        fs::write(&manual, "{}").unwrap();
        let settings = Settings {
            storage_path: Some(manual.clone()),
            ..Settings::default()
        };

        assert_eq!(
            Platform::MacOs.resolve_storage(&base(dir.path()), &settings),
            Lookup::Found(manual)
        );
    }

    #[test]
    fn windows_image_names_get_exe_suffix() {
        assert_eq!(Platform::Windows.image_name("Code"), "Code.exe");
        assert_eq!(Platform::Windows.image_name("Code.EXE"), "Code.EXE");
        assert_eq!(Platform::Linux.image_name("code"), "code");
        assert!(Platform::Windows.requires_elevation());
        assert!(!Platform::MacOs.requires_elevation());
        assert!(Platform::Linux.system_store().is_none());
    }
}
