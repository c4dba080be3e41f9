use crate::events::AppEvent;
use crossterm::event::KeyCode;
use ratatui::widgets::ListState;
use std::path::PathBuf;

/// 出力欄に残す最大行数
const MAX_OUTPUT_LINES: usize = 500;

/// メニューから実行する操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Reset,
    ShowIdentifiers,
    ListBackups,
    RestoreLatest,
    PruneBackups,
    Launch,
}

impl Action {
    pub fn title(self) -> &'static str {
        match self {
            Action::Reset => "Reset identifiers",
            Action::ShowIdentifiers => "Show current identifiers",
            Action::ListBackups => "List backups",
            Action::RestoreLatest => "Restore latest backup",
            Action::PruneBackups => "Remove old backups",
            Action::Launch => "Launch target application",
        }
    }

    /// `storage.json` の場所が必要か
    pub fn needs_storage(self) -> bool {
        matches!(
            self,
            Action::Reset | Action::ShowIdentifiers | Action::RestoreLatest
        )
    }
}

/// メニュー項目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Run(Action),
    SetStoragePath,
    Quit,
}

/// 番号キーと項目（表示順）
pub const MENU: &[(char, MenuItem)] = &[
    ('1', MenuItem::Run(Action::Reset)),
    ('2', MenuItem::Run(Action::ShowIdentifiers)),
    ('3', MenuItem::Run(Action::ListBackups)),
    ('4', MenuItem::Run(Action::RestoreLatest)),
    ('5', MenuItem::Run(Action::PruneBackups)),
    ('6', MenuItem::Run(Action::Launch)),
    ('7', MenuItem::SetStoragePath),
    ('0', MenuItem::Quit),
];

impl MenuItem {
    pub fn label(self) -> &'static str {
        match self {
            MenuItem::Run(action) => action.title(),
            MenuItem::SetStoragePath => "Set storage path manually",
            MenuItem::Quit => "Quit",
        }
    }
}

/// 入力モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,  // メニュー操作
    Editing, // パス入力
}

/// 出力行の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Heading,
    Info,
    Error,
}

/// コマンド（副作用を持つ処理）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Action),
    /// 手動パスを保存し、保留中の操作があれば続けて実行
    SetStoragePath {
        path: PathBuf,
        then: Option<Action>,
    },
    Quit,
    None,
}

/// アプリケーション全体の状態
pub struct AppState {
    pub menu_state: ListState,
    pub input_mode: InputMode,
    pub input_buffer: String,
    /// 手動入力後に再開する操作
    pub pending: Option<Action>,
    pub output: Vec<(LineKind, String)>,
    /// 起動中の子プロセス数（ステータスバー用）
    pub running_children: usize,
}

impl AppState {
    /// 新しいアプリケーション状態を作成
    pub fn new() -> Self {
        let mut menu_state = ListState::default();
        menu_state.select(Some(0));
        Self {
            menu_state,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            pending: None,
            output: Vec::new(),
            running_children: 0,
        }
    }

    /// イベントを処理して状態を更新
    pub fn update(&mut self, event: AppEvent) -> Command {
        match event {
            AppEvent::KeyPress(key) => self.handle_key_press(key),

            AppEvent::ActionFinished { action, lines } => {
                self.push(LineKind::Heading, action.title());
                for line in lines {
                    self.push(LineKind::Info, line);
                }
                Command::None
            }

            AppEvent::ActionFailed { action, error } => {
                // 操作ごとのエラーは表示のみ、ループは続行
                self.push(LineKind::Heading, action.title());
                self.push(LineKind::Error, format!("Error: {}", error));
                Command::None
            }

            AppEvent::StorageMissing { action, searched } => {
                self.push(LineKind::Heading, action.title());
                self.push(LineKind::Error, "storage.json not found. Searched:");
                for path in searched {
                    self.push(LineKind::Info, format!("  {}", path.display()));
                }
                self.push(LineKind::Info, "Enter the path manually (Esc to cancel)");
                self.begin_editing(Some(action));
                Command::None
            }
        }
    }

    /// キー入力を処理
    fn handle_key_press(&mut self, key: KeyCode) -> Command {
        match self.input_mode {
            InputMode::Normal => match key {
                KeyCode::Char('q') => Command::Quit,
                KeyCode::Up | KeyCode::Char('k') => {
                    self.select_offset(-1);
                    Command::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.select_offset(1);
                    Command::None
                }
                KeyCode::Enter => match self.menu_state.selected() {
                    Some(index) => self.activate(MENU[index].1),
                    None => Command::None,
                },
                KeyCode::Char(c) => match MENU.iter().position(|(k, _)| *k == c) {
                    Some(index) => {
                        self.menu_state.select(Some(index));
                        self.activate(MENU[index].1)
                    }
                    None => Command::None,
                },
                _ => Command::None,
            },
            InputMode::Editing => match key {
                KeyCode::Esc => {
                    self.input_mode = InputMode::Normal;
                    self.input_buffer.clear();
                    if let Some(action) = self.pending.take() {
                        self.push(LineKind::Info, format!("{} cancelled", action.title()));
                    }
                    Command::None
                }
                KeyCode::Enter => {
                    let path = self.input_buffer.trim().to_string();
                    if path.is_empty() {
                        return Command::None;
                    }
                    self.input_buffer.clear();
                    self.input_mode = InputMode::Normal;
                    Command::SetStoragePath {
                        path: PathBuf::from(path),
                        then: self.pending.take(),
                    }
                }
                KeyCode::Backspace => {
                    self.input_buffer.pop();
                    Command::None
                }
                KeyCode::Char(c) => {
                    self.input_buffer.push(c);
                    Command::None
                }
                _ => Command::None,
            },
        }
    }

    fn activate(&mut self, item: MenuItem) -> Command {
        match item {
            MenuItem::Run(action) => Command::Run(action),
            MenuItem::SetStoragePath => {
                self.begin_editing(None);
                Command::None
            }
            MenuItem::Quit => Command::Quit,
        }
    }

    fn begin_editing(&mut self, pending: Option<Action>) {
        self.input_mode = InputMode::Editing;
        self.input_buffer.clear();
        self.pending = pending;
    }

    fn select_offset(&mut self, offset: isize) {
        let len = MENU.len() as isize;
        let current = self.menu_state.selected().unwrap_or(0) as isize;
        let next = (current + offset).rem_euclid(len);
        self.menu_state.select(Some(next as usize));
    }

    /// 出力欄に1行追加
    pub fn push(&mut self, kind: LineKind, line: impl Into<String>) {
        self.output.push((kind, line.into()));
        if self.output.len() > MAX_OUTPUT_LINES {
            let excess = self.output.len() - MAX_OUTPUT_LINES;
            self.output.drain(..excess);
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
