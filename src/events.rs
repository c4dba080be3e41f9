use crate::app::Action;
use crossterm::event::KeyCode;
use std::path::PathBuf;

/// アプリケーションイベント
#[derive(Debug, Clone)]
pub enum AppEvent {
    // UI イベント
    /// キー入力
    KeyPress(KeyCode),

    // 操作完了イベント
    /// 操作成功（結果の行）
    ActionFinished { action: Action, lines: Vec<String> },
    /// 操作失敗（エラーチェーン）
    ActionFailed { action: Action, error: String },
    /// `storage.json` が見つからない → 手動入力へ
    StorageMissing {
        action: Action,
        searched: Vec<PathBuf>,
    },
}
