mod actions;
mod app;
mod backup;
mod config;
mod events;
mod ids;
mod platform;
mod privileges;
mod process;
#[cfg(windows)]
mod registry;
mod storage;
mod ui;

use actions::Environment;
use anyhow::{Context, Result};
use app::{Action, AppState, Command, LineKind};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use events::AppEvent;
use platform::{BaseDirs, Lookup, Platform};
use process::ChildHandle;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;

/// メインループの終了理由
enum Exit {
    Quit,
    /// Ctrl+C。起動した子プロセスは終了させる
    Interrupted(Vec<ChildHandle>),
}

fn main() -> Result<()> {
    init_logging()?;

    let platform = Platform::current();
    log::info!("Starting on {}", platform.name());

    // 管理者権限がなければ終了
    if let Err(err) = privileges::ensure_elevated(platform) {
        log::error!("{:#}", err);
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }

    let settings = config::load_settings()?;
    let base = BaseDirs::from_env().context("Failed to get home directory")?;
    let mut env = Environment::new(platform, base, settings)?;

    // ターミナル初期化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // アプリケーション実行
    let result = run_app(&mut terminal, &mut env);

    // ターミナル復元
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    match result {
        Ok(Exit::Quit) => Ok(()),
        Ok(Exit::Interrupted(handles)) => {
            let killed: usize = handles.into_iter().map(process::cleanup).sum();
            log::info!("Interrupted, killed {} child process(es)", killed);
            eprintln!("Interrupted, killed {} child process(es)", killed);
            std::process::exit(130);
        }
        Err(err) => {
            eprintln!("Error: {:?}", err);
            Ok(())
        }
    }
}

/// ログはファイルへ（TUI を崩さないため）
fn init_logging() -> Result<()> {
    let dir = config::data_dir()?;
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let log_path = dir.join("telemetry-reset.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {:?}", log_path))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    env: &mut Environment,
) -> Result<Exit> {
    // アプリケーション状態初期化
    let mut app = AppState::new();
    let mut handles: Vec<ChildHandle> = Vec::new();

    let target = env.settings.app_dir.clone();
    let header = ui::Header {
        platform: env.platform.name(),
        target: &target,
    };

    // メインループ
    loop {
        app.running_children = handles.len();
        terminal.draw(|f| ui::render(f, &mut app, &header))?;

        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }

        // Ctrl+C で中断
        if key_event.code == KeyCode::Char('c')
            && key_event.modifiers.contains(KeyModifiers::CONTROL)
        {
            return Ok(Exit::Interrupted(handles));
        }

        let command = app.update(AppEvent::KeyPress(key_event.code));

        // コマンド実行
        match command {
            Command::Run(action) => {
                app.push(LineKind::Info, format!("{}...", action.title()));
                terminal.draw(|f| ui::render(f, &mut app, &header))?;
                let event = execute_action(env, action, &mut handles);
                app.update(event);
            }
            Command::SetStoragePath { path, then } => {
                if let Err(err) = set_storage_path(env, path) {
                    app.push(LineKind::Error, format!("Error: {:#}", err));
                    continue;
                }
                app.push(LineKind::Info, "✓ Storage path saved");
                if let Some(action) = then {
                    let event = execute_action(env, action, &mut handles);
                    app.update(event);
                }
            }
            Command::Quit => return Ok(Exit::Quit),
            Command::None => {}
        }
    }
}

/// 手動入力したパスを検証して保存
fn set_storage_path(env: &mut Environment, path: PathBuf) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("{:?} is not a file", path);
    }
    env.settings.storage_path = Some(path);
    config::save_settings(&env.settings)
}

/// 1操作を実行し、結果をイベントにする（エラーはここで受け止める）
fn execute_action(env: &Environment, action: Action, handles: &mut Vec<ChildHandle>) -> AppEvent {
    let storage = if action.needs_storage() {
        match env.platform.resolve_storage(&env.base, &env.settings) {
            Lookup::Found(path) => Some(path),
            Lookup::NotFound { searched } => {
                return AppEvent::StorageMissing { action, searched };
            }
        }
    } else {
        None
    };

    let result = match (action, storage.as_deref()) {
        (Action::Reset, Some(path)) => actions::reset_identifiers(env, path),
        (Action::ShowIdentifiers, Some(path)) => actions::show_identifiers(env, path),
        (Action::RestoreLatest, Some(path)) => actions::restore_latest(env, path),
        (Action::ListBackups, _) => actions::list_backups(env),
        (Action::PruneBackups, _) => actions::prune_backups(env),
        (Action::Launch, _) => process::launch(&env.settings.launch_command, &[]).map(|handle| {
            let line = format!("Launched {} (pid {:?})", handle.label(), handle.pids());
            handles.push(handle);
            vec![line]
        }),
        (_, None) => Err(anyhow::anyhow!("storage path unavailable")),
    };

    match result {
        Ok(lines) => AppEvent::ActionFinished { action, lines },
        Err(err) => {
            log::error!("{} failed: {:#}", action.title(), err);
            AppEvent::ActionFailed {
                action,
                error: format!("{:#}", err),
            }
        }
    }
}
