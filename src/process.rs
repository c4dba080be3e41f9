use crate::platform::Platform;
use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

/// 終了確認の回数と間隔
const EXIT_POLLS: u32 = 10;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 実行中プロセスの PID 一覧
pub fn find_running(platform: Platform, process: &str) -> Result<Vec<u32>> {
    let image = platform.image_name(process);
    match platform {
        Platform::Windows => {
            let output = Command::new("tasklist")
                .args(["/FI", &format!("IMAGENAME eq {}", image), "/NH", "/FO", "CSV"])
                .output()
                .context("Failed to run tasklist")?;
            Ok(parse_tasklist_csv(&String::from_utf8_lossy(&output.stdout)))
        }
        Platform::MacOs | Platform::Linux => {
            let output = Command::new("pgrep")
                .args(["-x", &image])
                .output()
                .context("Failed to run pgrep")?;
            // 該当なしは終了コード 1
            Ok(parse_pid_lines(&String::from_utf8_lossy(&output.stdout)))
        }
    }
}

/// `tasklist /FO CSV /NH` の出力から PID を取り出す
fn parse_tasklist_csv(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter(|line| line.starts_with('"'))
        .filter_map(|line| line.split("\",\"").nth(1))
        .filter_map(|pid| pid.trim_matches('"').parse().ok())
        .collect()
}

/// `pgrep` の出力（1行1PID）
fn parse_pid_lines(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

fn kill_by_name(platform: Platform, process: &str) -> Result<()> {
    let image = platform.image_name(process);
    let status = match platform {
        Platform::Windows => Command::new("taskkill").args(["/F", "/IM", &image]).status(),
        Platform::MacOs | Platform::Linux => {
            Command::new("pkill").args(["-9", "-x", &image]).status()
        }
    }
    .with_context(|| format!("Failed to run kill utility for {}", image))?;

    if !status.success() {
        log::debug!("Kill utility for {} exited with {}", image, status);
    }
    Ok(())
}

/// 対象アプリを強制終了し、終了したプロセス数を返す
///
/// 一定時間内に消えなければエラー。書き換えはその後に行うこと。
pub fn terminate_all(platform: Platform, processes: &[String]) -> Result<usize> {
    let mut killed = 0;
    for process in processes {
        let pids = find_running(platform, process)?;
        if pids.is_empty() {
            continue;
        }

        log::info!("Stopping {} (pids {:?})", process, pids);
        kill_by_name(platform, process)?;

        let mut remaining = pids.len();
        for _ in 0..EXIT_POLLS {
            remaining = find_running(platform, process)?.len();
            if remaining == 0 {
                break;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        if remaining > 0 {
            anyhow::bail!("{} is still running ({} processes)", process, remaining);
        }

        log::info!("✓ Stopped {}", process);
        killed += pids.len();
    }
    Ok(killed)
}

/// 起動した子プロセスの所有者
///
/// `cleanup` に渡すと残っているプロセスを終了する。
/// 渡さずに drop した場合はプロセスをそのまま残す。
#[derive(Debug)]
pub struct ChildHandle {
    label: String,
    children: Vec<Child>,
}

impl ChildHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.iter().map(Child::id).collect()
    }
}

/// コマンドを起動（標準入出力は切り離す）
pub fn launch(command: &str, args: &[String]) -> Result<ChildHandle> {
    let child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to launch {}", command))?;

    log::info!("Launched {} (pid {})", command, child.id());
    Ok(ChildHandle {
        label: command.to_string(),
        children: vec![child],
    })
}

/// 残っている子プロセスを終了し、終了させた数を返す
pub fn cleanup(handle: ChildHandle) -> usize {
    let mut killed = 0;
    for mut child in handle.children {
        match child.try_wait() {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => log::warn!("Failed to query pid {}: {}", child.id(), e),
        }

        match child.kill() {
            Ok(()) => {
                let _ = child.wait();
                log::info!("Killed {} (pid {})", handle.label, child.id());
                killed += 1;
            }
            Err(e) => log::warn!("Failed to kill pid {}: {}", child.id(), e),
        }
    }
    killed
}
