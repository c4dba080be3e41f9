use crate::platform::Platform;
use anyhow::Result;
use std::process::{Command, Stdio};

/// 管理者権限で実行されているか
///
/// Windows では `net session` が管理者でのみ成功することを利用する。
pub fn is_elevated(platform: Platform) -> bool {
    if !platform.requires_elevation() {
        return true;
    }
    Command::new("net")
        .arg("session")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// 権限が足りなければエラー（起動時に致命的エラーとして扱う）
pub fn ensure_elevated(platform: Platform) -> Result<()> {
    if is_elevated(platform) {
        return Ok(());
    }
    anyhow::bail!(
        "Administrator privileges required on {}: run this tool from an elevated terminal",
        platform.name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_platforms_need_no_elevation() {
        assert!(is_elevated(Platform::Linux));
        assert!(ensure_elevated(Platform::MacOs).is_ok());
    }
}
