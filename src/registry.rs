//! Windows レジストリの SQM マシン ID

use crate::backup::IdentifierStore;
use anyhow::{Context, Result};
use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE};
use winreg::RegKey;

const SUBKEY: &str = r"SOFTWARE\Microsoft\SQMClient";
const VALUE_NAME: &str = "MachineId";

/// `HKLM\SOFTWARE\Microsoft\SQMClient\MachineId`
#[derive(Debug, Clone, Copy)]
pub struct SqmMachineId;

impl SqmMachineId {
    fn open(&self, flags: u32) -> Result<RegKey> {
        RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(SUBKEY, flags)
            .with_context(|| format!(r"Failed to open HKLM\{}", SUBKEY))
    }
}

impl IdentifierStore for SqmMachineId {
    fn describe(&self) -> String {
        format!(r"HKLM\{}\{}", SUBKEY, VALUE_NAME)
    }

    fn backup_name(&self) -> &str {
        "SQMClient-MachineId"
    }

    fn read(&self) -> Result<Vec<u8>> {
        let value: String = self
            .open(KEY_READ)?
            .get_value(VALUE_NAME)
            .with_context(|| format!("Failed to read {}", self.describe()))?;
        Ok(value.into_bytes())
    }

    fn write(&self, content: &[u8]) -> Result<()> {
        let value = std::str::from_utf8(content).context("Registry value must be UTF-8")?;
        self.open(KEY_READ | KEY_WRITE)?
            .set_value(VALUE_NAME, &value.to_string())
            .with_context(|| format!("Failed to write {}", self.describe()))
    }
}
