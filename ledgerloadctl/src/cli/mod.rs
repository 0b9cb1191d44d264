pub mod plan;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use ledgerload_config::{ConfigLoad, ConfigLoader, ConfigOverrides};
use ledgerload_core::store::{LedgerFile, SnapshotLedger};

pub fn load_config(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<ConfigLoad> {
    let mut loader = ConfigLoader::new().with_overrides(overrides);
    if let Some(path) = config_path {
        loader = loader.with_config_path(path);
    }
    loader.load().context("failed to load configuration")
}

pub async fn read_ledger(path: &Path) -> Result<LedgerFile> {
    LedgerFile::load(path)
        .await
        .with_context(|| format!("failed to load ledger {}", path.display()))
}

pub fn snapshot(file: LedgerFile) -> Result<SnapshotLedger> {
    file.into_ledger().context("ledger snapshot rejected")
}
