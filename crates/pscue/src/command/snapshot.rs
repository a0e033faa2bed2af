use std::path::Path;

use eyre::{Context, Result};
use pscue_client::database::Database;
use pscue_client::import::{ImportMode, Snapshot};
use pscue_client::settings::Settings;

/// Export learned data to a JSON snapshot file.
pub async fn export(path: &Path) -> Result<()> {
    let settings = Settings::new()?;
    let database = Database::new(settings.db_path(), settings.local_timeout).await?;

    let snapshot = database.export_snapshot().await?;
    let json = serde_json::to_string_pretty(&snapshot)?;
    fs_err::write(path, json).wrap_err_with(|| format!("could not write {path:?}"))?;

    println!(
        "exported {} commands, {} history entries to {}",
        snapshot.commands.len(),
        snapshot.history.len(),
        path.display()
    );
    Ok(())
}

/// Import a JSON snapshot, merging additively or replacing existing data.
pub async fn import(path: &Path, replace: bool) -> Result<()> {
    let settings = Settings::new()?;
    let database = Database::new(settings.db_path(), settings.local_timeout).await?;

    let json = fs_err::read_to_string(path).wrap_err_with(|| format!("could not read {path:?}"))?;
    let snapshot: Snapshot =
        serde_json::from_str(&json).wrap_err("snapshot file is not valid JSON")?;

    let mode = if replace {
        ImportMode::Replace
    } else {
        ImportMode::Merge
    };
    database.import_snapshot(&snapshot, mode).await?;

    println!(
        "imported {} commands, {} history entries from {}",
        snapshot.commands.len(),
        snapshot.history.len(),
        path.display()
    );
    Ok(())
}
