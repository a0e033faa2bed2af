use eyre::Result;
use pscue_client::database::Database;
use pscue_client::settings::Settings;
use pscue_client::stores::LearningStores;

/// Show recent command history, newest first.
pub async fn run(count: usize) -> Result<()> {
    let settings = Settings::new()?;
    let stores = LearningStores::new(&settings);

    if settings.db_path().exists() {
        let database = Database::new(settings.db_path(), settings.local_timeout).await?;
        database.load(&stores).await?;
    }

    for entry in stores.history.recent(count) {
        let marker = if entry.success { ' ' } else { '!' };
        println!("{marker} {}  {}", entry.timestamp, entry.command_line);
    }

    Ok(())
}
