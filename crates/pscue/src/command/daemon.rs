use eyre::Result;
use pscue_client::database::Database;
use pscue_client::settings::Settings;
use pscue_client::stores::LearningStores;

/// Run the prediction daemon in the foreground until a shutdown signal.
pub async fn run() -> Result<()> {
    let settings = Settings::new()?;
    let database = Database::new(settings.db_path(), settings.local_timeout).await?;

    let stores = LearningStores::new(&settings);
    database.load(&stores).await?;

    tracing::info!("learned data loaded, starting daemon");
    pscue_daemon::boot(settings, stores, database).await
}
