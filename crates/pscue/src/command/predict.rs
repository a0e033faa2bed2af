use eyre::Result;
use pscue_client::database::Database;
use pscue_client::predictor::Predictor;
use pscue_client::settings::Settings;
use pscue_client::stores::LearningStores;
use pscue_client::suggestion::CancelFlag;

/// Print ranked suggestion texts for the input line, one per line.
pub async fn run(input: &str) -> Result<()> {
    let settings = Settings::new()?;
    let stores = LearningStores::new(&settings);

    // A missing database just means nothing has been learned yet.
    if settings.db_path().exists() {
        let database = Database::new(settings.db_path(), settings.local_timeout).await?;
        database.load(&stores).await?;
    }

    let predictor = Predictor::new(stores, &settings);
    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));

    for suggestion in predictor.suggest(input, &cwd, &CancelFlag::new()) {
        println!("{}", suggestion.text);
    }

    Ok(())
}
