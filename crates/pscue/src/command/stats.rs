use eyre::Result;
use pscue_client::database::Database;
use pscue_client::settings::Settings;
use pscue_client::stores::LearningStores;
use pscue_daemon::client::CompletionClient;
use pscue_daemon::protocol::{DebugRequest, DebugRequestType};

/// Show statistics about learned data.
///
/// Asks a running daemon first (its numbers include live, unsaved usage);
/// falls back to reading the database directly.
pub async fn run() -> Result<()> {
    let settings = Settings::new()?;

    if let Ok(mut client) = CompletionClient::connect(&settings).await {
        let response = client
            .debug(&DebugRequest {
                request_type: DebugRequestType::Stats,
                filter: None,
            })
            .await?;
        if let Some(stats) = response.stats {
            println!("source:               daemon");
            println!("commands:             {}", stats.commands);
            println!("arguments:            {}", stats.arguments);
            println!("history entries:      {}", stats.history_entries);
            println!("sequence transitions: {}", stats.sequence_transitions);
            println!("workflow transitions: {}", stats.workflow_transitions);
            println!("cache entries:        {}", stats.cache_entries);
            println!("cache hits:           {}", stats.cache_hits);
            return Ok(());
        }
    }

    let stores = LearningStores::new(&settings);
    if settings.db_path().exists() {
        let database = Database::new(settings.db_path(), settings.local_timeout).await?;
        database.load(&stores).await?;
    }
    let stats = stores.stats();

    println!("source:               {}", settings.db_path().display());
    println!("commands:             {}", stats.knowledge.commands);
    println!("arguments:            {}", stats.knowledge.arguments);
    println!("history entries:      {}", stats.history.len);
    println!("sequence transitions: {}", stats.sequences.transitions);
    println!("workflow transitions: {}", stats.workflows.transitions);

    Ok(())
}
