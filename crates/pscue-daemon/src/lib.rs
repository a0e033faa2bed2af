use std::sync::Arc;

use eyre::Result;
use pscue_client::database::Database;
use pscue_client::settings::Settings;
use pscue_client::stores::LearningStores;

pub mod catalog;
pub mod client;
pub mod components;
pub mod daemon;
pub mod events;
pub mod protocol;
pub mod server;
pub mod socket;

// Re-export core daemon types for convenience
pub use daemon::{Component, Daemon, DaemonBuilder, DaemonHandle};
pub use events::DaemonEvent;

// Re-export components
pub use components::{CompletionComponent, CompletionService, LearningComponent, PersistComponent};

// Re-export client helpers
pub use client::{CompletionClient, filter_completions};

/// Boot the daemon with the standard components.
///
/// This creates the learning, completion, and persistence components, starts
/// the IPC server, and runs the event loop until shutdown.
pub async fn boot(settings: Settings, stores: LearningStores, database: Database) -> Result<()> {
    // Create the components
    let learning = LearningComponent::new();
    let completion = CompletionComponent::new(
        stores.clone(),
        &settings,
        Arc::new(catalog::StaticCatalog::new()),
    );

    // Get the IPC service before moving the component into the daemon
    // (the service shares state with the component via Arc)
    let service = completion.service();

    // Build the daemon
    let mut daemon = Daemon::builder(settings)
        .stores(stores)
        .database(database)
        .component(learning)
        .component(completion)
        .component(PersistComponent::new())
        .build()
        .await?;

    let handle = daemon.handle();

    // Start all components first (so the IPC service can work)
    daemon.start_components().await?;

    // Spawn signal handler to emit ShutdownRequested on Ctrl+C/SIGTERM
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("received shutdown signal");
        signal_handle.shutdown();
    });

    // Start the IPC server in the background
    server::run_server(service, handle).await?;

    // Run the daemon event loop
    daemon.run_event_loop().await?;

    // Stop all components on shutdown
    daemon.stop_components().await;

    tracing::info!("daemon shut down complete");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
#[cfg(unix)]
async fn shutdown_signal() {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register sigterm handler");
    let mut int = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("failed to register sigint handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = int.recv() => {},
    }
}

/// Wait for a shutdown signal (Ctrl+C).
#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
}
