//! Integration tests for the daemon server lifecycle.
//!
//! Each test spins up a real IPC server on a temporary unix socket,
//! connects a client, and exercises the framed protocol.

#[cfg(unix)]
mod unix {
    use std::sync::Arc;
    use std::time::Duration;

    use pscue_client::database::Database;
    use pscue_client::history::HistoryEntry;
    use pscue_client::settings::Settings;
    use pscue_client::stores::LearningStores;
    use pscue_daemon::catalog::StaticCatalog;
    use pscue_daemon::client::{CompletionClient, filter_completions};
    use pscue_daemon::components::{CompletionComponent, LearningComponent, PersistComponent};
    use pscue_daemon::protocol::{CompletionRequest, DebugRequest, DebugRequestType};
    use pscue_daemon::{Daemon, DaemonEvent, DaemonHandle, server};
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    /// Spins up a daemon on a temp socket and returns a connected client,
    /// the daemon handle (for shutdown), the settings, and the temp dir
    /// (must be held to keep paths alive).
    async fn start_test_daemon() -> (CompletionClient, DaemonHandle, Settings, TempDir) {
        let tmp = tempfile::tempdir().unwrap();

        let db_path = tmp.path().join("learned-data.db");
        let socket_path = tmp.path().join("test.sock");

        let settings: Settings = Settings::builder()
            .expect("could not build settings builder")
            .set_override("db_path", db_path.to_str().unwrap())
            .expect("failed to set db_path")
            .set_override("socket_path", socket_path.to_str().unwrap())
            .expect("failed to set socket_path")
            .set_override("save_interval_seconds", 3600)
            .expect("failed to set save_interval_seconds")
            .build()
            .expect("could not build settings")
            .try_deserialize()
            .expect("could not deserialize settings");

        let database = Database::new(&db_path, 5.0).await.unwrap();
        let stores = LearningStores::new(&settings);

        let completion =
            CompletionComponent::new(stores.clone(), &settings, Arc::new(StaticCatalog::new()));
        let service = completion.service();

        let mut daemon = Daemon::builder(settings.clone())
            .stores(stores)
            .database(database)
            .component(LearningComponent::new())
            .component(completion)
            .component(PersistComponent::new())
            .build()
            .await
            .unwrap();

        let handle = daemon.handle();

        daemon.start_components().await.unwrap();
        server::run_server(service, handle.clone()).await.unwrap();

        // Spawn the daemon event loop in the background
        tokio::spawn(async move {
            daemon.run_event_loop().await.unwrap();
            daemon.stop_components().await;
        });

        // Give the server a moment to bind.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = CompletionClient::connect(&settings).await.unwrap();

        (client, handle, settings, tmp)
    }

    fn record(handle: &DaemonHandle, command: &str, line: &str, args: &[&str]) {
        handle.emit(DaemonEvent::CommandRecorded(
            HistoryEntry::builder()
                .command(command)
                .command_line(line)
                .arguments(args.iter().map(|s| (*s).to_string()).collect::<Vec<_>>())
                .build(),
        ));
    }

    #[tokio::test]
    async fn test_ping() {
        let (mut client, _handle, _settings, _tmp) = start_test_daemon().await;
        assert!(client.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_completion_round_trip() {
        let (mut client, _handle, _settings, _tmp) = start_test_daemon().await;

        let response = client
            .complete(&CompletionRequest {
                command: "git".to_string(),
                command_line: "git co".to_string(),
                word_to_complete: "co".to_string(),
                include_dynamic_arguments: true,
            })
            .await
            .unwrap();

        assert!(!response.cached);
        // the full context list comes back; the client filters
        assert!(response.completions.iter().any(|c| c.text == "status"));

        let filtered = filter_completions(response.completions, "co");
        assert!(filtered.iter().all(|c| c.text.starts_with("co")));
        assert!(filtered.iter().any(|c| c.text == "commit"));

        // same context again hits the cache
        let again = client
            .complete(&CompletionRequest {
                command: "git".to_string(),
                command_line: "git sta".to_string(),
                word_to_complete: "sta".to_string(),
                include_dynamic_arguments: true,
            })
            .await
            .unwrap();
        assert!(again.cached);
    }

    #[tokio::test]
    async fn test_learned_arguments_reach_completions() {
        let (mut client, handle, _settings, _tmp) = start_test_daemon().await;

        for _ in 0..3 {
            record(
                &handle,
                "terraform",
                "terraform apply -auto-approve",
                &["apply", "-auto-approve"],
            );
        }
        // events are processed asynchronously by the event loop
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = client
            .complete(&CompletionRequest {
                command: "terraform".to_string(),
                command_line: "terraform ap".to_string(),
                word_to_complete: "ap".to_string(),
                include_dynamic_arguments: false,
            })
            .await
            .unwrap();

        assert!(response.completions.iter().any(|c| c.text == "apply"));
    }

    #[tokio::test]
    async fn test_debug_stats_and_cache() {
        let (mut client, handle, _settings, _tmp) = start_test_daemon().await;

        record(&handle, "git", "git status", &["status"]);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = client
            .debug(&DebugRequest {
                request_type: DebugRequestType::Stats,
                filter: None,
            })
            .await
            .unwrap();
        assert!(stats.success);
        let stats = stats.stats.unwrap();
        assert_eq!(stats.commands, 1);
        assert_eq!(stats.history_entries, 1);

        // populate the cache, then inspect and clear it
        client
            .complete(&CompletionRequest {
                command: "git".to_string(),
                command_line: "git ".to_string(),
                word_to_complete: String::new(),
                include_dynamic_arguments: false,
            })
            .await
            .unwrap();

        let cache = client
            .debug(&DebugRequest {
                request_type: DebugRequestType::Cache,
                filter: Some("git".to_string()),
            })
            .await
            .unwrap();
        assert!(cache.success);
        assert_eq!(cache.cache_entries.unwrap().len(), 1);

        let cleared = client
            .debug(&DebugRequest {
                request_type: DebugRequestType::Clear,
                filter: None,
            })
            .await
            .unwrap();
        assert!(cleared.success);

        let cache = client
            .debug(&DebugRequest {
                request_type: DebugRequestType::Cache,
                filter: None,
            })
            .await
            .unwrap();
        assert!(cache.cache_entries.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_connection() {
        let (_client, _handle, settings, _tmp) = start_test_daemon().await;

        // hand-roll a frame header claiming 2 MiB
        let mut raw = tokio::net::UnixStream::connect(&settings.socket_path)
            .await
            .unwrap();
        raw.write_all(&(2u32 * 1024 * 1024).to_le_bytes())
            .await
            .unwrap();
        raw.write_all(&[0u8; 64]).await.unwrap();

        // the server sends no response and closes the connection
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), async {
            use tokio::io::AsyncReadExt;
            raw.read(&mut buf).await
        })
        .await
        .expect("server should close the connection promptly")
        .unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_malformed_debug_request_gets_error_response() {
        let (_client, _handle, settings, _tmp) = start_test_daemon().await;

        let mut raw = tokio::net::UnixStream::connect(&settings.socket_path)
            .await
            .unwrap();
        let payload = b"{not json";
        raw.write_all(&[b'D']).await.unwrap();
        raw.write_all(&(payload.len() as u32).to_le_bytes())
            .await
            .unwrap();
        raw.write_all(payload).await.unwrap();

        let frame = pscue_daemon::protocol::read_frame(&mut raw)
            .await
            .unwrap()
            .expect("error response expected");
        match frame {
            pscue_daemon::protocol::Frame::Debug(payload) => {
                let response: pscue_daemon::protocol::DebugResponse =
                    serde_json::from_slice(&payload).unwrap();
                assert!(!response.success);
                assert!(response.message.is_some());
            }
            _ => panic!("expected debug frame"),
        }
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (mut client, handle, settings, _tmp) = start_test_daemon().await;

        assert!(client.ping().await.unwrap());
        handle.shutdown();

        // Give the server time to shut down.
        tokio::time::sleep(Duration::from_millis(200)).await;

        // New connections are refused once the server is gone.
        assert!(CompletionClient::connect(&settings).await.is_err());
    }
}
