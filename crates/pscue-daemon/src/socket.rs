//! Socket path derivation.
//!
//! The server and the short-lived completer must agree on an address without
//! a directory lookup, so the path is derived deterministically from the
//! process identity: the current user plus an optional `PSCUE_SESSION`
//! discriminator. An explicit `socket_path` setting overrides derivation.

use std::path::PathBuf;

use pscue_client::settings::Settings;

/// Deterministic per-user socket path.
pub fn default_socket_path() -> PathBuf {
    let dir = directories::BaseDirs::new()
        .and_then(|base| base.runtime_dir().map(PathBuf::from))
        .unwrap_or_else(std::env::temp_dir);

    let user = whoami::username();
    let name = match std::env::var("PSCUE_SESSION") {
        Ok(session) if !session.is_empty() => format!("pscue-{user}-{session}.sock"),
        _ => format!("pscue-{user}.sock"),
    };
    dir.join(name)
}

/// The socket path to use: the configured override, or the derived default.
pub fn socket_path(settings: &Settings) -> PathBuf {
    if settings.socket_path.is_empty() {
        default_socket_path()
    } else {
        PathBuf::from(&settings.socket_path)
    }
}
