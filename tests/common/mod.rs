//! Shared helpers for the integration tests.
//!
//! # Running with tracing
//!
//! Use the TEST_LOG environment variable to control tracing verbosity
//! (like -v, -vv, -vvv):
//!
//! ```bash
//! # Info level (equivalent to -v)
//! TEST_LOG=1 cargo test scalar_round_trip -- --nocapture
//!
//! # Debug level (equivalent to -vv)
//! TEST_LOG=2 cargo test scalar_round_trip -- --nocapture
//!
//! # Trace level (equivalent to -vvv)
//! TEST_LOG=3 cargo test scalar_round_trip -- --nocapture
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Once};

use simcomm::{
    DirectClientKind, DirectHub, DirectServerKind, TcpClientKind, TcpServerKind,
    TransportRegistry,
};

static INIT: Once = Once::new();

/// Initialize tracing based on the TEST_LOG environment variable.
pub fn init_tracing() {
    INIT.call_once(|| {
        if let Ok(level_str) = std::env::var("TEST_LOG") {
            let verbosity = level_str.parse::<u8>().unwrap_or(0);

            if verbosity > 0 {
                let level = match verbosity {
                    1 => "info",
                    2 => "debug",
                    _ => "trace", // 3 or more
                };

                let filter = format!("simcomm={}", level);
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .with_test_writer()
                    .try_init();
            }
        }
    });
}

/// A registry offering only the in-process direct transport.
pub fn direct_registry(hub: &Arc<DirectHub>) -> TransportRegistry {
    TransportRegistry::new()
        .with_client_kind(DirectClientKind::new(hub.clone()))
        .with_server_kind(DirectServerKind::new(hub.clone()))
}

/// A registry offering only the TCP transport, on an ephemeral port.
pub fn tcp_registry() -> TransportRegistry {
    TransportRegistry::new()
        .with_client_kind(TcpClientKind)
        .with_server_kind(TcpServerKind::new("127.0.0.1:0"))
}

/// Builds a peer-dimensions map from kernel names and dimension lists.
pub fn dims(entries: &[(&str, &[usize])]) -> HashMap<String, Vec<usize>> {
    entries
        .iter()
        .map(|(kernel, dims)| (kernel.to_string(), dims.to_vec()))
        .collect()
}

/// Builds a peer-locations map from instance references and location lists.
pub fn locations(entries: &[(&str, Vec<String>)]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(instance, locations)| (instance.to_string(), locations.clone()))
        .collect()
}
