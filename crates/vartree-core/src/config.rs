// vartree
// SPDX-License-Identifier: MPL-2.0

//! Server configuration. The core accepts this record from the out-of-scope
//! CLI/config-loader collaborator (spec.md §6, "Environment / CLI surface").

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which storage back-end to open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Sqlite,
    Postgres,
}

/// Server configuration record (spec.md §6). Constructed by the embedding
/// CLI, not loaded by this crate directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// UDS path on POSIX, named pipe name on Windows.
    pub socket_path: String,
    pub storage_kind: StorageKind,
    /// Connection string / file path for the chosen back-end. Ignored for
    /// `StorageKind::Memory`.
    pub storage_url: String,
    /// 0 disables session expiration (spec.md §4.8).
    #[serde(with = "duration_secs")]
    pub session_timeout: Duration,
    /// Change-detector throttle interval (spec.md §4.6). Default 50ms.
    #[serde(with = "duration_millis")]
    pub refresh_interval: Duration,
    /// Session cleanup worker interval (spec.md §4.8). Default 1h.
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
    /// Shutdown connection-drain grace period. Default 10s.
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
    /// Maximum frame payload size in bytes. Default 16 MiB.
    pub max_frame_bytes: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: "/tmp/vartree.sock".to_owned(),
            storage_kind: StorageKind::Memory,
            storage_url: String::new(),
            session_timeout: Duration::from_secs(0),
            refresh_interval: Duration::from_millis(50),
            cleanup_interval: Duration::from_secs(3600),
            shutdown_grace: Duration::from_secs(10),
            max_frame_bytes: 16 * 1024 * 1024,
            log_level: "info".to_owned(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_session_timeout() {
        let cfg = Config::default();
        assert_eq!(cfg.session_timeout, Duration::from_secs(0));
        assert_eq!(cfg.refresh_interval, Duration::from_millis(50));
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
