// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::bus::nats::NatsConfig;
use crate::upload::UploadLimits;

/// Real-time multi-room chat server.
#[derive(Debug, Clone, Parser)]
#[command(name = "parlor", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "PARLOR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP/WebSocket port to listen on.
    #[arg(long, env = "PARLOR_PORT", default_value_t = 3012)]
    pub port: u16,

    /// Backing store URL (`sqlite://path/to/db`). In-process memory when unset.
    #[arg(long, env = "PARLOR_DATABASE_URL")]
    pub database_url: Option<String>,

    /// NATS server URL for cross-process fan-out. Local-only when unset.
    #[arg(long, env = "PARLOR_NATS_URL")]
    pub nats_url: Option<String>,

    /// NATS auth token.
    #[arg(long, env = "PARLOR_NATS_TOKEN")]
    pub nats_token: Option<String>,

    /// NATS subject prefix.
    #[arg(long, env = "PARLOR_NATS_PREFIX", default_value = "parlor")]
    pub nats_prefix: String,

    /// Interval between server pings, in milliseconds.
    #[arg(long, env = "PARLOR_HEARTBEAT_INTERVAL_MS", default_value_t = 25_000)]
    pub heartbeat_interval_ms: u64,

    /// Drop a connection with no inbound frame for this long, in milliseconds.
    #[arg(long, env = "PARLOR_HEARTBEAT_TIMEOUT_MS", default_value_t = 60_000)]
    pub heartbeat_timeout_ms: u64,

    /// Discard upload sessions idle for this long, in milliseconds.
    #[arg(long, env = "PARLOR_UPLOAD_TTL_MS", default_value_t = 120_000)]
    pub upload_ttl_ms: u64,

    /// Maximum decoded size of one image upload, in bytes.
    #[arg(long, env = "PARLOR_MAX_UPLOAD_BYTES", default_value_t = 5 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Maximum chunk count of one image upload.
    #[arg(long, env = "PARLOR_MAX_UPLOAD_CHUNKS", default_value_t = 1024)]
    pub max_upload_chunks: u32,

    /// Maximum concurrent upload sessions per connection.
    #[arg(long, env = "PARLOR_MAX_UPLOADS_PER_CONNECTION", default_value_t = 8)]
    pub max_uploads_per_connection: usize,

    /// Allowed CORS origin. Any origin when unset.
    #[arg(long, env = "PARLOR_CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "PARLOR_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PARLOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate option combinations.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_interval_ms == 0 {
            anyhow::bail!("--heartbeat-interval-ms must be greater than zero");
        }
        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            anyhow::bail!("--heartbeat-timeout-ms must exceed --heartbeat-interval-ms");
        }
        if self.upload_ttl_ms == 0 {
            anyhow::bail!("--upload-ttl-ms must be greater than zero");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("--max-upload-bytes must be greater than zero");
        }
        if self.max_upload_chunks == 0 {
            anyhow::bail!("--max-upload-chunks must be greater than zero");
        }
        if self.max_uploads_per_connection == 0 {
            anyhow::bail!("--max-uploads-per-connection must be greater than zero");
        }
        if let Some(ref url) = self.database_url {
            if !url.starts_with("sqlite:") {
                anyhow::bail!("unsupported --database-url (expected sqlite:...): {url}");
            }
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            ttl: Duration::from_millis(self.upload_ttl_ms),
            max_bytes: self.max_upload_bytes,
            max_chunks: self.max_upload_chunks,
            max_sessions: self.max_uploads_per_connection,
        }
    }

    /// NATS settings, when a URL is configured.
    pub fn nats(&self) -> Option<NatsConfig> {
        self.nats_url.as_ref().map(|url| NatsConfig {
            url: url.clone(),
            token: self.nats_token.clone(),
            prefix: self.nats_prefix.clone(),
        })
    }

    /// Build a minimal `Config` for tests (loopback, port 0, fast heartbeats).
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            nats_url: None,
            nats_token: None,
            nats_prefix: "parlor-test".into(),
            heartbeat_interval_ms: 200,
            heartbeat_timeout_ms: 1_000,
            upload_ttl_ms: 5_000,
            max_upload_bytes: 5 * 1024 * 1024,
            max_upload_chunks: 1024,
            max_uploads_per_connection: 8,
            cors_origin: None,
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
