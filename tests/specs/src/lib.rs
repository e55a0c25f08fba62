// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `parlor` binary as a subprocess and exercises it over
//! HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `parlor` binary.
pub fn parlor_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("parlor")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `parlor` process that is killed on drop.
pub struct ParlorProcess {
    child: Child,
    port: u16,
}

/// Builder for the options a [`ParlorProcess`] is started with.
#[derive(Default)]
pub struct ParlorBuilder {
    database_url: Option<String>,
    nats_url: Option<String>,
    heartbeat_ms: Option<(u64, u64)>,
}

impl ParlorBuilder {
    /// Use a shared backing store (`--database-url`).
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Enable NATS fan-out (`--nats-url`).
    pub fn nats(mut self, url: &str) -> Self {
        self.nats_url = Some(url.to_owned());
        self
    }

    /// Override heartbeat interval and timeout, in milliseconds.
    pub fn heartbeat_ms(mut self, interval: u64, timeout: u64) -> Self {
        self.heartbeat_ms = Some((interval, timeout));
        self
    }

    pub fn spawn(self) -> anyhow::Result<ParlorProcess> {
        let binary = parlor_binary();
        anyhow::ensure!(binary.exists(), "parlor binary not found at {}", binary.display());

        let port = free_port()?;
        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];
        if let Some(ref url) = self.database_url {
            args.extend(["--database-url".into(), url.clone()]);
        }
        if let Some(ref url) = self.nats_url {
            args.extend(["--nats-url".into(), url.clone()]);
        }
        if let Some((interval, timeout)) = self.heartbeat_ms {
            args.extend([
                "--heartbeat-interval-ms".into(),
                interval.to_string(),
                "--heartbeat-timeout-ms".into(),
                timeout.to_string(),
            ]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .env_remove("PARLOR_DATABASE_URL")
            .env_remove("PARLOR_NATS_URL")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(ParlorProcess { child, port })
    }
}

impl ParlorProcess {
    pub fn build() -> ParlorBuilder {
        ParlorBuilder::default()
    }

    /// Spawn parlor with defaults (memory store, local fan-out).
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket URL.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// Poll health until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/api/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("parlor did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Deliver SIGTERM to the process.
    pub fn terminate(&self) -> anyhow::Result<()> {
        let status = Command::new("kill").args(["-TERM", &self.child.id().to_string()]).status()?;
        anyhow::ensure!(status.success(), "kill -TERM failed: {status}");
        Ok(())
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("parlor did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for ParlorProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
