//! Atom acquisition from static assets, legacy REST endpoints and live
//! WebSocket endpoints.
//!
//! Whatever the source, [`Fetcher::fetch`] yields the flat handle-indexed
//! encoding, which is what the legacy visualizer consumes.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::Conversion;
use crate::channel::CommandChannel;
use crate::config::BridgeConfig;
use crate::error::{FetchError, FetchResult};

/// Where a target's atoms come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A JSON file, local or served over HTTP, in either encoding.
    StaticAsset,
    /// A `ws://` or `wss://` CogServer endpoint.
    Live,
    /// A legacy REST server queried at `<target><api_path>/atoms`.
    LegacyHttp,
}

impl SourceKind {
    pub fn classify(target: &str, config: &BridgeConfig) -> Self {
        if target.ends_with(config.asset_suffix.as_str()) {
            SourceKind::StaticAsset
        } else if target.starts_with("ws://") || target.starts_with("wss://") {
            SourceKind::Live
        } else {
            SourceKind::LegacyHttp
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::StaticAsset => "static asset",
            SourceKind::Live => "live WebSocket",
            SourceKind::LegacyHttp => "legacy HTTP",
        };
        f.write_str(s)
    }
}

/// Result of a fetch: the flat response plus its counts.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub source: SourceKind,
    pub conversion: Conversion,
}

/// Picks a strategy per target and normalizes the result.
pub struct Fetcher {
    config: BridgeConfig,
    channel: Arc<CommandChannel>,
    http: ureq::Agent,
}

impl Fetcher {
    pub fn new(config: BridgeConfig) -> Self {
        let channel = Arc::new(CommandChannel::from_config(&config));
        let http = ureq::AgentBuilder::new()
            .timeout(config.command_timeout())
            .build();
        Self {
            config,
            channel,
            http,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The command channel used for live targets. It stays connected after a
    /// live fetch so callers can issue further commands.
    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    pub async fn fetch(&self, target: &str) -> FetchResult<FetchOutcome> {
        let source = SourceKind::classify(target, &self.config);
        tracing::debug!(target, %source, "fetching atoms");

        let conversion = match source {
            SourceKind::StaticAsset => self.fetch_asset(target).await?,
            SourceKind::Live => self.fetch_live(target).await?,
            SourceKind::LegacyHttp => self.fetch_legacy(target).await?,
        };
        tracing::info!(
            target,
            %source,
            atoms = conversion.atom_count,
            handles = conversion.distinct_handles,
            "fetched atoms"
        );
        Ok(FetchOutcome { source, conversion })
    }

    /// Load the configured sample asset (`sample_data_file`).
    pub async fn fetch_sample(&self) -> FetchResult<FetchOutcome> {
        let target = self.config.sample_data_file.as_str();
        tracing::debug!(target, "loading sample data");
        let conversion = self.fetch_asset(target).await?;
        Ok(FetchOutcome {
            source: SourceKind::StaticAsset,
            conversion,
        })
    }

    async fn fetch_asset(&self, target: &str) -> FetchResult<Conversion> {
        let payload = if is_http(target) {
            self.get_json(target.to_string()).await?
        } else {
            let text = tokio::fs::read_to_string(target)
                .await
                .map_err(|source| FetchError::Io {
                    path: target.to_string(),
                    source,
                })?;
            parse_json(&text)?
        };
        Ok(Conversion::from_payload(&payload))
    }

    async fn fetch_live(&self, target: &str) -> FetchResult<Conversion> {
        self.channel.connect(target).await?;
        let atoms = self.channel.get_all_atoms().await?;
        tracing::debug!(count = atoms.len(), "retrieved atoms over WebSocket");
        Ok(Conversion::from_atoms(&atoms))
    }

    async fn fetch_legacy(&self, target: &str) -> FetchResult<Conversion> {
        let url = format!("{target}{}/atoms", self.config.api_path);
        let payload = self.get_json(url).await?;
        Ok(Conversion::from_payload(&payload))
    }

    /// Blocking GET on the blocking pool.
    async fn get_json(&self, url: String) -> FetchResult<Value> {
        let http = self.http.clone();
        let timeout_ms = self.config.timeout_ms;
        tokio::task::spawn_blocking(move || get_json_blocking(&http, &url, timeout_ms))
            .await
            .map_err(|e| FetchError::Http {
                status: 0,
                message: format!("fetch task failed: {e}"),
            })?
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .field("channel", &self.channel)
            .finish()
    }
}

fn is_http(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn parse_json(text: &str) -> FetchResult<Value> {
    serde_json::from_str(text).map_err(|e| FetchError::Syntax {
        message: e.to_string(),
    })
}

fn get_json_blocking(http: &ureq::Agent, url: &str, timeout_ms: u64) -> FetchResult<Value> {
    let response = http
        .get(url)
        .set("Accept", "application/json")
        .set("Content-Type", "application/json")
        .call()
        .map_err(|e| http_error(e, url, timeout_ms))?;
    // Streamed straight into the decoder; `into_string` caps bodies at 10 MB.
    serde_json::from_reader(response.into_reader()).map_err(|e| body_error(e, url, timeout_ms))
}

/// A body that stalls past the timeout is a timeout; anything else that goes
/// wrong while reading or decoding it is a syntax error.
fn body_error(err: serde_json::Error, url: &str, timeout_ms: u64) -> FetchError {
    if err.is_io() {
        let io = std::io::Error::from(err);
        if is_timeout(&io) {
            return FetchError::Timeout {
                url: url.to_string(),
                timeout_ms,
            };
        }
        return FetchError::Syntax {
            message: format!("failed to read response body: {io}"),
        };
    }
    FetchError::Syntax {
        message: err.to_string(),
    }
}

fn http_error(err: ureq::Error, url: &str, timeout_ms: u64) -> FetchError {
    match err {
        ureq::Error::Status(code, response) => {
            tracing::warn!(url, status = code, "HTTP error status");
            FetchError::from_status(code, Some(response.status_text()))
        }
        ureq::Error::Transport(transport) => {
            let timed_out = std::error::Error::source(&transport)
                .and_then(|s| s.downcast_ref::<std::io::Error>())
                .is_some_and(is_timeout);
            if timed_out {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms,
                }
            } else {
                tracing::warn!(url, error = %transport, "transport error");
                FetchError::from_status(0, None)
            }
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_targets() {
        let config = BridgeConfig::default();
        assert_eq!(
            SourceKind::classify("assets/atoms.sample1.json", &config),
            SourceKind::StaticAsset
        );
        assert_eq!(
            SourceKind::classify("http://host/atoms.json", &config),
            SourceKind::StaticAsset
        );
        assert_eq!(SourceKind::classify("ws://localhost:18080/json", &config), SourceKind::Live);
        assert_eq!(SourceKind::classify("wss://example.org/ws", &config), SourceKind::Live);
        assert_eq!(
            SourceKind::classify("http://localhost:5000", &config),
            SourceKind::LegacyHttp
        );
    }

    #[test]
    fn asset_suffix_wins_over_scheme() {
        // The CogServer path ends in "/json", not ".json".
        let config = BridgeConfig::default();
        assert_eq!(SourceKind::classify("ws://host/atoms.json", &config), SourceKind::StaticAsset);
    }

    #[test]
    fn syntax_errors() {
        let err = parse_json("{ nope").unwrap_err();
        assert!(matches!(err, FetchError::Syntax { .. }));
        assert_eq!(err.status(), 0);
    }

    struct Stalled;

    impl std::io::Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))
        }
    }

    #[test]
    fn body_read_failures_are_not_reported_as_unreachable() {
        let stalled = serde_json::from_reader::<_, Value>(Stalled).unwrap_err();
        let err = body_error(stalled, "http://host/atoms", 50);
        assert!(matches!(err, FetchError::Timeout { timeout_ms: 50, .. }));

        let truncated = serde_json::from_reader::<_, Value>(&b"{\"result\": "[..]).unwrap_err();
        let err = body_error(truncated, "http://host/atoms", 50);
        assert!(matches!(err, FetchError::Syntax { .. }));
        assert_eq!(err.status(), 0);
    }

    #[tokio::test]
    async fn missing_asset_is_io_error() {
        let fetcher = Fetcher::new(BridgeConfig::default());
        let err = fetcher.fetch("/definitely/not/here.json").await.unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
