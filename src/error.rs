//! Diagnostic error types for atomspace-bridge.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives
//! so the CLI can show an error code and a hint alongside the message. Fetch
//! errors wrap channel errors, since a live fetch drives the channel.

use miette::Diagnostic;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Command channel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ChannelError {
    #[error("WebSocket not connected")]
    #[diagnostic(
        code(atomspace::channel::not_connected),
        help("Call `connect()` with the AtomSpace endpoint before sending commands.")
    )]
    NotConnected,

    #[error("transport error: {message}")]
    #[diagnostic(
        code(atomspace::channel::transport),
        help(
            "The WebSocket connection failed. Check that the CogServer is running \
             and that the endpoint URL (e.g. ws://localhost:18080/json) is correct."
        )
    )]
    Transport { message: String },

    #[error("timed out connecting to {endpoint} after {timeout_ms} ms")]
    #[diagnostic(
        code(atomspace::channel::connect_timeout),
        help("The server did not complete the WebSocket handshake in time.")
    )]
    ConnectTimeout { endpoint: String, timeout_ms: u64 },

    #[error("command timeout after {timeout_ms} ms: {command}")]
    #[diagnostic(
        code(atomspace::channel::timeout),
        help(
            "No reply arrived within the configured window. The connection is still open; \
             retry the command or raise `timeout_ms`."
        )
    )]
    Timeout { command: String, timeout_ms: u64 },

    #[error("connection closed while waiting for a reply")]
    #[diagnostic(
        code(atomspace::channel::closed),
        help("The server closed the connection. Reconnect before sending more commands.")
    )]
    ConnectionClosed,

    #[error("malformed reply frame: {message}")]
    #[diagnostic(
        code(atomspace::channel::malformed_frame),
        help("The server sent a frame that is not valid JSON after trimming.")
    )]
    MalformedFrame { message: String },

    #[error("AtomSpace rejected the command: {command}")]
    #[diagnostic(
        code(atomspace::channel::rejected),
        help("The server did not acknowledge the write with `true`.")
    )]
    Rejected { command: String },

    #[error("failed to encode command argument: {message}")]
    #[diagnostic(code(atomspace::channel::encode))]
    Encode { message: String },
}

pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

// ---------------------------------------------------------------------------
// Fetch errors
// ---------------------------------------------------------------------------

/// Failures of the fetch orchestrator. Every variant maps to an HTTP-like
/// status via [`FetchError::status`]; 0 means "no HTTP status".
#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("{message} (status {status})")]
    #[diagnostic(
        code(atomspace::fetch::http),
        help("The endpoint answered with an error status, or could not be reached at all (status 0).")
    )]
    Http { status: u16, message: String },

    #[error("Timeout Error: {url} did not answer within {timeout_ms} ms")]
    #[diagnostic(
        code(atomspace::fetch::timeout),
        help("Raise `timeout_ms` in the config or check the server load.")
    )]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Syntax Error: {message}")]
    #[diagnostic(
        code(atomspace::fetch::syntax),
        help("The body was not valid JSON.")
    )]
    Syntax { message: String },

    #[error("failed to read {path}")]
    #[diagnostic(
        code(atomspace::fetch::io),
        help("Check that the asset file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Channel(#[from] ChannelError),
}

impl FetchError {
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Http { status, .. } => *status,
            _ => 0,
        }
    }

    /// Build an HTTP error using the conventional message for `status`.
    pub fn from_status(status: u16, reason: Option<&str>) -> Self {
        FetchError::Http {
            status,
            message: status_message(status, reason),
        }
    }
}

/// Human-readable message for a status code.
pub fn status_message(status: u16, reason: Option<&str>) -> String {
    match status {
        0 => "The Server is down or unreachable".into(),
        400 => "400 Bad Request".into(),
        401 => "401 Unauthorized".into(),
        404 => "404 Not Found".into(),
        500 => "500 Internal Server Error".into(),
        _ => reason
            .filter(|r| !r.is_empty())
            .unwrap_or("Unknown Error")
            .to_string(),
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(atomspace::config::no_home),
        help("Set the HOME environment variable or pass --config explicitly.")
    )]
    NoHome,

    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(atomspace::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(atomspace::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
