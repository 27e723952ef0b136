//! # atomspace-bridge
//!
//! Client-side access to a remote OpenCog AtomSpace.
//!
//! ## Architecture
//!
//! - **Atoms** (`atom`): nested and flat (handle-indexed) atom types
//! - **Format adapter** (`adapter`): nested ↔ flat conversion and format detection
//! - **Command channel** (`channel`): one-command-at-a-time request/response over WebSocket
//! - **Fetcher** (`fetch`): loads atoms from assets, legacy REST or live endpoints as flat data
//! - **Config** (`config`): timeouts and endpoints, from TOML
//!
//! ## Library usage
//!
//! ```
//! use atomspace_bridge::adapter::{convert_new_to_old, sample_data};
//!
//! let flat = convert_new_to_old(&sample_data());
//! assert_eq!(flat.len(), 5);
//! assert_eq!(flat.atoms()[3].outgoing, vec![0, 1]);
//! ```

pub mod adapter;
pub mod atom;
pub mod channel;
pub mod config;
pub mod error;
pub mod fetch;
