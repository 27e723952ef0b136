//! AtomSpace JSON-shell commands built on [`CommandChannel::send_command`].
//!
//! Read queries tolerate replies of the wrong shape and fall back to an empty
//! result; writes treat anything but `true` as a rejection.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::atom::{Atom, AtomValuePair, ValueNode};
use crate::error::{ChannelError, ChannelResult};

use super::CommandChannel;

/// Fetch every atom, including subtypes of `Atom`.
pub const GET_ALL_ATOMS: &str = r#"AtomSpace.getAtoms("Atom",true)"#;
const VERSION: &str = "AtomSpace.version()";

/// `AtomSpace.<method>(<atom as compact JSON>)`
fn atom_command(method: &str, atom: &Atom) -> ChannelResult<String> {
    let json = serde_json::to_string(atom).map_err(|e| ChannelError::Encode {
        message: e.to_string(),
    })?;
    Ok(format!("AtomSpace.{method}({json})"))
}

fn is_true(reply: &Value) -> bool {
    matches!(reply, Value::Bool(true)) || reply.as_str() == Some("true")
}

fn into_text(reply: Value) -> String {
    match reply {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Decode an array reply element by element; anything else is empty.
fn list_or_empty<T: DeserializeOwned>(reply: Value, query: &str) -> Vec<T> {
    let Value::Array(items) = reply else {
        tracing::warn!(query, "expected an array reply, treating as empty");
        return Vec::new();
    };
    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if decoded.len() != total {
        tracing::warn!(query, dropped = total - decoded.len(), "skipped reply elements of unexpected shape");
    }
    decoded
}

impl CommandChannel {
    pub async fn get_all_atoms(&self) -> ChannelResult<Vec<Atom>> {
        let reply = self.send_command(GET_ALL_ATOMS).await?;
        Ok(list_or_empty(reply, "getAtoms"))
    }

    /// Insert an atom. The server must acknowledge with `true`.
    pub async fn make_atom(&self, atom: Atom) -> ChannelResult<Atom> {
        let command = atom_command("makeAtom", &atom)?;
        let reply = self.send_command(&command).await?;
        if is_true(&reply) {
            Ok(atom)
        } else {
            tracing::warn!(%reply, "atom insertion rejected");
            Err(ChannelError::Rejected { command })
        }
    }

    pub async fn have_atom(&self, atom: &Atom) -> ChannelResult<bool> {
        let reply = self.send_command(&atom_command("haveAtom", atom)?).await?;
        Ok(is_true(&reply))
    }

    /// Links whose outgoing set contains `atom`.
    pub async fn get_incoming(&self, atom: &Atom) -> ChannelResult<Vec<Atom>> {
        let reply = self.send_command(&atom_command("getIncoming", atom)?).await?;
        Ok(list_or_empty(reply, "getIncoming"))
    }

    pub async fn get_values(&self, atom: &Atom) -> ChannelResult<Vec<AtomValuePair>> {
        let reply = self.send_command(&atom_command("getValues", atom)?).await?;
        Ok(list_or_empty(reply, "getValues"))
    }

    pub async fn get_truth_value(&self, atom: &Atom) -> ChannelResult<Vec<ValueNode>> {
        let reply = self.send_command(&atom_command("getTV", atom)?).await?;
        Ok(list_or_empty(reply, "getTV"))
    }

    /// JSON API version string.
    pub async fn get_version(&self) -> ChannelResult<String> {
        Ok(into_text(self.send_command(VERSION).await?))
    }

    /// Send arbitrary shell text; non-string replies come back as JSON text.
    pub async fn send_raw(&self, raw: &str) -> ChannelResult<String> {
        Ok(into_text(self.send_command(raw).await?))
    }
}
