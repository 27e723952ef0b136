//! Atom types shared by both AtomSpace wire encodings.
//!
//! An [`Atom`] is the nested (modern) form: links embed their children by
//! value. A [`FlatAtom`] is the legacy form: every element of a response is
//! addressed by a dense integer handle and links refer to their children by
//! handle. [`FlatResponse`] is the envelope legacy consumers expect.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Dense identifier of an atom within one flat response.
pub type Handle = u64;

// ---------------------------------------------------------------------------
// Nested form
// ---------------------------------------------------------------------------

/// A typed hypergraph element in the nested encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    #[serde(rename = "type")]
    pub atom_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<Vec<Atom>>,
}

/// How an atom is classified for identity purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomKind {
    /// Carries a non-empty name.
    Node,
    /// Carries an outgoing sequence (possibly empty) and no name.
    Link,
    /// Neither a name nor an outgoing sequence.
    Anonymous,
}

impl Atom {
    /// A named node, e.g. `ConceptNode "Socrates"`.
    pub fn node(atom_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            atom_type: atom_type.into(),
            name: Some(name.into()),
            outgoing: None,
        }
    }

    /// A link over an ordered sequence of children.
    pub fn link(atom_type: impl Into<String>, outgoing: Vec<Atom>) -> Self {
        Self {
            atom_type: atom_type.into(),
            name: None,
            outgoing: Some(outgoing),
        }
    }

    /// An atom with only a type.
    pub fn anonymous(atom_type: impl Into<String>) -> Self {
        Self {
            atom_type: atom_type.into(),
            name: None,
            outgoing: None,
        }
    }

    /// The name, if present and non-empty.
    pub fn named(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    pub fn kind(&self) -> AtomKind {
        if self.named().is_some() {
            AtomKind::Node
        } else if self.outgoing.is_some() {
            AtomKind::Link
        } else {
            AtomKind::Anonymous
        }
    }

    /// Children of a link; empty for nodes and anonymous atoms.
    pub fn children(&self) -> &[Atom] {
        self.outgoing.as_deref().unwrap_or(&[])
    }

    /// Derived identity string used to deduplicate atoms during conversion.
    ///
    /// `"<type>:<name>"` for named atoms, `"<type>:[<child keys>]"` for links
    /// (children in outgoing order), `"<type>:anonymous"` otherwise.
    pub fn structural_key(&self) -> String {
        let mut key = String::new();
        self.write_key(&mut key);
        key
    }

    fn write_key(&self, out: &mut String) {
        out.push_str(&self.atom_type);
        out.push(':');
        match self.kind() {
            AtomKind::Node => out.push_str(self.name.as_deref().unwrap_or_default()),
            AtomKind::Link => {
                out.push('[');
                for (i, child) in self.children().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    child.write_key(out);
                }
                out.push(']');
            }
            AtomKind::Anonymous => out.push_str("anonymous"),
        }
    }

    /// Whether two atoms denote the same graph element.
    pub fn same_element(&self, other: &Atom) -> bool {
        self.structural_key() == other.structural_key()
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.structural_key())
    }
}

// ---------------------------------------------------------------------------
// Legacy flat form
// ---------------------------------------------------------------------------

/// Truth value attached to legacy atoms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthValue {
    #[serde(rename = "type", default = "default_tv_type")]
    pub tv_type: String,
    #[serde(default)]
    pub details: TruthDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthDetails {
    #[serde(default = "one", deserialize_with = "number_or_one")]
    pub count: f64,
    #[serde(default = "one", deserialize_with = "number_or_one")]
    pub confidence: f64,
    #[serde(default = "one", deserialize_with = "number_or_one")]
    pub strength: f64,
}

fn default_tv_type() -> String {
    "simple".into()
}

fn one() -> f64 {
    1.0
}

impl Default for TruthDetails {
    fn default() -> Self {
        Self {
            count: 1.0,
            confidence: 1.0,
            strength: 1.0,
        }
    }
}

impl Default for TruthValue {
    fn default() -> Self {
        Self {
            tv_type: default_tv_type(),
            details: TruthDetails::default(),
        }
    }
}

/// Attention value attached to legacy atoms.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AttentionValue {
    #[serde(default, deserialize_with = "or_default")]
    pub sti: f64,
    #[serde(default, deserialize_with = "or_default")]
    pub lti: f64,
    #[serde(default, deserialize_with = "or_default")]
    pub vlti: bool,
}

/// A handle-addressed atom in the legacy encoding.
///
/// Only `handle` and `type` are required. Truth and attention values that are
/// absent or ill-typed on the wire are filled with defaults, and fields this
/// crate does not model are kept in `extra` and written back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatAtom {
    pub handle: Handle,
    #[serde(default, deserialize_with = "or_default")]
    pub name: String,
    #[serde(rename = "type")]
    pub atom_type: String,
    #[serde(default, deserialize_with = "or_default")]
    pub outgoing: Vec<Handle>,
    #[serde(default, deserialize_with = "or_default")]
    pub incoming: Vec<Handle>,
    #[serde(default, deserialize_with = "or_default")]
    pub truthvalue: TruthValue,
    #[serde(default, deserialize_with = "or_default")]
    pub attentionvalue: AttentionValue,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decode `T`, or fall back to its default when the wire value is `null` or
/// of the wrong shape.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn number_or_one<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64().unwrap_or(1.0))
}

impl FlatAtom {
    /// A flat atom with no edges and default truth/attention values.
    pub fn new(handle: Handle, atom_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            atom_type: atom_type.into(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            truthvalue: TruthValue::default(),
            attentionvalue: AttentionValue::default(),
            extra: Map::new(),
        }
    }

    /// Decode one element of a flat `atoms` array, tolerating bad optional
    /// fields. `None` when `handle` or `type` is missing or unusable.
    pub fn from_value_lenient(value: &Value) -> Option<Self> {
        match FlatAtom::deserialize(value) {
            Ok(atom) => Some(atom),
            Err(e) => {
                tracing::warn!(error = %e, "skipping flat atom that did not decode");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlatResult {
    #[serde(default)]
    pub atoms: Vec<FlatAtom>,
}

/// `{ "result": { "atoms": [...] } }`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlatResponse {
    pub result: FlatResult,
}

impl FlatResponse {
    pub fn new(atoms: Vec<FlatAtom>) -> Self {
        Self {
            result: FlatResult { atoms },
        }
    }

    /// The shape returned when a payload cannot be interpreted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn atoms(&self) -> &[FlatAtom] {
        &self.result.atoms
    }

    pub fn len(&self) -> usize {
        self.result.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.atoms.is_empty()
    }

    /// Position of the first atom carrying `handle`.
    pub fn position_of(&self, handle: Handle) -> Option<usize> {
        self.result.atoms.iter().position(|a| a.handle == handle)
    }

    /// First atom carrying `handle`.
    pub fn get(&self, handle: Handle) -> Option<&FlatAtom> {
        self.result.atoms.iter().find(|a| a.handle == handle)
    }
}

// ---------------------------------------------------------------------------
// Value query replies
// ---------------------------------------------------------------------------

/// A value as reported by `getValues` / `getTV`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueNode {
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// One key/value entry attached to an atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomValuePair {
    pub key: Atom,
    pub value: ValueNode,
}
