//! Translation between the nested and flat AtomSpace encodings.
//!
//! The nested encoding embeds children by value; the flat encoding assigns a
//! dense handle to every distinct atom and references children by handle.
//! Going nested → flat deduplicates atoms by [`Atom::structural_key`] and
//! synthesizes default truth/attention values. Going flat → nested resolves
//! handles back into embedded children. Neither direction is lossless: the
//! flat encoding carries values the nested one does not model.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::atom::{Atom, FlatAtom, FlatResponse, Handle};

// ---------------------------------------------------------------------------
// Nested → flat
// ---------------------------------------------------------------------------

/// Convert nested atoms into a flat, handle-indexed response.
///
/// Handles are assigned in first-seen order, and structurally identical atoms
/// share one handle. Every input atom is emitted, duplicates included.
/// Children whose structural key does not match any top-level atom are
/// dropped from `outgoing`.
pub fn convert_new_to_old(atoms: &[Atom]) -> FlatResponse {
    let keys: Vec<String> = atoms.iter().map(Atom::structural_key).collect();

    let mut handles: HashMap<&str, Handle> = HashMap::with_capacity(keys.len());
    for key in &keys {
        let next = handles.len() as Handle;
        handles.entry(key.as_str()).or_insert(next);
    }

    let mut flat: Vec<FlatAtom> = atoms
        .iter()
        .zip(&keys)
        .map(|(atom, key)| {
            let mut converted = FlatAtom::new(
                handles[key.as_str()],
                atom.atom_type.clone(),
                atom.name.clone().unwrap_or_default(),
            );
            converted.outgoing = atom
                .children()
                .iter()
                .filter_map(|child| handles.get(child.structural_key().as_str()).copied())
                .collect();
            converted
        })
        .collect();

    derive_incoming(&mut flat);
    FlatResponse::new(flat)
}

/// Fill every atom's `incoming` list as the inverse of `outgoing`.
///
/// Handles and list positions are separate index spaces: when the input held
/// structural duplicates the same handle is emitted more than once. Edges are
/// derived from the first emission of each handle (the canonical one) and then
/// copied onto the repeated emissions. A link that lists the same child twice
/// appears twice in that child's `incoming`.
fn derive_incoming(flat: &mut [FlatAtom]) {
    let mut canonical: HashMap<Handle, usize> = HashMap::with_capacity(flat.len());
    for (pos, atom) in flat.iter().enumerate() {
        canonical.entry(atom.handle).or_insert(pos);
    }

    let mut edges: Vec<(usize, Handle)> = Vec::new();
    for (pos, atom) in flat.iter().enumerate() {
        if canonical.get(&atom.handle) != Some(&pos) {
            continue;
        }
        for target in &atom.outgoing {
            if let Some(&target_pos) = canonical.get(target) {
                edges.push((target_pos, atom.handle));
            }
        }
    }

    for (target_pos, source) in edges {
        flat[target_pos].incoming.push(source);
    }

    for pos in 0..flat.len() {
        let canonical_pos = canonical[&flat[pos].handle];
        if canonical_pos != pos {
            flat[pos].incoming = flat[canonical_pos].incoming.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Flat → nested
// ---------------------------------------------------------------------------

/// Convert a flat response into nested atoms.
///
/// One atom is produced per distinct handle, in the order handles first appear.
/// When a handle is repeated, its position comes from the first occurrence and
/// its content from the last. Outgoing handles are resolved recursively into embedded children; handles
/// that do not resolve, or that would close a reference cycle, are dropped.
pub fn convert_old_to_new(response: &FlatResponse) -> Vec<Atom> {
    let mut order: Vec<Handle> = Vec::new();
    let mut by_handle: HashMap<Handle, &FlatAtom> = HashMap::new();
    for atom in response.atoms() {
        if by_handle.insert(atom.handle, atom).is_none() {
            order.push(atom.handle);
        }
    }

    let mut resolver = Resolver {
        by_handle,
        memo: HashMap::new(),
        visiting: HashSet::new(),
    };
    order
        .into_iter()
        .filter_map(|handle| resolver.resolve(handle))
        .collect()
}

struct Resolver<'a> {
    by_handle: HashMap<Handle, &'a FlatAtom>,
    memo: HashMap<Handle, Atom>,
    visiting: HashSet<Handle>,
}

impl Resolver<'_> {
    fn resolve(&mut self, handle: Handle) -> Option<Atom> {
        if let Some(done) = self.memo.get(&handle) {
            return Some(done.clone());
        }
        let flat = *self.by_handle.get(&handle)?;
        if !self.visiting.insert(handle) {
            tracing::debug!(handle, "dropping cyclic outgoing reference");
            return None;
        }

        let outgoing = if flat.outgoing.is_empty() {
            None
        } else {
            Some(
                flat.outgoing
                    .iter()
                    .filter_map(|&child| self.resolve(child))
                    .collect(),
            )
        };
        self.visiting.remove(&handle);

        let atom = Atom {
            atom_type: flat.atom_type.clone(),
            name: (!flat.name.is_empty()).then(|| flat.name.clone()),
            outgoing,
        };
        self.memo.insert(handle, atom.clone());
        Some(atom)
    }
}

// ---------------------------------------------------------------------------
// Format detection
// ---------------------------------------------------------------------------

/// Which encoding an untyped payload turned out to use.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectedFormat {
    /// `{ "result": { "atoms": [ { "handle": .. }, .. ] } }`
    Flat(FlatResponse),
    /// A bare array of nested atoms.
    NestedArray(Vec<Atom>),
    /// `{ "atoms": [ .. ] }` holding nested atoms.
    NestedWrapped(Vec<Atom>),
    /// None of the above.
    Unrecognized,
}

impl DetectedFormat {
    pub fn label(&self) -> &'static str {
        match self {
            DetectedFormat::Flat(_) => "flat",
            DetectedFormat::NestedArray(_) => "nested-array",
            DetectedFormat::NestedWrapped(_) => "nested-wrapped",
            DetectedFormat::Unrecognized => "unrecognized",
        }
    }

    /// Collapse into the flat encoding, converting nested atoms as needed.
    pub fn into_flat(self) -> FlatResponse {
        match self {
            DetectedFormat::Flat(flat) => flat,
            DetectedFormat::NestedArray(atoms) | DetectedFormat::NestedWrapped(atoms) => {
                convert_new_to_old(&atoms)
            }
            DetectedFormat::Unrecognized => FlatResponse::empty(),
        }
    }
}

/// Classify a payload. A flat envelope is recognized by its first element
/// carrying a `handle` and is then always treated as flat. Otherwise the first
/// structurally valid decode wins: bare nested array, then `{ "atoms": [...] }`.
pub fn detect_format(payload: &Value) -> DetectedFormat {
    if looks_flat(payload) {
        return DetectedFormat::Flat(decode_flat(payload));
    }

    if payload.is_array() {
        match Vec::<Atom>::deserialize(payload) {
            Ok(atoms) => return DetectedFormat::NestedArray(atoms),
            Err(e) => tracing::debug!(error = %e, "array payload is not a nested atom list"),
        }
    }

    if let Some(inner) = payload.get("atoms").filter(|v| v.is_array()) {
        match Vec::<Atom>::deserialize(inner) {
            Ok(atoms) => return DetectedFormat::NestedWrapped(atoms),
            Err(e) => tracing::debug!(error = %e, "`atoms` field is not a nested atom list"),
        }
    }

    DetectedFormat::Unrecognized
}

/// `result.atoms` is non-empty and its first element carries a handle.
fn looks_flat(payload: &Value) -> bool {
    payload
        .pointer("/result/atoms/0")
        .and_then(Value::as_object)
        .is_some_and(|first| first.contains_key("handle"))
}

/// Decode a flat envelope atom by atom. An element that lacks a usable
/// `handle` or `type` is skipped; the rest of the response is kept.
fn decode_flat(payload: &Value) -> FlatResponse {
    let elements = payload
        .pointer("/result/atoms")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let atoms: Vec<FlatAtom> = elements
        .iter()
        .filter_map(FlatAtom::from_value_lenient)
        .collect();
    if atoms.len() < elements.len() {
        tracing::warn!(
            skipped = elements.len() - atoms.len(),
            kept = atoms.len(),
            "flat payload contained atoms that did not decode"
        );
    }
    FlatResponse::new(atoms)
}

/// Normalize any supported payload to the flat encoding.
///
/// Unrecognized shapes yield an empty response rather than an error.
pub fn normalize_to_old_format(payload: &Value) -> FlatResponse {
    let detected = detect_format(payload);
    if detected == DetectedFormat::Unrecognized {
        tracing::warn!("unknown atom data format, using an empty response");
    }
    detected.into_flat()
}

// ---------------------------------------------------------------------------
// Conversion summary
// ---------------------------------------------------------------------------

/// A flat response together with the counts callers display.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub response: FlatResponse,
    /// Number of emitted flat atoms.
    pub atom_count: usize,
    /// Number of distinct handles among them.
    pub distinct_handles: usize,
}

impl Conversion {
    pub fn from_flat(response: FlatResponse) -> Self {
        let atom_count = response.len();
        let distinct_handles = response
            .atoms()
            .iter()
            .map(|a| a.handle)
            .collect::<HashSet<_>>()
            .len();
        Self {
            response,
            atom_count,
            distinct_handles,
        }
    }

    pub fn from_atoms(atoms: &[Atom]) -> Self {
        Self::from_flat(convert_new_to_old(atoms))
    }

    pub fn from_payload(payload: &Value) -> Self {
        Self::from_flat(normalize_to_old_format(payload))
    }
}

// ---------------------------------------------------------------------------
// Sample data
// ---------------------------------------------------------------------------

/// Three concepts and two inheritance links: Socrates → man → mortal.
pub fn sample_data() -> Vec<Atom> {
    let socrates = Atom::node("ConceptNode", "Socrates");
    let man = Atom::node("ConceptNode", "man");
    let mortal = Atom::node("ConceptNode", "mortal");
    vec![
        socrates.clone(),
        man.clone(),
        mortal.clone(),
        Atom::link("InheritanceLink", vec![socrates, man.clone()]),
        Atom::link("InheritanceLink", vec![man, mortal]),
    ]
}
