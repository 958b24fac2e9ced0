// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The semantic model of one compilation snapshot.
//!
//! Symbols live in an arena owned by [`SemanticModel`] and are addressed by [`SymbolId`]. The
//! model is built once from the front end's output and is immutable afterwards; everything the
//! engine derives from it (memo tables, verdicts, diagnostics) is owned by a verification pass.

use crate::{ast::Node, loc::Span};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read snapshot `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("symbol `{0}` is declared more than once")]
    DuplicateSignature(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for SymbolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Method,
    Constructor,
    Getter,
    Setter,
    InitAccessor,
    LocalFunction,
}

impl SymbolKind {
    /// Members that initialize the object they are invoked on. Writes to `this` inside them
    /// mutate an allocation the caller has not published yet.
    pub fn initializes_receiver(self) -> bool {
        matches!(self, SymbolKind::Constructor | SymbolKind::InitAccessor)
    }
}

/// Purity-related attributes the front end found on a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    EnforcePurity,
    AllowSynchronization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolData {
    pub signature: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub markers: BTreeSet<Marker>,
    #[serde(default)]
    pub is_virtual: bool,
    /// Signatures of the statically known overrides of this member.
    #[serde(default)]
    pub overrides: Vec<String>,
    pub span: Span,
    /// `None` for members whose source is not available.
    #[serde(default)]
    pub body: Option<Vec<Node>>,
}

impl SymbolData {
    pub fn new(signature: impl Into<String>, kind: SymbolKind, span: Span) -> Self {
        Self {
            signature: signature.into(),
            kind,
            markers: BTreeSet::new(),
            is_virtual: false,
            overrides: vec![],
            span,
            body: None,
        }
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    pub fn enforces_purity(&self) -> bool {
        self.has_marker(Marker::EnforcePurity)
    }

    pub fn is_external(&self) -> bool {
        self.body.is_none()
    }

    /// `Namespace.Type.Member(int)` yields `Namespace.Type`.
    pub fn declaring_type(&self) -> &str {
        declaring_type_of(&self.signature)
    }

    /// `Namespace.Type.Member(int)` yields `Member`.
    pub fn member_name(&self) -> &str {
        split_member(&self.signature).1
    }

    /// `Namespace.Type.Member(int)` yields `Type.Member`.
    pub fn display_name(&self) -> String {
        display_name_of(&self.signature)
    }
}

fn strip_parameters(signature: &str) -> &str {
    signature.split_once('(').map(|(n, _)| n).unwrap_or(signature)
}

/// Splits a signature into declaring type and member name. Constructors keep their leading dot
/// (`System.Random..ctor()` yields `System.Random` and `.ctor`).
fn split_member(signature: &str) -> (&str, &str) {
    let name = strip_parameters(signature);
    for ctor in ["..ctor", "..cctor"] {
        if let Some(type_name) = name.strip_suffix(ctor) {
            return (type_name, &ctor[1..]);
        }
    }
    name.rsplit_once('.').unwrap_or(("", name))
}

/// The short `Type.Member` form of a member signature, used in diagnostics.
pub fn display_name_of(signature: &str) -> String {
    let (type_name, member) = split_member(signature);
    match type_name.rsplit('.').next() {
        Some(simple_type) if !simple_type.is_empty() => format!("{}.{}", simple_type, member),
        _ => member.to_string(),
    }
}

/// The declaring type of a member signature, or the empty string for unqualified names.
pub fn declaring_type_of(signature: &str) -> &str {
    split_member(signature).0
}

#[derive(Deserialize)]
struct Snapshot {
    file: String,
    #[serde(default)]
    source: Option<String>,
    symbols: Vec<SymbolData>,
}

/// One compilation snapshot as resolved by the front end.
#[derive(Debug, Clone)]
pub struct SemanticModel {
    file_name: String,
    source: Option<String>,
    symbols: Vec<SymbolData>,
    by_signature: BTreeMap<String, SymbolId>,
}

impl SemanticModel {
    pub fn new(
        file_name: impl Into<String>,
        source: Option<String>,
        symbols: Vec<SymbolData>,
    ) -> Result<Self, ModelError> {
        let mut by_signature = BTreeMap::new();
        for (index, symbol) in symbols.iter().enumerate() {
            if by_signature
                .insert(symbol.signature.clone(), SymbolId::new(index))
                .is_some()
            {
                return Err(ModelError::DuplicateSignature(symbol.signature.clone()));
            }
        }
        Ok(Self {
            file_name: file_name.into(),
            source,
            symbols,
            by_signature,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Self::new(snapshot.file, snapshot.source, snapshot.symbols)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json_str(&content)?;
        debug!(
            "loaded snapshot `{}` with {} symbols",
            path.display(),
            model.symbols.len()
        );
        Ok(model)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn get_symbol(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id.index()]
    }

    pub fn symbol_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.symbols.len()).map(SymbolId::new)
    }

    pub fn get_symbols(&self) -> impl Iterator<Item = (SymbolId, &SymbolData)> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| (SymbolId::new(index), symbol))
    }

    pub fn find_symbol(&self, signature: &str) -> Option<SymbolId> {
        self.by_signature.get(signature).copied()
    }

    /// Resolves the statically known overrides of a symbol to in-snapshot symbols. Overrides
    /// without a symbol in the snapshot are returned as `Err(signature)`.
    pub fn get_overrides(&self, id: SymbolId) -> Vec<Result<SymbolId, &str>> {
        self.get_symbol(id)
            .overrides
            .iter()
            .map(|sig| self.find_symbol(sig).ok_or(sig.as_str()))
            .collect()
    }

    /// All in-source symbols directly invoked from the body of `id`, including the known
    /// overrides of virtual callees.
    pub fn get_called_symbols(&self, id: SymbolId) -> BTreeSet<SymbolId> {
        let mut called = BTreeSet::new();
        let Some(body) = &self.get_symbol(id).body else {
            return called;
        };
        for node in body {
            node.visit_pre_order(&mut |n| {
                for member in n.invoked_members() {
                    if let Some(callee) = self.find_symbol(&member.signature) {
                        called.insert(callee);
                        called.extend(self.get_overrides(callee).into_iter().flatten());
                    }
                }
            });
        }
        called.retain(|callee| !self.get_symbol(*callee).is_external());
        called
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "file": "Counter.cs",
        "symbols": [
            {
                "signature": "Demo.Counter.Get()",
                "kind": "method",
                "markers": ["enforce_purity"],
                "span": "2:5-2:40",
                "body": [
                    {
                        "node": "return",
                        "span": "2:20-2:38",
                        "value": {
                            "node": "call",
                            "span": "2:27-2:37",
                            "target": { "signature": "Demo.Counter.Helper(int)" },
                            "args": [{ "node": "literal", "span": "2:34-2:36" }]
                        }
                    }
                ]
            },
            {
                "signature": "Demo.Counter.Helper(int)",
                "kind": "method",
                "span": "3:5-3:40",
                "body": []
            },
            {
                "signature": "System.Object.ToString()",
                "kind": "method",
                "span": "1:1-1:1"
            }
        ]
    }"#;

    #[test]
    fn loads_snapshot_and_resolves_calls() {
        let model = SemanticModel::from_json_str(SNAPSHOT).unwrap();
        assert_eq!(model.file_name(), "Counter.cs");
        assert_eq!(model.symbol_count(), 3);

        let get = model.find_symbol("Demo.Counter.Get()").unwrap();
        let helper = model.find_symbol("Demo.Counter.Helper(int)").unwrap();
        let to_string = model.find_symbol("System.Object.ToString()").unwrap();
        assert!(model.get_symbol(to_string).is_external());
        assert!(model.get_symbol(get).enforces_purity());
        assert_eq!(
            model.get_called_symbols(get).into_iter().collect::<Vec<_>>(),
            vec![helper]
        );
    }

    #[test]
    fn names_are_derived_from_signatures() {
        let symbol = SymbolData::new(
            "Demo.Shapes.Circle.Area(double)",
            SymbolKind::Method,
            Span::default(),
        );
        assert_eq!(symbol.declaring_type(), "Demo.Shapes.Circle");
        assert_eq!(symbol.member_name(), "Area");
        assert_eq!(symbol.display_name(), "Circle.Area");
        assert_eq!(declaring_type_of("Area()"), "");
        assert_eq!(declaring_type_of("System.Random..ctor()"), "System.Random");

        let ctor = SymbolData::new("Demo.Point..ctor(int,int)", SymbolKind::Constructor, Span::default());
        assert_eq!(ctor.member_name(), ".ctor");
        assert_eq!(ctor.display_name(), "Point..ctor");
    }

    #[test]
    fn rejects_duplicate_signatures() {
        let symbol = SymbolData::new("A.B.C()", SymbolKind::Method, Span::default());
        let err = SemanticModel::new("a.cs", None, vec![symbol.clone(), symbol]).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateSignature(sig) if sig == "A.B.C()"));
    }
}
