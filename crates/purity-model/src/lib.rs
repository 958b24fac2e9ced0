// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Resolved semantic model consumed by the purity engine, plus the known-member purity
//! database for library members without source.

pub mod ast;
pub mod known_members;
pub mod loc;
pub mod model;

pub use known_members::{KnownMemberDatabase, KnownMemberError, KnownPurity};
pub use loc::{Position, Span};
pub use model::{
    declaring_type_of, display_name_of, Marker, ModelError, SemanticModel, SymbolData, SymbolId,
    SymbolKind,
};
