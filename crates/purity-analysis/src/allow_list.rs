// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Per-symbol allowances for constructs whose only effect is on scheduling.
//!
//! An allowance covers the construct itself (entering and leaving a lock, waiting on a
//! semaphore), never the code it guards: the classifier still walks the guarded content and
//! reports whatever it finds there.

use purity_model::{declaring_type_of, Marker, SemanticModel, SymbolId};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstructKind {
    Synchronization,
}

impl ConstructKind {
    fn marker(self) -> Marker {
        match self {
            ConstructKind::Synchronization => Marker::AllowSynchronization,
        }
    }
}

// Types whose members only acquire, release or wait on mutual exclusion.
const SYNCHRONIZATION_TYPES: &[&str] = &[
    "System.Threading.Monitor",
    "System.Threading.Lock",
    "System.Threading.Lock.Scope",
    "System.Threading.SpinLock",
    "System.Threading.SemaphoreSlim",
    "System.Threading.Semaphore",
    "System.Threading.Mutex",
    "System.Threading.ReaderWriterLock",
    "System.Threading.ReaderWriterLockSlim",
];

/// Whether `signature` is a member of a synchronization primitive.
pub fn is_synchronization_member(signature: &str) -> bool {
    SYNCHRONIZATION_TYPES.contains(&declaring_type_of(signature))
}

#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: BTreeSet<(SymbolId, ConstructKind)>,
}

impl AllowList {
    /// Collects the allowances declared through markers in `model`.
    pub fn from_model(model: &SemanticModel) -> Self {
        let mut entries = BTreeSet::new();
        for (id, symbol) in model.get_symbols() {
            for kind in [ConstructKind::Synchronization] {
                if symbol.has_marker(kind.marker()) {
                    entries.insert((id, kind));
                }
            }
        }
        Self { entries }
    }

    pub fn is_allowed(&self, symbol: SymbolId, kind: ConstructKind) -> bool {
        self.entries.contains(&(symbol, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::model_from_json;
    use serde_json::json;

    #[test]
    fn allowances_follow_markers() {
        let model = model_from_json(json!([
            {
                "signature": "Demo.Cache.Get()",
                "kind": "method",
                "markers": ["enforce_purity", "allow_synchronization"],
                "span": "1:1-1:10",
                "body": []
            },
            {
                "signature": "Demo.Cache.Peek()",
                "kind": "method",
                "markers": ["enforce_purity"],
                "span": "2:1-2:10",
                "body": []
            }
        ]));
        let allow = AllowList::from_model(&model);
        let get = model.find_symbol("Demo.Cache.Get()").unwrap();
        let peek = model.find_symbol("Demo.Cache.Peek()").unwrap();
        assert!(allow.is_allowed(get, ConstructKind::Synchronization));
        assert!(!allow.is_allowed(peek, ConstructKind::Synchronization));
    }

    #[test]
    fn recognizes_synchronization_members() {
        assert!(is_synchronization_member("System.Threading.Monitor.Enter(object)"));
        assert!(is_synchronization_member(
            "System.Threading.ReaderWriterLockSlim.EnterReadLock()"
        ));
        assert!(!is_synchronization_member("System.Threading.Interlocked.Increment(ref int)"));
        assert!(!is_synchronization_member("System.Console.WriteLine(string)"));
    }
}
