// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Memoized verification of symbols across the call graph.
//!
//! Symbols are verified on demand in a depth-first traversal which tracks strongly connected
//! components as in Tarjan's algorithm. Each symbol moves from unvisited to in-progress to final
//! exactly once. While in progress it carries a provisional analysis, optimistically pure at
//! first, which callers inside the same component read. When the root of a cyclic component
//! completes, the members are re-classified until no verdict changes and then finalized
//! together. Verdicts only rise (pure, unknown, impure), so this terminates.

use crate::{
    cancellation::{CancellationToken, Cancelled},
    effect_analysis::{CalleeResolver, EffectClassifier, PurityFact, SymbolAnalysis, Verdict},
};
use log::debug;
use purity_model::{SemanticModel, SymbolId};
use std::collections::BTreeMap;

#[derive(Debug)]
struct Frame {
    index: usize,
    lowlink: usize,
    provisional: SymbolAnalysis,
    self_recursive: bool,
}

#[derive(Debug)]
enum MemoEntry {
    InProgress(Frame),
    Final(SymbolAnalysis),
}

pub struct PurityResolver<'a> {
    model: &'a SemanticModel,
    classifier: EffectClassifier<'a>,
    cancel: &'a CancellationToken,
    memo: BTreeMap<SymbolId, MemoEntry>,
    stack: Vec<SymbolId>,
    next_index: usize,
    recursive_components: Vec<Vec<SymbolId>>,
}

impl<'a> PurityResolver<'a> {
    pub fn new(classifier: EffectClassifier<'a>, cancel: &'a CancellationToken) -> Self {
        Self {
            model: classifier.model(),
            classifier,
            cancel,
            memo: BTreeMap::new(),
            stack: vec![],
            next_index: 0,
            recursive_components: vec![],
        }
    }

    /// Verifies `symbol` and everything it transitively calls.
    pub fn verify(&mut self, symbol: SymbolId) -> Result<PurityFact, Cancelled> {
        self.visit(symbol)?;
        match self.memo.get(&symbol) {
            Some(MemoEntry::Final(analysis)) => Ok(analysis.fact.clone()),
            // A traversal started here finalizes its root's component before returning.
            Some(MemoEntry::InProgress(frame)) => Ok(frame.provisional.fact.clone()),
            None => Ok(PurityFact::Pure),
        }
    }

    /// The final analysis of a symbol verified so far.
    pub fn analysis(&self, symbol: SymbolId) -> Option<&SymbolAnalysis> {
        match self.memo.get(&symbol)? {
            MemoEntry::Final(analysis) => Some(analysis),
            MemoEntry::InProgress(_) => None,
        }
    }

    /// Cyclic components found so far, each in traversal order.
    pub fn recursive_components(&self) -> &[Vec<SymbolId>] {
        &self.recursive_components
    }

    /// Consumes the resolver, returning all final analyses.
    pub fn into_results(self) -> BTreeMap<SymbolId, SymbolAnalysis> {
        self.memo
            .into_iter()
            .filter_map(|(id, entry)| match entry {
                MemoEntry::Final(analysis) => Some((id, analysis)),
                MemoEntry::InProgress(_) => None,
            })
            .collect()
    }

    fn frame_mut(&mut self, symbol: SymbolId) -> Option<&mut Frame> {
        match self.memo.get_mut(&symbol) {
            Some(MemoEntry::InProgress(frame)) => Some(frame),
            _ => None,
        }
    }

    fn visit(&mut self, symbol: SymbolId) -> Result<(), Cancelled> {
        if self.memo.contains_key(&symbol) {
            return Ok(());
        }
        let data = self.model.get_symbol(symbol);
        if data.is_external() {
            let analysis = self.classifier.classify_external(data);
            self.memo.insert(symbol, MemoEntry::Final(analysis));
            return Ok(());
        }

        self.cancel.check()?;
        let index = self.next_index;
        self.next_index += 1;
        self.memo.insert(
            symbol,
            MemoEntry::InProgress(Frame {
                index,
                lowlink: index,
                provisional: SymbolAnalysis::pure(),
                self_recursive: false,
            }),
        );
        self.stack.push(symbol);

        let classifier = self.classifier;
        let analysis = classifier.classify(symbol, self)?;
        let Some(frame) = self.frame_mut(symbol) else {
            return Ok(());
        };
        frame.provisional = analysis;
        if frame.lowlink != frame.index {
            return Ok(());
        }

        let cyclic = frame.self_recursive;
        let mut component = vec![];
        while let Some(member) = self.stack.pop() {
            component.push(member);
            if member == symbol {
                break;
            }
        }
        component.reverse();
        if cyclic || component.len() > 1 {
            self.settle(&component)?;
            self.recursive_components.push(component.clone());
        }
        for member in component {
            if let Some(MemoEntry::InProgress(frame)) = self.memo.remove(&member) {
                self.memo.insert(member, MemoEntry::Final(frame.provisional));
            }
        }
        Ok(())
    }

    /// Re-classifies the members of a cyclic component against each other's provisional
    /// results until no verdict changes.
    fn settle(&mut self, component: &[SymbolId]) -> Result<(), Cancelled> {
        let classifier = self.classifier;
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for member in component {
                self.cancel.check()?;
                let analysis = classifier.classify(*member, self)?;
                if let Some(frame) = self.frame_mut(*member) {
                    changed |= frame.provisional.verdict() != analysis.verdict();
                    frame.provisional = analysis;
                }
            }
            if !changed {
                break;
            }
        }
        debug!(
            "settled recursive component of {} symbols after {} rounds",
            component.len(),
            rounds
        );
        Ok(())
    }
}

impl CalleeResolver for PurityResolver<'_> {
    fn resolve(&mut self, caller: SymbolId, callee: SymbolId) -> Result<Verdict, Cancelled> {
        if !self.memo.contains_key(&callee) {
            self.visit(callee)?;
            let callee_lowlink = self.frame_mut(callee).map(|frame| frame.lowlink);
            if let (Some(lowlink), Some(frame)) = (callee_lowlink, self.frame_mut(caller)) {
                frame.lowlink = frame.lowlink.min(lowlink);
            }
        } else {
            let callee_index = self.frame_mut(callee).map(|frame| frame.index);
            if let (Some(index), Some(frame)) = (callee_index, self.frame_mut(caller)) {
                frame.lowlink = frame.lowlink.min(index);
                if caller == callee {
                    frame.self_recursive = true;
                }
            }
        }
        Ok(match self.memo.get(&callee) {
            Some(MemoEntry::Final(analysis)) => analysis.verdict(),
            Some(MemoEntry::InProgress(frame)) => frame.provisional.verdict(),
            None => Verdict::Pure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{allow_list::AllowList, options::AnalysisOptions, test_utils::model_from_json};
    use purity_model::KnownMemberDatabase;
    use serde_json::{json, Value};

    fn call(span: &str, signature: &str) -> Value {
        json!({ "node": "call", "span": span, "target": { "signature": signature } })
    }

    fn method(signature: &str, span: &str, body: Value) -> Value {
        json!({ "signature": signature, "kind": "method", "span": span, "body": body })
    }

    fn verify_all(model: &SemanticModel, signatures: &[&str]) -> Vec<Verdict> {
        let db = KnownMemberDatabase::builtin().unwrap();
        let allow_list = AllowList::from_model(model);
        let options = AnalysisOptions::default();
        let cancel = CancellationToken::new();
        let classifier = EffectClassifier::new(model, db, &allow_list, &options);
        let mut resolver = PurityResolver::new(classifier, &cancel);
        signatures
            .iter()
            .map(|sig| {
                let id = model.find_symbol(sig).unwrap();
                resolver.verify(id).unwrap().verdict()
            })
            .collect()
    }

    #[test]
    fn direct_recursion_without_effects_is_pure() {
        let model = model_from_json(json!([method(
            "Demo.Math.Fact(int)",
            "1:1-1:40",
            json!([call("1:20-1:30", "Demo.Math.Fact(int)")])
        )]));
        assert_eq!(verify_all(&model, &["Demo.Math.Fact(int)"]), vec![Verdict::Pure]);
    }

    #[test]
    fn mutual_recursion_without_effects_is_pure() {
        let model = model_from_json(json!([
            method("Demo.Parity.IsEven(int)", "1:1-1:40", json!([call("1:20-1:30", "Demo.Parity.IsOdd(int)")])),
            method("Demo.Parity.IsOdd(int)", "2:1-2:40", json!([call("2:20-2:30", "Demo.Parity.IsEven(int)")])),
        ]));
        assert_eq!(
            verify_all(&model, &["Demo.Parity.IsEven(int)", "Demo.Parity.IsOdd(int)"]),
            vec![Verdict::Pure, Verdict::Pure]
        );
    }

    #[test]
    fn impurity_propagates_around_cycles() {
        // A calls B, B calls A and writes to a parameter's field.
        let model = model_from_json(json!([
            method("Demo.Walk.A(Demo.Node)", "1:1-1:40", json!([call("1:20-1:30", "Demo.Walk.B(Demo.Node)")])),
            method("Demo.Walk.B(Demo.Node)", "2:1-4:2", json!([
                call("2:20-2:30", "Demo.Walk.A(Demo.Node)"),
                { "node": "assign", "span": "3:5-3:20",
                  "target": { "place": "field",
                              "receiver": { "node": "parameter", "span": "3:5-3:9", "name": "node" },
                              "field": { "signature": "Demo.Node.visited" } },
                  "value": { "node": "literal", "span": "3:17-3:19" } }
            ])),
            method("Demo.Walk.Start(Demo.Node)", "5:1-5:40", json!([call("5:20-5:30", "Demo.Walk.A(Demo.Node)")])),
        ]));
        assert_eq!(
            verify_all(
                &model,
                &["Demo.Walk.Start(Demo.Node)", "Demo.Walk.A(Demo.Node)", "Demo.Walk.B(Demo.Node)"]
            ),
            vec![Verdict::Impure, Verdict::Impure, Verdict::Impure]
        );
    }

    #[test]
    fn unknown_callee_in_cycle_makes_whole_cycle_unknown() {
        let model = model_from_json(json!([
            method("Demo.Loop.Ping()", "1:1-1:40", json!([
                call("1:10-1:20", "Demo.Loop.Pong()"),
                call("1:22-1:35", "System.Object.ToString()")
            ])),
            method("Demo.Loop.Pong()", "2:1-2:40", json!([call("2:20-2:30", "Demo.Loop.Ping()")])),
        ]));
        assert_eq!(
            verify_all(&model, &["Demo.Loop.Pong()", "Demo.Loop.Ping()"]),
            vec![Verdict::Unknown, Verdict::Unknown]
        );
    }

    #[test]
    fn cyclic_components_are_recorded_once() {
        let model = model_from_json(json!([
            method("Demo.G.A()", "1:1-1:40", json!([call("1:20-1:30", "Demo.G.B()")])),
            method("Demo.G.B()", "2:1-2:40", json!([call("2:20-2:30", "Demo.G.A()"), call("2:32-2:38", "Demo.G.C()")])),
            method("Demo.G.C()", "3:1-3:40", json!([])),
        ]));
        let db = KnownMemberDatabase::builtin().unwrap();
        let allow_list = AllowList::from_model(&model);
        let options = AnalysisOptions::default();
        let cancel = CancellationToken::new();
        let classifier = EffectClassifier::new(&model, db, &allow_list, &options);
        let mut resolver = PurityResolver::new(classifier, &cancel);
        for id in model.symbol_ids() {
            resolver.verify(id).unwrap();
        }
        let a = model.find_symbol("Demo.G.A()").unwrap();
        let b = model.find_symbol("Demo.G.B()").unwrap();
        assert_eq!(resolver.recursive_components(), &[vec![a, b]]);
        assert_eq!(resolver.into_results().len(), 3);
    }

    #[test]
    fn cancelled_resolver_stops_before_classifying() {
        let model = model_from_json(json!([method("Demo.A.Run()", "1:1-1:10", json!([]))]));
        let db = KnownMemberDatabase::builtin().unwrap();
        let allow_list = AllowList::from_model(&model);
        let options = AnalysisOptions::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let classifier = EffectClassifier::new(&model, db, &allow_list, &options);
        let mut resolver = PurityResolver::new(classifier, &cancel);
        let id = model.find_symbol("Demo.A.Run()").unwrap();
        assert_eq!(resolver.verify(id), Err(Cancelled));
        assert!(resolver.analysis(id).is_none());
    }
}
