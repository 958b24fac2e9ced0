// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use itertools::{Either, Itertools};
use petgraph::{
    dot::{Config, Dot},
    graph::{DiGraph, NodeIndex},
};
use purity_model::{SemanticModel, SymbolId};
use std::collections::BTreeMap;

/// The call graph over in-source symbols of a snapshot. An edge from `a` to `b` means the body
/// of `a` may invoke `b`, directly or through a known override.
pub struct CallGraph {
    graph: DiGraph<SymbolId, ()>,
}

impl CallGraph {
    pub fn build(model: &SemanticModel) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: BTreeMap<SymbolId, NodeIndex> = BTreeMap::new();
        for (id, symbol) in model.get_symbols() {
            if !symbol.is_external() {
                nodes.insert(id, graph.add_node(id));
            }
        }
        for (id, src_idx) in &nodes {
            for callee in model.get_called_symbols(*id) {
                if let Some(dst_idx) = nodes.get(&callee) {
                    graph.add_edge(*src_idx, *dst_idx, ());
                }
            }
        }
        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Strongly connected components with callees before callers. Single symbols are `Left`,
    /// groups of mutually recursive symbols are `Right`.
    pub fn sort_in_topological_order(&self) -> Vec<Either<SymbolId, Vec<SymbolId>>> {
        petgraph::algo::kosaraju_scc(&self.graph)
            .iter()
            .map(|scc| {
                scc.iter()
                    .map(|node_idx| self.graph[*node_idx])
                    .sorted()
                    .collect_vec()
            })
            .map(|scc| {
                if scc.len() == 1 {
                    Either::Left(scc[0])
                } else {
                    Either::Right(scc)
                }
            })
            .collect_vec()
    }

    /// The symbols of `targets` in callee-first order.
    pub fn order_targets(&self, targets: &[SymbolId]) -> Vec<SymbolId> {
        self.sort_in_topological_order()
            .into_iter()
            .flat_map(|item| match item {
                Either::Left(id) => vec![id],
                Either::Right(ids) => ids,
            })
            .filter(|id| targets.contains(id))
            .collect()
    }

    /// Renders the graph in dot format, labelling symbols with their display names.
    pub fn to_dot(&self, model: &SemanticModel) -> String {
        let named = self
            .graph
            .map(|_, id| model.get_symbol(*id).display_name(), |_, _| "");
        format!("{}", Dot::with_config(&named, &[Config::EdgeNoLabel]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::model_from_json;
    use serde_json::{json, Value};

    fn method(signature: &str, callees: &[&str]) -> Value {
        let body: Vec<Value> = callees
            .iter()
            .map(|callee| json!({ "node": "call", "span": "1:1-1:2", "target": { "signature": callee } }))
            .collect();
        json!({ "signature": signature, "kind": "method", "span": "1:1-1:2", "body": body })
    }

    fn names(model: &SemanticModel, ids: &[SymbolId]) -> Vec<String> {
        ids.iter()
            .map(|id| model.get_symbol(*id).display_name())
            .collect()
    }

    #[test]
    fn orders_callees_first_and_groups_cycles() {
        let model = model_from_json(json!([
            method("Demo.G.Main()", &["Demo.G.Even()", "System.Math.Abs(int)"]),
            method("Demo.G.Even()", &["Demo.G.Odd()"]),
            method("Demo.G.Odd()", &["Demo.G.Even()", "Demo.G.Leaf()"]),
            method("Demo.G.Leaf()", &["Demo.G.Leaf()"]),
        ]));
        let graph = CallGraph::build(&model);
        assert_eq!(graph.node_count(), 4);

        let all = model.symbol_ids().collect_vec();
        assert_eq!(
            names(&model, &graph.order_targets(&all)),
            vec!["G.Leaf", "G.Even", "G.Odd", "G.Main"]
        );
        let groups = graph
            .sort_in_topological_order()
            .into_iter()
            .filter_map(|item| item.right())
            .map(|scc| names(&model, &scc))
            .collect_vec();
        assert_eq!(groups, vec![vec!["G.Even".to_string(), "G.Odd".to_string()]]);
    }

    #[test]
    fn dot_output_uses_display_names() {
        let model = model_from_json(json!([
            method("Demo.G.Main()", &["Demo.G.Leaf()"]),
            method("Demo.G.Leaf()", &[]),
        ]));
        let dot = CallGraph::build(&model).to_dot(&model);
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("\"G.Main\""));
        assert!(dot.contains("0 -> 1"));
    }
}
