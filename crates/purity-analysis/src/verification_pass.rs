// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! One verification pass over one compilation snapshot.
//!
//! The pass owns every piece of derived state (memo table, verdicts, diagnostics). Nothing is
//! cached across passes, and a cancelled pass drops its state without producing a report.

use crate::{
    allow_list::AllowList,
    call_graph::CallGraph,
    cancellation::{CancellationToken, Cancelled},
    diagnostic_reporter::{DiagnosticReporter, PurityDiagnostic},
    effect_analysis::{EffectClassifier, SymbolAnalysis, Verdict},
    options::AnalysisOptions,
    purity_resolver::PurityResolver,
    target_filter::TargetFilterOptions,
};
use log::{debug, info};
use purity_model::{KnownMemberDatabase, SemanticModel, SymbolId};
use std::{
    collections::BTreeMap,
    fmt::{self, Formatter},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PassError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("invalid target filter: {0}")]
    Filter(String),
}

pub struct VerificationPass<'a> {
    model: &'a SemanticModel,
    database: &'a KnownMemberDatabase,
    options: &'a AnalysisOptions,
    filter: TargetFilterOptions,
    cancel: CancellationToken,
}

impl<'a> VerificationPass<'a> {
    pub fn new(
        model: &'a SemanticModel,
        database: &'a KnownMemberDatabase,
        options: &'a AnalysisOptions,
    ) -> Self {
        Self {
            model,
            database,
            options,
            filter: TargetFilterOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_filter(mut self, filter: TargetFilterOptions) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Symbols with source that carry a purity marker and pass the target filter.
    pub fn targets(&self) -> Vec<SymbolId> {
        self.model
            .get_symbols()
            .filter(|(_, symbol)| {
                !symbol.markers.is_empty()
                    && !symbol.is_external()
                    && self.filter.is_targeted(symbol)
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub fn run(&self) -> Result<PassReport, PassError> {
        if let Some(err) = self.filter.check_filter_correctness(self.model) {
            return Err(PassError::Filter(err));
        }

        let call_graph = CallGraph::build(self.model);
        let targets = call_graph.order_targets(&self.targets());
        debug!(
            "{}: verifying {} targets over a call graph of {} symbols",
            self.model.file_name(),
            targets.len(),
            call_graph.node_count()
        );

        let allow_list = AllowList::from_model(self.model);
        let classifier = EffectClassifier::new(self.model, self.database, &allow_list, self.options);
        let mut resolver = PurityResolver::new(classifier, &self.cancel);
        for target in &targets {
            resolver.verify(*target)?;
        }
        let recursive_components = resolver.recursive_components().to_vec();
        let results = resolver.into_results();

        let diagnostics = DiagnosticReporter::new(self.model, self.options).report(&targets, &results);
        info!(
            "{}: verified {} targets ({} symbols analysed)",
            self.model.file_name(),
            targets.len(),
            results.len()
        );
        Ok(PassReport {
            targets,
            results,
            recursive_components,
            diagnostics,
        })
    }
}

/// The outcome of a completed pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Verified targets in callee-first order.
    pub targets: Vec<SymbolId>,
    /// Final analyses of every symbol reached from the targets.
    pub results: BTreeMap<SymbolId, SymbolAnalysis>,
    pub recursive_components: Vec<Vec<SymbolId>>,
    pub diagnostics: Vec<PurityDiagnostic>,
}

impl PassReport {
    pub fn verdict(&self, symbol: SymbolId) -> Option<Verdict> {
        self.results.get(&symbol).map(SymbolAnalysis::verdict)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(PurityDiagnostic::is_error)
    }

    /// Textual summary of the verdicts of all analysed in-source symbols.
    pub fn summary<'r>(&'r self, model: &'r SemanticModel) -> PassSummary<'r> {
        PassSummary {
            model,
            report: self,
        }
    }
}

pub struct PassSummary<'a> {
    model: &'a SemanticModel,
    report: &'a PassReport,
}

impl fmt::Display for PassSummary<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "purity analysis: [")?;
        for (id, analysis) in &self.report.results {
            let symbol = self.model.get_symbol(*id);
            if symbol.is_external() {
                continue;
            }
            writeln!(f, "  {}: {}", symbol.display_name(), analysis.verdict())?;
        }
        write!(f, "]")
    }
}
