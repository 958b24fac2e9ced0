// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use crate::{
    options::AnalysisOptions,
    verification_pass::{PassReport, VerificationPass},
};
use purity_model::{KnownMemberDatabase, SemanticModel};
use serde_json::{json, Value};

pub fn model_from_json(symbols: Value) -> SemanticModel {
    model_with_source(symbols, None)
}

pub fn model_with_source(symbols: Value, source: Option<&str>) -> SemanticModel {
    let snapshot = json!({
        "file": "Test.cs",
        "source": source,
        "symbols": symbols,
    });
    SemanticModel::from_json_str(&snapshot.to_string()).unwrap()
}

/// A symbol with the enforcement marker and the given body.
pub fn pure_method(signature: &str, span: &str, body: Value) -> Value {
    json!({
        "signature": signature,
        "kind": "method",
        "markers": ["enforce_purity"],
        "span": span,
        "body": body,
    })
}

pub fn run_pass(model: &SemanticModel) -> PassReport {
    run_pass_with(model, &AnalysisOptions::default())
}

pub fn run_pass_with(model: &SemanticModel, options: &AnalysisOptions) -> PassReport {
    let db = KnownMemberDatabase::builtin().unwrap();
    VerificationPass::new(model, db, options).run().unwrap()
}

/// Diagnostics of a report as `code span symbol` lines.
pub fn diagnostic_lines(report: &PassReport) -> Vec<String> {
    report
        .diagnostics
        .iter()
        .map(|d| format!("{} {} {}", d.category.code(), d.span, d.symbol_name))
        .collect()
}
