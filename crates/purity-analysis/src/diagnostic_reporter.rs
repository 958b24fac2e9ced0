// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Turns symbol analyses into located, categorized diagnostics.
//!
//! The category codes are a stable contract consumed by downstream tooling and must not be
//! renumbered.

use crate::{
    effect_analysis::{SymbolAnalysis, Verdict},
    options::AnalysisOptions,
};
use codespan_reporting::{
    diagnostic::{Diagnostic, Label, Severity},
    files::{Files, SimpleFile},
    term::{self, termcolor::WriteColor},
};
use log::info;
use purity_model::{Position, SemanticModel, Span, SymbolId, SymbolKind};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Write},
    ops::Range,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticCategory {
    ImpureOperation,
    PurityUnknown,
    MissingAnnotation,
}

impl DiagnosticCategory {
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticCategory::ImpureOperation => "PURITY001",
            DiagnosticCategory::PurityUnknown => "PURITY002",
            DiagnosticCategory::MissingAnnotation => "PURITY003",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiagnosticCategory::ImpureOperation => "ImpureOperation",
            DiagnosticCategory::PurityUnknown => "PurityUnknown",
            DiagnosticCategory::MissingAnnotation => "MissingAnnotation",
        }
    }

    /// Message template; `{0}` is the symbol name, `{1}` the site detail.
    pub fn template(self) -> &'static str {
        match self {
            DiagnosticCategory::ImpureOperation => "'{0}' is marked as pure but {1}",
            DiagnosticCategory::PurityUnknown => "purity of '{0}' cannot be proven: {1}",
            DiagnosticCategory::MissingAnnotation => {
                "'{0}' is pure but is not marked with the purity enforcement attribute"
            }
        }
    }

    pub fn severity(self, deny_unknown: bool) -> Severity {
        match self {
            DiagnosticCategory::ImpureOperation => Severity::Error,
            DiagnosticCategory::PurityUnknown if deny_unknown => Severity::Error,
            DiagnosticCategory::PurityUnknown => Severity::Warning,
            DiagnosticCategory::MissingAnnotation => Severity::Note,
        }
    }

    pub fn format_message(self, symbol_name: &str, detail: &str) -> String {
        self.template()
            .replace("{0}", symbol_name)
            .replace("{1}", detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurityDiagnostic {
    pub category: DiagnosticCategory,
    pub severity: Severity,
    pub symbol: SymbolId,
    pub symbol_name: String,
    pub span: Span,
    pub message: String,
}

impl PurityDiagnostic {
    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Bug => "bug",
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
        Severity::Help => "help",
    }
}

pub struct DiagnosticReporter<'a> {
    model: &'a SemanticModel,
    options: &'a AnalysisOptions,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(model: &'a SemanticModel, options: &'a AnalysisOptions) -> Self {
        Self { model, options }
    }

    /// Diagnostics for the verified `targets`, given the analyses of every symbol verified in
    /// the pass. Sorted by span, then category, then symbol name.
    pub fn report(
        &self,
        targets: &[SymbolId],
        results: &BTreeMap<SymbolId, SymbolAnalysis>,
    ) -> Vec<PurityDiagnostic> {
        let mut seen = BTreeSet::new();
        let mut diagnostics = vec![];
        let mut push = |category: DiagnosticCategory, symbol: SymbolId, span: Span, detail: &str| {
            if !seen.insert((category, symbol, span)) {
                return;
            }
            let symbol_name = self.model.get_symbol(symbol).display_name();
            diagnostics.push(PurityDiagnostic {
                category,
                severity: category.severity(self.options.deny_unknown),
                symbol,
                message: category.format_message(&symbol_name, detail),
                symbol_name,
                span,
            });
        };

        for target in targets {
            if !self.model.get_symbol(*target).enforces_purity() {
                continue;
            }
            let Some(analysis) = results.get(target) else {
                continue;
            };
            for site in analysis.flagged_sites() {
                let category = match site.verdict {
                    Verdict::Impure => DiagnosticCategory::ImpureOperation,
                    Verdict::Unknown => DiagnosticCategory::PurityUnknown,
                    Verdict::Pure => continue,
                };
                push(category, *target, site.span, &site.detail);
            }
        }

        if self.options.report_missing_annotations {
            for (id, analysis) in results {
                let symbol = self.model.get_symbol(*id);
                if analysis.fact.is_pure()
                    && !symbol.is_external()
                    && !symbol.enforces_purity()
                    && !matches!(
                        symbol.kind,
                        SymbolKind::Constructor | SymbolKind::LocalFunction
                    )
                {
                    push(DiagnosticCategory::MissingAnnotation, *id, symbol.span, "");
                }
            }
        }

        diagnostics.sort_by(|a, b| {
            (a.span, a.category, &a.symbol_name).cmp(&(b.span, b.category, &b.symbol_name))
        });
        info!(
            "{}: {} purity diagnostics",
            self.model.file_name(),
            diagnostics.len()
        );
        diagnostics
    }
}

/// Serializable form of a diagnostic for machine-readable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    pub code: &'static str,
    pub category: &'static str,
    pub severity: &'static str,
    pub symbol: String,
    pub message: String,
    pub file: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl DiagnosticRecord {
    pub fn new(file: &str, diagnostic: &PurityDiagnostic) -> Self {
        Self {
            code: diagnostic.category.code(),
            category: diagnostic.category.name(),
            severity: severity_str(diagnostic.severity),
            symbol: diagnostic.symbol_name.clone(),
            message: diagnostic.message.clone(),
            file: file.to_string(),
            start_line: diagnostic.span.start.line,
            start_column: diagnostic.span.start.column,
            end_line: diagnostic.span.end.line,
            end_column: diagnostic.span.end.column,
        }
    }
}

/// `file:L:C-L:C: severity[code]: message`
pub fn plain_line(file: &str, diagnostic: &PurityDiagnostic) -> String {
    format!(
        "{}:{}: {}[{}]: {}",
        file,
        diagnostic.span,
        severity_str(diagnostic.severity),
        diagnostic.category.code(),
        diagnostic.message
    )
}

fn byte_offset(file: &SimpleFile<&str, &str>, position: Position) -> usize {
    let source: &str = file.source();
    let line_index = position.line.saturating_sub(1) as usize;
    let Ok(line) = file.line_range((), line_index) else {
        return source.len();
    };
    let column = position.column.saturating_sub(1) as usize;
    source[line.clone()]
        .char_indices()
        .nth(column)
        .map(|(offset, _)| line.start + offset)
        .unwrap_or(line.end)
}

fn byte_range(file: &SimpleFile<&str, &str>, span: Span) -> Range<usize> {
    let start = byte_offset(file, span.start);
    let end = byte_offset(file, span.end).max(start);
    start..end
}

/// Renders diagnostics for a person. Uses source snippets when the snapshot carries its
/// source text, one plain line per diagnostic otherwise.
pub fn emit_diagnostics(
    writer: &mut dyn WriteColor,
    model: &SemanticModel,
    diagnostics: &[PurityDiagnostic],
) -> io::Result<()> {
    let Some(source) = model.source() else {
        for diagnostic in diagnostics {
            writeln!(writer, "{}", plain_line(model.file_name(), diagnostic))?;
        }
        return Ok(());
    };
    let file = SimpleFile::new(model.file_name(), source);
    let config = term::Config::default();
    for diagnostic in diagnostics {
        let rendered = Diagnostic::new(diagnostic.severity)
            .with_code(diagnostic.category.code())
            .with_message(&diagnostic.message)
            .with_labels(vec![Label::primary((), byte_range(&file, diagnostic.span))]);
        term::emit(writer, &config, &file, &rendered)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{model_with_source, pure_method, run_pass};
    use codespan_reporting::term::termcolor::Buffer;
    use serde_json::json;

    const SOURCE: &str = "class Counter {\n    int count;\n    [Pure] void Increment() { count++; }\n}\n";

    fn counter_model(source: Option<&str>) -> SemanticModel {
        model_with_source(
            json!([pure_method(
                "Demo.Counter.Increment()",
                "3:5-3:41",
                json!([{ "node": "assign", "span": "3:31-3:38", "op": "increment",
                         "target": { "place": "field", "field": { "signature": "Demo.Counter.count" } } }])
            )]),
            source,
        )
    }

    #[test]
    fn messages_follow_templates() {
        assert_eq!(
            DiagnosticCategory::ImpureOperation
                .format_message("Counter.Increment", "writes to field 'Counter.count'"),
            "'Counter.Increment' is marked as pure but writes to field 'Counter.count'"
        );
        assert_eq!(
            DiagnosticCategory::MissingAnnotation.format_message("Math.Square", ""),
            "'Math.Square' is pure but is not marked with the purity enforcement attribute"
        );
        assert_eq!(DiagnosticCategory::PurityUnknown.code(), "PURITY002");
        assert_eq!(
            DiagnosticCategory::PurityUnknown.severity(true),
            Severity::Error
        );
    }

    #[test]
    fn renders_plain_lines_without_source() {
        let model = counter_model(None);
        let report = run_pass(&model);
        let mut buffer = Buffer::no_color();
        emit_diagnostics(&mut buffer, &model, &report.diagnostics).unwrap();
        let output = String::from_utf8_lossy(buffer.as_slice()).to_string();
        insta::assert_snapshot!(output.trim_end(), @"Test.cs:3:31-3:38: error[PURITY001]: 'Counter.Increment' is marked as pure but writes to field 'Counter.count'");
    }

    #[test]
    fn renders_source_snippets() {
        let model = counter_model(Some(SOURCE));
        let report = run_pass(&model);
        let mut buffer = Buffer::no_color();
        emit_diagnostics(&mut buffer, &model, &report.diagnostics).unwrap();
        let output = String::from_utf8_lossy(buffer.as_slice()).to_string();
        assert!(output.contains("error[PURITY001]"));
        assert!(output.contains("Test.cs:3:31"));
        assert!(output.contains("count++"));
    }

    #[test]
    fn records_carry_stable_codes() {
        let model = counter_model(None);
        let report = run_pass(&model);
        let record = DiagnosticRecord::new(model.file_name(), &report.diagnostics[0]);
        assert_eq!(record.code, "PURITY001");
        assert_eq!(record.category, "ImpureOperation");
        assert_eq!(record.severity, "error");
        assert_eq!((record.start_line, record.start_column), (3, 31));
        assert_eq!((record.end_line, record.end_column), (3, 38));
    }

    #[test]
    fn byte_ranges_follow_columns() {
        let file = SimpleFile::new("Test.cs", SOURCE);
        let range = byte_range(&file, "3:31-3:38".parse().unwrap());
        assert_eq!(&SOURCE[range], "count++");
    }
}
