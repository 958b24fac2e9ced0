// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use crate::{effect_analysis::Verdict, verification_pass::PassReport};
use purity_model::{SemanticModel, SymbolData, SymbolId, SymbolKind};
use std::{collections::BTreeMap, io};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PurityStatus {
    Pure,
    PureNotAnnotated,
    Impure,
    Unknown,
    NotAnalysed,
}

impl std::fmt::Display for PurityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurityStatus::Pure => write!(f, "✅ pure"),
            PurityStatus::PureNotAnnotated => write!(f, "💡 pure but not annotated"),
            PurityStatus::Impure => write!(f, "❌ impure"),
            PurityStatus::Unknown => write!(f, "⚠️  unknown"),
            PurityStatus::NotAnalysed => write!(f, "⏭️  not analysed"),
        }
    }
}

pub fn should_include_symbol(symbol: &SymbolData) -> bool {
    !symbol.is_external() && symbol.kind != SymbolKind::LocalFunction
}

pub fn determine_purity_status(
    model: &SemanticModel,
    report: &PassReport,
    id: SymbolId,
) -> PurityStatus {
    match report.verdict(id) {
        None => PurityStatus::NotAnalysed,
        Some(Verdict::Impure) => PurityStatus::Impure,
        Some(Verdict::Unknown) => PurityStatus::Unknown,
        Some(Verdict::Pure) if model.get_symbol(id).enforces_purity() => PurityStatus::Pure,
        Some(Verdict::Pure) => PurityStatus::PureNotAnnotated,
    }
}

pub fn write_purity_stats(
    out: &mut impl io::Write,
    model: &SemanticModel,
    report: &PassReport,
) -> io::Result<()> {
    writeln!(out, "📊 Purity Statistics for {}\n", model.file_name())?;

    let mut total_symbols = 0;
    let mut stats_by_status = BTreeMap::new();
    let mut symbols_by_type: BTreeMap<&str, Vec<_>> = BTreeMap::new();

    for (id, symbol) in model.get_symbols() {
        if should_include_symbol(symbol) {
            symbols_by_type
                .entry(symbol.declaring_type())
                .or_default()
                .push(id);
        }
    }

    for (type_name, ids) in symbols_by_type {
        writeln!(out, "📦 Type: {}", type_name)?;
        for id in ids {
            total_symbols += 1;
            let status = determine_purity_status(model, report, id);
            *stats_by_status.entry(status).or_insert(0) += 1;
            writeln!(out, "  {} {}", status, model.get_symbol(id).member_name())?;
        }
        writeln!(out)?;
    }

    writeln!(out, "📈 Summary:")?;
    writeln!(out, "Total members: {}", total_symbols)?;
    for (status, count) in stats_by_status {
        writeln!(out, "  {}: {}", status, count)?;
    }
    Ok(())
}

pub fn display_purity_stats(model: &SemanticModel, report: &PassReport) -> io::Result<()> {
    write_purity_stats(&mut io::stdout().lock(), model, report)
}
