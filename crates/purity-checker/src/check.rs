// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use crate::build_model::build_models;
use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use colored::Colorize;
use log::{info, warn, SetLoggerError};
use purity_analysis::{
    call_graph::CallGraph,
    diagnostic_reporter::{emit_diagnostics, DiagnosticRecord},
    options::AnalysisOptions,
    purity_stats::display_purity_stats,
    target_filter::TargetFilterOptions,
    verification_pass::{PassReport, VerificationPass},
};
use purity_model::{KnownMemberDatabase, SemanticModel};
use rayon::prelude::*;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::{
    fmt::{Display, Formatter},
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use termcolor::{ColorChoice, StandardStream, WriteColor};

/// General check options
#[derive(Args, Default)]
#[clap(next_help_heading = "General Options")]
pub struct GeneralConfig {
    /// Read analysis options from a TOML file
    #[clap(name = "config", long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Treat reads of mutable static fields as impure
    #[clap(name = "strict-static-reads", long, global = true)]
    pub strict_static_reads: bool,

    /// Report members whose purity cannot be proven as errors
    #[clap(name = "deny-unknown", long, global = true)]
    pub deny_unknown: bool,

    /// Don't suggest the purity attribute for pure members lacking it
    #[clap(name = "no-missing-annotations", long, global = true)]
    pub no_missing_annotations: bool,

    /// Diagnostic output format
    #[clap(name = "format", long, short = 'f', global = true, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Display per-member purity statistics
    #[clap(name = "stats", long, global = true)]
    pub stats: bool,

    /// Write the call graph of each snapshot as a DOT file into this directory
    #[clap(name = "dump-call-graph", long, global = true)]
    pub dump_call_graph: Option<PathBuf>,

    /// Display detailed verification progress
    #[clap(name = "verbose", long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Installs the stderr logger: warnings by default, debug output when `verbose`.
pub fn init_logging(verbose: bool) -> Result<(), SetLoggerError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    WriteLogger::init(level, Config::default(), std::io::stderr())
}

impl GeneralConfig {
    /// Analysis options from the configuration file, with command line flags applied on top.
    pub fn analysis_options(&self) -> anyhow::Result<AnalysisOptions> {
        let mut options = match &self.config {
            Some(path) => AnalysisOptions::from_toml_file(path)?,
            None => AnalysisOptions::default(),
        };
        options.strict_static_reads |= self.strict_static_reads;
        options.deny_unknown |= self.deny_unknown;
        if self.no_missing_annotations {
            options.report_missing_annotations = false;
        }
        Ok(options)
    }
}

/// Runs one verification pass per snapshot in parallel. Snapshots which don't contain the
/// filtered types or members are skipped, unless that is true of every snapshot.
pub fn check_models<'m>(
    models: &'m [(PathBuf, SemanticModel)],
    database: &KnownMemberDatabase,
    options: &AnalysisOptions,
    filter: &TargetFilterOptions,
) -> anyhow::Result<Vec<(&'m SemanticModel, PassReport)>> {
    let mut selected = vec![];
    let mut filter_error = None;
    for (path, model) in models {
        match filter.check_filter_correctness(model) {
            None => selected.push(model),
            Some(err) => {
                warn!("skipping {}: {}", path.display(), err);
                filter_error.get_or_insert(err);
            }
        }
    }
    if let (true, Some(err)) = (selected.is_empty(), filter_error) {
        bail!("invalid target filter: {}", err);
    }

    selected
        .into_par_iter()
        .map(|model| -> anyhow::Result<_> {
            let report = VerificationPass::new(model, database, options)
                .with_filter(filter.clone())
                .run()
                .with_context(|| format!("verification of {} failed", model.file_name()))?;
            Ok((model, report))
        })
        .collect()
}

pub fn render_json(reports: &[(&SemanticModel, PassReport)]) -> anyhow::Result<String> {
    let records = reports
        .iter()
        .flat_map(|(model, report)| {
            report
                .diagnostics
                .iter()
                .map(|d| DiagnosticRecord::new(model.file_name(), d))
        })
        .collect::<Vec<_>>();
    Ok(serde_json::to_string_pretty(&records)?)
}

pub fn render_human(
    writer: &mut dyn WriteColor,
    reports: &[(&SemanticModel, PassReport)],
) -> anyhow::Result<()> {
    for (model, report) in reports {
        emit_diagnostics(writer, model, &report.diagnostics)?;
    }
    Ok(())
}

pub fn dump_call_graphs(
    dir: &Path,
    reports: &[(&SemanticModel, PassReport)],
) -> anyhow::Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create `{}`", dir.display()))?;
    for (model, _) in reports {
        let stem = Path::new(model.file_name())
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapshot".to_string());
        let path = dir.join(format!("{}.dot", stem));
        fs::write(&path, CallGraph::build(model).to_dot(model))
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        info!("call graph of {} written to {}", model.file_name(), path.display());
    }
    Ok(())
}

/// Checks every snapshot named by `paths`. Returns whether any error diagnostic was produced.
pub fn execute(
    paths: &[PathBuf],
    general_config: GeneralConfig,
    filter: TargetFilterOptions,
) -> anyhow::Result<bool> {
    let options = general_config.analysis_options()?;
    let database = options
        .known_member_database()
        .context("invalid known-member configuration")?;
    let models = build_models(paths)?;
    let reports = check_models(&models, &database, &options, &filter)?;

    match general_config.format {
        OutputFormat::Human => {
            let mut stdout = StandardStream::stdout(ColorChoice::Auto);
            render_human(&mut stdout, &reports)?;
        }
        OutputFormat::Json => println!("{}", render_json(&reports)?),
    }

    if general_config.stats {
        for (model, report) in &reports {
            display_purity_stats(model, report)?;
        }
    }

    if let Some(dir) = &general_config.dump_call_graph {
        dump_call_graphs(dir, &reports)?;
    }

    let diagnostics = reports
        .iter()
        .flat_map(|(_, report)| report.diagnostics.iter())
        .collect::<Vec<_>>();
    let has_errors = reports.iter().any(|(_, report)| report.has_errors());
    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    if general_config.format == OutputFormat::Human {
        let summary = format!(
            "checked {} snapshot(s): {} error(s), {} other diagnostic(s)",
            reports.len(),
            errors,
            diagnostics.len() - errors
        );
        let mut stderr = std::io::stderr().lock();
        if has_errors {
            writeln!(stderr, "{}", summary.red())?;
        } else {
            writeln!(stderr, "{}", summary.green())?;
        }
    }
    Ok(has_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    const COUNTER: &str = r#"{
        "file": "Counter.cs",
        "symbols": [
            { "signature": "Demo.Counter.Increment()", "kind": "method",
              "markers": ["enforce_purity"], "span": "3:5-3:41",
              "body": [{ "node": "assign", "span": "3:31-3:38", "op": "increment",
                         "target": { "place": "field", "field": { "signature": "Demo.Counter.count" } } }] }
        ]
    }"#;

    fn models() -> Vec<(PathBuf, SemanticModel)> {
        vec![(
            PathBuf::from("Counter.json"),
            SemanticModel::from_json_str(COUNTER).unwrap(),
        )]
    }

    #[test]
    fn flags_override_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purity.toml");
        fs::write(&path, "deny_unknown = false\nreport_missing_annotations = true\n").unwrap();
        let config = GeneralConfig {
            config: Some(path),
            deny_unknown: true,
            no_missing_annotations: true,
            ..GeneralConfig::default()
        };
        let options = config.analysis_options().unwrap();
        assert!(options.deny_unknown);
        assert!(!options.report_missing_annotations);
        assert!(!options.strict_static_reads);
    }

    #[test]
    fn a_second_logger_is_reported() {
        let _ = init_logging(false);
        assert!(init_logging(true).is_err());
    }

    #[test]
    fn renders_json_records() {
        let models = models();
        let options = AnalysisOptions::default();
        let db = KnownMemberDatabase::builtin().unwrap();
        let reports = check_models(&models, db, &options, &TargetFilterOptions::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&render_json(&reports).unwrap()).unwrap();
        assert_eq!(json[0]["code"], "PURITY001");
        assert_eq!(json[0]["file"], "Counter.cs");
        assert_eq!(json[0]["start_column"], 31);
    }

    #[test]
    fn renders_human_lines() {
        let models = models();
        let options = AnalysisOptions::default();
        let db = KnownMemberDatabase::builtin().unwrap();
        let reports = check_models(&models, db, &options, &TargetFilterOptions::default()).unwrap();
        let mut buffer = Buffer::no_color();
        render_human(&mut buffer, &reports).unwrap();
        insta::assert_snapshot!(String::from_utf8_lossy(buffer.as_slice()).trim_end(), @"Counter.cs:3:31-3:38: error[PURITY001]: 'Counter.Increment' is marked as pure but writes to field 'Counter.count'");
    }

    #[test]
    fn filters_matching_no_snapshot_are_rejected() {
        let models = models();
        let options = AnalysisOptions::default();
        let db = KnownMemberDatabase::builtin().unwrap();
        let filter = TargetFilterOptions {
            types: Some(vec!["Missing".to_string()]),
            members: None,
        };
        let err = check_models(&models, db, &options, &filter).unwrap_err();
        assert_eq!(err.to_string(), "invalid target filter: Type `Missing` does not exist");
    }

    #[test]
    fn dumps_one_dot_file_per_snapshot() {
        let models = models();
        let options = AnalysisOptions::default();
        let db = KnownMemberDatabase::builtin().unwrap();
        let reports = check_models(&models, db, &options, &TargetFilterOptions::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        dump_call_graphs(dir.path(), &reports).unwrap();
        let dot = fs::read_to_string(dir.path().join("Counter.dot")).unwrap();
        assert!(dot.contains("Counter.Increment"));
    }
}
