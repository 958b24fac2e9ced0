// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Context};
use itertools::Itertools;
use log::debug;
use purity_model::SemanticModel;
use std::path::{Path, PathBuf};

/// Snapshot files named by `paths`. Directories contribute every `*.json` file below them.
pub fn collect_snapshots(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut snapshots = vec![];
    for path in paths {
        if path.is_dir() {
            let pattern = format!("{}/**/*.json", path.display());
            for entry in glob::glob(&pattern).context("invalid snapshot directory")? {
                snapshots.push(entry?);
            }
        } else if path.is_file() {
            snapshots.push(path.clone());
        } else {
            bail!("snapshot path `{}` does not exist", path.display());
        }
    }
    let snapshots = snapshots.into_iter().sorted().dedup().collect::<Vec<_>>();
    if snapshots.is_empty() {
        bail!("no snapshots found");
    }
    Ok(snapshots)
}

pub fn load_model(path: &Path) -> anyhow::Result<SemanticModel> {
    let model = SemanticModel::from_json_file(path)
        .with_context(|| format!("failed to load snapshot `{}`", path.display()))?;
    debug!(
        "loaded {} ({} symbols) from {}",
        model.file_name(),
        model.symbol_count(),
        path.display()
    );
    Ok(model)
}

pub fn build_models(paths: &[PathBuf]) -> anyhow::Result<Vec<(PathBuf, SemanticModel)>> {
    collect_snapshots(paths)?
        .into_iter()
        .map(|path| load_model(&path).map(|model| (path, model)))
        .collect()
}
