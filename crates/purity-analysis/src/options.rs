// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use purity_model::{KnownMemberDatabase, KnownMemberError};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read configuration `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Additional known-member entries supplied by configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct KnownMembersConfig {
    pub pure: Vec<String>,
    pub impure: Vec<String>,
}

/// Options controlling a verification pass. Usually read from a `purity.toml` file, with
/// command line flags applied on top.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Treat reads of mutable static fields as impure.
    pub strict_static_reads: bool,
    /// Report pure members reached during verification which lack the enforcement marker.
    pub report_missing_annotations: bool,
    /// Report unknown purity as an error instead of a warning.
    pub deny_unknown: bool,
    pub known_members: KnownMembersConfig,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            strict_static_reads: false,
            report_missing_annotations: true,
            deny_unknown: false,
            known_members: KnownMembersConfig::default(),
        }
    }
}

impl AnalysisOptions {
    pub fn from_toml_str(content: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, OptionsError> {
        let content = fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// The known-member database for these options: the built-in tables, extended with the
    /// configured entries if there are any.
    pub fn known_member_database(
        &self,
    ) -> Result<Cow<'static, KnownMemberDatabase>, KnownMemberError> {
        let extra = &self.known_members;
        if extra.pure.is_empty() && extra.impure.is_empty() {
            return Ok(Cow::Borrowed(KnownMemberDatabase::builtin()?));
        }
        KnownMemberDatabase::with_extensions(&extra.pure, &extra.impure).map(Cow::Owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_take_defaults() {
        let options = AnalysisOptions::from_toml_str("deny_unknown = true").unwrap();
        assert!(options.deny_unknown);
        assert!(options.report_missing_annotations);
        assert!(!options.strict_static_reads);
        assert!(options.known_members.pure.is_empty());
    }

    #[test]
    fn reads_known_member_extensions_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
report_missing_annotations = false

[known_members]
pure = ["Acme.Text.Slug(string)"]
impure = ["Acme.Audit.Record(string)"]
"#
        )
        .unwrap();

        let options = AnalysisOptions::from_toml_file(file.path()).unwrap();
        assert!(!options.report_missing_annotations);
        assert_eq!(options.known_members.pure, vec!["Acme.Text.Slug(string)"]);
        assert_eq!(options.known_members.impure, vec!["Acme.Audit.Record(string)"]);
    }

    #[test]
    fn configured_entries_extend_the_database() {
        let options = AnalysisOptions::from_toml_str(
            r#"
[known_members]
impure = ["Acme.Audit.Record(string)"]
"#,
        )
        .unwrap();
        let db = options.known_member_database().unwrap();
        assert_eq!(
            db.classify("Acme.Audit.Record(string)"),
            purity_model::KnownPurity::Impure
        );
        assert!(matches!(
            AnalysisOptions::default().known_member_database().unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn conflicting_configured_entries_are_rejected() {
        let options = AnalysisOptions::from_toml_str(
            r#"
[known_members]
impure = ["System.Math.Abs(int)"]
"#,
        )
        .unwrap();
        assert!(matches!(
            options.known_member_database(),
            Err(KnownMemberError::TypeConflict { .. })
        ));
    }

    #[test]
    fn reports_malformed_configuration() {
        let err = AnalysisOptions::from_toml_str("deny_unknown = \"yes\"").unwrap_err();
        assert!(matches!(err, OptionsError::Toml(_)));
    }
}
