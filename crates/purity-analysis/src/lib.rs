// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The purity verification engine.
//!
//! A [`verification_pass::VerificationPass`] verifies the symbols of one snapshot which opt
//! into the purity contract. The [`effect_analysis::EffectClassifier`] inspects member bodies,
//! the [`purity_resolver::PurityResolver`] propagates verdicts across the call graph, and the
//! [`diagnostic_reporter::DiagnosticReporter`] turns the results into located diagnostics.

pub mod allow_list;
pub mod call_graph;
pub mod cancellation;
pub mod diagnostic_reporter;
pub mod effect_analysis;
pub mod options;
pub mod purity_resolver;
pub mod purity_stats;
pub mod target_filter;
pub mod verification_pass;

#[cfg(test)]
mod test_utils;
