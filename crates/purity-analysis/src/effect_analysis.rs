// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Effect classification of member bodies.
//!
//! The classifier walks the semantic tree of one member and records an [`EffectSite`] for every
//! construct with a purity-relevant effect. Calls into other in-source members are delegated to
//! a [`CalleeResolver`]; calls into members without source are looked up in the known-member
//! database. The verdict of a member is the dominant verdict of its sites.

use crate::{
    allow_list::{is_synchronization_member, AllowList, ConstructKind},
    cancellation::Cancelled,
    options::AnalysisOptions,
};
use log::{debug, warn};
use purity_model::{
    ast::{AssignOp, FieldRef, MemberAccess, MemberInit, MemberRef, Node, NodeKind, Place},
    display_name_of, KnownMemberDatabase, KnownPurity, SemanticModel, Span, SymbolData, SymbolId,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
};

/// Ordered by dominance: `Impure` dominates `Unknown` dominates `Pure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    Pure,
    Unknown,
    Impure,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pure => write!(f, "pure"),
            Verdict::Unknown => write!(f, "unknown"),
            Verdict::Impure => write!(f, "impure"),
        }
    }
}

impl From<KnownPurity> for Verdict {
    fn from(purity: KnownPurity) -> Self {
        match purity {
            KnownPurity::Pure => Verdict::Pure,
            KnownPurity::Impure => Verdict::Impure,
            KnownPurity::Unknown => Verdict::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurityFact {
    Pure,
    Impure { reason: String, span: Span },
    Unknown { cause: String, span: Span },
}

impl PurityFact {
    pub fn verdict(&self) -> Verdict {
        match self {
            PurityFact::Pure => Verdict::Pure,
            PurityFact::Impure { .. } => Verdict::Impure,
            PurityFact::Unknown { .. } => Verdict::Unknown,
        }
    }

    pub fn is_pure(&self) -> bool {
        matches!(self, PurityFact::Pure)
    }

    fn from_verdict(verdict: Verdict, detail: String, span: Span) -> Self {
        match verdict {
            Verdict::Pure => PurityFact::Pure,
            Verdict::Impure => PurityFact::Impure {
                reason: detail,
                span,
            },
            Verdict::Unknown => PurityFact::Unknown {
                cause: detail,
                span,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnsafeOp {
    PointerDeref,
    PointerWrite,
    AddressOf,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EffectKind {
    FieldWrite,
    ElementWrite,
    ParameterWrite,
    StaticRead,
    VolatileRead,
    Call,
    Construction,
    Synchronization,
    Unsafe(UnsafeOp),
    Unresolved,
}

/// One classified construct occurrence in a member body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectSite {
    pub kind: EffectKind,
    pub span: Span,
    pub verdict: Verdict,
    /// What the construct does, phrased to complete "'Member' is marked as pure but ...".
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolAnalysis {
    pub fact: PurityFact,
    pub sites: Vec<EffectSite>,
}

impl SymbolAnalysis {
    pub fn pure() -> Self {
        Self {
            fact: PurityFact::Pure,
            sites: vec![],
        }
    }

    /// Aggregates sites into a fact. The fact carries the first site with the dominant verdict.
    pub fn from_sites(sites: Vec<EffectSite>) -> Self {
        let verdict = sites
            .iter()
            .map(|site| site.verdict)
            .max()
            .unwrap_or(Verdict::Pure);
        let fact = sites
            .iter()
            .find(|site| site.verdict == verdict)
            .map(|site| PurityFact::from_verdict(verdict, site.detail.clone(), site.span))
            .unwrap_or(PurityFact::Pure);
        Self { fact, sites }
    }

    pub fn verdict(&self) -> Verdict {
        self.fact.verdict()
    }

    /// Sites which are not pure, in body order.
    pub fn flagged_sites(&self) -> impl Iterator<Item = &EffectSite> {
        self.sites
            .iter()
            .filter(|site| site.verdict != Verdict::Pure)
    }
}

/// Supplies verdicts of in-model callees while a body is classified.
pub trait CalleeResolver {
    /// The verdict of `callee` as seen from `caller`. A callee whose verification is still in
    /// progress reports its provisional verdict.
    fn resolve(&mut self, caller: SymbolId, callee: SymbolId) -> Result<Verdict, Cancelled>;
}

#[derive(Clone, Copy)]
pub struct EffectClassifier<'a> {
    model: &'a SemanticModel,
    database: &'a KnownMemberDatabase,
    allow_list: &'a AllowList,
    options: &'a AnalysisOptions,
}

impl<'a> EffectClassifier<'a> {
    pub fn new(
        model: &'a SemanticModel,
        database: &'a KnownMemberDatabase,
        allow_list: &'a AllowList,
        options: &'a AnalysisOptions,
    ) -> Self {
        Self {
            model,
            database,
            allow_list,
            options,
        }
    }

    pub fn model(&self) -> &'a SemanticModel {
        self.model
    }

    /// Classifies the body of `symbol`, resolving in-model callees through `resolver`.
    pub fn classify(
        &self,
        symbol: SymbolId,
        resolver: &mut dyn CalleeResolver,
    ) -> Result<SymbolAnalysis, Cancelled> {
        let data = self.model.get_symbol(symbol);
        let Some(body) = &data.body else {
            return Ok(self.classify_external(data));
        };
        let mut walker = BodyWalker {
            classifier: *self,
            symbol,
            data,
            fresh_locals: fresh_locals(body),
            resolver,
            sites: vec![],
        };
        for node in body {
            walker.walk(node)?;
        }
        let analysis = SymbolAnalysis::from_sites(walker.sites);
        debug!(
            "classified `{}` as {} ({} effect sites)",
            data.display_name(),
            analysis.verdict(),
            analysis.sites.len()
        );
        Ok(analysis)
    }

    /// Classifies a member without source through the known-member database.
    pub fn classify_external(&self, data: &SymbolData) -> SymbolAnalysis {
        let verdict = Verdict::from(self.database.classify(&data.signature));
        let detail = match verdict {
            Verdict::Pure => return SymbolAnalysis::pure(),
            Verdict::Impure => format!("'{}' is a known impure member", data.display_name()),
            Verdict::Unknown => format!(
                "'{}' has no source and no known purity",
                data.display_name()
            ),
        };
        SymbolAnalysis {
            fact: PurityFact::from_verdict(verdict, detail, data.span),
            sites: vec![],
        }
    }
}

/// Locals whose every assignment in `body` stores a fresh allocation.
fn fresh_locals(body: &[Node]) -> BTreeSet<&str> {
    let mut assignments: BTreeMap<&str, bool> = BTreeMap::new();
    for node in body {
        node.visit_pre_order(&mut |n| {
            let (name, is_fresh) = match &n.kind {
                NodeKind::Declare {
                    name,
                    init: Some(init),
                } => (name.as_str(), init.is_fresh_allocation()),
                NodeKind::Assign {
                    target: Place::Local { name },
                    value,
                    op,
                } => (
                    name.as_str(),
                    *op == AssignOp::Simple
                        && value.as_deref().map_or(false, Node::is_fresh_allocation),
                ),
                NodeKind::ForEach { local, .. } => (local.as_str(), false),
                _ => return,
            };
            *assignments.entry(name).or_insert(true) &= is_fresh;
        });
    }
    assignments
        .into_iter()
        .filter_map(|(name, fresh)| fresh.then_some(name))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiverRoot {
    Fresh,
    This,
    Parameter,
    Local,
    Static,
    External,
}

struct BodyWalker<'a, 'r> {
    classifier: EffectClassifier<'a>,
    symbol: SymbolId,
    data: &'a SymbolData,
    fresh_locals: BTreeSet<&'a str>,
    resolver: &'r mut dyn CalleeResolver,
    sites: Vec<EffectSite>,
}

impl<'a, 'r> BodyWalker<'a, 'r> {
    fn walk(&mut self, node: &'a Node) -> Result<(), Cancelled> {
        self.classify_node(node)?;
        let mut children = vec![];
        node.for_each_child(&mut |child| children.push(child));
        for child in children {
            self.walk(child)?;
        }
        Ok(())
    }

    fn record(&mut self, kind: EffectKind, span: Span, verdict: Verdict, detail: String) {
        if verdict != Verdict::Pure {
            debug!(
                "`{}` {}: {} at {}",
                self.data.display_name(),
                verdict,
                detail,
                span
            );
        }
        self.sites.push(EffectSite {
            kind,
            span,
            verdict,
            detail,
        });
    }

    fn classify_node(&mut self, node: &'a Node) -> Result<(), Cancelled> {
        use NodeKind::*;
        let span = node.span;
        match &node.kind {
            Assign { target, .. } => self.classify_write(target, span),
            FieldRead { field, .. } => self.classify_field_read(field, span),
            Call { target: None, .. } => {
                warn!(
                    "unresolved call in `{}` at {}",
                    self.data.display_name(),
                    span
                );
                self.record(
                    EffectKind::Unresolved,
                    span,
                    Verdict::Unknown,
                    "calls a member that could not be resolved".to_string(),
                );
            }
            Call {
                target: Some(member),
                is_virtual,
                ..
            } => self.classify_call(member, *is_virtual, span, EffectKind::Call)?,
            New {
                constructor,
                initializers,
                ..
            } => {
                if let Some(constructor) = constructor {
                    self.classify_call(constructor, false, span, EffectKind::Construction)?;
                }
                self.classify_initializers(initializers)?;
            }
            // The copy is fresh, so field initializers write to an unpublished object.
            With { initializers, .. } => self.classify_initializers(initializers)?,
            IsPattern { .. } | Switch { .. } => {
                for getter in node.invoked_members() {
                    self.classify_call(getter, false, span, EffectKind::Call)?;
                }
            }
            Lock { .. } => {
                if self.sync_allowed() {
                    self.record(
                        EffectKind::Synchronization,
                        span,
                        Verdict::Pure,
                        "enters a synchronization block".to_string(),
                    );
                }
            }
            PointerDeref { .. } => self.record_unsafe(
                UnsafeOp::PointerDeref,
                span,
                "dereferences a pointer",
            ),
            AddressOf { .. } => self.record_unsafe(
                UnsafeOp::AddressOf,
                span,
                "takes the address of a variable",
            ),
            Fixed { .. } => self.record_unsafe(
                UnsafeOp::Fixed,
                span,
                "pins memory in a fixed statement",
            ),
            Unresolved { text } => {
                let detail = if text.is_empty() {
                    "contains a construct that could not be resolved".to_string()
                } else {
                    format!(
                        "contains a construct that could not be resolved (`{}`)",
                        text
                    )
                };
                self.record(EffectKind::Unresolved, span, Verdict::Unknown, detail);
            }
            // Purity of the remaining constructs is that of their operands, which are walked
            // separately.
            Literal | This | Local { .. } | Parameter { .. } | Declare { .. }
            | ElementRead { .. } | ArrayCreation { .. } | Unary { .. } | Binary { .. }
            | Conditional { .. } | ConditionalAccess { .. } | Coalesce { .. }
            | IndexFromEnd { .. } | Range { .. } | Throw { .. } | Await { .. } | Block { .. }
            | If { .. } | While { .. } | ForEach { .. } | Return { .. } => {}
        }
        Ok(())
    }

    fn record_unsafe(&mut self, op: UnsafeOp, span: Span, detail: &str) {
        self.record(
            EffectKind::Unsafe(op),
            span,
            Verdict::Impure,
            detail.to_string(),
        );
    }

    fn sync_allowed(&self) -> bool {
        self.classifier
            .allow_list
            .is_allowed(self.symbol, ConstructKind::Synchronization)
    }

    fn classify_write(&mut self, place: &'a Place, span: Span) {
        match place {
            Place::Local { .. } => {}
            Place::Parameter { name, by_ref } => {
                if *by_ref {
                    self.record(
                        EffectKind::ParameterWrite,
                        span,
                        Verdict::Impure,
                        format!("writes to by-reference parameter '{}'", name),
                    );
                }
            }
            Place::Field { receiver, field } => {
                let (verdict, detail) = if field.is_static {
                    (
                        Verdict::Impure,
                        format!(
                            "writes to static field '{}'",
                            display_name_of(&field.signature)
                        ),
                    )
                } else {
                    (
                        self.write_verdict(self.receiver_root(receiver.as_deref())),
                        format!("writes to field '{}'", display_name_of(&field.signature)),
                    )
                };
                self.record(EffectKind::FieldWrite, span, verdict, detail);
            }
            Place::Element { receiver, .. } => {
                let verdict = self.write_verdict(self.receiver_root(Some(&**receiver)));
                self.record(
                    EffectKind::ElementWrite,
                    span,
                    verdict,
                    "writes to an element of a collection it does not own".to_string(),
                );
            }
            Place::Pointer { .. } => {
                self.record_unsafe(UnsafeOp::PointerWrite, span, "writes through a pointer")
            }
        }
    }

    /// Where the object written through a receiver chain comes from. A missing receiver is the
    /// implicit `this`. Freshness covers only the allocation itself: objects reached through one
    /// of its fields or elements may be shared with the caller.
    fn receiver_root(&self, receiver: Option<&Node>) -> ReceiverRoot {
        let Some(receiver) = receiver else {
            return ReceiverRoot::This;
        };
        match &receiver.kind {
            NodeKind::This => ReceiverRoot::This,
            NodeKind::New { .. } | NodeKind::ArrayCreation { .. } | NodeKind::With { .. } => {
                ReceiverRoot::Fresh
            }
            NodeKind::Local { name } if self.fresh_locals.contains(name.as_str()) => {
                ReceiverRoot::Fresh
            }
            NodeKind::Local { .. } => ReceiverRoot::Local,
            NodeKind::Parameter { .. } => ReceiverRoot::Parameter,
            NodeKind::FieldRead { field, .. } if field.is_static => ReceiverRoot::Static,
            NodeKind::FieldRead { receiver, .. } => self.reached_through(receiver.as_deref()),
            NodeKind::ElementRead { receiver, .. } => self.reached_through(Some(&**receiver)),
            _ => ReceiverRoot::External,
        }
    }

    /// Root of an object loaded from a field or element of `receiver`.
    fn reached_through(&self, receiver: Option<&Node>) -> ReceiverRoot {
        match self.receiver_root(receiver) {
            ReceiverRoot::Fresh | ReceiverRoot::This => ReceiverRoot::External,
            root => root,
        }
    }

    fn write_verdict(&self, root: ReceiverRoot) -> Verdict {
        match root {
            ReceiverRoot::Fresh => Verdict::Pure,
            ReceiverRoot::This if self.data.kind.initializes_receiver() => Verdict::Pure,
            ReceiverRoot::This
            | ReceiverRoot::Parameter
            | ReceiverRoot::Local
            | ReceiverRoot::Static
            | ReceiverRoot::External => Verdict::Impure,
        }
    }

    fn classify_field_read(&mut self, field: &FieldRef, span: Span) {
        let name = display_name_of(&field.signature);
        if field.is_volatile {
            self.record(
                EffectKind::VolatileRead,
                span,
                Verdict::Impure,
                format!("reads volatile field '{}'", name),
            );
        } else if field.is_mutable_static() && self.classifier.options.strict_static_reads {
            self.record(
                EffectKind::StaticRead,
                span,
                Verdict::Impure,
                format!("reads mutable static field '{}'", name),
            );
        }
    }

    fn classify_initializers(&mut self, initializers: &'a [MemberInit]) -> Result<(), Cancelled> {
        for init in initializers {
            if let MemberAccess::Property(setter) = &init.member {
                self.classify_call(setter, false, init.span, EffectKind::Call)?;
            }
        }
        Ok(())
    }

    fn member_verdict(&mut self, callee: Result<SymbolId, &str>) -> Result<Verdict, Cancelled> {
        match callee {
            Ok(id) => self.resolver.resolve(self.symbol, id),
            Err(signature) => Ok(self.classifier.database.classify(signature).into()),
        }
    }

    fn classify_call(
        &mut self,
        member: &'a MemberRef,
        is_virtual: bool,
        span: Span,
        kind: EffectKind,
    ) -> Result<(), Cancelled> {
        let model = self.classifier.model;
        let signature = member.signature.as_str();
        let name = display_name_of(signature);
        if is_synchronization_member(signature) && self.sync_allowed() {
            self.record(
                EffectKind::Synchronization,
                span,
                Verdict::Pure,
                format!("calls synchronization member '{}'", name),
            );
            return Ok(());
        }

        let callee = model.find_symbol(signature).ok_or(signature);
        let overrides = callee
            .map(|id| model.get_overrides(id))
            .unwrap_or_default();
        let dispatched = !overrides.is_empty()
            && (is_virtual || callee.map_or(false, |id| model.get_symbol(id).is_virtual));

        let base = self.member_verdict(callee)?;
        let (verdict, detail) = if dispatched {
            // Every override is resolved so that all of them take part in cycle detection.
            let mut all_pure = base == Verdict::Pure;
            for implementation in overrides {
                all_pure &= self.member_verdict(implementation)? == Verdict::Pure;
            }
            if all_pure {
                (Verdict::Pure, format!("calls virtual member '{}'", name))
            } else {
                (
                    Verdict::Unknown,
                    format!(
                        "calls virtual member '{}' whose overrides are not all pure",
                        name
                    ),
                )
            }
        } else {
            let detail = match base {
                Verdict::Pure => format!("calls '{}'", name),
                Verdict::Impure => format!("calls impure member '{}'", name),
                Verdict::Unknown => format!("calls '{}' whose purity is unknown", name),
            };
            (base, detail)
        };
        self.record(kind, span, verdict, detail);
        Ok(())
    }
}
