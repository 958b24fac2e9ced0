// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The resolved semantic tree of a member body.
//!
//! The front end delivers every body as a sequence of nodes in which calls and field accesses
//! are already bound to the members they refer to. Only the information the purity engine needs
//! is kept: node shape, operands, resolved member identity and a few member flags.

use crate::loc::Span;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub span: Span,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// A member bound by the front end. The signature is the fully qualified form used both to
/// find in-source symbols and to query the known-member database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub signature: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub signature: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_volatile: bool,
    #[serde(default)]
    pub is_readonly: bool,
    #[serde(default)]
    pub is_const: bool,
}

impl FieldRef {
    /// Static state that can change while the program runs.
    pub fn is_mutable_static(&self) -> bool {
        self.is_static && !self.is_readonly && !self.is_const
    }
}

/// A member touched by an object initializer, a `with` expression or a property pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum MemberAccess {
    Field(FieldRef),
    /// A property accessor (setter or init accessor for initializers, getter for patterns).
    Property(MemberRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInit {
    pub span: Span,
    pub member: MemberAccess,
    pub value: Node,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    #[default]
    Simple,
    Compound,
    Increment,
    Decrement,
}

/// The storage location written by an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "place", rename_all = "snake_case")]
pub enum Place {
    Local {
        name: String,
    },
    Parameter {
        name: String,
        #[serde(default)]
        by_ref: bool,
    },
    Field {
        #[serde(default)]
        receiver: Option<Box<Node>>,
        field: FieldRef,
    },
    Element {
        receiver: Box<Node>,
        index: Box<Node>,
    },
    Pointer {
        operand: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySubpattern {
    pub span: Span,
    pub member: MemberAccess,
    pub pattern: Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum Pattern {
    Discard,
    Constant {
        value: Box<Node>,
    },
    Type {
        type_name: String,
    },
    Property {
        #[serde(default)]
        type_name: Option<String>,
        properties: Vec<PropertySubpattern>,
    },
    Not {
        #[serde(rename = "operand")]
        pattern: Box<Pattern>,
    },
    And {
        left: Box<Pattern>,
        right: Box<Pattern>,
    },
    Or {
        left: Box<Pattern>,
        right: Box<Pattern>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchArm {
    pub pattern: Pattern,
    #[serde(default)]
    pub guard: Option<Node>,
    pub body: Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    Literal,
    This,
    Local {
        name: String,
    },
    Parameter {
        name: String,
    },
    Declare {
        name: String,
        #[serde(default)]
        init: Option<Box<Node>>,
    },
    Assign {
        target: Place,
        #[serde(default)]
        value: Option<Box<Node>>,
        #[serde(default)]
        op: AssignOp,
    },
    FieldRead {
        #[serde(default)]
        receiver: Option<Box<Node>>,
        field: FieldRef,
    },
    ElementRead {
        receiver: Box<Node>,
        index: Box<Node>,
    },
    /// A method or accessor invocation. `target` is `None` when the front end could not bind
    /// the call to a member.
    Call {
        #[serde(default)]
        target: Option<MemberRef>,
        #[serde(default)]
        receiver: Option<Box<Node>>,
        #[serde(default)]
        args: Vec<Node>,
        #[serde(default)]
        is_virtual: bool,
    },
    New {
        #[serde(default)]
        constructor: Option<MemberRef>,
        #[serde(default)]
        args: Vec<Node>,
        #[serde(default)]
        initializers: Vec<MemberInit>,
    },
    ArrayCreation {
        #[serde(default)]
        elements: Vec<Node>,
    },
    Unary {
        operand: Box<Node>,
    },
    Binary {
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Conditional {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    /// `receiver?.access`; `access` is evaluated against the receiver when it is non-null.
    ConditionalAccess {
        receiver: Box<Node>,
        access: Box<Node>,
    },
    Coalesce {
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    IndexFromEnd {
        operand: Box<Node>,
    },
    Range {
        #[serde(default)]
        start: Option<Box<Node>>,
        #[serde(default)]
        end: Option<Box<Node>>,
    },
    IsPattern {
        operand: Box<Node>,
        pattern: Pattern,
    },
    Switch {
        scrutinee: Box<Node>,
        arms: Vec<SwitchArm>,
    },
    /// Non-destructive record mutation: copies `receiver` and applies the initializers to the
    /// copy.
    With {
        receiver: Box<Node>,
        initializers: Vec<MemberInit>,
    },
    Throw {
        #[serde(default)]
        operand: Option<Box<Node>>,
    },
    Await {
        operand: Box<Node>,
    },
    Lock {
        guard: Box<Node>,
        body: Vec<Node>,
    },
    PointerDeref {
        operand: Box<Node>,
    },
    AddressOf {
        operand: Box<Node>,
    },
    Fixed {
        pinned: Box<Node>,
        body: Vec<Node>,
    },
    Block {
        statements: Vec<Node>,
    },
    If {
        condition: Box<Node>,
        then: Box<Node>,
        #[serde(default)]
        otherwise: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
    },
    ForEach {
        local: String,
        collection: Box<Node>,
        body: Box<Node>,
    },
    Return {
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    /// A construct the front end failed to resolve.
    Unresolved {
        #[serde(default)]
        text: String,
    },
}

impl Node {
    /// Whether evaluating this node yields a newly allocated object.
    pub fn is_fresh_allocation(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::New { .. } | NodeKind::ArrayCreation { .. } | NodeKind::With { .. }
        )
    }

    /// Calls `f` on every node directly nested in this one, including nodes held by places,
    /// patterns and member initializers, in source order.
    pub fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        use NodeKind::*;
        match &self.kind {
            Literal | This | Local { .. } | Parameter { .. } | Unresolved { .. } => {}
            Declare { init, .. } => init.iter().for_each(|n| f(n)),
            Assign { target, value, .. } => {
                target.for_each_node(f);
                value.iter().for_each(|n| f(n));
            }
            FieldRead { receiver, .. } => receiver.iter().for_each(|n| f(n)),
            ElementRead { receiver, index } => {
                f(receiver);
                f(index);
            }
            Call { receiver, args, .. } => {
                receiver.iter().for_each(|n| f(n));
                args.iter().for_each(|n| f(n));
            }
            New {
                args, initializers, ..
            } => {
                args.iter().for_each(|n| f(n));
                initializers.iter().for_each(|init| f(&init.value));
            }
            ArrayCreation { elements } => elements.iter().for_each(|n| f(n)),
            Unary { operand }
            | IndexFromEnd { operand }
            | Await { operand }
            | PointerDeref { operand }
            | AddressOf { operand } => f(operand),
            Binary { lhs, rhs } | Coalesce { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            Conditional {
                condition,
                then,
                otherwise,
            } => {
                f(condition);
                f(then);
                f(otherwise);
            }
            ConditionalAccess { receiver, access } => {
                f(receiver);
                f(access);
            }
            Range { start, end } => {
                start.iter().for_each(|n| f(n));
                end.iter().for_each(|n| f(n));
            }
            IsPattern { operand, pattern } => {
                f(operand);
                pattern.for_each_node(f);
            }
            Switch { scrutinee, arms } => {
                f(scrutinee);
                for arm in arms {
                    arm.pattern.for_each_node(f);
                    arm.guard.iter().for_each(|n| f(n));
                    f(&arm.body);
                }
            }
            With {
                receiver,
                initializers,
            } => {
                f(receiver);
                initializers.iter().for_each(|init| f(&init.value));
            }
            Throw { operand } => operand.iter().for_each(|n| f(n)),
            Lock { guard, body } => {
                f(guard);
                body.iter().for_each(|n| f(n));
            }
            Fixed { pinned, body } => {
                f(pinned);
                body.iter().for_each(|n| f(n));
            }
            Block { statements } => statements.iter().for_each(|n| f(n)),
            If {
                condition,
                then,
                otherwise,
            } => {
                f(condition);
                f(then);
                otherwise.iter().for_each(|n| f(n));
            }
            While { condition, body } => {
                f(condition);
                f(body);
            }
            ForEach {
                collection, body, ..
            } => {
                f(collection);
                f(body);
            }
            Return { value } => value.iter().for_each(|n| f(n)),
        }
    }

    /// Visits this node and all nested nodes, parents before children.
    pub fn visit_pre_order<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        f(self);
        self.for_each_child(&mut |child| child.visit_pre_order(f));
    }

    /// Members invoked by this node itself (not by nested nodes).
    pub fn invoked_members(&self) -> Vec<&MemberRef> {
        let mut members = vec![];
        match &self.kind {
            NodeKind::Call {
                target: Some(target),
                ..
            } => members.push(target),
            NodeKind::New {
                constructor,
                initializers,
                ..
            } => {
                members.extend(constructor.iter());
                members.extend(initializers.iter().filter_map(|init| init.member.property()));
            }
            NodeKind::With { initializers, .. } => {
                members.extend(initializers.iter().filter_map(|init| init.member.property()));
            }
            NodeKind::IsPattern { pattern, .. } => pattern.collect_properties(&mut members),
            NodeKind::Switch { arms, .. } => {
                for arm in arms {
                    arm.pattern.collect_properties(&mut members);
                }
            }
            _ => {}
        }
        members
    }
}

impl Place {
    fn for_each_node<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        match self {
            Place::Local { .. } | Place::Parameter { .. } => {}
            Place::Field { receiver, .. } => receiver.iter().for_each(|n| f(n)),
            Place::Element { receiver, index } => {
                f(receiver);
                f(index);
            }
            Place::Pointer { operand } => f(operand),
        }
    }
}

impl MemberAccess {
    pub fn property(&self) -> Option<&MemberRef> {
        match self {
            MemberAccess::Property(member) => Some(member),
            MemberAccess::Field(_) => None,
        }
    }
}

impl Pattern {
    fn for_each_node<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        match self {
            Pattern::Discard | Pattern::Type { .. } => {}
            Pattern::Constant { value } => f(value),
            Pattern::Property { properties, .. } => {
                for sub in properties {
                    sub.pattern.for_each_node(f);
                }
            }
            Pattern::Not { pattern } => pattern.for_each_node(f),
            Pattern::And { left, right } | Pattern::Or { left, right } => {
                left.for_each_node(f);
                right.for_each_node(f);
            }
        }
    }

    fn collect_properties<'a>(&'a self, members: &mut Vec<&'a MemberRef>) {
        match self {
            Pattern::Discard | Pattern::Type { .. } | Pattern::Constant { .. } => {}
            Pattern::Property { properties, .. } => {
                for sub in properties {
                    members.extend(sub.member.property());
                    sub.pattern.collect_properties(members);
                }
            }
            Pattern::Not { pattern } => pattern.collect_properties(members),
            Pattern::And { left, right } | Pattern::Or { left, right } => {
                left.collect_properties(members);
                right.collect_properties(members);
            }
        }
    }
}
