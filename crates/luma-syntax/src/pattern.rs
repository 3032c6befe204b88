//! Structural patterns over syntax trees.
//!
//! A [`Pattern`] describes the shape of a subtree: an optional tag plus one
//! sub-pattern per child. Sub-patterns bind children to names, recurse into
//! nested patterns, or leave a position unconstrained. Matching is read-only
//! and never observes spans.
//!
//! ```text
//! `Set{ { `Index{ base, `String{ key } } }, { `Function{ { `Id "self", .. }, body } } }
//! ```
//!
//! Ordered lists of [`Alternative`]s form decision rules: the first
//! alternative whose pattern matches decides the outcome. A guard that rejects
//! a matched alternative declines the whole rule instead of falling through to
//! the next one, so callers treat [`Outcome::Declined`] as "use the plain
//! form".

use crate::dump::dump;
use crate::structure_eq::StructureEq;
use crate::tree::{Tag, Term};
use std::collections::HashMap;

/// Shape of a subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Matches anything.
    Any,
    /// Matches a leaf equal to this one (string, number or boolean).
    Leaf(Term),
    /// Matches a node with the given tag (or, untagged, a node or list) whose
    /// children match `items` positionally.
    Shape {
        tag: Option<Tag>,
        items: Vec<Sub>,
        /// When set, extra trailing children are allowed.
        open: bool,
    },
}

/// One positional sub-pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Sub {
    /// Bind the child to a name unconditionally.
    Bind(&'static str),
    /// Optionally bind the child, then require it to match `pattern`.
    Nested {
        name: Option<&'static str>,
        pattern: Pattern,
    },
    /// No constraint.
    Absent,
}

impl Pattern {
    pub fn any() -> Self {
        Pattern::Any
    }

    /// Closed shape of a tagged node.
    pub fn tagged(tag: Tag, items: Vec<Sub>) -> Self {
        Pattern::Shape {
            tag: Some(tag),
            items,
            open: false,
        }
    }

    /// Closed shape of an untagged list (or any node).
    pub fn list(items: Vec<Sub>) -> Self {
        Pattern::Shape {
            tag: None,
            items,
            open: false,
        }
    }

    /// Literal string leaf.
    pub fn str(value: &str) -> Self {
        Pattern::Leaf(Term::Str(value.to_string()))
    }

    /// Allow trailing children beyond the listed sub-patterns.
    pub fn open(self) -> Self {
        match self {
            Pattern::Shape { tag, items, .. } => Pattern::Shape {
                tag,
                items,
                open: true,
            },
            other => other,
        }
    }
}

/// `name`: bind the child.
pub fn bind(name: &'static str) -> Sub {
    Sub::Bind(name)
}

/// Require the child to match `pattern`.
pub fn nest(pattern: Pattern) -> Sub {
    Sub::Nested {
        name: None,
        pattern,
    }
}

/// Bind the child to `name` and require it to match `pattern`.
pub fn nest_as(name: &'static str, pattern: Pattern) -> Sub {
    Sub::Nested {
        name: Some(name),
        pattern,
    }
}

/// Leave the child unconstrained.
pub fn absent() -> Sub {
    Sub::Absent
}

/// Capture name was not bound by the pattern that matched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("capture `{name}` is not bound")]
pub struct MissingCapture {
    pub name: &'static str,
}

/// A rule's alternatives were exhausted without a successful action.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("no alternative matched {subject}")]
pub struct NoBranchMatched {
    /// Debug dump of the subject.
    pub subject: String,
}

/// Names bound by one successful match.
#[derive(Debug, Clone, Default)]
pub struct Captures<'t> {
    bound: HashMap<&'static str, &'t Term>,
}

impl<'t> Captures<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&'t Term> {
        self.bound.get(name).copied()
    }

    pub fn require(&self, name: &'static str) -> Result<&'t Term, MissingCapture> {
        self.get(name).ok_or(MissingCapture { name })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bound.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    fn insert(&mut self, name: &'static str, term: &'t Term) {
        self.bound.insert(name, term);
    }
}

/// Match `term` against `pattern`.
///
/// On success the new bindings are added to `captures`; on failure `captures`
/// is left exactly as it was.
pub fn matches<'t>(pattern: &Pattern, term: &'t Term, captures: &mut Captures<'t>) -> bool {
    let mut scratch = Captures::new();
    if match_into(pattern, term, &mut scratch) {
        captures.bound.extend(scratch.bound);
        true
    } else {
        false
    }
}

fn match_into<'t>(pattern: &Pattern, term: &'t Term, captures: &mut Captures<'t>) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Leaf(literal) => term.structure_eq(literal),
        Pattern::Shape { tag, items, open } => {
            let children = match (tag, term) {
                (Some(tag), Term::Node(node)) if node.tag == *tag => &node.children,
                (Some(_), _) => return false,
                (None, Term::Node(node)) => &node.children,
                (None, Term::List(items)) => items,
                (None, _) => return false,
            };
            let arity_ok = if *open {
                children.len() >= items.len()
            } else {
                children.len() == items.len()
            };
            if !arity_ok {
                return false;
            }
            for (sub, child) in items.iter().zip(children) {
                match sub {
                    Sub::Bind(name) => captures.insert(name, child),
                    Sub::Nested { name, pattern } => {
                        if let Some(name) = name {
                            captures.insert(name, child);
                        }
                        if !match_into(pattern, child, captures) {
                            return false;
                        }
                    }
                    Sub::Absent => {}
                }
            }
            true
        }
    }
}

type Guard = Box<dyn Fn(&Captures<'_>) -> bool + Send + Sync>;
type Action<S, R> = Box<dyn Fn(&mut S, &Captures<'_>) -> R + Send + Sync>;

/// One branch of a decision rule.
pub struct Alternative<S, R> {
    pattern: Pattern,
    guard: Option<Guard>,
    action: Action<S, R>,
}

impl<S, R> Alternative<S, R> {
    pub fn new(
        pattern: Pattern,
        action: impl Fn(&mut S, &Captures<'_>) -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            pattern,
            guard: None,
            action: Box::new(action),
        }
    }

    /// Only take this branch when `guard` accepts the captures.
    pub fn guard(mut self, guard: impl Fn(&Captures<'_>) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl<S, R> std::fmt::Debug for Alternative<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alternative")
            .field("pattern", &self.pattern)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// Result of evaluating a decision rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    /// An alternative matched, its guard passed, and its action ran.
    Matched(R),
    /// An alternative matched but its guard rejected the captures.
    Declined,
}

impl<R> Outcome<R> {
    pub fn matched(self) -> Option<R> {
        match self {
            Outcome::Matched(value) => Some(value),
            Outcome::Declined => None,
        }
    }
}

/// Evaluate `alternatives` in order against `subject`.
///
/// The first alternative whose pattern matches decides: if its guard passes
/// (or it has none), its action runs and the result is returned. If the guard
/// fails, evaluation stops and the rule is [`Outcome::Declined`]; later
/// alternatives are not tried. Running out of alternatives is an error.
pub fn eval_alternatives<S, R>(
    alternatives: &[Alternative<S, R>],
    state: &mut S,
    subject: &Term,
) -> Result<Outcome<R>, NoBranchMatched> {
    for alternative in alternatives {
        let mut captures = Captures::new();
        if !matches(&alternative.pattern, subject, &mut captures) {
            continue;
        }
        if let Some(guard) = &alternative.guard
            && !guard(&captures)
        {
            return Ok(Outcome::Declined);
        }
        return Ok(Outcome::Matched((alternative.action)(state, &captures)));
    }
    Err(NoBranchMatched {
        subject: dump(subject),
    })
}
