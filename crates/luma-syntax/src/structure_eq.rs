//! Structural equality for syntax trees.
//!
//! `structure_eq` compares trees ignoring metadata that does not affect the
//! program: node spans. Tags, leaves and child order must match exactly.
//!
//! Numbers compare by value, except that two NaN leaves are considered equal
//! (a tree holding NaN is still structurally the same tree).

use crate::tree::{Node, Term};

/// Trait for structural equality comparison.
///
/// Unlike `PartialEq`, this ignores source spans, so a tree built by hand and
/// the same tree read back from text compare equal.
pub trait StructureEq {
    /// Compare two values for structural equality.
    fn structure_eq(&self, other: &Self) -> bool;
}

impl StructureEq for Term {
    fn structure_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Term::Node(a), Term::Node(b)) => a.structure_eq(b),
            (Term::List(a), Term::List(b)) => a.structure_eq(b),
            (Term::Str(a), Term::Str(b)) => a == b,
            (Term::Num(a), Term::Num(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Term::Bool(a), Term::Bool(b)) => a == b,
            _ => false,
        }
    }
}

// Ignore `span` - it's metadata
impl StructureEq for Node {
    fn structure_eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.children.structure_eq(&other.children)
    }
}

impl<T: StructureEq> StructureEq for [T] {
    fn structure_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.structure_eq(b))
    }
}

impl<T: StructureEq> StructureEq for Vec<T> {
    fn structure_eq(&self, other: &Self) -> bool {
        self.as_slice().structure_eq(other.as_slice())
    }
}

impl<T: StructureEq> StructureEq for Option<T> {
    fn structure_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.structure_eq(b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Span, Term};

    #[test]
    fn test_spans_are_ignored() {
        let a = Term::binop("add", Term::id("x"), Term::number(1))
            .with_span(Span::new(0, 5, 1));
        let b = Term::binop("add", Term::id("x").with_span(Span::new(9, 10, 3)), Term::number(1));
        assert!(a.structure_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_tags_must_match() {
        assert!(!Term::id("x").structure_eq(&Term::string("x")));
    }

    #[test]
    fn test_child_order_matters() {
        let a = Term::binop("lt", Term::id("a"), Term::id("b"));
        let b = Term::binop("lt", Term::id("b"), Term::id("a"));
        assert!(!a.structure_eq(&b));
    }

    #[test]
    fn test_list_length_matters() {
        let a = Term::ret(vec![Term::number(1)]);
        let b = Term::ret(vec![Term::number(1), Term::nil()]);
        assert!(!a.structure_eq(&b));
    }

    #[test]
    fn test_nan_equals_nan() {
        assert!(Term::number(f64::NAN).structure_eq(&Term::number(f64::NAN)));
    }
}
