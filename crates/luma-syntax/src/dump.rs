//! Compact tagged-table dump of a tree.
//!
//! Used as the verbatim fallback for shapes that plain source text cannot
//! express, and in error messages.

use crate::literal::{format_number, quote_string};
use crate::tree::Term;

/// Render `term` in tagged-table notation.
///
/// ```text
/// `Local{ { }, { `Number 1 } }
/// `Id "x"
/// `Nil
/// ```
pub fn dump(term: &Term) -> String {
    let mut out = String::new();
    dump_into(&mut out, term);
    out
}

fn dump_into(out: &mut String, term: &Term) {
    match term {
        Term::Node(node) => {
            out.push('`');
            out.push_str(node.tag.name());
            match node.children.as_slice() {
                [] => {}
                [leaf @ (Term::Str(_) | Term::Num(_) | Term::Bool(_))] => {
                    out.push(' ');
                    dump_into(out, leaf);
                }
                children => {
                    out.push_str("{ ");
                    dump_seq(out, children);
                    out.push_str(" }");
                }
            }
        }
        Term::List(items) if items.is_empty() => out.push_str("{ }"),
        Term::List(items) => {
            out.push_str("{ ");
            dump_seq(out, items);
            out.push_str(" }");
        }
        Term::Str(s) => out.push_str(&quote_string(s)),
        Term::Num(n) => out.push_str(&format_number(*n)),
        Term::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    }
}

fn dump_seq(out: &mut String, items: &[Term]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        dump_into(out, item);
    }
}
