//! Operator precedence for rendering.
//!
//! Ranks are derived from groups listed from loosest to tightest binding;
//! operators in one group share a rank.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Operator groups, loosest first.
pub const GROUPS: &[&[&str]] = &[
    &["or", "and"],
    &["lt", "le", "eq", "ne"],
    &["concat"],
    &["add", "sub"],
    &["mul", "div", "mod"],
    &["unary", "not", "len", "unm"],
    &["pow"],
    &["index"],
];

static RANKS: LazyLock<HashMap<&'static str, u8>> = LazyLock::new(|| {
    let mut ranks = HashMap::new();
    for (rank, group) in GROUPS.iter().enumerate() {
        for op in *group {
            // Fewer than 256 groups
            ranks.insert(*op, rank as u8 + 1);
        }
    }
    ranks
});

/// Rank of `op`, higher binds tighter. Unknown operators have none.
pub fn rank(op: &str) -> Option<u8> {
    RANKS.get(op).copied()
}

/// Whether an operand whose top operator is `child` needs parentheses under
/// `parent`. Ties parenthesize.
pub fn needs_parens(parent: &str, child: &str) -> bool {
    match (rank(parent), rank(child)) {
        (Some(parent), Some(child)) => parent >= child,
        _ => false,
    }
}
