//! Tagged syntax trees.
//!
//! A program is a [`Block`]: an untagged list of statement nodes. Every node is
//! a [`Tag`] plus positional children, where a child is another node, an
//! untagged list, or a primitive leaf. The shape of each tag follows the
//! classic Lua AST:
//!
//! ```text
//! `Set{ { `Id "x" }, { `Op{ "add", `Id "x", `Number 1 } } }     -- x = x + 1
//! `Local{ { `Id "t" }, { `Table{ `Pair{ `String "k", `True } } } }  -- local t = { k = true }
//! ```
//!
//! Spans are metadata: they never take part in pattern matching or
//! structural equality.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A sequence of statements.
pub type Block = Vec<Term>;

/// Source location of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line of `start`.
    pub line: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32) -> Self {
        Self { start, end, line }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
        }
    }
}

/// Node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    // Expressions
    Nil,
    Dots,
    True,
    False,
    Number,
    String,
    Function,
    Table,
    Pair,
    Op,
    Paren,
    Call,
    Invoke,
    Index,
    Id,

    // Statements
    Do,
    Set,
    While,
    Repeat,
    If,
    Fornum,
    Forin,
    Local,
    Localrec,
    Goto,
    Label,
    Return,
    Break,

    /// A node introduced by a grammar extension. Never produced by the
    /// baseline parser.
    Extension(String),
}

impl Tag {
    pub fn name(&self) -> &str {
        match self {
            Tag::Nil => "Nil",
            Tag::Dots => "Dots",
            Tag::True => "True",
            Tag::False => "False",
            Tag::Number => "Number",
            Tag::String => "String",
            Tag::Function => "Function",
            Tag::Table => "Table",
            Tag::Pair => "Pair",
            Tag::Op => "Op",
            Tag::Paren => "Paren",
            Tag::Call => "Call",
            Tag::Invoke => "Invoke",
            Tag::Index => "Index",
            Tag::Id => "Id",
            Tag::Do => "Do",
            Tag::Set => "Set",
            Tag::While => "While",
            Tag::Repeat => "Repeat",
            Tag::If => "If",
            Tag::Fornum => "Fornum",
            Tag::Forin => "Forin",
            Tag::Local => "Local",
            Tag::Localrec => "Localrec",
            Tag::Goto => "Goto",
            Tag::Label => "Label",
            Tag::Return => "Return",
            Tag::Break => "Break",
            Tag::Extension(name) => name,
        }
    }

    /// Tags that may appear in statement position.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Tag::Do
                | Tag::Set
                | Tag::While
                | Tag::Repeat
                | Tag::If
                | Tag::Fornum
                | Tag::Forin
                | Tag::Local
                | Tag::Localrec
                | Tag::Goto
                | Tag::Label
                | Tag::Return
                | Tag::Break
                | Tag::Call
                | Tag::Invoke
        )
    }

    /// Tags that may appear in expression position.
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Tag::Nil
                | Tag::Dots
                | Tag::True
                | Tag::False
                | Tag::Number
                | Tag::String
                | Tag::Function
                | Tag::Table
                | Tag::Op
                | Tag::Paren
                | Tag::Call
                | Tag::Invoke
                | Tag::Index
                | Tag::Id
        )
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tagged node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub tag: Tag,
    pub children: Vec<Term>,
    pub span: Option<Span>,
}

impl Node {
    pub fn new(tag: Tag, children: Vec<Term>) -> Self {
        Self {
            tag,
            children,
            span: None,
        }
    }

    pub fn child(&self, index: usize) -> Option<&Term> {
        self.children.get(index)
    }
}

/// Anything that can occupy a child position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Node(Node),
    /// Untagged sequence: blocks, parameter lists, assignment sides.
    List(Vec<Term>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Term {
    pub fn node(tag: Tag, children: Vec<Term>) -> Self {
        Term::Node(Node::new(tag, children))
    }

    /// Attach a span. Leaves and lists carry no metadata and are returned as-is.
    pub fn with_span(mut self, span: Span) -> Self {
        if let Term::Node(node) = &mut self {
            node.span = Some(span);
        }
        self
    }

    pub fn nil() -> Self {
        Self::node(Tag::Nil, vec![])
    }

    pub fn dots() -> Self {
        Self::node(Tag::Dots, vec![])
    }

    pub fn boolean(value: bool) -> Self {
        Self::node(if value { Tag::True } else { Tag::False }, vec![])
    }

    pub fn number(value: impl Into<f64>) -> Self {
        Self::node(Tag::Number, vec![Term::Num(value.into())])
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::node(Tag::String, vec![Term::Str(value.into())])
    }

    pub fn id(name: impl Into<String>) -> Self {
        Self::node(Tag::Id, vec![Term::Str(name.into())])
    }

    pub fn function(params: Vec<Term>, body: Block) -> Self {
        Self::node(Tag::Function, vec![Term::List(params), Term::List(body)])
    }

    pub fn table(items: Vec<Term>) -> Self {
        Self::node(Tag::Table, items)
    }

    pub fn pair(key: Term, value: Term) -> Self {
        Self::node(Tag::Pair, vec![key, value])
    }

    pub fn binop(op: &str, left: Term, right: Term) -> Self {
        Self::node(Tag::Op, vec![Term::Str(op.to_string()), left, right])
    }

    pub fn unop(op: &str, operand: Term) -> Self {
        Self::node(Tag::Op, vec![Term::Str(op.to_string()), operand])
    }

    pub fn paren(inner: Term) -> Self {
        Self::node(Tag::Paren, vec![inner])
    }

    pub fn call(callee: Term, args: Vec<Term>) -> Self {
        let mut children = Vec::with_capacity(args.len() + 1);
        children.push(callee);
        children.extend(args);
        Self::node(Tag::Call, children)
    }

    pub fn invoke(object: Term, method: impl Into<String>, args: Vec<Term>) -> Self {
        let mut children = Vec::with_capacity(args.len() + 2);
        children.push(object);
        children.push(Term::string(method));
        children.extend(args);
        Self::node(Tag::Invoke, children)
    }

    pub fn index(base: Term, key: Term) -> Self {
        Self::node(Tag::Index, vec![base, key])
    }

    /// `base.field`
    pub fn field(base: Term, field: impl Into<String>) -> Self {
        Self::index(base, Term::string(field))
    }

    pub fn set(targets: Vec<Term>, values: Vec<Term>) -> Self {
        Self::node(Tag::Set, vec![Term::List(targets), Term::List(values)])
    }

    pub fn local(names: Vec<Term>, values: Vec<Term>) -> Self {
        Self::node(Tag::Local, vec![Term::List(names), Term::List(values)])
    }

    pub fn localrec(name: Term, function: Term) -> Self {
        Self::node(
            Tag::Localrec,
            vec![Term::List(vec![name]), Term::List(vec![function])],
        )
    }

    pub fn do_block(body: Block) -> Self {
        Self::node(Tag::Do, body)
    }

    pub fn while_loop(cond: Term, body: Block) -> Self {
        Self::node(Tag::While, vec![cond, Term::List(body)])
    }

    pub fn repeat(body: Block, cond: Term) -> Self {
        Self::node(Tag::Repeat, vec![Term::List(body), cond])
    }

    /// `if` with `(condition, body)` clauses and an optional `else` body.
    pub fn if_chain(clauses: Vec<(Term, Block)>, otherwise: Option<Block>) -> Self {
        let mut children = Vec::with_capacity(clauses.len() * 2 + 1);
        for (cond, body) in clauses {
            children.push(cond);
            children.push(Term::List(body));
        }
        if let Some(body) = otherwise {
            children.push(Term::List(body));
        }
        Self::node(Tag::If, children)
    }

    pub fn fornum(var: Term, first: Term, last: Term, step: Option<Term>, body: Block) -> Self {
        let mut children = vec![var, first, last];
        children.extend(step);
        children.push(Term::List(body));
        Self::node(Tag::Fornum, children)
    }

    pub fn forin(names: Vec<Term>, exprs: Vec<Term>, body: Block) -> Self {
        Self::node(
            Tag::Forin,
            vec![Term::List(names), Term::List(exprs), Term::List(body)],
        )
    }

    pub fn ret(values: Vec<Term>) -> Self {
        Self::node(Tag::Return, values)
    }

    pub fn break_stmt() -> Self {
        Self::node(Tag::Break, vec![])
    }

    pub fn goto(label: impl Into<String>) -> Self {
        Self::node(Tag::Goto, vec![Term::Str(label.into())])
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::node(Tag::Label, vec![Term::Str(name.into())])
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Term::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.as_node().map(|n| &n.tag)
    }

    pub fn is_tag(&self, tag: &Tag) -> bool {
        self.tag() == Some(tag)
    }

    /// Children of a node or items of a list. Leaves have none.
    pub fn children(&self) -> &[Term] {
        match self {
            Term::Node(node) => &node.children,
            Term::List(items) => items,
            _ => &[],
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Term::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Name carried by an `Id` node.
    pub fn id_name(&self) -> Option<&str> {
        match self {
            Term::Node(Node {
                tag: Tag::Id,
                children,
                ..
            }) => children.first().and_then(Term::as_str),
            _ => None,
        }
    }

    /// Value carried by a `String` node.
    pub fn string_value(&self) -> Option<&str> {
        match self {
            Term::Node(Node {
                tag: Tag::String,
                children,
                ..
            }) => children.first().and_then(Term::as_str),
            _ => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        self.as_node().and_then(|n| n.span)
    }
}
