//! Lua writer for syntax trees.
//!
//! Renders a tree back to Lua source that reads back to the same tree,
//! preferring the sugared spellings people actually write (`function t:m ()`,
//! `f "x"`, `a ~= b`, `t.k`). Sugar is recognized with the structural rules at
//! the bottom of this file; operands are parenthesized from the precedence
//! table. Shapes with no plain-source spelling are emitted verbatim in the
//! debug form `-{ ... }`.

use crate::dump::dump;
use crate::literal::{format_number, is_ident, quote_string};
use crate::pattern::{
    Alternative, Captures, Outcome, Pattern, absent, bind, eval_alternatives, matches, nest,
    nest_as,
};
use crate::precedence::needs_parens;
use crate::traits::{RenderError, Writer};
use crate::tree::{Block, Node, Tag, Term};
use std::sync::LazyLock;

/// Static instance of the Lua writer.
pub static LUA_WRITER: LuaWriterImpl = LuaWriterImpl;

/// Lua writer implementing the Writer trait.
pub struct LuaWriterImpl;

impl Writer for LuaWriterImpl {
    fn language(&self) -> &'static str {
        "lua"
    }

    fn extension(&self) -> &'static str {
        "lua"
    }

    fn write(&self, block: &Block) -> Result<String, RenderError> {
        LuaWriter::emit(block)
    }
}

/// Indentation unit used by [`LuaWriter::new`].
pub const DEFAULT_INDENT: &str = "   ";

type RenderResult<T = ()> = Result<T, RenderError>;

/// A decision rule whose actions report whether they wrote anything.
type Rule = Vec<Alternative<LuaWriter, RenderResult<bool>>>;

/// Renders trees as Lua source.
///
/// One writer serves one top-level render: it owns the output buffer and the
/// current indentation depth.
#[derive(Debug, Clone)]
pub struct LuaWriter {
    output: String,
    indent_unit: String,
    depth: usize,
}

impl Default for LuaWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl LuaWriter {
    pub fn new() -> Self {
        Self::with_indent(DEFAULT_INDENT)
    }

    pub fn with_indent(unit: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            indent_unit: unit.into(),
            depth: 0,
        }
    }

    /// Render a block with the default indentation.
    pub fn emit(block: &Block) -> RenderResult<String> {
        Self::new().render(block)
    }

    /// Render a block. Nothing is returned on failure.
    pub fn render(mut self, block: &[Term]) -> RenderResult<String> {
        self.write_block(block)?;
        Ok(self.output)
    }

    /// Render a single statement or expression.
    pub fn render_term(mut self, term: &Term) -> RenderResult<String> {
        self.write_term(term)?;
        Ok(self.output)
    }

    // ---------------------------------------------------------------------
    // Layout
    // ---------------------------------------------------------------------

    fn acc(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn nl(&mut self) {
        self.output.push('\n');
        for _ in 0..self.depth {
            self.output.push_str(&self.indent_unit);
        }
    }

    fn nlindent(&mut self) {
        self.depth += 1;
        self.nl();
    }

    fn nldedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.nl();
    }

    fn write_debug(&mut self, term: &Term) {
        self.acc("-{ ");
        self.acc(&dump(term));
        self.acc(" }");
    }

    fn write_stat_debug(&mut self, term: &Term) {
        self.acc("-{stat: ");
        self.acc(&dump(term));
        self.acc("}");
    }

    /// Statements separated by newlines at the current depth.
    fn write_block(&mut self, statements: &[Term]) -> RenderResult {
        for (i, statement) in statements.iter().enumerate() {
            if i > 0 {
                self.nl();
            }
            let mark = self.output.len();
            self.write_term(statement)?;
            // `(` at the start of a statement would continue the previous one
            // as a call.
            if i > 0 && self.output[mark..].starts_with('(') {
                self.output.insert(mark, ';');
            }
        }
        Ok(())
    }

    /// Indented body between a header and its closing keyword.
    fn write_nested(&mut self, body: &[Term]) -> RenderResult {
        if body.is_empty() {
            self.acc(" ");
            return Ok(());
        }
        self.nlindent();
        self.write_block(body)?;
        self.nldedent();
        Ok(())
    }

    fn write_list(&mut self, items: &[Term], separator: &str) -> RenderResult {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.acc(separator);
            }
            self.write_term(item)?;
        }
        Ok(())
    }

    /// Run a rule. Declining counts as not handled.
    fn apply(&mut self, rule: &Rule, subject: &Term) -> RenderResult<bool> {
        match eval_alternatives(rule, self, subject)? {
            Outcome::Matched(result) => result,
            Outcome::Declined => Ok(false),
        }
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    fn write_term(&mut self, term: &Term) -> RenderResult {
        let node = match term {
            Term::Node(node) => node,
            Term::List(items) => return self.write_block(items),
            leaf => {
                self.write_debug(leaf);
                return Ok(());
            }
        };
        let children = node.children.as_slice();

        match &node.tag {
            Tag::Nil => self.acc("nil"),
            Tag::Dots => self.acc("..."),
            Tag::True => self.acc("true"),
            Tag::False => self.acc("false"),
            Tag::Break => self.acc("break"),
            Tag::Number => match children {
                [Term::Num(n)] => self.acc(&format_number(*n)),
                _ => self.write_debug(term),
            },
            Tag::String => match children {
                [Term::Str(s)] => self.acc(&quote_string(s)),
                _ => self.write_debug(term),
            },
            Tag::Id => match children {
                [Term::Str(name)] if is_ident(name) => self.acc(name),
                _ => {
                    self.acc("-{");
                    self.acc(&dump(term));
                    self.acc("}");
                }
            },
            Tag::Function => match children {
                [Term::List(params), Term::List(body)] => {
                    self.acc("function ");
                    self.write_function_tail(params, body)?;
                }
                _ => self.write_debug(term),
            },
            Tag::Table => self.write_table(children)?,
            Tag::Op => self.write_op(term, children)?,
            Tag::Paren => match children {
                [inner] => {
                    self.acc("(");
                    self.write_term(inner)?;
                    self.acc(")");
                }
                _ => self.write_debug(term),
            },
            Tag::Call => match children {
                [callee, args @ ..] => {
                    self.write_prefix(callee)?;
                    self.write_args(term, args)?;
                }
                _ => self.write_debug(term),
            },
            Tag::Invoke => match children {
                [object, method, args @ ..] if method.string_value().is_some_and(is_ident) => {
                    self.write_prefix(object)?;
                    self.acc(":");
                    self.acc(method.string_value().unwrap_or_default());
                    self.write_args(term, args)?;
                }
                _ => self.write_debug(term),
            },
            Tag::Index => self.write_index(term, children)?,
            Tag::Do => {
                self.acc("do");
                self.write_nested(children)?;
                self.acc("end");
            }
            Tag::Set => self.write_set(term, children)?,
            Tag::While => match children {
                [cond, Term::List(body)] => {
                    self.acc("while ");
                    self.write_term(cond)?;
                    self.acc(" do");
                    self.write_nested(body)?;
                    self.acc("end");
                }
                _ => self.write_debug(term),
            },
            Tag::Repeat => match children {
                [Term::List(body), cond] => {
                    self.acc("repeat");
                    self.write_nested(body)?;
                    self.acc("until ");
                    self.write_term(cond)?;
                }
                _ => self.write_debug(term),
            },
            Tag::If => self.write_if(term, children)?,
            Tag::Fornum => self.write_fornum(term, children)?,
            Tag::Forin => match children {
                [Term::List(names), Term::List(exprs), Term::List(body)] => {
                    self.acc("for ");
                    self.write_list(names, ", ")?;
                    self.acc(" in ");
                    self.write_list(exprs, ", ")?;
                    self.acc(" do");
                    self.write_nested(body)?;
                    self.acc("end");
                }
                _ => self.write_debug(term),
            },
            Tag::Local => {
                if !self.apply(&LOCAL, term)? {
                    self.write_stat_debug(term);
                }
            }
            Tag::Localrec => {
                if !self.apply(&LOCAL_FUNCTION, term)? {
                    self.write_stat_debug(term);
                }
            }
            Tag::Goto => match children {
                [Term::Str(label)] if is_ident(label) => {
                    self.acc("goto ");
                    self.acc(label);
                }
                _ => self.write_debug(term),
            },
            Tag::Label => match children {
                [Term::Str(label)] if is_ident(label) => {
                    self.acc("::");
                    self.acc(label);
                    self.acc("::");
                }
                _ => self.write_debug(term),
            },
            Tag::Return => {
                self.acc("return");
                if !children.is_empty() {
                    self.acc(" ");
                    self.write_list(children, ", ")?;
                }
            }
            Tag::Pair | Tag::Extension(_) => self.write_debug(term),
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// `(params) body end`
    fn write_function_tail(&mut self, params: &[Term], body: &[Term]) -> RenderResult {
        self.acc("(");
        self.write_list(params, ", ")?;
        self.acc(")");
        self.write_nested(body)?;
        self.acc("end");
        Ok(())
    }

    /// An expression in callee, invoked-object or indexed-base position.
    fn write_prefix(&mut self, term: &Term) -> RenderResult {
        let wrap = match top_operator(term) {
            Some(op) => needs_parens("index", op),
            None => !is_prefix(term),
        };
        if wrap {
            self.acc("(");
            self.write_term(term)?;
            self.acc(")");
        } else {
            self.write_term(term)?;
        }
        Ok(())
    }

    fn write_args(&mut self, call: &Term, args: &[Term]) -> RenderResult {
        if self.apply(&CALL_ARGS, call)? {
            return Ok(());
        }
        self.acc("(");
        self.write_list(args, ", ")?;
        self.acc(")");
        Ok(())
    }

    fn write_index(&mut self, term: &Term, children: &[Term]) -> RenderResult {
        if self.apply(&INDEX, term)? {
            return Ok(());
        }
        match children {
            [base, key] => {
                self.write_prefix(base)?;
                self.acc("[");
                self.write_term(key)?;
                self.acc("]");
            }
            _ => self.write_debug(term),
        }
        Ok(())
    }

    fn write_op(&mut self, term: &Term, children: &[Term]) -> RenderResult {
        if self.apply(&NOT_EQUAL, term)? {
            return Ok(());
        }
        match children {
            [Term::Str(op), operand] => match unary_symbol(op) {
                Some(symbol) => {
                    self.acc(symbol);
                    self.write_operand(op, operand)?;
                }
                None => self.write_debug(term),
            },
            [Term::Str(op), left, right] if binary_symbol(op).is_some() => {
                self.write_binary(op, left, right)?;
            }
            _ => self.write_debug(term),
        }
        Ok(())
    }

    fn write_binary(&mut self, op: &str, left: &Term, right: &Term) -> RenderResult {
        self.write_operand(op, left)?;
        self.acc(binary_symbol(op).unwrap_or(" ? "));
        self.write_operand(op, right)
    }

    fn write_operand(&mut self, parent: &str, operand: &Term) -> RenderResult {
        if top_operator(operand).is_some_and(|child| needs_parens(parent, child)) {
            self.acc("(");
            self.write_term(operand)?;
            self.acc(")");
            Ok(())
        } else {
            self.write_term(operand)
        }
    }

    fn write_table(&mut self, items: &[Term]) -> RenderResult {
        match items {
            [] => self.acc("{ }"),
            [item] => {
                self.acc("{ ");
                self.write_table_item(item)?;
                self.acc(" }");
            }
            _ => {
                self.acc("{");
                self.nlindent();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.acc(",");
                        self.nl();
                    }
                    self.write_table_item(item)?;
                }
                self.nldedent();
                self.acc("}");
            }
        }
        Ok(())
    }

    fn write_table_item(&mut self, item: &Term) -> RenderResult {
        match eval_alternatives(&TABLE_ITEM, self, item)? {
            Outcome::Matched(written) => {
                if !written? {
                    self.write_term(item)?;
                }
                Ok(())
            }
            Outcome::Declined => self.write_keyed_pair(item),
        }
    }

    /// `[key] = value`
    fn write_keyed_pair(&mut self, pair: &Term) -> RenderResult {
        match pair.children() {
            [key, value] => {
                self.acc("[");
                self.write_term(key)?;
                self.acc("] = ");
                self.write_term(value)?;
            }
            _ => self.write_debug(pair),
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn write_set(&mut self, term: &Term, children: &[Term]) -> RenderResult {
        if self.apply(&SET_SUGAR, term)? || self.apply(&SET_DISAMBIGUATION, term)? {
            return Ok(());
        }
        match children {
            [Term::List(targets), Term::List(values)] => {
                self.write_declared(targets, None)?;
                self.acc(" = ");
                self.write_list(values, ", ")?;
            }
            [Term::List(targets), Term::List(values), Term::List(annotations)] => {
                self.write_declared(targets, Some(annotations))?;
                self.acc(" = ");
                self.write_list(values, ", ")?;
            }
            _ => self.write_debug(term),
        }
        Ok(())
    }

    /// Targets or names, each optionally followed by ` #: annotation`.
    fn write_declared(&mut self, names: &[Term], annotations: Option<&[Term]>) -> RenderResult {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.acc(", ");
            }
            self.write_term(name)?;
            let annotation = annotations.and_then(|a| a.get(i));
            if let Some(annotation) = annotation.filter(|a| !matches!(a, Term::Bool(false))) {
                self.acc(" #: ");
                self.write_term(annotation)?;
            }
        }
        Ok(())
    }

    /// `local names [= values]`. Reports `false` when the captures are not
    /// lists.
    fn write_local(
        &mut self,
        names: &Term,
        values: &Term,
        annotations: Option<&Term>,
    ) -> RenderResult<bool> {
        let (Some(names), Some(values)) = (names.as_list(), values.as_list()) else {
            return Ok(false);
        };
        let annotations = match annotations.map(Term::as_list) {
            Some(None) => return Ok(false),
            Some(list) => list,
            None => None,
        };
        self.acc("local ");
        self.write_declared(names, annotations)?;
        if !values.is_empty() {
            self.acc(" = ");
            self.write_list(values, ", ")?;
        }
        Ok(true)
    }

    fn write_if(&mut self, term: &Term, children: &[Term]) -> RenderResult {
        if !is_if_shape(children) {
            self.write_debug(term);
            return Ok(());
        }
        for (i, clause) in children.chunks(2).enumerate() {
            match clause {
                [cond, body] => {
                    self.acc(if i == 0 { "if " } else { "elseif " });
                    self.write_term(cond)?;
                    self.acc(" then");
                    self.write_nested(body.children())?;
                }
                [otherwise] => {
                    self.acc("else");
                    self.write_nested(otherwise.children())?;
                }
                _ => {}
            }
        }
        self.acc("end");
        Ok(())
    }

    fn write_fornum(&mut self, term: &Term, children: &[Term]) -> RenderResult {
        let (var, first, last, step, body) = match children {
            [var, first, last, Term::List(body)] => (var, first, last, None, body),
            [var, first, last, step, Term::List(body)] => (var, first, last, Some(step), body),
            _ => {
                self.write_debug(term);
                return Ok(());
            }
        };
        self.acc("for ");
        self.write_term(var)?;
        self.acc(" = ");
        self.write_term(first)?;
        self.acc(", ");
        self.write_term(last)?;
        if let Some(step) = step {
            self.acc(", ");
            self.write_term(step)?;
        }
        self.acc(" do");
        self.write_nested(body)?;
        self.acc("end");
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Shape helpers
// -------------------------------------------------------------------------

/// Expressions that can be called, invoked or indexed without parentheses.
fn is_prefix(term: &Term) -> bool {
    matches!(
        term.tag(),
        Some(Tag::Id | Tag::Index | Tag::Call | Tag::Invoke | Tag::Paren)
    )
}

/// `a`, `a.b`, `a.b.c` with every part a valid identifier.
fn is_dotted_chain(term: &Term) -> bool {
    match term {
        Term::Node(Node {
            tag: Tag::Id,
            children,
            ..
        }) => matches!(children.as_slice(), [Term::Str(name)] if is_ident(name)),
        Term::Node(Node {
            tag: Tag::Index,
            children,
            ..
        }) => match children.as_slice() {
            [base, key] => is_dotted_chain(base) && key.string_value().is_some_and(is_ident),
            _ => false,
        },
        _ => false,
    }
}

/// Condition/body pairs, then an optional else body.
fn is_if_shape(children: &[Term]) -> bool {
    children.len() >= 2
        && children.chunks(2).all(|clause| match clause {
            [_, body] | [body] => body.as_list().is_some(),
            _ => false,
        })
}

/// Operator deciding whether `term` needs parentheses as an operand. Reads
/// `not (a == b)` as `ne` and negative number literals as unary minus.
fn top_operator(term: &Term) -> Option<&str> {
    match term.as_node()? {
        Node {
            tag: Tag::Op,
            children,
            ..
        } => {
            if NOT_EQUAL_SHAPES
                .iter()
                .any(|shape| matches(shape, term, &mut Captures::new()))
            {
                return Some("ne");
            }
            children.first().and_then(Term::as_str)
        }
        Node {
            tag: Tag::Number,
            children,
            ..
        } => match children.as_slice() {
            [Term::Num(n)] if n.is_sign_negative() && !n.is_nan() => Some("unm"),
            _ => None,
        },
        _ => None,
    }
}

fn binary_symbol(op: &str) -> Option<&'static str> {
    let symbol = match op {
        "add" => " + ",
        "sub" => " - ",
        "mul" => " * ",
        "div" => " / ",
        "mod" => " % ",
        "pow" => " ^ ",
        "concat" => " .. ",
        "eq" => " == ",
        "ne" => " ~= ",
        "lt" => " < ",
        "le" => " <= ",
        "and" => " and ",
        "or" => " or ",
        _ => return None,
    };
    Some(symbol)
}

fn unary_symbol(op: &str) -> Option<&'static str> {
    match op {
        "not" => Some("not "),
        "len" => Some("# "),
        "unm" => Some("-"),
        _ => None,
    }
}

fn captured_str<'t>(captures: &Captures<'t>, name: &str) -> Option<&'t str> {
    captures.get(name).and_then(Term::as_str)
}

fn captured_lists(captures: &Captures<'_>, names: &[&str]) -> bool {
    names
        .iter()
        .all(|name| captures.get(name).and_then(Term::as_list).is_some())
}

// -------------------------------------------------------------------------
// Rules
// -------------------------------------------------------------------------

fn alt(
    pattern: Pattern,
    action: impl Fn(&mut LuaWriter, &Captures<'_>) -> RenderResult<bool> + Send + Sync + 'static,
) -> Alternative<LuaWriter, RenderResult<bool>> {
    Alternative::new(pattern, action)
}

fn otherwise() -> Alternative<LuaWriter, RenderResult<bool>> {
    alt(Pattern::any(), |_, _| Ok(false))
}

/// `Function{ params, body }`
fn function_literal() -> Pattern {
    Pattern::tagged(Tag::Function, vec![bind("params"), bind("body")])
}

/// `Id{ name }`
fn id_named(name: &'static str) -> Pattern {
    Pattern::tagged(Tag::Id, vec![bind(name)])
}

/// `String{ name }`
fn string_named(name: &'static str) -> Pattern {
    Pattern::tagged(Tag::String, vec![bind(name)])
}

/// `not (a == b)`, with and without the explicit parentheses.
static NOT_EQUAL_SHAPES: LazyLock<[Pattern; 2]> = LazyLock::new(|| {
    let equal = || {
        Pattern::tagged(
            Tag::Op,
            vec![nest(Pattern::str("eq")), bind("left"), bind("right")],
        )
    };
    [
        Pattern::tagged(Tag::Op, vec![nest(Pattern::str("not")), nest(equal())]),
        Pattern::tagged(
            Tag::Op,
            vec![
                nest(Pattern::str("not")),
                nest(Pattern::tagged(Tag::Paren, vec![nest(equal())])),
            ],
        ),
    ]
});

static NOT_EQUAL: LazyLock<Rule> = LazyLock::new(|| {
    let mut rule: Rule = NOT_EQUAL_SHAPES
        .iter()
        .map(|shape| {
            alt(shape.clone(), |w, c| {
                w.write_binary("ne", c.require("left")?, c.require("right")?)?;
                Ok(true)
            })
        })
        .collect();
    rule.push(otherwise());
    rule
});

/// Function-definition sugar for assignments.
static SET_SUGAR: LazyLock<Rule> = LazyLock::new(|| {
    vec![
        // function a.b:m (params) ... end
        alt(
            Pattern::tagged(
                Tag::Set,
                vec![
                    nest(Pattern::list(vec![nest(Pattern::tagged(
                        Tag::Index,
                        vec![bind("base"), nest(string_named("method"))],
                    ))])),
                    nest(Pattern::list(vec![nest(Pattern::tagged(
                        Tag::Function,
                        vec![
                            nest_as(
                                "params",
                                Pattern::list(vec![nest(Pattern::tagged(
                                    Tag::Id,
                                    vec![nest(Pattern::str("self"))],
                                ))])
                                .open(),
                            ),
                            bind("body"),
                        ],
                    ))])),
                ],
            ),
            |w, c| {
                let params = c.require("params")?.children();
                let body = c.require("body")?.children();
                w.acc("function ");
                w.write_term(c.require("base")?)?;
                w.acc(":");
                w.acc(captured_str(c, "method").unwrap_or_default());
                w.acc(" ");
                w.write_function_tail(params.get(1..).unwrap_or_default(), body)?;
                Ok(true)
            },
        )
        .guard(|c| {
            c.get("base").is_some_and(is_dotted_chain)
                && captured_str(c, "method").is_some_and(is_ident)
                && captured_lists(c, &["params", "body"])
        }),
        // function a.b (params) ... end
        alt(
            Pattern::tagged(
                Tag::Set,
                vec![
                    nest(Pattern::list(vec![bind("target")])),
                    nest(Pattern::list(vec![nest(function_literal())])),
                ],
            ),
            |w, c| {
                w.acc("function ");
                w.write_term(c.require("target")?)?;
                w.acc(" ");
                w.write_function_tail(
                    c.require("params")?.children(),
                    c.require("body")?.children(),
                )?;
                Ok(true)
            },
        )
        .guard(|c| {
            c.get("target").is_some_and(is_dotted_chain) && captured_lists(c, &["params", "body"])
        }),
        otherwise(),
    ]
});

/// A leading target whose name is not an identifier is parenthesized so its
/// debug form cannot be mistaken for the start of a statement.
static SET_DISAMBIGUATION: LazyLock<Rule> = LazyLock::new(|| {
    vec![
        alt(
            Pattern::tagged(
                Tag::Set,
                vec![
                    nest_as("targets", Pattern::list(vec![nest(id_named("name"))]).open()),
                    bind("values"),
                ],
            ),
            |w, c| {
                let targets = c.require("targets")?.children();
                let values = c.require("values")?.children();
                if let [first, rest @ ..] = targets {
                    w.acc("(");
                    w.write_term(first)?;
                    w.acc(")");
                    for target in rest {
                        w.acc(", ");
                        w.write_term(target)?;
                    }
                }
                w.acc(" = ");
                w.write_list(values, ", ")?;
                Ok(true)
            },
        )
        .guard(|c| {
            captured_str(c, "name").is_some_and(|name| !is_ident(name))
                && captured_lists(c, &["targets", "values"])
        }),
        otherwise(),
    ]
});

static LOCAL: LazyLock<Rule> = LazyLock::new(|| {
    vec![
        // No variables: not expressible as source.
        alt(
            Pattern::tagged(Tag::Local, vec![nest(Pattern::list(vec![])), absent()]).open(),
            |_, _| Ok(false),
        ),
        alt(
            Pattern::tagged(Tag::Local, vec![bind("names"), bind("values")]),
            |w, c| w.write_local(c.require("names")?, c.require("values")?, None),
        ),
        alt(
            Pattern::tagged(
                Tag::Local,
                vec![bind("names"), bind("values"), bind("annotations")],
            ),
            |w, c| {
                w.write_local(
                    c.require("names")?,
                    c.require("values")?,
                    Some(c.require("annotations")?),
                )
            },
        ),
        otherwise(),
    ]
});

static LOCAL_FUNCTION: LazyLock<Rule> = LazyLock::new(|| {
    vec![
        alt(
            Pattern::tagged(
                Tag::Localrec,
                vec![
                    nest(Pattern::list(vec![nest(id_named("name"))])),
                    nest(Pattern::list(vec![nest(function_literal())])),
                ],
            ),
            |w, c| {
                w.acc("local function ");
                w.acc(captured_str(c, "name").unwrap_or_default());
                w.acc(" ");
                w.write_function_tail(
                    c.require("params")?.children(),
                    c.require("body")?.children(),
                )?;
                Ok(true)
            },
        )
        .guard(|c| {
            captured_str(c, "name").is_some_and(is_ident) && captured_lists(c, &["params", "body"])
        }),
        otherwise(),
    ]
});

/// Parentheses are dropped around a sole string or table argument.
static CALL_ARGS: LazyLock<Rule> = LazyLock::new(|| {
    let sole_argument = |tag: Tag, leading: usize| {
        let arg = match tag {
            Tag::Table => Pattern::tagged(Tag::Table, vec![]).open(),
            other => Pattern::tagged(other, vec![absent()]),
        };
        let mut items: Vec<_> = (0..leading).map(|_| absent()).collect();
        items.push(nest_as("arg", arg));
        items
    };
    let write_sole = |w: &mut LuaWriter, c: &Captures<'_>| -> RenderResult<bool> {
        w.acc(" ");
        w.write_term(c.require("arg")?)?;
        Ok(true)
    };
    vec![
        alt(Pattern::tagged(Tag::Call, sole_argument(Tag::String, 1)), write_sole),
        alt(Pattern::tagged(Tag::Call, sole_argument(Tag::Table, 1)), write_sole),
        alt(Pattern::tagged(Tag::Invoke, sole_argument(Tag::String, 2)), write_sole),
        alt(Pattern::tagged(Tag::Invoke, sole_argument(Tag::Table, 2)), write_sole),
        otherwise(),
    ]
});

/// `base.key` when the key is an identifier.
static INDEX: LazyLock<Rule> = LazyLock::new(|| {
    vec![
        alt(
            Pattern::tagged(Tag::Index, vec![bind("base"), nest(string_named("key"))]),
            |w, c| {
                w.write_prefix(c.require("base")?)?;
                w.acc(".");
                w.acc(captured_str(c, "key").unwrap_or_default());
                Ok(true)
            },
        )
        .guard(|c| captured_str(c, "key").is_some_and(is_ident)),
        otherwise(),
    ]
});

/// Table constructor items. A declined identifier pair is written as a
/// `[key] = value` pair by the caller, anything else as a bare value.
static TABLE_ITEM: LazyLock<Rule> = LazyLock::new(|| {
    vec![
        alt(
            Pattern::tagged(Tag::Pair, vec![nest(string_named("key")), bind("value")]),
            |w, c| {
                w.acc(captured_str(c, "key").unwrap_or_default());
                w.acc(" = ");
                w.write_term(c.require("value")?)?;
                Ok(true)
            },
        )
        .guard(|c| captured_str(c, "key").is_some_and(is_ident)),
        alt(
            Pattern::tagged(Tag::Pair, vec![bind("key"), bind("value")]),
            |w, c| {
                w.acc("[");
                w.write_term(c.require("key")?)?;
                w.acc("] = ");
                w.write_term(c.require("value")?)?;
                Ok(true)
            },
        ),
        alt(Pattern::any(), |_, _| Ok(false)),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    fn render(term: Term) -> String {
        LuaWriter::new().render_term(&term).unwrap()
    }

    fn render_block(block: Vec<Term>) -> String {
        LuaWriter::emit(&block).unwrap()
    }

    fn call(name: &str) -> Term {
        Term::call(Term::id(name), vec![])
    }

    #[test]
    fn test_precedence_drops_needless_parens() {
        let expr = Term::binop(
            "add",
            Term::id("a"),
            Term::binop("mul", Term::id("b"), Term::id("c")),
        );
        assert_eq!(render(expr), "a + b * c");
    }

    #[test]
    fn test_precedence_keeps_needed_parens() {
        let expr = Term::binop(
            "mul",
            Term::binop("add", Term::id("a"), Term::id("b")),
            Term::id("c"),
        );
        assert_eq!(render(expr), "(a + b) * c");
    }

    #[test]
    fn test_equal_rank_parenthesizes() {
        let expr = Term::binop(
            "sub",
            Term::binop("sub", Term::id("a"), Term::id("b")),
            Term::id("c"),
        );
        assert_eq!(render(expr), "(a - b) - c");
    }

    #[test]
    fn test_not_equal_rewrite() {
        let eq = Term::binop("eq", Term::id("a"), Term::id("b"));
        assert_eq!(render(Term::unop("not", eq.clone())), "a ~= b");
        assert_eq!(render(Term::unop("not", Term::paren(eq))), "a ~= b");
    }

    #[test]
    fn test_not_equal_as_operand() {
        let ne = Term::unop("not", Term::binop("eq", Term::id("a"), Term::id("b")));
        let expr = Term::binop("eq", ne, Term::id("c"));
        assert_eq!(render(expr), "(a ~= b) == c");
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(render(Term::unop("len", Term::id("t"))), "# t");
        assert_eq!(
            render(Term::unop("not", Term::id("x"))),
            "not x"
        );
        assert_eq!(
            render(Term::unop(
                "unm",
                Term::binop("pow", Term::id("x"), Term::number(2))
            )),
            "-x ^ 2"
        );
        assert_eq!(
            render(Term::binop(
                "pow",
                Term::unop("unm", Term::id("x")),
                Term::number(2)
            )),
            "(-x) ^ 2"
        );
    }

    #[test]
    fn test_negative_numbers_rank_as_unary() {
        assert_eq!(render(Term::unop("unm", Term::number(-1))), "-(-1)");
        assert_eq!(
            render(Term::binop("sub", Term::number(2), Term::number(-1))),
            "2 - -1"
        );
        assert_eq!(
            render(Term::binop("pow", Term::number(-2), Term::number(2))),
            "(-2) ^ 2"
        );
    }

    #[test]
    fn test_method_definition_sugar() {
        let set = Term::set(
            vec![Term::field(Term::id("x"), "y")],
            vec![Term::function(
                vec![Term::id("self")],
                vec![Term::ret(vec![Term::id("self")])],
            )],
        );
        assert_eq!(render(set), "function x:y ()\n   return self\nend");
    }

    #[test]
    fn test_method_definition_keeps_other_params() {
        let set = Term::set(
            vec![Term::field(Term::field(Term::id("a"), "b"), "c")],
            vec![Term::function(
                vec![Term::id("self"), Term::id("n"), Term::dots()],
                vec![],
            )],
        );
        assert_eq!(render(set), "function a.b:c (n, ...) end");
    }

    #[test]
    fn test_function_definition_sugar() {
        let set = Term::set(
            vec![Term::field(Term::id("x"), "y")],
            vec![Term::function(vec![Term::id("a")], vec![])],
        );
        assert_eq!(render(set), "function x.y (a) end");
    }

    #[test]
    fn test_no_sugar_for_computed_target() {
        let set = Term::set(
            vec![Term::index(Term::id("t"), Term::number(1))],
            vec![Term::function(vec![Term::id("self")], vec![])],
        );
        assert_eq!(render(set), "t[1] = function (self) end");
    }

    #[test]
    fn test_multiple_assignment() {
        let set = Term::set(
            vec![Term::id("a"), Term::id("b")],
            vec![Term::id("b"), Term::id("a")],
        );
        assert_eq!(render(set), "a, b = b, a");
    }

    #[test]
    fn test_invalid_leading_target_is_parenthesized() {
        let set = Term::set(vec![Term::id("end"), Term::id("x")], vec![Term::number(1)]);
        assert_eq!(render(set), "(-{`Id \"end\"}), x = 1");
    }

    #[test]
    fn test_annotated_assignment() {
        let set = Term::node(
            Tag::Set,
            vec![
                Term::List(vec![Term::id("x"), Term::id("y")]),
                Term::List(vec![Term::number(1), Term::number(2)]),
                Term::List(vec![Term::id("T"), Term::Bool(false)]),
            ],
        );
        assert_eq!(render(set), "x #: T, y = 1, 2");
    }

    #[test]
    fn test_tables() {
        assert_eq!(render(Term::table(vec![])), "{ }");
        assert_eq!(render(Term::table(vec![Term::number(1)])), "{ 1 }");
        assert_eq!(
            render(Term::table(vec![Term::pair(
                Term::string("key"),
                Term::boolean(true)
            )])),
            "{ key = true }"
        );
        assert_eq!(
            render(Term::table(vec![Term::pair(
                Term::string("not ident"),
                Term::number(1)
            )])),
            "{ [\"not ident\"] = 1 }"
        );
        assert_eq!(
            render(Term::table(vec![
                Term::pair(Term::string("k"), Term::number(1)),
                Term::pair(Term::number(2), Term::number(3)),
                Term::string("v"),
            ])),
            "{\n   k = 1,\n   [2] = 3,\n   \"v\"\n}"
        );
    }

    #[test]
    fn test_nested_table_indentation() {
        let local = Term::local(
            vec![Term::id("t")],
            vec![Term::table(vec![Term::number(1), Term::number(2)])],
        );
        assert_eq!(render(local), "local t = {\n   1,\n   2\n}");
    }

    #[test]
    fn test_zero_variable_local_falls_back() {
        let local = Term::local(vec![], vec![]);
        assert_eq!(render(local), "-{stat: `Local{ { }, { } }}");
    }

    #[test]
    fn test_locals() {
        assert_eq!(render(Term::local(vec![Term::id("x")], vec![])), "local x");
        assert_eq!(
            render(Term::local(
                vec![Term::id("x"), Term::id("y")],
                vec![Term::number(1)]
            )),
            "local x, y = 1"
        );
        let annotated = Term::node(
            Tag::Local,
            vec![
                Term::List(vec![Term::id("x")]),
                Term::List(vec![Term::number(1)]),
                Term::List(vec![Term::id("number")]),
            ],
        );
        assert_eq!(render(annotated), "local x #: number = 1");
    }

    #[test]
    fn test_local_function() {
        let localrec = Term::localrec(
            Term::id("f"),
            Term::function(
                vec![Term::id("a"), Term::dots()],
                vec![Term::ret(vec![Term::id("a")])],
            ),
        );
        assert_eq!(render(localrec), "local function f (a, ...)\n   return a\nend");
    }

    #[test]
    fn test_local_function_with_invalid_name_falls_back() {
        let localrec = Term::localrec(Term::id("end"), Term::function(vec![], vec![]));
        assert_eq!(
            render(localrec),
            "-{stat: `Localrec{ { `Id \"end\" }, { `Function{ { }, { } } } }}"
        );
    }

    #[test]
    fn test_invalid_identifier() {
        assert_eq!(render(Term::id("end")), "-{`Id \"end\"}");
        assert_eq!(render(Term::id("a b")), "-{`Id \"a b\"}");
    }

    #[test]
    fn test_call_argument_sugar() {
        assert_eq!(
            render(Term::call(Term::id("f"), vec![Term::string("x")])),
            "f \"x\""
        );
        assert_eq!(
            render(Term::call(Term::id("f"), vec![Term::table(vec![])])),
            "f { }"
        );
        assert_eq!(
            render(Term::call(Term::id("f"), vec![Term::number(1)])),
            "f(1)"
        );
        assert_eq!(
            render(Term::call(
                Term::id("f"),
                vec![Term::string("x"), Term::number(1)]
            )),
            "f(\"x\", 1)"
        );
    }

    #[test]
    fn test_invoke() {
        assert_eq!(
            render(Term::invoke(Term::id("obj"), "m", vec![Term::number(1)])),
            "obj:m(1)"
        );
        assert_eq!(
            render(Term::invoke(Term::id("obj"), "m", vec![Term::string("s")])),
            "obj:m \"s\""
        );
        assert_eq!(
            render(Term::invoke(Term::string("s"), "len", vec![])),
            "(\"s\"):len()"
        );
    }

    #[test]
    fn test_index_forms() {
        assert_eq!(render(Term::field(Term::id("t"), "x")), "t.x");
        assert_eq!(
            render(Term::field(Term::id("t"), "not ident")),
            "t[\"not ident\"]"
        );
        assert_eq!(
            render(Term::index(Term::id("t"), Term::number(1))),
            "t[1]"
        );
        assert_eq!(
            render(Term::field(
                Term::binop("add", Term::id("a"), Term::id("b")),
                "x"
            )),
            "(a + b).x"
        );
        assert_eq!(
            render(Term::field(Term::paren(call("f")), "x")),
            "(f()).x"
        );
    }

    #[test]
    fn test_if_chain() {
        let stat = Term::if_chain(
            vec![
                (Term::id("a"), vec![call("b")]),
                (Term::id("c"), vec![call("d")]),
            ],
            Some(vec![call("e")]),
        );
        assert_eq!(
            render(stat),
            "if a then\n   b()\nelseif c then\n   d()\nelse\n   e()\nend"
        );
    }

    #[test]
    fn test_loops() {
        assert_eq!(
            render(Term::fornum(
                Term::id("i"),
                Term::number(1),
                Term::number(10),
                Some(Term::number(2)),
                vec![]
            )),
            "for i = 1, 10, 2 do end"
        );
        assert_eq!(
            render(Term::fornum(
                Term::id("i"),
                Term::number(1),
                Term::number(10),
                None,
                vec![Term::break_stmt()]
            )),
            "for i = 1, 10 do\n   break\nend"
        );
        assert_eq!(
            render(Term::forin(
                vec![Term::id("k"), Term::id("v")],
                vec![Term::call(Term::id("pairs"), vec![Term::id("t")])],
                vec![]
            )),
            "for k, v in pairs(t) do end"
        );
        assert_eq!(
            render(Term::while_loop(Term::id("x"), vec![call("f")])),
            "while x do\n   f()\nend"
        );
        assert_eq!(
            render(Term::repeat(vec![call("f")], Term::id("x"))),
            "repeat\n   f()\nuntil x"
        );
        assert_eq!(render(Term::repeat(vec![], Term::id("x"))), "repeat until x");
    }

    #[test]
    fn test_simple_statements() {
        assert_eq!(render(Term::do_block(vec![])), "do end");
        assert_eq!(render(Term::ret(vec![])), "return");
        assert_eq!(
            render(Term::ret(vec![Term::number(1), Term::nil()])),
            "return 1, nil"
        );
        assert_eq!(render(Term::goto("done")), "goto done");
        assert_eq!(render(Term::label("done")), "::done::");
    }

    #[test]
    fn test_function_literal() {
        let local = Term::local(
            vec![Term::id("f")],
            vec![Term::function(vec![], vec![])],
        );
        assert_eq!(render(local), "local f = function () end");
    }

    #[test]
    fn test_literals() {
        assert_eq!(render(Term::string("a\"b")), "\"a\\\"b\"");
        assert_eq!(render(Term::number(0.5)), "0.5");
        assert_eq!(render(Term::dots()), "...");
        assert_eq!(render(Term::boolean(false)), "false");
    }

    #[test]
    fn test_extension_node_falls_back() {
        let node = Term::node(Tag::Extension("Splice".into()), vec![Term::id("a")]);
        assert_eq!(render(node), "-{ `Splice{ `Id \"a\" } }");
    }

    #[test]
    fn test_statement_starting_with_paren_is_separated() {
        let block = vec![
            Term::set(vec![Term::id("x")], vec![Term::id("y")]),
            Term::call(
                Term::binop("or", Term::id("f"), Term::id("g")),
                vec![],
            ),
        ];
        assert_eq!(render_block(block), "x = y\n;(f or g)()");
    }

    #[test]
    fn test_custom_indent() {
        let block = vec![Term::do_block(vec![Term::break_stmt()])];
        let text = LuaWriter::with_indent("\t").render(&block).unwrap();
        assert_eq!(text, "do\n\tbreak\nend");
    }

    #[test]
    fn test_writer_trait() {
        assert_eq!(LUA_WRITER.language(), "lua");
        assert_eq!(LUA_WRITER.extension(), "lua");
        let text = LUA_WRITER.write(&vec![Term::break_stmt()]).unwrap();
        assert_eq!(text, "break");
    }
}
