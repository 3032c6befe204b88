//! In-process reference backend.
//!
//! Compiling checks that the tree is well formed for execution and wraps it
//! as the main prototype; assembling writes the binary format.

use super::{Backend, BackendError};
use crate::bytecode;
use crate::proto::Proto;
use luma_syntax::{Block, Node, Tag, Term};

type Result<T> = std::result::Result<T, BackendError>;

/// Operators with their operand count.
const OPERATORS: &[(&str, usize)] = &[
    ("add", 2),
    ("sub", 2),
    ("mul", 2),
    ("div", 2),
    ("mod", 2),
    ("pow", 2),
    ("concat", 2),
    ("eq", 2),
    ("lt", 2),
    ("le", 2),
    ("and", 2),
    ("or", 2),
    ("not", 1),
    ("len", 1),
    ("unm", 1),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl Backend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn compile(&self, block: &Block, source: &str) -> Result<Proto> {
        Checker::new(true).block(block)?;
        Ok(Proto::main(source, block.clone()))
    }

    fn assemble(&self, proto: &Proto) -> Result<Vec<u8>> {
        bytecode::encode(proto).map_err(|e| BackendError::new(e.to_string()))
    }
}

/// Validation state for one function body.
struct Checker<'t> {
    vararg: bool,
    loops: usize,
    /// Labels of each enclosing block of the current function.
    labels: Vec<Vec<&'t str>>,
    line: u32,
}

impl<'t> Checker<'t> {
    fn new(vararg: bool) -> Self {
        Self {
            vararg,
            loops: 0,
            labels: Vec::new(),
            line: 0,
        }
    }

    fn fail(&self, message: impl Into<String>) -> BackendError {
        let message = message.into();
        if self.line == 0 {
            BackendError::new(message)
        } else {
            BackendError::new(format!("line {}: {message}", self.line))
        }
    }

    fn block(&mut self, block: &'t [Term]) -> Result<()> {
        let mut labels = Vec::new();
        for stat in block {
            if let Some(Tag::Label) = stat.tag() {
                self.enter(stat);
                let name = self.leaf(stat)?;
                if labels.contains(&name) {
                    return Err(self.fail(format!("label '{name}' already defined")));
                }
                labels.push(name);
            }
        }
        self.labels.push(labels);
        let result = block.iter().try_for_each(|stat| self.statement(stat));
        self.labels.pop();
        result
    }

    fn loop_body(&mut self, body: &'t [Term]) -> Result<()> {
        self.loops += 1;
        let result = self.block(body);
        self.loops -= 1;
        result
    }

    fn enter(&mut self, term: &Term) {
        if let Some(span) = term.span() {
            self.line = span.line;
        }
    }

    fn node(&self, term: &'t Term, position: &str) -> Result<&'t Node> {
        match term {
            Term::Node(node) => Ok(node),
            Term::List(_) => Err(self.fail(format!("list in {position} position"))),
            _ => Err(self.fail(format!("bare leaf in {position} position"))),
        }
    }

    fn list(&self, children: &'t [Term], i: usize) -> Result<&'t [Term]> {
        children
            .get(i)
            .and_then(Term::as_list)
            .ok_or_else(|| self.fail("malformed tree: expected a list"))
    }

    fn leaf(&self, term: &'t Term) -> Result<&'t str> {
        term.children()
            .first()
            .and_then(Term::as_str)
            .ok_or_else(|| self.fail(format!("malformed `{}` node", tag_name(term))))
    }

    fn statement(&mut self, stat: &'t Term) -> Result<()> {
        let node = self.node(stat, "statement")?;
        self.enter(stat);
        let c = node.children.as_slice();
        match &node.tag {
            Tag::Extension(name) => Err(self.fail(format!("extension node `{name}` has no executable form"))),
            Tag::Do => self.block(c),
            Tag::Set => {
                let targets = self.list(c, 0)?;
                if targets.is_empty() {
                    return Err(self.fail("assignment without targets"));
                }
                let values = self.list(c, 1)?;
                for target in targets {
                    self.target(target)?;
                }
                self.exprs(values)
            }
            Tag::Local => {
                let names = self.list(c, 0)?;
                if names.is_empty() {
                    return Err(self.fail("local declaration without names"));
                }
                let values = self.list(c, 1)?;
                self.names(names)?;
                self.exprs(values)
            }
            Tag::Localrec => match (self.list(c, 0)?, self.list(c, 1)?) {
                ([name], [function]) if function.is_tag(&Tag::Function) => {
                    self.names(std::slice::from_ref(name))?;
                    self.expr(function)
                }
                _ => Err(self.fail("malformed local function")),
            },
            Tag::While => match c {
                [cond, Term::List(body)] => {
                    self.expr(cond)?;
                    self.loop_body(body)
                }
                _ => Err(self.fail("malformed while")),
            },
            Tag::Repeat => match c {
                [Term::List(body), cond] => {
                    self.loop_body(body)?;
                    self.expr(cond)
                }
                _ => Err(self.fail("malformed repeat")),
            },
            Tag::If => {
                for clause in c.chunks(2) {
                    match clause {
                        [cond, Term::List(body)] => {
                            self.expr(cond)?;
                            self.block(body)?;
                        }
                        [Term::List(body)] => self.block(body)?,
                        _ => return Err(self.fail("malformed if")),
                    }
                }
                Ok(())
            }
            Tag::Fornum => match c {
                [var, bounds @ .., Term::List(body)] if (2..=3).contains(&bounds.len()) => {
                    self.names(std::slice::from_ref(var))?;
                    self.exprs(bounds)?;
                    self.loop_body(body)
                }
                _ => Err(self.fail("malformed numeric for")),
            },
            Tag::Forin => match c {
                [Term::List(names), Term::List(exprs), Term::List(body)]
                    if !names.is_empty() && !exprs.is_empty() =>
                {
                    self.names(names)?;
                    self.exprs(exprs)?;
                    self.loop_body(body)
                }
                _ => Err(self.fail("malformed generic for")),
            },
            Tag::Return => self.exprs(c),
            Tag::Break if self.loops == 0 => Err(self.fail("break outside a loop")),
            Tag::Break => Ok(()),
            Tag::Goto => {
                let label = self.leaf(stat)?;
                if self.labels.iter().any(|block| block.contains(&label)) {
                    Ok(())
                } else {
                    Err(self.fail(format!("no visible label '{label}' for goto")))
                }
            }
            Tag::Label => Ok(()),
            Tag::Call | Tag::Invoke => self.call(node),
            other => Err(self.fail(format!("unexpected `{other}` in statement position"))),
        }
    }

    fn names(&self, names: &'t [Term]) -> Result<()> {
        match names.iter().find(|name| name.id_name().is_none()) {
            Some(bad) => Err(self.fail(format!("expected a name, found `{}`", tag_name(bad)))),
            None => Ok(()),
        }
    }

    fn target(&mut self, target: &'t Term) -> Result<()> {
        match target.tag() {
            Some(Tag::Id | Tag::Index) => self.expr(target),
            _ => Err(self.fail(format!("cannot assign to `{}`", tag_name(target)))),
        }
    }

    fn exprs(&mut self, exprs: &'t [Term]) -> Result<()> {
        exprs.iter().try_for_each(|expr| self.expr(expr))
    }

    fn expr(&mut self, expr: &'t Term) -> Result<()> {
        let node = self.node(expr, "expression")?;
        self.enter(expr);
        let c = node.children.as_slice();
        match &node.tag {
            Tag::Extension(name) => Err(self.fail(format!("extension node `{name}` has no executable form"))),
            Tag::Nil | Tag::True | Tag::False => Ok(()),
            Tag::Number => match c {
                [Term::Num(_)] => Ok(()),
                _ => Err(self.fail("malformed `Number` node")),
            },
            Tag::String | Tag::Id => self.leaf(expr).map(|_| ()),
            Tag::Dots if self.vararg => Ok(()),
            Tag::Dots => Err(self.fail("cannot use '...' outside a vararg function")),
            Tag::Function => self.function(c),
            Tag::Table => {
                for item in c {
                    match item {
                        Term::Node(Node {
                            tag: Tag::Pair,
                            children,
                            ..
                        }) => match children.as_slice() {
                            [key, value] => {
                                self.expr(key)?;
                                self.expr(value)?;
                            }
                            _ => return Err(self.fail("malformed table field")),
                        },
                        other => self.expr(other)?,
                    }
                }
                Ok(())
            }
            Tag::Op => self.operator(c),
            Tag::Paren => match c {
                [inner] => self.expr(inner),
                _ => Err(self.fail("malformed parenthesized expression")),
            },
            Tag::Call | Tag::Invoke => self.call(node),
            Tag::Index => match c {
                [base, key] => {
                    self.expr(base)?;
                    self.expr(key)
                }
                _ => Err(self.fail("malformed index")),
            },
            other => Err(self.fail(format!("unexpected `{other}` in expression position"))),
        }
    }

    fn operator(&mut self, c: &'t [Term]) -> Result<()> {
        let Some((Term::Str(op), operands)) = c.split_first() else {
            return Err(self.fail("malformed operator"));
        };
        match OPERATORS.iter().find(|(name, _)| name == op) {
            Some((_, arity)) if *arity == operands.len() => self.exprs(operands),
            Some((_, arity)) => Err(self.fail(format!(
                "operator `{op}` takes {arity} operand(s), found {}",
                operands.len()
            ))),
            None => Err(self.fail(format!("unknown operator `{op}`"))),
        }
    }

    fn call(&mut self, node: &'t Node) -> Result<()> {
        match (&node.tag, node.children.as_slice()) {
            (Tag::Call, [callee, args @ ..]) => {
                self.expr(callee)?;
                self.exprs(args)
            }
            (Tag::Invoke, [object, method, args @ ..]) if method.string_value().is_some() => {
                self.expr(object)?;
                self.exprs(args)
            }
            _ => Err(self.fail(format!("malformed `{}`", node.tag))),
        }
    }

    fn function(&mut self, c: &'t [Term]) -> Result<()> {
        let params = self.list(c, 0)?;
        let body = self.list(c, 1)?;
        let vararg = match params.split_last() {
            Some((last, init)) if last.is_tag(&Tag::Dots) => {
                self.names(init)?;
                true
            }
            _ => {
                self.names(params)?;
                false
            }
        };
        let mut inner = Checker::new(vararg);
        inner.line = self.line;
        let result = inner.block(body);
        self.line = inner.line;
        result
    }
}

fn tag_name(term: &Term) -> String {
    match term {
        Term::Node(node) => node.tag.to_string(),
        Term::List(_) => "list".to_string(),
        Term::Str(_) => "string".to_string(),
        Term::Num(_) => "number".to_string(),
        Term::Bool(_) => "boolean".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luma_syntax::read_lua;

    fn compile(source: &str) -> Result<Proto> {
        NativeBackend.compile(&read_lua(source).unwrap(), "=(test)")
    }

    #[test]
    fn test_compile_wraps_main_chunk() {
        let proto = compile("local x = ... return x").unwrap();
        assert_eq!(proto.source, "=(test)");
        assert!(proto.is_vararg);
        assert!(proto.params.is_empty());
        assert_eq!(proto.body.len(), 2);
    }

    #[test]
    fn test_break_outside_loop() {
        let err = compile("if x then break end").unwrap_err();
        assert_eq!(err.message, "line 1: break outside a loop");
        assert!(compile("while true do if x then break end end").is_ok());
        assert!(compile("while true do local f = function() break end end").is_err());
    }

    #[test]
    fn test_dots_outside_vararg_function() {
        assert!(compile("return ...").is_ok());
        assert!(compile("function f(...) return ... end").is_ok());
        let err = compile("function f()\nreturn ...\nend").unwrap_err();
        assert_eq!(err.message, "line 2: cannot use '...' outside a vararg function");
    }

    #[test]
    fn test_goto_needs_visible_label() {
        assert!(compile("goto done do end ::done::").is_ok());
        assert!(compile("::top:: do goto top end").is_ok());
        assert!(compile("do ::inner:: end goto inner").is_err());
        assert!(compile("::a:: ::a::").is_err());
        assert!(compile("::l:: local f = function() goto l end").is_err());
    }

    #[test]
    fn test_rejects_malformed_trees() {
        let block = vec![Term::number(1)];
        assert!(NativeBackend.compile(&block, "=t").is_err());

        let block = vec![Term::set(vec![Term::call(Term::id("f"), vec![])], vec![Term::nil()])];
        let err = NativeBackend.compile(&block, "=t").unwrap_err();
        assert_eq!(err.message, "cannot assign to `Call`");

        let block = vec![Term::ret(vec![Term::unop("add", Term::number(1))])];
        assert!(NativeBackend.compile(&block, "=t").is_err());

        let block = vec![Term::node(Tag::Extension("Quote".into()), vec![])];
        let err = NativeBackend.compile(&block, "=t").unwrap_err();
        assert_eq!(err.message, "extension node `Quote` has no executable form");
    }

    #[test]
    fn test_assemble_writes_header() {
        let proto = compile("return 1").unwrap();
        let bytes = NativeBackend.assemble(&proto).unwrap();
        assert!(bytecode::is_binary(&bytes));
    }
}
