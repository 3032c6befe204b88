//! Tree-walking evaluator.

use super::builtins;
use super::value::{Callable, Closure, Table, TableRef, Value};
use super::{MAX_CALL_DEPTH, RuntimeError};
use crate::proto::Proto;
use luma_syntax::{Node, Tag, Term};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::io::Write;
use std::rc::Rc;

type Result<T> = std::result::Result<T, RuntimeError>;

/// A variable slot shared by every closure that captures it.
type Cell = Rc<RefCell<Value>>;

fn cell(value: Value) -> Cell {
    Rc::new(RefCell::new(value))
}

/// Where `...` resolves from a scope.
enum Varargs {
    /// Block scope: ask the parent.
    Inherit,
    /// Function scope of a fixed-arity function.
    Absent,
    /// Function scope of a vararg function.
    Values(Rc<[Value]>),
}

/// A lexical scope.
///
/// Every `local` statement opens a new scope holding its names, so a closure
/// sees exactly the variables declared before it.
pub struct Scope {
    vars: Vec<(Rc<str>, Cell)>,
    parent: Option<Rc<Scope>>,
    varargs: Varargs,
}

impl Scope {
    fn nested(parent: &Rc<Scope>, vars: Vec<(Rc<str>, Cell)>) -> Rc<Scope> {
        Rc::new(Scope {
            vars,
            parent: Some(Rc::clone(parent)),
            varargs: Varargs::Inherit,
        })
    }

    /// Bind `names` to `values`, padding with nil.
    fn declare(parent: &Rc<Scope>, names: &[Term], mut values: Vec<Value>) -> Result<Rc<Scope>> {
        values.resize(names.len(), Value::Nil);
        let vars = names
            .iter()
            .zip(values)
            .map(|(name, value)| Ok((Rc::from(id_name(name)?), cell(value))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Scope::nested(parent, vars))
    }

    fn lookup(&self, name: &str) -> Option<Cell> {
        let mut scope = self;
        loop {
            if let Some((_, slot)) = scope.vars.iter().rev().find(|(n, _)| &**n == name) {
                return Some(Rc::clone(slot));
            }
            scope = scope.parent.as_deref()?;
        }
    }

    fn varargs(&self) -> Option<&Rc<[Value]>> {
        let mut scope = self;
        loop {
            match &scope.varargs {
                Varargs::Values(values) => return Some(values),
                Varargs::Absent => return None,
                Varargs::Inherit => scope = scope.parent.as_deref()?,
            }
        }
    }
}

/// How a statement finished.
enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
    Goto(String),
}

/// Assignment target, resolved before the right-hand side runs.
enum Place {
    Local(Cell),
    Global(Rc<str>),
    Field(TableRef, Value),
}

/// State of one top-level call.
pub struct Runtime<'o> {
    globals: TableRef,
    out: &'o mut dyn Write,
    depth: usize,
    /// Prototypes of nested functions, keyed by their `Function` node. Entries
    /// live as long as the runtime, so node addresses stay unique.
    closures: HashMap<*const Node, Rc<Proto>>,
    chunk: String,
    line: u32,
}

impl<'o> Runtime<'o> {
    pub(crate) fn new(source: &str, out: &'o mut dyn Write) -> Self {
        let mut globals = Table::new();
        builtins::install(&mut globals);
        Self {
            globals: Rc::new(RefCell::new(globals)),
            out,
            depth: 0,
            closures: HashMap::new(),
            chunk: chunk_display(source),
            line: 0,
        }
    }

    /// Run a main prototype with `args` as its arguments.
    pub(crate) fn run_main(&mut self, proto: &Proto, args: Vec<Value>) -> Result<Vec<Value>> {
        self.enter(None, proto, args).map_err(|e| self.locate(e))
    }

    pub(crate) fn call_value(&mut self, f: &Value, args: Vec<Value>) -> Result<Vec<Value>> {
        let Value::Function(callable) = f else {
            return Err(self.error(format!("attempt to call a {} value", f.type_name())));
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow);
        }
        self.depth += 1;
        let line = self.line;
        let result = match callable.as_ref() {
            Callable::Native(native) => (native.func)(self, args).map_err(|e| self.locate(e)),
            Callable::Closure(closure) => self.call_closure(closure, args),
        };
        self.line = line;
        self.depth -= 1;
        result
    }

    /// Write one line of program output.
    pub(crate) fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}").map_err(|e| RuntimeError::new(format!("cannot write output: {e}")))
    }

    /// `chunk:line:` of the statement being executed.
    pub(crate) fn location(&self) -> String {
        format!("{}:{}:", self.chunk, self.line)
    }

    /// An error raised at the current location.
    pub(crate) fn error(&self, message: impl Display) -> RuntimeError {
        RuntimeError::Error(format!("{} {message}", self.location()))
    }

    /// Attach the current location to an error raised without one.
    fn locate(&self, error: RuntimeError) -> RuntimeError {
        match error {
            RuntimeError::Unlocated(message) => self.error(message),
            other => other,
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Vec<Value>> {
        let proto = Rc::clone(&closure.proto);
        self.enter(Some(Rc::clone(&closure.env)), &proto, args)
    }

    fn enter(&mut self, env: Option<Rc<Scope>>, proto: &Proto, mut args: Vec<Value>) -> Result<Vec<Value>> {
        let fixed = proto.params.len();
        let extra = if args.len() > fixed {
            args.split_off(fixed)
        } else {
            Vec::new()
        };
        args.resize(fixed, Value::Nil);
        let scope = Rc::new(Scope {
            vars: proto
                .params
                .iter()
                .zip(args)
                .map(|(name, value)| (Rc::from(name.as_str()), cell(value)))
                .collect(),
            parent: env,
            varargs: if proto.is_vararg {
                Varargs::Values(Rc::from(extra))
            } else {
                Varargs::Absent
            },
        });
        match self.exec_block(&proto.body, &scope)? {
            Flow::Normal => Ok(Vec::new()),
            Flow::Return(values) => Ok(values),
            Flow::Break => Err(self.error("break outside a loop")),
            Flow::Goto(label) => Err(self.error(format!("no visible label '{label}' for goto"))),
        }
    }

    // Statements

    fn exec_block(&mut self, block: &[Term], scope: &Rc<Scope>) -> Result<Flow> {
        self.run_block(block, scope).map(|(flow, _)| flow)
    }

    /// Execute `block`, also returning the innermost scope it reached.
    fn run_block(&mut self, block: &[Term], scope: &Rc<Scope>) -> Result<(Flow, Rc<Scope>)> {
        let mut env = Rc::clone(scope);
        let mut labels: Vec<(&str, Rc<Scope>)> = Vec::new();
        let mut pc = 0;
        while let Some(stat) = block.get(pc) {
            if let Some(name) = label_name(stat) {
                labels.push((name, Rc::clone(&env)));
            }
            match self.exec_stat(stat, &mut env)? {
                Flow::Normal => pc += 1,
                Flow::Goto(label) => match find_label(block, &label) {
                    Some((target, name)) => {
                        let seen = labels
                            .iter()
                            .find(|(seen, _)| *seen == name)
                            .map(|(_, at)| Rc::clone(at));
                        match seen {
                            Some(at) => env = at,
                            None => labels.push((name, Rc::clone(&env))),
                        }
                        pc = target + 1;
                    }
                    None => return Ok((Flow::Goto(label), env)),
                },
                flow => return Ok((flow, env)),
            }
        }
        Ok((Flow::Normal, env))
    }

    fn exec_stat(&mut self, stat: &Term, env: &mut Rc<Scope>) -> Result<Flow> {
        let Term::Node(node) = stat else {
            return Err(self.error("malformed statement"));
        };
        if let Some(span) = node.span {
            self.line = span.line;
        }
        let c = &node.children;
        match &node.tag {
            Tag::Do => self.exec_block(c, env),
            Tag::Set => {
                let (targets, values) = (self.list(c, 0)?, self.list(c, 1)?);
                self.exec_set(targets, values, env)?;
                Ok(Flow::Normal)
            }
            Tag::Local => {
                let (names, exprs) = (self.list(c, 0)?, self.list(c, 1)?);
                let values = self.eval_list(exprs, env)?;
                *env = Scope::declare(env, names, values).map_err(|e| self.locate(e))?;
                Ok(Flow::Normal)
            }
            Tag::Localrec => {
                self.exec_localrec(c, env)?;
                Ok(Flow::Normal)
            }
            Tag::While => self.exec_while(c, env),
            Tag::Repeat => self.exec_repeat(c, env),
            Tag::If => self.exec_if(c, env),
            Tag::Fornum => self.exec_fornum(c, env),
            Tag::Forin => self.exec_forin(c, env),
            Tag::Return => Ok(Flow::Return(self.eval_list(c, env)?)),
            Tag::Break => Ok(Flow::Break),
            Tag::Goto => Ok(Flow::Goto(self.leaf_str(c)?.to_string())),
            Tag::Label => Ok(Flow::Normal),
            Tag::Call | Tag::Invoke => {
                self.eval_multi(stat, env)?;
                Ok(Flow::Normal)
            }
            other => Err(self.error(format!("unexpected `{other}` in statement position"))),
        }
    }

    fn exec_set(&mut self, targets: &[Term], values: &[Term], env: &Rc<Scope>) -> Result<()> {
        let mut places = Vec::with_capacity(targets.len());
        for target in targets {
            places.push(self.place(target, env)?);
        }
        let mut values = self.eval_list(values, env)?;
        values.resize(places.len(), Value::Nil);
        for (place, value) in places.into_iter().zip(values) {
            match place {
                Place::Local(slot) => *slot.borrow_mut() = value,
                Place::Global(name) => self.globals.borrow_mut().set_str(&name, value),
                Place::Field(table, key) => table
                    .borrow_mut()
                    .set(key, value)
                    .map_err(|e| self.locate(e))?,
            }
        }
        Ok(())
    }

    fn place(&mut self, target: &Term, env: &Rc<Scope>) -> Result<Place> {
        match target.tag() {
            Some(Tag::Id) => {
                let name = id_name(target)?;
                Ok(match env.lookup(name) {
                    Some(slot) => Place::Local(slot),
                    None => Place::Global(Rc::from(name)),
                })
            }
            Some(Tag::Index) => {
                let [base, key] = target.children() else {
                    return Err(self.error("malformed index"));
                };
                let object = self.eval(base, env)?;
                let Value::Table(table) = object else {
                    return Err(self.error(format!(
                        "attempt to index a {} value{}",
                        object.type_name(),
                        describe(base, env)
                    )));
                };
                Ok(Place::Field(table, self.eval(key, env)?))
            }
            _ => Err(self.error("cannot assign to this expression")),
        }
    }

    fn exec_localrec(&mut self, c: &[Term], env: &mut Rc<Scope>) -> Result<()> {
        let (Some(name), Some(function)) = (self.list(c, 0)?.first(), self.list(c, 1)?.first())
        else {
            return Err(self.error("malformed local function"));
        };
        let slot = cell(Value::Nil);
        let scope = Scope::nested(env, vec![(Rc::from(id_name(name)?), Rc::clone(&slot))]);
        let value = self.eval(function, &scope)?;
        *slot.borrow_mut() = value;
        *env = scope;
        Ok(())
    }

    /// One loop iteration. `Some` ends the loop with that flow.
    fn iterate(&mut self, body: &[Term], scope: &Rc<Scope>) -> Result<Option<Flow>> {
        Ok(match self.exec_block(body, scope)? {
            Flow::Normal => None,
            Flow::Break => Some(Flow::Normal),
            flow => Some(flow),
        })
    }

    fn exec_while(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Flow> {
        let [cond, Term::List(body)] = c else {
            return Err(self.error("malformed while"));
        };
        while self.eval(cond, env)?.truthy() {
            if let Some(flow) = self.iterate(body, env)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_repeat(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Flow> {
        let [Term::List(body), cond] = c else {
            return Err(self.error("malformed repeat"));
        };
        loop {
            // The condition sees the body's locals.
            let (flow, inner) = self.run_block(body, env)?;
            match flow {
                Flow::Normal => {}
                Flow::Break => return Ok(Flow::Normal),
                flow => return Ok(flow),
            }
            if self.eval(cond, &inner)?.truthy() {
                return Ok(Flow::Normal);
            }
        }
    }

    fn exec_if(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Flow> {
        for clause in c.chunks(2) {
            match clause {
                [cond, Term::List(body)] => {
                    if self.eval(cond, env)?.truthy() {
                        return self.exec_block(body, env);
                    }
                }
                [Term::List(body)] => return self.exec_block(body, env),
                _ => return Err(self.error("malformed if")),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_fornum(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Flow> {
        let [var, bounds @ .., Term::List(body)] = c else {
            return Err(self.error("malformed numeric for"));
        };
        if !(2..=3).contains(&bounds.len()) {
            return Err(self.error("malformed numeric for"));
        }
        let name: Rc<str> = Rc::from(id_name(var)?);
        let mut numbers = [0.0, 0.0, 1.0];
        for (slot, (expr, what)) in numbers
            .iter_mut()
            .zip(bounds.iter().zip(["initial value", "limit", "step"]))
        {
            let value = self.eval(expr, env)?;
            *slot = value
                .to_number()
                .ok_or_else(|| self.error(format!("'for' {what} must be a number")))?;
        }
        let [mut i, limit, step] = numbers;
        if step == 0.0 {
            return Err(self.error("'for' step is zero"));
        }
        while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
            let scope = Scope::nested(env, vec![(Rc::clone(&name), cell(Value::Number(i)))]);
            if let Some(flow) = self.iterate(body, &scope)? {
                return Ok(flow);
            }
            i += step;
        }
        Ok(Flow::Normal)
    }

    fn exec_forin(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Flow> {
        let [Term::List(names), Term::List(exprs), Term::List(body)] = c else {
            return Err(self.error("malformed generic for"));
        };
        let mut init = self.eval_list(exprs, env)?;
        init.resize(3, Value::Nil);
        let mut init = init.into_iter();
        let iterator = init.next().unwrap_or_default();
        let state = init.next().unwrap_or_default();
        let mut control = init.next().unwrap_or_default();
        loop {
            let mut results = self.call_value(&iterator, vec![state.clone(), control.clone()])?;
            results.resize(names.len().max(1), Value::Nil);
            if results[0].is_nil() {
                return Ok(Flow::Normal);
            }
            control = results[0].clone();
            let scope = Scope::declare(env, names, results).map_err(|e| self.locate(e))?;
            if let Some(flow) = self.iterate(body, &scope)? {
                return Ok(flow);
            }
        }
    }

    // Expressions

    fn eval(&mut self, expr: &Term, env: &Rc<Scope>) -> Result<Value> {
        let Term::Node(node) = expr else {
            return Err(self.error("malformed expression"));
        };
        let c = &node.children;
        match &node.tag {
            Tag::Nil => Ok(Value::Nil),
            Tag::True => Ok(Value::Bool(true)),
            Tag::False => Ok(Value::Bool(false)),
            Tag::Number => match c.first() {
                Some(Term::Num(n)) => Ok(Value::Number(*n)),
                _ => Err(self.error("malformed number")),
            },
            Tag::String => Ok(Value::str(self.leaf_str(c)?)),
            Tag::Dots => Ok(self.varargs(env)?.first().cloned().unwrap_or_default()),
            Tag::Function => self.closure(node, env),
            Tag::Table => self.eval_table(c, env),
            Tag::Op => self.eval_op(c, env),
            Tag::Paren => match c.first() {
                Some(inner) => self.eval(inner, env),
                None => Err(self.error("malformed parenthesized expression")),
            },
            Tag::Call | Tag::Invoke => Ok(self.eval_multi(expr, env)?.into_iter().next().unwrap_or_default()),
            Tag::Index => {
                let [base, key] = c.as_slice() else {
                    return Err(self.error("malformed index"));
                };
                let object = self.eval(base, env)?;
                let key = self.eval(key, env)?;
                self.index_value(&object, &key, base, env)
            }
            Tag::Id => {
                let name = id_name(expr)?;
                Ok(match env.lookup(name) {
                    Some(slot) => slot.borrow().clone(),
                    None => self.globals.borrow().get_str(name),
                })
            }
            other => Err(self.error(format!("unexpected `{other}` in expression position"))),
        }
    }

    /// Evaluate keeping every result of a call or `...`.
    fn eval_multi(&mut self, expr: &Term, env: &Rc<Scope>) -> Result<Vec<Value>> {
        match expr.tag() {
            Some(Tag::Call) => self.eval_call(expr.children(), env),
            Some(Tag::Invoke) => self.eval_invoke(expr.children(), env),
            Some(Tag::Dots) => Ok(self.varargs(env)?.to_vec()),
            _ => Ok(vec![self.eval(expr, env)?]),
        }
    }

    /// Evaluate an expression list; only the last expression may expand.
    fn eval_list(&mut self, exprs: &[Term], env: &Rc<Scope>) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        if let Some((last, init)) = exprs.split_last() {
            for expr in init {
                values.push(self.eval(expr, env)?);
            }
            values.extend(self.eval_multi(last, env)?);
        }
        Ok(values)
    }

    fn varargs(&self, env: &Rc<Scope>) -> Result<Rc<[Value]>> {
        env.varargs()
            .cloned()
            .ok_or_else(|| self.error("cannot use '...' outside a vararg function"))
    }

    fn closure(&mut self, node: &Node, env: &Rc<Scope>) -> Result<Value> {
        let key = node as *const Node;
        let proto = match self.closures.get(&key) {
            Some(proto) => Rc::clone(proto),
            None => {
                let proto = Rc::new(self.function_proto(node)?);
                self.closures.insert(key, Rc::clone(&proto));
                proto
            }
        };
        Ok(Value::Function(Rc::new(Callable::Closure(Closure {
            proto,
            env: Rc::clone(env),
        }))))
    }

    fn function_proto(&self, node: &Node) -> Result<Proto> {
        let (params, body) = (self.list(&node.children, 0)?, self.list(&node.children, 1)?);
        let is_vararg = params.last().is_some_and(|p| p.is_tag(&Tag::Dots));
        let names = params
            .iter()
            .filter(|p| !p.is_tag(&Tag::Dots))
            .map(|p| id_name(p).map(str::to_string))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| self.locate(e))?;
        Ok(Proto {
            source: self.chunk.clone(),
            params: names,
            is_vararg,
            body: body.to_vec(),
        })
    }

    fn eval_table(&mut self, items: &[Term], env: &Rc<Scope>) -> Result<Value> {
        let mut table = Table::new();
        let mut n = 0;
        for (i, item) in items.iter().enumerate() {
            if item.is_tag(&Tag::Pair) {
                let [key, value] = item.children() else {
                    return Err(self.error("malformed table field"));
                };
                let key = self.eval(key, env)?;
                let value = self.eval(value, env)?;
                table.set(key, value).map_err(|e| self.locate(e))?;
            } else if i + 1 == items.len() {
                for value in self.eval_multi(item, env)? {
                    n += 1;
                    table.set_int(n, value);
                }
            } else {
                let value = self.eval(item, env)?;
                n += 1;
                table.set_int(n, value);
            }
        }
        Ok(Value::table(table))
    }

    fn eval_call(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Vec<Value>> {
        let Some((callee, args)) = c.split_first() else {
            return Err(self.error("malformed call"));
        };
        let function = self.eval(callee, env)?;
        let args = self.eval_list(args, env)?;
        if !matches!(function, Value::Function(_)) {
            return Err(self.error(format!(
                "attempt to call a {} value{}",
                function.type_name(),
                describe(callee, env)
            )));
        }
        self.call_value(&function, args)
    }

    fn eval_invoke(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Vec<Value>> {
        let [object, method, args @ ..] = c else {
            return Err(self.error("malformed method call"));
        };
        let Some(name) = method.string_value() else {
            return Err(self.error("malformed method call"));
        };
        let receiver = self.eval(object, env)?;
        let function = self.index_value(&receiver, &Value::str(name), object, env)?;
        if !matches!(function, Value::Function(_)) {
            return Err(self.error(format!(
                "attempt to call a {} value (method '{name}')",
                function.type_name()
            )));
        }
        let mut all = vec![receiver];
        all.extend(self.eval_list(args, env)?);
        self.call_value(&function, all)
    }

    fn index_value(&self, object: &Value, key: &Value, expr: &Term, env: &Rc<Scope>) -> Result<Value> {
        match object {
            Value::Table(table) => Ok(table.borrow().get(key)),
            other => Err(self.error(format!(
                "attempt to index a {} value{}",
                other.type_name(),
                describe(expr, env)
            ))),
        }
    }

    fn eval_op(&mut self, c: &[Term], env: &Rc<Scope>) -> Result<Value> {
        let Some((Term::Str(op), operands)) = c.split_first() else {
            return Err(self.error("malformed operator"));
        };
        match (op.as_str(), operands) {
            ("and", [a, b]) => {
                let left = self.eval(a, env)?;
                if left.truthy() { self.eval(b, env) } else { Ok(left) }
            }
            ("or", [a, b]) => {
                let left = self.eval(a, env)?;
                if left.truthy() { Ok(left) } else { self.eval(b, env) }
            }
            ("not", [a]) => Ok(Value::Bool(!self.eval(a, env)?.truthy())),
            ("unm", [a]) => {
                let value = self.eval(a, env)?;
                match value.to_number() {
                    Some(n) => Ok(Value::Number(-n)),
                    None => Err(self.operand_error("perform arithmetic on", &value, a, env)),
                }
            }
            ("len", [a]) => {
                let value = self.eval(a, env)?;
                match &value {
                    Value::Str(s) => Ok(Value::Number(s.len() as f64)),
                    Value::Table(t) => Ok(Value::Number(t.borrow().len() as f64)),
                    _ => Err(self.operand_error("get length of", &value, a, env)),
                }
            }
            (op, [a, b]) => {
                let left = self.eval(a, env)?;
                let right = self.eval(b, env)?;
                self.binary(op, left, right, (a, b), env)
            }
            (op, _) => Err(self.error(format!("malformed operator `{op}`"))),
        }
    }

    fn binary(
        &self,
        op: &str,
        left: Value,
        right: Value,
        (a, b): (&Term, &Term),
        env: &Rc<Scope>,
    ) -> Result<Value> {
        let arith: fn(f64, f64) -> f64 = match op {
            "add" => |x, y| x + y,
            "sub" => |x, y| x - y,
            "mul" => |x, y| x * y,
            "div" => |x, y| x / y,
            "mod" => |x, y| x - (x / y).floor() * y,
            "pow" => f64::powf,
            "concat" => {
                return match (left.to_text(), right.to_text()) {
                    (Some(l), Some(r)) => Ok(Value::from(format!("{l}{r}"))),
                    (None, _) => Err(self.operand_error("concatenate", &left, a, env)),
                    (_, None) => Err(self.operand_error("concatenate", &right, b, env)),
                };
            }
            "eq" => return Ok(Value::Bool(left.raw_equal(&right))),
            "lt" | "le" => return self.compare(op, &left, &right),
            _ => return Err(self.error(format!("unknown operator `{op}`"))),
        };
        match (left.to_number(), right.to_number()) {
            (Some(x), Some(y)) => Ok(Value::Number(arith(x, y))),
            (None, _) => Err(self.operand_error("perform arithmetic on", &left, a, env)),
            (_, None) => Err(self.operand_error("perform arithmetic on", &right, b, env)),
        }
    }

    fn compare(&self, op: &str, left: &Value, right: &Value) -> Result<Value> {
        let ordering = match (left, right) {
            (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
            (Value::Str(x), Value::Str(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
            _ if left.type_name() == right.type_name() => {
                return Err(self.error(format!("attempt to compare two {} values", left.type_name())));
            }
            _ => {
                return Err(self.error(format!(
                    "attempt to compare {} with {}",
                    left.type_name(),
                    right.type_name()
                )));
            }
        };
        Ok(Value::Bool(match ordering {
            Some(ordering) if op == "lt" => ordering.is_lt(),
            Some(ordering) => ordering.is_le(),
            // NaN
            None => false,
        }))
    }

    fn operand_error(&self, action: &str, value: &Value, expr: &Term, env: &Rc<Scope>) -> RuntimeError {
        self.error(format!(
            "attempt to {action} a {} value{}",
            value.type_name(),
            describe(expr, env)
        ))
    }

    // Tree access

    fn list<'t>(&self, children: &'t [Term], i: usize) -> Result<&'t [Term]> {
        children
            .get(i)
            .and_then(Term::as_list)
            .ok_or_else(|| self.error("malformed tree: expected a list"))
    }

    fn leaf_str<'t>(&self, children: &'t [Term]) -> Result<&'t str> {
        children
            .first()
            .and_then(Term::as_str)
            .ok_or_else(|| self.error("malformed tree: expected a string"))
    }
}

fn id_name(term: &Term) -> Result<&str> {
    term.id_name()
        .ok_or_else(|| RuntimeError::Unlocated("malformed tree: expected a name".to_string()))
}

fn label_name(stat: &Term) -> Option<&str> {
    match stat {
        Term::Node(Node {
            tag: Tag::Label,
            children,
            ..
        }) => children.first().and_then(Term::as_str),
        _ => None,
    }
}

fn find_label<'b>(block: &'b [Term], label: &str) -> Option<(usize, &'b str)> {
    block
        .iter()
        .enumerate()
        .find_map(|(i, stat)| label_name(stat).filter(|name| *name == label).map(|name| (i, name)))
}

/// Variable description for error messages, e.g. ` (global 'f')`.
fn describe(expr: &Term, env: &Rc<Scope>) -> String {
    match expr.tag() {
        Some(Tag::Id) => match expr.id_name() {
            Some(name) if env.lookup(name).is_some() => format!(" (local '{name}')"),
            Some(name) => format!(" (global '{name}')"),
            None => String::new(),
        },
        Some(Tag::Index) => match expr.children().get(1).and_then(Term::string_value) {
            Some(field) => format!(" (field '{field}')"),
            None => String::new(),
        },
        _ => String::new(),
    }
}

/// Chunk name as shown in messages: `=name` and `@file` drop their prefix.
fn chunk_display(source: &str) -> String {
    match source.strip_prefix('=').or_else(|| source.strip_prefix('@')) {
        Some(name) => name.to_string(),
        None => format!("[string \"{source}\"]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_display() {
        assert_eq!(chunk_display("=(source)"), "(source)");
        assert_eq!(chunk_display("@main.lua"), "main.lua");
        assert_eq!(chunk_display("x = 1"), "[string \"x = 1\"]");
    }

    #[test]
    fn test_scope_shadowing() {
        let root = Rc::new(Scope {
            vars: Vec::new(),
            parent: None,
            varargs: Varargs::Absent,
        });
        let outer = Scope::nested(&root, vec![(Rc::from("x"), cell(Value::Number(1.0)))]);
        let inner = Scope::nested(&outer, vec![(Rc::from("x"), cell(Value::Number(2.0)))]);
        assert_eq!(*outer.lookup("x").unwrap().borrow(), Value::Number(1.0));
        assert_eq!(*inner.lookup("x").unwrap().borrow(), Value::Number(2.0));
        assert!(inner.lookup("y").is_none());
        assert!(inner.varargs().is_none());
    }

    #[test]
    fn test_find_label() {
        let block = vec![Term::goto("a"), Term::label("a"), Term::break_stmt()];
        assert_eq!(find_label(&block, "a"), Some((1, "a")));
        assert_eq!(find_label(&block, "b"), None);
    }
}
