//! Programs run end to end: source text through the pipeline to a callable
//! function.

use luma::{Artifact, Payload, Pipeline, RuntimeError, Stage, Value};

fn load(source: &str) -> luma::Function {
    Pipeline::new()
        .convert(
            Stage::Src,
            Stage::Function,
            Artifact::named(Payload::Src(source.to_string()), "=test"),
        )
        .unwrap_or_else(|err| panic!("{err}"))
        .into_function()
        .expect("function payload")
}

fn call(source: &str) -> Result<Vec<Value>, RuntimeError> {
    load(source).call_with_output(Vec::new(), &mut Vec::new())
}

fn run(source: &str) -> Vec<Value> {
    call(source).unwrap_or_else(|err| panic!("{err}"))
}

fn error(source: &str) -> String {
    call(source).unwrap_err().to_string()
}

fn numbers(values: &[f64]) -> Vec<Value> {
    values.iter().copied().map(Value::Number).collect()
}

#[test]
fn arithmetic_and_coercion() {
    assert_eq!(
        run(r#"return 1 + 2 * 3, 7 % 3, -7 % 3, 2 ^ 10, 10 / 4, "10" + 1"#),
        numbers(&[7.0, 1.0, 2.0, 1024.0, 2.5, 11.0])
    );
}

#[test]
fn number_formatting() {
    assert_eq!(
        run(r#"return 1 .. "", tostring(1e20), tostring(0.1), 10 / 2 .. "", tostring(1/0)"#),
        vec![
            Value::str("1"),
            Value::str("1e+20"),
            Value::str("0.1"),
            Value::str("5"),
            Value::str("inf"),
        ]
    );
}

#[test]
fn comparisons() {
    assert_eq!(
        run(r#"return "a" < "b", 1 == 1.0, "1" == 1, {} == {}, 2 >= 3"#),
        vec![
            Value::Bool(true),
            Value::Bool(true),
            Value::Bool(false),
            Value::Bool(false),
            Value::Bool(false),
        ]
    );
}

#[test]
fn closures_keep_their_own_upvalues() {
    let source = r#"
local function counter()
   local n = 0
   return function() n = n + 1 return n end
end
local a, b = counter(), counter()
a() a()
return a(), b()
"#;
    assert_eq!(run(source), numbers(&[3.0, 1.0]));
}

#[test]
fn closures_share_an_upvalue() {
    let source = r#"
local function pair()
   local v = 0
   return function() v = v + 1 end, function() return v end
end
local inc, get = pair()
inc() inc()
return get()
"#;
    assert_eq!(run(source), numbers(&[2.0]));
}

#[test]
fn loop_variables_are_fresh_per_iteration() {
    let source = r#"
local fs = {}
for i = 1, 3 do fs[i] = function() return i end end
return fs[1](), fs[3]()
"#;
    assert_eq!(run(source), numbers(&[1.0, 3.0]));
}

#[test]
fn while_repeat_and_break() {
    let source = r#"
local n, s = 0, 0
while true do
   n = n + 1
   if n > 10 then break end
   s = s + n
end
local k = 0
repeat local j = k k = k + 1 until j >= 3
return s, k
"#;
    assert_eq!(run(source), numbers(&[55.0, 4.0]));
}

#[test]
fn numeric_for_with_negative_step() {
    let source = r#"
local seen = 0
for i = 10, 1, -3 do seen = seen + 1 end
return seen
"#;
    assert_eq!(run(source), numbers(&[4.0]));
    assert_eq!(error("for i = 1, 2, 0 do end"), "test:1: 'for' step is zero");
}

#[test]
fn goto_continue() {
    let source = r#"
local out = {}
for i = 1, 5 do
   if i % 2 == 0 then goto continue end
   out[#out + 1] = i
   ::continue::
end
return #out, out[3]
"#;
    assert_eq!(run(source), numbers(&[3.0, 5.0]));
}

#[test]
fn varargs_and_truncation() {
    let source = r#"
local function f(...) return select('#', ...), ... end
local function g(...) return (f(...)) end
return f(1, nil, 3), g(4, 5)
"#;
    assert_eq!(run(source), numbers(&[3.0, 2.0]));

    let result = load("return ...")
        .call_with_output(vec![Value::from(1.0), Value::from("a")], &mut Vec::new())
        .unwrap();
    assert_eq!(result, vec![Value::Number(1.0), Value::str("a")]);
}

#[test]
fn multiple_assignment_swaps() {
    assert_eq!(
        run("local a, b = 1, 2 a, b = b, a return a, b"),
        numbers(&[2.0, 1.0])
    );
}

#[test]
fn tables_and_iteration() {
    let source = r#"
local t = {10, 20, 30, x = 1, ["y"] = 2}
local sum = 0
for _, v in ipairs(t) do sum = sum + v end
local keys = 0
for k in pairs(t) do keys = keys + 1 end
return #t, sum, keys, t.x + t.y
"#;
    assert_eq!(run(source), numbers(&[3.0, 60.0, 5.0, 3.0]));
}

#[test]
fn method_calls() {
    let source = r#"
local Account = {balance = 0}
function Account.deposit(self, v) self.balance = self.balance + v end
function Account:get() return self.balance end
Account:deposit(5)
Account.deposit(Account, 2)
return Account:get()
"#;
    assert_eq!(run(source), numbers(&[7.0]));
}

#[test]
fn builtins() {
    assert_eq!(
        run(r#"return tonumber("0x10"), tonumber("  12  "), tonumber("z", 36), tonumber("1e1"), tonumber("abc")"#),
        vec![
            Value::Number(16.0),
            Value::Number(12.0),
            Value::Number(35.0),
            Value::Number(10.0),
            Value::Nil,
        ]
    );
    assert_eq!(run("return select(-1, 1, 2, 3)"), numbers(&[3.0]));
    assert_eq!(run("return unpack({1, 2, 3}, 2)"), numbers(&[2.0, 3.0]));
    assert_eq!(
        run("return type(nil), type(print), type({}), type('')"),
        vec![
            Value::str("nil"),
            Value::str("function"),
            Value::str("table"),
            Value::str("string"),
        ]
    );
    assert_eq!(
        run("local t = {} rawset(t, 'k', 1) return rawget(t, 'k'), rawequal(t, t)"),
        vec![Value::Number(1.0), Value::Bool(true)]
    );
}

#[test]
fn unpack_ranges() {
    assert_eq!(run("return select('#', unpack({}, 1, 0))"), numbers(&[0.0]));
    assert_eq!(run("return select('#', unpack({}, 5, -5))"), numbers(&[0.0]));
    assert_eq!(
        run("return unpack({1, 2}, -1, 1)"),
        vec![Value::Nil, Value::Nil, Value::Number(1.0)]
    );
    assert_eq!(
        error("return select('#', unpack({}, 1, 3e8))"),
        "test:1: too many results to unpack"
    );
    assert_eq!(
        error("return unpack({}, -1e300, 1e300)"),
        "test:1: too many results to unpack"
    );
}

#[test]
fn select_index_out_of_range() {
    for index in ["0", "-3", "-1e300"] {
        assert_eq!(
            error(&format!("return select({index}, 1, 2)")),
            "test:1: bad argument #1 to 'select' (index out of range)",
            "{index}"
        );
    }
    assert_eq!(run("return select(-2, 1, 2)"), numbers(&[1.0, 2.0]));
    assert_eq!(run("return select(1e300, 1, 2)"), vec![]);
}

#[test]
fn recursion_within_the_call_limit() {
    let source = "local function depth(n) if n == 0 then return 0 end return 1 + depth(n - 1) end\nreturn depth(150)";
    let handle = std::thread::Builder::new()
        .stack_size(256 << 20)
        .spawn(move || call(source).ok().map(|values| values.len()))
        .unwrap();
    assert_eq!(handle.join().unwrap(), Some(1));
}

#[test]
fn deeply_nested_source_is_a_syntax_error() {
    let source = format!("x = {}1{}", "(".repeat(50_000), ")".repeat(50_000));
    let err = Pipeline::new()
        .convert(Stage::Src, Stage::Function, Artifact::source(source))
        .unwrap_err();
    assert!(
        err.to_string().contains("chunk has too many syntax levels"),
        "{err}"
    );
}

#[test]
fn print_writes_to_the_given_output() {
    let mut out = Vec::new();
    load(r#"print("a", 1, nil, true) print()"#)
        .call_with_output(Vec::new(), &mut out)
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "a\t1\tnil\ttrue\n\n");
}

#[test]
fn runtime_errors_carry_positions() {
    assert_eq!(
        error("local t = nil\nreturn t.x"),
        "test:2: attempt to index a nil value (local 't')"
    );
    assert_eq!(
        error("foo()"),
        "test:1: attempt to call a nil value (global 'foo')"
    );
    assert_eq!(
        error("return 1 < '2'"),
        "test:1: attempt to compare number with string"
    );
    assert_eq!(
        error("local t = {}\nreturn t.a.b"),
        "test:2: attempt to index a nil value (field 'a')"
    );
}

#[test]
fn error_and_assert() {
    assert_eq!(error("\n\nerror('boom')"), "test:3: boom");
    assert_eq!(error("error('plain', 0)"), "plain");
    assert_eq!(error("assert(false)"), "assertion failed!");
    assert_eq!(error("assert(nil, 'custom')"), "custom");
    assert_eq!(run("return assert(1, 'unused')"), vec![Value::Number(1.0), Value::str("unused")]);
}

#[test]
fn deep_recursion_reports_stack_overflow() {
    let handle = std::thread::Builder::new()
        .stack_size(256 << 20)
        .spawn(|| call("local function f() return 1 + f() end\nreturn f()").err())
        .unwrap();
    assert_eq!(handle.join().unwrap(), Some(RuntimeError::StackOverflow));
}

#[test]
fn dumped_function_runs_the_same() {
    let function = load("local t = {} for i = 1, 4 do t[i] = i * i end return t[4]");
    let reloaded = luma::Function::load(&function.dump().unwrap()).unwrap();
    assert_eq!(
        reloaded.call_with_output(Vec::new(), &mut Vec::new()).unwrap(),
        numbers(&[16.0])
    );
}
