use livedoc::ast::builder::param;
use livedoc::ast::{AstBuilder, BinaryOp, LogicalOp, TypeAnnotation};
use livedoc::core::{Mutability, Type, TypeEnv, Typing};
use livedoc::eval::{EvalOptions, Evaluator, Function, Value, ValueEnv, WriteBack};
use livedoc::signal::Signal;
use livedoc::TypeChecker;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn test_dynamic_identifier_lifts_binary() {
    let mut b = AstBuilder::new();
    let n = b.ident("n");
    let one = b.num(1.0);
    let sum = b.add(n, one);
    let ast = b.finish();

    let types = TypeEnv::new().extend("n", Ok(Typing::new(Type::Number, true)));
    let mut checker = TypeChecker::new(&ast);
    let typing = checker.synth(sum, &types).unwrap();
    assert!(typing.dynamic);
    let interfaces = checker.into_interfaces();
    assert!(interfaces.get(n).unwrap().as_ref().unwrap().dynamic);

    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces));
    let values = ValueEnv::new().extend("n", Value::Signal(Signal::ok(Value::Number(7.0))));
    let result = evaluator.evaluate_expression(sum, &values).unwrap();

    let signal = result.as_signal().expect("dynamic result is a signal");
    assert_eq!(signal.get(), Ok(Value::Number(8.0)));
}

#[test]
fn test_static_expression_stays_plain() {
    let mut b = AstBuilder::new();
    let two = b.num(2.0);
    let three = b.num(3.0);
    let product = b.binary(BinaryOp::Mul, two, three);
    let label = b.str("n=");
    let text = b.add(label, product);
    let ast = b.finish();

    let mut checker = TypeChecker::new(&ast);
    let typing = checker.synth(text, &TypeEnv::new()).unwrap();
    assert_eq!(typing.ty, Type::string_literal("n=6"));

    let interfaces = checker.into_interfaces();
    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces));
    let value = evaluator.evaluate_expression(text, &ValueEnv::new()).unwrap();
    assert_eq!(value, Value::string("n=6"));
}

#[test]
fn test_failed_fragment_degrades_to_undefined() {
    let mut b = AstBuilder::new();
    let missing = b.ident("missing");
    let bad = b.const_binding("bad", None, missing);
    let uses_bad = b.ident("bad");
    let also = b.const_binding("also", None, uses_bad);
    let one = b.num(1.0);
    let two = b.num(2.0);
    let sum = b.add(one, two);
    let fine = b.const_binding("fine", None, sum);
    let ast = b.finish();

    let statements = [bad, also, fine];
    let mut checker = TypeChecker::new(&ast);
    checker.check_program(&statements, &TypeEnv::new());
    assert_eq!(checker.errors().len(), 1);

    let interfaces = checker.into_interfaces();
    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces));
    let (_, values) = evaluator.evaluate_program(&statements, &ValueEnv::new()).unwrap();
    assert_eq!(values, vec![Value::Undefined, Value::Undefined, Value::Number(3.0)]);
}

#[test]
fn test_assignment_updates_cell_and_writes_back() {
    let mut b = AstBuilder::new();
    let one = b.num(1.0);
    let count = b.let_binding("count", Some(TypeAnnotation::Number), one, Mutability::Code);

    let target = b.ident("count");
    let current = b.ident("count");
    let step = b.num(1.0);
    let next = b.add(current, step);
    let assign = b.assign(target, next);
    let body = b.arrow(vec![], assign);
    let increment = b.const_binding("increment", None, body);

    let read = b.ident("count");
    let two = b.num(2.0);
    let doubled = b.binary(BinaryOp::Mul, read, two);
    let double = b.const_binding("double", None, doubled);
    let ast = b.finish();

    let statements = [count, increment, double];
    let mut checker = TypeChecker::new(&ast);
    checker.check_program(&statements, &TypeEnv::new());
    assert!(checker.errors().is_empty(), "{:?}", checker.errors());

    let writes: Rc<RefCell<Vec<(Vec<String>, String)>>> = Rc::default();
    let log = writes.clone();
    let write_back: WriteBack = Rc::new(move |path: &[String], json: &str| {
        log.borrow_mut().push((path.to_vec(), json.to_string()));
    });

    let interfaces = checker.into_interfaces();
    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces))
        .with_write_back(write_back);
    let (_, values) = evaluator.evaluate_program(&statements, &ValueEnv::new()).unwrap();

    let Value::Function(increment) = &values[1] else {
        panic!("increment should be a plain function, got {:?}", values[1]);
    };
    let double = values[2].as_signal().expect("double depends on a let binding").clone();
    assert_eq!(double.get(), Ok(Value::Number(2.0)));

    assert_eq!(increment.call(&[]).unwrap(), Value::Number(2.0));
    assert_eq!(double.get(), Ok(Value::Number(4.0)));

    let writes = writes.borrow();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, vec!["count".to_string()]);
    let written: serde_json::Value = serde_json::from_str(&writes[0].1).unwrap();
    assert_eq!(written.as_f64(), Some(2.0));
}

#[test]
fn test_write_back_can_be_disabled() {
    let mut b = AstBuilder::new();
    let zero = b.num(0.0);
    let count = b.let_binding("count", None, zero, Mutability::Code);
    let target = b.ident("count");
    let five = b.num(5.0);
    let assign = b.assign(target, five);
    let ast = b.finish();

    let statements = [count, assign];
    let mut checker = TypeChecker::new(&ast);
    checker.check_program(&statements, &TypeEnv::new());

    let calls = Rc::new(RefCell::new(0));
    let counted = calls.clone();
    let interfaces = checker.into_interfaces();
    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces))
        .with_write_back(Rc::new(move |_: &[String], _: &str| *counted.borrow_mut() += 1))
        .with_options(EvalOptions { write_back: false, ..EvalOptions::default() });
    let (env, _) = evaluator.evaluate_program(&statements, &ValueEnv::new()).unwrap();

    let cell = env.get("count").and_then(Value::as_signal).unwrap();
    assert_eq!(cell.get(), Ok(Value::Number(5.0)));
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn test_arrow_with_parameters() {
    let mut b = AstBuilder::new();
    let x = b.ident("x");
    let y = b.ident("y");
    let sum = b.add(x, y);
    let add = b.arrow(
        vec![param("x", Some(TypeAnnotation::Number)), param("y", Some(TypeAnnotation::Number))],
        sum,
    );
    let f = b.const_binding("add", None, add);
    let callee = b.ident("add");
    let two = b.num(2.0);
    let forty = b.num(40.0);
    let call = b.call(callee, vec![two, forty]);
    let answer = b.const_binding("answer", None, call);
    let ast = b.finish();

    let statements = [f, answer];
    let mut checker = TypeChecker::new(&ast);
    let env = checker.check_program(&statements, &TypeEnv::new());
    assert_eq!(env.get("answer"), Some(&Ok(Typing::fixed(Type::Number))));

    let interfaces = checker.into_interfaces();
    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces));
    let (_, values) = evaluator.evaluate_program(&statements, &ValueEnv::new()).unwrap();
    assert_eq!(values[1], Value::Number(42.0));
}

#[test]
fn test_dynamic_condition_switches_branch() {
    let mut b = AstBuilder::new();
    let flag = b.ident("flag");
    let yes = b.str("on");
    let no = b.str("off");
    let cond = b.conditional(flag, yes, no);
    let ast = b.finish();

    let types = TypeEnv::new().extend("flag", Ok(Typing::new(Type::Boolean, true)));
    let mut checker = TypeChecker::new(&ast);
    checker.synth(cond, &types).unwrap();

    let flag_cell = Signal::cell_ok(Value::Boolean(true));
    let values = ValueEnv::new().extend("flag", Value::Signal(flag_cell.clone()));
    let interfaces = checker.into_interfaces();
    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces));
    let result = evaluator.evaluate_expression(cond, &values).unwrap();
    let signal = result.as_signal().unwrap();

    assert_eq!(signal.get(), Ok(Value::string("on")));
    flag_cell.set_ok(Value::Boolean(false)).unwrap();
    assert_eq!(signal.get(), Ok(Value::string("off")));
}

fn error_left_logical(op: LogicalOp) -> (Value, usize) {
    let mut b = AstBuilder::new();
    let missing = b.ident("missing");
    let callee = b.ident("f");
    let call = b.call(callee, vec![]);
    let logical = b.logical(op, missing, call);
    let ast = b.finish();

    let types = TypeEnv::new().extend("f", Ok(Typing::fixed(Type::function(vec![], Type::Number))));
    let mut checker = TypeChecker::new(&ast);
    let typing = checker.synth(logical, &types).unwrap();
    assert_eq!(typing, Typing::fixed(Type::Number));

    let calls = Rc::new(Cell::new(0));
    let counted = calls.clone();
    let f = Function::new(move |_| {
        counted.set(counted.get() + 1);
        Ok(Value::Number(1.0))
    });
    let values = ValueEnv::new().extend("f", Value::Function(f));
    let interfaces = checker.into_interfaces();
    let evaluator = Evaluator::new(Rc::new(ast), Rc::new(interfaces));
    let value = evaluator.evaluate_expression(logical, &values).unwrap();
    (value, calls.get())
}

#[test]
fn test_error_and_call_does_not_run_call() {
    let (value, calls) = error_left_logical(LogicalOp::And);
    assert_eq!(value, Value::Undefined);
    assert_eq!(calls, 0);
}

#[test]
fn test_error_or_call_runs_call() {
    let (value, calls) = error_left_logical(LogicalOp::Or);
    assert_eq!(value, Value::Number(1.0));
    assert_eq!(calls, 1);
}
