use livedoc::ast::builder::param;
use livedoc::ast::{AstBuilder, BinaryOp, TypeAnnotation};
use livedoc::core::{Mutability, Type};
use livedoc::errors::ErrorKind;
use livedoc::eval::{EvalOptions, Value};
use livedoc::infrastructure::config::CheckConfig;
use livedoc::performance::CheckCache;
use livedoc::{
    check_documents, Document, DocumentCompiler, ModuleTypeEnv, ModuleValueEnv, Prelude, Signal,
};
use std::rc::Rc;
use std::sync::Arc;

fn evaluate(doc: &Document, compiler: &DocumentCompiler) -> Vec<Value> {
    let checked = compiler.check(doc);
    checked
        .evaluate(doc, &Prelude::new(), Rc::new(ModuleValueEnv::new()), EvalOptions::default(), None)
        .unwrap()
        .values
}

fn forward_reference() -> Document {
    let mut b = AstBuilder::new();
    let price = b.ident("price");
    let two = b.num(2.0);
    let doubled = b.binary(BinaryOp::Mul, price, two);
    let total = b.const_binding("total", None, doubled);
    let value = b.num(21.0);
    let price = b.const_binding("price", None, value);
    Document::new(b.finish(), vec![total, price])
}

#[test]
fn test_fragment_may_use_later_binding() {
    let doc = forward_reference();
    let compiler = DocumentCompiler::default();
    assert!(!compiler.check(&doc).has_errors());

    let values = evaluate(&doc, &compiler);
    assert_eq!(values, vec![Value::Number(42.0), Value::Number(21.0)]);
}

#[test]
fn test_cycle_is_reported_and_rest_still_runs() {
    let mut b = AstBuilder::new();
    let y = b.ident("y");
    let one = b.num(1.0);
    let x_value = b.add(y, one);
    let x = b.const_binding("x", None, x_value);
    let x_ref = b.ident("x");
    let one = b.num(1.0);
    let y_value = b.add(x_ref, one);
    let y = b.const_binding("y", None, y_value);
    let five = b.num(5.0);
    let z = b.const_binding("z", None, five);
    let doc = Document::new(b.finish(), vec![x, y, z]);

    let compiler = DocumentCompiler::default();
    let checked = compiler.check(&doc);
    assert_eq!(checked.errors.len(), 2);
    for error in &checked.errors {
        let ErrorKind::CyclicDefinition { chain } = &error.kind else {
            panic!("expected a cycle error, got {:?}", error.kind);
        };
        assert_eq!(chain, &["x", "y", "x"]);
    }

    let values = evaluate(&doc, &compiler);
    assert_eq!(values, vec![Value::Undefined, Value::Undefined, Value::Number(5.0)]);
}

#[test]
fn test_annotated_function_may_recurse() {
    let mut b = AstBuilder::new();
    let n = b.ident("n");
    let one = b.num(1.0);
    let small = b.binary(BinaryOp::Le, n, one);
    let base = b.num(1.0);
    let n = b.ident("n");
    let fact_ref = b.ident("fact");
    let n_arg = b.ident("n");
    let one = b.num(1.0);
    let pred = b.binary(BinaryOp::Sub, n_arg, one);
    let recurse = b.call(fact_ref, vec![pred]);
    let step = b.binary(BinaryOp::Mul, n, recurse);
    let body = b.conditional(small, base, step);
    let arrow = b.arrow(vec![param("n", Some(TypeAnnotation::Number))], body);
    let signature = TypeAnnotation::Function(
        vec![TypeAnnotation::Number],
        Box::new(TypeAnnotation::Number),
    );
    let fact = b.const_binding("fact", Some(signature), arrow);

    let callee = b.ident("fact");
    let five = b.num(5.0);
    let call = b.call(callee, vec![five]);
    let answer = b.const_binding("answer", None, call);
    let doc = Document::new(b.finish(), vec![answer, fact]);

    let compiler = DocumentCompiler::default();
    let checked = compiler.check(&doc);
    assert!(!checked.has_errors(), "{:?}", checked.errors);
    assert!(checked.groups.iter().any(|group| group.cyclic && group.legal));

    let values = evaluate(&doc, &compiler);
    assert_eq!(values[0], Value::Number(120.0));
    let Value::Function(fact) = &values[1] else {
        panic!("fact should evaluate to a function, got {:?}", values[1]);
    };
    assert_eq!(fact.call(&[Value::Number(4.0)]).unwrap(), Value::Number(24.0));
}

#[test]
fn test_exported_cell_drives_importing_document() {
    let mut a = AstBuilder::new();
    let one = a.num(1.0);
    let count = a.let_binding("count", Some(TypeAnnotation::Number), one, Mutability::Session);
    let count = a.export(count);
    let text = a.str("clicks");
    let label = a.const_binding("label", None, text);
    let label = a.export(label);
    let source = Document::new(a.finish(), vec![count, label]);

    let compiler = DocumentCompiler::default();
    let checked_source = compiler.check(&source);
    assert!(!checked_source.has_errors());
    let Type::Module(fields) = &checked_source.exports else {
        panic!("exports should be a module type");
    };
    assert_eq!(fields.len(), 2);
    assert!(fields[0].dynamic);
    assert!(!fields[1].dynamic);

    let evaluated_source = checked_source
        .evaluate(&source, &Prelude::new(), Rc::new(ModuleValueEnv::new()), EvalOptions::default(), None)
        .unwrap();

    let mut b = AstBuilder::new();
    let import = b.import("counter", &[("count", "count"), ("label", "label")]);
    let read = b.ident("count");
    let ten = b.num(10.0);
    let scaled = b.binary(BinaryOp::Mul, read, ten);
    let scaled = b.const_binding("scaled", None, scaled);
    let doc = Document::new(b.finish(), vec![import, scaled]);

    let mut types = ModuleTypeEnv::new();
    types.insert("counter".to_string(), checked_source.exports.clone());
    let mut values = ModuleValueEnv::new();
    values.insert("counter".to_string(), evaluated_source.exports.clone());

    let checked = DocumentCompiler::default().with_modules(types).check(&doc);
    assert!(!checked.has_errors(), "{:?}", checked.errors);
    let evaluated = checked
        .evaluate(&doc, &Prelude::new(), Rc::new(values), EvalOptions::default(), None)
        .unwrap();

    let scaled = evaluated.values[1].as_signal().expect("scaled follows the imported cell").clone();
    assert_eq!(scaled.get(), Ok(Value::Number(10.0)));

    let cell = evaluated_source.values[0].as_signal().unwrap();
    cell.set_ok(Value::Number(4.0)).unwrap();
    assert_eq!(scaled.get(), Ok(Value::Number(40.0)));
}

#[test]
fn test_unknown_module_is_reported() {
    let mut b = AstBuilder::new();
    let import = b.import("nowhere", &[("x", "x")]);
    let doc = Document::new(b.finish(), vec![import]);

    let checked = DocumentCompiler::default().check(&doc);
    assert!(matches!(checked.errors[0].kind, ErrorKind::UnknownModule { .. }));
}

#[test]
fn test_prelude_values_reach_fragments() {
    let mut b = AstBuilder::new();
    let now = b.ident("now");
    let one = b.num(1.0);
    let later = b.add(now, one);
    let later = b.const_binding("later", None, later);
    let doc = Document::new(b.finish(), vec![later]);

    let clock = Signal::cell_ok(Value::Number(100.0));
    let prelude = Prelude::new().with_dynamic("now", Type::Number, clock.clone());
    let checked = DocumentCompiler::default()
        .with_host_types(prelude.types().clone())
        .check(&doc);
    assert!(!checked.has_errors());

    let evaluated = checked
        .evaluate(&doc, &prelude, Rc::new(ModuleValueEnv::new()), EvalOptions::default(), None)
        .unwrap();
    let later = evaluated.values[0].as_signal().unwrap().clone();
    assert_eq!(later.get(), Ok(Value::Number(101.0)));

    clock.set_ok(Value::Number(200.0)).unwrap();
    assert_eq!(later.get(), Ok(Value::Number(201.0)));
}

#[test]
fn test_recheck_replays_cached_fragments() {
    let doc = forward_reference();
    let cache = Arc::new(CheckCache::new(64));
    let compiler = DocumentCompiler::default().with_cache(cache.clone());

    let first = compiler.check(&doc);
    assert_eq!(cache.stats().misses, 2);
    assert_eq!(cache.len(), 2);

    let second = compiler.check(&doc);
    assert_eq!(cache.stats().hits, 2);
    assert_eq!(first.interfaces, second.interfaces);
    assert_eq!(first.exports, second.exports);
}

#[test]
fn test_check_documents_in_parallel() {
    let documents: Vec<Document> = (0..8)
        .map(|i| {
            let mut b = AstBuilder::new();
            let value = b.num(i as f64);
            let x = b.const_binding("x", None, value);
            let fragments = if i % 2 == 0 {
                vec![x]
            } else {
                let missing = b.ident("missing");
                vec![x, missing]
            };
            Document::new(b.finish(), fragments)
        })
        .collect();

    let checked = check_documents(&documents, &CheckConfig::default(), &ModuleTypeEnv::new());
    assert_eq!(checked.len(), documents.len());
    for (i, result) in checked.iter().enumerate() {
        assert_eq!(result.has_errors(), i % 2 == 1);
    }
}
