use livedoc::ast::{AstBuilder, NodeKind, TypeAnnotation};
use livedoc::core::{narrow_type, not_falsy, Field, Type, TypeEnv, Typing};
use livedoc::errors::{ErrorKind, TypeError};
use livedoc::TypeChecker;
use proptest::prelude::*;

fn env_with(bindings: &[(&str, Typing)]) -> TypeEnv {
    bindings.iter().fold(TypeEnv::new(), |env, (name, typing)| {
        env.extend(*name, Ok(typing.clone()))
    })
}

#[test]
fn test_object_literal_checks_against_object_type() {
    let mut b = AstBuilder::new();
    let seven = b.num(7.0);
    let obj = b.object(vec![("foo", seven)]);
    let ast = b.finish();

    let expected = Type::Object(vec![Field::new("foo", Type::Number)]);
    let mut checker = TypeChecker::new(&ast);
    let typing = checker.check(obj, &TypeEnv::new(), &expected).unwrap();

    assert!(!typing.dynamic);
    assert!(typing.ty.is_subtype(&expected));
    assert!(checker.errors().is_empty());
}

#[test]
fn test_duplicate_property_keeps_first_entry() {
    let mut b = AstBuilder::new();
    let seven = b.num(7.0);
    let nine = b.num(9.0);
    let obj = b.object(vec![("foo", seven), ("foo", nine)]);
    let ast = b.finish();

    let mut checker = TypeChecker::new(&ast);
    let result = checker.synth(obj, &TypeEnv::new());
    assert!(matches!(
        result,
        Err(TypeError { kind: ErrorKind::DuplicateProperty { .. }, .. })
    ));

    let NodeKind::Object { properties } = ast.kind(obj) else {
        panic!("expected an object node");
    };
    assert!(checker.interface(properties[0]).unwrap().is_ok());
    assert_eq!(
        checker.interface(seven),
        Some(&Ok(Typing::fixed(Type::number_literal(7.0))))
    );
}

#[test]
fn test_equality_test_narrows_to_singleton() {
    let mut b = AstBuilder::new();
    let s = b.ident("s");
    let foo = b.str("foo");
    let test = b.strict_eq(s, foo);
    let ast = b.finish();

    let foo_or_bar = Type::union(vec![Type::string_literal("foo"), Type::string_literal("bar")]);
    let env = env_with(&[("s", Typing::fixed(foo_or_bar))]);
    let mut checker = TypeChecker::new(&ast);
    let narrowed = checker.narrow_environment(&env, test, true);

    assert_eq!(narrowed.get("s"), Some(&Ok(Typing::fixed(Type::string_literal("foo")))));
    // the input environment is untouched
    assert_ne!(env.get("s"), narrowed.get("s"));
}

#[test]
fn test_untaken_right_side_does_not_make_result_dynamic() {
    let mut b = AstBuilder::new();
    let f = b.bool(false);
    let callee = b.ident("dyn");
    let call = b.call(callee, vec![]);
    let and = b.and(f, call);
    let ast = b.finish();

    let env = env_with(&[("dyn", Typing::new(Type::function(vec![], Type::Number), true))]);
    let mut checker = TypeChecker::new(&ast);
    let typing = checker.synth(and, &env).unwrap();
    assert!(!typing.dynamic);
}

#[test]
fn test_undefined_or_number_narrowed_by_not_falsy() {
    assert_eq!(narrow_type(&Type::undefined_or(Type::Number), &not_falsy()), Type::Number);
}

#[test]
fn test_errors_stay_on_the_smallest_node() {
    let mut b = AstBuilder::new();
    let missing = b.ident("missing");
    let one = b.num(1.0);
    let sum = b.add(missing, one);
    let two = b.num(2.0);
    let arr = b.array(vec![sum, two]);
    let ast = b.finish();

    let mut checker = TypeChecker::new(&ast);
    let typing = checker.synth(arr, &TypeEnv::new());
    assert!(typing.is_ok());
    assert!(matches!(
        checker.interface(missing),
        Some(Err(TypeError { kind: ErrorKind::UnboundIdentifier { .. }, .. }))
    ));
    assert!(checker.interface(two).unwrap().is_ok());
    assert_eq!(checker.errors().len(), 1);
}

#[test]
fn test_annotated_binding_reports_innermost_mismatch() {
    let mut b = AstBuilder::new();
    let text = b.str("seven");
    let obj = b.object(vec![("foo", text)]);
    let stmt = b.const_binding(
        "x",
        Some(TypeAnnotation::Object(vec![livedoc::ast::AnnotatedField {
            name: "foo".into(),
            annotation: TypeAnnotation::Number,
            optional: false,
        }])),
        obj,
    );
    let ast = b.finish();

    let mut checker = TypeChecker::new(&ast);
    let env = checker.check_statement(stmt, &TypeEnv::new());
    assert!(env.get("x").unwrap().is_ok());
    assert!(matches!(
        checker.interface(text),
        Some(Err(TypeError { kind: ErrorKind::TypeMismatch { .. }, .. }))
    ));
}

fn leaf_type() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::Never),
        Just(Type::Unknown),
        Just(Type::Undefined),
        Just(Type::Null),
        Just(Type::Boolean),
        Just(Type::Number),
        Just(Type::String),
        any::<bool>().prop_map(Type::boolean_literal),
        (0..3i32).prop_map(|n| Type::number_literal(n as f64)),
        prop_oneof![Just("a"), Just("b")].prop_map(Type::string_literal),
        prop_oneof![Just(Type::Number), Just(Type::String)].prop_map(Type::array),
    ]
}

fn any_type() -> impl Strategy<Value = Type> {
    prop_oneof![
        3 => leaf_type(),
        1 => prop::collection::vec(leaf_type(), 2..4).prop_map(Type::union),
        1 => leaf_type().prop_map(|ty| Type::Object(vec![Field::new("x", ty)])),
    ]
}

proptest! {
    #[test]
    fn prop_never_and_unknown_bound_every_type(t in any_type()) {
        prop_assert!(Type::Never.is_subtype(&t));
        prop_assert!(t.is_subtype(&Type::Unknown));
    }

    #[test]
    fn prop_subtype_is_reflexive(t in any_type()) {
        prop_assert!(t.is_subtype(&t));
    }

    #[test]
    fn prop_union_commutative(a in any_type(), b in any_type()) {
        let ab = Type::union(vec![a.clone(), b.clone()]);
        let ba = Type::union(vec![b, a]);
        prop_assert!(ab.is_equivalent(&ba));
    }

    #[test]
    fn prop_union_associative(a in any_type(), b in any_type(), c in any_type()) {
        let left = Type::union(vec![Type::union(vec![a.clone(), b.clone()]), c.clone()]);
        let right = Type::union(vec![a, Type::union(vec![b, c])]);
        prop_assert!(left.is_equivalent(&right));
    }

    #[test]
    fn prop_union_idempotent(a in any_type()) {
        prop_assert!(Type::union(vec![a.clone(), a.clone()]).is_equivalent(&a));
    }

    #[test]
    fn prop_intersection_commutative(a in leaf_type(), b in leaf_type()) {
        let ab = Type::intersection(vec![a.clone(), b.clone()]);
        let ba = Type::intersection(vec![b, a]);
        prop_assert!(ab.is_equivalent(&ba));
    }

    #[test]
    fn prop_intersection_associative(a in leaf_type(), b in leaf_type(), c in leaf_type()) {
        let left = Type::intersection(vec![Type::intersection(vec![a.clone(), b.clone()]), c.clone()]);
        let right = Type::intersection(vec![a, Type::intersection(vec![b, c])]);
        prop_assert!(left.is_equivalent(&right));
    }

    #[test]
    fn prop_intersection_idempotent(a in any_type()) {
        prop_assert!(Type::intersection(vec![a.clone(), a.clone()]).is_equivalent(&a));
    }
}
