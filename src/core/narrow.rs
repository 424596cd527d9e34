//! Narrowing math used by flow-sensitive typing of conditionals.

use crate::core::types::{Field, Type};

/// `undefined | null | false | 0 | ''`
pub fn falsy() -> Type {
    Type::union(vec![
        Type::Undefined,
        Type::Null,
        Type::boolean_literal(false),
        Type::number_literal(0.0),
        Type::string_literal(""),
    ])
}

/// Narrowing argument for "this value is truthy".
pub fn not_falsy() -> Type {
    Type::not(falsy())
}

/// Narrowing argument for "this value is falsy".
pub fn not_truthy() -> Type {
    falsy()
}

/// The type named by a `typeof` result string.
pub fn typeof_type(kind: &str) -> Option<Type> {
    match kind {
        "undefined" => Some(Type::Undefined),
        "boolean" => Some(Type::Boolean),
        "number" => Some(Type::Number),
        "string" => Some(Type::String),
        "object" => Some(Type::union(vec![
            Type::Null,
            Type::Object(vec![]),
            Type::array(Type::Unknown),
            Type::set(Type::Unknown),
            Type::map(Type::Never, Type::Unknown),
        ])),
        _ => None,
    }
}

/// The `typeof` string for a type, when all of its inhabitants agree.
pub fn typeof_name(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Undefined => Some("undefined"),
        Type::Null => Some("object"),
        Type::Boolean => Some("boolean"),
        Type::Number => Some("number"),
        Type::String => Some("string"),
        Type::Singleton(base, _) => typeof_name(base),
        Type::Function(_, _) => Some("function"),
        Type::Object(_) | Type::Tuple(_) | Type::Array(_) | Type::Set(_) | Type::Map(_, _)
        | Type::Module(_) => Some("object"),
        Type::Union(arms) => {
            let first = typeof_name(arms.first()?)?;
            arms.iter().all(|arm| typeof_name(arm) == Some(first)).then_some(first)
        }
        _ => None,
    }
}

/// Best-effort intersection of `a` with what is known about it (`b`).
///
/// `b` may be `Not(x)`, meaning the value is known not to inhabit `x`. The result is never
/// wider than `a`.
pub fn narrow_type(a: &Type, b: &Type) -> Type {
    match (a, b) {
        (Type::Never, _) | (_, Type::Never) => Type::Never,
        (Type::Error(_), _) => a.clone(),
        (_, Type::Unknown) => a.clone(),
        (Type::Unknown, Type::Not(_)) => Type::Unknown,
        (Type::Unknown, _) => b.clone(),

        (Type::Union(arms), _) => Type::union(arms.iter().map(|arm| narrow_type(arm, b)).collect()),
        (Type::Intersection(arms), _) => {
            Type::intersection(arms.iter().map(|arm| narrow_type(arm, b)).collect())
        }

        (_, Type::Not(excluded)) => narrow_not(a, excluded),

        (_, Type::Union(arms)) => Type::union(arms.iter().map(|arm| narrow_type(a, arm)).collect()),
        (_, Type::Intersection(arms)) => {
            arms.iter().fold(a.clone(), |acc, arm| narrow_type(&acc, arm))
        }

        (Type::Object(fa), Type::Object(fb)) => {
            let mut fields = Vec::with_capacity(fa.len());
            for field in fa {
                let ty = match fb.iter().find(|g| g.name == field.name) {
                    Some(g) => narrow_type(&field.ty, &g.ty),
                    None => field.ty.clone(),
                };
                if ty.is_never() {
                    return Type::Never;
                }
                fields.push(Field::new(field.name.clone(), ty));
            }
            Type::Object(fields)
        }

        _ if a.is_subtype(b) => a.clone(),
        _ if b.is_subtype(a) => b.clone(),
        _ => Type::intersection(vec![a.clone(), b.clone()]),
    }
}

fn narrow_not(a: &Type, excluded: &Type) -> Type {
    match (a, excluded) {
        (Type::Boolean, _) => narrow_type(
            &Type::Union(vec![Type::boolean_literal(true), Type::boolean_literal(false)]),
            &Type::not(excluded.clone()),
        ),
        (_, Type::Object(fb)) if fb.len() == 1 && matches!(a, Type::Object(_)) => {
            // Not({k: T}) narrows field k by Not(T); with more fields the complement is a union
            let negated = fb.iter()
                .map(|f| Field::new(f.name.clone(), Type::not(f.ty.clone())))
                .collect();
            narrow_type(a, &Type::Object(negated))
        }
        _ if a.is_subtype(excluded) => Type::Never,
        _ => a.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_or_number_not_falsy() {
        let ty = Type::undefined_or(Type::Number);
        assert_eq!(narrow_type(&ty, &not_falsy()), Type::Number);
    }

    #[test]
    fn test_not_truthy() {
        let ty = Type::undefined_or(Type::Number);
        let narrowed = narrow_type(&ty, &not_truthy());
        assert!(narrowed.is_equivalent(&Type::union(vec![
            Type::Undefined,
            Type::number_literal(0.0),
        ])));
    }

    #[test]
    fn test_boolean_splits_under_not() {
        assert_eq!(narrow_type(&Type::Boolean, &not_falsy()), Type::boolean_literal(true));
    }

    #[test]
    fn test_singleton_narrowing() {
        let s = Type::union(vec![Type::string_literal("foo"), Type::string_literal("bar")]);
        assert_eq!(narrow_type(&s, &Type::string_literal("foo")), Type::string_literal("foo"));
        assert_eq!(
            narrow_type(&s, &Type::not(Type::string_literal("foo"))),
            Type::string_literal("bar")
        );
    }

    #[test]
    fn test_object_discriminant() {
        let a = Type::object([("kind", Type::string_literal("a")), ("v", Type::Number)]);
        let b = Type::object([("kind", Type::string_literal("b"))]);
        let both = Type::union(vec![a.clone(), b.clone()]);

        let only_a = narrow_type(&both, &Type::object([("kind", Type::string_literal("a"))]));
        assert_eq!(only_a, a);

        let not_a = narrow_type(
            &both,
            &Type::object([("kind", Type::not(Type::string_literal("a")))]),
        );
        assert_eq!(not_a, b);
    }

    #[test]
    fn test_not_object_narrows_single_field_only() {
        let kinds = Type::union(vec![Type::string_literal("a"), Type::string_literal("b")]);
        let single = Type::object([("kind", kinds)]);
        assert_eq!(
            narrow_type(&single, &Type::not(Type::object([("kind", Type::string_literal("a"))]))),
            Type::object([("kind", Type::string_literal("b"))])
        );

        // Not({a, b}) is "a differs or b differs": neither field may be narrowed on its own
        let pair = Type::object([
            ("a", Type::union(vec![Type::Number, Type::String])),
            ("b", Type::Number),
        ]);
        let excluded = Type::object([("a", Type::Number), ("b", Type::Number)]);
        assert_eq!(narrow_type(&pair, &Type::not(excluded)), pair);
    }

    #[test]
    fn test_typeof_narrowing() {
        let ty = Type::union(vec![Type::Number, Type::String]);
        assert_eq!(narrow_type(&ty, &typeof_type("number").unwrap()), Type::Number);
        assert_eq!(narrow_type(&ty, &Type::not(Type::Number)), Type::String);
    }
}
