//! Typing rules for operators, member access and indexing.
//!
//! Singleton operands are folded, so `7 + 1` types as `8`. Union operands distribute.

use crate::analysis::annotation::cell_type;
use crate::ast::{BinaryOp, UnaryOp};
use crate::core::interface::Mutability;
use crate::core::narrow::typeof_name;
use crate::core::types::{format_number, Literal, Type};
use crate::errors::TypeError;

fn is_gradual(ty: &Type) -> bool {
    matches!(ty, Type::Unknown | Type::Error(_))
}

fn number_of(ty: &Type) -> Option<f64> {
    match ty.literal() {
        Some(Literal::Number(n)) => Some(n.0),
        _ => None,
    }
}

fn text_of(ty: &Type) -> Option<String> {
    match ty.literal() {
        Some(Literal::String(s)) => Some(s.clone()),
        Some(Literal::Number(n)) => Some(format_number(n.0)),
        _ => None,
    }
}

fn fold_number(left: &Type, right: &Type, f: impl Fn(f64, f64) -> f64) -> Type {
    match (number_of(left), number_of(right)) {
        (Some(a), Some(b)) => Type::number_literal(f(a, b)),
        _ => Type::Number,
    }
}

fn fold_compare(left: &Type, right: &Type, op: BinaryOp) -> Type {
    let ordering = match (left.literal(), right.literal()) {
        (Some(Literal::Number(a)), Some(Literal::Number(b))) => a.0.partial_cmp(&b.0),
        (Some(Literal::String(a)), Some(Literal::String(b))) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Type::Boolean;
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Type::boolean_literal(result)
}

/// Statically known result of `left === right`, when there is one.
fn static_equality(left: &Type, right: &Type, loose: bool) -> Option<bool> {
    let nullish = |t: &Type| matches!(t, Type::Undefined | Type::Null);
    match (left, right) {
        (Type::Singleton(_, a), Type::Singleton(_, b)) => Some(a == b),
        (Type::Undefined, Type::Undefined) | (Type::Null, Type::Null) => Some(true),
        (a, b) if loose && nullish(a) && nullish(b) => Some(true),
        (a, b) if Type::disjoint(a, b) => Some(false),
        _ => None,
    }
}

fn binary_arm(op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    if is_gradual(left) || is_gradual(right) {
        return Some(match op {
            BinaryOp::Add => Type::Unknown,
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => Type::Number,
            _ => Type::Boolean,
        });
    }

    let numeric = left.is_subtype(&Type::Number) && right.is_subtype(&Type::Number);
    match op {
        BinaryOp::Add if numeric => Some(fold_number(left, right, |a, b| a + b)),
        BinaryOp::Add => {
            let printable = Type::Union(vec![Type::String, Type::Number]);
            let stringy = left.is_subtype(&Type::String) || right.is_subtype(&Type::String);
            if stringy && left.is_subtype(&printable) && right.is_subtype(&printable) {
                Some(match (text_of(left), text_of(right)) {
                    (Some(a), Some(b)) => Type::string_literal(a + &b),
                    _ => Type::String,
                })
            } else {
                None
            }
        }
        BinaryOp::Sub if numeric => Some(fold_number(left, right, |a, b| a - b)),
        BinaryOp::Mul if numeric => Some(fold_number(left, right, |a, b| a * b)),
        BinaryOp::Div if numeric => Some(fold_number(left, right, |a, b| a / b)),
        BinaryOp::Rem if numeric => Some(fold_number(left, right, |a, b| a % b)),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => None,

        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let strings = left.is_subtype(&Type::String) && right.is_subtype(&Type::String);
            (numeric || strings).then(|| fold_compare(left, right, op))
        }

        BinaryOp::StrictEq | BinaryOp::StrictNe | BinaryOp::Eq | BinaryOp::Ne => {
            let loose = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
            Some(match static_equality(left, right, loose) {
                Some(equal) => Type::boolean_literal(equal != op.is_negated()),
                None => Type::Boolean,
            })
        }
    }
}

fn distribute(
    left: &Type,
    right: &Type,
    arm: &impl Fn(&Type, &Type) -> Option<Type>,
) -> Option<Type> {
    if let Type::Union(arms) = left {
        let parts: Option<Vec<Type>> = arms.iter().map(|l| distribute(l, right, arm)).collect();
        return parts.map(Type::union);
    }
    if let Type::Union(arms) = right {
        let parts: Option<Vec<Type>> = arms.iter().map(|r| distribute(left, r, arm)).collect();
        return parts.map(Type::union);
    }
    arm(left, right)
}

pub fn binary_type(op: BinaryOp, left: &Type, right: &Type) -> Result<Type, TypeError> {
    distribute(left, right, &|l, r| binary_arm(op, l, r))
        .ok_or_else(|| TypeError::incompatible_operands(op.symbol(), left, right))
}

pub fn unary_type(op: UnaryOp, argument: &Type) -> Result<Type, TypeError> {
    match op {
        UnaryOp::Not => Ok(match argument.truthiness() {
            Some(truthy) => Type::boolean_literal(!truthy),
            None => Type::Boolean,
        }),
        UnaryOp::Typeof => Ok(match typeof_name(argument) {
            Some(kind) => Type::string_literal(kind),
            None => Type::String,
        }),
        UnaryOp::Neg | UnaryOp::Plus => {
            if is_gradual(argument) {
                return Ok(Type::Number);
            }
            if !argument.is_subtype(&Type::Number) {
                return Err(TypeError::type_mismatch(&Type::Number, argument));
            }
            let negate = op == UnaryOp::Neg;
            distribute(argument, &Type::Unknown, &|arg, _| {
                Some(match number_of(arg) {
                    Some(n) if negate => Type::number_literal(-n),
                    Some(n) => Type::number_literal(n),
                    None => Type::Number,
                })
            })
            .ok_or_else(|| TypeError::type_mismatch(&Type::Number, argument))
        }
    }
}

/// Type of `object.name`, plus what the access contributes to `dynamic` and `mutable`.
#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub ty: Type,
    pub dynamic: bool,
    pub mutable: Option<Mutability>,
}

impl Access {
    fn plain(ty: Type) -> Self {
        Self { ty, dynamic: false, mutable: None }
    }
}

pub fn member_type(object: &Type, name: &str) -> Result<Access, TypeError> {
    if let Some((mutability, inner)) = cell_type(object) {
        let mut access = member_type(inner, name)?;
        access.mutable = Some(mutability);
        return Ok(access);
    }

    match object {
        Type::Unknown | Type::Error(_) => Ok(Access::plain(object.clone())),
        Type::Object(fields) => fields.iter()
            .find(|f| f.name == name)
            .map(|f| Access::plain(f.ty.clone()))
            .ok_or_else(|| TypeError::unknown_field(object, name)),
        Type::Module(fields) => {
            let field = fields.iter()
                .find(|f| f.name == name)
                .ok_or_else(|| TypeError::unknown_field(object, name))?;
            match cell_type(&field.ty) {
                Some((mutability, inner)) => Ok(Access {
                    ty: inner.clone(),
                    dynamic: true,
                    mutable: Some(mutability),
                }),
                None => Ok(Access { ty: field.ty.clone(), dynamic: field.dynamic, mutable: None }),
            }
        }
        Type::String | Type::Array(_) if name == "length" => Ok(Access::plain(Type::Number)),
        Type::Singleton(base, Literal::String(s)) if **base == Type::String && name == "length" => {
            Ok(Access::plain(Type::number_literal(s.chars().count() as f64)))
        }
        Type::Tuple(elems) if name == "length" => {
            Ok(Access::plain(Type::number_literal(elems.len() as f64)))
        }
        Type::Set(_) | Type::Map(_, _) if name == "size" => Ok(Access::plain(Type::Number)),
        Type::Union(arms) => {
            let mut parts = Vec::with_capacity(arms.len());
            let mut dynamic = false;
            for arm in arms {
                let access = member_type(arm, name)
                    .map_err(|_| TypeError::unknown_field(object, name))?;
                dynamic |= access.dynamic;
                parts.push(access.ty);
            }
            Ok(Access { ty: Type::union(parts), dynamic, mutable: None })
        }
        Type::Intersection(arms) => arms.iter()
            .find_map(|arm| member_type(arm, name).ok())
            .ok_or_else(|| TypeError::unknown_field(object, name)),
        _ => Err(TypeError::unknown_field(object, name)),
    }
}

pub fn index_type(object: &Type, index: &Type) -> Result<Type, TypeError> {
    let incompatible = || TypeError::incompatible_operands("[]", object, index);

    if let Some((_, inner)) = cell_type(object) {
        return index_type(inner, index);
    }

    match object {
        Type::Unknown | Type::Error(_) => Ok(object.clone()),
        _ if is_gradual(index) => Ok(Type::Unknown),
        Type::Tuple(elems) if index.is_subtype(&Type::Number) => match number_of(index) {
            Some(n) if n >= 0.0 && n.fract() == 0.0 => {
                Ok(elems.get(n as usize).cloned().unwrap_or(Type::Undefined))
            }
            Some(_) => Ok(Type::Undefined),
            None => Ok(Type::undefined_or(Type::union(elems.clone()))),
        },
        Type::Array(elem) if index.is_subtype(&Type::Number) => {
            Ok(Type::undefined_or((**elem).clone()))
        }
        Type::String | Type::Singleton(_, Literal::String(_))
            if object.is_subtype(&Type::String) && index.is_subtype(&Type::Number) =>
        {
            Ok(Type::undefined_or(Type::String))
        }
        Type::Object(_) | Type::Module(_) => match index.literal() {
            Some(Literal::String(name)) => member_type(object, name).map(|access| access.ty),
            _ => Err(incompatible()),
        },
        Type::Union(arms) => {
            let parts: Result<Vec<Type>, TypeError> = arms.iter()
                .map(|arm| index_type(arm, index))
                .collect();
            parts.map(Type::union).map_err(|_| incompatible())
        }
        _ => Err(incompatible()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: f64) -> Type {
        Type::number_literal(n)
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(binary_type(BinaryOp::Add, &lit(7.0), &lit(1.0)).unwrap(), lit(8.0));
        assert_eq!(binary_type(BinaryOp::Mul, &Type::Number, &lit(2.0)).unwrap(), Type::Number);
        let either = Type::union(vec![lit(1.0), lit(2.0)]);
        assert_eq!(
            binary_type(BinaryOp::Add, &either, &lit(1.0)).unwrap(),
            Type::union(vec![lit(2.0), lit(3.0)])
        );
    }

    #[test]
    fn test_string_concat() {
        let ty = binary_type(BinaryOp::Add, &Type::string_literal("n="), &lit(3.0)).unwrap();
        assert_eq!(ty, Type::string_literal("n=3"));
        assert_eq!(binary_type(BinaryOp::Add, &Type::String, &Type::Number).unwrap(), Type::String);
    }

    #[test]
    fn test_incompatible_operands() {
        let err = binary_type(BinaryOp::Sub, &Type::String, &Type::Number).unwrap_err();
        assert!(matches!(err.kind, crate::errors::ErrorKind::IncompatibleOperands { .. }));
        assert!(binary_type(BinaryOp::Add, &Type::Null, &Type::Number).is_err());
    }

    #[test]
    fn test_equality_folds() {
        let eq = binary_type(BinaryOp::StrictEq, &Type::string_literal("a"), &Type::string_literal("b"));
        assert_eq!(eq.unwrap(), Type::boolean_literal(false));
        let ne = binary_type(BinaryOp::StrictNe, &Type::Number, &Type::String);
        assert_eq!(ne.unwrap(), Type::boolean_literal(true));
        let loose = binary_type(BinaryOp::Eq, &Type::Null, &Type::Undefined);
        assert_eq!(loose.unwrap(), Type::boolean_literal(true));
        assert_eq!(binary_type(BinaryOp::StrictEq, &Type::Number, &lit(1.0)).unwrap(), Type::Boolean);
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary_type(UnaryOp::Not, &lit(0.0)).unwrap(), Type::boolean_literal(true));
        assert_eq!(unary_type(UnaryOp::Neg, &lit(2.0)).unwrap(), lit(-2.0));
        assert_eq!(unary_type(UnaryOp::Typeof, &Type::Number).unwrap(), Type::string_literal("number"));
        assert!(unary_type(UnaryOp::Neg, &Type::String).is_err());
    }

    #[test]
    fn test_member_and_index() {
        let obj = Type::object([("count", Type::Number)]);
        assert_eq!(member_type(&obj, "count").unwrap().ty, Type::Number);
        let err = member_type(&obj, "cuont").unwrap_err();
        assert_eq!(err.suggestions, vec!["Did you mean 'count'?".to_string()]);

        let code = Type::abstract_of("Code", vec![obj]);
        assert_eq!(member_type(&code, "count").unwrap().mutable, Some(Mutability::Code));

        let pair = Type::Tuple(vec![Type::String, Type::Number]);
        assert_eq!(index_type(&pair, &lit(1.0)).unwrap(), Type::Number);
        assert_eq!(
            index_type(&Type::array(Type::String), &Type::Number).unwrap(),
            Type::undefined_or(Type::String)
        );
    }
}
