//! Flow narrowing of environments by conditional tests.

use crate::analysis::annotation::cell_type;
use crate::analysis::checker::TypeChecker;
use crate::ast::{BinaryOp, LogicalOp, NodeId, NodeKind, UnaryOp};
use crate::core::env::TypeEnv;
use crate::core::interface::{interface_type, Typing};
use crate::core::narrow::{narrow_type, not_falsy, not_truthy, typeof_type};
use crate::core::types::{Literal, Type};

impl<'a> TypeChecker<'a> {
    /// Refine `env` for the branch where `test` evaluates to `assume_true`.
    pub fn narrow_environment(&mut self, env: &TypeEnv, test: NodeId, assume_true: bool) -> TypeEnv {
        let ast = self.ast;
        match ast.kind(test) {
            NodeKind::Unary { op: UnaryOp::Not, argument } => {
                self.narrow_environment(env, *argument, !assume_true)
            }
            NodeKind::Logical { op: LogicalOp::And, left, right } if assume_true => {
                let env = self.narrow_environment(env, *left, true);
                self.narrow_environment(&env, *right, true)
            }
            NodeKind::Logical { op: LogicalOp::Or, left, right } if !assume_true => {
                let env = self.narrow_environment(env, *left, false);
                self.narrow_environment(&env, *right, false)
            }
            NodeKind::Binary { op, left, right } if op.is_equality() => {
                let positive = assume_true != op.is_negated();
                if let Some((operand, kind)) = self.typeof_test(*left, *right) {
                    return match typeof_type(kind) {
                        Some(ty) if positive => self.narrow_expression(env, operand, ty),
                        Some(ty) => self.narrow_expression(env, operand, Type::not(ty)),
                        None => env.clone(),
                    };
                }

                let loose = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
                let left_ty = self.comparison_type(*left, env, loose);
                let right_ty = self.comparison_type(*right, env, loose);
                let env = self.narrow_side(env, *left, &right_ty, positive);
                self.narrow_side(&env, *right, &left_ty, positive)
            }
            _ => {
                let other = if assume_true { not_falsy() } else { not_truthy() };
                self.narrow_expression(env, test, other)
            }
        }
    }

    /// Refine the identifier or member chain `expr` by `other` in `env`.
    pub fn narrow_expression(&mut self, env: &TypeEnv, expr: NodeId, other: Type) -> TypeEnv {
        match self.ast.kind(expr) {
            NodeKind::Identifier { name } => match env.get(name) {
                Some(Ok(typing)) if cell_type(&typing.ty).is_none() => {
                    let narrowed = Typing { ty: narrow_type(&typing.ty, &other), ..typing.clone() };
                    env.extend(name.clone(), Ok(narrowed))
                }
                _ => env.clone(),
            },
            NodeKind::Member { object, property } => {
                let other = Type::object([(property.clone(), other)]);
                self.narrow_expression(env, *object, other)
            }
            _ => env.clone(),
        }
    }

    /// `typeof e === "kind"` in either operand order.
    fn typeof_test(&self, left: NodeId, right: NodeId) -> Option<(NodeId, &'a str)> {
        let ast = self.ast;
        let pick = move |unary: NodeId, literal: NodeId| match (ast.kind(unary), ast.kind(literal)) {
            (
                NodeKind::Unary { op: UnaryOp::Typeof, argument },
                NodeKind::Literal { value: Literal::String(kind) },
            ) => Some((*argument, kind.as_str())),
            _ => None,
        };
        pick(left, right).or_else(|| pick(right, left))
    }

    fn comparison_type(&mut self, node: NodeId, env: &TypeEnv, loose: bool) -> Type {
        let ty = interface_type(&self.synth(node, env));
        if loose && matches!(ty, Type::Undefined | Type::Null) {
            Type::union(vec![Type::Undefined, Type::Null])
        } else {
            ty
        }
    }

    fn narrow_side(&mut self, env: &TypeEnv, expr: NodeId, other: &Type, positive: bool) -> TypeEnv {
        if other.is_error() {
            return env.clone();
        }
        if positive {
            self.narrow_expression(env, expr, other.clone())
        } else if is_unit(other) {
            self.narrow_expression(env, expr, Type::not(other.clone()))
        } else {
            env.clone()
        }
    }
}

/// Types with exactly one inhabitant per arm, whose complement is sound to narrow by.
fn is_unit(ty: &Type) -> bool {
    match ty {
        Type::Singleton(_, _) | Type::Undefined | Type::Null => true,
        Type::Union(arms) => arms.iter().all(is_unit),
        _ => false,
    }
}
