//! Bottom-up type synthesis.

use crate::analysis::annotation::{cell_type, element_type, resolve_annotation};
use crate::analysis::checker::TypeChecker;
use crate::analysis::operators::{binary_type, index_type, member_type, unary_type};
use crate::ast::{BinaryOp, LogicalOp, NodeId, NodeKind, Param, UnaryOp};
use crate::core::env::TypeEnv;
use crate::core::interface::{interface_dynamic, interface_type, Interface, Typing};
use crate::core::narrow::{narrow_type, not_falsy, not_truthy};
use crate::core::types::{Field, Type};
use crate::errors::{find_similar_names, ErrorKind, TypeError};

impl<'a> TypeChecker<'a> {
    /// Synthesize the interface of `node` from its parts.
    pub fn synth(&mut self, node: NodeId, env: &TypeEnv) -> Interface {
        if let Some(existing) = self.interfaces.get(node) {
            return existing.clone();
        }
        let interface = self.synth_node(node, env);
        self.record(node, interface)
    }

    /// Synthesize without recording `node` itself; its sub-nodes are recorded.
    pub(crate) fn synth_node(&mut self, node: NodeId, env: &TypeEnv) -> Interface {
        let ast = self.ast;
        match ast.kind(node) {
            NodeKind::Undefined => Ok(Typing::fixed(Type::Undefined)),
            NodeKind::Null => Ok(Typing::fixed(Type::Null)),
            NodeKind::Literal { value } => Ok(Typing::fixed(Type::singleton(value.clone()))),
            NodeKind::Identifier { name } => synth_identifier(name, env),
            NodeKind::Object { properties } => self.synth_object(properties, env),
            NodeKind::Property { value, .. } => self.synth(*value, env).map(Typing::deref),
            NodeKind::Array { elements } => self.synth_array(elements, env),
            NodeKind::Unary { op, argument } => self.synth_unary(*op, *argument, env),
            NodeKind::Binary { op, left, right } => self.synth_binary(*op, *left, *right, env),
            NodeKind::Logical { op, left, right } => self.synth_logical(*op, *left, *right, env),
            NodeKind::Conditional { test, consequent, alternate } => {
                self.synth_conditional(*test, *consequent, *alternate, env)
            }
            NodeKind::Member { object, property } => {
                let object = self.synth(*object, env)?;
                let access = member_type(&object.ty, property)?;
                Ok(Typing {
                    ty: access.ty,
                    dynamic: object.dynamic || access.dynamic,
                    mutable: access.mutable.or(object.mutable),
                })
            }
            NodeKind::Index { object, index } => {
                let object = self.synth(*object, env);
                let index = self.synth(*index, env);
                let (object, index) = (object?, index?);
                let ty = index_type(&object.ty, &index.ty)?;
                Ok(Typing::new(ty, object.dynamic || index.dynamic).with_mutable(object.mutable))
            }
            NodeKind::Call { callee, arguments } => self.synth_call(*callee, arguments, env),
            NodeKind::Arrow { params, body } => self.synth_arrow(params, *body, env),
            NodeKind::Assignment { target, value } => self.synth_assignment(*target, *value, env),
            NodeKind::Element { attributes, children, .. } => {
                let mut dynamic = false;
                for part in attributes.iter().chain(children) {
                    dynamic |= interface_dynamic(&self.synth(*part, env));
                }
                Ok(Typing::new(element_type(), dynamic))
            }
            NodeKind::As { expression, annotation } => {
                let ty = resolve_annotation(annotation);
                let checked = self.check(*expression, env, &ty);
                Ok(Typing::new(ty, interface_dynamic(&checked)))
            }
            NodeKind::Const { .. } | NodeKind::Let { .. } | NodeKind::Import { .. } => {
                Err(TypeError::new(ErrorKind::NotAnExpression))
            }
        }
    }

    fn synth_object(&mut self, properties: &[NodeId], env: &TypeEnv) -> Interface {
        let mut fields: Vec<Field> = Vec::with_capacity(properties.len());
        let mut dynamic = false;
        let mut duplicate = None;
        let ast = self.ast;

        for &property in properties {
            let NodeKind::Property { key, value } = ast.kind(property) else {
                self.mark(property, Err(TypeError::new(ErrorKind::NotAnExpression)));
                continue;
            };
            let value = self.synth(*value, env);
            if fields.iter().any(|f| &f.name == key) {
                let error = TypeError::new(ErrorKind::DuplicateProperty { name: key.clone() })
                    .at(ast.span(property));
                self.mark(property, Err(error.clone()));
                duplicate.get_or_insert(error);
                continue;
            }
            let value = self.record(property, value.map(Typing::deref));
            dynamic |= interface_dynamic(&value);
            fields.push(Field::new(key.clone(), interface_type(&value)));
        }

        match duplicate {
            Some(error) => Err(error),
            None => Ok(Typing::new(Type::Object(fields), dynamic)),
        }
    }

    fn synth_array(&mut self, elements: &[NodeId], env: &TypeEnv) -> Interface {
        let mut types = Vec::with_capacity(elements.len());
        let mut dynamic = false;
        for &element in elements {
            let element = self.synth(element, env);
            dynamic |= interface_dynamic(&element);
            types.push(interface_type(&element).widen());
        }
        Ok(Typing::new(Type::array(Type::union(types)), dynamic))
    }

    fn synth_unary(&mut self, op: UnaryOp, argument: NodeId, env: &TypeEnv) -> Interface {
        let argument = self.synth(argument, env);
        let ty = unary_type(op, &interface_type(&argument))?;
        Ok(Typing::new(ty, interface_dynamic(&argument)))
    }

    fn synth_binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId, env: &TypeEnv) -> Interface {
        let left = self.synth(left, env);
        let right = self.synth(right, env);
        match (left, right) {
            (Ok(left), Ok(right)) => {
                let ty = binary_type(op, &left.ty, &right.ty)?;
                Ok(Typing::new(ty, left.dynamic || right.dynamic))
            }
            // An erroneous operand is transparent
            (Err(_), Ok(other)) | (Ok(other), Err(_)) => Ok(other.deref()),
            (Err(error), Err(_)) => Err(error),
        }
    }

    fn synth_logical(&mut self, op: LogicalOp, left: NodeId, right: NodeId, env: &TypeEnv) -> Interface {
        let left_iface = self.synth(left, env);
        let narrowed = self.narrow_environment(env, left, op == LogicalOp::And);
        let right = self.synth(right, &narrowed);

        let left = match left_iface {
            Ok(left) => left.deref(),
            Err(_) => return right.map(Typing::deref),
        };
        let short_circuits = match op {
            LogicalOp::And => Some(false),
            LogicalOp::Or => Some(true),
        };
        let truthiness = left.ty.truthiness();
        if truthiness.is_some() && truthiness == short_circuits {
            return Ok(left);
        }
        let right = match right {
            Ok(right) => right,
            Err(_) => return Ok(left),
        };
        if truthiness.is_some() {
            return Ok(Typing::new(right.ty, left.dynamic || right.dynamic));
        }

        let kept = match op {
            LogicalOp::And => not_truthy(),
            LogicalOp::Or => not_falsy(),
        };
        let ty = Type::union(vec![narrow_type(&left.ty, &kept), right.ty]);
        Ok(Typing::new(ty, left.dynamic || right.dynamic))
    }

    fn synth_conditional(
        &mut self,
        test: NodeId,
        consequent: NodeId,
        alternate: NodeId,
        env: &TypeEnv,
    ) -> Interface {
        let test_iface = self.synth(test, env);
        let when_true = self.narrow_environment(env, test, true);
        let when_false = self.narrow_environment(env, test, false);
        let consequent = self.synth(consequent, &when_true).map(Typing::deref);
        let alternate = self.synth(alternate, &when_false).map(Typing::deref);

        let (test_dynamic, truthiness) = match &test_iface {
            Ok(test) => (test.dynamic, test.ty.truthiness()),
            Err(_) => (false, None),
        };
        let with_test = |typing: Typing| Typing { dynamic: typing.dynamic || test_dynamic, ..typing };

        match truthiness {
            Some(true) => consequent.map(with_test),
            Some(false) => alternate.map(with_test),
            None => match (consequent, alternate) {
                (Ok(c), Ok(a)) => Ok(Typing::new(
                    Type::union(vec![c.ty, a.ty]),
                    c.dynamic || a.dynamic || test_dynamic,
                )),
                (Ok(branch), Err(_)) | (Err(_), Ok(branch)) => Ok(with_test(branch)),
                (Err(error), Err(_)) => Err(error),
            },
        }
    }

    fn synth_call(&mut self, callee: NodeId, arguments: &[NodeId], env: &TypeEnv) -> Interface {
        let callee = self.synth(callee, env);
        let callee = match callee {
            Ok(callee) => callee,
            Err(error) => {
                for &argument in arguments {
                    self.visit(argument, env);
                }
                return Err(error);
            }
        };

        match &callee.ty {
            Type::Function(params, ret) => {
                if params.len() != arguments.len() {
                    for &argument in arguments {
                        self.visit(argument, env);
                    }
                    return Err(TypeError::arity_mismatch(params.len(), arguments.len()));
                }
                let mut dynamic = callee.dynamic;
                for (&argument, param) in arguments.iter().zip(params) {
                    dynamic |= interface_dynamic(&self.check(argument, env, param));
                }
                Ok(Typing::new((**ret).clone(), dynamic))
            }
            Type::Intersection(arms) => {
                let mut dynamic = callee.dynamic;
                let mut found = Vec::with_capacity(arguments.len());
                for &argument in arguments {
                    let argument = self.synth(argument, env);
                    dynamic |= interface_dynamic(&argument);
                    found.push(interface_type(&argument));
                }
                let chosen = arms.iter().find_map(|arm| match arm {
                    Type::Function(params, ret)
                        if params.len() == found.len()
                            && found.iter().zip(params).all(|(arg, param)| arg.is_subtype(param)) =>
                    {
                        Some((**ret).clone())
                    }
                    _ => None,
                });
                match chosen {
                    Some(ret) => Ok(Typing::new(ret, dynamic)),
                    None => Err(TypeError::type_mismatch(
                        &callee.ty,
                        &Type::function(found, Type::Unknown),
                    )),
                }
            }
            Type::Unknown | Type::Error(_) => {
                let mut dynamic = callee.dynamic;
                for &argument in arguments {
                    dynamic |= interface_dynamic(&self.synth(argument, env));
                }
                Ok(Typing::new(Type::Unknown, dynamic))
            }
            other => {
                for &argument in arguments {
                    self.visit(argument, env);
                }
                Err(TypeError::new(ErrorKind::NotCallable { ty: other.to_string() }))
            }
        }
    }

    fn synth_arrow(&mut self, params: &[Param], body: NodeId, env: &TypeEnv) -> Interface {
        let mut types = Vec::with_capacity(params.len());
        let mut missing = None;
        for param in params {
            let ty = match &param.annotation {
                Some(annotation) => resolve_annotation(annotation),
                None => {
                    if !self.options.allow_unannotated_params {
                        missing.get_or_insert_with(|| param.name.clone());
                    }
                    Type::Unknown
                }
            };
            types.push(ty);
        }

        let body_env = snapshot_env(env).extend_all(
            params.iter()
                .zip(&types)
                .map(|(param, ty)| (param.name.clone(), Ok(Typing::fixed(ty.clone()))))
        );
        let body = self.synth(body, &body_env);

        if let Some(name) = missing {
            return Err(TypeError::new(ErrorKind::MissingParameterType { name }));
        }
        let ret = match &body {
            Ok(typing) => typing.ty.clone(),
            Err(error) => Type::error(error.clone()),
        };
        Ok(Typing::new(Type::function(types, ret), interface_dynamic(&body)))
    }

    fn synth_assignment(&mut self, target: NodeId, value: NodeId, env: &TypeEnv) -> Interface {
        let target_iface = self.synth(target, env);
        let typing = match target_iface {
            Ok(typing) if typing.mutable.is_some() && is_place(self.ast.kind(target)) => typing,
            Ok(_) => {
                self.visit(value, env);
                return Err(TypeError::new(ErrorKind::NotAssignable {
                    target: self.describe_place(target),
                }));
            }
            Err(error) => {
                self.visit(value, env);
                return Err(error);
            }
        };
        self.visit_against(value, env, &typing.ty);
        Ok(Typing::fixed(typing.ty))
    }

    /// Source-like rendering of an assignment target, for diagnostics.
    pub(crate) fn describe_place(&self, node: NodeId) -> String {
        match self.ast.kind(node) {
            NodeKind::Identifier { name } => name.clone(),
            NodeKind::Member { object, property } => {
                format!("{}.{}", self.describe_place(*object), property)
            }
            NodeKind::Index { object, .. } => format!("{}[..]", self.describe_place(*object)),
            _ => "expression".to_string(),
        }
    }
}

fn synth_identifier(name: &str, env: &TypeEnv) -> Interface {
    match env.get(name) {
        Some(Ok(typing)) => Ok(match cell_type(&typing.ty) {
            Some((mutability, inner)) => {
                Typing::new(inner.clone(), true).with_mutable(Some(mutability))
            }
            None => typing.clone(),
        }),
        Some(Err(error)) => Err(error.clone()),
        None => {
            let similar = find_similar_names(name, &env.names(), 2);
            Err(TypeError::unbound_identifier(name, similar))
        }
    }
}

fn is_place(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::Identifier { .. } | NodeKind::Member { .. } | NodeKind::Index { .. })
}

/// Environment for an arrow body: mutable bindings are read once per call, not tracked.
pub(crate) fn snapshot_env(env: &TypeEnv) -> TypeEnv {
    env.map(|_, interface| match interface {
        Ok(typing) => {
            let typing = match cell_type(&typing.ty) {
                Some((mutability, inner)) => {
                    Typing::new(inner.clone(), true).with_mutable(Some(mutability))
                }
                None => typing.clone(),
            };
            if typing.mutable.is_some() {
                Ok(Typing { dynamic: false, ..typing })
            } else {
                Ok(typing)
            }
        }
        Err(error) => Err(error.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::param;
    use crate::ast::{AstBuilder, TypeAnnotation};
    use crate::core::interface::Mutability;

    fn env_with(bindings: &[(&str, Typing)]) -> TypeEnv {
        bindings.iter().fold(TypeEnv::new(), |env, (name, typing)| {
            env.extend(*name, Ok(typing.clone()))
        })
    }

    #[test]
    fn test_duplicate_property() {
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

        let NodeKind::Object { properties } = ast.kind(obj) else { unreachable!() };
        assert_eq!(
            checker.interface(properties[0]),
            Some(&Ok(Typing::fixed(Type::number_literal(7.0))))
        );
        assert!(checker.interface(properties[1]).unwrap().is_err());
        assert!(checker.interface(nine).unwrap().is_ok());
    }

    #[test]
    fn test_binary_folds_and_tracks_dynamic() {
        let mut b = AstBuilder::new();
        let n = b.ident("n");
        let one = b.num(1.0);
        let sum = b.add(n, one);
        let ast = b.finish();

        let env = env_with(&[("n", Typing::new(Type::Number, true))]);
        let mut checker = TypeChecker::new(&ast);
        assert_eq!(checker.synth(sum, &env), Ok(Typing::new(Type::Number, true)));
    }

    #[test]
    fn test_error_operand_is_transparent() {
        let mut b = AstBuilder::new();
        let x = b.ident("x");
        let missing = b.ident("missing");
        let sum = b.add(x, missing);
        let ast = b.finish();

        let env = env_with(&[("x", Typing::fixed(Type::Number))]);
        let mut checker = TypeChecker::new(&ast);
        assert_eq!(checker.synth(sum, &env), Ok(Typing::fixed(Type::Number)));
        assert_eq!(checker.errors().len(), 1);
    }

    #[test]
    fn test_unbound_identifier_suggests() {
        let mut b = AstBuilder::new();
        let typo = b.ident("cout");
        let ast = b.finish();

        let env = env_with(&[("count", Typing::fixed(Type::Number))]);
        let mut checker = TypeChecker::new(&ast);
        let error = checker.synth(typo, &env).unwrap_err();
        assert_eq!(error.suggestions, vec!["Did you mean 'count'?".to_string()]);
    }

    #[test]
    fn test_short_circuit_excludes_right_dynamic() {
        let mut b = AstBuilder::new();
        let f = b.bool(false);
        let dyn_fn = b.ident("dyn");
        let call = b.call(dyn_fn, vec![]);
        let and = b.and(f, call);
        let ast = b.finish();

        let env = env_with(&[("dyn", Typing::new(Type::function(vec![], Type::Number), true))]);
        let mut checker = TypeChecker::new(&ast);
        let typing = checker.synth(and, &env).unwrap();
        assert!(!typing.dynamic);
        assert_eq!(typing.ty, Type::boolean_literal(false));
        assert!(checker.interface(call).unwrap().as_ref().unwrap().dynamic);
    }

    #[test]
    fn test_logical_narrows_right_side() {
        let mut b = AstBuilder::new();
        let x = b.ident("x");
        let x2 = b.ident("x");
        let one = b.num(1.0);
        let sum = b.add(x2, one);
        let and = b.and(x, sum);
        let ast = b.finish();

        let env = env_with(&[("x", Typing::fixed(Type::undefined_or(Type::Number)))]);
        let mut checker = TypeChecker::new(&ast);
        let typing = checker.synth(and, &env).unwrap();
        assert_eq!(checker.interface(x2), Some(&Ok(Typing::fixed(Type::Number))));
        assert_eq!(
            typing.ty,
            Type::union(vec![Type::Undefined, Type::number_literal(0.0), Type::Number])
        );
    }

    #[test]
    fn test_arrow_needs_annotations() {
        let mut b = AstBuilder::new();
        let x = b.ident("x");
        let f = b.arrow(vec![param("x", None)], x);
        let ast = b.finish();

        let mut checker = TypeChecker::new(&ast);
        assert!(matches!(
            checker.synth(f, &TypeEnv::new()),
            Err(TypeError { kind: ErrorKind::MissingParameterType { .. }, .. })
        ));
    }

    #[test]
    fn test_arrow_reads_mutable_snapshots() {
        let mut b = AstBuilder::new();
        let count = b.ident("count");
        let one = b.num(1.0);
        let sum = b.add(count, one);
        let f = b.arrow(vec![], sum);
        let ast = b.finish();

        let env = env_with(&[(
            "count",
            Typing::new(Type::Number, true).with_mutable(Some(Mutability::Session)),
        )]);
        let mut checker = TypeChecker::new(&ast);
        let typing = checker.synth(f, &env).unwrap();
        assert!(!typing.dynamic);
        assert_eq!(typing.ty, Type::function(vec![], Type::Number));
    }

    #[test]
    fn test_assignment_requires_mutable_target() {
        let mut b = AstBuilder::new();
        let target = b.ident("fixed");
        let value = b.num(2.0);
        let assign = b.assign(target, value);
        let cell = b.ident("cell");
        let value2 = b.str("no");
        let assign2 = b.assign(cell, value2);
        let ast = b.finish();

        let env = env_with(&[
            ("fixed", Typing::fixed(Type::Number)),
            ("cell", Typing::new(Type::Number, true).with_mutable(Some(Mutability::Code))),
        ]);
        let mut checker = TypeChecker::new(&ast);
        assert!(matches!(
            checker.synth(assign, &env),
            Err(TypeError { kind: ErrorKind::NotAssignable { .. }, .. })
        ));
        assert_eq!(checker.synth(assign2, &env), Ok(Typing::fixed(Type::Number)));
        assert!(matches!(
            checker.interface(value2),
            Some(Err(TypeError { kind: ErrorKind::TypeMismatch { .. }, .. }))
        ));
    }

    #[test]
    fn test_call_checks_arguments() {
        let mut b = AstBuilder::new();
        let f = b.ident("f");
        let arg = b.str("x");
        let call = b.call(f, vec![arg]);
        let g = b.ident("f");
        let call2 = b.call(g, vec![]);
        let ast = b.finish();

        let env = env_with(&[("f", Typing::fixed(Type::function(vec![Type::Number], Type::String)))]);
        let mut checker = TypeChecker::new(&ast);
        assert_eq!(checker.synth(call, &env), Ok(Typing::fixed(Type::String)));
        assert!(checker.interface(arg).unwrap().is_err());
        assert!(matches!(
            checker.synth(call2, &env),
            Err(TypeError { kind: ErrorKind::ArityMismatch { expected: 1, found: 0 }, .. })
        ));
    }

    #[test]
    fn test_as_types_as_annotation() {
        let mut b = AstBuilder::new();
        let seven = b.num(7.0);
        let cast = b.as_type(seven, TypeAnnotation::Number);
        let ast = b.finish();

        let mut checker = TypeChecker::new(&ast);
        assert_eq!(checker.synth(cast, &TypeEnv::new()), Ok(Typing::fixed(Type::Number)));
    }
}
