//! Top-down checking against an expected type.

use std::collections::HashSet;

use crate::analysis::annotation::resolve_annotation;
use crate::analysis::checker::TypeChecker;
use crate::analysis::synth::snapshot_env;
use crate::ast::{NodeId, NodeKind, Param};
use crate::core::env::TypeEnv;
use crate::core::interface::{interface_dynamic, Interface, Typing};
use crate::core::types::{Field, Type};
use crate::errors::{ErrorKind, TypeError};

impl<'a> TypeChecker<'a> {
    /// Check `node` against `expected`.
    ///
    /// Literal forms are decomposed so a mismatch is recorded on the innermost offending node;
    /// everything else is synthesized and compared with [`Type::is_subtype`].
    pub fn check(&mut self, node: NodeId, env: &TypeEnv, expected: &Type) -> Interface {
        if let Some(existing) = self.interfaces.get(node) {
            return existing.clone();
        }
        let ast = self.ast;
        let interface = match (ast.kind(node), expected) {
            (NodeKind::Array { elements }, Type::Tuple(types)) => {
                self.check_tuple(elements, env, expected, types)
            }
            (NodeKind::Array { elements }, Type::Array(elem)) => {
                let mut dynamic = false;
                for &element in elements {
                    dynamic |= interface_dynamic(&self.check(element, env, elem));
                }
                Ok(Typing::new(expected.clone(), dynamic))
            }
            (NodeKind::Object { properties }, Type::Object(fields)) => {
                self.check_object(properties, env, expected, fields)
            }
            (NodeKind::Arrow { params, body }, Type::Function(types, ret)) => {
                self.check_arrow(node, params, *body, env, types, ret)
            }
            (NodeKind::Conditional { test, consequent, alternate }, _) => {
                let test_iface = self.synth(*test, env);
                let when_true = self.narrow_environment(env, *test, true);
                let when_false = self.narrow_environment(env, *test, false);
                let consequent = self.check(*consequent, &when_true, expected);
                let alternate = self.check(*alternate, &when_false, expected);

                let (test_dynamic, truthiness) = match &test_iface {
                    Ok(test) => (test.dynamic, test.ty.truthiness()),
                    Err(_) => (false, None),
                };
                let dynamic = test_dynamic || match truthiness {
                    Some(true) => interface_dynamic(&consequent),
                    Some(false) => interface_dynamic(&alternate),
                    None => interface_dynamic(&consequent) || interface_dynamic(&alternate),
                };
                Ok(Typing::new(expected.clone(), dynamic))
            }
            _ => self.check_by_synthesis(node, env, expected),
        };
        self.record(node, interface)
    }

    fn check_by_synthesis(&mut self, node: NodeId, env: &TypeEnv, expected: &Type) -> Interface {
        let typing = self.synth_node(node, env)?;
        if typing.ty.is_subtype(expected) {
            Ok(typing)
        } else {
            Err(TypeError::type_mismatch(expected, &typing.ty))
        }
    }

    fn check_tuple(
        &mut self,
        elements: &[NodeId],
        env: &TypeEnv,
        expected: &Type,
        types: &[Type],
    ) -> Interface {
        if elements.len() != types.len() {
            for &element in elements {
                self.visit(element, env);
            }
            return Err(TypeError::new(ErrorKind::TupleLength {
                expected: types.len(),
                found: elements.len(),
            }));
        }
        let mut dynamic = false;
        for (&element, ty) in elements.iter().zip(types) {
            dynamic |= interface_dynamic(&self.check(element, env, ty));
        }
        Ok(Typing::new(expected.clone(), dynamic))
    }

    fn check_object(
        &mut self,
        properties: &[NodeId],
        env: &TypeEnv,
        expected: &Type,
        fields: &[Field],
    ) -> Interface {
        let ast = self.ast;
        let mut seen: HashSet<&str> = HashSet::with_capacity(properties.len());
        let mut dynamic = false;
        let mut duplicate = None;

        for &property in properties {
            let NodeKind::Property { key, value } = ast.kind(property) else {
                self.mark(property, Err(TypeError::new(ErrorKind::NotAnExpression)));
                continue;
            };
            if !seen.insert(key.as_str()) {
                self.visit(*value, env);
                let error = TypeError::new(ErrorKind::DuplicateProperty { name: key.clone() })
                    .at(ast.span(property));
                self.mark(property, Err(error.clone()));
                duplicate.get_or_insert(error);
                continue;
            }
            let value = match fields.iter().find(|f| &f.name == key) {
                Some(field) => self.check(*value, env, &field.ty),
                None => self.synth(*value, env),
            };
            let value = self.record(property, value.map(Typing::deref));
            dynamic |= interface_dynamic(&value);
        }

        if let Some(error) = duplicate {
            return Err(error);
        }
        let missing = fields.iter()
            .find(|f| !seen.contains(f.name.as_str()) && !Type::Undefined.is_subtype(&f.ty));
        if let Some(field) = missing {
            return Err(TypeError::new(ErrorKind::MissingField {
                name: field.name.clone(),
                expected: field.ty.to_string(),
            }));
        }
        Ok(Typing::new(expected.clone(), dynamic))
    }

    fn check_arrow(
        &mut self,
        node: NodeId,
        params: &[Param],
        body: NodeId,
        env: &TypeEnv,
        types: &[Type],
        ret: &Type,
    ) -> Interface {
        if params.len() != types.len() {
            // Still type the body so its nodes are recorded.
            let _ = self.synth_node(node, env);
            return Err(TypeError::arity_mismatch(types.len(), params.len()));
        }

        let mut param_types = Vec::with_capacity(params.len());
        let mut mismatch = None;
        for (param, expected) in params.iter().zip(types) {
            let ty = match &param.annotation {
                Some(annotation) => {
                    let declared = resolve_annotation(annotation);
                    if !expected.is_subtype(&declared) {
                        mismatch.get_or_insert_with(|| TypeError::type_mismatch(&declared, expected));
                    }
                    declared
                }
                None => expected.clone(),
            };
            param_types.push(ty);
        }

        let body_env = snapshot_env(env).extend_all(
            params.iter()
                .zip(&param_types)
                .map(|(param, ty)| (param.name.clone(), Ok(Typing::fixed(ty.clone()))))
        );
        let body = self.check(body, &body_env, ret);

        if let Some(error) = mismatch {
            return Err(error);
        }
        Ok(Typing::new(Type::function(param_types, ret.clone()), interface_dynamic(&body)))
    }
}
