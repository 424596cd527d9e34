use std::collections::HashMap;

use tracing::{debug, instrument, trace};

use crate::analysis::annotation::{cell_type, resolve_annotation};
use crate::ast::{Ast, NodeId, NodeKind};
use crate::core::interface::{interface_dynamic, Interface, InterfaceMap, Typing};
use crate::core::env::TypeEnv;
use crate::core::types::Type;
use crate::errors::{ErrorKind, TypeError};

/// Pre-resolved module types: module path to its `Module` type.
pub type ModuleTypeEnv = HashMap<String, Type>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    /// Unannotated arrow parameters type as `unknown` instead of erroring
    pub allow_unannotated_params: bool,
}

/// Bidirectional checker over one [`Ast`].
///
/// Every visited node gets exactly one [`Interface`] in the checker's [`InterfaceMap`]; asking
/// again for a visited node returns the recorded result. Type errors are recorded, never
/// returned as `Err` from the checker itself.
pub struct TypeChecker<'a> {
    pub(crate) ast: &'a Ast,
    pub(crate) modules: Option<&'a ModuleTypeEnv>,
    pub(crate) interfaces: InterfaceMap,
    pub(crate) options: CheckOptions,
}

impl<'a> TypeChecker<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Self {
            ast,
            modules: None,
            interfaces: InterfaceMap::with_capacity(ast.len()),
            options: CheckOptions::default(),
        }
    }

    pub fn with_modules(ast: &'a Ast, modules: &'a ModuleTypeEnv) -> Self {
        Self { modules: Some(modules), ..Self::new(ast) }
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ast(&self) -> &'a Ast {
        self.ast
    }

    pub fn interfaces(&self) -> &InterfaceMap {
        &self.interfaces
    }

    pub fn into_interfaces(self) -> InterfaceMap {
        self.interfaces
    }

    pub fn interface(&self, node: NodeId) -> Option<&Interface> {
        self.interfaces.get(node)
    }

    pub fn errors(&self) -> Vec<TypeError> {
        self.interfaces.errors()
    }

    /// Record `interface` for `node`, giving span-less errors the node's span.
    pub(crate) fn record(&mut self, node: NodeId, interface: Interface) -> Interface {
        let interface = self.located(node, interface);
        self.interfaces.record(node, interface)
    }

    /// Record `interface` for `node` where the caller has no further use for it.
    pub(crate) fn mark(&mut self, node: NodeId, interface: Interface) {
        let interface = self.located(node, interface);
        self.interfaces.insert(node, interface);
    }

    /// Synthesize `node` only for the entries it records, e.g. the operands of a failed call.
    pub(crate) fn visit(&mut self, node: NodeId, env: &TypeEnv) {
        if let Err(error) = self.synth(node, env) {
            trace!(node = %node, error = %error, "visited failing node");
        }
    }

    /// Check `node` against `expected` only for the entries it records.
    pub(crate) fn visit_against(&mut self, node: NodeId, env: &TypeEnv, expected: &Type) {
        if let Err(error) = self.check(node, env, expected) {
            trace!(node = %node, error = %error, "visited failing node");
        }
    }

    fn located(&self, node: NodeId, interface: Interface) -> Interface {
        let span = self.ast.span(node);
        interface.map_err(|e| if e.span.is_none() { e.at(span) } else { e })
    }

    /// Record an error found outside expression checking, such as a cyclic definition.
    pub fn record_error(&mut self, node: NodeId, error: TypeError) -> Interface {
        self.record(node, Err(error))
    }

    /// Replay previously computed entries, e.g. from a fragment cache.
    pub fn adopt(&mut self, entries: impl IntoIterator<Item = (NodeId, Interface)>) {
        for (node, interface) in entries {
            self.interfaces.insert(node, interface);
        }
    }

    /// Check a top-level statement or expression and return the environment for what follows.
    #[instrument(level = "debug", skip(self, env))]
    pub fn check_statement(&mut self, node: NodeId, env: &TypeEnv) -> TypeEnv {
        match self.ast.kind(node) {
            NodeKind::Const { name, annotation, value, .. } => {
                let interface = match annotation {
                    Some(annotation) => {
                        let ty = resolve_annotation(annotation);
                        let checked = self.check(*value, env, &ty);
                        Ok(Typing::new(ty, interface_dynamic(&checked)))
                    }
                    None => self.synth(*value, env).map(Typing::deref),
                };
                let interface = self.record(node, interface);
                debug!(name = %name, ok = interface.is_ok(), "bound const");
                env.extend(name.clone(), interface)
            }
            NodeKind::Let { name, annotation, value, mutability, .. } => {
                let ty = match annotation {
                    Some(annotation) => {
                        let ty = resolve_annotation(annotation);
                        self.visit_against(*value, env, &ty);
                        Ok(ty)
                    }
                    None => self.synth(*value, env).map(|typing| typing.ty.widen()),
                };
                let interface = ty.map(|ty| Typing::new(ty, true).with_mutable(Some(*mutability)));
                let interface = self.record(node, interface);
                debug!(name = %name, ok = interface.is_ok(), "bound let");
                env.extend(name.clone(), interface)
            }
            NodeKind::Import { module, specifiers } => {
                let span = self.ast.span(node);
                let Some(module_ty) = self.modules.and_then(|m| m.get(module)).cloned() else {
                    let error = TypeError::new(ErrorKind::UnknownModule { module: module.clone() })
                        .at(span);
                    self.mark(node, Err(error.clone()));
                    return env.extend_all(
                        specifiers.iter().map(|s| (s.local.clone(), Err(error.clone())))
                    );
                };

                let mut bindings = Vec::with_capacity(specifiers.len());
                let mut first_error = None;
                for specifier in specifiers {
                    let interface = match import_typing(&module_ty, &specifier.imported) {
                        Some(typing) => Ok(typing),
                        None => {
                            let error = TypeError::new(ErrorKind::UnknownExport {
                                module: module.clone(),
                                name: specifier.imported.clone(),
                            })
                            .at(span);
                            first_error.get_or_insert_with(|| error.clone());
                            Err(error)
                        }
                    };
                    bindings.push((specifier.local.clone(), interface));
                }

                let interface = match first_error {
                    Some(error) => Err(error),
                    None => Ok(Typing::fixed(module_ty)),
                };
                self.mark(node, interface);
                env.extend_all(bindings)
            }
            _ => {
                self.visit(node, env);
                env.clone()
            }
        }
    }

    /// Check a sequence of statements, threading the environment.
    pub fn check_program(&mut self, statements: &[NodeId], env: &TypeEnv) -> TypeEnv {
        statements.iter().fold(env.clone(), |env, stmt| self.check_statement(*stmt, &env))
    }
}

/// Typing of one named export of a module type. Cell-typed fields read as their contents.
pub(crate) fn import_typing(module: &Type, name: &str) -> Option<Typing> {
    let Type::Module(fields) = module else {
        return None;
    };
    let field = fields.iter().find(|f| f.name == name)?;
    Some(match cell_type(&field.ty) {
        Some((mutability, inner)) => Typing::new(inner.clone(), true).with_mutable(Some(mutability)),
        None => Typing::new(field.ty.clone(), field.dynamic),
    })
}
