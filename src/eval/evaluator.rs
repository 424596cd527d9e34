use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use crate::ast::{Ast, LogicalOp, NodeId, NodeKind, Param};
use crate::ast::visitor::references;
use crate::core::env::Env;
use crate::core::interface::{interface_dynamic, InterfaceMap, Typing};
use crate::errors::EvalError;
use crate::eval::lift::{conform, into_signal};
use crate::eval::operators::{binary_value, unary_value};
use crate::eval::value::{Element, Function, Value};
use crate::signal::Signal;

pub type ValueEnv = Env<Value>;

/// Pre-resolved module values: module path to export name to value.
pub type ModuleValueEnv = HashMap<String, IndexMap<String, Value>>;

/// Host callback persisting an edit of a `Code` binding: (path, serialized JSON value).
pub type WriteBack = Rc<dyn Fn(&[String], &str)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    /// Collapse a map over a map into one node
    pub fuse_maps: bool,
    /// Invoke the write-back callback on assignments to `Code` bindings
    pub write_back: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self { fuse_maps: true, write_back: true }
    }
}

/// Evaluates a checked AST, producing a signal exactly where the interface is dynamic.
///
/// Cloning is cheap; closures created during evaluation hold a clone.
#[derive(Clone)]
pub struct Evaluator {
    ast: Rc<Ast>,
    interfaces: Rc<InterfaceMap>,
    modules: Rc<ModuleValueEnv>,
    write_back: Option<WriteBack>,
    options: EvalOptions,
}

impl Evaluator {
    pub fn new(ast: Rc<Ast>, interfaces: Rc<InterfaceMap>) -> Self {
        Self {
            ast,
            interfaces,
            modules: Rc::new(ModuleValueEnv::new()),
            write_back: None,
            options: EvalOptions::default(),
        }
    }

    pub fn with_modules(mut self, modules: Rc<ModuleValueEnv>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_write_back(mut self, write_back: WriteBack) -> Self {
        self.write_back = Some(write_back);
        self
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn interfaces(&self) -> &InterfaceMap {
        &self.interfaces
    }

    pub fn options(&self) -> EvalOptions {
        self.options
    }

    pub(crate) fn write_back(&self) -> Option<&WriteBack> {
        self.write_back.as_ref()
    }

    /// Evaluate an expression. A node whose interface is an error evaluates to `undefined`.
    pub fn evaluate_expression(&self, node: NodeId, env: &ValueEnv) -> Result<Value, EvalError> {
        let typing = match self.interfaces.require(node)? {
            Ok(typing) => typing.clone(),
            Err(_) => return Ok(Value::Undefined),
        };
        let value = self.evaluate_node(node, &typing, env)?;
        conform(value, typing.dynamic)
    }

    fn is_error(&self, node: NodeId) -> Result<bool, EvalError> {
        Ok(self.interfaces.require(node)?.is_err())
    }

    fn evaluate_node(&self, node: NodeId, typing: &Typing, env: &ValueEnv) -> Result<Value, EvalError> {
        match self.ast.kind(node) {
            NodeKind::Undefined => Ok(Value::Undefined),
            NodeKind::Null => Ok(Value::Null),
            NodeKind::Literal { value } => Ok(Value::from(value)),
            NodeKind::Identifier { name } => env.get(name)
                .cloned()
                .ok_or_else(|| EvalError::internal(format!("'{}' is not bound at runtime", name))),
            NodeKind::Property { value, .. } => self.evaluate_expression(*value, env),
            NodeKind::Object { properties } => {
                let mut keys = Vec::with_capacity(properties.len());
                let mut values = Vec::with_capacity(properties.len());
                for &property in properties {
                    if let NodeKind::Property { key, value } = self.ast.kind(property) {
                        keys.push(key.clone());
                        values.push(*value);
                    }
                }
                self.join_dynamic_expressions(&values, env, move |values| {
                    Ok(Value::object(keys.iter().cloned().zip(values.iter().cloned())))
                })
            }
            NodeKind::Array { elements } => {
                self.join_dynamic_expressions(elements, env, |values| Ok(Value::array(values.to_vec())))
            }
            NodeKind::Unary { op, argument } => {
                let op = *op;
                self.join_dynamic_expressions(&[*argument], env, move |values| {
                    Ok(unary_value(op, &values[0]))
                })
            }
            NodeKind::Binary { op, left, right } => {
                if self.is_error(*left)? {
                    return self.evaluate_expression(*right, env);
                }
                if self.is_error(*right)? {
                    return self.evaluate_expression(*left, env);
                }
                let op = *op;
                self.join_dynamic_expressions(&[*left, *right], env, move |values| {
                    Ok(binary_value(op, &values[0], &values[1]))
                })
            }
            NodeKind::Logical { op, left, right } => self.evaluate_logical(*op, *left, *right, env),
            NodeKind::Conditional { test, consequent, alternate } => {
                self.evaluate_conditional(*test, *consequent, *alternate, env)
            }
            NodeKind::Member { object, property } => {
                let target = self.evaluate_expression(*object, env)?;
                match target {
                    Value::Signal(signal) => {
                        let property = property.clone();
                        Ok(Value::Signal(signal.flat_map(move |value| {
                            into_signal(Ok(value.get_member(&property)))
                        })))
                    }
                    value => Ok(value.get_member(property)),
                }
            }
            NodeKind::Index { object, index } => {
                self.join_dynamic_expressions(&[*object, *index], env, |values| {
                    Ok(values[0].get_index(&values[1]))
                })
            }
            NodeKind::Call { callee, arguments } => {
                let mut nodes = Vec::with_capacity(arguments.len() + 1);
                nodes.push(*callee);
                nodes.extend(arguments);
                self.join_dynamic_expressions(&nodes, env, |values| call_value(&values[0], &values[1..]))
            }
            NodeKind::Arrow { params, body } => self.evaluate_arrow(node, params, *body, typing, env),
            NodeKind::Assignment { target, value } => self.evaluate_assignment(*target, *value, env),
            NodeKind::Element { tag, attributes, children } => {
                let mut keys = Vec::with_capacity(attributes.len());
                let mut nodes = Vec::with_capacity(attributes.len() + children.len());
                for &attribute in attributes {
                    if let NodeKind::Property { key, value } = self.ast.kind(attribute) {
                        keys.push(key.clone());
                        nodes.push(*value);
                    }
                }
                nodes.extend(children);
                let tag = tag.clone();
                self.join_dynamic_expressions(&nodes, env, move |values| {
                    let (props, children) = values.split_at(keys.len());
                    Ok(Value::Element(Rc::new(Element {
                        tag: tag.clone(),
                        props: keys.iter().cloned().zip(props.iter().cloned()).collect(),
                        children: children.to_vec(),
                    })))
                })
            }
            NodeKind::As { expression, .. } => self.evaluate_expression(*expression, env),
            NodeKind::Const { .. } | NodeKind::Let { .. } | NodeKind::Import { .. } => {
                Err(EvalError::internal(format!("statement {} evaluated as an expression", node)))
            }
        }
    }

    fn evaluate_logical(
        &self,
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
        env: &ValueEnv,
    ) -> Result<Value, EvalError> {
        // an error operand reads as `undefined`: falsy, so `&&` stops there
        if self.is_error(left)? {
            return match op {
                LogicalOp::And => Ok(Value::Undefined),
                LogicalOp::Or => self.evaluate_expression(right, env),
            };
        }
        let short_circuits = move |value: &Value| match op {
            LogicalOp::And => !value.is_truthy(),
            LogicalOp::Or => value.is_truthy(),
        };

        match self.evaluate_expression(left, env)? {
            Value::Signal(signal) => {
                let this = self.clone();
                let env = env.clone();
                Ok(Value::Signal(signal.flat_map(move |value| {
                    if short_circuits(value) {
                        Signal::ok(value.clone())
                    } else {
                        into_signal(this.evaluate_expression(right, &env))
                    }
                })))
            }
            value if short_circuits(&value) => Ok(value),
            _ => self.evaluate_expression(right, env),
        }
    }

    fn evaluate_conditional(
        &self,
        test: NodeId,
        consequent: NodeId,
        alternate: NodeId,
        env: &ValueEnv,
    ) -> Result<Value, EvalError> {
        match self.evaluate_expression(test, env)? {
            Value::Signal(signal) => {
                let this = self.clone();
                let env = env.clone();
                Ok(Value::Signal(signal.flat_map(move |value| {
                    let branch = if value.is_truthy() { consequent } else { alternate };
                    into_signal(this.evaluate_expression(branch, &env))
                })))
            }
            value if value.is_truthy() => self.evaluate_expression(consequent, env),
            _ => self.evaluate_expression(alternate, env),
        }
    }

    fn evaluate_arrow(
        &self,
        node: NodeId,
        params: &[Param],
        body: NodeId,
        typing: &Typing,
        env: &ValueEnv,
    ) -> Result<Value, EvalError> {
        let names: Rc<[String]> = params.iter().map(|p| p.name.clone()).collect();
        let make = {
            let this = self.clone();
            move |env: ValueEnv| {
                let this = this.clone();
                let names = names.clone();
                Value::Function(Function::new(move |args| {
                    let bindings = names.iter()
                        .enumerate()
                        .map(|(i, name)| (name.clone(), args.get(i).cloned().unwrap_or(Value::Undefined)));
                    let env = env.extend_all(bindings);
                    this.evaluate_expression(body, &env)?.snapshot()
                }))
            }
        };

        if !typing.dynamic {
            return Ok(make(env.clone()));
        }

        let mut captured: Vec<Signal<Value>> = Vec::new();
        for reference in references(&self.ast, node) {
            let dynamic = self.interfaces.get(reference.node).is_some_and(interface_dynamic);
            if let (true, Some(Value::Signal(signal))) = (dynamic, env.get(&reference.name)) {
                if !captured.iter().any(|s| s.ptr_eq(signal)) {
                    captured.push(signal.clone());
                }
            }
        }
        debug!(node = %node, captured = captured.len(), "dynamic arrow");

        let env = env.clone();
        Ok(Value::Signal(Signal::join(captured).map(move |_| make(env.clone()))))
    }

    /// Evaluate a top-level statement, returning the extended environment and the statement's
    /// value (the bound value for bindings, `undefined` for imports).
    #[instrument(level = "debug", skip(self, env))]
    pub fn evaluate_statement(&self, node: NodeId, env: &ValueEnv) -> Result<(ValueEnv, Value), EvalError> {
        let failed = self.is_error(node)?;
        match self.ast.kind(node) {
            NodeKind::Const { name, value, .. } => {
                let bound = if failed {
                    Value::Undefined
                } else {
                    let dynamic = interface_dynamic(self.interfaces.require(node)?);
                    conform(self.evaluate_expression(*value, env)?, dynamic)?
                };
                trace!(name = %name, "bound const");
                Ok((env.extend(name.clone(), bound.clone()), bound))
            }
            NodeKind::Let { name, value, .. } => {
                let bound = if failed {
                    Value::Undefined
                } else {
                    let initial = self.evaluate_expression(*value, env)?.snapshot()?;
                    Value::Signal(Signal::cell_ok(initial).label(name.clone()))
                };
                trace!(name = %name, "bound let");
                Ok((env.extend(name.clone(), bound.clone()), bound))
            }
            NodeKind::Import { module, specifiers } => {
                let exports = self.modules.get(module);
                let bindings = specifiers.iter().map(|specifier| {
                    let value = exports
                        .and_then(|exports| exports.get(&specifier.imported))
                        .cloned()
                        .unwrap_or(Value::Undefined);
                    (specifier.local.clone(), value)
                });
                Ok((env.extend_all(bindings.collect::<Vec<_>>()), Value::Undefined))
            }
            _ => Ok((env.clone(), self.evaluate_expression(node, env)?)),
        }
    }

    /// Evaluate statements in order, threading the environment.
    pub fn evaluate_program(&self, statements: &[NodeId], env: &ValueEnv) -> Result<(ValueEnv, Vec<Value>), EvalError> {
        let mut env = env.clone();
        let mut values = Vec::with_capacity(statements.len());
        for &statement in statements {
            let (next, value) = self.evaluate_statement(statement, &env)?;
            env = next;
            values.push(value);
        }
        Ok((env, values))
    }
}

fn call_value(callee: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match callee {
        Value::Function(function) => function.call(args),
        other => Err(EvalError::runtime(format!("{} is not a function", other.type_of()))),
    }
}
