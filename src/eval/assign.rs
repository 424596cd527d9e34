//! Assignment to mutable bindings.

use crate::ast::{NodeId, NodeKind};
use crate::core::interface::{Mutability, Typing};
use crate::errors::EvalError;
use crate::eval::evaluator::{Evaluator, ValueEnv};
use crate::eval::value::{PathSegment, Value};

impl Evaluator {
    /// Write `value` into the cell owning `target` and return the written value.
    ///
    /// A bare identifier sets its cell; a path through a cell's value edits a copy with
    /// `produce`. Assignments to `Code` bindings are reported to the write-back callback.
    pub(crate) fn evaluate_assignment(
        &self,
        target: NodeId,
        value: NodeId,
        env: &ValueEnv,
    ) -> Result<Value, EvalError> {
        let assigned = self.evaluate_expression(value, env)?.snapshot()?;
        let (root, path) = self.place_path(target, env)?;
        let owner = env.get(&root)
            .cloned()
            .ok_or_else(|| EvalError::internal(format!("'{}' is not bound at runtime", root)))?;
        assign_into(owner, &path, assigned.clone())?;

        let is_code = matches!(
            self.interfaces().require(target)?,
            Ok(Typing { mutable: Some(Mutability::Code), .. })
        );
        if is_code && self.options().write_back {
            if let Some(write_back) = self.write_back() {
                let mut full = Vec::with_capacity(path.len() + 1);
                full.push(root);
                full.extend(path.iter().map(ToString::to_string));
                let json = serde_json::to_string(&assigned.to_json())
                    .map_err(|e| EvalError::internal(e.to_string()))?;
                write_back(&full, &json);
            }
        }
        Ok(assigned)
    }

    fn place_path(&self, node: NodeId, env: &ValueEnv) -> Result<(String, Vec<PathSegment>), EvalError> {
        match self.ast().kind(node) {
            NodeKind::Identifier { name } => Ok((name.clone(), Vec::new())),
            NodeKind::Member { object, property } => {
                let (root, mut path) = self.place_path(*object, env)?;
                path.push(PathSegment::Key(property.clone()));
                Ok((root, path))
            }
            NodeKind::Index { object, index } => {
                let (root, mut path) = self.place_path(*object, env)?;
                let segment = match self.evaluate_expression(*index, env)?.snapshot()? {
                    Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => PathSegment::Index(n as usize),
                    Value::String(key) => PathSegment::Key(key.to_string()),
                    other => {
                        return Err(EvalError::runtime(format!(
                            "cannot index with a {}",
                            other.type_of()
                        )))
                    }
                };
                path.push(segment);
                Ok((root, path))
            }
            _ => Err(EvalError::internal(format!("node {} is not an assignable place", node))),
        }
    }
}

/// Walk `path` from `owner` to the first cell and write the remainder of the path into it.
fn assign_into(owner: Value, path: &[PathSegment], value: Value) -> Result<(), EvalError> {
    let mut cursor = owner;
    let mut depth = 0;
    loop {
        if let Value::Signal(cell) = &cursor {
            let rest = &path[depth..];
            if rest.is_empty() {
                cell.set_ok(value)?;
            } else {
                let mut outcome = Ok(());
                cell.produce(|draft| outcome = draft.set_path(rest, value))?;
                outcome?;
            }
            return Ok(());
        }
        let Some(segment) = path.get(depth) else {
            return Err(EvalError::internal("assignment target is not backed by a cell"));
        };
        cursor = cursor.child(segment)
            .ok_or_else(|| EvalError::runtime(format!("cannot set '{}' of undefined", segment)))?;
        depth += 1;
    }
}
