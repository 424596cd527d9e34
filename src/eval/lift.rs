//! Selective lifting of compound expressions into signals.

use crate::ast::NodeId;
use crate::core::interface::interface_dynamic;
use crate::errors::EvalError;
use crate::eval::evaluator::{Evaluator, ValueEnv};
use crate::eval::value::Value;
use crate::signal::{Outcome, Signal, SignalError};

pub(crate) fn into_signal_error(error: EvalError) -> SignalError {
    match error {
        EvalError::Signal(error) => error,
        other => SignalError::Failed(other.to_string()),
    }
}

/// Bring a value in line with its interface: dynamic values are signals, static values are not.
pub(crate) fn conform(value: Value, dynamic: bool) -> Result<Value, EvalError> {
    match value {
        Value::Signal(_) if dynamic => Ok(value),
        Value::Signal(signal) => Ok(signal.get()?),
        value if dynamic => Ok(Value::Signal(Signal::ok(value))),
        value => Ok(value),
    }
}

/// Result of a combine step as a signal payload. A signal result is read, not followed.
pub(crate) fn settle(result: Result<Value, EvalError>) -> Outcome<Value> {
    match result {
        Ok(Value::Signal(signal)) => signal.get(),
        Ok(value) => Ok(value),
        Err(error) => Err(into_signal_error(error)),
    }
}

/// The signal behind a value, wrapping plain values in a constant.
pub(crate) fn into_signal(result: Result<Value, EvalError>) -> Signal<Value> {
    match result {
        Ok(Value::Signal(signal)) => signal,
        Ok(value) => Signal::ok(value),
        Err(error) => Signal::err(into_signal_error(error)),
    }
}

impl Evaluator {
    /// Evaluate `nodes` and combine their values, lifting only as much as their interfaces need.
    ///
    /// With no dynamic input `combine` runs once on plain values. With one, the result maps that
    /// signal; with more, it maps a join of them. Static inputs are captured as they are.
    pub fn join_dynamic_expressions(
        &self,
        nodes: &[NodeId],
        env: &ValueEnv,
        combine: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Result<Value, EvalError> {
        let mut values = Vec::with_capacity(nodes.len());
        let mut slots = Vec::new();
        let mut signals = Vec::new();

        for (slot, &node) in nodes.iter().enumerate() {
            let value = self.evaluate_expression(node, env)?;
            if interface_dynamic(self.interfaces().require(node)?) {
                if let Value::Signal(signal) = &value {
                    slots.push(slot);
                    signals.push(signal.clone());
                }
            }
            values.push(value);
        }

        match signals.len() {
            0 => combine(&values),
            1 => {
                let slot = slots[0];
                let signal = signals.remove(0);
                let lifted = move |value: &Value| {
                    let mut inputs = values.clone();
                    inputs[slot] = value.clone();
                    settle(combine(&inputs))
                };
                let mapped = if self.options().fuse_maps {
                    signal.map_fused(lifted)
                } else {
                    signal.try_map(lifted)
                };
                Ok(Value::Signal(mapped))
            }
            _ => {
                let joined = Signal::join(signals).try_map(move |current: &Vec<Value>| {
                    let mut inputs = values.clone();
                    for (slot, value) in slots.iter().zip(current) {
                        inputs[*slot] = value.clone();
                    }
                    settle(combine(&inputs))
                });
                Ok(Value::Signal(joined))
            }
        }
    }
}
