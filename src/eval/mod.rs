//! Evaluation of checked documents
//!
//! The evaluator reads the checker's [`InterfaceMap`](crate::core::InterfaceMap) to decide, per
//! node, whether to produce a plain [`Value`] or a [`Value::Signal`].

pub mod value;
pub mod operators;
pub mod evaluator;
mod lift;
mod assign;

pub use value::{Element, Function, PathSegment, Value};
pub use evaluator::{EvalOptions, Evaluator, ModuleValueEnv, ValueEnv, WriteBack};
