//! Type analysis and checking
//!
//! The bidirectional checker: synthesis (`synth`), checking against an expected type
//! (`check`), flow narrowing of conditionals, annotation resolution and operator typing.

pub mod annotation;
pub mod operators;
pub mod checker;
mod synth;
mod check;
mod narrowing;

pub use annotation::{resolve_annotation, cell_type, cell_of};
pub use checker::{CheckOptions, ModuleTypeEnv, TypeChecker};
