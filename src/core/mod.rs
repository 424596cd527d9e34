//! Core type system components
//!
//! The structural type lattice, narrowing math, per-node typing results and the persistent
//! scope chain shared by the checker and the evaluator.

pub mod types;
pub mod lattice;
pub mod narrow;
pub mod interface;
pub mod env;

pub use types::{Type, Field, ModuleField, Literal};
pub use narrow::{narrow_type, falsy, not_falsy, not_truthy, typeof_type};
pub use interface::{Interface, InterfaceMap, Mutability, Typing};
pub use env::{Env, TypeEnv};
