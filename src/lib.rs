//! Structural typechecking and incremental evaluation for live documents.
//!
//! A document's fragments are typechecked bidirectionally; every node gets an interface saying
//! its type and whether its value varies over time. The evaluator then builds a dataflow graph of
//! [`signal::Signal`]s only where an interface is dynamic, and plain values everywhere else.

// Core modules
pub mod core;
pub mod ast;
pub mod errors;
pub mod signal;
pub mod analysis;
pub mod eval;
pub mod document;
pub mod performance;
pub mod infrastructure;

// Re-export commonly used items
pub use core::{Env, Interface, InterfaceMap, Mutability, Type, TypeEnv, Typing};
pub use ast::{Ast, AstBuilder, NodeId, NodeKind};
pub use errors::{ErrorCollector, ErrorKind, EvalError, TypeError};
pub use signal::{Signal, SignalError};
pub use analysis::{CheckOptions, ModuleTypeEnv, TypeChecker};
pub use eval::{EvalOptions, Evaluator, ModuleValueEnv, Value, ValueEnv, WriteBack};
pub use document::{CheckedDocument, Document, DocumentCompiler, EvaluatedDocument, HostTypes, Prelude};
pub use performance::{check_documents, CheckCache, ParallelChecker};
pub use infrastructure::{Config, ConfigError};
