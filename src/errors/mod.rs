use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::ast::Span;
use crate::core::types::Type;
use crate::signal::SignalError;

#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[error("unbound identifier '{name}'")]
    UnboundIdentifier { name: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("duplicate property '{name}'")]
    DuplicateProperty { name: String },

    #[error("missing field '{name}' of type {expected}")]
    MissingField { name: String, expected: String },

    #[error("type {ty} has no field '{name}'")]
    UnknownField { ty: String, name: String },

    #[error("type {ty} is not callable")]
    NotCallable { ty: String },

    #[error("expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("operator '{op}' cannot be applied to {left} and {right}")]
    IncompatibleOperands { op: String, left: String, right: String },

    #[error("cannot assign to '{target}'")]
    NotAssignable { target: String },

    #[error("parameter '{name}' needs a type annotation")]
    MissingParameterType { name: String },

    #[error("expected a tuple of {expected} elements, found {found}")]
    TupleLength { expected: usize, found: usize },

    #[error("unknown module '{module}'")]
    UnknownModule { module: String },

    #[error("module '{module}' has no export '{name}'")]
    UnknownExport { module: String, name: String },

    #[error("cyclic definition: {}", .chain.join(" -> "))]
    CyclicDefinition { chain: Vec<String> },

    #[error("statement used where an expression is expected")]
    NotAnExpression,
}

/// A type error recorded on one AST node. Never thrown; carried by Interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub suggestions: Vec<String>,
}

impl TypeError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, span: None, suggestions: Vec::new() }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn type_mismatch(expected: &Type, found: &Type) -> Self {
        let mut error = Self::new(ErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        });

        if found.widen().is_subtype(expected) {
            error = error.with_suggestion(format!("{} widens to {}", found, found.widen()));
        } else if expected.is_subtype(found) {
            error = error.with_suggestion(format!("Note: {} is a supertype of {}", found, expected));
        }

        error
    }

    pub fn unbound_identifier(name: &str, similar: Vec<String>) -> Self {
        let error = Self::new(ErrorKind::UnboundIdentifier { name: name.to_string() });
        error.did_you_mean(similar)
    }

    pub fn unknown_field(ty: &Type, name: &str) -> Self {
        let similar = find_similar_names(name, &ty.field_names(), 2);
        Self::new(ErrorKind::UnknownField { ty: ty.to_string(), name: name.to_string() })
            .did_you_mean(similar)
    }

    pub fn arity_mismatch(expected: usize, found: usize) -> Self {
        Self::new(ErrorKind::ArityMismatch { expected, found })
    }

    pub fn incompatible_operands(op: &str, left: &Type, right: &Type) -> Self {
        Self::new(ErrorKind::IncompatibleOperands {
            op: op.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    fn did_you_mean(self, similar: Vec<String>) -> Self {
        if similar.is_empty() {
            return self;
        }
        let suggestions = similar.iter()
            .take(3)
            .map(|s| format!("Did you mean '{}'?", s))
            .collect();
        self.with_suggestions(suggestions)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{}..{}: {}", span.start, span.end, self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }

        for suggestion in &self.suggestions {
            write!(f, "\n  hint: {}", suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for TypeError {}

/// Failures raised while evaluating a checked document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The checker and evaluator disagree; the interface map can no longer be trusted.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// Exception raised by host or user code.
    #[error("runtime exception: {0}")]
    Runtime(String),

    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl EvalError {
    pub fn internal(msg: impl Into<String>) -> Self {
        EvalError::Internal(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        EvalError::Runtime(msg.into())
    }
}

/// Error collector for gathering diagnostics of a document
pub struct ErrorCollector {
    errors: Vec<TypeError>,
    max_errors: usize,
    dropped: usize,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::with_max(100)
    }

    pub fn with_max(max_errors: usize) -> Self {
        Self { errors: Vec::new(), max_errors, dropped: 0 }
    }

    pub fn add(&mut self, error: TypeError) {
        if self.errors.len() < self.max_errors {
            self.errors.push(error);
        } else {
            self.dropped += 1;
        }
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = TypeError>) {
        for error in errors {
            self.add(error);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Errors past the cap that were not kept
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TypeError> {
        self.errors
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.dropped = 0;
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Edit distance for "did you mean" suggestions
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() { return b.len(); }
    if b.is_empty() { return a.len(); }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        row[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            row[j] = (prev[j] + 1).min(row[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }

    prev[b.len()]
}

/// Candidates within `max_distance` edits of `target`, closest first
pub fn find_similar_names(target: &str, candidates: &[String], max_distance: usize) -> Vec<String> {
    let mut results: Vec<(&String, usize)> = candidates
        .iter()
        .map(|c| (c, levenshtein_distance(target, c)))
        .filter(|(_, dist)| *dist <= max_distance && *dist > 0)
        .collect();

    results.sort_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.cmp(b)));
    results.dedup_by(|(a, _), (b, _)| a == b);
    results.into_iter().map(|(name, _)| name.clone()).collect()
}
