//! Persistent lexical environments.

use std::fmt;
use std::rc::Rc;

use crate::core::interface::Interface;

struct Frame<T> {
    name: String,
    value: T,
    parent: Option<Rc<Frame<T>>>,
}

/// Immutable, structurally shared scope chain.
///
/// Extending returns a new environment that shares every existing frame; the original is
/// untouched. Later bindings shadow earlier ones.
pub struct Env<T> {
    head: Option<Rc<Frame<T>>>,
}

pub type TypeEnv = Env<Interface>;

impl<T> Env<T> {
    pub fn new() -> Self {
        Self { head: None }
    }

    pub fn extend(&self, name: impl Into<String>, value: T) -> Self {
        Self {
            head: Some(Rc::new(Frame {
                name: name.into(),
                value,
                parent: self.head.clone(),
            })),
        }
    }

    pub fn extend_all(&self, bindings: impl IntoIterator<Item = (String, T)>) -> Self {
        bindings.into_iter().fold(self.clone(), |env, (name, value)| env.extend(name, value))
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            if f.name == name {
                return Some(&f.value);
            }
            frame = f.parent.as_deref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Visible bindings, innermost first, shadowed entries skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        let mut seen: Vec<&str> = Vec::new();
        let mut frame = self.head.as_deref();
        std::iter::from_fn(move || {
            while let Some(f) = frame {
                frame = f.parent.as_deref();
                if !seen.contains(&f.name.as_str()) {
                    seen.push(f.name.as_str());
                    return Some((f.name.as_str(), &f.value));
                }
            }
            None
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|(name, _)| name.to_string()).collect()
    }

    /// Rebuild the visible bindings with `f` applied to each value.
    pub fn map<U>(&self, mut f: impl FnMut(&str, &T) -> U) -> Env<U> {
        let mut bindings: Vec<(String, U)> = self.iter()
            .map(|(name, value)| (name.to_string(), f(name, value)))
            .collect();
        bindings.reverse();
        Env::new().extend_all(bindings)
    }
}

impl<T> Clone for Env<T> {
    fn clone(&self) -> Self {
        Self { head: self.head.clone() }
    }
}

impl<T> Default for Env<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Env<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
