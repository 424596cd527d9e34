//! Pull-based incremental dataflow.
//!
//! A [`Signal`] is a node in a dependency graph holding its last result, a version counter and
//! a dirty flag. Writes to a cell only *invalidate*: they dirty the dependents registered at
//! that moment. Values are recomputed top-down on the next [`Signal::get`] or
//! [`Signal::reconcile`], and only when a dependency's version actually moved. A recomputation
//! that yields an equal value keeps its version, so nothing downstream recomputes.
//!
//! Dependents are held weakly. A signal lives exactly as long as something owns it.
//!
//! ```
//! use livedoc::signal::Signal;
//!
//! let cell = Signal::cell_ok(0);
//! let doubled = cell.map(|x| x + 1).map(|y| y * 2);
//! cell.set_ok(5).unwrap();
//! assert_eq!(doubled.get(), Ok(12));
//! ```

mod node;

use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;

use node::{CellNode, ConstNode, FlatMapNode, JoinNode, LabelNode, MapNode, Node, RefNode, WatchNode};
pub use node::Dirty;

/// Values a signal can carry.
pub trait Data: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> Data for T {}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("{0}")]
    Failed(String),

    #[error("reference read before it was resolved")]
    UnresolvedRef,

    #[error("reference is already resolved")]
    AlreadyResolved,

    #[error("signal is not a reference")]
    NotAReference,

    #[error("{0} signals cannot be set")]
    ReadOnly(SignalKind),

    #[error("signal read before its first reconcile")]
    Unreconciled,
}

pub type Outcome<T> = Result<T, SignalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Const,
    Cell,
    Map,
    FlatMap,
    MapWritable,
    Join,
    LiftToTry,
    Label,
    Ref,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Const => "Const",
            SignalKind::Cell => "Cell",
            SignalKind::Map => "Map",
            SignalKind::FlatMap => "FlatMap",
            SignalKind::MapWritable => "MapWritable",
            SignalKind::Join => "Join",
            SignalKind::LiftToTry => "LiftToTry",
            SignalKind::Label => "Label",
            SignalKind::Ref => "Ref",
        };
        f.write_str(name)
    }
}

/// Shared handle to a node of the dataflow graph.
pub struct Signal<T>(Rc<dyn Node<T>>);

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal(self.0.clone())
    }
}

impl<T: Data> Signal<T> {
    fn from_node(node: impl Node<T> + 'static) -> Self {
        Signal(Rc::new(node))
    }

    pub(crate) fn node(&self) -> &dyn Node<T> {
        &*self.0
    }

    /// Immutable signal; its version is fixed at 1.
    pub fn constant(value: Outcome<T>) -> Self {
        Self::from_node(ConstNode { value })
    }

    pub fn ok(value: T) -> Self {
        Self::constant(Ok(value))
    }

    pub fn err(error: SignalError) -> Self {
        Self::constant(Err(error))
    }

    /// Settable source signal.
    pub fn cell(value: Outcome<T>) -> Self {
        Self::from_node(CellNode::new(value))
    }

    pub fn cell_ok(value: T) -> Self {
        Self::cell(Ok(value))
    }

    /// Forward-declared placeholder; see [`Signal::resolve`].
    pub fn reference() -> Self {
        Self::from_node(RefNode::new())
    }

    /// Reconcile and read the current value.
    pub fn get(&self) -> Outcome<T> {
        self.0.reconcile();
        self.0.value()
    }

    pub fn reconcile(&self) {
        self.0.reconcile();
    }

    pub fn version(&self) -> u64 {
        self.0.version()
    }

    pub fn kind(&self) -> SignalKind {
        self.0.kind()
    }

    pub fn label_name(&self) -> Option<&str> {
        self.0.label()
    }

    /// Write a source. Equal values are ignored; otherwise current dependents are dirtied.
    pub fn set(&self, value: Outcome<T>) -> Result<(), SignalError> {
        self.0.set(value)
    }

    pub fn set_ok(&self, value: T) -> Result<(), SignalError> {
        self.set(Ok(value))
    }

    /// Set to an edited copy of the current value.
    pub fn produce(&self, recipe: impl FnOnce(&mut T)) -> Result<(), SignalError> {
        let mut draft = self.get()?;
        recipe(&mut draft);
        self.set_ok(draft)
    }

    pub fn map<U: Data>(&self, f: impl Fn(&T) -> U + 'static) -> Signal<U> {
        self.try_map(move |value| Ok(f(value)))
    }

    pub fn try_map<U: Data>(&self, f: impl Fn(&T) -> Outcome<U> + 'static) -> Signal<U> {
        let transform = Rc::new(move |input: Outcome<T>| input.and_then(|value| f(&value)));
        Signal(MapNode::create(SignalKind::Map, self.clone(), transform, None))
    }

    /// Like [`Signal::try_map`], but a chain of same-typed maps collapses into one node
    /// over the original source.
    pub fn map_fused(&self, f: impl Fn(&T) -> Outcome<T> + 'static) -> Signal<T> {
        if let Some(prev) = self.0.as_any().downcast_ref::<MapNode<T, T>>() {
            if prev.kind == SignalKind::Map {
                let inner = prev.f.clone();
                let transform = Rc::new(move |input: Outcome<T>| {
                    inner(input).and_then(|value| f(&value))
                });
                return Signal(MapNode::create(
                    SignalKind::Map,
                    prev.source.clone(),
                    transform,
                    None,
                ));
            }
        }
        self.try_map(f)
    }

    /// Map to a signal and follow it; the inner signal is rebuilt when `self` changes.
    pub fn flat_map<U: Data>(&self, f: impl Fn(&T) -> Signal<U> + 'static) -> Signal<U> {
        Signal(FlatMapNode::create(self.clone(), Rc::new(f)))
    }

    /// Writable map: `set` writes `f_inv(value)` into `self` and caches `value` immediately.
    pub fn map_writable<U: Data>(
        &self,
        f: impl Fn(&T) -> U + 'static,
        f_inv: impl Fn(&U) -> T + 'static,
    ) -> Signal<U> {
        let transform = Rc::new(move |input: Outcome<T>| input.map(|value| f(&value)));
        Signal(MapNode::create(
            SignalKind::MapWritable,
            self.clone(),
            transform,
            Some(Rc::new(f_inv)),
        ))
    }

    /// Combine signals; the first error wins.
    pub fn join(signals: Vec<Signal<T>>) -> Signal<Vec<T>> {
        Signal(JoinNode::create(signals))
    }

    /// Always-ok signal carrying this signal's success or failure.
    pub fn lift_to_try(&self) -> Signal<Outcome<T>> {
        let transform = Rc::new(|input: Outcome<T>| Ok(input));
        Signal(MapNode::create(SignalKind::LiftToTry, self.clone(), transform, None))
    }

    pub fn label(&self, name: impl Into<String>) -> Signal<T> {
        Self::from_node(LabelNode { name: name.into(), source: self.clone() })
    }

    /// Point a [`Signal::reference`] at its target. Allowed once.
    pub fn resolve(&self, target: Signal<T>) -> Result<(), SignalError> {
        match self.0.as_any().downcast_ref::<RefNode<T>>() {
            Some(reference) => reference.resolve(target),
            None => Err(SignalError::NotAReference),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.0.as_any()
            .downcast_ref::<RefNode<T>>()
            .map_or(true, RefNode::is_resolved)
    }

    pub fn depend(&self, dependent: Weak<dyn Dirty>) {
        self.0.depend(dependent);
    }

    pub fn undepend(&self, dependent: &Weak<dyn Dirty>) {
        self.0.undepend(dependent);
    }

    /// Observe changes. The observer lives as long as the returned [`Watcher`].
    pub fn watch(&self, callback: impl Fn(&Outcome<T>) + 'static) -> Watcher<T> {
        Watcher { node: WatchNode::create(self.clone(), Box::new(callback)) }
    }

    pub fn ptr_eq(&self, other: &Signal<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Data> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: Data> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Signal");
        out.field("kind", &self.kind()).field("version", &self.version());
        if let Some(label) = self.label_name() {
            out.field("label", &label);
        }
        out.finish()
    }
}

/// Host-owned observer of a signal.
///
/// A change only marks the watcher pending; [`Watcher::poll`] reconciles, re-registers and
/// runs the callback, so writes made between two polls are seen as one change.
pub struct Watcher<T> {
    node: Rc<WatchNode<T>>,
}

impl<T: Data> Watcher<T> {
    pub fn is_pending(&self) -> bool {
        self.node.is_pending()
    }

    /// Returns whether the callback ran.
    pub fn poll(&self) -> bool {
        self.node.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_constant_version_fixed() {
        let c = Signal::ok(3);
        assert_eq!(c.get(), Ok(3));
        assert_eq!(c.version(), 1);
        assert_eq!(c.set_ok(4), Err(SignalError::ReadOnly(SignalKind::Const)));
    }

    #[test]
    fn test_cell_set_equal_is_noop() {
        let cell = Signal::cell_ok(1);
        let doubled = cell.map(|x| x * 2);
        assert_eq!(doubled.get(), Ok(2));

        cell.set_ok(1).unwrap();
        assert_eq!(cell.version(), 1);
        assert_eq!(doubled.version(), 1);
    }

    #[test]
    fn test_map_error_passes_through() {
        let cell: Signal<i32> = Signal::cell(Err(SignalError::Failed("boom".into())));
        let calls = Rc::new(Cell::new(0));
        let counted = calls.clone();
        let mapped = cell.map(move |x| {
            counted.set(counted.get() + 1);
            x + 1
        });
        assert_eq!(mapped.get(), Err(SignalError::Failed("boom".into())));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_map_fused_collapses_chain() {
        let cell = Signal::cell_ok(1);
        let first = cell.map(|x| x + 1);
        let fused = first.map_fused(|x| Ok(x * 10));
        assert_eq!(fused.kind(), SignalKind::Map);
        assert_eq!(fused.get(), Ok(20));

        cell.set_ok(2).unwrap();
        assert_eq!(fused.get(), Ok(30));
    }

    #[test]
    fn test_flat_map_follows_inner() {
        let switch = Signal::cell_ok(true);
        let a = Signal::cell_ok(1);
        let b = Signal::cell_ok(100);
        let (a2, b2) = (a.clone(), b.clone());
        let chosen = switch.flat_map(move |on| if *on { a2.clone() } else { b2.clone() });

        assert_eq!(chosen.get(), Ok(1));
        a.set_ok(2).unwrap();
        assert_eq!(chosen.get(), Ok(2));

        switch.set_ok(false).unwrap();
        assert_eq!(chosen.get(), Ok(100));

        // the old inner no longer affects the result
        a.set_ok(3).unwrap();
        let version = chosen.version();
        assert_eq!(chosen.get(), Ok(100));
        assert_eq!(chosen.version(), version);
    }

    #[test]
    fn test_map_writable_caches_immediately() {
        let celsius = Signal::cell_ok(0.0_f64);
        let fahrenheit = celsius.map_writable(|c| c * 9.0 / 5.0 + 32.0, |f| (f - 32.0) * 5.0 / 9.0);
        assert_eq!(fahrenheit.get(), Ok(32.0));

        let version = fahrenheit.version();
        fahrenheit.set_ok(212.0).unwrap();
        assert_eq!(fahrenheit.version(), version + 1);
        assert_eq!(celsius.get(), Ok(100.0));
        assert_eq!(fahrenheit.get(), Ok(212.0));
        assert_eq!(fahrenheit.version(), version + 1);
    }

    #[test]
    fn test_join_first_error_wins() {
        let a = Signal::cell_ok(1);
        let b = Signal::cell(Err(SignalError::Failed("first".into())));
        let c = Signal::err(SignalError::Failed("second".into()));
        let joined = Signal::join(vec![a.clone(), b.clone(), c]);
        assert_eq!(joined.get(), Err(SignalError::Failed("first".into())));

        b.set_ok(2).unwrap();
        assert_eq!(joined.get(), Err(SignalError::Failed("second".into())));
    }

    #[test]
    fn test_lift_to_try() {
        let cell: Signal<i32> = Signal::cell(Err(SignalError::Failed("x".into())));
        let lifted = cell.lift_to_try();
        assert_eq!(lifted.get(), Ok(Err(SignalError::Failed("x".into()))));
        cell.set_ok(4).unwrap();
        assert_eq!(lifted.get(), Ok(Ok(4)));
    }

    #[test]
    fn test_reference_lifecycle() {
        let r: Signal<i32> = Signal::reference();
        let plus = r.map(|x| x + 1);
        assert_eq!(plus.get(), Err(SignalError::UnresolvedRef));
        assert!(!r.is_resolved());

        let target = Signal::cell_ok(41);
        r.resolve(target.clone()).unwrap();
        assert_eq!(plus.get(), Ok(42));
        assert_eq!(r.resolve(Signal::ok(0)), Err(SignalError::AlreadyResolved));

        target.set_ok(1).unwrap();
        assert_eq!(plus.get(), Ok(2));

        assert_eq!(target.resolve(Signal::ok(0)), Err(SignalError::NotAReference));
    }

    #[test]
    fn test_label_is_transparent() {
        let cell = Signal::cell_ok(1);
        let labelled = cell.label("counter");
        let doubled = labelled.map(|x| x * 2);
        assert_eq!(doubled.get(), Ok(2));
        assert_eq!(labelled.label_name(), Some("counter"));

        labelled.set_ok(5).unwrap();
        assert_eq!(doubled.get(), Ok(10));
    }

    #[test]
    fn test_produce_edits_copy() {
        let cell = Signal::cell_ok(vec![1, 2]);
        cell.produce(|v| v.push(3)).unwrap();
        assert_eq!(cell.get(), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_watcher_batches_until_poll() {
        let cell = Signal::cell_ok(0);
        let seen = Rc::new(Cell::new(0));
        let calls = Rc::new(Cell::new(0));
        let (seen2, calls2) = (seen.clone(), calls.clone());
        let watcher = cell.map(|x| x * 2).watch(move |v| {
            seen2.set(*v.as_ref().unwrap());
            calls2.set(calls2.get() + 1);
        });

        assert!(watcher.poll());
        assert!(!watcher.poll());

        cell.set_ok(1).unwrap();
        cell.set_ok(2).unwrap();
        assert!(watcher.is_pending());
        assert!(watcher.poll());
        assert_eq!(seen.get(), 4);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_dropped_dependent_is_reclaimed() {
        let cell = Signal::cell_ok(1);
        let mapped = cell.map(|x| x + 1);
        assert_eq!(mapped.get(), Ok(2));
        let weak = Rc::downgrade(&mapped.0);
        drop(mapped);
        assert!(weak.upgrade().is_none());
        cell.set_ok(3).unwrap();
    }
}
