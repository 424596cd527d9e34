//! Graph node implementations behind [`Signal`].
//!
//! Every node keeps a weak handle to itself so it can register as a dependent of its sources.
//! No `RefCell` borrow is held while user closures run or while other nodes are notified.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use once_cell::unsync::OnceCell;
use smallvec::SmallVec;
use tracing::trace;

use super::{Data, Outcome, Signal, SignalError, SignalKind};

/// Receiver of invalidation. Dependents are held as `Weak<dyn Dirty>` only.
pub trait Dirty {
    fn dirty(&self);
}

pub(crate) trait Node<T>: Dirty {
    fn kind(&self) -> SignalKind;

    /// Bring the cached value up to date. Never suspends.
    fn reconcile(&self);

    /// Cached value as of the last reconcile.
    fn value(&self) -> Outcome<T>;

    fn version(&self) -> u64;

    fn depend(&self, dependent: Weak<dyn Dirty>);

    fn undepend(&self, dependent: &Weak<dyn Dirty>);

    fn set(&self, _value: Outcome<T>) -> Result<(), SignalError> {
        Err(SignalError::ReadOnly(self.kind()))
    }

    fn label(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

fn same_node(a: &Weak<dyn Dirty>, b: &Weak<dyn Dirty>) -> bool {
    a.as_ptr() as *const () == b.as_ptr() as *const ()
}

/// Set of dependents, deduplicated by address.
#[derive(Default)]
pub(crate) struct Dependents(RefCell<SmallVec<[Weak<dyn Dirty>; 4]>>);

impl Dependents {
    pub(crate) fn add(&self, dependent: Weak<dyn Dirty>) {
        let mut list = self.0.borrow_mut();
        list.retain(|d| d.strong_count() > 0);
        if !list.iter().any(|d| same_node(d, &dependent)) {
            list.push(dependent);
        }
    }

    pub(crate) fn remove(&self, dependent: &Weak<dyn Dirty>) {
        self.0.borrow_mut().retain(|d| !same_node(d, dependent));
    }

    /// Dirty every current dependent once, then forget them.
    pub(crate) fn notify(&self) {
        let list = std::mem::take(&mut *self.0.borrow_mut());
        for dependent in list {
            if let Some(dependent) = dependent.upgrade() {
                dependent.dirty();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.borrow().iter().filter(|d| d.strong_count() > 0).count()
    }
}

/// Memoized result of a derived node.
struct Memo<T> {
    value: Option<Outcome<T>>,
    version: u64,
    dirty: bool,
}

impl<T: Data> Memo<T> {
    fn new() -> Self {
        Self { value: None, version: 0, dirty: true }
    }

    /// Store `next`, bumping the version only when it differs from the cached value.
    fn store(&mut self, next: Outcome<T>) -> bool {
        if self.value.as_ref() == Some(&next) {
            return false;
        }
        self.value = Some(next);
        self.version += 1;
        true
    }

    fn read(&self) -> Outcome<T> {
        self.value.clone().unwrap_or(Err(SignalError::Unreconciled))
    }
}

// ---------------------------------------------------------------------------------------------

pub(crate) struct ConstNode<T> {
    pub(crate) value: Outcome<T>,
}

impl<T: Data> Dirty for ConstNode<T> {
    fn dirty(&self) {}
}

impl<T: Data> Node<T> for ConstNode<T> {
    fn kind(&self) -> SignalKind {
        SignalKind::Const
    }

    fn reconcile(&self) {}

    fn value(&self) -> Outcome<T> {
        self.value.clone()
    }

    fn version(&self) -> u64 {
        1
    }

    fn depend(&self, _dependent: Weak<dyn Dirty>) {}

    fn undepend(&self, _dependent: &Weak<dyn Dirty>) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------------------------

pub(crate) struct CellNode<T> {
    state: RefCell<(Outcome<T>, u64)>,
    dependents: Dependents,
}

impl<T: Data> CellNode<T> {
    pub(crate) fn new(value: Outcome<T>) -> Self {
        Self { state: RefCell::new((value, 1)), dependents: Dependents::default() }
    }
}

impl<T: Data> Dirty for CellNode<T> {
    fn dirty(&self) {}
}

impl<T: Data> Node<T> for CellNode<T> {
    fn kind(&self) -> SignalKind {
        SignalKind::Cell
    }

    fn reconcile(&self) {}

    fn value(&self) -> Outcome<T> {
        self.state.borrow().0.clone()
    }

    fn version(&self) -> u64 {
        self.state.borrow().1
    }

    fn depend(&self, dependent: Weak<dyn Dirty>) {
        self.dependents.add(dependent);
    }

    fn undepend(&self, dependent: &Weak<dyn Dirty>) {
        self.dependents.remove(dependent);
    }

    fn set(&self, value: Outcome<T>) -> Result<(), SignalError> {
        {
            let mut state = self.state.borrow_mut();
            if state.0 == value {
                return Ok(());
            }
            state.0 = value;
            state.1 += 1;
            trace!(version = state.1, "cell set");
        }
        self.dependents.notify();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------------------------

pub(crate) type Transform<S, T> = Rc<dyn Fn(Outcome<S>) -> Outcome<T>>;

/// `Map`, `MapWritable` and `LiftToTry`: one source, one transform over its outcome.
pub(crate) struct MapNode<S, T> {
    pub(crate) kind: SignalKind,
    pub(crate) source: Signal<S>,
    pub(crate) f: Transform<S, T>,
    inverse: Option<Rc<dyn Fn(&T) -> S>>,
    memo: RefCell<Memo<T>>,
    source_version: Cell<u64>,
    dependents: Dependents,
    this: Weak<Self>,
}

impl<S: Data, T: Data> MapNode<S, T> {
    pub(crate) fn create(
        kind: SignalKind,
        source: Signal<S>,
        f: Transform<S, T>,
        inverse: Option<Rc<dyn Fn(&T) -> S>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            kind,
            source,
            f,
            inverse,
            memo: RefCell::new(Memo::new()),
            source_version: Cell::new(0),
            dependents: Dependents::default(),
            this: this.clone(),
        })
    }

    fn me(&self) -> Weak<dyn Dirty> {
        self.this.clone()
    }
}

impl<S: Data, T: Data> Dirty for MapNode<S, T> {
    fn dirty(&self) {
        self.memo.borrow_mut().dirty = true;
        self.dependents.notify();
    }
}

impl<S: Data, T: Data> Node<T> for MapNode<S, T> {
    fn kind(&self) -> SignalKind {
        self.kind
    }

    fn reconcile(&self) {
        {
            let memo = self.memo.borrow();
            if !memo.dirty {
                return;
            }
        }

        self.source.reconcile();
        self.source.node().depend(self.me());

        let version = self.source.version();
        let fresh = self.memo.borrow().value.is_none();
        if fresh || version != self.source_version.get() {
            self.source_version.set(version);
            let next = (self.f)(self.source.node().value());
            let mut memo = self.memo.borrow_mut();
            if memo.store(next) {
                trace!(kind = %self.kind, version = memo.version, "recomputed");
            }
        }

        self.memo.borrow_mut().dirty = false;
    }

    fn value(&self) -> Outcome<T> {
        self.memo.borrow().read()
    }

    fn version(&self) -> u64 {
        self.memo.borrow().version
    }

    fn depend(&self, dependent: Weak<dyn Dirty>) {
        self.dependents.add(dependent);
    }

    fn undepend(&self, dependent: &Weak<dyn Dirty>) {
        self.dependents.remove(dependent);
    }

    fn set(&self, value: Outcome<T>) -> Result<(), SignalError> {
        let inverse = self.inverse.as_ref().ok_or(SignalError::ReadOnly(self.kind))?;
        let written = match &value {
            Ok(v) => Ok(inverse(v)),
            Err(e) => Err(e.clone()),
        };
        self.source.set(written)?;
        self.source.reconcile();

        let changed = {
            let mut memo = self.memo.borrow_mut();
            let changed = memo.store(value);
            memo.dirty = false;
            changed
        };
        self.source_version.set(self.source.version());
        self.source.node().depend(self.me());

        if changed {
            self.dependents.notify();
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------------------------

struct FlatState<T> {
    inner: Option<Signal<T>>,
    inner_version: u64,
}

pub(crate) struct FlatMapNode<S, T> {
    source: Signal<S>,
    f: Rc<dyn Fn(&S) -> Signal<T>>,
    state: RefCell<FlatState<T>>,
    memo: RefCell<Memo<T>>,
    source_version: Cell<u64>,
    dependents: Dependents,
    this: Weak<Self>,
}

impl<S: Data, T: Data> FlatMapNode<S, T> {
    pub(crate) fn create(source: Signal<S>, f: Rc<dyn Fn(&S) -> Signal<T>>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            source,
            f,
            state: RefCell::new(FlatState { inner: None, inner_version: 0 }),
            memo: RefCell::new(Memo::new()),
            source_version: Cell::new(0),
            dependents: Dependents::default(),
            this: this.clone(),
        })
    }

    fn me(&self) -> Weak<dyn Dirty> {
        self.this.clone()
    }
}

impl<S: Data, T: Data> Dirty for FlatMapNode<S, T> {
    fn dirty(&self) {
        self.memo.borrow_mut().dirty = true;
        self.dependents.notify();
    }
}

impl<S: Data, T: Data> Node<T> for FlatMapNode<S, T> {
    fn kind(&self) -> SignalKind {
        SignalKind::FlatMap
    }

    fn reconcile(&self) {
        if !self.memo.borrow().dirty {
            return;
        }

        self.source.reconcile();
        self.source.node().depend(self.me());

        let version = self.source.version();
        let fresh = self.memo.borrow().value.is_none();
        let mut next = None;

        if fresh || version != self.source_version.get() {
            self.source_version.set(version);
            let previous = self.state.borrow_mut().inner.take();
            if let Some(previous) = previous {
                previous.node().undepend(&self.me());
            }
            match self.source.node().value() {
                Ok(value) => {
                    let inner = (self.f)(&value);
                    let mut state = self.state.borrow_mut();
                    state.inner = Some(inner);
                    state.inner_version = 0;
                }
                Err(e) => next = Some(Err(e)),
            }
        }

        let inner = self.state.borrow().inner.clone();
        if let Some(inner) = inner {
            inner.reconcile();
            inner.node().depend(self.me());
            let inner_version = inner.version();
            let mut state = self.state.borrow_mut();
            if state.inner_version == 0 || inner_version != state.inner_version {
                state.inner_version = inner_version.max(1);
                next = Some(inner.node().value());
            }
        }

        let mut memo = self.memo.borrow_mut();
        if let Some(next) = next {
            if memo.store(next) {
                trace!(version = memo.version, "flat_map recomputed");
            }
        }
        memo.dirty = false;
    }

    fn value(&self) -> Outcome<T> {
        self.memo.borrow().read()
    }

    fn version(&self) -> u64 {
        self.memo.borrow().version
    }

    fn depend(&self, dependent: Weak<dyn Dirty>) {
        self.dependents.add(dependent);
    }

    fn undepend(&self, dependent: &Weak<dyn Dirty>) {
        self.dependents.remove(dependent);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------------------------

pub(crate) struct JoinNode<T> {
    children: Vec<Signal<T>>,
    versions: RefCell<Vec<u64>>,
    memo: RefCell<Memo<Vec<T>>>,
    dependents: Dependents,
    this: Weak<Self>,
}

impl<T: Data> JoinNode<T> {
    pub(crate) fn create(children: Vec<Signal<T>>) -> Rc<Self> {
        let versions = vec![0; children.len()];
        Rc::new_cyclic(|this| Self {
            children,
            versions: RefCell::new(versions),
            memo: RefCell::new(Memo::new()),
            dependents: Dependents::default(),
            this: this.clone(),
        })
    }

    fn me(&self) -> Weak<dyn Dirty> {
        self.this.clone()
    }
}

impl<T: Data> Dirty for JoinNode<T> {
    fn dirty(&self) {
        self.memo.borrow_mut().dirty = true;
        self.dependents.notify();
    }
}

impl<T: Data> Node<Vec<T>> for JoinNode<T> {
    fn kind(&self) -> SignalKind {
        SignalKind::Join
    }

    fn reconcile(&self) {
        if !self.memo.borrow().dirty {
            return;
        }

        let mut changed = self.memo.borrow().value.is_none();
        for (i, child) in self.children.iter().enumerate() {
            child.reconcile();
            child.node().depend(self.me());
            let version = child.version();
            let mut versions = self.versions.borrow_mut();
            if versions[i] != version {
                versions[i] = version;
                changed = true;
            }
        }

        if changed {
            // first error wins
            let next: Outcome<Vec<T>> = self.children.iter().map(|c| c.node().value()).collect();
            let mut memo = self.memo.borrow_mut();
            if memo.store(next) {
                trace!(arity = self.children.len(), version = memo.version, "join recomputed");
            }
        }

        self.memo.borrow_mut().dirty = false;
    }

    fn value(&self) -> Outcome<Vec<T>> {
        self.memo.borrow().read()
    }

    fn version(&self) -> u64 {
        self.memo.borrow().version
    }

    fn depend(&self, dependent: Weak<dyn Dirty>) {
        self.dependents.add(dependent);
    }

    fn undepend(&self, dependent: &Weak<dyn Dirty>) {
        self.dependents.remove(dependent);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------------------------

/// Diagnostic wrapper. Dependents register on the wrapped signal directly.
pub(crate) struct LabelNode<T> {
    pub(crate) name: String,
    pub(crate) source: Signal<T>,
}

impl<T: Data> Dirty for LabelNode<T> {
    fn dirty(&self) {}
}

impl<T: Data> Node<T> for LabelNode<T> {
    fn kind(&self) -> SignalKind {
        SignalKind::Label
    }

    fn reconcile(&self) {
        trace!(label = %self.name, "reconcile");
        self.source.reconcile();
    }

    fn value(&self) -> Outcome<T> {
        self.source.node().value()
    }

    fn version(&self) -> u64 {
        self.source.version()
    }

    fn depend(&self, dependent: Weak<dyn Dirty>) {
        self.source.node().depend(dependent);
    }

    fn undepend(&self, dependent: &Weak<dyn Dirty>) {
        self.source.node().undepend(dependent);
    }

    fn set(&self, value: Outcome<T>) -> Result<(), SignalError> {
        self.source.set(value)
    }

    fn label(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------------------------

/// Forward-declared placeholder, resolved once.
pub(crate) struct RefNode<T> {
    target: OnceCell<Signal<T>>,
    pending: Dependents,
}

impl<T: Data> RefNode<T> {
    pub(crate) fn new() -> Self {
        Self { target: OnceCell::new(), pending: Dependents::default() }
    }

    pub(crate) fn resolve(&self, target: Signal<T>) -> Result<(), SignalError> {
        self.target.set(target).map_err(|_| SignalError::AlreadyResolved)?;
        self.pending.notify();
        Ok(())
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.target.get().is_some()
    }
}

impl<T: Data> Dirty for RefNode<T> {
    fn dirty(&self) {}
}

impl<T: Data> Node<T> for RefNode<T> {
    fn kind(&self) -> SignalKind {
        SignalKind::Ref
    }

    fn reconcile(&self) {
        if let Some(target) = self.target.get() {
            target.reconcile();
        }
    }

    fn value(&self) -> Outcome<T> {
        match self.target.get() {
            Some(target) => target.node().value(),
            None => Err(SignalError::UnresolvedRef),
        }
    }

    fn version(&self) -> u64 {
        self.target.get().map_or(0, Signal::version)
    }

    fn depend(&self, dependent: Weak<dyn Dirty>) {
        match self.target.get() {
            Some(target) => target.node().depend(dependent),
            None => self.pending.add(dependent),
        }
    }

    fn undepend(&self, dependent: &Weak<dyn Dirty>) {
        match self.target.get() {
            Some(target) => target.node().undepend(dependent),
            None => self.pending.remove(dependent),
        }
    }

    fn set(&self, value: Outcome<T>) -> Result<(), SignalError> {
        match self.target.get() {
            Some(target) => target.set(value),
            None => Err(SignalError::UnresolvedRef),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------------------------

pub(crate) struct WatchNode<T> {
    source: Signal<T>,
    callback: Box<dyn Fn(&Outcome<T>)>,
    pending: Cell<bool>,
    seen_version: Cell<u64>,
    this: Weak<Self>,
}

impl<T: Data> WatchNode<T> {
    pub(crate) fn create(source: Signal<T>, callback: Box<dyn Fn(&Outcome<T>)>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            source,
            callback,
            pending: Cell::new(true),
            seen_version: Cell::new(0),
            this: this.clone(),
        })
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.get()
    }

    pub(crate) fn poll(&self) -> bool {
        if !self.pending.replace(false) {
            return false;
        }
        self.source.reconcile();
        let me: Weak<dyn Dirty> = self.this.clone();
        self.source.node().depend(me);

        let version = self.source.version();
        if version == self.seen_version.replace(version) {
            return false;
        }
        (self.callback)(&self.source.node().value());
        true
    }
}

impl<T: Data> Dirty for WatchNode<T> {
    fn dirty(&self) {
        self.pending.set(true);
    }
}
