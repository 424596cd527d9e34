//! Fragment-level memo for checking results
//!
//! Content-addressed in-memory storage with LRU eviction. A key covers a fragment's subtree and
//! everything the check of that subtree can observe, so a hit can be replayed verbatim.

use crate::ast::{Ast, NodeId, NodeKind};
use crate::ast::visitor::free_identifiers;
use crate::analysis::{CheckOptions, ModuleTypeEnv};
use crate::core::env::TypeEnv;
use crate::core::interface::Interface;
use blake3::Hasher;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// Content hash of a fragment and its checking context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Cache key for lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub fragment: usize,
    pub hash: ContentHash,
}

impl CacheKey {
    pub fn new(fragment: usize, hash: ContentHash) -> Self {
        Self { fragment, hash }
    }

    /// Key for checking fragment `node` at position `fragment` under `env`.
    ///
    /// Hashes the subtree nodes with their ids, the typings of its free identifiers, the types of
    /// modules it imports and the checker options. `None` if part of it cannot be serialized.
    pub fn for_fragment(
        fragment: usize,
        ast: &Ast,
        node: NodeId,
        env: &TypeEnv,
        modules: &ModuleTypeEnv,
        options: CheckOptions,
    ) -> Option<Self> {
        let mut hasher = Hasher::new();
        hasher.update(&[options.allow_unannotated_params as u8]);

        for id in subtree(ast, node) {
            hasher.update(&(id.index() as u64).to_le_bytes());
            hasher.update(&serde_json::to_vec(ast.node(id)).ok()?);
        }

        for name in free_identifiers(ast, node) {
            hasher.update(name.as_bytes());
            match env.get(&name) {
                Some(interface) => hasher.update(&serde_json::to_vec(interface).ok()?),
                None => hasher.update(b"\0unbound"),
            };
        }

        if let NodeKind::Import { module, .. } = ast.kind(node) {
            hasher.update(module.as_bytes());
            if let Some(ty) = modules.get(module) {
                hasher.update(&serde_json::to_vec(ty).ok()?);
            }
        }

        Some(Self::new(fragment, ContentHash(*hasher.finalize().as_bytes())))
    }
}

/// Every node of the subtree rooted at `root`, root first.
pub fn subtree(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        out.push(id);
        let mut children = ast.children(id);
        children.reverse();
        stack.extend(children);
    }
    out
}

/// Checking results of one fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Interfaces of every node in the fragment
    pub interfaces: Vec<(NodeId, Interface)>,

    /// Bindings the fragment added to the environment
    pub bindings: Vec<(String, Interface)>,
}

/// LRU eviction policy
pub struct LruPolicy {
    /// LRU cache tracking access order
    lru: LruCache<CacheKey, ()>,
}

impl LruPolicy {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { lru: LruCache::new(capacity) }
    }

    /// Record access to cache entry
    pub fn access(&mut self, key: &CacheKey) {
        self.lru.get(key);
    }

    /// Track a new key; returns the key evicted to make room, if any
    pub fn insert(&mut self, key: CacheKey) -> Option<CacheKey> {
        match self.lru.push(key.clone(), ()) {
            Some((old, ())) if old != key => Some(old),
            _ => None,
        }
    }

    /// Remove entry from tracking
    pub fn remove(&mut self, key: &CacheKey) {
        self.lru.pop(key);
    }

    pub fn clear(&mut self) {
        self.lru.clear();
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared fragment cache; safe to use from parallel checks
pub struct CheckCache {
    /// In-memory cache
    memory: DashMap<CacheKey, Arc<CacheEntry>>,

    /// LRU eviction policy
    eviction: RwLock<LruPolicy>,

    /// Cache statistics
    stats: RwLock<CacheStats>,
}

impl CheckCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            memory: DashMap::new(),
            eviction: RwLock::new(LruPolicy::new(capacity)),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Get entry from cache
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let found = self.memory.get(key).map(|entry| entry.clone());
        match &found {
            Some(_) => {
                self.stats.write().hits += 1;
                self.eviction.write().access(key);
                trace!(fragment = key.fragment, "fragment cache hit");
            }
            None => self.stats.write().misses += 1,
        }
        found
    }

    /// Store entry in cache
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) {
        let evicted = self.eviction.write().insert(key.clone());
        if let Some(evicted) = evicted {
            self.memory.remove(&evicted);
            self.stats.write().evictions += 1;
        }
        self.memory.insert(key, Arc::new(entry));
    }

    /// Drop every entry for fragment position `fragment`
    pub fn invalidate(&self, fragment: usize) -> usize {
        let stale: Vec<CacheKey> = self.memory.iter()
            .filter(|entry| entry.key().fragment == fragment)
            .map(|entry| entry.key().clone())
            .collect();
        let mut eviction = self.eviction.write();
        for key in &stale {
            self.memory.remove(key);
            eviction.remove(key);
        }
        stale.len()
    }

    /// Clear entire cache
    pub fn clear(&self) {
        self.memory.clear();
        self.eviction.write().clear();
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        *self.stats.read()
    }
}

impl Default for CheckCache {
    fn default() -> Self {
        Self::new(1024)
    }
}
