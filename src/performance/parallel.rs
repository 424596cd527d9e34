//! Parallel document checking
//!
//! Documents check independently once their module types are known, so a batch is spread over
//! a rayon pool. Each document gets its own interface map; only the fragment cache is shared.

use crate::analysis::ModuleTypeEnv;
use crate::document::{CheckedDocument, Document, DocumentCompiler};
use crate::infrastructure::config::CheckConfig;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Result of checking one document of a batch
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Position of the document in the batch
    pub index: usize,
    pub checked: CheckedDocument,
    pub duration_ms: u64,
}

/// Batch checker over a rayon pool
pub struct ParallelChecker {
    compiler: DocumentCompiler,

    /// Dedicated pool; `None` uses rayon's global pool
    pool: Option<rayon::ThreadPool>,
}

impl ParallelChecker {
    /// `workers == 0` uses the global pool.
    pub fn new(compiler: DocumentCompiler, workers: usize) -> Self {
        let pool = if workers > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .ok()
        } else {
            None
        };

        Self { compiler, pool }
    }

    pub fn worker_count(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Check every document; reports come back in input order.
    pub fn check_all(&self, documents: &[Document]) -> Vec<CheckReport> {
        let start = Instant::now();
        let run = || {
            documents.par_iter()
                .enumerate()
                .map(|(index, doc)| self.check_one(index, doc))
                .collect::<Vec<_>>()
        };
        let reports = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        info!(
            documents = documents.len(),
            workers = self.worker_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch checked"
        );
        reports
    }

    fn check_one(&self, index: usize, doc: &Document) -> CheckReport {
        let start = Instant::now();
        let checked = self.compiler.check(doc);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(index, errors = checked.errors.len(), duration_ms, "document checked");
        CheckReport { index, checked, duration_ms }
    }
}

/// Check independent documents in parallel against shared module types.
pub fn check_documents(
    documents: &[Document],
    config: &CheckConfig,
    modules: &ModuleTypeEnv,
) -> Vec<CheckedDocument> {
    let compiler = DocumentCompiler::new(config.clone()).with_modules(modules.clone());
    documents.par_iter()
        .map(|doc| compiler.check(doc))
        .collect()
}
