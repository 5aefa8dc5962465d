//! Compiled-plan cache.
//!
//! Compilation is deterministic for a given (request, catalog) pair, so plan
//! sets can be cached and shared. Keys combine the catalog name with a stable
//! serialization of the request; values are `Arc`-shared plan sets evicted
//! least-recently-used once the cache is full.
//!
//! The cache is an explicit object — construct one per planning surface and
//! share it; there is no global instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::model_catalog::EntityCatalog;
use crate::query_planner;
use crate::query_planner::errors::QueryPlannerError;
use crate::query_planner::plan::QueryPlanSet;
use crate::query_request::FetchQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry {
    plans: Arc<QueryPlanSet>,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

pub struct PlanCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PlanCache {
    pub fn new(max_entries: usize) -> Self {
        PlanCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached plan set for `query`, compiling and inserting it on a
    /// miss. Compilation runs outside the cache lock; two threads racing the
    /// same key compile the same (deterministic) plans and the later insert
    /// simply wins.
    pub fn get_or_compile(
        &self,
        query: &FetchQuery,
        catalog: &EntityCatalog,
    ) -> Result<Arc<QueryPlanSet>, QueryPlannerError> {
        let key = Self::fingerprint(query, catalog)?;

        {
            let mut inner = self.inner.lock().expect("plan cache lock poisoned");
            inner.tick += 1;
            let tick = inner.tick;
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.last_used = tick;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.plans.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let plans = Arc::new(query_planner::compile(query, catalog)?);

        let mut inner = self.inner.lock().expect("plan cache lock poisoned");
        inner.tick += 1;
        let tick = inner.tick;
        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("plan cache full, evicted least-recently-used entry");
            }
        }
        inner.entries.insert(
            key,
            CacheEntry {
                plans: plans.clone(),
                last_used: tick,
            },
        );
        Ok(plans)
    }

    pub fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("plan cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("plan cache lock poisoned")
            .entries
            .clear();
    }

    fn fingerprint(
        query: &FetchQuery,
        catalog: &EntityCatalog,
    ) -> Result<String, QueryPlannerError> {
        let body = serde_json::to_string(query).map_err(|e| {
            QueryPlannerError::UnsupportedExpression(format!("unserializable request: {e}"))
        })?;
        Ok(format!("{}::{body}", catalog.name()))
    }
}
