//! The load cache

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures::future::{BoxFuture, FutureExt, Shared, try_join_all};
use taskqueue::{Scheduler, TaskError, TaskOptions};
use tracing::{debug, info, warn};

use crate::config::LoadCacheConfig;
use crate::error::LoadError;
use crate::priority::PriorityRules;

type Loader<V> = Arc<dyn Fn(String) -> BoxFuture<'static, eyre::Result<V>> + Send + Sync>;
type PriorityFn = Arc<dyn Fn(&str) -> i32 + Send + Sync>;
type InFlight<V> = Shared<BoxFuture<'static, Result<V, LoadError>>>;

struct State<V> {
    cache: HashMap<String, V>,
    in_flight: HashMap<String, InFlight<V>>,
}

/// Keyed cache whose misses are loaded through a [`Scheduler`].
///
/// Cloning shares the cache.
pub struct LoadCache<V> {
    scheduler: Scheduler,
    loader: Loader<V>,
    priority: Arc<RwLock<PriorityFn>>,
    state: Arc<Mutex<State<V>>>,
}

impl<V> Clone for LoadCache<V> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            loader: Arc::clone(&self.loader),
            priority: Arc::clone(&self.priority),
            state: Arc::clone(&self.state),
        }
    }
}

fn rules_fn(rules: PriorityRules) -> PriorityFn {
    Arc::new(move |key: &str| rules.priority_for(key))
}

impl<V> LoadCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache with its own scheduler
    pub fn new<F, Fut>(config: LoadCacheConfig, loader: F) -> eyre::Result<Self>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<V>> + Send + 'static,
    {
        debug!(?config, "LoadCache::new: called");
        let scheduler = Scheduler::spawn(config.scheduler_config())?;
        let cache = Self::with_scheduler(scheduler, loader);
        cache.set_priority_rules(config.priority);
        Ok(cache)
    }

    /// Build a cache on an existing scheduler, using its task defaults
    pub fn with_scheduler<F, Fut>(scheduler: Scheduler, loader: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<V>> + Send + 'static,
    {
        Self {
            scheduler,
            loader: Arc::new(move |key| loader(key).boxed()),
            priority: Arc::new(RwLock::new(rules_fn(PriorityRules::default()))),
            state: Arc::new(Mutex::new(State {
                cache: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached value, the in-flight load for `key`, or a new load.
    ///
    /// Loader errors are retried by the scheduler; timeouts are not.
    pub async fn load(&self, key: &str) -> Result<V, LoadError> {
        let pending = {
            let mut state = self.lock();
            if let Some(value) = state.cache.get(key) {
                debug!(%key, "LoadCache::load: cache hit");
                return Ok(value.clone());
            }
            match state.in_flight.get(key) {
                Some(pending) => {
                    debug!(%key, "LoadCache::load: joining in-flight load");
                    pending.clone()
                }
                None => {
                    let pending = self.start_load(key);
                    state.in_flight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn start_load(&self, key: &str) -> InFlight<V> {
        let priority = self.priority_for(key);
        debug!(%key, priority, "LoadCache::start_load: submitting");

        let loader = Arc::clone(&self.loader);
        let op_key = key.to_string();
        let handle = self.scheduler.submit(
            move || loader(op_key.clone()),
            TaskOptions::new()
                .priority(priority)
                .retry_if(|e| matches!(e, TaskError::Operation(_))),
        );

        let state = Arc::clone(&self.state);
        let key = key.to_string();
        async move {
            let outcome = handle.await;
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.in_flight.remove(&key);
            match outcome {
                Ok(value) => {
                    debug!(%key, "Loaded");
                    Ok(state.cache.entry(key).or_insert(value).clone())
                }
                Err(e) => {
                    warn!(%key, error = %e, "Load failed");
                    Err(LoadError::load(key, e))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Load every key concurrently; all values in order, or the first error
    pub async fn preload<I, K>(&self, keys: I) -> Result<Vec<V>, LoadError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        info!(count = keys.len(), "Preloading");
        try_join_all(keys.iter().map(|key| self.load(key))).await
    }

    /// Forget one key, or everything when `key` is `None`.
    ///
    /// Loads already submitted still run; a later `load` starts a new one.
    pub fn clear(&self, key: Option<&str>) {
        let mut state = self.lock();
        match key {
            Some(key) => {
                debug!(%key, "LoadCache::clear: one key");
                state.cache.remove(key);
                state.in_flight.remove(key);
            }
            None => {
                debug!("LoadCache::clear: all keys");
                state.cache.clear();
                state.in_flight.clear();
            }
        }
    }

    pub fn get_cached(&self, key: &str) -> Option<V> {
        self.lock().cache.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().cache.contains_key(key)
    }

    /// Number of cached values
    pub fn len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace how priorities are derived from keys
    pub fn set_priority_rules(&self, rules: PriorityRules) {
        self.set_priority_fn(move |key| rules.priority_for(key));
    }

    pub fn set_priority_fn<P>(&self, priority: P)
    where
        P: Fn(&str) -> i32 + Send + Sync + 'static,
    {
        let mut current = self.priority.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::new(priority);
    }

    fn priority_for(&self, key: &str) -> i32 {
        let priority = self.priority.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        priority(key)
    }

    /// The scheduler loads run on
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
