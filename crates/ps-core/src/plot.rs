//! Plot capability traits and the reconciling [`ProxyPlot`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::notify::ListenerNotifier;
use crate::series::{ProxySeries, Series};

/// Read/write surface shared by all plot kinds.
pub trait Plot: Send + Sync {
    /// Location of the backing data, when there is one.
    fn data_source(&self) -> Option<PathBuf>;

    fn title(&self) -> String;

    fn set_title(&self, title: &str);

    /// Number of axes the plot draws against.
    fn axis_count(&self) -> usize;

    /// Snapshot of the category keys, in insertion order.
    fn categories(&self) -> Vec<String>;

    /// Snapshot of the dependent series under one category. Empty when the
    /// category is unknown.
    fn dependent_series(&self, category: &str) -> Vec<Arc<dyn Series>>;

    /// The series all dependent series are plotted against. At most one at
    /// a time; absent before the first load.
    fn independent_series(&self) -> Option<Arc<dyn Series>>;

    fn set_independent_series(&self, series: Arc<dyn Series>);
}

/// Load progression of a data-backed plot. `Loading` never falls back to
/// `Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Why a wait for load completion ended without the data.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out waiting for the data source to finish loading")]
    TimedOut,
    #[error("wait for load completion was cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared between a waiting caller and
/// whoever decides to give up on its behalf.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A plot that owns a data source and loads it in the background.
pub trait SourcePlot: Plot {
    fn load_state(&self) -> LoadState;

    fn is_loaded(&self) -> bool {
        self.load_state() == LoadState::Loaded
    }

    /// Begin (or redo) the background load. Implementations are expected
    /// to emit one `("loaded", "true")` notification per completed load.
    fn load(&self);

    /// Block until the plot is loaded, the timeout expires, or the token
    /// is cancelled.
    fn wait_until_loaded(&self, timeout: Duration, cancel: &CancelToken) -> Result<(), WaitError>;

    fn notifier(&self) -> &ListenerNotifier;
}

struct ProxyPlotState {
    source: Option<Arc<dyn Plot>>,
    title: Option<String>,
    independent: Option<Arc<ProxySeries>>,
    /// Derived cache, rebuilt by `reload`; never authoritative.
    cache: IndexMap<String, Vec<Arc<ProxySeries>>>,
}

/// A plot that forwards identity data to a source plot while owning its
/// own category map of [`ProxySeries`].
///
/// The map is a derived cache: [`ProxyPlot::reload`] rebuilds it from the
/// source and carries user-toggled enabled flags over from the previous
/// cache, so per-view settings survive a data reload.
pub struct ProxyPlot {
    state: RwLock<ProxyPlotState>,
}

impl ProxyPlot {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProxyPlotState {
                source: None,
                title: None,
                independent: None,
                cache: IndexMap::new(),
            }),
        }
    }

    pub fn source(&self) -> Option<Arc<dyn Plot>> {
        self.state.read().source.clone()
    }

    /// Attach or replace the source plot. Re-attaching the same plot is a
    /// no-op; the local title is seeded from the source if still unset.
    pub fn set_source(&self, source: Arc<dyn Plot>) {
        let mut state = self.state.write();
        if let Some(current) = &state.source {
            if Arc::ptr_eq(current, &source) {
                return;
            }
        }
        if state.title.is_none() {
            let title = source.title();
            if !title.is_empty() {
                state.title = Some(title);
            }
        }
        state.source = Some(source);
    }

    /// Rebuild the category cache from the source's current series.
    ///
    /// Enabled flags are matched label-first: a new series inherits the
    /// flag of the old series at the same position when the labels agree,
    /// else of the first old series in the same category with the same
    /// label. Series only present in the new snapshot keep the enablement
    /// their loader assigned; categories that vanished are dropped.
    pub fn reload(&self) {
        let source = self.state.read().source.clone();
        let Some(source) = source else {
            let mut state = self.state.write();
            state.cache.clear();
            state.independent = None;
            return;
        };

        let mut fresh: IndexMap<String, Vec<Arc<ProxySeries>>> = IndexMap::new();
        for category in source.categories() {
            let wrapped: Vec<Arc<ProxySeries>> = source
                .dependent_series(&category)
                .into_iter()
                .map(|series| Arc::new(ProxySeries::wrapping(series)))
                .collect();
            fresh.insert(category, wrapped);
        }
        let independent = source
            .independent_series()
            .map(|series| Arc::new(ProxySeries::wrapping(series)));

        let mut state = self.state.write();
        for (category, new_list) in &fresh {
            let Some(old_list) = state.cache.get(category) else {
                continue;
            };
            for (position, new_proxy) in new_list.iter().enumerate() {
                let label = new_proxy.label();
                let matched = old_list
                    .get(position)
                    .filter(|old| old.label() == label)
                    .or_else(|| old_list.iter().find(|old| old.label() == label));
                if let Some(old) = matched {
                    new_proxy.set_enabled(old.enabled());
                }
            }
        }
        if let (Some(new_ind), Some(old_ind)) = (&independent, &state.independent) {
            if new_ind.label() == old_ind.label() {
                new_ind.set_enabled(old_ind.enabled());
            }
        }
        // Wholesale swap: readers see the old cache or the new one, never
        // a partial mix.
        state.cache = fresh;
        state.independent = independent;
    }
}

impl Default for ProxyPlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Plot for ProxyPlot {
    fn data_source(&self) -> Option<PathBuf> {
        self.state
            .read()
            .source
            .as_ref()
            .and_then(|s| s.data_source())
    }

    fn title(&self) -> String {
        let state = self.state.read();
        if let Some(title) = &state.title {
            return title.clone();
        }
        state.source.as_ref().map(|s| s.title()).unwrap_or_default()
    }

    fn set_title(&self, title: &str) {
        self.state.write().title = Some(title.to_string());
    }

    fn axis_count(&self) -> usize {
        self.state
            .read()
            .source
            .as_ref()
            .map(|s| s.axis_count())
            .unwrap_or(2)
    }

    fn categories(&self) -> Vec<String> {
        self.state.read().cache.keys().cloned().collect()
    }

    fn dependent_series(&self, category: &str) -> Vec<Arc<dyn Series>> {
        self.state
            .read()
            .cache
            .get(category)
            .map(|list| {
                list.iter()
                    .map(|proxy| proxy.clone() as Arc<dyn Series>)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn independent_series(&self) -> Option<Arc<dyn Series>> {
        self.state
            .read()
            .independent
            .clone()
            .map(|proxy| proxy as Arc<dyn Series>)
    }

    fn set_independent_series(&self, series: Arc<dyn Series>) {
        if let Some(source) = self.source() {
            source.set_independent_series(series);
        }
    }
}
