//! Composition root binding a [`ProxyPlot`] to a background-loading
//! source plot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::notify::UpdateListener;
use crate::plot::{CancelToken, Plot, ProxyPlot, SourcePlot, WaitError};
use crate::series::Series;

/// How long [`ProxyProvider::draw`] waits for the initial load before
/// giving up, unless configured otherwise.
pub const DEFAULT_DRAW_TIMEOUT: Duration = Duration::from_secs(30);

/// Marks the provider stale whenever the source reports a completed load.
struct ReloadWatcher {
    stale: Arc<AtomicBool>,
}

impl UpdateListener for ReloadWatcher {
    fn on_update(&self, _source: &str, key: &str, _value: &str) {
        if key == "loaded" {
            self.stale.store(true, Ordering::SeqCst);
        }
    }
}

/// Binds one [`ProxyPlot`] to one source plot and keeps the proxy's series
/// cache reconciled with the source's loads.
///
/// The provider registers itself on the source's notifier; a `"loaded"`
/// event only marks the cache stale, and the actual reconciliation runs
/// lazily on the next structural read, on the reader's thread.
pub struct ProxyProvider<P: SourcePlot + 'static> {
    source: Arc<P>,
    proxy: Arc<ProxyPlot>,
    stale: Arc<AtomicBool>,
    watcher: Arc<dyn UpdateListener>,
    draw_timeout: Duration,
}

impl<P: SourcePlot + 'static> ProxyProvider<P> {
    pub fn new(source: Arc<P>) -> Self {
        Self::with_draw_timeout(source, DEFAULT_DRAW_TIMEOUT)
    }

    pub fn with_draw_timeout(source: Arc<P>, draw_timeout: Duration) -> Self {
        let proxy = Arc::new(ProxyPlot::new());
        proxy.set_source(source.clone() as Arc<dyn Plot>);

        // Starts stale so the first access pulls the initial snapshot.
        let stale = Arc::new(AtomicBool::new(true));
        let watcher: Arc<dyn UpdateListener> = Arc::new(ReloadWatcher {
            stale: stale.clone(),
        });
        source.notifier().register(watcher.clone());

        Self {
            source,
            proxy,
            stale,
            watcher,
            draw_timeout,
        }
    }

    pub fn source(&self) -> &Arc<P> {
        &self.source
    }

    /// The proxy plot a renderer consumes. Prefer [`ProxyProvider::draw`]
    /// for the first access, which waits for the initial load.
    pub fn plot(&self) -> Arc<ProxyPlot> {
        self.proxy.clone()
    }

    /// Block until the source has loaded, reconcile if needed, and return
    /// the plot. Cancellation is cooperative through `cancel`; the
    /// configured timeout bounds the wait either way.
    pub fn draw(&self, cancel: &CancelToken) -> Result<Arc<ProxyPlot>, WaitError> {
        self.source.wait_until_loaded(self.draw_timeout, cancel)?;
        self.ensure_fresh();
        Ok(self.proxy.clone())
    }

    pub fn categories(&self) -> Vec<String> {
        self.ensure_fresh();
        self.proxy.categories()
    }

    pub fn dependent_series(&self, category: &str) -> Vec<Arc<dyn Series>> {
        self.ensure_fresh();
        self.proxy.dependent_series(category)
    }

    pub fn independent_series(&self) -> Option<Arc<dyn Series>> {
        self.ensure_fresh();
        self.proxy.independent_series()
    }

    /// Forwarded to the source plot, which remembers the choice across
    /// reloads.
    pub fn set_independent_series(&self, series: Arc<dyn Series>) {
        self.source.set_independent_series(series);
    }

    fn ensure_fresh(&self) {
        if self.stale.swap(false, Ordering::SeqCst) {
            self.proxy.reload();
        }
    }
}

impl<P: SourcePlot + 'static> Drop for ProxyProvider<P> {
    fn drop(&mut self) {
        self.source.notifier().unregister(&self.watcher);
    }
}
