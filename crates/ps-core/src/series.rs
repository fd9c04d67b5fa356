//! Series capability trait and its two concrete kinds.
//!
//! A [`RawSeries`] owns its samples and presentation state; a
//! [`ProxySeries`] forwards reads to a shared source series while keeping
//! its own label, enabled flag and style, so many views can display the
//! same data with different settings.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::RwLock;

/// Category assigned to series that were not given an explicit grouping.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Opaque key/value bag of presentation hints (color, line width, ...).
///
/// The core never interprets the contents; renderers do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesStyle {
    properties: AHashMap<String, String>,
}

impl SeriesStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Read/write surface shared by all series kinds.
///
/// Implementations use interior mutability so a series can be shared as
/// `Arc<dyn Series>` between the loader thread and any number of views.
pub trait Series: Send + Sync {
    /// Display label. Not guaranteed unique within a plot.
    fn label(&self) -> String;

    fn set_label(&self, label: &str);

    /// The ordered samples, cloned out so callers never hold a lock.
    fn data_points(&self) -> Vec<f64>;

    /// Grouping key under which a plot organizes this series.
    fn category(&self) -> String;

    /// Time tag for time-varying data sets.
    fn time(&self) -> f64;

    /// Optional non-owning parent, used by error-bar series.
    fn parent_series(&self) -> Option<Arc<dyn Series>>;

    fn enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    fn style(&self) -> SeriesStyle;

    fn set_style(&self, style: SeriesStyle);

    /// Minimum and maximum of the finite samples, or `None` when there are
    /// no finite samples at all.
    fn bounds(&self) -> Option<(f64, f64)> {
        let mut bounds: Option<(f64, f64)> = None;
        for value in self.data_points() {
            if !value.is_finite() {
                continue;
            }
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(value), max.max(value)),
                None => (value, value),
            });
        }
        bounds
    }
}

struct RawState {
    label: String,
    data: Vec<f64>,
    enabled: bool,
    style: SeriesStyle,
    time: f64,
    category: String,
    parent: Option<Weak<dyn Series>>,
}

/// A series that owns its own samples, produced by a loader or built up
/// directly by a caller.
pub struct RawSeries {
    state: RwLock<RawState>,
}

impl RawSeries {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(RawState {
                label: label.into(),
                data: Vec::new(),
                enabled: false,
                style: SeriesStyle::default(),
                time: 0.0,
                category: DEFAULT_CATEGORY.to_string(),
                parent: None,
            }),
        }
    }

    pub fn append(&self, value: f64) {
        self.state.write().data.push(value);
    }

    pub fn set_time(&self, time: f64) {
        self.state.write().time = time;
    }

    pub fn set_category(&self, category: impl Into<String>) {
        self.state.write().category = category.into();
    }

    /// Attach a parent series without taking ownership of it.
    pub fn set_parent_series(&self, parent: &Arc<dyn Series>) {
        self.state.write().parent = Some(Arc::downgrade(parent));
    }

    pub fn len(&self) -> usize {
        self.state.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().data.is_empty()
    }
}

impl Series for RawSeries {
    fn label(&self) -> String {
        self.state.read().label.clone()
    }

    fn set_label(&self, label: &str) {
        self.state.write().label = label.to_string();
    }

    fn data_points(&self) -> Vec<f64> {
        self.state.read().data.clone()
    }

    fn category(&self) -> String {
        self.state.read().category.clone()
    }

    fn time(&self) -> f64 {
        self.state.read().time
    }

    fn parent_series(&self) -> Option<Arc<dyn Series>> {
        self.state.read().parent.as_ref().and_then(Weak::upgrade)
    }

    fn enabled(&self) -> bool {
        self.state.read().enabled
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.write().enabled = enabled;
    }

    fn style(&self) -> SeriesStyle {
        self.state.read().style.clone()
    }

    fn set_style(&self, style: SeriesStyle) {
        self.state.write().style = style;
    }
}

struct ProxyState {
    source: Option<Arc<dyn Series>>,
    label: Option<String>,
    enabled: bool,
    style: SeriesStyle,
}

/// A series that forwards reads to a source series while keeping its own
/// presentation state.
///
/// With no source attached it behaves as an independent, empty series.
/// `label`, `enabled` and `style` are always local: they are seeded from
/// the source the first time one is attached and freely overridable after
/// that. This is one-shot initialization, not a live link.
pub struct ProxySeries {
    state: RwLock<ProxyState>,
}

impl ProxySeries {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProxyState {
                source: None,
                label: None,
                enabled: false,
                style: SeriesStyle::default(),
            }),
        }
    }

    /// Convenience constructor wrapping an existing series.
    pub fn wrapping(source: Arc<dyn Series>) -> Self {
        let proxy = Self::new();
        proxy.set_source(source);
        proxy
    }

    pub fn source(&self) -> Option<Arc<dyn Series>> {
        self.state.read().source.clone()
    }

    /// Attach or replace the source series.
    ///
    /// Re-attaching the same series is a no-op. The first attachment seeds
    /// the local enabled flag and style from the source; any attachment
    /// seeds the label if it is still unset.
    pub fn set_source(&self, source: Arc<dyn Series>) {
        let mut state = self.state.write();
        if let Some(current) = &state.source {
            if Arc::ptr_eq(current, &source) {
                return;
            }
        }
        if state.source.is_none() {
            state.enabled = source.enabled();
            state.style = source.style();
        }
        if state.label.is_none() {
            state.label = Some(source.label());
        }
        state.source = Some(source);
    }
}

impl Default for ProxySeries {
    fn default() -> Self {
        Self::new()
    }
}

impl Series for ProxySeries {
    fn label(&self) -> String {
        let state = self.state.read();
        if let Some(label) = &state.label {
            return label.clone();
        }
        state
            .source
            .as_ref()
            .map(|s| s.label())
            .unwrap_or_default()
    }

    fn set_label(&self, label: &str) {
        self.state.write().label = Some(label.to_string());
    }

    fn data_points(&self) -> Vec<f64> {
        self.state
            .read()
            .source
            .as_ref()
            .map(|s| s.data_points())
            .unwrap_or_default()
    }

    fn category(&self) -> String {
        self.state
            .read()
            .source
            .as_ref()
            .map(|s| s.category())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }

    fn time(&self) -> f64 {
        self.state
            .read()
            .source
            .as_ref()
            .map(|s| s.time())
            .unwrap_or(0.0)
    }

    fn parent_series(&self) -> Option<Arc<dyn Series>> {
        self.state
            .read()
            .source
            .as_ref()
            .and_then(|s| s.parent_series())
    }

    fn enabled(&self) -> bool {
        self.state.read().enabled
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.write().enabled = enabled;
    }

    fn style(&self) -> SeriesStyle {
        self.state.read().style.clone()
    }

    fn set_style(&self, style: SeriesStyle) {
        self.state.write().style = style;
    }

    fn bounds(&self) -> Option<(f64, f64)> {
        self.state
            .read()
            .source
            .as_ref()
            .and_then(|s| s.bounds())
    }
}
