//! Core proxy and notification machinery for sharing one expensively
//! loaded dataset across many independently configured views.
//!
//! The pieces, leaf first: [`notify`] fans update events out to observers
//! in registration order; [`series`] and [`plot`] define the capability
//! traits plus the proxy kinds that forward reads to shared data while
//! keeping per-view presentation state; [`store`] indexes series by time
//! for multi-frame data; [`provider`] ties a proxy plot to a background
//! loading source and keeps the two reconciled.

pub mod notify;
pub mod plot;
pub mod provider;
pub mod series;
pub mod store;

// Re-export commonly used types
pub use notify::{ListenerNotifier, UpdateListener};
pub use plot::{CancelToken, LoadState, Plot, ProxyPlot, SourcePlot, WaitError};
pub use provider::ProxyProvider;
pub use series::{ProxySeries, RawSeries, Series, SeriesStyle, DEFAULT_CATEGORY};
pub use store::TimeSeriesStore;
