//! Delimited-text plot source with a background loader.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use csv::{ReaderBuilder, Trim};
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, warn};

use ps_core::notify::ListenerNotifier;
use ps_core::plot::{CancelToken, LoadState, Plot, SourcePlot, WaitError};
use ps_core::series::{RawSeries, Series};

use crate::config::CsvFormat;
use crate::DataError;

/// How often a blocked waiter rechecks its cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(25);

#[derive(Default)]
struct PlotData {
    independent: Option<Arc<dyn Series>>,
    /// Label of the chosen independent series, sticky across reloads so a
    /// reload can re-designate the matching column.
    independent_label: Option<String>,
    categories: IndexMap<String, Vec<Arc<dyn Series>>>,
}

/// Serializes overlapping load requests. `pending` is only ever set while
/// a worker is in flight and is consumed by that worker, under this lock,
/// before it clears `in_flight`.
#[derive(Default)]
struct LoadFlags {
    in_flight: bool,
    pending: bool,
}

struct Inner {
    format: CsvFormat,
    path: RwLock<Option<PathBuf>>,
    title: RwLock<String>,
    data: RwLock<PlotData>,
    state: Mutex<LoadState>,
    loaded_cond: Condvar,
    flags: Mutex<LoadFlags>,
    notifier: ListenerNotifier,
}

/// A plot backed by a delimited text file, loaded on a background thread.
///
/// Readers never observe a partially replaced dataset: the loader builds
/// the full series map aside and swaps it in with one write. Exactly one
/// `("loaded", "true")` notification is emitted per completed load, after
/// the loaded state becomes observable.
#[derive(Clone)]
pub struct CsvPlot {
    inner: Arc<Inner>,
}

impl CsvPlot {
    pub fn new(format: CsvFormat) -> Self {
        Self {
            inner: Arc::new(Inner {
                format,
                path: RwLock::new(None),
                title: RwLock::new(String::new()),
                data: RwLock::new(PlotData::default()),
                state: Mutex::new(LoadState::Unloaded),
                loaded_cond: Condvar::new(),
                flags: Mutex::new(LoadFlags::default()),
                notifier: ListenerNotifier::new("csv-plot"),
            }),
        }
    }

    /// Point the plot at a file and kick off a background load.
    ///
    /// Validation is synchronous: the path must be non-empty, carry a
    /// `.csv` extension and name an existing file. Read and parse failures
    /// after this point are logged, not returned.
    pub fn set_data_source(&self, path: impl Into<PathBuf>) -> Result<(), DataError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(DataError::MissingSource);
        }
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !supported {
            return Err(DataError::UnsupportedExtension(path));
        }
        if !path.is_file() {
            return Err(DataError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        let title = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("untitled")
            .to_string();
        *self.inner.title.write() = title;
        *self.inner.path.write() = Some(path);
        self.load();
        Ok(())
    }
}

impl Inner {
    /// Replace the series map wholesale and make the loaded state
    /// observable.
    fn install(&self, labels: Vec<String>, columns: Vec<Vec<f64>>) {
        let series_list: Vec<Arc<RawSeries>> = labels
            .into_iter()
            .zip(columns)
            .enumerate()
            .map(|(position, (label, column))| {
                let series = Arc::new(RawSeries::new(label));
                series.set_category(self.format.default_category.clone());
                series.set_enabled(position < self.format.default_enabled);
                for value in column {
                    series.append(value);
                }
                series
            })
            .collect();

        {
            let mut data = self.data.write();
            let previous_label = data.independent_label.clone();
            let independent = previous_label
                .as_deref()
                .and_then(|label| series_list.iter().find(|s| s.label() == label))
                .or_else(|| series_list.first())
                .cloned();
            data.independent_label = independent.as_ref().map(|s| s.label());
            data.independent = independent.map(|s| s as Arc<dyn Series>);

            let mut categories = IndexMap::new();
            if !series_list.is_empty() {
                let dependents: Vec<Arc<dyn Series>> = series_list
                    .into_iter()
                    .map(|s| s as Arc<dyn Series>)
                    .collect();
                categories.insert(self.format.default_category.clone(), dependents);
            }
            data.categories = categories;
        }

        let mut state = self.state.lock();
        *state = LoadState::Loaded;
        self.loaded_cond.notify_all();
    }
}

/// Read the retained portion of the file and parse it into one numeric
/// column per header label.
///
/// An I/O failure mid-read or an unparsable numeric token abandons the
/// remaining rows; everything parsed before the failure is returned.
fn read_columns(path: &Path, format: &CsvFormat) -> (Vec<String>, Vec<Vec<f64>>) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            error!(path = %path.display(), "failed to open data source: {err}");
            return (Vec::new(), Vec::new());
        }
    };

    // Comments can appear mid-line, which the csv reader cannot express,
    // so strip them before it sees the bytes.
    let mut retained = String::new();
    for line in BufReader::new(file).lines() {
        match line {
            Ok(line) => {
                if let Some(kept) = format.strip_comment(&line) {
                    retained.push_str(kept);
                    retained.push('\n');
                }
            }
            Err(err) => {
                error!(
                    path = %path.display(),
                    "read failed mid-file: {err}; keeping rows parsed so far"
                );
                break;
            }
        }
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(format.delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(retained.as_bytes());

    let labels: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(str::to_string).collect(),
        Err(err) => {
            error!(path = %path.display(), "failed to read header row: {err}");
            return (Vec::new(), Vec::new());
        }
    };
    if labels.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); labels.len()];
    'rows: for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                error!(path = %path.display(), "record read failed: {err}; dropping remaining rows");
                break;
            }
        };
        // Parse the whole row before touching the columns, so a bad token
        // never leaves a ragged row behind.
        let mut row = Vec::with_capacity(labels.len());
        for (index, label) in labels.iter().enumerate() {
            let field = record.get(index).unwrap_or("");
            match field.parse::<f64>() {
                Ok(value) => row.push(value),
                Err(_) => {
                    warn!(
                        column = %label,
                        value = %field,
                        "non-numeric value; dropping this and all remaining rows"
                    );
                    break 'rows;
                }
            }
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    (labels, columns)
}

impl Plot for CsvPlot {
    fn data_source(&self) -> Option<PathBuf> {
        self.inner.path.read().clone()
    }

    fn title(&self) -> String {
        self.inner.title.read().clone()
    }

    fn set_title(&self, title: &str) {
        *self.inner.title.write() = title.to_string();
    }

    fn axis_count(&self) -> usize {
        2
    }

    fn categories(&self) -> Vec<String> {
        self.inner.data.read().categories.keys().cloned().collect()
    }

    fn dependent_series(&self, category: &str) -> Vec<Arc<dyn Series>> {
        self.inner
            .data
            .read()
            .categories
            .get(category)
            .cloned()
            .unwrap_or_default()
    }

    fn independent_series(&self) -> Option<Arc<dyn Series>> {
        self.inner.data.read().independent.clone()
    }

    fn set_independent_series(&self, series: Arc<dyn Series>) {
        let mut data = self.inner.data.write();
        data.independent_label = Some(series.label());
        data.independent = Some(series);
    }
}

impl SourcePlot for CsvPlot {
    fn load_state(&self) -> LoadState {
        *self.inner.state.lock()
    }

    /// Spawn one background worker for this load request. A request
    /// arriving while a load is in flight is queued: the running worker
    /// reruns once with the then-current path, so a data-source change
    /// during a load is never dropped.
    fn load(&self) {
        if self.inner.path.read().is_none() {
            debug!("load requested with no data source set");
            return;
        }
        {
            let mut flags = self.inner.flags.lock();
            if flags.in_flight {
                flags.pending = true;
                debug!("load already in flight; queued a rerun");
                *self.inner.state.lock() = LoadState::Loading;
                return;
            }
            flags.in_flight = true;
        }
        *self.inner.state.lock() = LoadState::Loading;

        let inner = Arc::clone(&self.inner);
        thread::spawn(move || loop {
            // Re-read the path each pass so a rerun picks up the latest
            // source.
            let path = inner.path.read().clone();
            if let Some(path) = path {
                debug!(path = %path.display(), "loading delimited text source");
                let (labels, columns) = read_columns(&path, &inner.format);
                let rows = columns.first().map(Vec::len).unwrap_or(0);
                inner.install(labels, columns);
                debug!(path = %path.display(), rows, "load complete");
                inner.notifier.notify("loaded", "true");
            }
            let mut flags = inner.flags.lock();
            if flags.pending {
                flags.pending = false;
                continue;
            }
            flags.in_flight = false;
            return;
        });
    }

    fn wait_until_loaded(&self, timeout: Duration, cancel: &CancelToken) -> Result<(), WaitError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if *state == LoadState::Loaded {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::TimedOut);
            }
            // Wait in slices so cancellation is observed promptly even
            // when the load never finishes.
            let slice = CANCEL_POLL.min(deadline - now);
            self.inner
                .loaded_cond
                .wait_for(&mut state, slice);
        }
    }

    fn notifier(&self) -> &ListenerNotifier {
        &self.inner.notifier
    }
}
