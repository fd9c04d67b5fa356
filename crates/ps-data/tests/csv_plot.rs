//! End-to-end tests of the CSV source plot behind the proxy machinery.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ps_core::notify::UpdateListener;
use ps_core::plot::{CancelToken, LoadState, Plot, SourcePlot, WaitError};
use ps_core::provider::ProxyProvider;
use ps_data::{CsvFormat, CsvPlot, DataError};

const WAIT: Duration = Duration::from_secs(10);

fn init_logging() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Unique temp file per test so parallel tests never collide.
fn temp_csv(name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let mut path = std::env::temp_dir();
    path.push(format!("ps-data-it-{}-{name}", std::process::id()));
    fs::write(&path, contents)?;
    Ok(path)
}

/// Counts `("loaded", "true")` events.
struct LoadCounter {
    events: Mutex<Vec<(String, String)>>,
}

impl LoadCounter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn loaded_events(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(k, v)| k == "loaded" && v == "true")
            .count()
    }
}

impl UpdateListener for LoadCounter {
    fn on_update(&self, _source: &str, key: &str, value: &str) {
        self.events.lock().push((key.to_string(), value.to_string()));
    }
}

fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition never held");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn two_column_round_trip() -> anyhow::Result<()> {
    init_logging();
    let path = temp_csv("roundtrip.csv", "X,Y\n1,10\n2,20\n3,30\n")?;

    let plot = CsvPlot::new(CsvFormat::default());
    let counter = LoadCounter::new();
    plot.notifier().register(counter.clone());

    assert_eq!(plot.load_state(), LoadState::Unloaded);
    plot.set_data_source(&path)?;
    plot.wait_until_loaded(WAIT, &CancelToken::new()).unwrap();

    let independent = plot.independent_series().unwrap();
    assert_eq!(independent.label(), "X");
    assert_eq!(independent.data_points(), vec![1.0, 2.0, 3.0]);
    assert!(independent.enabled());

    // The first column doubles as a dependent series.
    let dependents = plot.dependent_series("Other");
    assert_eq!(dependents.len(), 2);
    assert_eq!(dependents[1].label(), "Y");
    assert_eq!(dependents[1].data_points(), vec![10.0, 20.0, 30.0]);
    assert!(dependents[1].enabled());

    assert_eq!(plot.title(), path.file_name().unwrap().to_str().unwrap());
    assert_eq!(dependents[1].bounds(), Some((10.0, 30.0)));

    wait_for(|| counter.loaded_events() == 1);
    // Settle briefly to catch a duplicate notification if one were sent.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.loaded_events(), 1);

    fs::remove_file(path).ok();
    Ok(())
}

#[test]
fn header_only_file_loads_with_empty_series() -> anyhow::Result<()> {
    init_logging();
    let path = temp_csv("header_only.csv", "X,Y\n")?;

    let plot = CsvPlot::new(CsvFormat::default());
    plot.set_data_source(&path)?;
    plot.wait_until_loaded(WAIT, &CancelToken::new()).unwrap();

    assert!(plot.is_loaded());
    let dependents = plot.dependent_series("Other");
    assert_eq!(dependents.len(), 2);
    assert!(dependents.iter().all(|s| s.data_points().is_empty()));

    fs::remove_file(path).ok();
    Ok(())
}

#[test]
fn configuration_errors_are_synchronous() -> anyhow::Result<()> {
    init_logging();
    let plot = CsvPlot::new(CsvFormat::default());

    assert!(matches!(
        plot.set_data_source(""),
        Err(DataError::MissingSource)
    ));
    assert!(matches!(
        plot.set_data_source("/tmp/data.dat"),
        Err(DataError::UnsupportedExtension(_))
    ));
    assert!(matches!(
        plot.set_data_source("/nonexistent/data.csv"),
        Err(DataError::Io(_))
    ));

    // None of those may have started a load.
    assert_eq!(plot.load_state(), LoadState::Unloaded);
    assert!(plot.data_source().is_none());
    Ok(())
}

#[test]
fn wait_times_out_and_cancels_while_unloaded() {
    init_logging();
    let plot = CsvPlot::new(CsvFormat::default());

    assert_eq!(
        plot.wait_until_loaded(Duration::from_millis(30), &CancelToken::new()),
        Err(WaitError::TimedOut)
    );

    let cancel = CancelToken::new();
    cancel.cancel();
    assert_eq!(
        plot.wait_until_loaded(WAIT, &cancel),
        Err(WaitError::Cancelled)
    );
}

#[test]
fn enabled_toggles_survive_a_reload_from_disk() -> anyhow::Result<()> {
    init_logging();
    let path = temp_csv("reload.csv", "T,A,B\n0,1,2\n1,3,4\n")?;

    let plot = Arc::new(CsvPlot::new(CsvFormat::default()));
    let counter = LoadCounter::new();
    plot.notifier().register(counter.clone());
    plot.set_data_source(&path)?;

    let provider = ProxyProvider::new(plot.clone());
    let view = provider.draw(&CancelToken::new()).unwrap();
    let series = view.dependent_series("Other");
    assert_eq!(series.len(), 3);
    // Loader default: first two enabled, the rest disabled.
    assert!(series[0].enabled() && series[1].enabled());
    assert!(!series[2].enabled());

    // This view turns A off and B on.
    series[1].set_enabled(false);
    series[2].set_enabled(true);

    // The file grows a column and gets reloaded.
    fs::write(&path, "T,A,B,C\n0,1,2,9\n1,3,4,9\n")?;
    plot.load();
    wait_for(|| counter.loaded_events() == 2);

    wait_for(|| provider.dependent_series("Other").len() == 4);
    let after = provider.dependent_series("Other");
    assert!(after[0].enabled(), "untouched toggle carried");
    assert!(!after[1].enabled(), "disabled toggle carried");
    assert!(after[2].enabled(), "enabled toggle carried");
    assert!(!after[3].enabled(), "new column takes loader default");
    assert_eq!(after[3].label(), "C");

    fs::remove_file(path).ok();
    Ok(())
}

#[test]
fn source_change_during_a_load_is_not_dropped() -> anyhow::Result<()> {
    init_logging();
    // A large first file keeps its load in flight long enough for the
    // second data source to arrive mid-load.
    let mut slow = String::from("Aone,Atwo\n");
    for row in 0..200_000 {
        slow.push_str(&format!("{row},{}\n", row * 2));
    }
    let path_a = temp_csv("switch-a.csv", &slow)?;
    let path_b = temp_csv("switch-b.csv", "Bone,Btwo\n1,2\n")?;

    let plot = CsvPlot::new(CsvFormat::default());
    plot.set_data_source(&path_a)?;
    plot.set_data_source(&path_b)?;
    assert_eq!(plot.data_source().as_deref(), Some(path_b.as_path()));

    // Whether or not the second request overlapped the first load, the
    // series must end up matching the reported data source.
    wait_for(|| {
        plot.is_loaded()
            && plot
                .dependent_series("Other")
                .iter()
                .map(|s| s.label())
                .collect::<Vec<_>>()
                == ["Bone", "Btwo"]
    });
    assert_eq!(
        plot.independent_series().unwrap().data_points(),
        vec![1.0]
    );

    fs::remove_file(path_a).ok();
    fs::remove_file(path_b).ok();
    Ok(())
}

#[test]
fn chosen_independent_series_is_redesignated_by_label() -> anyhow::Result<()> {
    init_logging();
    let path = temp_csv("independent.csv", "X,Y\n1,10\n2,20\n")?;

    let plot = CsvPlot::new(CsvFormat::default());
    let counter = LoadCounter::new();
    plot.notifier().register(counter.clone());
    plot.set_data_source(&path)?;
    plot.wait_until_loaded(WAIT, &CancelToken::new()).unwrap();
    assert_eq!(plot.independent_series().unwrap().label(), "X");

    // The user plots against Y instead.
    let y = plot.dependent_series("Other")[1].clone();
    plot.set_independent_series(y);

    fs::write(&path, "X,Y\n5,50\n6,60\n")?;
    plot.load();
    wait_for(|| counter.loaded_events() == 2);

    let independent = plot.independent_series().unwrap();
    assert_eq!(independent.label(), "Y");
    assert_eq!(independent.data_points(), vec![50.0, 60.0]);

    fs::remove_file(path).ok();
    Ok(())
}

#[test]
fn two_providers_share_data_but_not_settings() -> anyhow::Result<()> {
    init_logging();
    let path = temp_csv("shared.csv", "X,Y\n1,10\n2,20\n")?;

    let plot = Arc::new(CsvPlot::new(CsvFormat::default()));
    plot.set_data_source(&path)?;

    let first = ProxyProvider::new(plot.clone());
    let second = ProxyProvider::new(plot.clone());
    let cancel = CancelToken::new();
    first.draw(&cancel).unwrap();
    second.draw(&cancel).unwrap();

    // One view disables Y; the other keeps it.
    first.dependent_series("Other")[1].set_enabled(false);
    assert!(!first.dependent_series("Other")[1].enabled());
    assert!(second.dependent_series("Other")[1].enabled());

    // Both read the same underlying samples.
    assert_eq!(
        first.dependent_series("Other")[1].data_points(),
        second.dependent_series("Other")[1].data_points()
    );

    fs::remove_file(path).ok();
    Ok(())
}
