//! Concurrency and persistence properties of the dataset store.

#![cfg(feature = "storage_csv")]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_test::assert_ok;
use sweep_daq::{
    is_sentinel, Action, ArrayDescriptor, ArrayKind, CsvFormatter, DataSet, Loop,
    MockInstrument, Monitor, OverflowPolicy, RunMetadata, RunStatus, SweepConfig, SweepError,
    SweepRange, Validator,
};

fn config(root: &std::path::Path) -> SweepConfig {
    SweepConfig {
        data_root: root.to_path_buf(),
        monitor_capacity: 256,
        ..SweepConfig::default()
    }
}

fn one_array_metadata(name: &str, cells: usize) -> RunMetadata {
    RunMetadata::new(name, vec![cells]).with_array(ArrayDescriptor {
        name: "q".into(),
        unit: "".into(),
        shape: vec![cells],
        validator: "any".into(),
        kind: ArrayKind::Measured,
    })
}

#[tokio::test]
async fn concurrent_writers_never_corrupt_cells() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ds = Arc::new(
        DataSet::create(
            dir.path(),
            one_array_metadata("torture", 128),
            Arc::new(CsvFormatter::new()),
        )
        .await?,
    );

    // Disjoint index sets from several tasks, racing against readers.
    let mut tasks = Vec::new();
    for worker in 0..4usize {
        let ds = ds.clone();
        tasks.push(tokio::spawn(async move {
            for i in (worker..128).step_by(4) {
                ds.write("q", &[i], i as f64).unwrap();
            }
        }));
    }
    let reader_ds = ds.clone();
    tasks.push(tokio::spawn(async move {
        for _ in 0..50 {
            let snap = reader_ds.snapshot("q").unwrap();
            assert_eq!(snap.len(), 128);
            tokio::task::yield_now().await;
        }
    }));
    for task in tasks {
        task.await?;
    }

    for i in 0..128 {
        assert_eq!(ds.read("q", &[i])?, i as f64);
    }
    // Every cell is now finalized: a second write must be rejected.
    assert!(matches!(
        ds.write("q", &[64], 0.0),
        Err(SweepError::Overwrite { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn flush_is_idempotent_across_cycles() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ds = DataSet::create(
        dir.path(),
        one_array_metadata("idem", 4),
        Arc::new(CsvFormatter::new()),
    )
    .await?;

    ds.write("q", &[0], 1.0)?;
    ds.write("q", &[1], 2.0)?;
    tokio_test::assert_ok!(ds.flush().await);
    assert_eq!(ds.flush().await?, 0);
    assert_eq!(ds.flush().await?, 0);

    ds.write("q", &[2], 3.0)?;
    assert_eq!(ds.flush().await?, 1);

    // Reload sees each cell exactly once despite the repeated flushes.
    let loaded = DataSet::load(ds.location(), Arc::new(CsvFormatter::new())).await?;
    assert_eq!(&loaded.snapshot("q")?[..3], &[1.0, 2.0, 3.0]);
    assert!(is_sentinel(loaded.snapshot("q")?[3]));
    Ok(())
}

#[tokio::test]
async fn subscriber_observes_live_run_without_blocking_it() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let rig = MockInstrument::new();
    rig.set_register("q", 1.25);

    let mut cfg = config(dir.path());
    cfg.flush_every_points = 2;

    let gate = Arc::new(rig.parameter("gate", Validator::None));
    let meter = Arc::new(rig.parameter("q", Validator::None));
    let active = Loop::sweep(gate, SweepRange::by_num(0.0, 1.0, 6))
        .each(Action::Read(meter))
        .compile("live", &cfg, Arc::new(CsvFormatter::new()))
        .await?;

    // Capacity 1 with a consumer that never drains: acquisition must not
    // stall, drops are merely counted.
    let (slow_id, _slow_rx) = active.dataset().subscribe(1, OverflowPolicy::DropNewest);
    let (_fast_id, mut fast_rx) = active.dataset().subscribe(64, OverflowPolicy::DropNewest);

    let report = active.run().await?;
    assert_eq!(report.status, RunStatus::Completed);

    let mut seen = 0usize;
    let mut last_seq = None;
    while let Ok(notice) = fast_rx.try_recv() {
        if let Some(prev) = last_seq {
            assert!(notice.seq > prev);
        }
        last_seq = Some(notice.seq);
        seen += notice
            .regions
            .iter()
            .filter(|r| r.array == "q")
            .map(|r| r.values.len())
            .sum::<usize>();
    }
    assert_eq!(seen, 6);
    assert!(active.dataset().subscriber_dropped(slow_id) > 0);
    Ok(())
}

#[tokio::test]
async fn monitor_and_sweep_share_one_dataset() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let rig = MockInstrument::new().with_latency(Duration::from_millis(2));
    rig.set_register("q", 5.0);
    rig.set_register("cryo_temp", 4.2);

    let cfg = config(dir.path());
    let gate = Arc::new(rig.parameter("gate", Validator::None));
    let meter = Arc::new(rig.parameter("q", Validator::None));
    let temperature = Arc::new(rig.parameter("cryo_temp", Validator::None));

    let active = Loop::sweep(gate, SweepRange::by_num(0.0, 1.0, 10))
        .each(Action::Read(meter))
        .compile("shared", &cfg, Arc::new(CsvFormatter::new()))
        .await?;

    let monitor = Monitor::new()
        .poll(temperature, Duration::from_millis(3))
        .attach(active.dataset(), &cfg)?
        .spawn();

    let report = active.run().await?;
    monitor.shutdown().await;

    assert_eq!(report.status, RunStatus::Completed);
    let ds = active.dataset();
    // Sweep cells are untouched by the monitor.
    assert!(ds.snapshot("q")?.iter().all(|&v| v == 5.0));
    // The monitor appended into its own array.
    let monitor_samples = ds.snapshot("cryo_temp_monitor")?;
    let written = monitor_samples.iter().filter(|v| !is_sentinel(**v)).count();
    assert!(written >= 1);
    assert!(monitor_samples[..written].iter().all(|&v| v == 4.2));
    Ok(())
}

#[tokio::test]
async fn finalized_dataset_rejects_monitor_attachment() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ds = Arc::new(
        DataSet::create(
            dir.path(),
            one_array_metadata("done", 1),
            Arc::new(CsvFormatter::new()),
        )
        .await?,
    );
    ds.finalize(RunStatus::Completed, None).await?;

    let temperature = Arc::new(sweep_daq::Parameter::new("t").with_initial(1.0));
    let result = Monitor::new()
        .poll(temperature, Duration::from_millis(1))
        .attach(ds, &config(dir.path()));
    assert!(matches!(result, Err(SweepError::ReadOnly(_))));
    Ok(())
}
