use filesweeper::cache::{CacheSettings, HashCache};
use filesweeper::config::OptimizationConfig;
use filesweeper::controller::{FindEvent, PipelineEvent, PipelineState, ScanController};
use filesweeper::scanner::{FileTypeFilter, FilterConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn populate(root: &Path, dirs: usize, files_per_dir: usize) {
    for d in 0..dirs {
        let dir = root.join(format!("dir{d:03}"));
        fs::create_dir(&dir).unwrap();
        for f in 0..files_per_dir {
            fs::write(dir.join(format!("f{f:03}.dat")), format!("payload {}", f % 7)).unwrap();
        }
    }
}

fn assert_well_formed<T: std::fmt::Debug>(events: &[PipelineEvent<T>]) {
    assert!(matches!(events.first(), Some(PipelineEvent::Started)));
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "exactly one terminal event: {events:?}");
    assert!(events.last().unwrap().is_terminal());

    let mut last = 0;
    for event in events {
        if let PipelineEvent::Progress { percent, .. } = event {
            assert!(*percent >= last, "progress went backwards");
            assert!(*percent <= 100);
            last = *percent;
        }
    }
}

#[test]
fn test_run_pipeline_finds_duplicates() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 3, 14);

    let controller = ScanController::new();
    let events: Vec<FindEvent> = controller
        .run_pipeline(dir.path(), FilterConfig::default(), OptimizationConfig::default())
        .iter()
        .collect();

    assert_well_formed(&events);
    let Some(PipelineEvent::Finished(report)) = events.last() else {
        panic!("expected Finished");
    };
    assert_eq!(report.duplicates.len(), 7);
    assert_eq!(report.summary.input_files, 42);
    assert_eq!(controller.state(), PipelineState::Done);
}

#[test]
fn test_find_duplicates_over_file_list() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let c = dir.path().join("c");
    fs::write(&a, "twin").unwrap();
    fs::write(&b, "twin").unwrap();
    fs::write(&c, "solo").unwrap();

    let controller = ScanController::new();
    let events: Vec<FindEvent> = controller
        .find_duplicates(vec![a.clone(), b.clone(), c], OptimizationConfig::default())
        .iter()
        .collect();

    assert_well_formed(&events);
    let Some(PipelineEvent::Finished(report)) = events.last() else {
        panic!("expected Finished");
    };
    let groups: Vec<_> = report.duplicates.values().collect();
    assert_eq!(groups, vec![&vec![a, b]]);
}

#[test]
fn test_second_run_hits_cache_for_every_file() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 2, 10);
    let cache = Arc::new(HashCache::in_memory(CacheSettings::default()));
    let controller = ScanController::new().with_cache(cache);

    let run = || -> filesweeper::controller::FindReport {
        match controller
            .run_pipeline(dir.path(), FilterConfig::default(), OptimizationConfig::default())
            .iter()
            .last()
        {
            Some(PipelineEvent::Finished(report)) => report,
            other => panic!("expected Finished, got {other:?}"),
        }
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert_eq!(second.summary.cache_misses, 0);
    assert_eq!(second.summary.cache_hits, first.summary.hashed_files);
}

#[test]
fn test_cache_hashes_false_bypasses_cache() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 1, 4);
    let cache = Arc::new(HashCache::in_memory(CacheSettings::default()));
    let controller = ScanController::new().with_cache(cache.clone());

    let options = OptimizationConfig {
        cache_hashes: false,
        ..OptimizationConfig::default()
    };
    let events: Vec<FindEvent> = controller
        .run_pipeline(dir.path(), FilterConfig::default(), options)
        .iter()
        .collect();
    assert!(matches!(events.last(), Some(PipelineEvent::Finished(_))));
    assert!(cache.is_empty());
}

#[test]
fn test_stop_mid_traversal_yields_cancelled() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 100, 50);

    let controller = ScanController::new();
    let events = controller.run_pipeline(
        dir.path(),
        FilterConfig::default(),
        OptimizationConfig {
            cache_hashes: false,
            ..OptimizationConfig::default()
        },
    );

    let mut seen = Vec::new();
    for event in events.iter() {
        let is_progress = matches!(event, PipelineEvent::Progress { .. });
        seen.push(event);
        if is_progress && seen.len() == 2 {
            controller.stop_scan();
        }
    }

    assert_well_formed(&seen);
    assert!(
        matches!(seen.last(), Some(PipelineEvent::Cancelled)),
        "cancellation must never end in Finished"
    );
    assert!(!seen.iter().any(|e| matches!(e, PipelineEvent::Finished(_))));
    assert_eq!(controller.state(), PipelineState::Cancelled);
}

#[test]
fn test_start_scan_applies_filter() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("big.bin"), vec![0u8; 500 * 1024]).unwrap();
    fs::write(dir.path().join("photo.png"), vec![1u8; 700 * 1024]).unwrap();
    fs::write(dir.path().join("notes.txt"), vec![2u8; 700 * 1024]).unwrap();

    let scan = |filter: FilterConfig| -> Vec<String> {
        let controller = ScanController::new();
        match controller.start_scan(dir.path(), filter).iter().last() {
            Some(PipelineEvent::Finished(paths)) => paths
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect(),
            other => panic!("expected Finished, got {other:?}"),
        }
    };

    let by_size = scan(FilterConfig {
        min_size_kb: 600,
        ..FilterConfig::default()
    });
    assert_eq!(by_size, vec!["notes.txt", "photo.png"]);

    let images = scan(FilterConfig {
        file_type: FileTypeFilter::Image,
        ..FilterConfig::default()
    });
    assert_eq!(images, vec!["photo.png"]);

    let nothing = scan(FilterConfig {
        file_type: FileTypeFilter::Custom,
        custom_extensions: String::new(),
        ..FilterConfig::default()
    });
    assert!(nothing.is_empty());
}

#[test]
fn test_invalid_root_is_a_single_error() {
    let dir = tempdir().unwrap();
    let controller = ScanController::new();
    let events: Vec<FindEvent> = controller
        .run_pipeline(
            &dir.path().join("missing"),
            FilterConfig::default(),
            OptimizationConfig::default(),
        )
        .iter()
        .collect();

    assert_well_formed(&events);
    assert_eq!(events.len(), 2);
    assert!(matches!(events.last(), Some(PipelineEvent::Error(_))));
    assert_eq!(controller.state(), PipelineState::Errored);
}
