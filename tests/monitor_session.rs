use image::RgbImage;
use std::sync::Arc;
use vial_monitor::config::KMeansConfig;
use vial_monitor::source::ImageSequence;
use vial_monitor::{
    CaptureOptions, CoordinateSpace, Frame, KMeans, Monitor, MonitorConfig, MonitorError, Point,
    Rect, RegionSet, Resolution, SequenceConfig,
};

const WIDTH: u32 = 300;
const HEIGHT: u32 = 100;
const BACKGROUND: u8 = 15;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A dark frame with bright 3x3 subjects centered on the given points.
fn scene(subjects: &[(u32, u32)]) -> Frame {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, image::Rgb([BACKGROUND; 3]));
    for &(cx, cy) in subjects {
        for y in cy - 1..=cy + 1 {
            for x in cx - 1..=cx + 1 {
                image.put_pixel(x, y, image::Rgb([230, 230, 230]));
            }
        }
    }
    Frame::from_image(image)
}

fn config() -> MonitorConfig {
    MonitorConfig {
        clustering: KMeansConfig {
            seed: Some(2024),
            ..KMeansConfig::default()
        },
        ..MonitorConfig::default()
    }
}

fn three_vials(monitor: &mut Monitor<ImageSequence>) {
    let regions = monitor.regions_mut();
    regions.add_region(Rect::new(0, 0, 100, 100), 1).unwrap();
    regions.add_region(Rect::new(100, 0, 200, 100), 1).unwrap();
    regions.add_region(Rect::new(200, 0, 300, 100), 2).unwrap();
}

fn session(frames: Vec<Frame>, sequence: SequenceConfig) -> Monitor<ImageSequence> {
    let source = ImageSequence::from_frames(frames, sequence).unwrap();
    let mut monitor = Monitor::new(source, config()).unwrap();
    three_vials(&mut monitor);
    monitor
}

#[test]
fn averaged_background_reveals_a_single_subject() {
    init_logging();
    let mut frames = vec![scene(&[]); 4];
    frames.push(scene(&[(52, 40)]));
    let mut monitor = session(frames, SequenceConfig::default());

    monitor.enable_averaging(Some(4)).unwrap();
    for _ in 0..4 {
        monitor.capture(CaptureOptions::default()).unwrap();
    }
    monitor.compute_difference(CaptureOptions::default()).unwrap();

    let extraction = monitor.extract_all(CoordinateSpace::Global);
    assert!(extraction.is_complete());
    assert_eq!(extraction.positions.len(), 3);
    assert_eq!(extraction.positions[&0], vec![Point::new(52, 40)]);
    assert!(extraction.positions[&1].is_empty());
    assert!(extraction.positions[&2].is_empty());
    assert!(monitor.is_at_end());
}

#[test]
fn one_subject_per_vial_is_reported_only_where_it_moved() {
    init_logging();
    let source =
        ImageSequence::from_frames(vec![scene(&[]), scene(&[(40, 50)])], SequenceConfig::default())
            .unwrap();
    let mut monitor = Monitor::new(source, config()).unwrap();
    for x in [0, 100, 200] {
        monitor
            .regions_mut()
            .add_region(Rect::new(x, 0, x + 100, 100), 1)
            .unwrap();
    }

    monitor.capture(CaptureOptions::default()).unwrap();
    monitor.compute_difference(CaptureOptions::default()).unwrap();

    let extraction = monitor.extract_all(CoordinateSpace::Global);
    assert!(extraction.is_complete());
    assert_eq!(extraction.positions.len(), 3);
    assert_eq!(extraction.positions[&0], vec![Point::new(40, 50)]);
    assert_eq!(extraction.positions[&1], Vec::<Point>::new());
    assert_eq!(extraction.positions[&2], Vec::<Point>::new());
}

#[test]
fn two_subjects_in_one_region_are_both_tracked() {
    init_logging();
    let frames = vec![scene(&[]), scene(&[(220, 20), (280, 80)])];
    let mut monitor = session(frames, SequenceConfig::default());
    monitor.capture(CaptureOptions::default()).unwrap();
    monitor.compute_difference(CaptureOptions::default()).unwrap();

    let mut found = monitor
        .extract_region(2, CoordinateSpace::Local)
        .unwrap();
    found.sort_by_key(|p| p.x);
    assert_eq!(found, vec![Point::new(20, 20), Point::new(80, 80)]);
}

#[test]
fn looping_sequence_keeps_producing_frames() {
    init_logging();
    let frames: Vec<Frame> = (0..10).map(|i| scene(&[(10 + i * 5, 50)])).collect();
    let looping = SequenceConfig {
        loop_enabled: true,
        ..SequenceConfig::default()
    };
    let mut monitor = session(frames.clone(), looping);

    for _ in 0..10 {
        monitor.capture(CaptureOptions::default()).unwrap();
    }
    assert!(!monitor.is_at_end());
    let wrapped = monitor.capture(CaptureOptions::default()).unwrap();
    assert_eq!(wrapped, frames[0]);
    assert_eq!(monitor.frames_captured(), 11);
}

#[test]
fn removing_a_region_shifts_result_keys() {
    init_logging();
    let frames = vec![scene(&[]), scene(&[(250, 50)])];
    let mut monitor = session(frames, SequenceConfig::default());
    monitor.regions_mut().remove_region(0).unwrap();
    monitor.capture(CaptureOptions::default()).unwrap();
    monitor.compute_difference(CaptureOptions::default()).unwrap();

    let extraction = monitor.extract_all(CoordinateSpace::Global);
    assert_eq!(extraction.positions.len(), 2);
    assert!(extraction.positions[&0].is_empty());
    assert_eq!(extraction.positions[&1], vec![Point::new(250, 50)]);
}

#[test]
fn regions_survive_a_save_and_a_failed_load() {
    init_logging();
    let frames = vec![scene(&[])];
    let monitor = session(frames, SequenceConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("regions.json");
    monitor.regions().save_to_path(&path).unwrap();

    let mut restored = RegionSet::new(Resolution::new(WIDTH, HEIGHT));
    restored.load_from_path(&path).unwrap();
    assert_eq!(&restored, monitor.regions());

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, r#"{"rectangles": [[0, 0, 10, 10]], "expected_counts": [1, 2]}"#)
        .unwrap();
    let err = restored.load_from_path(&broken).unwrap_err();
    assert!(matches!(err, MonitorError::Format(_)));
    assert_eq!(&restored, monitor.regions());

    let missing = restored.load_from_path(dir.path().join("absent.json"));
    assert!(matches!(missing, Err(MonitorError::Io(_))));
}

#[test]
fn half_scale_calibration_maps_onto_full_frames() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibrated.json");
    std::fs::write(
        &path,
        r#"{"rectangles": [[50, 0, 100, 50]], "expected_counts": [1], "resolution": [150, 50]}"#,
    )
    .unwrap();

    let mut regions = RegionSet::new(Resolution::new(WIDTH, HEIGHT));
    regions.load_from_path(&path).unwrap();
    assert_eq!(regions.region(0).unwrap().rect, Rect::new(100, 0, 200, 100));
}

#[tokio::test]
async fn parallel_extraction_matches_sequential() {
    init_logging();
    let frames = vec![scene(&[]), scene(&[(30, 30), (150, 70), (210, 15), (290, 90)])];
    let mut monitor = session(frames, SequenceConfig::default());
    monitor.capture(CaptureOptions::default()).unwrap();
    monitor.compute_difference(CaptureOptions::default()).unwrap();

    let pool = monitor.spawn_worker_pool();
    for space in [CoordinateSpace::Local, CoordinateSpace::Global] {
        let sequential = monitor.extract_all(space);
        let parallel = monitor.extract_all_parallel(&pool, space).await;
        assert_eq!(parallel.positions, sequential.positions);
        assert_eq!(parallel.failed_indices(), sequential.failed_indices());
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn parallel_extraction_without_difference_fails_every_region() {
    init_logging();
    let monitor = session(vec![scene(&[])], SequenceConfig::default());
    let pool = vial_monitor::WorkerPool::with_workers(
        2,
        monitor.threshold(),
        monitor.config().channel,
        Arc::new(KMeans::seeded(1)),
    );
    let extraction = monitor
        .extract_all_parallel(&pool, CoordinateSpace::Local)
        .await;
    assert_eq!(extraction.failed_indices(), vec![0, 1, 2]);
}
