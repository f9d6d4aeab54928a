use nalgebra::{Isometry3, Matrix2, Vector3};
use warpmatch::{
    FinderConfig, OwnedImage, PatchFailure, PatchFinder, PatchTemplate, PixelRays,
    PlaneObservation, Pixel, PointId, SourcePatch,
};

const FOCAL: f64 = 500.0;

fn textured(seed: usize) -> OwnedImage {
    OwnedImage::from_fn(64, 64, |x, y| ((x * 37 + y * 91 + x * y * (3 + seed)) % 241) as u8)
        .unwrap()
}

fn observation() -> PlaneObservation {
    PlaneObservation {
        source_from_world: Isometry3::identity(),
        normal: Vector3::new(0.0, 0.0, -1.0),
        rays: PixelRays {
            center: Vector3::new(0.0, 0.0, 1.0),
            right: Vector3::new(1.0 / FOCAL, 0.0, 1.0),
            down: Vector3::new(0.0, 1.0 / FOCAL, 1.0),
        },
    }
}

fn patch(id: u64, image: &OwnedImage, center: Pixel) -> SourcePatch<'_> {
    SourcePatch::from_plane(
        PointId(id),
        image.view(),
        0,
        center,
        Vector3::new(0.0, 0.0, 5.0),
        &observation(),
    )
    .unwrap()
}

/// Current camera looking down the same axis with the point at `depth`.
fn pose_at_depth(depth: f64) -> Isometry3<f64> {
    Isometry3::translation(0.0, 0.0, depth - 5.0)
}

fn derivs() -> Matrix2<f64> {
    Matrix2::new(FOCAL, 0.0, 0.0, FOCAL)
}

#[test]
fn search_level_follows_depth() {
    let img = textured(0);
    let p = patch(1, &img, Pixel::new(32, 32));
    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();

    assert_eq!(
        finder.calc_search_level_and_warp(&p, &pose_at_depth(5.0), &derivs()),
        Some(0)
    );
    assert!((finder.warp() - Matrix2::identity()).norm() < 1e-12);
    assert_eq!(
        finder.calc_search_level_and_warp(&p, &pose_at_depth(2.5), &derivs()),
        Some(1)
    );
    assert_eq!(
        finder.calc_search_level_and_warp(&p, &pose_at_depth(1.25), &derivs()),
        Some(2)
    );
    assert_eq!(
        finder.calc_search_level_and_warp(&p, &pose_at_depth(9.0), &derivs()),
        Some(0)
    );
    assert_eq!(
        finder.calc_search_level_and_warp(&p, &pose_at_depth(20.0), &derivs()),
        None
    );
    assert_eq!(finder.last_failure(), Some(PatchFailure::DegenerateWarp));
}

#[test]
fn search_level_is_monotone_in_area_scale() {
    let img = textured(0);
    let p = patch(1, &img, Pixel::new(32, 32));
    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();

    let mut last = 0usize;
    let mut depth = 9.5;
    while depth > 0.5 {
        let level = finder
            .calc_search_level_and_warp(&p, &pose_at_depth(depth), &derivs())
            .unwrap();
        assert!(level >= last, "level dropped at depth {depth}");
        last = level;
        depth *= 0.9;
    }
    assert_eq!(last, 3);
}

#[test]
fn points_behind_either_camera_are_rejected() {
    let img = textured(0);
    let p = patch(1, &img, Pixel::new(32, 32));
    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();
    assert_eq!(
        finder.make_template_coarse(&p, &pose_at_depth(-1.0), &derivs()),
        None
    );
    assert!(finder.template_bad());
    assert_eq!(finder.last_failure(), Some(PatchFailure::DegenerateWarp));

    let obs = observation();
    let behind_source = SourcePatch::from_plane(
        PointId(2),
        img.view(),
        0,
        Pixel::new(32, 32),
        Vector3::new(0.0, 0.0, -5.0),
        &obs,
    );
    assert!(behind_source.is_none());
}

#[test]
fn warped_template_at_unit_scale_copies_the_source_block() {
    let img = textured(0);
    let p = patch(1, &img, Pixel::new(30, 34));
    let mut block = PatchTemplate::new(8);
    assert!(block.copy_block(img.view(), Pixel::new(30, 34)));

    for depth in [5.0, 2.5] {
        let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();
        assert!(finder
            .make_template_coarse(&p, &pose_at_depth(depth), &derivs())
            .is_some());
        assert_eq!(finder.template().data(), block.data());
    }
}

#[test]
fn warped_template_bounds_follow_the_sampled_footprint() {
    // At depth 9 template offsets -4..=3 map to source offsets -7.2..=5.4.
    let img = textured(0);
    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();

    let inside = patch(1, &img, Pixel::new(8, 57));
    assert_eq!(
        finder.make_template_coarse(&inside, &pose_at_depth(9.0), &derivs()),
        Some(0)
    );
    assert!(!finder.template_bad());

    let outside = patch(2, &img, Pixel::new(7, 32));
    assert_eq!(
        finder.make_template_coarse(&outside, &pose_at_depth(9.0), &derivs()),
        None
    );
    assert!(finder.template_bad());
    assert_eq!(finder.last_failure(), Some(PatchFailure::TemplateOutOfBounds));

    let outside = patch(3, &img, Pixel::new(32, 58));
    assert_eq!(
        finder.make_template_coarse(&outside, &pose_at_depth(9.0), &derivs()),
        None
    );
}

#[test]
fn memoized_template_is_reused_for_small_warp_changes() {
    let first = textured(0);
    let second = textured(5);
    let center = Pixel::new(32, 32);

    let mut memo = PatchFinder::new(FinderConfig::default()).unwrap();
    let mut fresh = PatchFinder::new(FinderConfig {
        memoize_templates: false,
        ..FinderConfig::default()
    })
    .unwrap();

    for finder in [&mut memo, &mut fresh] {
        assert!(finder
            .make_template_coarse(&patch(1, &first, center), &pose_at_depth(5.0), &derivs())
            .is_some());
    }
    let original = memo.template().data().to_vec();

    // Same point, warp columns move by 0.02 source pixels.
    for finder in [&mut memo, &mut fresh] {
        assert!(finder
            .make_template_coarse(&patch(1, &second, center), &pose_at_depth(5.1), &derivs())
            .is_some());
    }
    assert_eq!(memo.template().data(), original.as_slice());
    assert_ne!(fresh.template().data(), original.as_slice());

    // A larger change refreshes even with memoization on.
    assert!(memo
        .make_template_coarse(&patch(1, &second, center), &pose_at_depth(6.0), &derivs())
        .is_some());
    assert_ne!(memo.template().data(), original.as_slice());
}

#[test]
fn memoization_tracks_template_failures() {
    let img = textured(0);
    let edge = patch(4, &img, Pixel::new(7, 32));
    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();

    assert_eq!(
        finder.make_template_coarse(&edge, &pose_at_depth(9.0), &derivs()),
        None
    );
    // Reused memo entry still reports the bad template.
    assert_eq!(
        finder.make_template_coarse(&edge, &pose_at_depth(9.05), &derivs()),
        None
    );
    assert!(finder.template_bad());
}
