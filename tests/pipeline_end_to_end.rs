use nalgebra::{Isometry3, Matrix2, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use warpmatch::{
    Convergence, CornerIndex, FinderConfig, Frame, FrameLevel, ImagePyramid, OwnedImage,
    PatchFailure, PatchFinder, PixelRays, PlaneObservation, Pixel, PointId, PointQuery,
    SourcePatch,
};

const FOCAL: f64 = 500.0;

fn crop(big: &OwnedImage, x0: usize, y0: usize, width: usize, height: usize) -> OwnedImage {
    let view = big.view();
    OwnedImage::from_fn(width, height, |x, y| *view.get(x0 + x, y0 + y).unwrap()).unwrap()
}

fn random_image(seed: u64, width: usize, height: usize) -> OwnedImage {
    let mut rng = StdRng::seed_from_u64(seed);
    OwnedImage::from_fn(width, height, |_, _| rng.random_range(20..=235)).unwrap()
}

fn plane() -> PlaneObservation {
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

#[test]
fn gradient_image_identity_template_matches_exactly() {
    let img = OwnedImage::from_fn(64, 40, |x, y| (2 * x + 3 * y) as u8).unwrap();
    let source = Pixel::new(20, 15);
    let grid: Vec<Pixel> = (-1..=1)
        .flat_map(|dy| (-1..=1).map(move |dx| Pixel::new(source.x + dx, source.y + dy)))
        .collect();
    let corners = CornerIndex::new(grid, 64, 40).unwrap();
    let frame = Frame::new(vec![FrameLevel::new(img.clone(), corners).unwrap()]).unwrap();

    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();
    assert!(finder.make_template_coarse_no_warp_at(img.view(), 0, source));
    assert!(finder.find_patch_coarse(source, &frame, 2));
    assert!(finder.found());
    assert_eq!(finder.coarse_score(), Some(0));
    assert_eq!(finder.coarse_pixel(), Some(source));
    assert_eq!(finder.coarse_pos(), Some(Vector2::new(20.0, 15.0)));
    assert_eq!(finder.subpix_pos(), Vector2::new(20.0, 15.0));

    // Every window of a ramp scores 0; the candidate nearest the prediction wins.
    assert!(finder.find_patch_coarse(Pixel::new(21, 14), &frame, 2));
    assert_eq!(finder.coarse_pixel(), Some(Pixel::new(21, 14)));

    // A ramp has no texture across its gradient direction.
    assert!(!finder.make_subpix_template());
    assert_eq!(
        finder.last_failure(),
        Some(PatchFailure::SingularNormalEquations)
    );
}

#[test]
fn coarse_search_on_upper_level_reports_level_zero_position() {
    let img = random_image(11, 64, 48);
    let pyramid = ImagePyramid::build_u8(img.view(), 3).unwrap();
    let source_level = pyramid.level(1).unwrap();

    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();
    assert!(finder.make_template_coarse_no_warp_at(source_level, 1, Pixel::new(10, 8)));

    let frame = Frame::with_dense_corners(pyramid.clone()).unwrap();
    assert!(finder.find_patch_coarse(Pixel::new(21, 17), &frame, 4));
    assert_eq!(finder.coarse_pixel(), Some(Pixel::new(10, 8)));
    assert_eq!(finder.coarse_score(), Some(0));
    assert_eq!(finder.coarse_pos(), Some(Vector2::new(20.5, 16.5)));

    assert!(finder.make_subpix_template());
    assert_eq!(
        finder.iterate_subpix_to_convergence(&frame, 10),
        Convergence::Converged { iterations: 1 }
    );
    assert!((finder.subpix_pos() - Vector2::new(20.5, 16.5)).norm() < 1e-9);
    assert_eq!(finder.covariance(), Some(Matrix2::identity() * 2.0));
}

#[test]
fn track_point_follows_a_translated_image() {
    let big = random_image(5, 96, 96);
    let source = crop(&big, 10, 10, 64, 64);
    // Content moves by (+3, -2) pixels between the frames.
    let current = crop(&big, 7, 12, 64, 64);
    let frame = Frame::with_dense_corners(ImagePyramid::build_u8(current.view(), 2).unwrap())
        .unwrap();

    let patch = SourcePatch::from_plane(
        PointId(7),
        source.view(),
        0,
        Pixel::new(32, 32),
        Vector3::new(0.0, 0.0, 5.0),
        &plane(),
    )
    .unwrap();
    let query = PointQuery {
        patch,
        cam_derivs: Matrix2::new(FOCAL, 0.0, 0.0, FOCAL),
        predicted: Pixel::new(34, 31),
        search_radius: 4,
    };

    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();
    let obs = finder
        .track_point(&query, &Isometry3::identity(), &frame, 10)
        .unwrap();
    assert_eq!(obs.level, 0);
    assert_eq!(obs.score, 0);
    assert_eq!(obs.coarse, Vector2::new(35.0, 30.0));
    assert!((obs.position - Vector2::new(35.0, 30.0)).norm() < 1e-6);

    // Too small a radius misses the point.
    let narrow = PointQuery {
        search_radius: 0,
        ..query
    };
    assert_eq!(
        finder.track_point(&narrow, &Isometry3::identity(), &frame, 10),
        Err(PatchFailure::NoMatch)
    );
}

#[test]
fn track_points_reports_per_point_outcomes() {
    let big = random_image(21, 96, 96);
    let source = crop(&big, 10, 10, 64, 64);
    let current = crop(&big, 8, 11, 64, 64);
    let frame = Frame::with_dense_corners(ImagePyramid::build_u8(current.view(), 1).unwrap())
        .unwrap();
    let obs = plane();

    let make = |id: u64, center: Pixel| PointQuery {
        patch: SourcePatch::from_plane(
            PointId(id),
            source.view(),
            0,
            center,
            Vector3::new(0.0, 0.0, 5.0),
            &obs,
        )
        .unwrap(),
        cam_derivs: Matrix2::new(FOCAL, 0.0, 0.0, FOCAL),
        predicted: Pixel::new(center.x + 2, center.y - 1),
        search_radius: 3,
    };
    let queries = vec![
        make(1, Pixel::new(20, 20)),
        make(2, Pixel::new(40, 30)),
        make(3, Pixel::new(2, 30)),
    ];

    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();
    let results = finder.track_points(&queries, &Isometry3::identity(), &frame, 10);
    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().unwrap();
    assert!((first.position - Vector2::new(22.0, 19.0)).norm() < 1e-6);
    let second = results[1].as_ref().unwrap();
    assert!((second.position - Vector2::new(42.0, 29.0)).norm() < 1e-6);
    assert_eq!(results[2], Err(PatchFailure::TemplateOutOfBounds));
}
