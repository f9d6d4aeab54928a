use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{Isometry3, Matrix2, Vector2, Vector3};
use std::hint::black_box;
use warpmatch::{
    FinderConfig, Frame, ImagePyramid, OwnedImage, PatchFinder, PixelRays, PlaneObservation,
    Pixel, PointId, PointQuery, SourcePatch,
};

fn make_image(width: usize, height: usize, dx: usize, dy: usize) -> OwnedImage {
    OwnedImage::from_fn(width, height, |x, y| {
        let (x, y) = (x + dx, y + dy);
        (((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8
    })
    .unwrap()
}

fn plane() -> PlaneObservation {
    PlaneObservation {
        source_from_world: Isometry3::identity(),
        normal: Vector3::new(0.0, 0.0, -1.0),
        rays: PixelRays {
            center: Vector3::new(0.0, 0.0, 1.0),
            right: Vector3::new(0.002, 0.0, 1.0),
            down: Vector3::new(0.0, 0.002, 1.0),
        },
    }
}

fn bench_finder(c: &mut Criterion) {
    let source = make_image(640, 480, 0, 0);
    let current = make_image(640, 480, 3, 2);
    let frame =
        Frame::with_dense_corners(ImagePyramid::build_u8(current.view(), 4).unwrap()).unwrap();

    let mut finder = PatchFinder::new(FinderConfig::default()).unwrap();
    finder.make_template_coarse_no_warp_at(source.view(), 0, Pixel::new(320, 240));

    c.bench_function("coarse_dense_radius_8", |b| {
        b.iter(|| black_box(finder.find_patch_coarse(Pixel::new(318, 238), &frame, 8)));
    });

    c.bench_function("coarse_dense_radius_24", |b| {
        b.iter(|| black_box(finder.find_patch_coarse(Pixel::new(318, 238), &frame, 24)));
    });

    finder.make_subpix_template();
    c.bench_function("subpix_refine_10", |b| {
        b.iter(|| {
            finder.set_subpix_pos(Vector2::new(317.6, 238.3));
            black_box(finder.iterate_subpix_to_convergence(&frame, 10))
        });
    });

    let obs = plane();
    let queries: Vec<PointQuery<'_>> = (0..64)
        .map(|i| {
            let center = Pixel::new(40 + (i % 8) * 70, 40 + (i / 8) * 50);
            PointQuery {
                patch: SourcePatch::from_plane(
                    PointId(i as u64),
                    source.view(),
                    0,
                    center,
                    Vector3::new(0.0, 0.0, 5.0),
                    &obs,
                )
                .unwrap(),
                cam_derivs: Matrix2::new(500.0, 0.0, 0.0, 500.0),
                predicted: Pixel::new(center.x - 3, center.y - 2),
                search_radius: 6,
            }
        })
        .collect();
    let pose = Isometry3::identity();

    c.bench_function("track_points_64", |b| {
        b.iter(|| black_box(finder.track_points(&queries, &pose, &frame, 10)));
    });

    #[cfg(feature = "rayon")]
    c.bench_function("track_points_64_parallel", |b| {
        b.iter(|| {
            black_box(
                warpmatch::track_points_par(FinderConfig::default(), &queries, &pose, &frame, 10)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_finder);
criterion_main!(benches);
