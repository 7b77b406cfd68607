use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo::geometry::Coord;
use raster::{algebra, GridGeometry, RasterSurface, DEFAULT_NODATA};

fn count_surface(seed: usize, cols: usize, rows: usize) -> RasterSurface {
    let geometry = GridGeometry::new(Coord { x: 0.0, y: 0.0 }, 10.0, cols, rows).unwrap();
    #[allow(clippy::cast_precision_loss)]
    let cells = (0..cols * rows)
        .map(|i| match (i * seed) % 7 {
            0 => DEFAULT_NODATA,
            n => n as f64,
        })
        .collect();
    RasterSurface::new(geometry, DEFAULT_NODATA, cells).unwrap()
}

fn raster_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("Raster Algebra");

    let veg = algebra::con_null(&count_surface(3, 1000, 1000), 0.0);
    let total = algebra::con_null(&count_surface(5, 1000, 1000), 0.0);

    group.bench_function("minus", |b| {
        b.iter(|| algebra::minus(black_box(&total), black_box(&veg)).unwrap())
    });

    group.bench_function("divide", |b| {
        b.iter(|| algebra::divide(black_box(&veg), black_box(&total)).unwrap())
    });

    group.bench_function("con_null", |b| {
        let raw = count_surface(3, 1000, 1000);
        b.iter(|| algebra::con_null(black_box(&raw), 0.0))
    });
}

criterion_group!(benches, raster_algebra);
criterion_main!(benches);
