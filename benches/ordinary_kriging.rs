use airkrig::estimators::OrdinaryKriging;
use airkrig::spatial_database::SpatialPointSet;
use airkrig::variography::experimental::{estimate, VariogramConfig};
use airkrig::variography::model_variograms::VariogramStructure;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point2;

fn create_point_set(domain: [[f64; 2]; 2], n_points: usize) -> SpatialPointSet {
    let mut points = vec![];
    let mut values = vec![];
    for _ in 0..n_points {
        let x = rand::random::<f64>() * (domain[1][0] - domain[0][0]) + domain[0][0];
        let y = rand::random::<f64>() * (domain[1][1] - domain[0][1]) + domain[0][1];
        points.push(Point2::new(x, y));
        values.push(rand::random::<f64>());
    }
    SpatialPointSet::from_points(points, values).expect("finite random samples")
}

fn create_grid(domain: [[f64; 2]; 2], n: [usize; 2]) -> Vec<Point2<f64>> {
    let s_x = (domain[1][0] - domain[0][0]) / n[0] as f64;
    let s_y = (domain[1][1] - domain[0][1]) / n[1] as f64;
    let mut grid = Vec::with_capacity(n[0] * n[1]);
    for i in 0..n[0] {
        for j in 0..n[1] {
            grid.push(Point2::new(
                domain[0][0] + (i as f64 + 0.5) * s_x,
                domain[0][1] + (j as f64 + 0.5) * s_y,
            ));
        }
    }
    grid
}

fn criterion_benchmark(c: &mut Criterion) {
    let domain = [[0.0, 0.0], [10_000.0, 10_000.0]];
    let cond_points = create_point_set(domain, 200);
    let grid = create_grid(domain, [100, 100]);
    let vgram = VariogramStructure::spherical(0.05, 1.0, 2_500.0).expect("valid model");

    c.bench_function("ok factor 200", |b| {
        b.iter(|| OrdinaryKriging::new(black_box(&cond_points), black_box(vgram)))
    });

    let ok = OrdinaryKriging::new(&cond_points, vgram).expect("non-empty samples");
    c.bench_function("ok predict 10k targets", |b| {
        b.iter(|| ok.predict_many(black_box(&grid)))
    });

    c.bench_function("empirical variogram 200", |b| {
        b.iter(|| estimate(black_box(&cond_points), black_box(&VariogramConfig::default())))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
