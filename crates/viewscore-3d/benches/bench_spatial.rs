use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use viewscore_3d::mesh::TriangleMesh;
use viewscore_3d::spatial::{NearestNeighborIndex, Ray, RayIntersectionIndex};

/// Deterministic query directions spread over the sphere.
fn fibonacci_directions(n: usize) -> Vec<[f64; 3]> {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    (0..n)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - z * z).sqrt();
            let phi = golden * i as f64;
            [r * phi.cos(), r * phi.sin(), z]
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for level in [2u32, 4] {
        let mesh = TriangleMesh::icosphere(level);
        group.bench_with_input(BenchmarkId::new("kdtree", level), &level, |b, _| {
            b.iter(|| std::hint::black_box(NearestNeighborIndex::build(mesh.vertices())))
        });
        group.bench_with_input(BenchmarkId::new("bvh", level), &level, |b, _| {
            b.iter(|| std::hint::black_box(RayIntersectionIndex::build(&mesh)))
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let mesh = TriangleMesh::icosphere(4);
    let directions = fibonacci_directions(1024);

    let Ok(nn) = NearestNeighborIndex::build(mesh.vertices()) else {
        return;
    };
    let Ok(bvh) = RayIntersectionIndex::build(&mesh) else {
        return;
    };

    group.bench_function("nearest", |b| {
        b.iter(|| {
            for d in &directions {
                std::hint::black_box(nn.nearest(d));
            }
        })
    });

    group.bench_function("within_radius", |b| {
        b.iter(|| {
            for d in &directions {
                std::hint::black_box(nn.within_radius(d, 0.05));
            }
        })
    });

    group.bench_function("ray_intersect", |b| {
        b.iter(|| {
            for d in &directions {
                let origin = [3.0 * d[0], 3.0 * d[1], 3.0 * d[2]];
                let ray = Ray::new(origin, [-d[0], -d[1], -d[2]]);
                std::hint::black_box(bvh.intersect(&ray, f64::INFINITY));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_queries);
criterion_main!(benches);
