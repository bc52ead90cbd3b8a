use core_protect::{
    ActorId, BlockPos, ClaimRegistry, CreateOptions, ProtectConfig, WorldId,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Registry holding `count` non-overlapping 16x16 claims laid out on a grid.
fn populated_registry(count: u32) -> ClaimRegistry {
    let registry = ClaimRegistry::new(ProtectConfig::default());
    let side = (count as f64).sqrt().ceil() as u32;
    let mut created = 0;
    'outer: for gx in 0..side {
        for gz in 0..side {
            if created >= count {
                break 'outer;
            }
            let x = gx as i32 * 32;
            let z = gz as i32 * 32;
            registry
                .create_claim(
                    WorldId(0),
                    BlockPos::new(x, 0, z),
                    BlockPos::new(x + 15, 255, z + 15),
                    Some(ActorId(u128::from(created) + 1)),
                    None,
                    CreateOptions::default(),
                )
                .expect("bench claim");
            created += 1;
        }
    }
    registry
}

fn bench_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_lookup");

    for size in [64u32, 256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::new("claims", size), &size, |b, &size| {
            let registry = populated_registry(size);
            let inside = BlockPos::new(8, 64, 8);
            let wilderness = BlockPos::new(16, 64, 16);
            b.iter(|| {
                black_box(registry.find_claim(WorldId(0), black_box(inside)));
                black_box(registry.find_claim(WorldId(0), black_box(wilderness)));
            })
        });
    }

    group.finish();
}

criterion_group!(lookup_benches, bench_point_lookup);
criterion_main!(lookup_benches);
