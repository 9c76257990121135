//! Core storage benchmarks: creation, iteration, and migration throughput.
//!
//! The interesting numbers are iteration (rows are packed, so a query walk
//! should be limited by memory bandwidth) and add/remove migration (a full
//! row copy between archetypes plus entry-table patching per operation).
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use strata_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    dx: f64,
    dy: f64,
}
impl Component for Velocity {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health(u32);
impl Component for Health {}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A world with `count` entities split across two archetypes: half with
/// `{Position, Velocity}` and half with `{Position, Velocity, Health}`.
fn setup_world(count: usize) -> (World, Vec<EntityId>) {
    let mut world = World::new();
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let e = world
            .create((
                Position {
                    x: i as f64,
                    y: i as f64 * 2.0,
                },
                Velocity { dx: 1.0, dy: -1.0 },
            ))
            .unwrap();
        if i % 2 == 0 {
            world.add(e, Health(i as u32)).unwrap();
        }
        entities.push(e);
    }
    (world, entities)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_10k_two_component", |b| {
        b.iter(|| {
            let mut world = World::new();
            for i in 0..10_000 {
                world
                    .create((
                        Position {
                            x: i as f64,
                            y: 0.0,
                        },
                        Velocity { dx: 1.0, dy: 0.0 },
                    ))
                    .unwrap();
            }
            black_box(world.entity_count())
        })
    });
}

fn bench_iter(c: &mut Criterion) {
    let (world, _entities) = setup_world(10_000);
    c.bench_function("iter_10k_pos_vel", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for (_id, (pos, vel)) in world.iter::<(&Position, &Velocity)>() {
                sum += pos.x + vel.dx;
            }
            black_box(sum)
        })
    });
}

fn bench_iter_mut(c: &mut Criterion) {
    let (mut world, _entities) = setup_world(10_000);
    c.bench_function("iter_mut_10k_integrate", |b| {
        b.iter(|| {
            for (_id, (pos, vel)) in world.iter_mut::<(&mut Position, &Velocity)>() {
                pos.x += vel.dx;
                pos.y += vel.dy;
            }
        })
    });
}

fn bench_migration(c: &mut Criterion) {
    let mut world = World::new();
    let entities: Vec<EntityId> = (0..1_000)
        .map(|i| {
            world
                .create((
                    Position {
                        x: i as f64,
                        y: 0.0,
                    },
                    Velocity { dx: 0.0, dy: 0.0 },
                ))
                .unwrap()
        })
        .collect();

    c.bench_function("migrate_1k_add_remove", |b| {
        b.iter(|| {
            for &e in &entities {
                world.add(e, Health(1)).unwrap();
            }
            for &e in &entities {
                world.remove::<Health>(e).unwrap();
            }
        })
    });
}

fn bench_create_delete_churn(c: &mut Criterion) {
    c.bench_function("churn_1k_create_delete", |b| {
        let mut world = World::new();
        b.iter(|| {
            let batch: Vec<EntityId> = (0..1_000)
                .map(|i| {
                    world
                        .create(Position {
                            x: i as f64,
                            y: 0.0,
                        })
                        .unwrap()
                })
                .collect();
            for e in batch {
                world.delete(e);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_iter,
    bench_iter_mut,
    bench_migration,
    bench_create_delete_churn
);
criterion_main!(benches);
