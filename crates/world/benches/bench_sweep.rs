use std::hint::black_box;
use std::time::Instant;

use glam::IVec3;
use pentacle_world::{
    ActorData, Item, LoopScript, MAIN_ACTOR_ID, SearchOrigin, ShapeFlags, ShapeInfo, ShapeTable,
    World, WorldConfig,
};

const AVATAR: u32 = 1;
const CRATE: u32 = 2;

fn make_world(item_count: usize, spacing: i32) -> World {
    let shapes = ShapeTable::new()
        .with(AVATAR, ShapeInfo::new(IVec3::new(64, 64, 80), ShapeFlags::SOLID))
        .with(CRATE, ShapeInfo::new(IVec3::new(48, 48, 32), ShapeFlags::SOLID));
    let mut world = World::new(WorldConfig::default(), shapes);
    world.add_map(1);
    if let Err(err) = world.switch_map(1) {
        panic!("cannot load bench map: {err}");
    }
    let side = (item_count as f32).sqrt().ceil() as i32;
    for i in 0..item_count as i32 {
        let pos = IVec3::new(1000 + (i % side) * spacing, 1000 + (i / side) * spacing, 0);
        if let Err(err) = world.spawn_item(Item::new(CRATE, 0).at(pos)) {
            panic!("cannot spawn bench item: {err}");
        }
    }
    let avatar = Item::actor(AVATAR, ActorData::with_stats(30, 10, 10, 10))
        .with_map(1)
        .at(IVec3::new(900, 900, 0));
    if let Err(err) = world.set_main_actor(avatar) {
        panic!("cannot place avatar: {err}");
    }
    world
}

fn bench_sweep(item_count: usize, iterations: usize) {
    let world = make_world(item_count, 100);
    let map = world.current_map();
    let dims = IVec3::new(64, 64, 80);

    let start = Instant::now();
    for i in 0..iterations {
        let from = IVec3::new(900, 900 + (i % 50) as i32 * 20, 0);
        let to = from + IVec3::new(4000, 0, 0);
        let _ = black_box(map.sweep_test(
            world.objects(),
            world.shapes(),
            black_box(from),
            black_box(to),
            dims,
            ShapeFlags::SOLID,
            MAIN_ACTOR_ID,
            false,
        ));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  sweep ({item_count} items, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_area_search(item_count: usize, range: i32, iterations: usize) {
    let world = make_world(item_count, 100);
    let script = LoopScript::any();

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(world.area_search(
            &script,
            SearchOrigin::Point { x: 2000, y: 2000 },
            black_box(range),
            false,
        ));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  area search ({item_count} items, range={range}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_frames(item_count: usize, iterations: usize) {
    let mut world = make_world(item_count, 100);

    let start = Instant::now();
    for i in 0..iterations {
        // walk the avatar across the grid so chunks keep changing speed
        let pos = IVec3::new(900 + (i % 200) as i32 * 64, 900 + (i % 200) as i32 * 64, 0);
        if let Err(err) = world.move_item(MAIN_ACTOR_ID, pos) {
            panic!("cannot move avatar: {err}");
        }
        world.run_frame();
        black_box(world.drain_events());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  frame ({item_count} items, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== World Benchmarks ===\n");

    println!("Collision sweep:");
    bench_sweep(100, 10000);
    bench_sweep(1000, 1000);
    bench_sweep(10000, 100);

    println!("\nArea search:");
    bench_area_search(1000, 256, 10000);
    bench_area_search(1000, 1024, 1000);
    bench_area_search(10000, 1024, 100);

    println!("\nFrames (fast area + processes):");
    bench_frames(100, 1000);
    bench_frames(1000, 200);
    bench_frames(10000, 20);

    println!("\n=== Done ===");
}
