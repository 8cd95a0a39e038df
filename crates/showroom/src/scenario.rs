//! Scripted store-fitting pass: a pre-placed checkout counter, a pallet of
//! shelves placed one after another, and a relocation of the first shelf.

use glam::Vec3;
use placement_engine::{
    BoxShape, Descriptor, EntityHandle, LayerMask, Mode, PlacementEngine, PlacementOrigin, Pose,
    SandboxHost, TemplateSource,
};
use tracing::{debug, info, warn};

pub(crate) type ShowroomResult<T> = Result<T, String>;

const COUNTER_TEMPLATE_ID: &str = "counter";
const SHELF_TEMPLATE_ID: &str = "shelf";
const SHELF_PALLET_UNITS: u32 = 3;
const STORE_HALF_WIDTH: f32 = 8.0;
const WALL_THICKNESS: f32 = 0.2;

/// Walls plus the checkout counter that exists before any save is loaded.
pub(crate) fn seed_store(
    engine: &mut PlacementEngine,
    host: &mut SandboxHost,
) -> ShowroomResult<()> {
    let wall_length = STORE_HALF_WIDTH * 2.0;
    for (position, size) in [
        (
            Vec3::new(0.0, 1.5, -STORE_HALF_WIDTH),
            Vec3::new(wall_length, 3.0, WALL_THICKNESS),
        ),
        (
            Vec3::new(0.0, 1.5, STORE_HALF_WIDTH),
            Vec3::new(wall_length, 3.0, WALL_THICKNESS),
        ),
        (
            Vec3::new(-STORE_HALF_WIDTH, 1.5, 0.0),
            Vec3::new(WALL_THICKNESS, 3.0, wall_length),
        ),
        (
            Vec3::new(STORE_HALF_WIDTH, 1.5, 0.0),
            Vec3::new(WALL_THICKNESS, 3.0, wall_length),
        ),
    ] {
        host.spawn_static(Pose::at(position), BoxShape::centered(size), LayerMask::STATIC);
    }

    let counter = host
        .resolve_template(COUNTER_TEMPLATE_ID)
        .ok_or_else(|| format!("template '{COUNTER_TEMPLATE_ID}' missing from catalog"))?;
    let shape = counter
        .shape
        .ok_or_else(|| format!("template '{COUNTER_TEMPLATE_ID}' has no shape"))?;
    let pose = Pose::at(Vec3::new(0.0, 0.0, 6.0));
    let handle = host.spawn_preplaced(COUNTER_TEMPLATE_ID, pose, shape, counter.layers);
    engine.track_existing(
        handle,
        Descriptor {
            template_id: counter.id.clone(),
            pose,
            category: counter.category.clone(),
        },
    );
    info!(handle = handle.0, "showroom_seeded");
    Ok(())
}

/// Places a pallet of shelves, nudging each one sideways until it fits, then
/// turns and moves the first shelf.
pub(crate) fn run_script(
    engine: &mut PlacementEngine,
    host: &mut SandboxHost,
) -> ShowroomResult<()> {
    let pallet = host.add_source(SHELF_PALLET_UNITS, true);
    if !engine.start_placement(host, SHELF_TEMPLATE_ID, PlacementOrigin::Source(pallet)) {
        return Err(format!("could not start placing '{SHELF_TEMPLATE_ID}'"));
    }

    let mut placed = Vec::<EntityHandle>::new();
    let mut cursor = Vec3::new(-6.0, 0.0, -6.0);
    while engine.mode() == Mode::PlacingNew {
        if cursor.x > STORE_HALF_WIDTH {
            warn!(remaining = ?host.source_quantity(pallet), "showroom_ran_out_of_floor");
            engine.cancel(host);
            break;
        }
        host.set_pointer(cursor, true);
        engine.update_from_pointer(host);
        if engine.confirm(host) {
            if let Some(handle) = engine.registry().handles().last() {
                placed.push(*handle);
            }
        }
        cursor.x += 0.75;
        log_events(engine);
    }

    let Some(first) = placed.first().copied() else {
        warn!("showroom_no_shelf_placed");
        return Ok(());
    };
    if engine.start_relocate(host, first) {
        engine.rotate(host, 2.0);
        host.set_pointer(Vec3::new(-6.0, 0.0, 2.0), true);
        engine.update_from_pointer(host);
        if !engine.confirm(host) {
            warn!(handle = first.0, "showroom_relocation_blocked");
            engine.cancel(host);
        }
    }
    log_events(engine);

    info!(
        placed = placed.len(),
        pallet_remaining = ?host.source_quantity(pallet),
        tracked = engine.registry().len(),
        "showroom_script_complete"
    );
    Ok(())
}

pub(crate) fn log_events(engine: &mut PlacementEngine) {
    for event in engine.drain_events() {
        debug!(?event, "placement_event");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use placement_engine::{compile_template_catalog_from_str, EngineConfig};

    use super::*;

    const STORE_XML: &str = include_str!("../../../assets/templates/store.xml");

    fn showroom() -> (PlacementEngine, SandboxHost) {
        let catalog = compile_template_catalog_from_str(Path::new("store.xml"), STORE_XML)
            .expect("store catalog");
        let engine = PlacementEngine::new(EngineConfig::from_catalog(&catalog));
        (engine, SandboxHost::new(catalog))
    }

    #[test]
    fn seeding_tracks_the_counter_as_preplaced() {
        let (mut engine, mut host) = showroom();
        seed_store(&mut engine, &mut host).expect("seed");

        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.descriptors()[0].template_id, COUNTER_TEMPLATE_ID);
        assert!(engine.config().is_preplaced(COUNTER_TEMPLATE_ID));
    }

    #[test]
    fn script_places_the_whole_pallet_and_moves_the_first_shelf() {
        let (mut engine, mut host) = showroom();
        seed_store(&mut engine, &mut host).expect("seed");
        run_script(&mut engine, &mut host).expect("script");

        assert_eq!(engine.mode(), Mode::Idle);
        assert_eq!(engine.registry().len(), 1 + SHELF_PALLET_UNITS as usize);
        let first_shelf = &engine.descriptors()[1];
        assert_eq!(first_shelf.pose.position, Vec3::new(-6.0, 0.0, 2.0));
    }

    #[test]
    fn script_is_repeatable_after_restore() {
        let (mut engine, mut host) = showroom();
        seed_store(&mut engine, &mut host).expect("seed");
        run_script(&mut engine, &mut host).expect("script");
        let saved = engine.descriptors().to_vec();

        let report = engine.restore(&mut host, &saved);
        assert_eq!(report.reconciled, 1);
        assert_eq!(report.spawned, SHELF_PALLET_UNITS as usize);
        assert_eq!(engine.descriptors(), saved.as_slice());
    }
}
