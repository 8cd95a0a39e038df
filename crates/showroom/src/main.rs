mod scenario;

use placement_engine::{
    compile_template_catalog, layout_file_path, load_layout, resolve_app_paths, save_layout,
    EngineConfig, PlacementEngine, SandboxHost,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scenario::ShowroomResult;

fn main() {
    init_tracing();
    info!("=== Placement Showroom ===");

    if let Err(err) = run() {
        error!(error = %err, "showroom_failed");
        std::process::exit(1);
    }
}

fn run() -> ShowroomResult<()> {
    let paths = resolve_app_paths().map_err(|error| error.to_string())?;
    let catalog =
        compile_template_catalog(&paths.templates_dir).map_err(|error| error.to_string())?;
    let config = EngineConfig::from_catalog(&catalog).with_env_overrides();
    info!(
        root = %paths.root.display(),
        templates = catalog.len(),
        rotation_step_degrees = config.rotation_step_degrees,
        preplaced = config.preplaced_template_ids.len(),
        "showroom_configured"
    );

    let mut host = SandboxHost::new(catalog);
    let mut engine = PlacementEngine::new(config);
    scenario::seed_store(&mut engine, &mut host)?;

    let layout_path = layout_file_path(&paths.saves_dir);
    match load_layout(&layout_path).map_err(|error| error.to_string())? {
        Some(descriptors) => {
            let report = engine.restore(&mut host, &descriptors);
            info!(
                reconciled = report.reconciled,
                spawned = report.spawned,
                skipped = report.skipped_template_ids.len(),
                "showroom_layout_restored"
            );
            scenario::log_events(&mut engine);
        }
        None => info!(path = %layout_path.display(), "showroom_no_saved_layout"),
    }

    scenario::run_script(&mut engine, &mut host)?;
    save_layout(&layout_path, engine.descriptors()).map_err(|error| error.to_string())?;
    info!(tracked = engine.registry().len(), "showroom_finished");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
