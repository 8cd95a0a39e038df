mod events;
mod mode;
mod preview;
mod registry;
mod session;
mod validity;

use std::mem;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::content::Template;
use crate::geometry::Pose;
use crate::host::{EntityHandle, EntityHost, PlacementHost, PreviewSource, SpatialQuery};

pub use events::PlacementEvent;
pub use mode::{Mode, RelocationContext};
pub use registry::{Descriptor, Registry, RestoreReport};
pub use session::{PlacementOrigin, PlacementSession, SessionStep};
pub use validity::ValidityChecker;

use events::PlacementEventQueue;
use mode::Activity;
use preview::PreviewController;

/// Positions, validates, commits and relocates placeable entities, and owns
/// the registry of everything placed so far.
///
/// Every operation runs to completion against the borrowed host. Operations
/// that make no sense in the current mode are silent no-ops that report
/// `false`, never errors.
#[derive(Debug)]
pub struct PlacementEngine {
    config: EngineConfig,
    checker: ValidityChecker,
    activity: Activity,
    registry: Registry,
    events: PlacementEventQueue,
}

impl PlacementEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Registry::new())
    }

    pub fn with_registry(config: EngineConfig, registry: Registry) -> Self {
        Self {
            checker: ValidityChecker::new(config.query_layers),
            config,
            activity: Activity::Idle,
            registry,
            events: PlacementEventQueue::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checker(&self) -> &ValidityChecker {
        &self.checker
    }

    pub fn mode(&self) -> Mode {
        self.activity.mode()
    }

    pub fn is_valid(&self) -> bool {
        self.activity
            .preview()
            .is_some_and(PreviewController::is_valid)
    }

    pub fn preview_pose(&self) -> Option<Pose> {
        self.activity.preview().map(PreviewController::pose)
    }

    pub fn preview_handle(&self) -> Option<EntityHandle> {
        self.activity.preview().map(PreviewController::handle)
    }

    pub fn placing_template(&self) -> Option<&Template> {
        match &self.activity {
            Activity::PlacingNew { template, .. } => Some(template),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&PlacementSession> {
        match &self.activity {
            Activity::PlacingNew { session, .. } => session.as_ref(),
            _ => None,
        }
    }

    pub fn relocation_target(&self) -> Option<&RelocationContext> {
        match &self.activity {
            Activity::Relocating { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        self.registry.descriptors()
    }

    pub fn pending_events(&self) -> &[PlacementEvent] {
        self.events.pending()
    }

    /// Takes every event emitted since the last drain. The queue is unbounded,
    /// so callers should drain once per tick.
    pub fn drain_events(&mut self) -> Vec<PlacementEvent> {
        self.events.drain()
    }

    /// Enters placement mode for `template_id`, cancelling whatever was active.
    /// An unknown or geometry-less template leaves the engine untouched.
    pub fn start_placement<H>(
        &mut self,
        host: &mut H,
        template_id: &str,
        origin: PlacementOrigin,
    ) -> bool
    where
        H: PlacementHost + ?Sized,
    {
        let Some(template) = host.resolve_template(template_id) else {
            warn!(template_id, "start_placement_unknown_template");
            return false;
        };
        if template.shape.is_none() {
            warn!(template_id, "start_placement_template_without_geometry");
            return false;
        }

        self.abort_active(host);
        let from = self.mode();
        let Some(preview) =
            PreviewController::spawn(host, PreviewSource::Template(&template), Pose::IDENTITY)
        else {
            return false;
        };
        let session = PlacementSession::open_for(&*host, &template, origin);
        debug!(
            template_id,
            session_source = ?session.as_ref().map(|session| session.source().0),
            "placement_started"
        );
        self.activity = Activity::PlacingNew {
            template,
            session,
            preview,
        };
        self.finish_transition(from);
        true
    }

    /// Picks up a tracked entity: the original is hidden in place and a
    /// preview takes over at the same pose.
    pub fn start_relocate<H>(&mut self, host: &mut H, handle: EntityHandle) -> bool
    where
        H: PlacementHost + ?Sized,
    {
        if !self.registry.contains(handle) {
            warn!(handle = handle.0, "start_relocate_untracked_handle");
            return false;
        }

        self.abort_active(host);
        let from = self.mode();
        let Some(registry_index) = self.registry.index_of(handle) else {
            return false;
        };
        let original = self.registry.descriptors()[registry_index].clone();
        let start_pose = host
            .entity_geometry(handle)
            .map(|geometry| geometry.pose)
            .unwrap_or(original.pose);

        host.set_entity_visibility(handle, false);
        let template = host
            .resolve_template(&original.template_id)
            .filter(|template| template.shape.is_some());
        let source = match &template {
            Some(template) => PreviewSource::Template(template),
            None => PreviewSource::Entity(handle),
        };
        let Some(mut preview) = PreviewController::spawn(host, source, start_pose) else {
            host.set_entity_visibility(handle, true);
            return false;
        };
        preview.mark_positioned(true);

        debug!(
            handle = handle.0,
            template_id = %original.template_id,
            from_template = template.is_some(),
            "relocation_started"
        );
        self.activity = Activity::Relocating {
            context: RelocationContext {
                handle,
                original,
                registry_index,
            },
            preview,
        };
        self.finish_transition(from);
        if let Some(preview) = self.activity.preview_mut() {
            reevaluate(&self.checker, preview, host, &mut self.events);
        }
        true
    }

    pub fn update_position<H>(&mut self, host: &mut H, world_position: Vec3, surface_hit: bool)
    where
        H: PlacementHost + ?Sized,
    {
        let Some(preview) = self.activity.preview_mut() else {
            return;
        };
        preview.move_to(host, world_position, surface_hit);
        reevaluate(&self.checker, preview, host, &mut self.events);
    }

    /// Feeds the host's pointer projection into [`Self::update_position`].
    pub fn update_from_pointer<H>(&mut self, host: &mut H)
    where
        H: PlacementHost + ?Sized,
    {
        if self.mode() == Mode::Idle {
            return;
        }
        let hit = host.project_pointer_to_world();
        self.update_position(host, hit.position, hit.hit_valid_surface);
    }

    /// Turns the preview about the vertical axis by `step_multiplier` configured steps.
    pub fn rotate<H>(&mut self, host: &mut H, step_multiplier: f32)
    where
        H: PlacementHost + ?Sized,
    {
        let radians = step_multiplier * self.config.rotation_step_radians();
        let Some(preview) = self.activity.preview_mut() else {
            return;
        };
        preview.rotate(host, radians);
        reevaluate(&self.checker, preview, host, &mut self.events);
    }

    pub fn confirm<H>(&mut self, host: &mut H) -> bool
    where
        H: PlacementHost + ?Sized,
    {
        if !self.is_valid() {
            return false;
        }

        let from = self.mode();
        match mem::take(&mut self.activity) {
            Activity::Idle => return false,
            Activity::PlacingNew {
                template,
                mut session,
                preview,
            } => {
                let pose = preview.pose();
                let surface_hit = preview.surface_hit();
                preview.destroy(host);

                let handle = host.spawn_entity(&template, pose);
                self.registry.add(
                    handle,
                    Descriptor {
                        template_id: template.id.clone(),
                        pose,
                        category: template.category.clone(),
                    },
                );
                info!(
                    handle = handle.0,
                    template_id = %template.id,
                    tracked = self.registry.len(),
                    "placement_confirmed"
                );
                self.events.emit(PlacementEvent::Placed {
                    handle,
                    template_id: template.id.clone(),
                });

                let step = session.as_mut().map(|session| session.consume_unit(host));
                if let Some(SessionStep::Continue { remaining }) = step {
                    self.continue_session(host, template, session, pose, surface_hit, remaining);
                }
            }
            Activity::Relocating { context, preview } => {
                let pose = preview.pose();
                preview.destroy(host);
                host.set_entity_pose(context.handle, pose);
                host.set_entity_visibility(context.handle, true);

                let index = if self.registry.handles().get(context.registry_index)
                    == Some(&context.handle)
                {
                    Some(context.registry_index)
                } else {
                    self.registry.index_of(context.handle)
                };
                let descriptor = Descriptor {
                    pose,
                    ..context.original
                };
                match index {
                    Some(index) => {
                        self.registry.overwrite_descriptor(index, descriptor);
                    }
                    None => warn!(handle = context.handle.0, "relocation_target_no_longer_tracked"),
                }
                info!(handle = context.handle.0, "relocation_confirmed");
                self.events.emit(PlacementEvent::Relocated {
                    handle: context.handle,
                });
            }
        }
        self.finish_transition(from);
        true
    }

    /// Abandons the active placement or relocation without touching the registry.
    pub fn cancel<H>(&mut self, host: &mut H) -> bool
    where
        H: PlacementHost + ?Sized,
    {
        self.abort_active(host)
    }

    /// Starts tracking an entity the host created outside the engine, such as
    /// fixtures present before the first restore.
    pub fn track_existing(&mut self, handle: EntityHandle, descriptor: Descriptor) -> bool {
        if self.registry.contains(handle) {
            warn!(handle = handle.0, "track_existing_duplicate_handle");
            return false;
        }
        self.registry.add(handle, descriptor);
        true
    }

    /// Untracks and destroys `handle`. A relocation of that entity is cancelled first.
    pub fn remove<H>(&mut self, host: &mut H, handle: EntityHandle) -> bool
    where
        H: PlacementHost + ?Sized,
    {
        let relocating_it = self
            .relocation_target()
            .is_some_and(|context| context.handle == handle);
        if relocating_it {
            self.abort_active(host);
        }

        if !self.registry.remove_by_handle(handle) {
            return false;
        }
        host.destroy_entity(handle);
        debug!(handle = handle.0, tracked = self.registry.len(), "entity_removed");
        self.events.emit(PlacementEvent::Removed { handle });
        true
    }

    pub fn clear_all<H>(&mut self, host: &mut H) -> usize
    where
        H: PlacementHost + ?Sized,
    {
        self.abort_active(host);
        let count = self.registry.clear_all(host);
        info!(count, "registry_cleared");
        self.events.emit(PlacementEvent::Cleared { count });
        count
    }

    pub fn restore<H>(&mut self, host: &mut H, descriptors: &[Descriptor]) -> RestoreReport
    where
        H: PlacementHost + ?Sized,
    {
        self.abort_active(host);
        let report =
            self.registry
                .restore(host, descriptors, &self.config.preplaced_template_ids);
        self.events.emit(PlacementEvent::Restored {
            tracked: self.registry.len(),
        });
        report
    }

    fn continue_session<H>(
        &mut self,
        host: &mut H,
        template: Template,
        session: Option<PlacementSession>,
        pose: Pose,
        surface_hit: bool,
        remaining: u32,
    ) where
        H: PlacementHost + ?Sized,
    {
        let Some(mut preview) =
            PreviewController::spawn(host, PreviewSource::Template(&template), pose)
        else {
            return;
        };
        preview.mark_positioned(surface_hit);
        reevaluate(&self.checker, &mut preview, host, &mut self.events);
        debug!(template_id = %template.id, remaining, "placement_session_continued");
        self.activity = Activity::PlacingNew {
            template,
            session,
            preview,
        };
    }

    fn abort_active<H>(&mut self, host: &mut H) -> bool
    where
        H: EntityHost + ?Sized,
    {
        let from = self.mode();
        match mem::take(&mut self.activity) {
            Activity::Idle => return false,
            Activity::PlacingNew { preview, .. } => {
                preview.destroy(host);
                self.events.emit(PlacementEvent::PlacementCancelled);
            }
            Activity::Relocating { context, preview } => {
                preview.destroy(host);
                host.set_entity_visibility(context.handle, true);
                self.events.emit(PlacementEvent::RelocationCancelled {
                    handle: context.handle,
                });
            }
        }
        self.finish_transition(from);
        true
    }

    fn finish_transition(&mut self, from: Mode) {
        let to = self.mode();
        if from == to {
            return;
        }
        debug!(from = from.as_token(), to = to.as_token(), "placement_mode_changed");
        self.events.emit(PlacementEvent::ModeChanged { from, to });
    }
}

fn reevaluate<H>(
    checker: &ValidityChecker,
    preview: &mut PreviewController,
    host: &mut H,
    events: &mut PlacementEventQueue,
) where
    H: EntityHost + SpatialQuery + ?Sized,
{
    let surface_hit = preview.is_positioned() && preview.surface_hit();
    let valid = checker.evaluate(&*host, preview.handle(), preview.pose(), surface_hit);
    if preview.set_validity(host, valid) {
        events.emit(PlacementEvent::PreviewValidityChanged { valid });
    }
}
