use glam::Vec3;
use tracing::warn;

use crate::geometry::Pose;
use crate::host::{EntityHandle, EntityHost, PreviewSource, PreviewTint};

/// The transient entity that follows the pointer while a placement or
/// relocation is in progress, plus the tint last pushed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreviewController {
    handle: EntityHandle,
    pose: Pose,
    /// False until the first position update; a fresh preview has no real location yet.
    positioned: bool,
    surface_hit: bool,
    valid: bool,
    tint: PreviewTint,
}

impl PreviewController {
    pub(crate) fn spawn<H>(host: &mut H, source: PreviewSource<'_>, pose: Pose) -> Option<Self>
    where
        H: EntityHost + ?Sized,
    {
        let Some(handle) = host.spawn_preview(source, pose) else {
            warn!(?source, "preview_spawn_failed");
            return None;
        };
        host.set_preview_tint(handle, PreviewTint::Invalid);
        Some(Self {
            handle,
            pose,
            positioned: false,
            surface_hit: false,
            valid: false,
            tint: PreviewTint::Invalid,
        })
    }

    pub(crate) fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub(crate) fn pose(&self) -> Pose {
        self.pose
    }

    pub(crate) fn is_positioned(&self) -> bool {
        self.positioned
    }

    pub(crate) fn surface_hit(&self) -> bool {
        self.surface_hit
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn move_to<H>(&mut self, host: &mut H, position: Vec3, surface_hit: bool)
    where
        H: EntityHost + ?Sized,
    {
        self.pose = self.pose.with_position(position);
        self.positioned = true;
        self.surface_hit = surface_hit;
        host.set_entity_pose(self.handle, self.pose);
    }

    /// Marks an inherited pose as real, e.g. a relocation preview that starts
    /// exactly where the original entity stands.
    pub(crate) fn mark_positioned(&mut self, surface_hit: bool) {
        self.positioned = true;
        self.surface_hit = surface_hit;
    }

    pub(crate) fn rotate<H>(&mut self, host: &mut H, radians: f32)
    where
        H: EntityHost + ?Sized,
    {
        self.pose = self.pose.rotated_about_vertical(radians);
        host.set_entity_pose(self.handle, self.pose);
    }

    /// Stores the latest verdict and returns true when it flipped.
    pub(crate) fn set_validity<H>(&mut self, host: &mut H, valid: bool) -> bool
    where
        H: EntityHost + ?Sized,
    {
        let changed = self.valid != valid;
        self.valid = valid;
        let tint = PreviewTint::from_validity(valid);
        if tint != self.tint {
            self.tint = tint;
            host.set_preview_tint(self.handle, tint);
        }
        changed
    }

    pub(crate) fn destroy<H>(self, host: &mut H)
    where
        H: EntityHost + ?Sized,
    {
        host.destroy_entity(self.handle);
    }
}
