use tracing::debug;

use crate::geometry::{OrientedBox, Pose};
use crate::host::{EntityHandle, EntityHost, LayerMask, OverlapQuery, ShapeRef, SpatialQuery};

/// Decides whether a preview may be committed at its current pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidityChecker {
    layers: LayerMask,
}

impl ValidityChecker {
    pub fn new(layers: LayerMask) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> LayerMask {
        self.layers
    }

    /// World-space box of the preview's collision shape at `pose`.
    pub fn candidate_box<H>(
        &self,
        host: &H,
        preview: EntityHandle,
        pose: Pose,
    ) -> Option<OrientedBox>
    where
        H: EntityHost + ?Sized,
    {
        host.entity_geometry(preview)
            .map(|geometry| geometry.world_box_at(pose))
    }

    /// Solid shapes inside the candidate box that do not belong to the preview.
    pub fn blocking_shapes<H>(&self, host: &H, preview: EntityHandle, pose: Pose) -> Vec<ShapeRef>
    where
        H: EntityHost + SpatialQuery + ?Sized,
    {
        let Some(bounds) = self.candidate_box(host, preview, pose) else {
            return Vec::new();
        };
        host.query_overlap(&OverlapQuery {
            bounds,
            layers: self.layers,
            include_triggers: false,
        })
        .into_iter()
        .filter(|shape| shape.owner != preview)
        .collect()
    }

    pub fn evaluate<H>(
        &self,
        host: &H,
        preview: EntityHandle,
        pose: Pose,
        surface_hit: bool,
    ) -> bool
    where
        H: EntityHost + SpatialQuery + ?Sized,
    {
        if !surface_hit {
            return false;
        }
        // A NaN box separates on no axis, so it would pass the overlap query.
        if !pose.is_finite() {
            debug!(preview = preview.0, "validity_non_finite_pose");
            return false;
        }
        if host.entity_geometry(preview).is_none() {
            debug!(preview = preview.0, "validity_preview_without_geometry");
            return false;
        }
        let blockers = self.blocking_shapes(host, preview, pose);
        if let Some(first) = blockers.first() {
            debug!(
                preview = preview.0,
                blocker = first.owner.0,
                blocker_count = blockers.len(),
                "validity_blocked"
            );
            return false;
        }
        true
    }
}
