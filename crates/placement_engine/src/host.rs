//! Contracts for the collaborators the placement engine drives: template
//! lookup, spatial queries, entity lifecycle, multi-unit sources and pointer
//! projection. The engine never owns world state; every operation borrows a
//! host that implements [`PlacementHost`].

use std::ops::BitOr;

use glam::Vec3;

use crate::content::Template;
use crate::geometry::{BoxShape, OrientedBox, Pose};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub u64);

/// Identifies a multi-unit container (a crate of stock, a pallet) owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const DEFAULT: Self = Self(1 << 0);
    pub const FURNITURE: Self = Self(1 << 1);
    pub const STATIC: Self = Self(1 << 2);
    pub const ALL: Self = Self(u32::MAX);
    pub const PLACEMENT_BLOCKERS: Self =
        Self(Self::DEFAULT.0 | Self::FURNITURE.0 | Self::STATIC.0);

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::DEFAULT),
            "furniture" => Some(Self::FURNITURE),
            "static" => Some(Self::STATIC),
            _ => None,
        }
    }

    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One collision volume reported by a spatial query. `owner` is the root
/// entity the volume belongs to; `part` is the volume's own handle, which
/// equals `owner` for the root volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeRef {
    pub part: EntityHandle,
    pub owner: EntityHandle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapQuery {
    pub bounds: OrientedBox,
    pub layers: LayerMask,
    pub include_triggers: bool,
}

/// Root collision volume of a live entity plus its current transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityGeometry {
    pub pose: Pose,
    pub scale: Vec3,
    pub shape: BoxShape,
}

impl EntityGeometry {
    pub fn world_box_at(&self, pose: Pose) -> OrientedBox {
        self.shape.world_box(pose, self.scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewTint {
    Valid,
    Invalid,
}

impl PreviewTint {
    pub fn from_validity(valid: bool) -> Self {
        if valid {
            Self::Valid
        } else {
            Self::Invalid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerHit {
    pub position: Vec3,
    pub hit_valid_surface: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum PreviewSource<'a> {
    Template(&'a Template),
    /// Clone the live entity; used for pre-placed entities with no resolvable template.
    Entity(EntityHandle),
}

pub trait TemplateSource {
    fn resolve_template(&self, id: &str) -> Option<Template>;
}

pub trait SpatialQuery {
    fn query_overlap(&self, query: &OverlapQuery) -> Vec<ShapeRef>;
}

pub trait EntityHost {
    fn spawn_entity(&mut self, template: &Template, pose: Pose) -> EntityHandle;
    /// Previews are transient and never tracked; `None` when the source cannot be cloned.
    fn spawn_preview(&mut self, source: PreviewSource<'_>, pose: Pose) -> Option<EntityHandle>;
    fn destroy_entity(&mut self, handle: EntityHandle);
    /// Hidden entities keep their state but contribute no renderable or solid volume.
    fn set_entity_visibility(&mut self, handle: EntityHandle, visible: bool);
    fn set_entity_pose(&mut self, handle: EntityHandle, pose: Pose);
    fn entity_geometry(&self, handle: EntityHandle) -> Option<EntityGeometry>;
    fn set_preview_tint(&mut self, handle: EntityHandle, tint: PreviewTint);
}

pub trait UnitSources {
    fn source_is_open(&self, source: SourceId) -> bool;
    fn remaining_units(&self, source: SourceId) -> u32;
    /// Removes one unit and returns how many remain.
    fn consume_unit(&mut self, source: SourceId) -> u32;
}

pub trait PointerProjector {
    fn project_pointer_to_world(&self) -> PointerHit;
}

pub trait PlacementHost:
    TemplateSource + SpatialQuery + EntityHost + UnitSources + PointerProjector
{
}

impl<T: ?Sized> PlacementHost for T where
    T: TemplateSource + SpatialQuery + EntityHost + UnitSources + PointerProjector
{
}
