//! In-memory world implementing every [`PlacementHost`](crate::host::PlacementHost)
//! collaborator. Used by the headless showroom driver and by tests.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use tracing::debug;

use crate::content::{Template, TemplateCatalog};
use crate::geometry::{BoxShape, Pose, CONTACT_TOLERANCE};
use crate::host::{
    EntityGeometry, EntityHandle, EntityHost, LayerMask, OverlapQuery, PointerHit,
    PointerProjector, PreviewSource, PreviewTint, ShapeRef, SourceId, SpatialQuery,
    TemplateSource, UnitSources,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxEntityKind {
    Placed,
    Preview,
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxPart {
    pub handle: EntityHandle,
    pub shape: BoxShape,
    pub trigger: bool,
    pub render_enabled: bool,
    pub collision_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxEntity {
    pub handle: EntityHandle,
    pub kind: SandboxEntityKind,
    pub template_id: Option<String>,
    pub pose: Pose,
    pub scale: Vec3,
    pub layers: LayerMask,
    /// `parts[0]` is the root volume and shares the entity's handle.
    pub parts: Vec<SandboxPart>,
    pub tint: Option<PreviewTint>,
}

impl SandboxEntity {
    pub fn is_visible(&self) -> bool {
        self.parts.iter().all(|part| part.render_enabled)
    }

    pub fn is_solid(&self) -> bool {
        self.parts
            .iter()
            .any(|part| part.collision_enabled && !part.trigger)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UnitSourceState {
    quantity: u32,
    open: bool,
}

#[derive(Debug, Default)]
pub struct SandboxHost {
    catalog: TemplateCatalog,
    next_handle: u64,
    entities: BTreeMap<EntityHandle, SandboxEntity>,
    sources: HashMap<SourceId, UnitSourceState>,
    next_source: u64,
    pointer: Option<PointerHit>,
}

impl SandboxHost {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&SandboxEntity> {
        self.entities.get(&handle)
    }

    pub fn entities(&self) -> impl Iterator<Item = &SandboxEntity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn count_of_kind(&self, kind: SandboxEntityKind) -> usize {
        self.entities
            .values()
            .filter(|entity| entity.kind == kind)
            .count()
    }

    pub fn preview_tint(&self, handle: EntityHandle) -> Option<PreviewTint> {
        self.entities.get(&handle).and_then(|entity| entity.tint)
    }

    /// Non-template geometry: walls, pillars, floor props.
    pub fn spawn_static(
        &mut self,
        pose: Pose,
        shape: BoxShape,
        layers: LayerMask,
    ) -> EntityHandle {
        self.insert_entity(
            SandboxEntityKind::Static,
            None,
            pose,
            Vec3::ONE,
            layers,
            shape,
            &[],
            false,
        )
    }

    pub fn spawn_trigger(&mut self, pose: Pose, shape: BoxShape) -> EntityHandle {
        self.insert_entity(
            SandboxEntityKind::Static,
            None,
            pose,
            Vec3::ONE,
            LayerMask::ALL,
            shape,
            &[],
            true,
        )
    }

    /// An entity that existed before the engine started. `template_id` may
    /// name a template the catalog does not know.
    pub fn spawn_preplaced(
        &mut self,
        template_id: &str,
        pose: Pose,
        shape: BoxShape,
        layers: LayerMask,
    ) -> EntityHandle {
        self.insert_entity(
            SandboxEntityKind::Placed,
            Some(template_id.to_string()),
            pose,
            Vec3::ONE,
            layers,
            shape,
            &[],
            false,
        )
    }

    pub fn add_source(&mut self, quantity: u32, open: bool) -> SourceId {
        let id = SourceId(self.next_source);
        self.next_source = self.next_source.saturating_add(1);
        self.sources.insert(id, UnitSourceState { quantity, open });
        id
    }

    pub fn open_source(&mut self, source: SourceId) {
        if let Some(state) = self.sources.get_mut(&source) {
            state.open = true;
        }
    }

    pub fn close_source(&mut self, source: SourceId) {
        if let Some(state) = self.sources.get_mut(&source) {
            state.open = false;
        }
    }

    pub fn source_quantity(&self, source: SourceId) -> Option<u32> {
        self.sources.get(&source).map(|state| state.quantity)
    }

    pub fn set_pointer(&mut self, position: Vec3, hit_valid_surface: bool) {
        self.pointer = Some(PointerHit {
            position,
            hit_valid_surface,
        });
    }

    pub fn clear_pointer(&mut self) {
        self.pointer = None;
    }

    fn allocate_handle(&mut self) -> EntityHandle {
        let handle = EntityHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        handle
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_entity(
        &mut self,
        kind: SandboxEntityKind,
        template_id: Option<String>,
        pose: Pose,
        scale: Vec3,
        layers: LayerMask,
        shape: BoxShape,
        sub_parts: &[BoxShape],
        trigger: bool,
    ) -> EntityHandle {
        let handle = self.allocate_handle();
        let mut parts = Vec::with_capacity(1 + sub_parts.len());
        parts.push(SandboxPart {
            handle,
            shape,
            trigger,
            render_enabled: true,
            collision_enabled: true,
        });
        for sub_shape in sub_parts {
            parts.push(SandboxPart {
                handle: self.allocate_handle(),
                shape: *sub_shape,
                trigger,
                render_enabled: true,
                collision_enabled: true,
            });
        }
        self.entities.insert(
            handle,
            SandboxEntity {
                handle,
                kind,
                template_id,
                pose,
                scale,
                layers,
                parts,
                tint: None,
            },
        );
        handle
    }

    fn insert_from_template(
        &mut self,
        kind: SandboxEntityKind,
        template: &Template,
        pose: Pose,
    ) -> Option<EntityHandle> {
        let shape = template.shape?;
        Some(self.insert_entity(
            kind,
            Some(template.id.clone()),
            pose,
            template.scale,
            template.layers,
            shape,
            &template.parts,
            false,
        ))
    }

    fn clone_as_preview(&mut self, source: EntityHandle, pose: Pose) -> Option<EntityHandle> {
        let original = self.entities.get(&source)?.clone();
        let sub_parts = original.parts[1..]
            .iter()
            .map(|part| part.shape)
            .collect::<Vec<_>>();
        Some(self.insert_entity(
            SandboxEntityKind::Preview,
            original.template_id,
            pose,
            original.scale,
            original.layers,
            original.parts[0].shape,
            &sub_parts,
            false,
        ))
    }
}

impl TemplateSource for SandboxHost {
    fn resolve_template(&self, id: &str) -> Option<Template> {
        self.catalog.template(id).cloned()
    }
}

impl SpatialQuery for SandboxHost {
    fn query_overlap(&self, query: &OverlapQuery) -> Vec<ShapeRef> {
        let mut hits = Vec::new();
        for entity in self.entities.values() {
            if !entity.layers.intersects(query.layers) {
                continue;
            }
            for part in &entity.parts {
                if !part.collision_enabled || (part.trigger && !query.include_triggers) {
                    continue;
                }
                let world = part.shape.world_box(entity.pose, entity.scale);
                if world.overlaps(&query.bounds, CONTACT_TOLERANCE) {
                    hits.push(ShapeRef {
                        part: part.handle,
                        owner: entity.handle,
                    });
                }
            }
        }
        hits
    }
}

impl EntityHost for SandboxHost {
    fn spawn_entity(&mut self, template: &Template, pose: Pose) -> EntityHandle {
        // Geometry-less templates still produce a tracked entity; it just has a
        // degenerate volume that never collides.
        self.insert_from_template(SandboxEntityKind::Placed, template, pose)
            .unwrap_or_else(|| {
                let handle = self.insert_entity(
                    SandboxEntityKind::Placed,
                    Some(template.id.clone()),
                    pose,
                    template.scale,
                    template.layers,
                    BoxShape::new(Vec3::ZERO, Vec3::ZERO),
                    &[],
                    false,
                );
                if let Some(entity) = self.entities.get_mut(&handle) {
                    entity.parts[0].collision_enabled = false;
                }
                handle
            })
    }

    fn spawn_preview(&mut self, source: PreviewSource<'_>, pose: Pose) -> Option<EntityHandle> {
        let handle = match source {
            PreviewSource::Template(template) => {
                self.insert_from_template(SandboxEntityKind::Preview, template, pose)
            }
            PreviewSource::Entity(original) => self.clone_as_preview(original, pose),
        }?;
        debug!(handle = handle.0, "sandbox_preview_spawned");
        Some(handle)
    }

    fn destroy_entity(&mut self, handle: EntityHandle) {
        self.entities.remove(&handle);
    }

    fn set_entity_visibility(&mut self, handle: EntityHandle, visible: bool) {
        if let Some(entity) = self.entities.get_mut(&handle) {
            for part in &mut entity.parts {
                part.render_enabled = visible;
                part.collision_enabled = visible;
            }
        }
    }

    fn set_entity_pose(&mut self, handle: EntityHandle, pose: Pose) {
        if let Some(entity) = self.entities.get_mut(&handle) {
            entity.pose = pose;
        }
    }

    fn entity_geometry(&self, handle: EntityHandle) -> Option<EntityGeometry> {
        let entity = self.entities.get(&handle)?;
        let root = entity.parts.first()?;
        Some(EntityGeometry {
            pose: entity.pose,
            scale: entity.scale,
            shape: root.shape,
        })
    }

    fn set_preview_tint(&mut self, handle: EntityHandle, tint: PreviewTint) {
        if let Some(entity) = self.entities.get_mut(&handle) {
            entity.tint = Some(tint);
        }
    }
}

impl UnitSources for SandboxHost {
    fn source_is_open(&self, source: SourceId) -> bool {
        self.sources.get(&source).is_some_and(|state| state.open)
    }

    fn remaining_units(&self, source: SourceId) -> u32 {
        self.sources
            .get(&source)
            .map(|state| state.quantity)
            .unwrap_or(0)
    }

    fn consume_unit(&mut self, source: SourceId) -> u32 {
        match self.sources.get_mut(&source) {
            Some(state) => {
                state.quantity = state.quantity.saturating_sub(1);
                state.quantity
            }
            None => 0,
        }
    }
}

impl PointerProjector for SandboxHost {
    fn project_pointer_to_world(&self) -> PointerHit {
        self.pointer.unwrap_or(PointerHit {
            position: Vec3::ZERO,
            hit_valid_surface: false,
        })
    }
}

/// Small catalog shared by unit tests across the crate.
#[cfg(test)]
pub(crate) fn test_catalog() -> TemplateCatalog {
    let template = |id: &str, category: &str, size: Vec3, tags: &[&str]| Template {
        id: id.to_string(),
        label: id.to_string(),
        category: category.to_string(),
        shape: Some(BoxShape::centered(size)),
        parts: Vec::new(),
        scale: Vec3::ONE,
        layers: LayerMask::FURNITURE,
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    };

    let mut rack = template("rack", "storage", Vec3::new(2.0, 2.0, 1.0), &[]);
    rack.parts = vec![
        BoxShape::new(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.9, 0.05, 0.45)),
        BoxShape::new(Vec3::new(0.0, -0.5, 0.0), Vec3::new(0.9, 0.05, 0.45)),
    ];
    let mut poster = template("poster", "decor", Vec3::ONE, &[]);
    poster.shape = None;

    TemplateCatalog::from_templates(vec![
        template("shelf", "storage", Vec3::ONE, &[]),
        template("long_shelf", "storage", Vec3::new(3.0, 1.0, 1.0), &[]),
        template("bin", "storage", Vec3::splat(0.5), &[]),
        template("counter", "fixture", Vec3::new(2.0, 1.0, 1.0), &["preplaced"]),
        rack,
        poster,
    ])
}
