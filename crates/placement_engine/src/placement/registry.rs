use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::geometry::Pose;
use crate::host::{EntityHandle, EntityHost, TemplateSource};

/// Persistent record of one placed entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub template_id: String,
    pub pose: Pose,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// `(handles, descriptors)` lengths found before self-healing, if they disagreed.
    pub healed_mismatch: Option<(usize, usize)>,
    pub removed: usize,
    pub reconciled: usize,
    pub spawned: usize,
    pub skipped_template_ids: Vec<String>,
}

/// Index-aligned store: `handles[i]` is the live entity whose persisted state
/// is `descriptors[i]`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    handles: Vec<EntityHandle>,
    descriptors: Vec<Descriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from externally kept sequences. Lengths are not
    /// checked here; the next [`Registry::restore`] truncates any mismatch.
    pub fn from_parts(handles: Vec<EntityHandle>, descriptors: Vec<Descriptor>) -> Self {
        Self {
            handles,
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len().min(self.descriptors.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_aligned(&self) -> bool {
        self.handles.len() == self.descriptors.len()
    }

    pub fn handles(&self) -> &[EntityHandle] {
        &self.handles
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Descriptor)> {
        self.handles.iter().copied().zip(self.descriptors.iter())
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.index_of(handle).is_some()
    }

    pub fn index_of(&self, handle: EntityHandle) -> Option<usize> {
        self.handles
            .iter()
            .take(self.descriptors.len())
            .position(|candidate| *candidate == handle)
    }

    pub fn descriptor_for(&self, handle: EntityHandle) -> Option<&Descriptor> {
        self.index_of(handle).map(|index| &self.descriptors[index])
    }

    pub fn add(&mut self, handle: EntityHandle, descriptor: Descriptor) {
        self.handles.push(handle);
        self.descriptors.push(descriptor);
    }

    /// Untracks `handle`; the live entity itself is left to the caller.
    pub fn remove_by_handle(&mut self, handle: EntityHandle) -> bool {
        let Some(index) = self.index_of(handle) else {
            return false;
        };
        self.handles.remove(index);
        self.descriptors.remove(index);
        true
    }

    pub(crate) fn overwrite_descriptor(&mut self, index: usize, descriptor: Descriptor) -> bool {
        match self.descriptors.get_mut(index) {
            Some(slot) if index < self.handles.len() => {
                *slot = descriptor;
                true
            }
            _ => false,
        }
    }

    /// Destroys every tracked entity and empties both sequences.
    pub fn clear_all<H>(&mut self, host: &mut H) -> usize
    where
        H: EntityHost + ?Sized,
    {
        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            host.destroy_entity(handle);
        }
        self.descriptors.clear();
        count
    }

    /// Replaces the tracked set with `incoming`, keeping entities whose template
    /// is in `preplaced` and moving them onto matching descriptors instead of
    /// spawning duplicates.
    pub fn restore<H>(
        &mut self,
        host: &mut H,
        incoming: &[Descriptor],
        preplaced: &BTreeSet<String>,
    ) -> RestoreReport
    where
        H: TemplateSource + EntityHost + ?Sized,
    {
        let mut report = RestoreReport {
            healed_mismatch: self.heal(),
            ..RestoreReport::default()
        };

        let mut kept_handles = Vec::with_capacity(self.handles.len());
        let mut kept_descriptors = Vec::with_capacity(self.descriptors.len());
        for (handle, descriptor) in self.handles.drain(..).zip(self.descriptors.drain(..)) {
            if preplaced.contains(&descriptor.template_id) {
                kept_handles.push(handle);
                kept_descriptors.push(descriptor);
            } else {
                host.destroy_entity(handle);
                report.removed += 1;
            }
        }
        self.handles = kept_handles;
        self.descriptors = kept_descriptors;

        let preserved = self.handles.len();
        let mut claimed = vec![false; preserved];
        for descriptor in incoming {
            if preplaced.contains(&descriptor.template_id) {
                let existing = (0..preserved).find(|&index| {
                    !claimed[index] && self.descriptors[index].template_id == descriptor.template_id
                });
                if let Some(index) = existing {
                    claimed[index] = true;
                    host.set_entity_pose(self.handles[index], descriptor.pose);
                    self.descriptors[index] = descriptor.clone();
                    report.reconciled += 1;
                    debug!(
                        template_id = %descriptor.template_id,
                        handle = self.handles[index].0,
                        "restore_reconciled_preplaced"
                    );
                    continue;
                }
            }

            let Some(template) = host.resolve_template(&descriptor.template_id) else {
                warn!(
                    template_id = %descriptor.template_id,
                    "restore_skipped_unknown_template"
                );
                report.skipped_template_ids.push(descriptor.template_id.clone());
                continue;
            };
            let handle = host.spawn_entity(&template, descriptor.pose);
            self.add(handle, descriptor.clone());
            report.spawned += 1;
        }

        info!(
            tracked = self.len(),
            removed = report.removed,
            reconciled = report.reconciled,
            spawned = report.spawned,
            skipped = report.skipped_template_ids.len(),
            "registry_restored"
        );
        report
    }

    // Trailing entries past the shorter sequence are dropped without being
    // matched against incoming descriptors.
    fn heal(&mut self) -> Option<(usize, usize)> {
        if self.is_aligned() {
            return None;
        }
        let found = (self.handles.len(), self.descriptors.len());
        let keep = found.0.min(found.1);
        warn!(
            handles = found.0,
            descriptors = found.1,
            keep,
            "registry_length_mismatch_truncated"
        );
        self.handles.truncate(keep);
        self.descriptors.truncate(keep);
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::content::TemplateCatalog;
    use crate::sandbox::{test_catalog, SandboxHost};

    fn descriptor(template_id: &str, x: f32) -> Descriptor {
        Descriptor {
            template_id: template_id.to_string(),
            pose: Pose::at(Vec3::new(x, 0.0, 0.0)),
            category: "furniture".to_string(),
        }
    }

    fn preplaced(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn spawn_tracked(
        host: &mut SandboxHost,
        registry: &mut Registry,
        desc: Descriptor,
    ) -> EntityHandle {
        let template = host
            .resolve_template(&desc.template_id)
            .expect("template");
        let handle = host.spawn_entity(&template, desc.pose);
        registry.add(handle, desc);
        handle
    }

    #[test]
    fn add_and_remove_keep_sequences_aligned() {
        let mut registry = Registry::new();
        registry.add(EntityHandle(1), descriptor("shelf", 0.0));
        registry.add(EntityHandle(2), descriptor("shelf", 2.0));
        registry.add(EntityHandle(3), descriptor("bin", 4.0));

        assert!(registry.remove_by_handle(EntityHandle(2)));
        assert!(registry.is_aligned());
        assert_eq!(registry.handles(), &[EntityHandle(1), EntityHandle(3)]);
        assert_eq!(registry.descriptors()[1].template_id, "bin");
        assert_eq!(registry.index_of(EntityHandle(3)), Some(1));
    }

    #[test]
    fn removing_unknown_handle_is_a_no_op() {
        let mut registry = Registry::new();
        registry.add(EntityHandle(1), descriptor("shelf", 0.0));
        assert!(!registry.remove_by_handle(EntityHandle(9)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clear_all_destroys_every_tracked_entity() {
        let mut host = SandboxHost::new(test_catalog());
        let mut registry = Registry::new();
        let a = spawn_tracked(&mut host, &mut registry, descriptor("shelf", 0.0));
        let b = spawn_tracked(&mut host, &mut registry, descriptor("shelf", 3.0));

        assert_eq!(registry.clear_all(&mut host), 2);
        assert!(registry.is_empty());
        assert!(registry.is_aligned());
        assert!(host.entity(a).is_none());
        assert!(host.entity(b).is_none());
    }

    #[test]
    fn restore_replaces_non_preplaced_entries() {
        let mut host = SandboxHost::new(test_catalog());
        let mut registry = Registry::new();
        let old = spawn_tracked(&mut host, &mut registry, descriptor("shelf", 0.0));

        let report = registry.restore(
            &mut host,
            &[descriptor("shelf", 5.0), descriptor("bin", 8.0)],
            &preplaced(&["counter"]),
        );

        assert_eq!(report.removed, 1);
        assert_eq!(report.spawned, 2);
        assert!(host.entity(old).is_none());
        assert_eq!(registry.len(), 2);
        assert!(registry.is_aligned());
        for (handle, desc) in registry.iter() {
            let live = host.entity(handle).expect("spawned");
            assert!(live.pose.approx_eq(&desc.pose, 1.0e-6));
        }
    }

    #[test]
    fn restore_moves_preplaced_entry_instead_of_spawning() {
        let mut host = SandboxHost::new(test_catalog());
        let mut registry = Registry::new();
        let counter = spawn_tracked(&mut host, &mut registry, descriptor("counter", 0.0));
        let incoming = [descriptor("counter", 6.0)];

        for _ in 0..2 {
            let report = registry.restore(&mut host, &incoming, &preplaced(&["counter"]));
            assert_eq!(report.reconciled, 1);
            assert_eq!(report.spawned, 0);
        }

        assert_eq!(registry.handles(), &[counter]);
        assert_eq!(registry.descriptors()[0], incoming[0]);
        let live = host.entity(counter).expect("counter alive");
        assert!(live.pose.approx_eq(&incoming[0].pose, 1.0e-6));
    }

    #[test]
    fn unclaimed_preplaced_entry_stays_tracked_where_it_stands() {
        let mut host = SandboxHost::new(test_catalog());
        let mut registry = Registry::new();
        let counter_desc = descriptor("counter", 6.0);
        let counter = spawn_tracked(&mut host, &mut registry, counter_desc.clone());

        let report = registry.restore(
            &mut host,
            &[descriptor("shelf", 0.0)],
            &preplaced(&["counter"]),
        );

        assert_eq!(report.reconciled, 0);
        assert_eq!(report.spawned, 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.handles()[0], counter);
        assert_eq!(registry.descriptors()[0], counter_desc);
        let live = host.entity(counter).expect("counter alive");
        assert!(live.pose.approx_eq(&counter_desc.pose, 1.0e-6));
    }

    #[test]
    fn restore_spawns_extra_preplaced_copies_once_existing_ones_are_claimed() {
        let mut host = SandboxHost::new(test_catalog());
        let mut registry = Registry::new();
        spawn_tracked(&mut host, &mut registry, descriptor("counter", 0.0));

        let report = registry.restore(
            &mut host,
            &[descriptor("counter", 1.0), descriptor("counter", 4.0)],
            &preplaced(&["counter"]),
        );

        assert_eq!(report.reconciled, 1);
        assert_eq!(report.spawned, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn restore_skips_unknown_templates_and_keeps_going() {
        let mut host = SandboxHost::new(test_catalog());
        let mut registry = Registry::new();

        let report = registry.restore(
            &mut host,
            &[
                descriptor("hovercraft", 0.0),
                descriptor("shelf", 3.0),
            ],
            &BTreeSet::new(),
        );

        assert_eq!(report.skipped_template_ids, vec!["hovercraft".to_string()]);
        assert_eq!(report.spawned, 1);
        assert_eq!(registry.descriptors()[0].template_id, "shelf");
    }

    #[test]
    fn restore_truncates_mismatched_sequences_before_reconciling() {
        let mut host = SandboxHost::new(TemplateCatalog::default());
        let mut registry = Registry::from_parts(
            vec![EntityHandle(10), EntityHandle(11), EntityHandle(12)],
            vec![descriptor("counter", 0.0)],
        );
        assert!(!registry.is_aligned());

        let report = registry.restore(&mut host, &[], &preplaced(&["counter"]));

        assert_eq!(report.healed_mismatch, Some((3, 1)));
        assert!(registry.is_aligned());
        assert_eq!(registry.handles(), &[EntityHandle(10)]);
    }

    #[test]
    fn overwrite_descriptor_rejects_out_of_range_index() {
        let mut registry = Registry::new();
        registry.add(EntityHandle(1), descriptor("shelf", 0.0));
        assert!(registry.overwrite_descriptor(0, descriptor("shelf", 9.0)));
        assert!(!registry.overwrite_descriptor(1, descriptor("shelf", 9.0)));
        assert_eq!(registry.descriptors()[0].pose.position.x, 9.0);
    }
}
