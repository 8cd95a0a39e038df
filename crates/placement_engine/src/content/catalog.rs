use std::collections::{BTreeSet, HashMap};

use glam::Vec3;

use crate::geometry::BoxShape;
use crate::host::LayerMask;

pub const PREPLACED_TAG: &str = "preplaced";

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub label: String,
    pub category: String,
    /// Collision volume used for placement checks; `None` means the template cannot be placed.
    pub shape: Option<BoxShape>,
    /// Additional solid sub-part volumes, in the same local frame as `shape`.
    pub parts: Vec<BoxShape>,
    pub scale: Vec3,
    pub layers: LayerMask,
    pub tags: Vec<String>,
}

impl Template {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    pub fn is_preplaced(&self) -> bool {
        self.has_tag(PREPLACED_TAG)
    }
}

#[derive(Debug, Default, Clone)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
    index_by_id: HashMap<String, usize>,
}

impl TemplateCatalog {
    pub fn from_templates(templates: Vec<Template>) -> Self {
        let mut index_by_id = HashMap::with_capacity(templates.len());
        for (idx, template) in templates.iter().enumerate() {
            index_by_id.insert(template.id.clone(), idx);
        }
        Self {
            templates,
            index_by_id,
        }
    }

    pub fn template(&self, id: &str) -> Option<&Template> {
        self.index_by_id
            .get(id)
            .and_then(|idx| self.templates.get(*idx))
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn preplaced_ids(&self) -> BTreeSet<String> {
        self.templates
            .iter()
            .filter(|template| template.is_preplaced())
            .map(|template| template.id.clone())
            .collect()
    }
}
