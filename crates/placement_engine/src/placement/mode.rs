use crate::content::Template;
use crate::host::EntityHandle;

use super::preview::PreviewController;
use super::registry::Descriptor;
use super::session::PlacementSession;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    Idle,
    PlacingNew,
    Relocating,
}

impl Mode {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PlacingNew => "placing_new",
            Self::Relocating => "relocating",
        }
    }
}

/// Entity being moved plus what is needed to put it back.
#[derive(Debug, Clone, PartialEq)]
pub struct RelocationContext {
    pub handle: EntityHandle,
    pub original: Descriptor,
    pub registry_index: usize,
}

/// Exactly one of these is live. Previews, sessions and relocation contexts
/// only exist inside the non-idle variants, so none of them can outlive a
/// return to idle.
#[derive(Debug, Default)]
pub(crate) enum Activity {
    #[default]
    Idle,
    PlacingNew {
        template: Template,
        session: Option<PlacementSession>,
        preview: PreviewController,
    },
    Relocating {
        context: RelocationContext,
        preview: PreviewController,
    },
}

impl Activity {
    pub(crate) fn mode(&self) -> Mode {
        match self {
            Self::Idle => Mode::Idle,
            Self::PlacingNew { .. } => Mode::PlacingNew,
            Self::Relocating { .. } => Mode::Relocating,
        }
    }

    pub(crate) fn preview(&self) -> Option<&PreviewController> {
        match self {
            Self::Idle => None,
            Self::PlacingNew { preview, .. } | Self::Relocating { preview, .. } => Some(preview),
        }
    }

    pub(crate) fn preview_mut(&mut self) -> Option<&mut PreviewController> {
        match self {
            Self::Idle => None,
            Self::PlacingNew { preview, .. } | Self::Relocating { preview, .. } => Some(preview),
        }
    }
}
