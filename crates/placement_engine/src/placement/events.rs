use crate::host::EntityHandle;

use super::Mode;

/// Notifications emitted by engine operations, drained by the caller after
/// each call. The input layer reacts to `ModeChanged` instead of the engine
/// reaching into any global input state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementEvent {
    ModeChanged { from: Mode, to: Mode },
    PreviewValidityChanged { valid: bool },
    Placed { handle: EntityHandle, template_id: String },
    Relocated { handle: EntityHandle },
    PlacementCancelled,
    RelocationCancelled { handle: EntityHandle },
    Removed { handle: EntityHandle },
    Cleared { count: usize },
    Restored { tracked: usize },
}

#[derive(Debug, Default)]
pub(crate) struct PlacementEventQueue {
    pending: Vec<PlacementEvent>,
}

impl PlacementEventQueue {
    pub(crate) fn emit(&mut self, event: PlacementEvent) {
        self.pending.push(event);
    }

    pub(crate) fn pending(&self) -> &[PlacementEvent] {
        &self.pending
    }

    pub(crate) fn drain(&mut self) -> Vec<PlacementEvent> {
        std::mem::take(&mut self.pending)
    }
}
