use tracing::debug;

use crate::content::Template;
use crate::host::{SourceId, UnitSources};

/// Where a placement request came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlacementOrigin {
    /// One-off placement (catalog, debug tools); ends after the first confirm.
    #[default]
    Direct,
    /// A multi-unit container; placement continues until it is closed or empty.
    Source(SourceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    Continue { remaining: u32 },
    Finished,
}

/// Continuation state for placing several units from one source without
/// re-entering placement mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementSession {
    template: Template,
    source: SourceId,
    open: bool,
}

impl PlacementSession {
    /// Opens a session only for an open source that still holds units.
    pub(crate) fn open_for<H>(
        host: &H,
        template: &Template,
        origin: PlacementOrigin,
    ) -> Option<Self>
    where
        H: UnitSources + ?Sized,
    {
        let PlacementOrigin::Source(source) = origin else {
            return None;
        };
        if !host.source_is_open(source) || host.remaining_units(source) == 0 {
            debug!(source = source.0, "session_not_opened_source_unavailable");
            return None;
        }
        Some(Self {
            template: template.clone(),
            source,
            open: true,
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Takes one unit for a confirmed placement and decides whether another
    /// preview should follow.
    pub(crate) fn consume_unit<H>(&mut self, host: &mut H) -> SessionStep
    where
        H: UnitSources + ?Sized,
    {
        let remaining = host.consume_unit(self.source);
        if remaining > 0 && host.source_is_open(self.source) {
            SessionStep::Continue { remaining }
        } else {
            self.open = false;
            SessionStep::Finished
        }
    }
}
