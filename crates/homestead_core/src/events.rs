//! Per-tick simulation event stream.
//!
//! Update passes report notable occurrences by pushing into the tick's
//! [`TickEvents`] collector: a conversion fired, cargo moved, an agent
//! lost its route. The simulation drains the collector at the start of
//! every update, so consumers always read the events of exactly one tick.

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::complex::ComplexId;
use crate::items::ItemId;
use crate::math::TileCoord;

/// A notable simulation occurrence during one update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    /// An agent could not find a route to its current target.
    ///
    /// Emitted once per loss, not once per tick spent lost.
    PathNotFound {
        /// The agent that failed to route.
        agent: AgentId,
    },
    /// A building member finished one conversion cycle.
    ConversionCompleted {
        /// The complex owning the member.
        complex: ComplexId,
        /// The member's anchor tile.
        tile: TileCoord,
    },
    /// An agent moved cargo between itself and a complex.
    ExchangeCompleted {
        /// The agent that loaded or unloaded.
        agent: AgentId,
        /// The complex it exchanged with.
        complex: ComplexId,
        /// The item kind moved.
        item: ItemId,
        /// Units actually moved after clamping.
        amount: u32,
    },
    /// A complex was created for a newly placed building.
    ComplexCreated {
        /// The new complex.
        complex: ComplexId,
    },
    /// A complex lost its last member and its slot was recycled.
    ComplexDeleted {
        /// The recycled complex.
        complex: ComplexId,
    },
}

/// Collector for the events of a single update pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    events: Vec<SimEvent>,
}

impl TickEvents {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Drop all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// The recorded events in occurrence order.
    #[must_use]
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<'a> IntoIterator for &'a TickEvents {
    type Item = &'a SimEvent;
    type IntoIter = std::slice::Iter<'a, SimEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
