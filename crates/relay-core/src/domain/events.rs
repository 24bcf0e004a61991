//! Change notifications emitted by the entity graph.
//!
//! The graph queues events while handlers mutate it; the owner drains them
//! once per turn with [`crate::EntityGraph::drain_events`] and forwards them
//! to whatever renders the state.

use crate::protocol::messages::Pointer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A buffer was appended to the ordered list at `index`.
    BufferAdded { buffer: Pointer, index: usize },
    /// A buffer was physically removed.
    BufferRemoved { buffer: Pointer },
    /// Properties of a buffer were re-applied.
    BufferChanged { buffer: Pointer },
    /// The selected index changed; `None` means nothing is selected.
    SelectionChanged { index: Option<usize> },
    /// A live line was placed at the front of its buffer.
    LinePrepended { buffer: Pointer, line: Pointer },
    /// A history line was placed at the back of its buffer.
    LineAppended { buffer: Pointer, line: Pointer },
    /// Every line of a buffer was dropped.
    LinesCleared { buffer: Pointer },
    /// The nicklist of a buffer changed during the last turn.
    NicklistChanged { buffer: Pointer },
    /// Hotlist entries were added or cleared.
    HotlistChanged,
    /// The filter string or the filtered projection changed.
    FilterChanged,
    /// The whole graph was cleared.
    Reset,
}
