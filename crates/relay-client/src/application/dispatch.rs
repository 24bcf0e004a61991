//! The dispatch table: message identifier → handler.
//!
//! Routing happens in the protocol context.  The table decides, per decoded
//! message, whether it goes to the graph context (and with which handler),
//! whether the protocol context consumes it itself (`_pong`), or whether it
//! is logged and dropped.
//!
//! # Handshake tracking (for beginners)
//!
//! Right after connecting the client asks for four snapshots: the buffer list,
//! the last line of each buffer, the hotlist and the nicklists.  Each reply
//! carries the identifier of the request, so the table flips one bit per
//! reply it routes.  Only once all four bits are set is the handshake
//! complete; periodic work such as hotlist polling waits for that.

use std::collections::HashMap;

use relay_core::request_ids;
use tracing::{debug, info};

/// What to do with one decoded record in the graph context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    /// Full buffer list; creates buffers or re-applies their fields.
    BufferList,
    /// A buffer appeared.
    BufferOpened,
    /// A buffer is going away; removal is deferred to the end of the turn.
    BufferClosing,
    /// One of the buffer property events; fields are re-applied.
    BufferUpdated,
    /// Every line of a buffer was cleared.
    BufferCleared,
    /// History lines, appended behind what is already held.
    HistoryLines,
    /// A live line, placed in front.
    LineAdded,
    /// A hotlist snapshot replacing the current one.
    Hotlist,
    /// Full nicklists of the buffers present in the record.
    Nicklist,
    /// Incremental nicklist changes.
    NicklistDiff,
}

/// Result of routing one message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forward to the graph context.
    Graph(Handler),
    /// Keepalive reply, consumed by the protocol context.
    Pong,
    /// Known identifier the client does not act on.
    Unimplemented,
    /// Identifier nobody registered.
    Unknown,
}

/// The four handshake replies, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Buffers = 0b0001,
    FirstLines = 0b0010,
    Hotlist = 0b0100,
    Nicklist = 0b1000,
}

const ALL_MILESTONES: u8 = 0b1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    route: Route,
    milestone: Option<Milestone>,
}

/// Identifier → handler table plus handshake progress for one connection.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    entries: HashMap<&'static str, Entry>,
    handshake: u8,
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        let mut table = Self {
            entries: HashMap::new(),
            handshake: 0,
        };

        table.register_milestone(request_ids::BUFFER_INIT, Handler::BufferList, Milestone::Buffers);
        table.register_milestone(request_ids::FIRST_LINES, Handler::HistoryLines, Milestone::FirstLines);
        table.register_milestone(request_ids::HOTLIST_INIT, Handler::Hotlist, Milestone::Hotlist);
        table.register_milestone(request_ids::NICKLIST_INIT, Handler::Nicklist, Milestone::Nicklist);

        table.register(request_ids::FETCH_LINES, Handler::HistoryLines);
        table.register(request_ids::HOTLIST, Handler::Hotlist);
        table.register("_buffer_opened", Handler::BufferOpened);
        table.register("_buffer_closing", Handler::BufferClosing);
        table.register("_buffer_line_added", Handler::LineAdded);
        table.register("_buffer_cleared", Handler::BufferCleared);
        for id in [
            "_buffer_renamed",
            "_buffer_title_changed",
            "_buffer_type_changed",
            "_buffer_hidden",
            "_buffer_unhidden",
            "_buffer_localvar_added",
            "_buffer_localvar_changed",
            "_buffer_localvar_removed",
        ] {
            table.register(id, Handler::BufferUpdated);
        }
        table.register("_nicklist", Handler::Nicklist);
        table.register("_nicklist_diff", Handler::NicklistDiff);

        for id in [
            "_buffer_moved",
            "_buffer_merged",
            "_buffer_unmerged",
            "_upgrade",
            "_upgrade_ended",
        ] {
            table.insert(id, Route::Unimplemented, None);
        }
        table.insert("_pong", Route::Pong, None);
        table
    }

    fn register(&mut self, id: &'static str, handler: Handler) {
        self.insert(id, Route::Graph(handler), None);
    }

    fn register_milestone(&mut self, id: &'static str, handler: Handler, milestone: Milestone) {
        self.insert(id, Route::Graph(handler), Some(milestone));
    }

    fn insert(&mut self, id: &'static str, route: Route, milestone: Option<Milestone>) {
        self.entries.insert(id, Entry { route, milestone });
    }

    /// Routes one identifier (exact, case-sensitive) and records handshake
    /// progress.  Unknown and unimplemented identifiers are logged here.
    pub fn route(&mut self, id: &str) -> Route {
        let Some(entry) = self.entries.get(id).copied() else {
            debug!("no handler for message {id:?}; dropping");
            return Route::Unknown;
        };
        if let Some(milestone) = entry.milestone {
            self.observe(milestone);
        }
        if entry.route == Route::Unimplemented {
            debug!("message {id:?} is not implemented; dropping");
        }
        entry.route
    }

    fn observe(&mut self, milestone: Milestone) {
        let before = self.is_handshake_complete();
        self.handshake |= milestone as u8;
        if !before && self.is_handshake_complete() {
            info!("handshake complete");
        }
    }

    /// Bitmask of the milestones seen so far.
    pub fn handshake_bits(&self) -> u8 {
        self.handshake
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake & ALL_MILESTONES == ALL_MILESTONES
    }

    /// Forgets handshake progress, e.g. before reconnecting.
    pub fn reset_handshake(&mut self) {
        self.handshake = 0;
    }
}
