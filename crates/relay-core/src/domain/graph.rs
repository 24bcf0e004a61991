//! The entity graph: every buffer, line, nick and hotlist entry the relay has
//! told us about, indexed by server pointer.
//!
//! # Ownership (for beginners)
//!
//! There is exactly one [`EntityGraph`] per connection, owned by whoever runs
//! the graph context.  It is an ordinary struct passed by `&mut`; nothing in
//! here is global.
//!
//! - Buffers live in a pointer map plus a `Vec` that records list order.
//! - Lines live in one map keyed by the pair `(buffer pointer, line pointer)`.
//!   Line pointers are only unique per buffer, so the pair is the identity.
//!   Each buffer keeps the order of its own line pointers.
//! - Nicks are stored inside their buffer.
//! - Hotlist entries are independent of buffers.
//!
//! # Deferred removal
//!
//! A close event only *flags* a buffer.  The flagged buffer stays reachable
//! by pointer and keeps its list slot until [`EntityGraph::end_turn`], which
//! the owner calls once the current record is fully processed.  Iterators
//! over the buffer list skip flagged entries.  Whatever a removal or reset
//! discards is parked until the end of the turn as well.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::entities::{hydrate, Buffer, HotlistItem, Line, Nick};
use crate::domain::events::GraphEvent;
use crate::domain::view::{BufferView, HistoryFetcher, MemorySessionStore, NoHistory, SessionStore};
use crate::protocol::messages::{Object, Pointer};

/// Identity of a line: `(buffer pointer, line pointer)`.
pub type LineKey = (Pointer, Pointer);

/// A graph mutation that was refused.  None of these are fatal; callers log
/// them and move on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A child entity names a buffer the graph does not hold.
    #[error("{kind} {child} references missing buffer {parent}")]
    OrphanReference {
        kind: &'static str,
        parent: Pointer,
        child: Pointer,
    },

    /// A line with this key already exists; the stored line was kept.
    #[error("duplicate line {line} in buffer {buffer}; keeping the original")]
    DuplicateLine { buffer: Pointer, line: Pointer },

    /// A buffer with this pointer already exists.
    #[error("buffer {0} already exists")]
    DuplicateBuffer(Pointer),

    /// An update addressed a buffer the graph does not hold.
    #[error("unknown buffer {0}")]
    UnknownBuffer(Pointer),
}

/// Where a new line goes within its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Behind every line already held (history, initial fetch).
    Append,
    /// In front of every line already held (live messages).
    Prepend,
}

/// Entities waiting for disposal at the end of the turn.
#[derive(Debug, Default)]
struct Graveyard {
    buffers: Vec<Buffer>,
    lines: Vec<Line>,
    hotlist: Vec<HotlistItem>,
}

impl Graveyard {
    fn len(&self) -> usize {
        self.buffers.len() + self.lines.len() + self.hotlist.len()
    }
}

pub struct EntityGraph {
    buffers: HashMap<Pointer, Buffer>,
    order: Vec<Pointer>,
    lines: HashMap<LineKey, Line>,
    hotlist: HashMap<Pointer, HotlistItem>,
    view: BufferView,
    session: Box<dyn SessionStore>,
    history: Box<dyn HistoryFetcher>,
    events: Vec<GraphEvent>,
    dirty_nicklists: BTreeSet<Pointer>,
    hotlist_dirty: bool,
    graveyard: Graveyard,
}

impl Default for EntityGraph {
    fn default() -> Self {
        Self::new(Box::new(MemorySessionStore::default()), Box::new(NoHistory))
    }
}

impl std::fmt::Debug for EntityGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityGraph")
            .field("buffers", &self.order.len())
            .field("lines", &self.lines.len())
            .field("hotlist", &self.hotlist.len())
            .field("selected", &self.view.selected())
            .finish()
    }
}

impl EntityGraph {
    pub fn new(session: Box<dyn SessionStore>, history: Box<dyn HistoryFetcher>) -> Self {
        Self {
            buffers: HashMap::new(),
            order: Vec::new(),
            lines: HashMap::new(),
            hotlist: HashMap::new(),
            view: BufferView::new(),
            session,
            history,
            events: Vec::new(),
            dirty_nicklists: BTreeSet::new(),
            hotlist_dirty: false,
            graveyard: Graveyard::default(),
        }
    }

    // ── Buffers ──────────────────────────────────────────────────────────────

    /// Inserts a buffer at the end of the list and returns its index.
    ///
    /// The first buffer becomes selected when no index was persisted; a
    /// buffer landing on the persisted index becomes selected as well, which
    /// restores the previous session while buffers arrive one by one.
    ///
    /// # Errors
    ///
    /// [`GraphError::DuplicateBuffer`] when the pointer is already present.
    pub fn add_buffer(&mut self, pointer: Pointer, mut buffer: Buffer) -> Result<usize, GraphError> {
        if self.buffers.contains_key(&pointer) {
            return Err(GraphError::DuplicateBuffer(pointer));
        }
        buffer.pointer = pointer;
        self.buffers.insert(pointer, buffer);
        self.order.push(pointer);
        let index = self.order.len() - 1;
        self.events.push(GraphEvent::BufferAdded {
            buffer: pointer,
            index,
        });
        self.refresh_filter();

        match self.session.last_open_index() {
            None if self.order.len() == 1 => {
                self.select_buffer_index(Some(0));
            }
            Some(last) if last == index => {
                debug!("restoring selection of buffer {pointer} at index {index}");
                self.select_buffer_index(Some(index));
            }
            _ => {}
        }
        Ok(index)
    }

    /// Physically removes a buffer and its lines.  No-op for unknown pointers.
    pub fn remove_buffer(&mut self, pointer: Pointer) -> bool {
        let Some(buffer) = self.buffers.remove(&pointer) else {
            return false;
        };
        self.order.retain(|p| *p != pointer);
        for line in &buffer.lines {
            if let Some(line) = self.lines.remove(&(pointer, *line)) {
                self.graveyard.lines.push(line);
            }
        }
        self.dirty_nicklists.remove(&pointer);
        self.graveyard.buffers.push(buffer);
        self.events.push(GraphEvent::BufferRemoved { buffer: pointer });

        if self.view.revalidate(self.order.len()) {
            self.events.push(GraphEvent::SelectionChanged { index: None });
        }
        self.refresh_filter();
        true
    }

    /// Flags a buffer for removal at the end of the current turn.
    pub fn mark_buffer_closing(&mut self, pointer: Pointer) -> bool {
        match self.buffers.get_mut(&pointer) {
            Some(buffer) => {
                buffer.closing = true;
                self.refresh_filter();
                true
            }
            None => false,
        }
    }

    /// Looks a buffer up by pointer, including one flagged for removal.
    pub fn buffer(&self, pointer: Pointer) -> Option<&Buffer> {
        self.buffers.get(&pointer)
    }

    /// Buffers in list order, skipping those flagged for removal.
    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.order
            .iter()
            .filter_map(|p| self.buffers.get(p))
            .filter(|b| !b.closing)
    }

    /// Buffer at a list position.  Positions count flagged buffers until the
    /// end of the turn.
    pub fn buffer_at(&self, index: usize) -> Option<&Buffer> {
        self.order.get(index).and_then(|p| self.buffers.get(p))
    }

    pub fn buffer_count(&self) -> usize {
        self.order.len()
    }

    /// Re-applies decoded fields to an existing buffer.
    ///
    /// Returns the number of fields its schema rejected.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownBuffer`] when the buffer is absent.
    pub fn update_buffer(
        &mut self,
        pointer: Pointer,
        objects: &BTreeMap<String, Object>,
    ) -> Result<usize, GraphError> {
        let buffer = self
            .buffers
            .get_mut(&pointer)
            .ok_or(GraphError::UnknownBuffer(pointer))?;
        let rejected = hydrate(buffer, objects);
        self.events.push(GraphEvent::BufferChanged { buffer: pointer });
        self.refresh_filter();
        Ok(rejected)
    }

    // ── Lines ────────────────────────────────────────────────────────────────

    /// Inserts a line under its buffer.
    ///
    /// # Errors
    ///
    /// - [`GraphError::OrphanReference`] when the buffer is absent; no line
    ///   is created.
    /// - [`GraphError::DuplicateLine`] when the key is taken; the stored line
    ///   is left untouched.
    pub fn add_line(
        &mut self,
        buffer: Pointer,
        pointer: Pointer,
        mut line: Line,
        placement: Placement,
    ) -> Result<(), GraphError> {
        let Some(parent) = self.buffers.get_mut(&buffer) else {
            return Err(GraphError::OrphanReference {
                kind: "line",
                parent: buffer,
                child: pointer,
            });
        };
        if let Some(existing) = self.lines.get(&(buffer, pointer)) {
            debug!(
                "duplicate line {pointer}: kept {:?}, discarded {:?}",
                existing.message, line.message
            );
            return Err(GraphError::DuplicateLine {
                buffer,
                line: pointer,
            });
        }

        line.buffer = buffer;
        line.pointer = pointer;
        match placement {
            Placement::Append => parent.lines.push_back(pointer),
            Placement::Prepend => parent.lines.push_front(pointer),
        }
        self.lines.insert((buffer, pointer), line);
        self.events.push(match placement {
            Placement::Append => GraphEvent::LineAppended {
                buffer,
                line: pointer,
            },
            Placement::Prepend => GraphEvent::LinePrepended {
                buffer,
                line: pointer,
            },
        });
        Ok(())
    }

    pub fn line(&self, buffer: Pointer, pointer: Pointer) -> Option<&Line> {
        self.lines.get(&(buffer, pointer))
    }

    /// Lines of a buffer, newest first.
    pub fn lines_of(&self, buffer: Pointer) -> impl Iterator<Item = &Line> {
        self.buffers
            .get(&buffer)
            .into_iter()
            .flat_map(|b| b.lines.iter())
            .filter_map(move |p| self.lines.get(&(buffer, *p)))
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Drops every line of a buffer and returns how many there were.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownBuffer`] when the buffer is absent.
    pub fn clear_lines(&mut self, buffer: Pointer) -> Result<usize, GraphError> {
        let parent = self
            .buffers
            .get_mut(&buffer)
            .ok_or(GraphError::UnknownBuffer(buffer))?;
        let cleared: Vec<Pointer> = parent.lines.drain(..).collect();
        for pointer in &cleared {
            if let Some(line) = self.lines.remove(&(buffer, *pointer)) {
                self.graveyard.lines.push(line);
            }
        }
        self.events.push(GraphEvent::LinesCleared { buffer });
        Ok(cleared.len())
    }

    // ── Nicks ────────────────────────────────────────────────────────────────

    /// Stores a nick in its buffer, replacing one with the same pointer.
    ///
    /// # Errors
    ///
    /// [`GraphError::OrphanReference`] when the buffer is absent.
    pub fn add_nick(&mut self, buffer: Pointer, pointer: Pointer, mut nick: Nick) -> Result<(), GraphError> {
        let parent = self.nick_parent(buffer, pointer)?;
        nick.pointer = pointer;
        parent.add_nick(pointer, nick);
        self.dirty_nicklists.insert(buffer);
        Ok(())
    }

    /// Re-applies fields to a stored nick.  Returns `false` when the nick is
    /// unknown.
    ///
    /// # Errors
    ///
    /// [`GraphError::OrphanReference`] when the buffer is absent.
    pub fn update_nick(
        &mut self,
        buffer: Pointer,
        pointer: Pointer,
        objects: &BTreeMap<String, Object>,
    ) -> Result<bool, GraphError> {
        let parent = self.nick_parent(buffer, pointer)?;
        let Some(nick) = parent.nick_mut(pointer) else {
            return Ok(false);
        };
        hydrate(nick, objects);
        self.dirty_nicklists.insert(buffer);
        Ok(true)
    }

    /// # Errors
    ///
    /// [`GraphError::OrphanReference`] when the buffer is absent.
    pub fn remove_nick(&mut self, buffer: Pointer, pointer: Pointer) -> Result<Option<Nick>, GraphError> {
        let parent = self.nick_parent(buffer, pointer)?;
        let removed = parent.remove_nick(pointer);
        if removed.is_some() {
            self.dirty_nicklists.insert(buffer);
        }
        Ok(removed)
    }

    /// # Errors
    ///
    /// [`GraphError::UnknownBuffer`] when the buffer is absent.
    pub fn clear_nicks(&mut self, buffer: Pointer) -> Result<(), GraphError> {
        self.buffers
            .get_mut(&buffer)
            .ok_or(GraphError::UnknownBuffer(buffer))?
            .clear_nicks();
        self.dirty_nicklists.insert(buffer);
        Ok(())
    }

    fn nick_parent(&mut self, buffer: Pointer, nick: Pointer) -> Result<&mut Buffer, GraphError> {
        self.buffers
            .get_mut(&buffer)
            .ok_or(GraphError::OrphanReference {
                kind: "nick",
                parent: buffer,
                child: nick,
            })
    }

    // ── Hotlist ──────────────────────────────────────────────────────────────

    /// Stores a hotlist entry.  An existing entry is overwritten; the one it
    /// replaced is returned.
    pub fn add_hotlist(&mut self, pointer: Pointer, mut item: HotlistItem) -> Option<HotlistItem> {
        item.pointer = pointer;
        let previous = self.hotlist.insert(pointer, item);
        if previous.is_some() {
            warn!("hotlist entry {pointer} already present; overwriting");
        }
        self.hotlist_dirty = true;
        previous
    }

    pub fn hotlist_item(&self, pointer: Pointer) -> Option<&HotlistItem> {
        self.hotlist.get(&pointer)
    }

    pub fn hotlist(&self) -> impl Iterator<Item = &HotlistItem> {
        self.hotlist.values()
    }

    pub fn hotlist_count(&self) -> usize {
        self.hotlist.len()
    }

    pub fn clear_hotlist(&mut self) {
        self.graveyard
            .hotlist
            .extend(self.hotlist.drain().map(|(_, item)| item));
        self.hotlist_dirty = true;
    }

    // ── Selection and filter ─────────────────────────────────────────────────

    pub fn view(&self) -> &BufferView {
        &self.view
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.view.selected()
    }

    pub fn selected_buffer(&self) -> Option<&Buffer> {
        self.view.selected().and_then(|i| self.buffer_at(i))
    }

    /// Changes the selection.
    ///
    /// Selecting the current index, or an index past the end of the list,
    /// does nothing and returns `false`.  Otherwise observers are notified,
    /// more history is requested for the newly selected buffer, and the index
    /// is persisted.
    pub fn select_buffer_index(&mut self, index: Option<usize>) -> bool {
        if index == self.view.selected() {
            return false;
        }
        if let Some(i) = index {
            if i >= self.order.len() {
                debug!("ignoring selection of index {i}; {} buffers", self.order.len());
                return false;
            }
        }

        self.view.set_selected(index);
        self.events.push(GraphEvent::SelectionChanged { index });

        if let Some(i) = index {
            let pointer = self.order[i];
            let loaded = self.buffers.get(&pointer).map_or(0, Buffer::line_count);
            self.history.fetch_more_lines(pointer, loaded);
            self.session.set_last_open_index(i);
        }
        true
    }

    /// Selects a buffer by pointer; an unknown pointer clears the selection.
    pub fn select_buffer(&mut self, pointer: Pointer) -> bool {
        let index = self.order.iter().position(|p| *p == pointer);
        self.select_buffer_index(index)
    }

    /// Replaces the filter string and recomputes the filtered projection.
    pub fn set_filter(&mut self, filter: &str) {
        if self.view.set_filter(filter) {
            self.refresh_filter();
        }
    }

    /// Buffers passing the filter, in list order.
    pub fn filtered_buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.view
            .filtered()
            .iter()
            .filter_map(|p| self.buffers.get(p))
    }

    fn refresh_filter(&mut self) {
        let buffers = &self.buffers;
        let changed = self.view.recompute(
            self.order
                .iter()
                .filter_map(|p| buffers.get(p))
                .filter(|b| !b.closing)
                .map(|b| (b.pointer, b.name.as_str())),
        );
        if changed {
            self.events.push(GraphEvent::FilterChanged);
        }
    }

    // ── Reset and turns ──────────────────────────────────────────────────────

    /// Clears every map and parks all entities for disposal.  The filter
    /// string survives; the selection does not.
    pub fn reset_data(&mut self) {
        self.select_buffer_index(None);

        let buffers = std::mem::take(&mut self.buffers);
        let lines = std::mem::take(&mut self.lines);
        let hotlist = std::mem::take(&mut self.hotlist);
        self.order.clear();
        self.dirty_nicklists.clear();
        self.hotlist_dirty = false;

        let orphan_lines = lines
            .values()
            .filter(|l| !buffers.contains_key(&l.buffer))
            .count();
        if orphan_lines > 0 {
            warn!("reset found {orphan_lines} lines without a parent buffer");
        }
        let orphan_hotlist = hotlist
            .values()
            .filter(|h| !h.buffer.is_null() && !buffers.contains_key(&h.buffer))
            .count();
        if orphan_hotlist > 0 {
            debug!("reset found {orphan_hotlist} hotlist entries for unknown buffers");
        }
        info!(
            "graph reset: {} buffers, {} lines, {} hotlist entries discarded",
            buffers.len(),
            lines.len(),
            hotlist.len()
        );

        self.graveyard.buffers.extend(buffers.into_values());
        self.graveyard.lines.extend(lines.into_values());
        self.graveyard.hotlist.extend(hotlist.into_values());
        self.refresh_filter();
        self.events.push(GraphEvent::Reset);
    }

    /// Closes the current processing turn: removes flagged buffers, emits the
    /// coalesced nicklist and hotlist events and disposes of everything
    /// parked.  Returns the number of buffers removed.
    pub fn end_turn(&mut self) -> usize {
        let closing: Vec<Pointer> = self
            .order
            .iter()
            .filter(|p| self.buffers.get(*p).is_some_and(|b| b.closing))
            .copied()
            .collect();
        for pointer in &closing {
            debug!("reclaiming closed buffer {pointer}");
            self.remove_buffer(*pointer);
        }

        for buffer in std::mem::take(&mut self.dirty_nicklists) {
            if self.buffers.contains_key(&buffer) {
                self.events.push(GraphEvent::NicklistChanged { buffer });
            }
        }
        if std::mem::take(&mut self.hotlist_dirty) {
            self.events.push(GraphEvent::HotlistChanged);
        }

        let disposed = self.graveyard.len();
        if disposed > 0 {
            debug!("disposing {disposed} entities");
            self.graveyard = Graveyard::default();
        }
        closing.len()
    }

    /// Takes the events queued since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// `true` when no buffer, line or hotlist entry is held.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.lines.is_empty() && self.hotlist.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
