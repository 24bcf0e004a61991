//! Record handlers: apply one routed record to the entity graph.
//!
//! [`apply`] takes the record by value and walks every item before
//! returning, whatever happens to individual items.  Items that reference a
//! missing parent or repeat an existing key are logged and skipped; they
//! never abort the rest of the record.

use std::collections::BTreeSet;

use relay_core::{
    hydrate, Buffer, EntityGraph, GraphError, HDataItem, HotlistItem, Line, Nick, Placement,
    Pointer, Record,
};
use tracing::{debug, warn};

use super::dispatch::Handler;

/// Applies `record` to `graph` with the given handler.
pub fn apply(graph: &mut EntityGraph, handler: Handler, record: Record) {
    debug!("{handler:?}: {} items from {:?}", record.items.len(), record.id);
    match handler {
        Handler::BufferList | Handler::BufferOpened => upsert_buffers(graph, record.items),
        Handler::BufferClosing => close_buffers(graph, record.items),
        Handler::BufferUpdated => update_buffers(graph, record.items),
        Handler::BufferCleared => clear_buffers(graph, record.items),
        Handler::HistoryLines => history_lines(graph, record.items),
        Handler::LineAdded => live_lines(graph, record.items),
        Handler::Hotlist => replace_hotlist(graph, record.items),
        Handler::Nicklist => replace_nicklists(graph, record.items),
        Handler::NicklistDiff => nicklist_diff(graph, record.items),
    }
}

fn report(err: GraphError) {
    match err {
        GraphError::DuplicateLine { .. } => debug!("{err}"),
        _ => warn!("{err}"),
    }
}

// ── Buffers ───────────────────────────────────────────────────────────────────

fn upsert_buffers(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    for item in items {
        let pointer = item.target();
        if graph.buffer(pointer).is_some() {
            if let Err(e) = graph.update_buffer(pointer, &item.objects) {
                report(e);
            }
            continue;
        }
        let mut buffer = Buffer::new(pointer);
        hydrate(&mut buffer, &item.objects);
        if let Err(e) = graph.add_buffer(pointer, buffer) {
            report(e);
        }
    }
}

fn close_buffers(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    for item in items {
        let pointer = item.target();
        if !graph.mark_buffer_closing(pointer) {
            debug!("close for unknown buffer {pointer}");
        }
    }
}

fn update_buffers(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    for item in items {
        if let Err(e) = graph.update_buffer(item.target(), &item.objects) {
            report(e);
        }
    }
}

fn clear_buffers(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    for item in items {
        match graph.clear_lines(item.target()) {
            Ok(n) => debug!("cleared {n} lines of {}", item.target()),
            Err(e) => report(e),
        }
    }
}

// ── Lines ─────────────────────────────────────────────────────────────────────

/// History replies address lines as `buffer/.../line_data`: the root pointer
/// is the buffer, the last one the line.
fn history_lines(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    for item in items {
        let buffer = item.root();
        let pointer = item.target();
        let mut line = Line::new(buffer, pointer);
        hydrate(&mut line, &item.objects);
        if let Err(e) = graph.add_line(buffer, pointer, line, Placement::Append) {
            report(e);
        }
    }
}

/// Live lines only carry the line pointer in their path; the owning buffer is
/// in the `buffer` field.
fn live_lines(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    for item in items {
        let pointer = item.target();
        let Some(buffer) = item.objects.get("buffer").and_then(|o| o.as_pointer()) else {
            warn!("line {pointer} has no buffer field; dropping");
            continue;
        };
        let mut line = Line::new(buffer, pointer);
        hydrate(&mut line, &item.objects);
        if let Err(e) = graph.add_line(buffer, pointer, line, Placement::Prepend) {
            match e {
                GraphError::DuplicateLine { .. } => warn!("{e}"),
                other => report(other),
            }
        }
    }
}

// ── Hotlist ───────────────────────────────────────────────────────────────────

fn replace_hotlist(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    graph.clear_hotlist();
    for item in items {
        let pointer = item.target();
        let mut entry = HotlistItem::new(pointer);
        hydrate(&mut entry, &item.objects);
        graph.add_hotlist(pointer, entry);
    }
}

// ── Nicklists ─────────────────────────────────────────────────────────────────

fn new_nick(item: &HDataItem) -> Nick {
    let mut nick = Nick::new(item.target());
    hydrate(&mut nick, &item.objects);
    nick
}

/// Nicklist items are `buffer/nicklist_item`.  Every buffer named in the
/// record loses its current nicks before the new ones are stored.
fn replace_nicklists(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    let buffers: BTreeSet<Pointer> = items.iter().map(HDataItem::root).collect();
    for buffer in buffers {
        if let Err(e) = graph.clear_nicks(buffer) {
            debug!("nicklist for unknown buffer: {e}");
        }
    }
    for item in items {
        let nick = new_nick(&item);
        if let Err(e) = graph.add_nick(item.root(), item.target(), nick) {
            report(e);
        }
    }
}

/// `_diff` is `^` (parent group, nothing to do), `+` add, `-` remove or
/// `*` update.
fn nicklist_diff(graph: &mut EntityGraph, items: Vec<HDataItem>) {
    for item in items {
        let buffer = item.root();
        let pointer = item.target();
        let diff = item
            .objects
            .get("_diff")
            .and_then(|o| o.as_i64())
            .and_then(|v| u8::try_from(v).ok())
            .map(char::from);

        let result = match diff {
            Some('^') => Ok(()),
            Some('+') => graph.add_nick(buffer, pointer, new_nick(&item)),
            Some('-') => graph.remove_nick(buffer, pointer).map(|_| ()),
            Some('*') => match graph.update_nick(buffer, pointer, &item.objects) {
                Ok(true) => Ok(()),
                Ok(false) => graph.add_nick(buffer, pointer, new_nick(&item)),
                Err(e) => Err(e),
            },
            other => {
                warn!("nick {pointer}: unknown diff marker {other:?}");
                Ok(())
            }
        };
        if let Err(e) = result {
            report(e);
        }
    }
}
