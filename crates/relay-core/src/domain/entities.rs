//! Entities hydrated from decoded hdata items.
//!
//! Each entity kind has a fixed schema: a `match` from wire field name to a
//! typed setter.  A field with the wrong type or a name the schema does not
//! know is reported as a [`FieldError`] and logged by [`hydrate`]; the
//! remaining fields of the item are still applied.

use std::collections::{BTreeMap, HashMap, VecDeque};

use thiserror::Error;
use tracing::warn;

use crate::protocol::messages::{Object, ObjectType, Pointer};

/// A field of a decoded item could not be applied to an entity.
#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    /// The schema of this entity kind has no such field.
    #[error("unknown {kind} field {field:?}")]
    UnknownField { kind: &'static str, field: String },

    /// The field exists but the decoded value has an incompatible type.
    #[error("{kind}.{field}: expected {expected}, got {found}")]
    TypeMismatch {
        kind: &'static str,
        field: String,
        expected: &'static str,
        found: ObjectType,
    },
}

/// An entity whose properties can be set from decoded key/value pairs.
pub trait Entity {
    /// Name used in log lines and errors (`"buffer"`, `"line"`, ...).
    const KIND: &'static str;

    /// Applies one decoded field.
    ///
    /// # Errors
    ///
    /// [`FieldError`] when the field is unknown or has the wrong type.
    fn set_field(&mut self, name: &str, value: &Object) -> Result<(), FieldError>;
}

/// Applies every field of `objects` to `entity`, logging the ones rejected.
///
/// Returns the number of rejected fields.
pub fn hydrate<E: Entity>(entity: &mut E, objects: &BTreeMap<String, Object>) -> usize {
    let mut rejected = 0;
    for (name, value) in objects {
        if let Err(e) = entity.set_field(name, value) {
            warn!("{e}");
            rejected += 1;
        }
    }
    rejected
}

// ── Typed extraction helpers ──────────────────────────────────────────────────

fn mismatch(kind: &'static str, field: &str, expected: &'static str, value: &Object) -> FieldError {
    FieldError::TypeMismatch {
        kind,
        field: field.to_string(),
        expected,
        found: value.object_type(),
    }
}

fn integer(kind: &'static str, field: &str, value: &Object) -> Result<i64, FieldError> {
    value
        .as_i64()
        .ok_or_else(|| mismatch(kind, field, "integer", value))
}

fn flag(kind: &'static str, field: &str, value: &Object) -> Result<bool, FieldError> {
    integer(kind, field, value).map(|v| v != 0)
}

fn text(kind: &'static str, field: &str, value: &Object) -> Result<String, FieldError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(kind, field, "str", value))
}

fn pointer(kind: &'static str, field: &str, value: &Object) -> Result<Pointer, FieldError> {
    value
        .as_pointer()
        .ok_or_else(|| mismatch(kind, field, "ptr", value))
}

fn string_map(
    kind: &'static str,
    field: &str,
    value: &Object,
) -> Result<BTreeMap<String, String>, FieldError> {
    let Object::HashTable(pairs) = value else {
        return Err(mismatch(kind, field, "htb", value));
    };
    pairs
        .iter()
        .map(|(k, v)| match (k.as_str(), v.as_str()) {
            (Some(k), Some(v)) => Ok((k.to_string(), v.to_string())),
            _ => Err(mismatch(kind, field, "htb of str", value)),
        })
        .collect()
}

fn string_list(kind: &'static str, field: &str, value: &Object) -> Result<Vec<String>, FieldError> {
    let Object::Array(items) = value else {
        return Err(mismatch(kind, field, "arr", value));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| mismatch(kind, field, "arr of str", value))
        })
        .collect()
}

fn integer_list(kind: &'static str, field: &str, value: &Object) -> Result<Vec<i64>, FieldError> {
    let Object::Array(items) = value else {
        return Err(mismatch(kind, field, "arr", value));
    };
    items
        .iter()
        .map(|v| v.as_i64().ok_or_else(|| mismatch(kind, field, "arr of int", value)))
        .collect()
}

fn unknown(kind: &'static str, field: &str) -> FieldError {
    FieldError::UnknownField {
        kind,
        field: field.to_string(),
    }
}

// ── Buffer ────────────────────────────────────────────────────────────────────

/// A chat buffer (channel, query, server console, ...).
///
/// Line pointers are kept newest first: live lines go to the front, history
/// fetched afterwards goes to the back.  The lines themselves live in the
/// graph's line map keyed by `(buffer, line)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buffer {
    pub pointer: Pointer,
    pub number: i64,
    pub name: String,
    pub full_name: String,
    pub short_name: String,
    pub title: String,
    pub hidden: bool,
    /// `0` formatted, `1` free content.
    pub buffer_type: i64,
    pub notify: i64,
    pub nicklist_visible: bool,
    pub local_variables: BTreeMap<String, String>,
    pub(crate) lines: VecDeque<Pointer>,
    pub(crate) nicks: HashMap<Pointer, Nick>,
    pub(crate) closing: bool,
}

impl Buffer {
    pub fn new(pointer: Pointer) -> Self {
        Self {
            pointer,
            ..Self::default()
        }
    }

    /// Line pointers, newest first.
    pub fn line_pointers(&self) -> impl Iterator<Item = Pointer> + '_ {
        self.lines.iter().copied()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// `true` once a close event arrived; the buffer disappears at the end of
    /// the current processing turn.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn nick(&self, pointer: Pointer) -> Option<&Nick> {
        self.nicks.get(&pointer)
    }

    pub fn nicks(&self) -> impl Iterator<Item = &Nick> {
        self.nicks.values()
    }

    pub fn nick_count(&self) -> usize {
        self.nicks.len()
    }

    /// Stores a nick, returning the one it replaced.
    pub fn add_nick(&mut self, pointer: Pointer, nick: Nick) -> Option<Nick> {
        self.nicks.insert(pointer, nick)
    }

    pub fn nick_mut(&mut self, pointer: Pointer) -> Option<&mut Nick> {
        self.nicks.get_mut(&pointer)
    }

    pub fn remove_nick(&mut self, pointer: Pointer) -> Option<Nick> {
        self.nicks.remove(&pointer)
    }

    pub fn clear_nicks(&mut self) {
        self.nicks.clear();
    }
}

impl Entity for Buffer {
    const KIND: &'static str = "buffer";

    fn set_field(&mut self, name: &str, value: &Object) -> Result<(), FieldError> {
        let k = Self::KIND;
        match name {
            "number" => self.number = integer(k, name, value)?,
            "name" => self.name = text(k, name, value)?,
            "full_name" => {
                let full_name = text(k, name, value)?;
                // Live open events carry no `name`; keep it tracking the full name.
                if self.name.is_empty() || self.name == self.full_name {
                    self.name.clone_from(&full_name);
                }
                self.full_name = full_name;
            }
            "short_name" => self.short_name = text(k, name, value)?,
            "title" => self.title = text(k, name, value)?,
            "hidden" => self.hidden = flag(k, name, value)?,
            "type" => self.buffer_type = integer(k, name, value)?,
            "notify" => self.notify = integer(k, name, value)?,
            "nicklist" => self.nicklist_visible = flag(k, name, value)?,
            "local_variables" => self.local_variables = string_map(k, name, value)?,
            // Sent alongside merge events; merging is not modelled.
            "prev_buffer" | "next_buffer" => {
                pointer(k, name, value)?;
            }
            _ => return Err(unknown(k, name)),
        }
        Ok(())
    }
}

// ── Line ──────────────────────────────────────────────────────────────────────

/// One message line of a buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    /// Owning buffer; fixed by the graph key, never by a decoded field.
    pub buffer: Pointer,
    pub pointer: Pointer,
    pub date: i64,
    pub date_printed: i64,
    pub displayed: bool,
    pub highlight: bool,
    pub notify_level: i64,
    pub prefix: String,
    pub message: String,
    pub tags: Vec<String>,
}

impl Line {
    pub fn new(buffer: Pointer, pointer: Pointer) -> Self {
        Self {
            buffer,
            pointer,
            displayed: true,
            ..Self::default()
        }
    }
}

impl Entity for Line {
    const KIND: &'static str = "line";

    fn set_field(&mut self, name: &str, value: &Object) -> Result<(), FieldError> {
        let k = Self::KIND;
        match name {
            "date" => self.date = integer(k, name, value)?,
            "date_printed" => self.date_printed = integer(k, name, value)?,
            "displayed" => self.displayed = flag(k, name, value)?,
            "highlight" => self.highlight = flag(k, name, value)?,
            "notify_level" => self.notify_level = integer(k, name, value)?,
            "prefix" => self.prefix = text(k, name, value)?,
            "message" => self.message = text(k, name, value)?,
            "tags_array" => self.tags = string_list(k, name, value)?,
            // Server-side layout and sub-second detail; not kept.
            "y" | "tags_count" | "prefix_length" | "refresh_needed" | "id" | "date_usec"
            | "date_usec_printed" => {
                integer(k, name, value)?;
            }
            "str_time" => {
                text(k, name, value)?;
            }
            // Only used to locate the parent; the key already records it.
            "buffer" => {
                pointer(k, name, value)?;
            }
            _ => return Err(unknown(k, name)),
        }
        Ok(())
    }
}

// ── Nick ──────────────────────────────────────────────────────────────────────

/// A nicklist entry (a nick or a nick group) of one buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Nick {
    pub pointer: Pointer,
    pub group: bool,
    pub visible: bool,
    pub level: i64,
    pub name: String,
    pub color: String,
    pub prefix: String,
    pub prefix_color: String,
}

impl Nick {
    pub fn new(pointer: Pointer) -> Self {
        Self {
            pointer,
            visible: true,
            ..Self::default()
        }
    }
}

impl Entity for Nick {
    const KIND: &'static str = "nick";

    fn set_field(&mut self, name: &str, value: &Object) -> Result<(), FieldError> {
        let k = Self::KIND;
        match name {
            "group" => self.group = flag(k, name, value)?,
            "visible" => self.visible = flag(k, name, value)?,
            "level" => self.level = integer(k, name, value)?,
            "name" => self.name = text(k, name, value)?,
            "color" => self.color = text(k, name, value)?,
            "prefix" => self.prefix = text(k, name, value)?,
            "prefix_color" => self.prefix_color = text(k, name, value)?,
            // Diff marker, consumed by the nicklist diff handler.
            "_diff" => {
                integer(k, name, value)?;
            }
            _ => return Err(unknown(k, name)),
        }
        Ok(())
    }
}

// ── Hotlist ───────────────────────────────────────────────────────────────────

/// Unread-activity entry for one buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HotlistItem {
    pub pointer: Pointer,
    /// `0` low, `1` message, `2` private, `3` highlight.
    pub priority: i64,
    /// Seconds since the Unix epoch when the entry was created.
    pub creation_time: i64,
    pub buffer: Pointer,
    /// Unread counts per priority level.
    pub count: Vec<i64>,
}

impl HotlistItem {
    pub fn new(pointer: Pointer) -> Self {
        Self {
            pointer,
            ..Self::default()
        }
    }
}

impl Entity for HotlistItem {
    const KIND: &'static str = "hotlist";

    fn set_field(&mut self, name: &str, value: &Object) -> Result<(), FieldError> {
        let k = Self::KIND;
        match name {
            "priority" => self.priority = integer(k, name, value)?,
            "creation_time.tv_sec" => self.creation_time = integer(k, name, value)?,
            "creation_time.tv_usec" => {
                integer(k, name, value)?;
            }
            "buffer" => self.buffer = pointer(k, name, value)?,
            "count" => self.count = integer_list(k, name, value)?,
            // Linked-list neighbours of the server-side hotlist.
            "prev_hotlist" | "next_hotlist" => {
                pointer(k, name, value)?;
            }
            _ => return Err(unknown(k, name)),
        }
        Ok(())
    }
}
