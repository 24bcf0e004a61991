//! Typed values decoded from the relay wire format.
//!
//! The relay protocol is schema-less: every value on the wire is preceded by
//! a three-letter type tag, and the receiver learns the shape of a message
//! only by reading it.  This module defines the Rust types those tags decode
//! into, plus the [`Record`] projection that the graph handlers consume.
//!
//! # What is an hdata? (for beginners)
//!
//! Most interesting messages carry one or more `hda` objects.  An hdata is a
//! small table: a list of *keys* (`name:type` pairs) and a list of *items*.
//! Each item lists the pointers of every object along its h-path (for example
//! `buffer/lines/line/line_data` yields four pointers, root first) followed by
//! one value per key.
//!
//! ```text
//! h-path: "buffer/lines/line/line_data"
//! keys:   "date:tim,prefix:str,message:str"
//! item 0: [0x1, 0x2, 0x3, 0x4]  date=1700000000 prefix="alice" message="hi"
//! ```

use std::collections::BTreeMap;
use std::fmt;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the full frame header (length prefix + compression flag).
pub const FRAME_HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + 1;

/// Largest frame the client accepts; anything bigger is treated as a corrupt prefix.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// ── Compression flag ──────────────────────────────────────────────────────────

/// Compression byte that follows the length prefix of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    Off = 0x00,
    Zlib = 0x01,
}

impl TryFrom<u8> for Compression {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Compression::Off),
            0x01 => Ok(Compression::Zlib),
            _ => Err(()),
        }
    }
}

// ── Pointers ──────────────────────────────────────────────────────────────────

/// Opaque 64-bit handle issued by the server for one remote object.
///
/// Pointers are unique only within their category (buffer, line, nick,
/// hotlist).  On the wire they travel as hexadecimal text without the `0x`
/// prefix; `"0"` is the null pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer(pub u64);

impl Pointer {
    pub const NULL: Pointer = Pointer(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Parses the wire representation (`"7f3a2c"`, optionally `0x`-prefixed).
    pub fn from_hex(text: &str) -> Option<Pointer> {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16).ok().map(Pointer)
    }

    /// Hex digits as sent on the wire (no `0x` prefix).
    pub fn to_wire(self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// ── Object type tags ──────────────────────────────────────────────────────────

/// The three-letter type tags that prefix every object on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Char,
    Int,
    Long,
    String,
    Buffer,
    Pointer,
    Time,
    HashTable,
    HData,
    Info,
    InfoList,
    Array,
}

impl ObjectType {
    pub fn tag(self) -> &'static str {
        match self {
            ObjectType::Char => "chr",
            ObjectType::Int => "int",
            ObjectType::Long => "lon",
            ObjectType::String => "str",
            ObjectType::Buffer => "buf",
            ObjectType::Pointer => "ptr",
            ObjectType::Time => "tim",
            ObjectType::HashTable => "htb",
            ObjectType::HData => "hda",
            ObjectType::Info => "inf",
            ObjectType::InfoList => "inl",
            ObjectType::Array => "arr",
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<ObjectType> {
        Some(match tag {
            b"chr" => ObjectType::Char,
            b"int" => ObjectType::Int,
            b"lon" => ObjectType::Long,
            b"str" => ObjectType::String,
            b"buf" => ObjectType::Buffer,
            b"ptr" => ObjectType::Pointer,
            b"tim" => ObjectType::Time,
            b"htb" => ObjectType::HashTable,
            b"hda" => ObjectType::HData,
            b"inf" => ObjectType::Info,
            b"inl" => ObjectType::InfoList,
            b"arr" => ObjectType::Array,
            _ => return None,
        })
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ── Decoded objects ───────────────────────────────────────────────────────────

/// One decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Char(i8),
    Int(i32),
    Long(i64),
    /// `None` is the protocol's NULL string (length `-1`).
    String(Option<String>),
    Buffer(Option<Vec<u8>>),
    Pointer(Pointer),
    /// Seconds since the Unix epoch.
    Time(i64),
    HashTable(Vec<(Object, Object)>),
    HData(HData),
    Info { name: String, value: Option<String> },
    InfoList(InfoList),
    Array(Vec<Object>),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Char(_) => ObjectType::Char,
            Object::Int(_) => ObjectType::Int,
            Object::Long(_) => ObjectType::Long,
            Object::String(_) => ObjectType::String,
            Object::Buffer(_) => ObjectType::Buffer,
            Object::Pointer(_) => ObjectType::Pointer,
            Object::Time(_) => ObjectType::Time,
            Object::HashTable(_) => ObjectType::HashTable,
            Object::HData(_) => ObjectType::HData,
            Object::Info { .. } => ObjectType::Info,
            Object::InfoList(_) => ObjectType::InfoList,
            Object::Array(_) => ObjectType::Array,
        }
    }

    /// Integer view of any numeric scalar (`chr`, `int`, `lon`, `tim`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Object::Char(v) => Some(i64::from(*v)),
            Object::Int(v) => Some(i64::from(*v)),
            Object::Long(v) | Object::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// String view; NULL strings read as empty.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::String(s) => Some(s.as_deref().unwrap_or("")),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Pointer> {
        match self {
            Object::Pointer(p) => Some(*p),
            _ => None,
        }
    }
}

/// An `hda` object: a typed table of items addressed by pointer paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HData {
    /// Elements of the h-path, e.g. `["buffer", "lines", "line", "line_data"]`.
    pub path: Vec<String>,
    /// Declared keys in wire order.
    pub keys: Vec<(String, ObjectType)>,
    pub items: Vec<HDataItem>,
}

/// One row of an hdata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HDataItem {
    /// Ancestry of the object, root first, target last.  Never empty once decoded.
    pub pointers: Vec<Pointer>,
    pub objects: BTreeMap<String, Object>,
}

impl HDataItem {
    /// The root pointer of the path (for example the owning buffer).
    pub fn root(&self) -> Pointer {
        self.pointers.first().copied().unwrap_or_default()
    }

    /// The pointer of the object this item describes.
    pub fn target(&self) -> Pointer {
        self.pointers.last().copied().unwrap_or_default()
    }
}

/// An `inl` object: a named list of variable sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoList {
    pub name: String,
    pub items: Vec<Vec<(String, Object)>>,
}

/// One decoded frame payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    /// Message identifier.  Server events start with `_`; replies carry the
    /// identifier the client put in parentheses before the command.
    pub id: String,
    pub objects: Vec<Object>,
}

// ── Records ───────────────────────────────────────────────────────────────────

/// A decoded message reduced to what the graph handlers need: the identifier
/// plus the items of every hdata the message carried, in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: String,
    pub items: Vec<HDataItem>,
}

impl From<RelayMessage> for Record {
    fn from(msg: RelayMessage) -> Self {
        let mut items = Vec::new();
        for object in msg.objects {
            if let Object::HData(hdata) = object {
                items.extend(hdata.items);
            }
        }
        Record { id: msg.id, items }
    }
}
