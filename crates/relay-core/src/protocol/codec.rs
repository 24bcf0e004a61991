//! Binary codec for relay message payloads.
//!
//! Payload format (after the frame header and optional decompression):
//! ```text
//! [id: str][type:3][value]...[type:3][value]
//! ```
//! All multi-byte integers are big-endian.  Strings carry a 4-byte signed
//! length where `-1` is NULL.  Pointers, longs, and times are short ASCII
//! tokens with a 1-byte length.
//!
//! Decoding is total over well-formed input.  Any grammar violation yields a
//! [`ProtocolError`]; the caller drops that one message and keeps reading.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use thiserror::Error;

use crate::protocol::messages::{
    Compression, HData, HDataItem, InfoList, Object, ObjectType, Pointer, RelayMessage,
    FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
};

/// Deepest nesting of container objects (htb/arr/hda/inl) the decoder follows.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Errors that can occur during frame or payload encoding and decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice ended before a field was complete.
    #[error("insufficient data for {context}: need {needed} bytes, got {available}")]
    InsufficientData {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    /// A three-letter type tag is not one the protocol defines.
    #[error("unknown object type tag: {0:?}")]
    UnknownObjectType(String),

    /// The compression byte of a frame is not supported.
    #[error("unsupported compression flag: 0x{0:02X}")]
    UnsupportedCompression(u8),

    /// The frame length prefix is smaller than the header or absurdly large.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(u32),

    /// The payload could not be parsed (bad length, bad number, bad pointer, ...).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A compressed payload could not be inflated.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Containers nested deeper than [`MAX_NESTING_DEPTH`].
    #[error("objects nested deeper than {MAX_NESTING_DEPTH} levels")]
    NestingTooDeep,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one (already decompressed) frame payload.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the payload violates the wire grammar.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::codec::{decode_message, encode_message};
/// use relay_core::protocol::messages::{Object, RelayMessage};
///
/// let msg = RelayMessage {
///     id: "_pong".to_string(),
///     objects: vec![Object::String(Some("42".to_string()))],
/// };
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(decode_message(&bytes).unwrap(), msg);
/// ```
pub fn decode_message(payload: &[u8]) -> Result<RelayMessage, ProtocolError> {
    let mut reader = Reader::new(payload);
    let id = reader.read_string("message id")?.unwrap_or_default();
    let mut objects = Vec::new();
    while !reader.is_empty() {
        let ty = reader.read_type()?;
        objects.push(reader.read_object(ty)?);
    }
    Ok(RelayMessage { id, objects })
}

/// Inflates a payload according to the frame's compression flag.
///
/// # Errors
///
/// Returns [`ProtocolError::Decompress`] if the zlib stream is corrupt or
/// inflates to more than [`MAX_FRAME_SIZE`] bytes.
pub fn decompress(compression: Compression, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    match compression {
        Compression::Off => Ok(payload.to_vec()),
        Compression::Zlib => inflate_bounded(payload, MAX_FRAME_SIZE),
    }
}

fn inflate_bounded(payload: &[u8], limit: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(payload.len().saturating_mul(4).min(limit));
    // One byte past the limit is enough to tell an oversized stream apart.
    ZlibDecoder::new(payload)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| ProtocolError::Decompress(e.to_string()))?;
    if out.len() > limit {
        return Err(ProtocolError::Decompress(format!(
            "inflated payload exceeds {limit} bytes"
        )));
    }
    Ok(out)
}

/// Encodes a message payload (no frame header).
///
/// The client never sends binary messages to the server; the encoder exists so
/// that tests, benchmarks, and fake servers can produce byte-exact fixtures.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if an hdata item is missing a
/// declared key or has the wrong number of pointers for its path.
pub fn encode_message(msg: &RelayMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    write_string(&mut buf, Some(&msg.id));
    for object in &msg.objects {
        buf.extend_from_slice(object.object_type().tag().as_bytes());
        write_object(&mut buf, object)?;
    }
    Ok(buf)
}

/// Wraps a payload into a complete frame, compressing it if requested.
///
/// # Errors
///
/// Returns [`ProtocolError::Decompress`] if the zlib encoder fails and
/// [`ProtocolError::InvalidFrameLength`] if the frame would not fit a `u32`.
pub fn encode_frame(payload: &[u8], compression: Compression) -> Result<Vec<u8>, ProtocolError> {
    let body = match compression {
        Compression::Off => payload.to_vec(),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(payload)
                .map_err(|e| ProtocolError::Decompress(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| ProtocolError::Decompress(e.to_string()))?
        }
    };
    let total = FRAME_HEADER_SIZE + body.len();
    let total_u32 =
        u32::try_from(total).map_err(|_| ProtocolError::InvalidFrameLength(u32::MAX))?;

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&total_u32.to_be_bytes());
    frame.push(compression as u8);
    frame.extend_from_slice(&body);
    Ok(frame)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, depth: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], ProtocolError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(ProtocolError::InsufficientData {
                context,
                needed: n,
                available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self, context: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, context)?[0])
    }

    fn read_i32(&mut self, context: &'static str) -> Result<i32, ProtocolError> {
        let b = self.take(4, context)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a non-negative `int` used as an element count.
    fn read_count(&mut self, context: &'static str) -> Result<usize, ProtocolError> {
        let n = self.read_i32(context)?;
        usize::try_from(n)
            .map_err(|_| ProtocolError::MalformedPayload(format!("{context}: negative count {n}")))
    }

    /// Reads a 4-byte-length-prefixed byte string.  `-1` is NULL.
    fn read_bytes(&mut self, context: &'static str) -> Result<Option<&'a [u8]>, ProtocolError> {
        let len = self.read_i32(context)?;
        match len {
            -1 => Ok(None),
            n if n < 0 => Err(ProtocolError::MalformedPayload(format!(
                "{context}: invalid length {n}"
            ))),
            n => self.take(n as usize, context).map(Some),
        }
    }

    fn read_string(&mut self, context: &'static str) -> Result<Option<String>, ProtocolError> {
        Ok(self
            .read_bytes(context)?
            .map(|b| String::from_utf8_lossy(b).into_owned()))
    }

    /// Reads a 1-byte-length-prefixed ASCII token (`lon`, `ptr`, `tim`).
    fn read_token(&mut self, context: &'static str) -> Result<&'a str, ProtocolError> {
        let len = self.read_u8(context)? as usize;
        let raw = self.take(len, context)?;
        std::str::from_utf8(raw)
            .map_err(|_| ProtocolError::MalformedPayload(format!("{context}: non-ASCII token")))
    }

    fn read_number(&mut self, context: &'static str) -> Result<i64, ProtocolError> {
        let token = self.read_token(context)?;
        token.parse::<i64>().map_err(|_| {
            ProtocolError::MalformedPayload(format!("{context}: {token:?} is not a number"))
        })
    }

    fn read_pointer(&mut self) -> Result<Pointer, ProtocolError> {
        let token = self.read_token("ptr")?;
        Pointer::from_hex(token)
            .ok_or_else(|| ProtocolError::MalformedPayload(format!("ptr: {token:?} is not hex")))
    }

    fn read_type(&mut self) -> Result<ObjectType, ProtocolError> {
        let tag = self.take(3, "type tag")?;
        ObjectType::from_tag(tag)
            .ok_or_else(|| ProtocolError::UnknownObjectType(String::from_utf8_lossy(tag).into_owned()))
    }

    fn read_object(&mut self, ty: ObjectType) -> Result<Object, ProtocolError> {
        Ok(match ty {
            ObjectType::Char => Object::Char(self.read_u8("chr")? as i8),
            ObjectType::Int => Object::Int(self.read_i32("int")?),
            ObjectType::Long => Object::Long(self.read_number("lon")?),
            ObjectType::String => Object::String(self.read_string("str")?),
            ObjectType::Buffer => Object::Buffer(self.read_bytes("buf")?.map(<[u8]>::to_vec)),
            ObjectType::Pointer => Object::Pointer(self.read_pointer()?),
            ObjectType::Time => Object::Time(self.read_number("tim")?),
            ObjectType::HashTable => self.nested(Self::read_hashtable)?,
            ObjectType::HData => self.nested(Self::read_hdata)?,
            ObjectType::Info => {
                let name = self.read_string("inf name")?.unwrap_or_default();
                let value = self.read_string("inf value")?;
                Object::Info { name, value }
            }
            ObjectType::InfoList => self.nested(Self::read_infolist)?,
            ObjectType::Array => self.nested(Self::read_array)?,
        })
    }

    fn nested(
        &mut self,
        read: fn(&mut Self) -> Result<Object, ProtocolError>,
    ) -> Result<Object, ProtocolError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep);
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn read_hashtable(&mut self) -> Result<Object, ProtocolError> {
        let key_type = self.read_type()?;
        let value_type = self.read_type()?;
        let count = self.read_count("htb count")?;
        let mut pairs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.read_object(key_type)?;
            let value = self.read_object(value_type)?;
            pairs.push((key, value));
        }
        Ok(Object::HashTable(pairs))
    }

    fn read_array(&mut self) -> Result<Object, ProtocolError> {
        let ty = self.read_type()?;
        let count = self.read_count("arr count")?;
        let mut values = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            values.push(self.read_object(ty)?);
        }
        Ok(Object::Array(values))
    }

    fn read_infolist(&mut self) -> Result<Object, ProtocolError> {
        let name = self.read_string("inl name")?.unwrap_or_default();
        let count = self.read_count("inl count")?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let var_count = self.read_count("inl item count")?;
            let mut vars = Vec::with_capacity(var_count.min(1024));
            for _ in 0..var_count {
                let var_name = self.read_string("inl var name")?.unwrap_or_default();
                let ty = self.read_type()?;
                vars.push((var_name, self.read_object(ty)?));
            }
            items.push(vars);
        }
        Ok(Object::InfoList(InfoList { name, items }))
    }

    fn read_hdata(&mut self) -> Result<Object, ProtocolError> {
        let hpath = self.read_string("hda path")?.unwrap_or_default();
        let keys_raw = self.read_string("hda keys")?.unwrap_or_default();
        let count = self.read_count("hda count")?;

        let path: Vec<String> = hpath
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let keys = parse_hdata_keys(&keys_raw)?;

        if count > 0 && path.is_empty() {
            return Err(ProtocolError::MalformedPayload(
                "hda: items present but h-path is empty".to_string(),
            ));
        }

        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let mut pointers = Vec::with_capacity(path.len());
            for _ in 0..path.len() {
                pointers.push(self.read_pointer()?);
            }
            let mut item = HDataItem {
                pointers,
                ..HDataItem::default()
            };
            for (name, ty) in &keys {
                let value = self.read_object(*ty)?;
                item.objects.insert(name.clone(), value);
            }
            items.push(item);
        }
        Ok(Object::HData(HData { path, keys, items }))
    }
}

/// Parses `"number:int,name:str"` into typed key declarations.
fn parse_hdata_keys(raw: &str) -> Result<Vec<(String, ObjectType)>, ProtocolError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|decl| {
            let (name, tag) = decl.split_once(':').ok_or_else(|| {
                ProtocolError::MalformedPayload(format!("hda key {decl:?} has no type"))
            })?;
            let ty = ObjectType::from_tag(tag.as_bytes())
                .ok_or_else(|| ProtocolError::UnknownObjectType(tag.to_string()))?;
            Ok((name.to_string(), ty))
        })
        .collect()
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn write_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn write_len(buf: &mut Vec<u8>, len: usize) -> Result<(), ProtocolError> {
    let n = i32::try_from(len)
        .map_err(|_| ProtocolError::MalformedPayload(format!("length {len} exceeds i32")))?;
    write_i32(buf, n);
    Ok(())
}

fn write_bytes(buf: &mut Vec<u8>, bytes: Option<&[u8]>) {
    match bytes {
        None => write_i32(buf, -1),
        Some(b) => {
            write_i32(buf, b.len() as i32);
            buf.extend_from_slice(b);
        }
    }
}

fn write_string(buf: &mut Vec<u8>, s: Option<&str>) {
    write_bytes(buf, s.map(str::as_bytes));
}

fn write_token(buf: &mut Vec<u8>, token: &str) -> Result<(), ProtocolError> {
    let len = u8::try_from(token.len())
        .map_err(|_| ProtocolError::MalformedPayload(format!("token {token:?} too long")))?;
    buf.push(len);
    buf.extend_from_slice(token.as_bytes());
    Ok(())
}

/// Element type of a homogeneous container; empty containers default to `str`.
fn element_type<'o>(mut values: impl Iterator<Item = &'o Object>) -> ObjectType {
    values
        .next()
        .map(Object::object_type)
        .unwrap_or(ObjectType::String)
}

fn write_object(buf: &mut Vec<u8>, object: &Object) -> Result<(), ProtocolError> {
    match object {
        Object::Char(v) => buf.push(*v as u8),
        Object::Int(v) => write_i32(buf, *v),
        Object::Long(v) | Object::Time(v) => write_token(buf, &v.to_string())?,
        Object::String(s) => write_string(buf, s.as_deref()),
        Object::Buffer(b) => write_bytes(buf, b.as_deref()),
        Object::Pointer(p) => write_token(buf, &p.to_wire())?,
        Object::HashTable(pairs) => {
            let key_type = element_type(pairs.iter().map(|(k, _)| k));
            let value_type = element_type(pairs.iter().map(|(_, v)| v));
            buf.extend_from_slice(key_type.tag().as_bytes());
            buf.extend_from_slice(value_type.tag().as_bytes());
            write_len(buf, pairs.len())?;
            for (k, v) in pairs {
                write_object(buf, k)?;
                write_object(buf, v)?;
            }
        }
        Object::HData(hdata) => write_hdata(buf, hdata)?,
        Object::Info { name, value } => {
            write_string(buf, Some(name));
            write_string(buf, value.as_deref());
        }
        Object::InfoList(list) => {
            write_string(buf, Some(&list.name));
            write_len(buf, list.items.len())?;
            for vars in &list.items {
                write_len(buf, vars.len())?;
                for (name, value) in vars {
                    write_string(buf, Some(name));
                    buf.extend_from_slice(value.object_type().tag().as_bytes());
                    write_object(buf, value)?;
                }
            }
        }
        Object::Array(values) => {
            buf.extend_from_slice(element_type(values.iter()).tag().as_bytes());
            write_len(buf, values.len())?;
            for v in values {
                write_object(buf, v)?;
            }
        }
    }
    Ok(())
}

fn write_hdata(buf: &mut Vec<u8>, hdata: &HData) -> Result<(), ProtocolError> {
    let keys = hdata
        .keys
        .iter()
        .map(|(name, ty)| format!("{name}:{}", ty.tag()))
        .collect::<Vec<_>>()
        .join(",");
    write_string(buf, Some(&hdata.path.join("/")));
    write_string(buf, Some(&keys));
    write_len(buf, hdata.items.len())?;
    for item in &hdata.items {
        if item.pointers.len() != hdata.path.len() {
            return Err(ProtocolError::MalformedPayload(format!(
                "hda item has {} pointers for a path of {}",
                item.pointers.len(),
                hdata.path.len()
            )));
        }
        for p in &item.pointers {
            write_token(buf, &p.to_wire())?;
        }
        for (name, _) in &hdata.keys {
            let value = item.objects.get(name).ok_or_else(|| {
                ProtocolError::MalformedPayload(format!("hda item is missing key {name:?}"))
            })?;
            write_object(buf, value)?;
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn str_obj(s: &str) -> Object {
        Object::String(Some(s.to_string()))
    }

    fn buffer_hdata() -> HData {
        let mut objects = BTreeMap::new();
        objects.insert("number".to_string(), Object::Int(1));
        objects.insert("name".to_string(), str_obj("#test"));
        HData {
            path: vec!["buffer".to_string()],
            keys: vec![
                ("number".to_string(), ObjectType::Int),
                ("name".to_string(), ObjectType::String),
            ],
            items: vec![HDataItem {
                pointers: vec![Pointer(0x1)],
                objects,
            }],
        }
    }

    // ── Hand-assembled payloads ───────────────────────────────────────────────

    #[test]
    fn test_decode_hand_assembled_pong() {
        // Arrange – id "_pong", one str object "abc"
        let mut p = Vec::new();
        p.extend_from_slice(&5i32.to_be_bytes());
        p.extend_from_slice(b"_pong");
        p.extend_from_slice(b"str");
        p.extend_from_slice(&3i32.to_be_bytes());
        p.extend_from_slice(b"abc");

        // Act
        let msg = decode_message(&p).unwrap();

        // Assert
        assert_eq!(msg.id, "_pong");
        assert_eq!(msg.objects, vec![str_obj("abc")]);
    }

    #[test]
    fn test_decode_hand_assembled_hdata_with_pointer_path() {
        // Arrange – hda "buffer/lines" keys "message:str", one item
        let mut p = Vec::new();
        p.extend_from_slice(&4i32.to_be_bytes());
        p.extend_from_slice(b"test");
        p.extend_from_slice(b"hda");
        p.extend_from_slice(&12i32.to_be_bytes());
        p.extend_from_slice(b"buffer/lines");
        p.extend_from_slice(&11i32.to_be_bytes());
        p.extend_from_slice(b"message:str");
        p.extend_from_slice(&1i32.to_be_bytes());
        p.push(2);
        p.extend_from_slice(b"1a");
        p.push(3);
        p.extend_from_slice(b"fff");
        p.extend_from_slice(&2i32.to_be_bytes());
        p.extend_from_slice(b"hi");

        // Act
        let msg = decode_message(&p).unwrap();

        // Assert
        let Object::HData(hdata) = &msg.objects[0] else {
            panic!("expected hdata, got {:?}", msg.objects[0]);
        };
        assert_eq!(hdata.path, vec!["buffer", "lines"]);
        assert_eq!(hdata.items[0].pointers, vec![Pointer(0x1a), Pointer(0xfff)]);
        assert_eq!(hdata.items[0].objects["message"], str_obj("hi"));
    }

    #[test]
    fn test_decode_null_string_and_null_id() {
        let mut p = Vec::new();
        p.extend_from_slice(&(-1i32).to_be_bytes());
        p.extend_from_slice(b"str");
        p.extend_from_slice(&(-1i32).to_be_bytes());

        let msg = decode_message(&p).unwrap();

        assert_eq!(msg.id, "");
        assert_eq!(msg.objects, vec![Object::String(None)]);
    }

    #[test]
    fn test_decode_negative_char_keeps_sign() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(b"chr");
        p.push(0xFF);

        let msg = decode_message(&p).unwrap();

        assert_eq!(msg.objects, vec![Object::Char(-1)]);
    }

    #[test]
    fn test_decode_long_and_time_tokens() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(b"lon");
        p.push(4);
        p.extend_from_slice(b"-123");
        p.extend_from_slice(b"tim");
        p.push(10);
        p.extend_from_slice(b"1700000000");

        let msg = decode_message(&p).unwrap();

        assert_eq!(msg.objects, vec![Object::Long(-123), Object::Time(1_700_000_000)]);
    }

    // ── Encoder-built fixtures ────────────────────────────────────────────────

    #[test]
    fn test_nested_containers_survive_encoding() {
        let msg = RelayMessage {
            id: "nested".to_string(),
            objects: vec![
                Object::HashTable(vec![(str_obj("type"), str_obj("channel"))]),
                Object::Array(vec![Object::Int(1), Object::Int(2)]),
                Object::Info {
                    name: "version".to_string(),
                    value: Some("4.1.0".to_string()),
                },
                Object::InfoList(InfoList {
                    name: "buffer".to_string(),
                    items: vec![vec![("name".to_string(), str_obj("core.weechat"))]],
                }),
                Object::HData(buffer_hdata()),
            ],
        };

        let bytes = encode_message(&msg).unwrap();

        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_empty_hdata_with_empty_path_decodes() {
        let msg = RelayMessage {
            id: "hotlist_init".to_string(),
            objects: vec![Object::HData(HData::default())],
        };

        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes).unwrap();

        assert_eq!(decoded.objects, vec![Object::HData(HData::default())]);
    }

    #[test]
    fn test_encode_rejects_hdata_item_missing_a_key() {
        let mut hdata = buffer_hdata();
        hdata.items[0].objects.remove("name");
        let msg = RelayMessage {
            id: "x".to_string(),
            objects: vec![Object::HData(hdata)],
        };

        assert!(matches!(
            encode_message(&msg),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    // ── Error conditions ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_payload_returns_insufficient_data() {
        assert!(matches!(
            decode_message(&[]),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_type_tag_returns_error() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(b"zzz");

        assert_eq!(
            decode_message(&p),
            Err(ProtocolError::UnknownObjectType("zzz".to_string()))
        );
    }

    #[test]
    fn test_decode_truncated_hdata_returns_error() {
        let msg = RelayMessage {
            id: "buffer_init".to_string(),
            objects: vec![Object::HData(buffer_hdata())],
        };
        let bytes = encode_message(&msg).unwrap();

        let result = decode_message(&bytes[..bytes.len() - 3]);

        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_non_hex_pointer_returns_malformed() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(b"ptr");
        p.push(3);
        p.extend_from_slice(b"xyz");

        assert!(matches!(
            decode_message(&p),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_negative_count_returns_malformed() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(b"arr");
        p.extend_from_slice(b"int");
        p.extend_from_slice(&(-5i32).to_be_bytes());

        assert!(matches!(
            decode_message(&p),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_hdata_items_without_path_returns_malformed() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(b"hda");
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(&1i32.to_be_bytes());

        assert!(matches!(
            decode_message(&p),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_excessive_nesting_is_rejected() {
        // Arrange – arrays of arrays, one level deeper than allowed
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(b"arr");
        for _ in 0..MAX_NESTING_DEPTH {
            p.extend_from_slice(b"arr");
            p.extend_from_slice(&1i32.to_be_bytes());
        }
        p.extend_from_slice(b"int");
        p.extend_from_slice(&0i32.to_be_bytes());

        assert_eq!(decode_message(&p), Err(ProtocolError::NestingTooDeep));
    }

    // ── Frames and compression ────────────────────────────────────────────────

    #[test]
    fn test_encode_frame_length_prefix_counts_itself() {
        let frame = encode_frame(b"abc", Compression::Off).unwrap();

        assert_eq!(&frame[0..4], &8u32.to_be_bytes());
        assert_eq!(frame[4], 0x00);
        assert_eq!(&frame[5..], b"abc");
    }

    #[test]
    fn test_zlib_frame_body_inflates_to_original_payload() {
        let payload = b"the same text repeated, the same text repeated".to_vec();
        let frame = encode_frame(&payload, Compression::Zlib).unwrap();

        let inflated = decompress(Compression::Zlib, &frame[FRAME_HEADER_SIZE..]).unwrap();

        assert_eq!(frame[4], Compression::Zlib as u8);
        assert_eq!(inflated, payload);
    }

    #[test]
    fn test_decompress_corrupt_zlib_returns_error() {
        let result = decompress(Compression::Zlib, &[0x78, 0x9C, 0xFF, 0xFF, 0x00]);
        assert!(matches!(result, Err(ProtocolError::Decompress(_))));
    }

    #[test]
    fn test_inflate_stops_at_limit() {
        // Arrange: 4 KiB of zeros compresses to a few dozen bytes.
        let frame = encode_frame(&vec![0u8; 4096], Compression::Zlib).unwrap();
        let body = &frame[FRAME_HEADER_SIZE..];

        // Act
        let over = inflate_bounded(body, 4095);
        let exact = inflate_bounded(body, 4096);

        // Assert
        assert!(matches!(over, Err(ProtocolError::Decompress(msg)) if msg.contains("exceeds")));
        assert_eq!(exact.unwrap().len(), 4096);
    }
}
