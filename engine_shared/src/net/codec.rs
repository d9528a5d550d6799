//! Typed binary packet codec.
//!
//! A `Packet` is a 16-bit type id plus a typed argument list. On the
//! wire: `u16 id (LE) || body`. Body encoding is whatever the
//! [`PacketCodecEntry`] registered for that id says it is — either a
//! fixed sequence of primitive fields (`Structured`), or an opaque
//! pack/unpack pair (`Custom`) for bodies whose shape isn't a fixed
//! tuple (variable-length entity lists).
//!
//! All multi-byte numerics are little-endian.

use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::{NetworkError, NetworkResult};

/// A single physics update as carried by `EntityUpdatePhys` and
/// `EntityUpdatePhysMulti`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysState {
    pub id: u16,
    pub x: f64,
    pub y: f64,
    pub vx: f32,
    pub vy: f32,
    pub rot: f32,
    pub vrot: f32,
}

/// A typed domain value carried as one argument of a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    U8(u8),
    Bool(bool),
    U16(u16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
    /// Fixed-length byte string on the wire.
    Bytes(Vec<u8>),
    /// Domain-level string; only ever appears before `preprocess` or
    /// after `postprocess`, never packed directly.
    Str(String),
    /// Variable-length list of physics updates (custom-packed only).
    PhysList(Vec<PhysState>),
}

/// Wire width/kind of one primitive field in a structured entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    Bool,
    U16,
    U32,
    I32,
    F32,
    F64,
    FixedBytes(usize),
}

/// A fully-typed packet: id plus its domain arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub id: u16,
    pub args: Vec<Field>,
}

impl Packet {
    pub fn new(id: u16, args: Vec<Field>) -> Self {
        Self { id, args }
    }
}

type Transform = fn(&[Field]) -> Vec<Field>;
type CustomPack = fn(&[Field]) -> Vec<u8>;
type CustomUnpack = fn(&[u8]) -> NetworkResult<Vec<Field>>;

/// How one packet id's body is packed and unpacked.
pub enum PacketCodecEntry {
    Structured {
        fields: Vec<FieldKind>,
        preprocess: Option<Transform>,
        postprocess: Option<Transform>,
    },
    Custom {
        pack: CustomPack,
        unpack: CustomUnpack,
    },
}

/// Registry of packet id to codec entry, shared symmetrically by
/// server and client.
#[derive(Default)]
pub struct PacketCodec {
    entries: HashMap<u16, PacketCodecEntry>,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry for `id`. Fails if `id` is already taken —
    /// registration is one-shot, matching the reference handler.
    pub fn register(&mut self, id: u16, entry: PacketCodecEntry) -> NetworkResult<()> {
        if self.entries.contains_key(&id) {
            return Err(NetworkError::CodecRegistrationCollision(id));
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    pub fn pack(&self, packet: &Packet) -> NetworkResult<Vec<u8>> {
        let entry = self
            .entries
            .get(&packet.id)
            .ok_or(NetworkError::UnknownPacketType(packet.id))?;

        let mut out = Vec::new();
        out.write_u16::<LittleEndian>(packet.id)?;

        match entry {
            PacketCodecEntry::Structured {
                fields,
                preprocess,
                ..
            } => {
                let prim = match preprocess {
                    Some(f) => f(&packet.args),
                    None => packet.args.clone(),
                };
                if prim.len() != fields.len() {
                    return Err(NetworkError::ShortPayload(packet.id));
                }
                for (field, kind) in prim.iter().zip(fields.iter()) {
                    write_field(&mut out, field, *kind)?;
                }
            }
            PacketCodecEntry::Custom { pack, .. } => {
                out.extend_from_slice(&pack(&packet.args));
            }
        }
        Ok(out)
    }

    pub fn unpack(&self, bytes: &[u8]) -> NetworkResult<Packet> {
        if bytes.len() < 2 {
            return Err(NetworkError::ShortPayload(0));
        }
        let mut cursor = Cursor::new(bytes);
        let id = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(0))?;
        let entry = self
            .entries
            .get(&id)
            .ok_or(NetworkError::UnknownPacketType(id))?;
        let body = &bytes[2..];

        let args = match entry {
            PacketCodecEntry::Structured {
                fields,
                postprocess,
                ..
            } => {
                let mut c = Cursor::new(body);
                let mut prim = Vec::with_capacity(fields.len());
                for kind in fields {
                    prim.push(read_field(&mut c, *kind, id)?);
                }
                match postprocess {
                    Some(f) => f(&prim),
                    None => prim,
                }
            }
            PacketCodecEntry::Custom { unpack, .. } => unpack(body)?,
        };
        Ok(Packet::new(id, args))
    }
}

fn write_field(out: &mut Vec<u8>, field: &Field, kind: FieldKind) -> NetworkResult<()> {
    match (field, kind) {
        (Field::U8(v), FieldKind::U8) => out.write_u8(*v)?,
        (Field::Bool(v), FieldKind::Bool) => out.write_u8(if *v { 1 } else { 0 })?,
        (Field::U16(v), FieldKind::U16) => out.write_u16::<LittleEndian>(*v)?,
        (Field::U32(v), FieldKind::U32) => out.write_u32::<LittleEndian>(*v)?,
        (Field::I32(v), FieldKind::I32) => out.write_i32::<LittleEndian>(*v)?,
        (Field::F32(v), FieldKind::F32) => out.write_f32::<LittleEndian>(*v)?,
        (Field::F64(v), FieldKind::F64) => out.write_f64::<LittleEndian>(*v)?,
        (Field::Bytes(v), FieldKind::FixedBytes(n)) => {
            if v.len() != n {
                return Err(NetworkError::ShortPayload(0));
            }
            out.extend_from_slice(v);
        }
        _ => return Err(NetworkError::ShortPayload(0)),
    }
    Ok(())
}

fn read_field(c: &mut Cursor<&[u8]>, kind: FieldKind, id: u16) -> NetworkResult<Field> {
    let short = || NetworkError::ShortPayload(id);
    Ok(match kind {
        FieldKind::U8 => Field::U8(c.read_u8().map_err(|_| short())?),
        FieldKind::Bool => Field::Bool(c.read_u8().map_err(|_| short())? != 0),
        FieldKind::U16 => Field::U16(c.read_u16::<LittleEndian>().map_err(|_| short())?),
        FieldKind::U32 => Field::U32(c.read_u32::<LittleEndian>().map_err(|_| short())?),
        FieldKind::I32 => Field::I32(c.read_i32::<LittleEndian>().map_err(|_| short())?),
        FieldKind::F32 => Field::F32(c.read_f32::<LittleEndian>().map_err(|_| short())?),
        FieldKind::F64 => Field::F64(c.read_f64::<LittleEndian>().map_err(|_| short())?),
        FieldKind::FixedBytes(n) => {
            let mut buf = vec![0u8; n];
            std::io::Read::read_exact(c, &mut buf).map_err(|_| short())?;
            Field::Bytes(buf)
        }
    })
}

/// Pads a UTF-8 string to a fixed-length NUL-padded byte string.
fn pad_str(s: &str, len: usize) -> Vec<u8> {
    let mut b = s.as_bytes().to_vec();
    b.resize(len, 0);
    b.truncate(len);
    b
}

/// Trims trailing NULs and decodes as UTF-8 (lossy, matching the
/// reference's best-effort `rstrip('\x00')` behavior).
fn unpad_str(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    String::from_utf8_lossy(&b[..end]).into_owned()
}

fn entity_create_preprocess(args: &[Field]) -> Vec<Field> {
    let id = args[0].clone();
    let tag = match &args[1] {
        Field::Str(s) => Field::Bytes(pad_str(s, 16)),
        other => other.clone(),
    };
    vec![id, tag]
}

fn entity_create_postprocess(args: &[Field]) -> Vec<Field> {
    let id = args[0].clone();
    let tag = match &args[1] {
        Field::Bytes(b) => Field::Str(unpad_str(b)),
        other => other.clone(),
    };
    vec![id, tag]
}

fn pack_entity_update_phys_multi(args: &[Field]) -> Vec<u8> {
    let ref_time = match &args[0] {
        Field::F64(t) => *t,
        _ => 0.0,
    };
    let updates = match &args[1] {
        Field::PhysList(v) => v.clone(),
        _ => Vec::new(),
    };
    let mut out = Vec::new();
    out.write_f64::<LittleEndian>(ref_time).unwrap();
    out.write_u16::<LittleEndian>(updates.len() as u16).unwrap();
    for u in &updates {
        out.write_u16::<LittleEndian>(u.id).unwrap();
        out.write_f64::<LittleEndian>(u.x).unwrap();
        out.write_f64::<LittleEndian>(u.y).unwrap();
        out.write_f32::<LittleEndian>(u.vx).unwrap();
        out.write_f32::<LittleEndian>(u.vy).unwrap();
        out.write_f32::<LittleEndian>(u.rot).unwrap();
        out.write_f32::<LittleEndian>(u.vrot).unwrap();
    }
    out
}

fn unpack_entity_update_phys_multi(body: &[u8]) -> NetworkResult<Vec<Field>> {
    const ID: u16 = 305;
    let mut c = Cursor::new(body);
    let ref_time = c
        .read_f64::<LittleEndian>()
        .map_err(|_| NetworkError::ShortPayload(ID))?;
    let count = c
        .read_u16::<LittleEndian>()
        .map_err(|_| NetworkError::ShortPayload(ID))?;
    let mut updates = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = c
            .read_u16::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(ID))?;
        let x = c
            .read_f64::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(ID))?;
        let y = c
            .read_f64::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(ID))?;
        let vx = c
            .read_f32::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(ID))?;
        let vy = c
            .read_f32::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(ID))?;
        let rot = c
            .read_f32::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(ID))?;
        let vrot = c
            .read_f32::<LittleEndian>()
            .map_err(|_| NetworkError::ShortPayload(ID))?;
        updates.push(PhysState {
            id,
            x,
            y,
            vx,
            vy,
            rot,
            vrot,
        });
    }
    Ok(vec![Field::F64(ref_time), Field::PhysList(updates)])
}

/// Packet type ids, exactly the default registry table.
pub mod ids {
    pub const INIT_TCP: u16 = 1;
    pub const INIT_UDP: u16 = 2;
    pub const INIT_FINAL: u16 = 3;
    pub const RTT_PING: u16 = 4;
    pub const ENTITY_CREATE: u16 = 301;
    pub const ENTITY_DESTROY: u16 = 302;
    pub const ENTITY_UPDATE_ATTR: u16 = 303;
    pub const ENTITY_UPDATE_PHYS: u16 = 304;
    pub const ENTITY_UPDATE_PHYS_MULTI: u16 = 305;
    pub const CLIENT_SET_LOCAL_ENTITY: u16 = 401;
}

/// Builds the default, byte-exact packet registry (ids 1-4, 301-305,
/// 401). Both `HybridServer` and `HybridClient` must use an identical
/// registry for wire compatibility.
pub fn default_registry() -> PacketCodec {
    let mut codec = PacketCodec::new();

    codec
        .register(
            ids::INIT_TCP,
            PacketCodecEntry::Structured {
                fields: vec![FieldKind::U16],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::INIT_UDP,
            PacketCodecEntry::Structured {
                fields: vec![FieldKind::U16],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::INIT_FINAL,
            PacketCodecEntry::Structured {
                fields: vec![],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::RTT_PING,
            PacketCodecEntry::Structured {
                fields: vec![FieldKind::Bool],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::ENTITY_CREATE,
            PacketCodecEntry::Structured {
                fields: vec![FieldKind::U16, FieldKind::FixedBytes(16)],
                preprocess: Some(entity_create_preprocess),
                postprocess: Some(entity_create_postprocess),
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::ENTITY_DESTROY,
            PacketCodecEntry::Structured {
                fields: vec![FieldKind::U16],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::ENTITY_UPDATE_ATTR,
            PacketCodecEntry::Structured {
                fields: vec![FieldKind::U16, FieldKind::U32, FieldKind::U32],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::ENTITY_UPDATE_PHYS,
            PacketCodecEntry::Structured {
                fields: vec![
                    FieldKind::U16,
                    FieldKind::F64,
                    FieldKind::F64,
                    FieldKind::F32,
                    FieldKind::F32,
                    FieldKind::F32,
                    FieldKind::F32,
                ],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::ENTITY_UPDATE_PHYS_MULTI,
            PacketCodecEntry::Custom {
                pack: pack_entity_update_phys_multi,
                unpack: unpack_entity_update_phys_multi,
            },
        )
        .expect("default registry collision");
    codec
        .register(
            ids::CLIENT_SET_LOCAL_ENTITY,
            PacketCodecEntry::Structured {
                fields: vec![FieldKind::U16, FieldKind::Bool],
                preprocess: None,
                postprocess: None,
            },
        )
        .expect("default registry collision");

    codec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_init_tcp() {
        let codec = default_registry();
        let p = Packet::new(ids::INIT_TCP, vec![Field::U16(42)]);
        let bytes = codec.pack(&p).unwrap();
        let back = codec.unpack(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn type_id_prefix_is_little_endian() {
        let codec = default_registry();
        let p = Packet::new(ids::ENTITY_DESTROY, vec![Field::U16(9)]);
        let bytes = codec.pack(&p).unwrap();
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), ids::ENTITY_DESTROY);
    }

    #[test]
    fn entity_create_type_tag_round_trip() {
        let codec = default_registry();
        let p = Packet::new(
            ids::ENTITY_CREATE,
            vec![Field::U16(42), Field::Str("tank".to_string())],
        );
        let bytes = codec.pack(&p).unwrap();
        assert_eq!(bytes.len(), 2 + 2 + 16);
        assert_eq!(&bytes[4..8], b"tank");
        assert!(bytes[8..20].iter().all(|&b| b == 0));
        let back = codec.unpack(&bytes).unwrap();
        assert_eq!(back.args[0], Field::U16(42));
        assert_eq!(back.args[1], Field::Str("tank".to_string()));
    }

    #[test]
    fn unknown_packet_type_is_rejected() {
        let codec = default_registry();
        let bytes = [0xFFu8, 0xFF];
        assert!(matches!(
            codec.unpack(&bytes),
            Err(NetworkError::UnknownPacketType(0xFFFF))
        ));
    }

    #[test]
    fn short_payload_is_rejected() {
        let codec = default_registry();
        // INIT_TCP needs a u16 body; give it one byte.
        let mut bytes = Vec::new();
        bytes.write_u16::<LittleEndian>(ids::INIT_TCP).unwrap();
        bytes.push(0);
        assert!(codec.unpack(&bytes).is_err());
    }

    #[test]
    fn registering_same_id_twice_fails() {
        let mut codec = PacketCodec::new();
        let entry = || PacketCodecEntry::Structured {
            fields: vec![FieldKind::U8],
            preprocess: None,
            postprocess: None,
        };
        codec.register(1, entry()).unwrap();
        assert!(matches!(
            codec.register(1, entry()),
            Err(NetworkError::CodecRegistrationCollision(1))
        ));
    }

    #[test]
    fn entity_update_phys_multi_framing() {
        let codec = default_registry();
        let updates = vec![
            PhysState { id: 1, x: 1.0, y: 2.0, vx: 0.1, vy: 0.2, rot: 0.0, vrot: 0.0 },
            PhysState { id: 2, x: 3.0, y: 4.0, vx: 0.3, vy: 0.4, rot: 0.1, vrot: 0.0 },
            PhysState { id: 3, x: 5.0, y: 6.0, vx: 0.5, vy: 0.6, rot: 0.2, vrot: 0.0 },
        ];
        let p = Packet::new(
            ids::ENTITY_UPDATE_PHYS_MULTI,
            vec![Field::F64(1.5), Field::PhysList(updates.clone())],
        );
        let bytes = codec.pack(&p).unwrap();
        // 2 (outer id) + [8 (ref_time) + 2 (count) + 3 * (2+8+8+4+4+4+4)] body
        // == 2 + 8 + 2 + 3*34 == 114; body alone is 112 (matches the
        // 8 + 2 + 3*(2+16+16) grouping).
        assert_eq!(bytes.len(), 2 + 8 + 2 + 3 * 34);
        let back = codec.unpack(&bytes).unwrap();
        match &back.args[1] {
            Field::PhysList(v) => assert_eq!(v, &updates),
            _ => panic!("expected PhysList"),
        }
    }
}
