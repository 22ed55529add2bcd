//! The box arena: a generic, bidirectional parse/emit engine over an
//! ISO-BMFF box tree.
//!
//! Boxes are stored flat in a `Vec<BoxNode>` keyed by stable `BoxId` indices
//! rather than as parent-linked heap objects, so a fragment rewrite or a
//! partial re-parse never has to chase or invalidate pointers. Container
//! boxes hold their children as a `Vec<BoxId>`; everything else is a typed
//! leaf or, for box types this codec doesn't interpret, `BoxBody::Raw`.

use std::io::{Read, Seek, SeekFrom};

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

use super::body::*;
use super::boxtype::BoxType;

pub type BoxId = usize;

#[derive(Debug, Clone)]
pub enum BoxBody {
    Container(Vec<BoxId>),
    Ftyp(FtypBox),
    Mvhd(MvhdBox),
    Tkhd(TkhdBox),
    Mdhd(MdhdBox),
    Hdlr(HdlrBox),
    Vmhd(VmhdBox),
    Smhd(SmhdBox),
    Nmhd,
    Dref(DrefBox),
    Stsd(StsdBox),
    Stts(SttsBox),
    Ctts(CttsBox),
    Stsc(StscBox),
    Stco(Vec<u32>),
    Co64(Vec<u64>),
    Stsz(StszBox),
    Stss(Vec<u32>),
    Trex(TrexBox),
    Mfhd(MfhdBox),
    Tfhd(TfhdBox),
    Tfdt(TfdtBox),
    Trun(TrunBox),
    Mdat(MdatRef),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct BoxNode {
    pub box_type: BoxType,
    /// Absolute file offset of this box's header. Unused (0) for nodes
    /// synthesized in memory rather than parsed off disk.
    pub file_offset: u64,
    pub header_len: u8,
    pub extended_type: Option<[u8; 16]>,
    pub body: BoxBody,
}

impl BoxNode {
    pub fn children(&self) -> &[BoxId] {
        match &self.body {
            BoxBody::Container(c) => c,
            _ => &[],
        }
    }
}

/// The parsed (or in-progress) box tree. `roots` holds the top-level box ids
/// in file order (`ftyp`, `moov`, `moof`/`mdat` pairs, ...).
#[derive(Debug, Default, Clone)]
pub struct BoxArena {
    pub nodes: Vec<BoxNode>,
    pub roots: Vec<BoxId>,
}

impl BoxArena {
    pub fn get(&self, id: BoxId) -> &BoxNode {
        &self.nodes[id]
    }

    pub fn find_child(&self, id: BoxId, ty: BoxType) -> Option<BoxId> {
        self.nodes[id]
            .children()
            .iter()
            .copied()
            .find(|&c| self.nodes[c].box_type == ty)
    }

    pub fn find_children(&self, id: BoxId, ty: BoxType) -> Vec<BoxId> {
        self.nodes[id]
            .children()
            .iter()
            .copied()
            .filter(|&c| self.nodes[c].box_type == ty)
            .collect()
    }

    /// Depth-first walk from `path` of box types, e.g. `&[MOOV, TRAK]` finds
    /// every `trak` under the single `moov`.
    pub fn find_path(&self, start: BoxId, path: &[BoxType]) -> Option<BoxId> {
        let mut cur = start;
        for ty in path {
            cur = self.find_child(cur, *ty)?;
        }
        Some(cur)
    }

    fn push(&mut self, node: BoxNode) -> BoxId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Parses an entire file into a tree, given a seekable reader positioned
    /// at 0 and the stream's total length.
    pub fn parse<R: Read + Seek>(reader: &mut R, len: u64) -> Result<Self> {
        let mut arena = BoxArena::default();
        reader.seek(SeekFrom::Start(0))?;
        arena.roots = parse_siblings(reader, len, &mut arena)?;
        Ok(arena)
    }

    /// Total encoded size of the subtree rooted at `id`, in bytes.
    pub fn full_size(&self, id: BoxId) -> u64 {
        let node = &self.nodes[id];
        let header = node.header_len as u64;
        header
            + match &node.body {
                BoxBody::Container(children) => {
                    children.iter().map(|&c| self.full_size(c)).sum()
                }
                BoxBody::Mdat(m) => m.payload_size,
                BoxBody::Raw(b) => b.len() as u64,
                other => encode_leaf(other).len() as u64,
            }
    }

    /// Serializes the subtree rooted at `id`. `mdat` payload bytes are
    /// supplied by the caller via `mdat_source` (reads the original file
    /// lazily) since the arena never holds them in memory.
    pub fn emit(&self, id: BoxId, mdat_source: &mut dyn FnMut(u64, u64) -> Result<Vec<u8>>) -> Result<BytesMut> {
        let node = &self.nodes[id];
        let mut body_buf = BytesMut::new();
        match &node.body {
            BoxBody::Container(children) => {
                for &c in children {
                    body_buf.put_slice(&self.emit(c, mdat_source)?);
                }
            }
            BoxBody::Mdat(m) => {
                body_buf.put_slice(&mdat_source(m.payload_offset, m.payload_size)?);
            }
            BoxBody::Raw(b) => body_buf.put_slice(b),
            other => body_buf.put_slice(&encode_leaf(other)),
        }

        let total = 8u64 + body_buf.len() as u64 + if node.extended_type.is_some() { 16 } else { 0 };
        let mut out = BytesMut::with_capacity(total as usize);
        if total > u32::MAX as u64 {
            out.put_u32(1);
            out.put_slice(&node.box_type.0);
            out.put_u64(total);
        } else {
            out.put_u32(total as u32);
            out.put_slice(&node.box_type.0);
        }
        if let Some(ut) = node.extended_type {
            out.put_slice(&ut);
        }
        out.put_slice(&body_buf);
        Ok(out)
    }
}

fn parse_siblings<R: Read + Seek>(
    reader: &mut R,
    end: u64,
    arena: &mut BoxArena,
) -> Result<Vec<BoxId>> {
    let mut ids = Vec::new();
    loop {
        let pos = reader.stream_position()?;
        if pos >= end {
            break;
        }
        ids.push(parse_one(reader, end, arena)?);
    }
    Ok(ids)
}

fn parse_one<R: Read + Seek>(reader: &mut R, limit: u64, arena: &mut BoxArena) -> Result<BoxId> {
    let start = reader.stream_position()?;
    let mut hdr = [0u8; 8];
    reader.read_exact(&mut hdr)?;
    let mut size = u32::from_be_bytes(hdr[0..4].try_into().unwrap()) as u64;
    let box_type = BoxType(hdr[4..8].try_into().unwrap());
    let mut header_len = 8u64;

    if size == 1 {
        let mut ext = [0u8; 8];
        reader.read_exact(&mut ext)?;
        size = u64::from_be_bytes(ext);
        header_len += 8;
    }

    let mut extended_type = None;
    if box_type == BoxType::UUID {
        let mut ut = [0u8; 16];
        reader.read_exact(&mut ut)?;
        extended_type = Some(ut);
        header_len += 16;
    }

    let body_len = if size == 0 {
        limit.checked_sub(start + header_len).ok_or_else(|| {
            Error::malformed(format!("box {box_type} at {start} extends past its container"))
        })?
    } else {
        size.checked_sub(header_len).ok_or_else(|| {
            Error::malformed(format!("box {box_type} size {size} smaller than its header"))
        })?
    };

    let body_start = start + header_len;
    let body_end = body_start + body_len;
    if body_end > limit {
        return Err(Error::malformed(format!(
            "box {box_type} at {start} (size {size}) overruns its container (limit {limit})"
        )));
    }

    let body = if box_type == BoxType::MDAT {
        reader.seek(SeekFrom::Start(body_end))?;
        BoxBody::Mdat(MdatRef {
            payload_offset: body_start,
            payload_size: body_len,
        })
    } else if box_type.is_container() {
        let children = parse_siblings(reader, body_end, arena)?;
        BoxBody::Container(children)
    } else {
        let mut buf = vec![0u8; body_len as usize];
        reader.read_exact(&mut buf)?;
        decode_leaf(box_type, &buf)?
    };

    Ok(arena.push(BoxNode {
        box_type,
        file_offset: start,
        header_len: header_len as u8,
        extended_type,
        body,
    }))
}

fn decode_leaf(box_type: BoxType, data: &[u8]) -> Result<BoxBody> {
    let body = match box_type {
        BoxType::FTYP => BoxBody::Ftyp(FtypBox::decode(data)?),
        BoxType::MVHD => BoxBody::Mvhd(MvhdBox::decode(data)?),
        BoxType::TKHD => BoxBody::Tkhd(TkhdBox::decode(data)?),
        BoxType::MDHD => BoxBody::Mdhd(MdhdBox::decode(data)?),
        BoxType::HDLR => BoxBody::Hdlr(HdlrBox::decode(data)?),
        BoxType::VMHD => BoxBody::Vmhd(VmhdBox::decode(data)?),
        BoxType::SMHD => BoxBody::Smhd(SmhdBox::decode(data)?),
        BoxType::NMHD => BoxBody::Nmhd,
        BoxType::DREF => BoxBody::Dref(DrefBox::decode(data)?),
        BoxType::STSD => BoxBody::Stsd(StsdBox::decode(data)?),
        BoxType::STTS => BoxBody::Stts(SttsBox::decode(data)?),
        BoxType::CTTS => BoxBody::Ctts(CttsBox::decode(data)?),
        BoxType::STSC => BoxBody::Stsc(StscBox::decode(data)?),
        BoxType::STCO => BoxBody::Stco(decode_u32_table(data)?),
        BoxType::CO64 => BoxBody::Co64(decode_u64_table(data)?),
        BoxType::STSZ => BoxBody::Stsz(StszBox::decode(data)?),
        BoxType::STSS => BoxBody::Stss(decode_u32_table(data)?),
        BoxType::TREX => BoxBody::Trex(TrexBox::decode(data)?),
        BoxType::MFHD => BoxBody::Mfhd(MfhdBox::decode(data)?),
        BoxType::TFHD => BoxBody::Tfhd(TfhdBox::decode(data)?),
        BoxType::TFDT => BoxBody::Tfdt(TfdtBox::decode(data)?),
        BoxType::TRUN => BoxBody::Trun(TrunBox::decode(data)?),
        _ => BoxBody::Raw(data.to_vec()),
    };
    Ok(body)
}

fn encode_leaf(body: &BoxBody) -> BytesMut {
    match body {
        BoxBody::Ftyp(b) => b.encode(),
        BoxBody::Mvhd(b) => b.encode(),
        BoxBody::Tkhd(b) => b.encode(),
        BoxBody::Mdhd(b) => b.encode(),
        BoxBody::Hdlr(b) => b.encode(),
        BoxBody::Vmhd(b) => b.encode(),
        BoxBody::Smhd(b) => b.encode(),
        BoxBody::Nmhd => {
            let mut buf = BytesMut::new();
            write_full_header(&mut buf, 0, 0);
            buf
        }
        BoxBody::Dref(b) => b.encode(),
        BoxBody::Stsd(b) => b.encode(),
        BoxBody::Stts(b) => b.encode(),
        BoxBody::Ctts(b) => b.encode(),
        BoxBody::Stsc(b) => b.encode(),
        BoxBody::Stco(v) => encode_u32_table(v),
        BoxBody::Co64(v) => encode_u64_table(v),
        BoxBody::Stsz(b) => b.encode(),
        BoxBody::Stss(v) => encode_u32_table(v),
        BoxBody::Trex(b) => b.encode(),
        BoxBody::Mfhd(b) => b.encode(),
        BoxBody::Tfhd(b) => b.encode(),
        BoxBody::Tfdt(b) => b.encode(),
        BoxBody::Trun(b) => b.encode(),
        BoxBody::Container(_) | BoxBody::Mdat(_) | BoxBody::Raw(_) => BytesMut::new(),
    }
}

fn decode_u32_table(data: &[u8]) -> Result<Vec<u32>> {
    let (_v, _f, mut pos) = read_full_header(data)?;
    let count = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap());
    pos += 4;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()));
        pos += 4;
    }
    Ok(out)
}

fn encode_u32_table(values: &[u32]) -> BytesMut {
    let mut buf = BytesMut::new();
    write_full_header(&mut buf, 0, 0);
    buf.put_u32(values.len() as u32);
    for v in values {
        buf.put_u32(*v);
    }
    buf
}

fn decode_u64_table(data: &[u8]) -> Result<Vec<u64>> {
    let (_v, _f, mut pos) = read_full_header(data)?;
    let count = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap());
    pos += 4;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(u64::from_be_bytes(data[pos..pos + 8].try_into().unwrap()));
        pos += 8;
    }
    Ok(out)
}

fn encode_u64_table(values: &[u64]) -> BytesMut {
    let mut buf = BytesMut::new();
    write_full_header(&mut buf, 0, 0);
    buf.put_u32(values.len() as u32);
    for v in values {
        buf.put_u64(*v);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_ftyp() -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32(20);
        buf.put_slice(b"ftyp");
        buf.put_slice(b"isom");
        buf.put_u32(512);
        buf.put_slice(b"iso6");
        buf.to_vec()
    }

    #[test]
    fn parses_simple_ftyp() {
        let data = make_ftyp();
        let mut cur = Cursor::new(data.clone());
        let arena = BoxArena::parse(&mut cur, data.len() as u64).unwrap();
        assert_eq!(arena.roots.len(), 1);
        let node = arena.get(arena.roots[0]);
        assert_eq!(node.box_type, BoxType::FTYP);
        match &node.body {
            BoxBody::Ftyp(f) => {
                assert_eq!(&f.major_brand, b"isom");
                assert_eq!(f.minor_version, 512);
                assert_eq!(f.compatible_brands, vec![*b"iso6"]);
            }
            _ => panic!("wrong body"),
        }
    }

    #[test]
    fn round_trips_ftyp_bytes() {
        let data = make_ftyp();
        let mut cur = Cursor::new(data.clone());
        let arena = BoxArena::parse(&mut cur, data.len() as u64).unwrap();
        let mut source = |_off: u64, _len: u64| -> Result<Vec<u8>> { Ok(Vec::new()) };
        let emitted = arena.emit(arena.roots[0], &mut source).unwrap();
        assert_eq!(emitted.to_vec(), data);
    }

    #[test]
    fn rejects_box_overrunning_its_container() {
        let mut buf = BytesMut::new();
        buf.put_u32(100); // claims 100 bytes but stream only has 8
        buf.put_slice(b"free");
        let data = buf.to_vec();
        let mut cur = Cursor::new(data.clone());
        let err = BoxArena::parse(&mut cur, data.len() as u64);
        assert!(err.is_err());
    }

    #[test]
    fn extended_size_box_parses() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_slice(b"free");
        buf.put_u64(16);
        buf.put_slice(b"\0\0\0\0");
        let data = buf.to_vec();
        let mut cur = Cursor::new(data.clone());
        let arena = BoxArena::parse(&mut cur, data.len() as u64).unwrap();
        let node = arena.get(arena.roots[0]);
        assert_eq!(node.header_len, 16);
        assert!(matches!(node.body, BoxBody::Raw(_)));
    }
}
