//! The 4-byte box type tag.

use std::fmt;

/// A 4-byte ASCII box type, e.g. `ftyp`, `moov`, `uuid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

macro_rules! box_types {
    ($($name:ident => $bytes:expr),* $(,)?) => {
        impl BoxType {
            $(pub const $name: BoxType = BoxType(*$bytes);)*
        }
    };
}

box_types! {
    FTYP => b"ftyp",
    MOOV => b"moov",
    MVHD => b"mvhd",
    TRAK => b"trak",
    TKHD => b"tkhd",
    EDTS => b"edts",
    MDIA => b"mdia",
    MDHD => b"mdhd",
    HDLR => b"hdlr",
    MINF => b"minf",
    VMHD => b"vmhd",
    SMHD => b"smhd",
    NMHD => b"nmhd",
    DINF => b"dinf",
    DREF => b"dref",
    URL  => b"url ",
    URN  => b"urn ",
    STBL => b"stbl",
    STSD => b"stsd",
    AVC1 => b"avc1",
    AVC3 => b"avc3",
    HEV1 => b"hev1",
    HVC1 => b"hvc1",
    MP4A => b"mp4a",
    TX3G => b"tx3g",
    AVCC => b"avcC",
    HVCC => b"hvcC",
    ESDS => b"esds",
    PASP => b"pasp",
    FIEL => b"fiel",
    STTS => b"stts",
    CTTS => b"ctts",
    STSC => b"stsc",
    STSZ => b"stsz",
    STCO => b"stco",
    CO64 => b"co64",
    STSS => b"stss",
    MVEX => b"mvex",
    TREX => b"trex",
    MOOF => b"moof",
    MFHD => b"mfhd",
    TRAF => b"traf",
    TFHD => b"tfhd",
    TFDT => b"tfdt",
    TRUN => b"trun",
    MDAT => b"mdat",
    FREE => b"free",
    SKIP => b"skip",
    UDTA => b"udta",
    UUID => b"uuid",
}

/// Container types carry children instead of a leaf body; everything else
/// not in this list is a leaf (typed or raw).
pub const CONTAINER_TYPES: &[BoxType] = &[
    BoxType::MOOV,
    BoxType::TRAK,
    BoxType::EDTS,
    BoxType::MDIA,
    BoxType::MINF,
    BoxType::DINF,
    BoxType::STBL,
    BoxType::MVEX,
    BoxType::MOOF,
    BoxType::TRAF,
    BoxType::UDTA,
];

impl BoxType {
    pub fn is_container(&self) -> bool {
        CONTAINER_TYPES.contains(self)
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&[u8; 4]> for BoxType {
    fn from(bytes: &[u8; 4]) -> Self {
        BoxType(*bytes)
    }
}
