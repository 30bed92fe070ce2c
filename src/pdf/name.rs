//! Interned PDF names
//!
//! Names repeat constantly in PDF files (`Type`, `Length`, `Filter`, ...).
//! The well-known ones live in a constant table that is turned into an
//! interning map once per process; `Name::new` hands out shared storage for
//! them and a fresh `Arc<str>` for everything else.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Well-known name spellings used throughout the crate.
pub mod names {
    pub const A: &str = "A";
    pub const ANNOTS: &str = "Annots";
    pub const B: &str = "B";
    pub const C: &str = "C";
    pub const CATALOG: &str = "Catalog";
    pub const CONTENTS: &str = "Contents";
    pub const COUNT: &str = "Count";
    pub const CROP_BOX: &str = "CropBox";
    pub const D: &str = "D";
    pub const DCT_DECODE: &str = "DCTDecode";
    pub const DECODE_PARMS: &str = "DecodeParms";
    pub const DEST: &str = "Dest";
    pub const DESTS: &str = "Dests";
    pub const EMBEDDED_FILE: &str = "EmbeddedFile";
    pub const EMBEDDED_FILES: &str = "EmbeddedFiles";
    pub const F: &str = "F";
    pub const FILTER: &str = "Filter";
    pub const FIRST: &str = "First";
    pub const FLATE_DECODE: &str = "FlateDecode";
    pub const ASCII85_DECODE: &str = "ASCII85Decode";
    pub const ASCII_HEX_DECODE: &str = "ASCIIHexDecode";
    pub const RUN_LENGTH_DECODE: &str = "RunLengthDecode";
    pub const LZW_DECODE: &str = "LZWDecode";
    pub const JPX_DECODE: &str = "JPXDecode";
    pub const JBIG2_DECODE: &str = "JBIG2Decode";
    pub const CRYPT: &str = "Crypt";
    pub const GOTO: &str = "GoTo";
    pub const ID: &str = "ID";
    pub const INDEX: &str = "Index";
    pub const INFO: &str = "Info";
    pub const KIDS: &str = "Kids";
    pub const LAST: &str = "Last";
    pub const LENGTH: &str = "Length";
    pub const LIMITS: &str = "Limits";
    pub const LINK: &str = "Link";
    pub const MEDIA_BOX: &str = "MediaBox";
    pub const N: &str = "N";
    pub const NAMES: &str = "Names";
    pub const NEXT: &str = "Next";
    pub const NUMS: &str = "Nums";
    pub const OBJ_STM: &str = "ObjStm";
    pub const OUTLINES: &str = "Outlines";
    pub const P: &str = "P";
    pub const PAGE: &str = "Page";
    pub const PAGE_LABELS: &str = "PageLabels";
    pub const PAGES: &str = "Pages";
    pub const PARENT: &str = "Parent";
    pub const PARENT_TREE: &str = "ParentTree";
    pub const PREDICTOR: &str = "Predictor";
    pub const PREV: &str = "Prev";
    pub const RESOURCES: &str = "Resources";
    pub const ROOT: &str = "Root";
    pub const ROTATE: &str = "Rotate";
    pub const S: &str = "S";
    pub const SIZE: &str = "Size";
    pub const STRUCT_PARENTS: &str = "StructParents";
    pub const SUBTYPE: &str = "Subtype";
    pub const TITLE: &str = "Title";
    pub const TYPE: &str = "Type";
    pub const W: &str = "W";
    pub const XREF: &str = "XRef";
    pub const COLUMNS: &str = "Columns";
    pub const COLORS: &str = "Colors";
    pub const BITS_PER_COMPONENT: &str = "BitsPerComponent";
    pub const EARLY_CHANGE: &str = "EarlyChange";
    pub const JAVA_SCRIPT: &str = "JavaScript";
    pub const XYZ: &str = "XYZ";
    pub const FIT: &str = "Fit";
}

/// Constant table of interned spellings. Position in the table is the
/// name's well-known id.
const WELL_KNOWN: &[&str] = &[
    names::A, names::ANNOTS, names::B, names::C, names::CATALOG, names::CONTENTS,
    names::COUNT, names::CROP_BOX, names::D, names::DCT_DECODE, names::DECODE_PARMS,
    names::DEST, names::DESTS, names::EMBEDDED_FILE, names::EMBEDDED_FILES, names::F,
    names::FILTER, names::FIRST, names::FLATE_DECODE, names::ASCII85_DECODE,
    names::ASCII_HEX_DECODE, names::RUN_LENGTH_DECODE, names::LZW_DECODE,
    names::JPX_DECODE, names::JBIG2_DECODE, names::CRYPT, names::GOTO, names::ID,
    names::INDEX, names::INFO, names::KIDS, names::LAST, names::LENGTH, names::LIMITS,
    names::LINK, names::MEDIA_BOX, names::N, names::NAMES, names::NEXT, names::NUMS,
    names::OBJ_STM, names::OUTLINES, names::P, names::PAGE, names::PAGE_LABELS,
    names::PAGES, names::PARENT, names::PARENT_TREE, names::PREDICTOR, names::PREV,
    names::RESOURCES, names::ROOT, names::ROTATE, names::S, names::SIZE,
    names::STRUCT_PARENTS, names::SUBTYPE, names::TITLE, names::TYPE, names::W,
    names::XREF, names::COLUMNS, names::COLORS, names::BITS_PER_COMPONENT,
    names::EARLY_CHANGE, names::JAVA_SCRIPT, names::XYZ, names::FIT,
];

static INTERNED: Lazy<HashMap<&'static str, (u16, Arc<str>)>> = Lazy::new(|| {
    WELL_KNOWN
        .iter()
        .enumerate()
        .map(|(id, s)| (*s, (id as u16, Arc::from(*s))))
        .collect()
});

/// PDF name object (the part after the slash)
#[derive(Clone, Eq)]
pub struct Name(Arc<str>);

impl Name {
    /// Create a new name, sharing storage with the interned table when possible
    pub fn new(s: &str) -> Self {
        match INTERNED.get(s) {
            Some((_, arc)) => Self(Arc::clone(arc)),
            None => Self(Arc::from(s)),
        }
    }

    /// Create a name from raw bytes; invalid UTF-8 is replaced lossily
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(&String::from_utf8_lossy(bytes))
    }

    /// Name text without the leading slash
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Index in the well-known table, if the name is interned
    pub fn well_known_id(&self) -> Option<u16> {
        INTERNED
            .get(self.as_str())
            .filter(|(_, arc)| Arc::ptr_eq(arc, &self.0))
            .map(|(id, _)| *id)
    }

    /// Whether this name shares storage with the interned table
    pub fn is_interned(&self) -> bool {
        self.well_known_id().is_some()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash(state);
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}
