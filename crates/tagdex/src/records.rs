//! The three persisted record shapes and their byte-exact encodings.
//!
//! The encodings are an interchange format shared with the read-side query
//! layer and must not change: a `DefList` is `data#families` where `data` is
//! comma-separated `<id><kind-char><line><family-char>` entries, a `RefList`
//! is newline-terminated `<id>:<comma-lines>:<family-char>` records, and a
//! `PathList` is newline-terminated `<id> <path>` records.

use bstr::BString;

use crate::family::Family;
use crate::{BlobId, LineNumber};

/// Fine-grained symbol classification within a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefKind {
    Alias,
    Config,
    Constant,
    Define,
    Enum,
    Enumerator,
    ExternVar,
    Function,
    Generator,
    Label,
    Macro,
    Member,
    Prototype,
    Struct,
    Typedef,
    Union,
    Variable,
}

impl DefKind {
    /// Decodes the single-character kind emitted by the `parse-defs` helper
    /// and stored on disk. Unknown characters yield `None` and are skipped
    /// by callers, for forward compatibility with newer helpers.
    pub fn from_char(c: u8) -> Option<DefKind> {
        match c {
            b'a' => Some(DefKind::Alias),
            b'c' => Some(DefKind::Config),
            b'C' => Some(DefKind::Constant),
            b'd' => Some(DefKind::Define),
            b'e' => Some(DefKind::Enum),
            b'E' => Some(DefKind::Enumerator),
            b'x' => Some(DefKind::ExternVar),
            b'f' => Some(DefKind::Function),
            b'G' => Some(DefKind::Generator),
            b'l' => Some(DefKind::Label),
            b'M' => Some(DefKind::Macro),
            b'm' => Some(DefKind::Member),
            b'p' => Some(DefKind::Prototype),
            b's' => Some(DefKind::Struct),
            b't' => Some(DefKind::Typedef),
            b'u' => Some(DefKind::Union),
            b'v' => Some(DefKind::Variable),
            _ => None,
        }
    }

    pub fn as_char(&self) -> u8 {
        match self {
            DefKind::Alias => b'a',
            DefKind::Config => b'c',
            DefKind::Constant => b'C',
            DefKind::Define => b'd',
            DefKind::Enum => b'e',
            DefKind::Enumerator => b'E',
            DefKind::ExternVar => b'x',
            DefKind::Function => b'f',
            DefKind::Generator => b'G',
            DefKind::Label => b'l',
            DefKind::Macro => b'M',
            DefKind::Member => b'm',
            DefKind::Prototype => b'p',
            DefKind::Struct => b's',
            DefKind::Typedef => b't',
            DefKind::Union => b'u',
            DefKind::Variable => b'v',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DefKind::Alias => "alias",
            DefKind::Config => "config",
            DefKind::Constant => "constant",
            DefKind::Define => "define",
            DefKind::Enum => "enum",
            DefKind::Enumerator => "enumerator",
            DefKind::ExternVar => "externvar",
            DefKind::Function => "function",
            DefKind::Generator => "generator",
            DefKind::Label => "label",
            DefKind::Macro => "macro",
            DefKind::Member => "member",
            DefKind::Prototype => "prototype",
            DefKind::Struct => "struct",
            DefKind::Typedef => "typedef",
            DefKind::Union => "union",
            DefKind::Variable => "variable",
        }
    }
}

/// One definition site of an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefEntry {
    pub id: BlobId,
    pub kind: DefKind,
    pub line: LineNumber,
    pub family: Family,
}

/// The definition sites of one identifier, plus the set of families in which
/// it was defined, kept denormalized for faster read-side tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DefList {
    data: Vec<u8>,
    families: Vec<u8>,
}

impl DefList {
    pub fn from_bytes(bytes: &[u8]) -> Option<DefList> {
        let sep = bytes.iter().position(|&b| b == b'#')?;
        Some(DefList { data: bytes[..sep].to_vec(), families: bytes[sep + 1..].to_vec() })
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 1 + self.families.len());
        out.extend_from_slice(&self.data);
        out.push(b'#');
        out.extend_from_slice(&self.families);
        out
    }

    pub fn append(&mut self, id: BlobId, kind: DefKind, line: LineNumber, family: Family) {
        if !self.data.is_empty() {
            self.data.push(b',');
        }
        push_int(&mut self.data, id);
        self.data.push(kind.as_char());
        push_int(&mut self.data, line);
        self.data.push(family.as_char());
        self.add_family(family);
    }

    fn add_family(&mut self, family: Family) {
        let c = family.as_char();
        if !self.families.split(|&b| b == b',').any(|f| f == [c]) {
            if !self.families.is_empty() {
                self.families.push(b',');
            }
            self.families.push(c);
        }
    }

    /// The distinct families of this identifier's definitions, in first-seen
    /// order.
    pub fn families(&self) -> Vec<Family> {
        self.families
            .split(|&b| b == b',')
            .filter_map(|f| match f {
                [c] => Family::from_char(*c),
                _ => None,
            })
            .collect()
    }

    /// Decoded entries, sorted ascending by blob id. Entries written by a
    /// newer format revision that do not decode are skipped.
    pub fn entries(&self) -> Vec<DefEntry> {
        let mut entries: Vec<DefEntry> = self
            .data
            .split(|&b| b == b',')
            .filter(|chunk| !chunk.is_empty())
            .filter_map(parse_def_entry)
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn parse_def_entry(chunk: &[u8]) -> Option<DefEntry> {
    let (id, rest) = take_int(chunk)?;
    let (&kind, rest) = rest.split_first()?;
    let (line, rest) = take_int(rest)?;
    let (&family, rest) = rest.split_first()?;
    if !rest.is_empty() {
        return None;
    }
    Some(DefEntry {
        id,
        kind: DefKind::from_char(kind)?,
        line,
        family: Family::from_char(family)?,
    })
}

/// One blob's occurrences of an identifier: the lines where it appears,
/// already coalesced into a comma-separated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    pub id: BlobId,
    pub lines: BString,
    pub family: Family,
}

/// Maps one identifier to the blobs and lines referencing it. Also used for
/// documentation-comment anchors and compatible-string occurrences.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefList {
    data: Vec<u8>,
}

impl RefList {
    pub fn from_bytes(bytes: &[u8]) -> RefList {
        RefList { data: bytes.to_vec() }
    }

    pub fn pack(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn append(&mut self, id: BlobId, lines: &[u8], family: Family) {
        push_int(&mut self.data, id);
        self.data.push(b':');
        self.data.extend_from_slice(lines);
        self.data.push(b':');
        self.data.push(family.as_char());
        self.data.push(b'\n');
    }

    /// Decoded entries, sorted ascending by blob id.
    pub fn entries(&self) -> Vec<RefEntry> {
        let mut entries: Vec<RefEntry> = self
            .data
            .split(|&b| b == b'\n')
            .filter(|record| !record.is_empty())
            .filter_map(parse_ref_entry)
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn parse_ref_entry(record: &[u8]) -> Option<RefEntry> {
    let mut fields = record.splitn(3, |&b| b == b':');
    let id = parse_int(fields.next()?)?;
    let lines = fields.next()?;
    let family = match fields.next()? {
        [c] => Family::from_char(*c)?,
        _ => return None,
    };
    Some(RefEntry { id, lines: BString::from(lines), family })
}

/// The ordered (blob id, path) pairs of one tag. The writer inserts entries
/// sorted ascending by id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PathList {
    data: Vec<u8>,
}

impl PathList {
    pub fn from_bytes(bytes: &[u8]) -> PathList {
        PathList { data: bytes.to_vec() }
    }

    pub fn pack(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn append(&mut self, id: BlobId, path: &[u8]) {
        push_int(&mut self.data, id);
        self.data.push(b' ');
        self.data.extend_from_slice(path);
        self.data.push(b'\n');
    }

    pub fn entries(&self) -> Vec<(BlobId, BString)> {
        self.data
            .split(|&b| b == b'\n')
            .filter(|record| !record.is_empty())
            .filter_map(|record| {
                let space = record.iter().position(|&b| b == b' ')?;
                let id = parse_int(&record[..space])?;
                Some((id, BString::from(&record[space + 1..])))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Appends `value` in decimal ASCII.
pub(crate) fn push_int(out: &mut Vec<u8>, mut value: u64) {
    let mut buffer = [0u8; 20];
    let mut at = buffer.len();
    loop {
        at -= 1;
        buffer[at] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    out.extend_from_slice(&buffer[at..]);
}

/// Parses a non-empty all-digits decimal integer; anything else is `None`.
pub(crate) fn parse_int(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    Some(value)
}

/// Splits a leading decimal integer off `bytes`.
fn take_int(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    Some((parse_int(&bytes[..digits])?, &bytes[digits..]))
}
