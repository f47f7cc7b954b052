//! BAM header and reference dictionary.
//!
//! ```text
//! BAM header (inflated, little-endian):
//! - magic (char[4]): "BAM\1"
//! - l_text (int32), text (char[l_text])
//! - n_ref (int32)
//! - per reference: l_name (int32), name (char[l_name], NUL-terminated), l_ref (int32)
//! ```

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io;

pub const BAM_MAGIC: u32 = 0x014d_4142;

/// Bidirectional mapping between reference names and dense ids.
///
/// Every name is also reachable with its `chr` prefix added or removed, so
/// `chr1` and `1` resolve to the same id.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDictionary {
    names: Vec<String>,
    lengths: Vec<u32>,
    exact: HashMap<String, usize>,
    aliases: HashMap<String, usize>,
}

fn strip_chr(name: &str) -> &str {
    match name.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") => &name[3..],
        _ => name,
    }
}

impl ReferenceDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, length: u32) -> usize {
        let name = name.into();
        let id = self.names.len();

        self.exact.insert(name.clone(), id);
        let alias = if strip_chr(&name).len() != name.len() {
            strip_chr(&name).to_string()
        } else {
            format!("chr{}", name)
        };
        self.aliases.insert(alias, id);
        self.aliases.insert(strip_chr(&name).to_ascii_lowercase(), id);

        self.names.push(name);
        self.lengths.push(length);
        id
    }

    /// Resolves a reference name to its id.
    ///
    /// Exact names win; otherwise the `chr` alias is tried, then a
    /// case-insensitive match on the name without its `chr` prefix.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.exact
            .get(name)
            .or_else(|| self.aliases.get(name))
            .or_else(|| self.aliases.get(&strip_chr(name).to_ascii_lowercase()))
            .copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn length(&self, id: usize) -> Option<u32> {
        self.lengths.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Parsed BAM header.
#[derive(Debug, Clone, Default)]
pub struct BamHeader {
    pub text: String,
    pub references: ReferenceDictionary,
}

impl BamHeader {
    /// Parses the header from the start of the inflated stream.
    ///
    /// Returns `Ok(None)` when `data` ends before the header does, so the
    /// caller can fetch more and try again.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        match Self::read(data) {
            Ok(header) => Ok(Some(header)),
            Err(HeaderError::Truncated) => Ok(None),
            Err(HeaderError::Invalid(e)) => Err(e),
        }
    }

    fn read(mut data: &[u8]) -> std::result::Result<Self, HeaderError> {
        let magic = data.read_u32::<LittleEndian>()?;
        if magic != BAM_MAGIC {
            return Err(HeaderError::Invalid(Error::BadMagic {
                what: "BAM",
                expected: BAM_MAGIC,
                found: magic,
            }));
        }

        let l_text = read_len(&mut data, "header text")?;
        let text = read_string(&mut data, l_text)?;

        let n_ref = read_len(&mut data, "reference count")?;
        let mut references = ReferenceDictionary::new();
        for _ in 0..n_ref {
            let l_name = read_len(&mut data, "reference name")?;
            let name = read_string(&mut data, l_name)?;
            let l_ref = data.read_u32::<LittleEndian>()?;
            references.push(name.trim_end_matches('\0'), l_ref);
        }

        Ok(Self { text, references })
    }
}

enum HeaderError {
    Truncated,
    Invalid(Error),
}

impl From<io::Error> for HeaderError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            HeaderError::Truncated
        } else {
            HeaderError::Invalid(Error::Io(err))
        }
    }
}

fn read_len(data: &mut &[u8], what: &str) -> std::result::Result<usize, HeaderError> {
    let len = data.read_i32::<LittleEndian>()?;
    usize::try_from(len).map_err(|_| {
        HeaderError::Invalid(Error::Format(format!("negative {} length {}", what, len)))
    })
}

fn read_string(data: &mut &[u8], len: usize) -> std::result::Result<String, HeaderError> {
    if len > data.len() {
        return Err(HeaderError::Truncated);
    }
    let (bytes, rest) = data.split_at(len);
    *data = rest;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
