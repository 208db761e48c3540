//! On-disk layout revisions of the expression shard files.
//!
//! Three incompatible layouts coexist on disk:
//!
//! - `Legacy`: a file header with an `(offset, size)` table; each record is a
//!   msgpack map whose cell indices are stored as float32.
//! - `Interleaved`: size-prefixed records, pairs stored as `(u32, f32)` runs.
//! - `Columnar`: size-prefixed records, all indices then all values.
//!
//! Everything layout-specific that the reader and codec need is answered by
//! [`FormatVersion::layout`]. Adding a revision means adding a variant and its
//! layout here; the pair primitives in `codec` stay untouched.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// Marker stored in the first four bytes of every shard file.
pub const SHARD_MAGIC: u32 = 42;

/// `magic + version + cells + entry count`.
pub const LEGACY_HEADER_SIZE: u64 = 16;

/// One `(offset, size)` pair of the legacy offset table.
pub const LEGACY_TABLE_ENTRY_SIZE: u64 = 8;

/// `magic + version + record count`.
pub const SIZE_PREFIXED_HEADER_SIZE: u64 = 12;

/// Width of the `blockSize` prefix in front of size-prefixed records.
pub const SIZE_PREFIX_LEN: u64 = 4;

/// Width of one index/value pair regardless of arrangement.
pub const PAIR_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    Legacy,
    Interleaved,
    Columnar,
}

/// How the extent of a record is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The catalog supplies the byte length; the offset points at the body.
    Explicit,
    /// The offset points at a little-endian u32 that counts the whole record,
    /// itself included.
    SizePrefixed { prefix_len: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairLayout {
    Interleaved,
    Columnar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLayout {
    /// Generic msgpack object with float32 `[index, value]` pairs.
    SelfDescribing,
    /// Length-prefixed names, a reserved u32, then raw pairs.
    Pairs(PairLayout),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLayout {
    /// Bytes before the offset table or the first record.
    pub header_size: u64,
    pub framing: Framing,
    pub payload: PayloadLayout,
}

impl FormatVersion {
    pub const ALL: [FormatVersion; 3] = [
        FormatVersion::Legacy,
        FormatVersion::Interleaved,
        FormatVersion::Columnar,
    ];

    pub const fn layout(self) -> FormatLayout {
        match self {
            FormatVersion::Legacy => FormatLayout {
                header_size: LEGACY_HEADER_SIZE,
                framing: Framing::Explicit,
                payload: PayloadLayout::SelfDescribing,
            },
            FormatVersion::Interleaved => FormatLayout {
                header_size: SIZE_PREFIXED_HEADER_SIZE,
                framing: Framing::SizePrefixed {
                    prefix_len: SIZE_PREFIX_LEN,
                },
                payload: PayloadLayout::Pairs(PairLayout::Interleaved),
            },
            FormatVersion::Columnar => FormatLayout {
                header_size: SIZE_PREFIXED_HEADER_SIZE,
                framing: Framing::SizePrefixed {
                    prefix_len: SIZE_PREFIX_LEN,
                },
                payload: PayloadLayout::Pairs(PairLayout::Columnar),
            },
        }
    }

    /// Version tag written in the shard file header.
    pub const fn tag(self) -> u32 {
        match self {
            FormatVersion::Legacy => 1,
            FormatVersion::Interleaved => 2,
            FormatVersion::Columnar => 3,
        }
    }

    pub fn from_tag(tag: u32) -> Result<Self, KiraError> {
        Self::ALL
            .into_iter()
            .find(|version| version.tag() == tag)
            .ok_or_else(|| KiraError::UnknownFormatVersion(tag.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FormatVersion::Legacy => "legacy",
            FormatVersion::Interleaved => "interleaved",
            FormatVersion::Columnar => "columnar",
        }
    }

    pub fn is_size_prefixed(self) -> bool {
        matches!(self.layout().framing, Framing::SizePrefixed { .. })
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FormatVersion {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "legacy" | "msgpack" | "v1" | "1" => Ok(FormatVersion::Legacy),
            "interleaved" | "v2" | "2" => Ok(FormatVersion::Interleaved),
            "columnar" | "v3" | "3" => Ok(FormatVersion::Columnar),
            _ => Err(KiraError::UnknownFormatVersion(value.to_string())),
        }
    }
}

/// The fixed words at the start of every shard file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShardHeader {
    pub version: FormatVersion,
    /// Cell count for legacy files, record count for size-prefixed files.
    pub count: u32,
    /// Offset table length; legacy files only.
    pub entries: Option<u32>,
}

impl ShardHeader {
    /// Bytes to read to parse any header.
    pub const PROBE_LEN: usize = LEGACY_HEADER_SIZE as usize;

    /// Parses the header from the first bytes of a file. `bytes` may be
    /// shorter than [`Self::PROBE_LEN`] for size-prefixed files.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let word = |index: usize| -> Option<u32> {
            let start = index * 4;
            let chunk = bytes.get(start..start + 4)?;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(chunk);
            Some(u32::from_le_bytes(buf))
        };

        let magic = word(0).ok_or("file shorter than the magic marker")?;
        if magic != SHARD_MAGIC {
            return Err(format!("bad magic {magic}, expected {SHARD_MAGIC}"));
        }
        let tag = word(1).ok_or("file shorter than the version field")?;
        let version = FormatVersion::from_tag(tag).map_err(|err| err.to_string())?;
        let count = word(2).ok_or("file shorter than the count field")?;
        let entries = match version {
            FormatVersion::Legacy => {
                Some(word(3).ok_or("legacy file shorter than the entry count")?)
            }
            FormatVersion::Interleaved | FormatVersion::Columnar => None,
        };

        Ok(Self {
            version,
            count,
            entries,
        })
    }

    /// Byte position of the first record body.
    pub fn data_start(&self) -> u64 {
        let layout = self.version.layout();
        let table = self
            .entries
            .map(|entries| u64::from(entries) * LEGACY_TABLE_ENTRY_SIZE)
            .unwrap_or(0);
        layout.header_size + table
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn tags_round_trip() {
        for version in FormatVersion::ALL {
            assert_eq!(FormatVersion::from_tag(version.tag()).unwrap(), version);
        }
        assert_matches!(
            FormatVersion::from_tag(9),
            Err(KiraError::UnknownFormatVersion(_))
        );
    }

    #[test]
    fn parse_names() {
        assert_eq!(
            "Columnar".parse::<FormatVersion>().unwrap(),
            FormatVersion::Columnar
        );
        assert_eq!("v1".parse::<FormatVersion>().unwrap(), FormatVersion::Legacy);
        assert!("parquet".parse::<FormatVersion>().is_err());
    }

    #[test]
    fn only_legacy_is_explicitly_framed() {
        assert!(!FormatVersion::Legacy.is_size_prefixed());
        assert!(FormatVersion::Interleaved.is_size_prefixed());
        assert_eq!(
            FormatVersion::Columnar.layout().payload,
            PayloadLayout::Pairs(PairLayout::Columnar)
        );
    }

    #[test]
    fn legacy_data_start_includes_table() {
        let mut bytes = Vec::new();
        for word in [SHARD_MAGIC, 1, 5000, 3] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let header = ShardHeader::parse(&bytes).unwrap();
        assert_eq!(header.version, FormatVersion::Legacy);
        assert_eq!(header.count, 5000);
        assert_eq!(header.data_start(), 16 + 3 * 8);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [7u8, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0];
        assert!(ShardHeader::parse(&bytes).unwrap_err().contains("bad magic"));
    }
}
