use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::codec;
use crate::domain::{ExpressionRecord, GeneLocator};
use crate::error::{DecodeError, KiraError};
use crate::format::{FormatVersion, Framing, LEGACY_TABLE_ENTRY_SIZE, ShardHeader};

/// Bytes read up front when only a record's names are wanted.
const NAME_PROBE_LEN: usize = 256;

/// Smallest size-prefixed record: prefix, two empty names, reserved word.
const MIN_FRAMED_RECORD: u64 = 12;

/// Reads the body of one record. Opens the file, performs at most two
/// bounded reads and closes it again before returning.
pub fn read_segment(
    path: &Utf8Path,
    offset: u64,
    length: Option<u32>,
    version: FormatVersion,
) -> Result<Vec<u8>, KiraError> {
    ShardFile::open(path)?.read_segment(offset, length, version)
}

pub fn read_record(locator: &GeneLocator) -> Result<ExpressionRecord, KiraError> {
    ShardFile::open(&locator.file)?.read_record(locator)
}

/// An open shard file. Dropping it closes the handle; nothing is cached
/// between reads.
#[derive(Debug)]
pub struct ShardFile {
    path: Utf8PathBuf,
    file: File,
    len: u64,
}

impl ShardFile {
    pub fn open(path: &Utf8Path) -> Result<Self, KiraError> {
        let file = File::open(path.as_std_path()).map_err(|err| KiraError::io(path, 0, err))?;
        let len = file
            .metadata()
            .map_err(|err| KiraError::io(path, 0, err))?
            .len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn header(&mut self) -> Result<ShardHeader, KiraError> {
        let probe = (ShardHeader::PROBE_LEN as u64).min(self.len) as usize;
        let bytes = self.read_exact_at(0, probe, "shard header")?;
        ShardHeader::parse(&bytes).map_err(|detail| KiraError::InvalidShardHeader {
            path: self.path.clone(),
            detail,
        })
    }

    /// Returns the record body at `offset`, i.e. the bytes `codec::decode`
    /// expects.
    ///
    /// Legacy records need `length`. For size-prefixed records `offset`
    /// points at the prefix; a known `length` is the body length and saves
    /// the prefix read.
    pub fn read_segment(
        &mut self,
        offset: u64,
        length: Option<u32>,
        version: FormatVersion,
    ) -> Result<Vec<u8>, KiraError> {
        match version.layout().framing {
            Framing::Explicit => {
                let length = length.ok_or_else(|| {
                    KiraError::InvalidLocator(format!(
                        "{version} record at {}:{offset} has no length",
                        self.path
                    ))
                })?;
                debug!(path = %self.path, offset, length, "reading record");
                self.read_exact_at(offset, length as usize, "record body")
            }
            Framing::SizePrefixed { prefix_len } => {
                let body_len = match length {
                    Some(length) => length as u64,
                    None => self.block_size(offset, prefix_len)? - prefix_len,
                };
                debug!(path = %self.path, offset, body_len, "reading record");
                self.read_exact_at(
                    offset.saturating_add(prefix_len),
                    body_len as usize,
                    "record body",
                )
                .map_err(|err| at_record(err, offset))
            }
        }
    }

    pub fn read_record(&mut self, locator: &GeneLocator) -> Result<ExpressionRecord, KiraError> {
        let body = self.read_segment(locator.offset, locator.length, locator.format)?;
        codec::decode(&body, locator.format)
            .map_err(|err| KiraError::corrupt(&self.path, locator.offset, err))
    }

    /// Reads and validates the size prefix at `offset`.
    fn block_size(&mut self, offset: u64, prefix_len: u64) -> Result<u64, KiraError> {
        let prefix = self.read_exact_at(offset, prefix_len as usize, "block size")?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&prefix[..4]);
        let block_size = u64::from(u32::from_le_bytes(word));
        if block_size < prefix_len {
            return Err(KiraError::corrupt(
                &self.path,
                offset,
                DecodeError::Truncated {
                    field: "block size",
                    needed: prefix_len as usize,
                    available: block_size as usize,
                },
            ));
        }
        Ok(block_size)
    }

    /// Bounded read; a range that runs past the end of the file is reported
    /// as truncation before anything is allocated.
    fn read_exact_at(
        &mut self,
        offset: u64,
        len: usize,
        field: &'static str,
    ) -> Result<Vec<u8>, KiraError> {
        let fits = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.len);
        if !fits {
            return Err(KiraError::corrupt(
                &self.path,
                offset,
                DecodeError::Truncated {
                    field,
                    needed: len,
                    available: self.len.saturating_sub(offset) as usize,
                },
            ));
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|err| KiraError::io(&self.path, offset, err))?;
        let mut buf = vec![0u8; len];
        self.file
            .read_exact(&mut buf)
            .map_err(|err| KiraError::io(&self.path, offset, err))?;
        Ok(buf)
    }

    fn read_names(&mut self, body_offset: u64, body_len: u64) -> Result<(String, String), KiraError> {
        let probe = body_len.min(NAME_PROBE_LEN as u64) as usize;
        let bytes = self.read_exact_at(body_offset, probe, "record names")?;
        let names = match codec::decode_names(&bytes) {
            Err(DecodeError::Truncated { .. }) if (probe as u64) < body_len => {
                let bytes = self.read_exact_at(body_offset, body_len as usize, "record names")?;
                codec::decode_names(&bytes)
            }
            other => other,
        };
        names.map_err(|err| KiraError::corrupt(&self.path, body_offset, err))
    }
}

/// Points a body read failure at the record's own offset.
fn at_record(err: KiraError, record_offset: u64) -> KiraError {
    match err {
        KiraError::Corrupt { path, source, .. } => KiraError::Corrupt {
            path,
            offset: record_offset,
            source,
        },
        KiraError::Io { path, source, .. } => KiraError::Io {
            path,
            offset: record_offset,
            source,
        },
        other => other,
    }
}

/// The `(offset, size)` table at the front of a legacy shard file.
#[derive(Debug, Clone)]
pub struct LegacyIndex {
    header: ShardHeader,
    entries: Vec<(u32, u32)>,
}

impl LegacyIndex {
    pub fn read(file: &mut ShardFile) -> Result<Self, KiraError> {
        let header = file.header()?;
        let Some(count) = header.entries else {
            return Err(KiraError::InvalidShardHeader {
                path: file.path().to_path_buf(),
                detail: format!("{} file has no offset table", header.version),
            });
        };

        let table_offset = header.version.layout().header_size;
        let table_len = u64::from(count) * LEGACY_TABLE_ENTRY_SIZE;
        let table = file.read_exact_at(table_offset, table_len as usize, "offset table")?;
        let entries = table
            .chunks_exact(LEGACY_TABLE_ENTRY_SIZE as usize)
            .map(|entry| {
                let offset = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
                let size = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
                (offset, size)
            })
            .collect();

        Ok(Self { header, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cell_count(&self) -> u32 {
        self.header.count
    }

    /// Absolute byte offset and length of entry `index`.
    pub fn locate(&self, index: usize) -> Option<(u64, u32)> {
        let &(offset, size) = self.entries.get(index)?;
        Some((self.header.data_start() + u64::from(offset), size))
    }
}

/// Walks every record of a shard file and returns its header and one locator
/// per record, in file order.
pub fn scan_shard(path: &Utf8Path) -> Result<(ShardHeader, Vec<GeneLocator>), KiraError> {
    let mut file = ShardFile::open(path)?;
    let header = file.header()?;
    let version = header.version;

    let locators = match version.layout().framing {
        Framing::Explicit => {
            let index = LegacyIndex::read(&mut file)?;
            (0..index.len())
                .filter_map(|i| index.locate(i))
                .map(|(offset, length)| {
                    let mut locator = GeneLocator {
                        gene_id: String::new(),
                        gene_symbol: String::new(),
                        file: path.to_path_buf(),
                        offset,
                        length: Some(length),
                        format: version,
                    };
                    let record = file.read_record(&locator)?;
                    locator.gene_id = record.gene_id;
                    locator.gene_symbol = record.gene_symbol;
                    Ok(locator)
                })
                .collect::<Result<Vec<_>, KiraError>>()?
        }
        Framing::SizePrefixed { prefix_len } => {
            let mut offset = header.data_start();
            let fits = file.len().saturating_sub(offset) / MIN_FRAMED_RECORD;
            let mut locators = Vec::with_capacity(u64::from(header.count).min(fits) as usize);
            for _ in 0..header.count {
                if offset >= file.len() {
                    return Err(KiraError::corrupt(
                        path,
                        offset,
                        DecodeError::Truncated {
                            field: "record count",
                            needed: header.count as usize,
                            available: locators.len(),
                        },
                    ));
                }
                let block_size = file.block_size(offset, prefix_len)?;
                let body_len = block_size - prefix_len;
                let (gene_id, gene_symbol) = file.read_names(offset + prefix_len, body_len)?;
                locators.push(GeneLocator {
                    gene_id,
                    gene_symbol,
                    file: path.to_path_buf(),
                    offset,
                    length: u32::try_from(body_len).ok(),
                    format: version,
                });
                offset += block_size;
            }
            locators
        }
    };

    debug!(path = %path, records = locators.len(), "scanned shard");
    Ok((header, locators))
}
