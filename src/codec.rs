//! Byte-level encoding of one gene's expression record.
//!
//! `decode` takes the record body: for size-prefixed revisions that is the
//! `blockSize - 4` bytes after the prefix, for the legacy revision the
//! `length` bytes at the locator's offset. All integers are little-endian.
//!
//! Size-prefixed body:
//!
//! ```text
//! u16 id_len | id | u16 sym_len | sym | u32 reserved | pairs...
//! ```
//!
//! The pair count is derived from the remaining length, never from the
//! reserved word. Interleaved pairs are `(u32 index, f32 value)` runs;
//! columnar pairs are `M` indices followed by `M` values.
//!
//! Legacy bodies are msgpack maps `{id, s, d}` where `d` holds float32
//! `[index, value]` pairs. Some historical files carry `{id, s, i, g}`
//! instead, with integer indices in `i` and values in `g`; exactly one of the
//! two shapes must be present. A float32 represents every integer up to 2^24
//! exactly and nothing reliably above it, so legacy cell indices are only
//! valid in `0..=2^24`; anything else decodes to [`DecodeError::CellIndex`].

use serde::{Deserialize, Serialize};

use crate::domain::ExpressionRecord;
use crate::error::{DecodeError, EncodeError};
use crate::format::{FormatVersion, PAIR_WIDTH, PairLayout, PayloadLayout};

/// Largest cell index a float32 holds exactly.
pub const MAX_FLOAT_CELL_INDEX: u32 = 1 << 24;

pub fn decode(buf: &[u8], version: FormatVersion) -> Result<ExpressionRecord, DecodeError> {
    match version.layout().payload {
        PayloadLayout::SelfDescribing => decode_legacy(buf),
        PayloadLayout::Pairs(layout) => decode_pair_record(buf, layout),
    }
}

/// Encodes the body that [`decode`] reads back.
pub fn encode(record: &ExpressionRecord, version: FormatVersion) -> Result<Vec<u8>, EncodeError> {
    if record.indices.len() != record.values.len() {
        return Err(EncodeError::LengthMismatch {
            indices: record.indices.len(),
            values: record.values.len(),
        });
    }
    match version.layout().payload {
        PayloadLayout::SelfDescribing => encode_legacy(record),
        PayloadLayout::Pairs(layout) => encode_pair_record(record, layout),
    }
}

/// Encodes the bytes as they sit in a shard file: the body behind its size
/// prefix for size-prefixed revisions, the bare body for legacy.
pub fn frame(record: &ExpressionRecord, version: FormatVersion) -> Result<Vec<u8>, EncodeError> {
    let body = encode(record, version)?;
    if !version.is_size_prefixed() {
        return Ok(body);
    }
    let block_size = u32::try_from(body.len() + 4)
        .map_err(|_| EncodeError::RecordTooLarge(body.len() + 4))?;
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(&block_size.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Reads only the gene id and symbol of a size-prefixed body.
pub fn decode_names(buf: &[u8]) -> Result<(String, String), DecodeError> {
    let mut cursor = Cursor::new(buf);
    let gene_id = cursor.string("gene id")?;
    let gene_symbol = cursor.string("gene symbol")?;
    Ok((gene_id, gene_symbol))
}

pub fn decode_pairs(bytes: &[u8], layout: PairLayout) -> Result<(Vec<u32>, Vec<f32>), DecodeError> {
    if bytes.len() % PAIR_WIDTH != 0 {
        return Err(DecodeError::MisalignedPairs { len: bytes.len() });
    }
    let count = bytes.len() / PAIR_WIDTH;

    match layout {
        PairLayout::Interleaved => {
            let mut indices = Vec::with_capacity(count);
            let mut values = Vec::with_capacity(count);
            for pair in bytes.chunks_exact(PAIR_WIDTH) {
                let (index, value) = pair.split_at(4);
                indices.push(le_u32(index));
                values.push(f32::from_bits(le_u32(value)));
            }
            Ok((indices, values))
        }
        PairLayout::Columnar => {
            let (index_bytes, value_bytes) = bytes.split_at(count * 4);
            let indices = index_bytes.chunks_exact(4).map(le_u32).collect();
            let values = value_bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_bits(le_u32(chunk)))
                .collect();
            Ok((indices, values))
        }
    }
}

pub fn encode_pairs(indices: &[u32], values: &[f32], layout: PairLayout, out: &mut Vec<u8>) {
    out.reserve(indices.len() * PAIR_WIDTH);
    match layout {
        PairLayout::Interleaved => {
            for (index, value) in indices.iter().zip(values) {
                out.extend_from_slice(&index.to_le_bytes());
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        PairLayout::Columnar => {
            for index in indices {
                out.extend_from_slice(&index.to_le_bytes());
            }
            for value in values {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
}

fn decode_pair_record(buf: &[u8], layout: PairLayout) -> Result<ExpressionRecord, DecodeError> {
    let mut cursor = Cursor::new(buf);
    let gene_id = cursor.string("gene id")?;
    let gene_symbol = cursor.string("gene symbol")?;
    // reserved
    cursor.take(4, "reserved count")?;
    let (indices, values) = decode_pairs(cursor.rest(), layout)?;

    Ok(ExpressionRecord {
        gene_id,
        gene_symbol,
        indices,
        values,
    })
}

fn encode_pair_record(record: &ExpressionRecord, layout: PairLayout) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    put_string(&mut out, &record.gene_id, "gene id")?;
    put_string(&mut out, &record.gene_symbol, "gene symbol")?;
    let count = u32::try_from(record.indices.len())
        .map_err(|_| EncodeError::RecordTooLarge(record.indices.len()))?;
    out.extend_from_slice(&count.to_le_bytes());
    encode_pairs(&record.indices, &record.values, layout, &mut out);
    Ok(out)
}

fn put_string(out: &mut Vec<u8>, value: &str, field: &'static str) -> Result<(), EncodeError> {
    let len = u16::try_from(value.len()).map_err(|_| EncodeError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct LegacyBody {
    #[serde(rename = "id")]
    gene_id: String,
    #[serde(rename = "s", alias = "sym")]
    gene_symbol: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    data: Option<Vec<[f32; 2]>>,
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    indices: Option<Vec<u32>>,
    #[serde(rename = "g", default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<f32>>,
}

fn decode_legacy(buf: &[u8]) -> Result<ExpressionRecord, DecodeError> {
    let body: LegacyBody =
        rmp_serde::from_slice(buf).map_err(|err| DecodeError::Malformed(err.to_string()))?;

    let (indices, values) = match (body.data, body.indices, body.values) {
        (Some(data), None, None) => {
            let mut indices = Vec::with_capacity(data.len());
            let mut values = Vec::with_capacity(data.len());
            for [index, value] in data {
                indices.push(float_to_cell_index(index)?);
                values.push(value);
            }
            (indices, values)
        }
        (None, Some(indices), Some(values)) => {
            if indices.len() != values.len() {
                return Err(DecodeError::Malformed(format!(
                    "{} indices but {} values",
                    indices.len(),
                    values.len()
                )));
            }
            (indices, values)
        }
        (None, None, None) => {
            return Err(DecodeError::Malformed(
                "record has neither `d` pairs nor `i`/`g` arrays".to_string(),
            ));
        }
        _ => {
            return Err(DecodeError::Malformed(
                "record mixes `d` pairs with `i`/`g` arrays or lacks one of `i`/`g`".to_string(),
            ));
        }
    };

    Ok(ExpressionRecord {
        gene_id: body.gene_id,
        gene_symbol: body.gene_symbol,
        indices,
        values,
    })
}

fn encode_legacy(record: &ExpressionRecord) -> Result<Vec<u8>, EncodeError> {
    let data = record
        .indices
        .iter()
        .zip(&record.values)
        .map(|(&index, &value)| {
            if index > MAX_FLOAT_CELL_INDEX {
                return Err(EncodeError::CellIndexRange(index));
            }
            Ok([index as f32, value])
        })
        .collect::<Result<Vec<_>, EncodeError>>()?;

    let body = LegacyBody {
        gene_id: record.gene_id.clone(),
        gene_symbol: record.gene_symbol.clone(),
        data: Some(data),
        indices: None,
        values: None,
    };
    rmp_serde::to_vec_named(&body).map_err(|err| EncodeError::Msgpack(err.to_string()))
}

fn float_to_cell_index(value: f32) -> Result<u32, DecodeError> {
    let in_range = value.is_finite() && value >= 0.0 && value <= MAX_FLOAT_CELL_INDEX as f32;
    if !in_range || value.fract() != 0.0 {
        return Err(DecodeError::CellIndex(value));
    }
    Ok(value as u32)
}

fn le_u32(chunk: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(chunk);
    u32::from_le_bytes(word)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let available = self.buf.len() - self.pos;
        if len > available {
            return Err(DecodeError::Truncated {
                field,
                needed: len,
                available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.u16(field)? as usize;
        let bytes = self.take(len, field)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|source| DecodeError::Utf8 { field, source })
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
