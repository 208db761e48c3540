#![allow(dead_code)]

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use kira_gex_store::codec;
use kira_gex_store::domain::{ExpressionRecord, GeneLocator};
use kira_gex_store::format::{FormatVersion, SHARD_MAGIC};

pub fn tp53() -> ExpressionRecord {
    ExpressionRecord::new(
        "ENSG00000141510",
        "TP53",
        vec![5, 9, 1000],
        vec![1.25, 0.0, 3.5],
    )
}

pub fn brca1() -> ExpressionRecord {
    ExpressionRecord::new("ENSG00000012048", "BRCA1", vec![0, 2], vec![7.0, 0.5])
}

pub fn empty_gene() -> ExpressionRecord {
    ExpressionRecord::new("ENSG1", "TP53", vec![], vec![])
}

pub fn utf8_path(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

/// Writes a size-prefixed shard and returns one locator per record, with the
/// length left for the reader to discover.
pub fn write_size_prefixed(
    path: &Utf8Path,
    version: FormatVersion,
    records: &[ExpressionRecord],
) -> Vec<GeneLocator> {
    let mut bytes = Vec::new();
    for word in [SHARD_MAGIC, version.tag(), records.len() as u32] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }

    let mut locators = Vec::new();
    for record in records {
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(&codec::frame(record, version).unwrap());
        locators.push(GeneLocator {
            gene_id: record.gene_id.clone(),
            gene_symbol: record.gene_symbol.clone(),
            file: path.to_path_buf(),
            offset,
            length: None,
            format: version,
        });
    }
    fs::write(path, bytes).unwrap();
    locators
}

/// Writes a legacy shard: header, `(offset, size)` table, msgpack bodies.
/// Returned locators carry absolute offsets and the body length.
pub fn write_legacy(path: &Utf8Path, cells: u32, records: &[ExpressionRecord]) -> Vec<GeneLocator> {
    let bodies: Vec<Vec<u8>> = records
        .iter()
        .map(|record| codec::encode(record, FormatVersion::Legacy).unwrap())
        .collect();

    let mut bytes = Vec::new();
    for word in [
        SHARD_MAGIC,
        FormatVersion::Legacy.tag(),
        cells,
        records.len() as u32,
    ] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    let data_start = 16 + 8 * records.len() as u64;

    let mut relative = 0u32;
    let mut locators = Vec::new();
    for (record, body) in records.iter().zip(&bodies) {
        bytes.extend_from_slice(&relative.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        locators.push(GeneLocator {
            gene_id: record.gene_id.clone(),
            gene_symbol: record.gene_symbol.clone(),
            file: path.to_path_buf(),
            offset: data_start + u64::from(relative),
            length: Some(body.len() as u32),
            format: FormatVersion::Legacy,
        });
        relative += body.len() as u32;
    }
    for body in &bodies {
        bytes.extend_from_slice(body);
    }
    fs::write(path, bytes).unwrap();
    locators
}
