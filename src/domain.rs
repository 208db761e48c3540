use std::collections::HashSet;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::format::FormatVersion;

/// Where one gene's record lives on disk. Produced by a catalog for a single
/// (dataset, gene) pair and consumed within one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneLocator {
    pub gene_id: String,
    pub gene_symbol: String,
    pub file: Utf8PathBuf,
    pub offset: u64,
    /// Body length in bytes. Mandatory for legacy records; for size-prefixed
    /// records it is `blockSize - 4` when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    pub format: FormatVersion,
}

impl GeneLocator {
    /// Identity of the on-disk record. Two locators with the same key always
    /// decode to the same record.
    pub fn record_key(&self) -> (&Utf8PathBuf, u64) {
        (&self.file, self.offset)
    }
}

/// Sparse expression vector of one gene: cell `indices[i]` has expression
/// `values[i]`, every other cell is zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpressionRecord {
    #[serde(rename = "id")]
    pub gene_id: String,
    #[serde(rename = "sym")]
    pub gene_symbol: String,
    #[serde(rename = "indexes")]
    pub indices: Vec<u32>,
    #[serde(rename = "gex")]
    pub values: Vec<f32>,
}

impl ExpressionRecord {
    pub fn new(
        gene_id: impl Into<String>,
        gene_symbol: impl Into<String>,
        indices: Vec<u32>,
        values: Vec<f32>,
    ) -> Self {
        Self {
            gene_id: gene_id.into(),
            gene_symbol: gene_symbol.into(),
            indices,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn max_index(&self) -> Option<u32> {
        self.indices.iter().copied().max()
    }

    /// Expands to one value per cell. Indices at or beyond `cell_count` are
    /// dropped.
    pub fn dense(&self, cell_count: usize) -> Vec<f32> {
        let mut values = vec![0.0; cell_count];
        for (&index, &value) in self.indices.iter().zip(&self.values) {
            if let Some(slot) = values.get_mut(index as usize) {
                *slot = value;
            }
        }
        values
    }
}

/// Records for one dataset; genes that did not resolve are absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GexQueryResult {
    #[serde(rename = "dataset")]
    pub dataset_id: String,
    #[serde(rename = "genes")]
    pub records: Vec<ExpressionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub species: String,
    pub assembly: String,
    #[serde(rename = "cells")]
    pub cell_count: u32,
    pub storage_root: Utf8PathBuf,
}

/// Who is asking. Admins see every dataset; everyone else needs one of the
/// dataset's permission names, so a dataset without any is admin-only.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    permissions: HashSet<String>,
    admin: bool,
}

impl PermissionContext {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            permissions: HashSet::new(),
            admin: true,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn allows<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.admin
            || required
                .iter()
                .any(|name| self.permissions.contains(name.as_ref()))
    }
}
