use std::collections::HashMap;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Dataset, GeneLocator, PermissionContext};
use crate::error::KiraError;
use crate::format::FormatVersion;
use crate::reader::{LegacyIndex, ShardFile};

/// Maps datasets and gene identifiers to record locations, and decides who
/// may see which dataset.
pub trait Catalog: Send + Sync {
    fn dataset_info(&self, dataset_id: &str, ctx: &PermissionContext)
    -> Result<Dataset, KiraError>;

    /// One locator per identifier that matched a gene. Unmatched identifiers
    /// and datasets the caller may not see produce no locators.
    fn resolve_genes(
        &self,
        dataset_id: &str,
        identifiers: &[String],
        ctx: &PermissionContext,
    ) -> Result<Vec<GeneLocator>, KiraError>;
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub species: String,
    pub assembly: String,
    pub cells: u32,
    pub storage_root: Utf8PathBuf,
    #[serde(default)]
    pub format: Option<FormatVersion>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub genes: Vec<GeneEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneEntry {
    pub id: String,
    pub symbol: String,
    pub file: Utf8PathBuf,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub length: Option<u32>,
    /// Position in a legacy file's offset table, used instead of `offset`.
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub format: Option<FormatVersion>,
}

/// Catalog backed by a JSON manifest, or built directly from a [`Manifest`].
#[derive(Debug, Clone)]
pub struct ManifestCatalog {
    datasets: HashMap<String, DatasetEntry>,
}

impl ManifestCatalog {
    /// Loads a manifest file. Relative storage roots are resolved against the
    /// manifest's directory.
    pub fn load(path: &Path) -> Result<Self, KiraError> {
        let content =
            fs::read_to_string(path).map_err(|_| KiraError::CatalogRead(path.to_path_buf()))?;
        let mut manifest: Manifest = serde_json::from_str(&content)
            .map_err(|err| KiraError::CatalogParse(err.to_string()))?;

        if let Some(base) = path
            .parent()
            .and_then(|parent| Utf8Path::from_path(parent))
        {
            for dataset in &mut manifest.datasets {
                if dataset.storage_root.is_relative() {
                    dataset.storage_root = base.join(&dataset.storage_root);
                }
            }
        }

        Ok(Self::from_manifest(manifest))
    }

    pub fn from_manifest(manifest: Manifest) -> Self {
        let datasets = manifest
            .datasets
            .into_iter()
            .map(|dataset| (dataset.id.clone(), dataset))
            .collect();
        Self { datasets }
    }

    pub fn dataset_ids(&self) -> Vec<&str> {
        let mut ids = self.datasets.keys().map(String::as_str).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    fn visible(&self, dataset_id: &str, ctx: &PermissionContext) -> Result<&DatasetEntry, KiraError> {
        let entry = self
            .datasets
            .get(dataset_id)
            .ok_or_else(|| KiraError::DatasetNotFound(dataset_id.to_string()))?;
        if !ctx.allows(&entry.permissions) {
            return Err(KiraError::PermissionDenied(dataset_id.to_string()));
        }
        Ok(entry)
    }

    fn locator(&self, dataset: &DatasetEntry, gene: &GeneEntry) -> Result<GeneLocator, KiraError> {
        let file = dataset.storage_root.join(&gene.file);

        let format = match gene.format.or(dataset.format) {
            Some(format) => format,
            None => ShardFile::open(&file)?.header()?.version,
        };

        let (offset, length) = match (gene.offset, gene.index) {
            (Some(offset), _) => (offset, gene.length),
            (None, Some(index)) => {
                let table = LegacyIndex::read(&mut ShardFile::open(&file)?)?;
                let (offset, length) = table.locate(index).ok_or_else(|| {
                    KiraError::InvalidLocator(format!(
                        "gene {} points at entry {index} of {file}, which has {} entries",
                        gene.id,
                        table.len()
                    ))
                })?;
                (offset, Some(length))
            }
            (None, None) => {
                return Err(KiraError::InvalidLocator(format!(
                    "gene {} in dataset {} has neither offset nor index",
                    gene.id, dataset.id
                )));
            }
        };

        Ok(GeneLocator {
            gene_id: gene.id.clone(),
            gene_symbol: gene.symbol.clone(),
            file,
            offset,
            length,
            format,
        })
    }
}

impl Catalog for ManifestCatalog {
    fn dataset_info(
        &self,
        dataset_id: &str,
        ctx: &PermissionContext,
    ) -> Result<Dataset, KiraError> {
        let entry = self.visible(dataset_id, ctx)?;
        Ok(Dataset {
            id: entry.id.clone(),
            name: entry.name.clone(),
            species: entry.species.clone(),
            assembly: entry.assembly.clone(),
            cell_count: entry.cells,
            storage_root: entry.storage_root.clone(),
        })
    }

    fn resolve_genes(
        &self,
        dataset_id: &str,
        identifiers: &[String],
        ctx: &PermissionContext,
    ) -> Result<Vec<GeneLocator>, KiraError> {
        let dataset = match self.visible(dataset_id, ctx) {
            Ok(dataset) => dataset,
            Err(KiraError::PermissionDenied(_)) => {
                debug!(dataset = dataset_id, "dataset not visible, no genes resolved");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut locators = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            match find_gene(&dataset.genes, identifier)? {
                Some(gene) => locators.push(self.locator(dataset, gene)?),
                None => debug!(dataset = dataset_id, gene = %identifier, "gene not found"),
            }
        }
        Ok(locators)
    }
}

/// Exact case-insensitive match on symbol or accession first. Identifiers
/// containing `%` are then tried as SQL `LIKE` patterns. First match wins.
pub fn find_gene<'a>(
    genes: &'a [GeneEntry],
    identifier: &str,
) -> Result<Option<&'a GeneEntry>, KiraError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Ok(None);
    }

    let exact = genes.iter().find(|gene| {
        gene.symbol.eq_ignore_ascii_case(identifier) || gene.id.eq_ignore_ascii_case(identifier)
    });
    if exact.is_some() || !identifier.contains('%') {
        return Ok(exact);
    }

    let pattern = like_pattern(identifier)?;
    Ok(genes
        .iter()
        .find(|gene| pattern.is_match(&gene.symbol) || pattern.is_match(&gene.id)))
}

fn like_pattern(pattern: &str) -> Result<Regex, KiraError> {
    let mut expr = String::from("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|err| KiraError::InvalidPattern(format!("{pattern}: {err}")))
}
