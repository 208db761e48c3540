use std::collections::{BTreeMap, HashSet};

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::domain::{Dataset, ExpressionRecord, GeneLocator, GexQueryResult, PermissionContext};
use crate::error::KiraError;
use crate::reader::ShardFile;

/// Turns a list of gene identifiers into decoded records for one dataset.
///
/// Identifiers the catalog cannot resolve are dropped. A read or decode
/// failure on any resolved gene fails the whole batch.
#[derive(Debug, Clone)]
pub struct BatchResolver<C: Catalog> {
    catalog: C,
}

impl<C: Catalog> BatchResolver<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn resolve(
        &self,
        dataset_id: &str,
        identifiers: &[String],
        ctx: &PermissionContext,
    ) -> Result<GexQueryResult, KiraError> {
        let dataset = self.catalog.dataset_info(dataset_id, ctx)?;
        let locators = self.catalog.resolve_genes(dataset_id, identifiers, ctx)?;
        debug!(
            dataset = dataset_id,
            requested = identifiers.len(),
            resolved = locators.len(),
            "resolved gene locators"
        );

        let locators = distinct_records(locators);
        let mut records: Vec<Option<ExpressionRecord>> = vec![None; locators.len()];

        for (path, slots) in group_by_file(&locators) {
            let mut file = ShardFile::open(path)?;
            for slot in slots {
                let locator = &locators[slot];
                let record = file.read_record(locator)?;
                check_record(&dataset, locator, &record);
                records[slot] = Some(record);
            }
        }

        Ok(GexQueryResult {
            dataset_id: dataset.id,
            records: records.into_iter().flatten().collect(),
        })
    }
}

/// Drops locators that point at a record already requested, keeping the
/// first. Keyed by file and offset, never by file alone.
fn distinct_records(locators: Vec<GeneLocator>) -> Vec<GeneLocator> {
    let mut seen = HashSet::new();
    locators
        .into_iter()
        .filter(|locator| {
            let (file, offset) = locator.record_key();
            seen.insert((file.clone(), offset))
        })
        .collect()
}

/// Positions into `locators`, grouped per file and sorted by offset.
fn group_by_file(locators: &[GeneLocator]) -> BTreeMap<&Utf8Path, Vec<usize>> {
    let mut groups: BTreeMap<&Utf8Path, Vec<usize>> = BTreeMap::new();
    for (slot, locator) in locators.iter().enumerate() {
        groups
            .entry(locator.file.as_path())
            .or_default()
            .push(slot);
    }
    for slots in groups.values_mut() {
        slots.sort_by_key(|&slot| locators[slot].offset);
    }
    groups
}

fn check_record(dataset: &Dataset, locator: &GeneLocator, record: &ExpressionRecord) {
    if record.gene_id != locator.gene_id {
        warn!(
            file = %locator.file,
            offset = locator.offset,
            expected = %locator.gene_id,
            found = %record.gene_id,
            "record gene id differs from catalog"
        );
    }
    if let Some(max) = record.max_index()
        && max >= dataset.cell_count
    {
        warn!(
            dataset = %dataset.id,
            gene = %record.gene_id,
            max_index = max,
            cells = dataset.cell_count,
            "record indexes cells beyond the dataset"
        );
    }
}
