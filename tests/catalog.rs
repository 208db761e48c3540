mod common;

use std::fs;

use assert_matches::assert_matches;
use tempfile::tempdir;

use kira_gex_store::catalog::{Catalog, ManifestCatalog};
use kira_gex_store::domain::PermissionContext;
use kira_gex_store::error::KiraError;
use kira_gex_store::format::FormatVersion;
use kira_gex_store::resolver::BatchResolver;

const MANIFEST: &str = r#"{
  "schema_version": 1,
  "datasets": [
    {
      "id": "pbmc3k",
      "name": "PBMC 3k",
      "species": "Homo sapiens",
      "assembly": "GRCh38",
      "cells": 2000,
      "storage_root": "shards",
      "permissions": ["public"],
      "genes": [
        { "id": "ENSG00000141510", "symbol": "TP53", "file": "gex_1.bin", "offset": 12 },
        { "id": "ENSG00000012048", "symbol": "BRCA1", "file": "gex_legacy.dat", "index": 1 },
        { "id": "ENSG00000136997", "symbol": "MYC", "file": "gex_1.bin" }
      ]
    },
    {
      "id": "tumor",
      "species": "Homo sapiens",
      "assembly": "GRCh38",
      "cells": 500,
      "storage_root": "/data/tumor",
      "format": "columnar",
      "permissions": ["oncology"],
      "genes": []
    },
    {
      "id": "archive",
      "species": "Mus musculus",
      "assembly": "GRCm39",
      "cells": 100,
      "storage_root": "shards",
      "genes": []
    }
  ]
}"#;

fn public() -> PermissionContext {
    PermissionContext::new(["public"])
}

fn setup() -> (tempfile::TempDir, ManifestCatalog) {
    let dir = tempdir().unwrap();
    let root = common::utf8_path(&dir);
    fs::create_dir(root.join("shards")).unwrap();
    common::write_size_prefixed(
        &root.join("shards/gex_1.bin"),
        FormatVersion::Columnar,
        &[common::tp53()],
    );
    common::write_legacy(
        &root.join("shards/gex_legacy.dat"),
        2000,
        &[common::tp53(), common::brca1()],
    );
    let manifest = root.join("catalog.json");
    fs::write(&manifest, MANIFEST).unwrap();

    let catalog = ManifestCatalog::load(manifest.as_std_path()).unwrap();
    (dir, catalog)
}

#[test]
fn dataset_info_from_manifest() {
    let (dir, catalog) = setup();
    let dataset = catalog
        .dataset_info("pbmc3k", &public())
        .unwrap();
    assert_eq!(dataset.cell_count, 2000);
    assert_eq!(dataset.storage_root, common::utf8_path(&dir).join("shards"));
    assert_eq!(catalog.dataset_ids(), vec!["archive", "pbmc3k", "tumor"]);
}

#[test]
fn locators_sniff_format_and_read_legacy_table() {
    let (dir, catalog) = setup();
    let shards = common::utf8_path(&dir).join("shards");
    let locators = catalog
        .resolve_genes(
            "pbmc3k",
            &["tp53".to_string(), "brca1".to_string(), "NOPE".to_string()],
            &public(),
        )
        .unwrap();

    assert_eq!(locators.len(), 2);
    assert_eq!(locators[0].format, FormatVersion::Columnar);
    assert_eq!(locators[0].file, shards.join("gex_1.bin"));
    assert_eq!(locators[0].offset, 12);
    assert_eq!(locators[1].format, FormatVersion::Legacy);
    assert!(locators[1].length.is_some());
}

#[test]
fn gene_without_position_is_invalid() {
    let (_dir, catalog) = setup();
    assert_matches!(
        catalog.resolve_genes("pbmc3k", &["MYC".to_string()], &public()),
        Err(KiraError::InvalidLocator(_))
    );
}

#[test]
fn permissions_gate_datasets() {
    let (_dir, catalog) = setup();
    assert_matches!(
        catalog.dataset_info("tumor", &PermissionContext::new(["lab"])),
        Err(KiraError::PermissionDenied(_))
    );
    assert!(
        catalog
            .resolve_genes("tumor", &["TP53".to_string()], &PermissionContext::default())
            .unwrap()
            .is_empty()
    );
    assert!(
        catalog
            .dataset_info("tumor", &PermissionContext::new(["oncology"]))
            .is_ok()
    );
    assert!(catalog.dataset_info("tumor", &PermissionContext::admin()).is_ok());
    assert_matches!(
        catalog.dataset_info("absent", &PermissionContext::admin()),
        Err(KiraError::DatasetNotFound(_))
    );
}

#[test]
fn dataset_without_permissions_is_admin_only() {
    let (_dir, catalog) = setup();
    assert_matches!(
        catalog.dataset_info("archive", &public()),
        Err(KiraError::PermissionDenied(_))
    );
    assert_matches!(
        catalog.dataset_info("pbmc3k", &PermissionContext::default()),
        Err(KiraError::PermissionDenied(_))
    );
    assert!(catalog.dataset_info("archive", &PermissionContext::admin()).is_ok());
}

#[test]
fn resolves_end_to_end() {
    let (_dir, catalog) = setup();
    let resolver = BatchResolver::new(catalog);
    let result = resolver
        .resolve(
            "pbmc3k",
            &["BRCA1".to_string(), "ENSG00000141510".to_string(), "UNKNOWNGENE".to_string()],
            &public(),
        )
        .unwrap();

    assert_eq!(result.records, vec![common::brca1(), common::tp53()]);
}

#[test]
fn unreadable_manifest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    assert_matches!(ManifestCatalog::load(&path), Err(KiraError::CatalogRead(_)));

    fs::write(&path, "{ not json").unwrap();
    assert_matches!(ManifestCatalog::load(&path), Err(KiraError::CatalogParse(_)));
}
