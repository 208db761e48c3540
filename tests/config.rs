use std::fs;
use std::path::PathBuf;

use assert_matches::assert_matches;
use tempfile::tempdir;

use kira_gex_store::config::{Config, ConfigLoader};
use kira_gex_store::error::KiraError;

#[test]
fn load_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kira-gex.json");
    fs::write(
        &path,
        r#"{ "schema_version": 1, "catalog": "catalog.json", "permissions": ["lab"] }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.catalog, Some(dir.path().join("catalog.json")));
    assert_eq!(resolved.permissions, vec!["lab".to_string()]);
    assert!(resolved.permission_context().allows(&["lab"]));
    assert!(!resolved.permission_context().is_admin());
}

#[test]
fn admin_flag_grants_everything() {
    let config = Config {
        catalog: Some(PathBuf::from("/srv/gex/catalog.json")),
        admin: true,
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config, None);
    assert_eq!(resolved.catalog, Some(PathBuf::from("/srv/gex/catalog.json")));
    assert!(resolved.permission_context().allows(&["anything"]));
}

#[test]
fn bad_config_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kira-gex.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(KiraError::ConfigRead(_))
    );

    fs::write(&path, "[1, 2").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(KiraError::ConfigParse(_))
    );
}

#[test]
fn optional_lookup_only_tolerates_absence() {
    let dir = tempdir().unwrap();
    let candidates = vec![dir.path().join("kira-gex.json"), dir.path().join("user.json")];
    assert!(ConfigLoader::load_first(&candidates).unwrap().is_none());

    fs::write(&candidates[1], r#"{ "permissions": ["lab"] }"#).unwrap();
    let resolved = ConfigLoader::load_first(&candidates).unwrap().unwrap();
    assert_eq!(resolved.permissions, vec!["lab".to_string()]);

    fs::write(&candidates[0], "{ broken").unwrap();
    assert_matches!(
        ConfigLoader::load_first(&candidates),
        Err(KiraError::ConfigParse(_))
    );
    assert_matches!(
        ConfigLoader::resolve_optional(candidates[0].to_str()),
        Err(KiraError::ConfigParse(_))
    );
}
