use std::collections::HashSet;

use assert_matches::assert_matches;

use riverscapes_ec::error::{ErrorKind, RsError};
use riverscapes_ec::identity::{WatershedCatalog, new_guid};

#[test]
fn guids_are_unique_and_uppercase() {
    let guids: HashSet<String> = (0..10_000).map(|_| new_guid().to_string()).collect();
    assert_eq!(guids.len(), 10_000);
    assert!(
        guids
            .iter()
            .all(|guid| guid.len() == 36 && *guid == guid.to_uppercase())
    );
}

#[test]
fn catalog_lookup() {
    let catalog = WatershedCatalog::columbia_basin();
    assert_eq!(catalog.resolve("Entiat").unwrap().as_str(), "17020010");

    let err = catalog.resolve("Nonexistent Basin").unwrap_err();
    assert_matches!(err, RsError::WatershedNotFound(ref name) if name == "Nonexistent Basin");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn injected_catalog() {
    let catalog = WatershedCatalog::new([("Test Creek".to_string(), "12345678".parse().unwrap())]);
    assert_eq!(catalog.resolve("Test Creek").unwrap().as_str(), "12345678");
    assert!(catalog.resolve("Entiat").is_err());
}
