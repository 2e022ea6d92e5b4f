use assert_matches::assert_matches;

use riverscapes_ec::domain::{DatasetKind, Guid, HucCode, OutputKind};
use riverscapes_ec::error::{ErrorKind, RsError};

#[test]
fn parse_guid_normalizes_case() {
    let guid: Guid = "0b0e5f34-7d2a-4f8e-a1c3-9e2d4b6a8c10".parse().unwrap();
    assert_eq!(guid.as_str(), "0B0E5F34-7D2A-4F8E-A1C3-9E2D4B6A8C10");
}

#[test]
fn parse_huc_code() {
    let huc: HucCode = "17020010".parse().unwrap();
    assert_eq!(huc.as_str(), "17020010");
    assert_matches!(
        "Entiat".parse::<HucCode>().unwrap_err(),
        RsError::InvalidHucCode(_)
    );
}

#[test]
fn parse_output_kind() {
    assert_eq!(
        "prediction".parse::<OutputKind>().unwrap(),
        OutputKind::Prediction
    );
    assert_eq!(OutputKind::StatisticsSummary.dir_name(), "StatisticsSummary");
    let err = "Polystat".parse::<OutputKind>().unwrap_err();
    assert_matches!(err, RsError::InvalidOutputKind(_));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn dataset_kind_round_trips_tag() {
    for kind in DatasetKind::ALL {
        assert_eq!(kind.tag().parse::<DatasetKind>().unwrap(), kind);
    }
}
