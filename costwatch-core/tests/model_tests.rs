//! Integration tests for core model types.

use chrono::NaiveDate;
use costwatch_core::{
    CollectionError, CoreError, DateRange, ErrorKind, ProviderCostData, ProviderKind,
};

#[test]
fn test_date_range_invariants() {
    let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
    let single = DateRange::new(day, day).unwrap();
    assert_eq!(single.days(), 1);

    let reversed = DateRange::new(day, day.pred_opt().unwrap());
    assert!(matches!(reversed, Err(CoreError::InvalidDateRange { .. })));
}

#[test]
fn test_cost_data_roundtrip_preserves_maps() {
    let mut data = ProviderCostData::new(
        ProviderKind::Azure,
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
    )
    .with_service("Virtual Machines", 40.0);
    data.account_costs.insert("sub-1".into(), 40.0);
    data.metadata
        .insert("granularity".into(), serde_json::json!("DAILY"));

    let json = serde_json::to_string(&data).unwrap();
    let parsed: ProviderCostData = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, data);
}

#[test]
fn test_collection_error_kinds() {
    let err = CollectionError::RateLimited {
        message: "Too many requests".into(),
        retry_after: Some(30),
    };
    assert_eq!(err.kind(), ErrorKind::RateLimitError);
    assert_eq!(err.kind().code(), "RATE_LIMIT_ERROR");
    assert_eq!(err.to_string(), "Rate limited: Too many requests");
}
