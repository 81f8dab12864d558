//! Gateway payload edge case and error handling tests.
//!
//! These tests verify wire parsing with malformed, partial, or edge case inputs.

#[cfg(test)]
mod cost_export_edge_tests {
    use crate::billing::wire::{CostExport, LineItem, parse_cost_export};
    use crate::error::ProviderError;
    use chrono::NaiveDate;
    use costwatch_core::{DateRange, ProviderKind};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn march(start: u32, end: u32) -> DateRange {
        DateRange::new(day(start), day(end)).unwrap()
    }

    fn parse(json: &str, range: &DateRange) -> Result<crate::billing::wire::ParsedCosts, ProviderError> {
        let export: CostExport = serde_json::from_str(json).unwrap();
        parse_cost_export(ProviderKind::Aws, range, export, "USD")
    }

    // ========================================================================
    // JSON Edge Cases
    // ========================================================================

    #[test]
    fn test_parse_empty_json_object() {
        let parsed = parse("{}", &march(1, 7)).unwrap();
        assert_eq!(parsed.data.total_cost, 0.0);
        assert_eq!(parsed.data.currency, "USD");
        assert!(parsed.data.service_costs.is_empty());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_parse_null_optional_fields() {
        let json = r#"{
            "currency": null,
            "line_items": [
                {"date": "2024-03-02", "service": "AWS Lambda", "account": null, "region": null, "cost": 1.5}
            ]
        }"#;
        let parsed = parse(json, &march(1, 7)).unwrap();
        assert_eq!(parsed.data.currency, "USD");
        assert_eq!(parsed.data.service_costs["AWS Lambda"], 1.5);
        assert!(parsed.data.account_costs.is_empty());
        assert!(parsed.data.region_costs.is_empty());
    }

    #[test]
    fn test_blank_currency_falls_back_to_default() {
        let parsed = parse(r#"{"currency": "  "}"#, &march(1, 1)).unwrap();
        assert_eq!(parsed.data.currency, "USD");

        let parsed = parse(r#"{"currency": "EUR"}"#, &march(1, 1)).unwrap();
        assert_eq!(parsed.data.currency, "EUR");
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{"line_items": [{"date": "2024-03-02", "service": "Amazon EC2"}]}"#;
        assert!(serde_json::from_str::<CostExport>(json).is_err());
    }

    #[test]
    fn test_malformed_date_is_rejected() {
        let json = r#"{"line_items": [{"date": "03/02/2024", "service": "Amazon EC2", "cost": 1.0}]}"#;
        assert!(serde_json::from_str::<CostExport>(json).is_err());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let json = r#"{
            "export_version": 3,
            "line_items": [
                {"date": "2024-03-01", "service": "Amazon EC2", "cost": 2.0, "usage_type": "BoxUsage"}
            ]
        }"#;
        let parsed = parse(json, &march(1, 1)).unwrap();
        assert_eq!(parsed.data.total_cost, 2.0);
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    #[test]
    fn test_rows_aggregate_by_service_account_and_region() {
        let json = r#"{
            "currency": "USD",
            "line_items": [
                {"date": "2024-03-01", "service": "Amazon EC2", "account": "111", "region": "us-east-1", "cost": 10.0},
                {"date": "2024-03-02", "service": "Amazon EC2", "account": "222", "region": "us-east-1", "cost": 5.0},
                {"date": "2024-03-02", "service": "Amazon Simple Storage Service", "account": "111", "region": "eu-west-1", "cost": 2.5}
            ],
            "metadata": {"export_id": "exp-42"}
        }"#;
        let parsed = parse(json, &march(1, 7)).unwrap();
        let data = parsed.data;

        assert_eq!(data.date, day(1));
        assert_eq!(data.total_cost, 17.5);
        assert_eq!(data.services_total(), 17.5);
        assert_eq!(data.service_costs["Amazon EC2"], 15.0);
        assert_eq!(data.account_costs["111"], 12.5);
        assert_eq!(data.account_costs["222"], 5.0);
        assert_eq!(data.region_costs["us-east-1"], 15.0);
        assert_eq!(data.region_costs["eu-west-1"], 2.5);
        assert_eq!(data.metadata["export_id"], "exp-42");
    }

    #[test]
    fn test_credits_reduce_total() {
        let json = r#"{"line_items": [
            {"date": "2024-03-01", "service": "Amazon EC2", "cost": 10.0},
            {"date": "2024-03-01", "service": "Amazon EC2", "cost": -4.0}
        ]}"#;
        let parsed = parse(json, &march(1, 1)).unwrap();
        assert_eq!(parsed.data.service_costs["Amazon EC2"], 6.0);
    }

    #[test]
    fn test_service_names_are_trimmed() {
        let json = r#"{"line_items": [
            {"date": "2024-03-01", "service": " AWS Lambda ", "cost": 1.0},
            {"date": "2024-03-01", "service": "AWS Lambda", "cost": 1.0}
        ]}"#;
        let parsed = parse(json, &march(1, 1)).unwrap();
        assert_eq!(parsed.data.service_costs.len(), 1);
        assert_eq!(parsed.data.service_costs["AWS Lambda"], 2.0);
    }

    // ========================================================================
    // Skipped Rows
    // ========================================================================

    #[test]
    fn test_rows_outside_range_are_skipped_with_warning() {
        let json = r#"{"line_items": [
            {"date": "2024-02-29", "service": "Amazon EC2", "cost": 100.0},
            {"date": "2024-03-03", "service": "Amazon EC2", "cost": 1.0},
            {"date": "2024-03-08", "service": "Amazon RDS", "cost": 100.0}
        ]}"#;
        let parsed = parse(json, &march(1, 7)).unwrap();

        assert_eq!(parsed.data.total_cost, 1.0);
        assert_eq!(parsed.warnings.len(), 2);
        assert!(parsed.warnings[0].contains("2024-02-29"));
        assert!(parsed.warnings[1].contains("Amazon RDS"));
        assert!(parsed.warnings[1].contains("2024-03-01..=2024-03-07"));
    }

    #[test]
    fn test_blank_service_is_skipped_with_warning() {
        let json = r#"{"line_items": [
            {"date": "2024-03-01", "service": "   ", "cost": 3.0},
            {"date": "2024-03-01", "service": "Amazon EC2", "cost": 1.0}
        ]}"#;
        let parsed = parse(json, &march(1, 1)).unwrap();
        assert_eq!(parsed.data.total_cost, 1.0);
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("without service"));
    }

    #[test]
    fn test_non_finite_cost_rejects_export() {
        let export = CostExport {
            currency: None,
            line_items: vec![LineItem {
                date: day(1),
                service: "Amazon EC2".into(),
                account: None,
                region: None,
                cost: f64::NAN,
            }],
            metadata: Default::default(),
        };
        let err = parse_cost_export(ProviderKind::Aws, &march(1, 1), export, "USD").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(msg) if msg.contains("Amazon EC2")));
    }

    #[test]
    fn test_huge_cost_literal_fails_to_decode() {
        let json = r#"{"line_items": [{"date": "2024-03-01", "service": "Amazon EC2", "cost": 1e400}]}"#;
        assert!(serde_json::from_str::<CostExport>(json).is_err());
    }
}

#[cfg(test)]
mod inventory_edge_tests {
    use crate::billing::wire::{AccountList, CredentialCheck, ServiceList};
    use crate::registry::ProviderRegistry;
    use costwatch_core::{ProviderKind, ServiceCategory};

    #[test]
    fn test_account_name_falls_back_to_id() {
        let list: AccountList = serde_json::from_str(
            r#"{"accounts": [
                {"id": "sub-1", "name": "Production", "regions": ["westeurope"]},
                {"id": "sub-2"}
            ]}"#,
        )
        .unwrap();
        let accounts = list.into_accounts(ProviderKind::Azure);

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, "Production");
        assert_eq!(accounts[0].regions, vec!["westeurope".to_string()]);
        assert_eq!(accounts[1].name, "sub-2");
        assert!(accounts.iter().all(|a| a.provider == ProviderKind::Azure));
    }

    #[test]
    fn test_empty_lists() {
        let accounts: AccountList = serde_json::from_str("{}").unwrap();
        assert!(accounts.into_accounts(ProviderKind::Gcp).is_empty());

        let services: ServiceList = serde_json::from_str(r#"{"services": []}"#).unwrap();
        let desc = ProviderRegistry::get(ProviderKind::Gcp).unwrap();
        assert!(services.into_services(desc).is_empty());
    }

    #[test]
    fn test_services_are_categorized_by_descriptor() {
        let list: ServiceList = serde_json::from_str(
            r#"{"services": [
                {"id": "s3", "name": "Amazon Simple Storage Service"},
                {"id": "xyz", "name": "Something New"}
            ]}"#,
        )
        .unwrap();
        let desc = ProviderRegistry::get(ProviderKind::Aws).unwrap();
        let services = list.into_services(desc);

        assert_eq!(services[0].category, ServiceCategory::Storage);
        assert_eq!(services[0].id, "s3");
        assert_eq!(services[1].category, ServiceCategory::Other);
    }

    #[test]
    fn test_credential_check_conversion() {
        let ok: CredentialCheck = serde_json::from_str(
            r#"{"valid": true, "account_id": "123456789012", "permissions": ["ce:GetCostAndUsage"]}"#,
        )
        .unwrap();
        let validation = ok.into_validation(ProviderKind::Aws);
        assert!(validation.is_valid);
        assert_eq!(validation.account_id.as_deref(), Some("123456789012"));
        assert_eq!(validation.permissions, vec!["ce:GetCostAndUsage".to_string()]);

        let rejected: CredentialCheck = serde_json::from_str(r#"{"valid": false}"#).unwrap();
        let validation = rejected.into_validation(ProviderKind::Aws);
        assert!(!validation.is_valid);
        assert_eq!(validation.error_message.as_deref(), Some("credentials rejected"));
    }

    #[test]
    fn test_credential_check_requires_valid_flag() {
        assert!(serde_json::from_str::<CredentialCheck>(r#"{"message": "hi"}"#).is_err());
    }
}
