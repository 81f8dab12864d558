//! Google Cloud provider descriptor.

use costwatch_core::{DEFAULT_CURRENCY, ProviderKind, ServiceCategory};

use crate::descriptor::{BillingConfig, CliConfig, ProviderDescriptor, ProviderMetadata};

/// Creates the Google Cloud provider descriptor.
pub fn gcp_descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: ProviderKind::Gcp,
        metadata: ProviderMetadata {
            display_name: "Google Cloud",
            console_url: Some("https://console.cloud.google.com/billing"),
            status_page_url: Some("https://status.cloud.google.com"),
        },
        billing: BillingConfig {
            default_currency: DEFAULT_CURRENCY,
            regions: REGIONS,
        },
        services: SERVICES,
        cli: CliConfig {
            name: "gcp",
            aliases: &["google", "gcloud"],
        },
    }
}

const REGIONS: &[&str] = &[
    "us-central1",
    "us-east1",
    "us-west1",
    "europe-west1",
    "europe-west4",
    "asia-east1",
    "asia-northeast1",
];

/// Service descriptions as the BigQuery billing export reports them.
const SERVICES: &[(&str, ServiceCategory)] = &[
    ("Compute Engine", ServiceCategory::Compute),
    ("Kubernetes Engine", ServiceCategory::Compute),
    ("Cloud Run", ServiceCategory::Compute),
    ("Cloud Functions", ServiceCategory::Compute),
    ("Cloud Storage", ServiceCategory::Storage),
    ("Cloud SQL", ServiceCategory::Database),
    ("Cloud Spanner", ServiceCategory::Database),
    ("Firestore", ServiceCategory::Database),
    ("Networking", ServiceCategory::Networking),
    ("Cloud CDN", ServiceCategory::Networking),
    ("Cloud DNS", ServiceCategory::Networking),
    ("BigQuery", ServiceCategory::Analytics),
    ("Dataflow", ServiceCategory::Analytics),
    ("Vertex AI", ServiceCategory::MachineLearning),
    ("Cloud Key Management Service (KMS)", ServiceCategory::Security),
    ("Secret Manager", ServiceCategory::Security),
    ("Cloud Monitoring", ServiceCategory::Management),
    ("Cloud Logging", ServiceCategory::Management),
];
