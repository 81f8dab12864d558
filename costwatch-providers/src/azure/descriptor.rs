//! Azure provider descriptor.

use costwatch_core::{DEFAULT_CURRENCY, ProviderKind, ServiceCategory};

use crate::descriptor::{BillingConfig, CliConfig, ProviderDescriptor, ProviderMetadata};

/// Creates the Azure provider descriptor.
pub fn azure_descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: ProviderKind::Azure,
        metadata: ProviderMetadata {
            display_name: "Azure",
            console_url: Some("https://portal.azure.com/#view/Microsoft_Azure_CostManagement"),
            status_page_url: Some("https://azure.status.microsoft/en-us/status"),
        },
        billing: BillingConfig {
            default_currency: DEFAULT_CURRENCY,
            regions: REGIONS,
        },
        services: SERVICES,
        cli: CliConfig {
            name: "azure",
            aliases: &["microsoft", "az"],
        },
    }
}

const REGIONS: &[&str] = &[
    "eastus",
    "eastus2",
    "westus2",
    "centralus",
    "northeurope",
    "westeurope",
    "southeastasia",
    "japaneast",
];

/// Meter categories as Cost Management reports them.
const SERVICES: &[(&str, ServiceCategory)] = &[
    ("Virtual Machines", ServiceCategory::Compute),
    ("Azure App Service", ServiceCategory::Compute),
    ("Functions", ServiceCategory::Compute),
    ("Azure Kubernetes Service", ServiceCategory::Compute),
    ("Storage", ServiceCategory::Storage),
    ("SQL Database", ServiceCategory::Database),
    ("Azure Cosmos DB", ServiceCategory::Database),
    ("Azure Database for PostgreSQL", ServiceCategory::Database),
    ("Bandwidth", ServiceCategory::Networking),
    ("Virtual Network", ServiceCategory::Networking),
    ("Load Balancer", ServiceCategory::Networking),
    ("Azure DNS", ServiceCategory::Networking),
    ("Azure Synapse Analytics", ServiceCategory::Analytics),
    ("Azure Data Factory v2", ServiceCategory::Analytics),
    ("Azure Machine Learning", ServiceCategory::MachineLearning),
    ("Cognitive Services", ServiceCategory::MachineLearning),
    ("Key Vault", ServiceCategory::Security),
    ("Microsoft Defender for Cloud", ServiceCategory::Security),
    ("Azure Monitor", ServiceCategory::Management),
    ("Log Analytics", ServiceCategory::Management),
];
