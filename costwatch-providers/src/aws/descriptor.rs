//! AWS provider descriptor.

use costwatch_core::{DEFAULT_CURRENCY, ProviderKind, ServiceCategory};

use crate::descriptor::{BillingConfig, CliConfig, ProviderDescriptor, ProviderMetadata};

/// Creates the AWS provider descriptor.
pub fn aws_descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: ProviderKind::Aws,
        metadata: ProviderMetadata {
            display_name: "AWS",
            console_url: Some("https://console.aws.amazon.com/cost-management/home"),
            status_page_url: Some("https://health.aws.amazon.com/health/status"),
        },
        billing: BillingConfig {
            default_currency: DEFAULT_CURRENCY,
            regions: REGIONS,
        },
        services: SERVICES,
        cli: CliConfig {
            name: "aws",
            aliases: &["amazon"],
        },
    }
}

const REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-northeast-1",
];

/// Service names as Cost Explorer reports them.
const SERVICES: &[(&str, ServiceCategory)] = &[
    ("Amazon Elastic Compute Cloud - Compute", ServiceCategory::Compute),
    ("EC2 - Other", ServiceCategory::Compute),
    ("AWS Lambda", ServiceCategory::Compute),
    ("Amazon Elastic Container Service", ServiceCategory::Compute),
    ("Amazon Elastic Kubernetes Service", ServiceCategory::Compute),
    ("Amazon Simple Storage Service", ServiceCategory::Storage),
    ("Amazon Elastic File System", ServiceCategory::Storage),
    ("Amazon Relational Database Service", ServiceCategory::Database),
    ("Amazon DynamoDB", ServiceCategory::Database),
    ("Amazon ElastiCache", ServiceCategory::Database),
    ("Amazon CloudFront", ServiceCategory::Networking),
    ("Amazon Virtual Private Cloud", ServiceCategory::Networking),
    ("Amazon Route 53", ServiceCategory::Networking),
    ("Elastic Load Balancing", ServiceCategory::Networking),
    ("Amazon Redshift", ServiceCategory::Analytics),
    ("Amazon Athena", ServiceCategory::Analytics),
    ("AWS Glue", ServiceCategory::Analytics),
    ("Amazon SageMaker", ServiceCategory::MachineLearning),
    ("Amazon Bedrock", ServiceCategory::MachineLearning),
    ("AWS Key Management Service", ServiceCategory::Security),
    ("Amazon GuardDuty", ServiceCategory::Security),
    ("AWS WAF", ServiceCategory::Security),
    ("AmazonCloudWatch", ServiceCategory::Management),
    ("AWS CloudTrail", ServiceCategory::Management),
    ("AWS Config", ServiceCategory::Management),
];
