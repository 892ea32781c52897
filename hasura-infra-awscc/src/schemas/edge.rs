//! Load balancing, certificates and DNS

use hasura_infra_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, document, document_list, string_list, tags_type};

fn http_protocol() -> AttributeType {
    AttributeType::Enum(vec!["HTTP".to_string(), "HTTPS".to_string()])
}

/// AWS::ElasticLoadBalancingV2::LoadBalancer
pub fn elbv2_load_balancer_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::LoadBalancer",
        resource_type_name: "elbv2_load_balancer",
        has_tags: true,
        outputs: &[
            ("dns_name", "DNSName"),
            ("canonical_hosted_zone_id", "CanonicalHostedZoneID"),
        ],
        schema: ResourceSchema::new("awscc.elbv2_load_balancer")
            .with_description("Internet-facing application load balancer")
            .attribute(AttributeSchema::new("name", AttributeType::String).with_provider_name("Name"))
            .attribute(
                AttributeSchema::new(
                    "scheme",
                    AttributeType::Enum(vec![
                        "internet-facing".to_string(),
                        "internal".to_string(),
                    ]),
                )
                .with_provider_name("Scheme"),
            )
            .attribute(
                AttributeSchema::new(
                    "type",
                    AttributeType::Enum(vec![
                        "application".to_string(),
                        "network".to_string(),
                        "gateway".to_string(),
                    ]),
                )
                .with_provider_name("Type"),
            )
            .attribute(
                AttributeSchema::new("subnets", string_list())
                    .required()
                    .with_provider_name("Subnets"),
            )
            .attribute(
                AttributeSchema::new("security_groups", string_list())
                    .with_provider_name("SecurityGroups"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::ElasticLoadBalancingV2::TargetGroup
pub fn elbv2_target_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::TargetGroup",
        resource_type_name: "elbv2_target_group",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.elbv2_target_group")
            .attribute(AttributeSchema::new("name", AttributeType::String).with_provider_name("Name"))
            .attribute(AttributeSchema::new("port", types::port()).with_provider_name("Port"))
            .attribute(AttributeSchema::new("protocol", http_protocol()).with_provider_name("Protocol"))
            .attribute(
                AttributeSchema::new(
                    "target_type",
                    AttributeType::Enum(vec![
                        "instance".to_string(),
                        "ip".to_string(),
                        "lambda".to_string(),
                    ]),
                )
                .with_provider_name("TargetType"),
            )
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).with_provider_name("VpcId"))
            .attribute(
                AttributeSchema::new("health_check_enabled", AttributeType::Bool)
                    .with_provider_name("HealthCheckEnabled"),
            )
            .attribute(
                AttributeSchema::new("health_check_path", AttributeType::String)
                    .with_provider_name("HealthCheckPath"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::ElasticLoadBalancingV2::Listener
pub fn elbv2_listener_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::Listener",
        resource_type_name: "elbv2_listener",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.elbv2_listener")
            .attribute(
                AttributeSchema::new("load_balancer_arn", AttributeType::String)
                    .required()
                    .with_provider_name("LoadBalancerArn"),
            )
            .attribute(AttributeSchema::new("port", types::port()).with_provider_name("Port"))
            .attribute(AttributeSchema::new("protocol", http_protocol()).with_provider_name("Protocol"))
            .attribute(
                AttributeSchema::new("certificates", document_list())
                    .with_description("Required for HTTPS listeners.")
                    .with_provider_name("Certificates"),
            )
            .attribute(
                AttributeSchema::new("default_actions", document_list())
                    .required()
                    .with_provider_name("DefaultActions"),
            ),
    }
}

/// AWS::CertificateManager::Certificate
pub fn acm_certificate_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::CertificateManager::Certificate",
        resource_type_name: "acm_certificate",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.acm_certificate")
            .with_description("DNS-validated certificate for the API hostname")
            .attribute(
                AttributeSchema::new("domain_name", AttributeType::String)
                    .required()
                    .with_provider_name("DomainName"),
            )
            .attribute(
                AttributeSchema::new(
                    "validation_method",
                    AttributeType::Enum(vec!["DNS".to_string(), "EMAIL".to_string()]),
                )
                .with_provider_name("ValidationMethod"),
            )
            .attribute(
                AttributeSchema::new("domain_validation_options", document_list())
                    .with_description("Hosted zone the validation records are written to.")
                    .with_provider_name("DomainValidationOptions"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::Route53::HostedZone, looked up only
pub fn route53_hosted_zone_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::Route53::HostedZone",
        resource_type_name: "route53_hosted_zone",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.route53_hosted_zone").attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("Zone apex, without the trailing dot.")
                .with_provider_name("Name"),
        ),
    }
}

/// AWS::Route53::RecordSet
pub fn route53_record_set_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::Route53::RecordSet",
        resource_type_name: "route53_record_set",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.route53_record_set")
            .attribute(
                AttributeSchema::new("hosted_zone_id", AttributeType::String)
                    .required()
                    .with_provider_name("HostedZoneId"),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .with_provider_name("Name"),
            )
            .attribute(
                AttributeSchema::new(
                    "type",
                    AttributeType::Enum(vec![
                        "A".to_string(),
                        "AAAA".to_string(),
                        "CNAME".to_string(),
                    ]),
                )
                .required()
                .with_provider_name("Type"),
            )
            .attribute(
                AttributeSchema::new("alias_target", document())
                    .with_provider_name("AliasTarget"),
            ),
    }
}

pub fn configs() -> Vec<AwsccSchemaConfig> {
    vec![
        elbv2_load_balancer_config(),
        elbv2_target_group_config(),
        elbv2_listener_config(),
        acm_certificate_config(),
        route53_hosted_zone_config(),
        route53_record_set_config(),
    ]
}
