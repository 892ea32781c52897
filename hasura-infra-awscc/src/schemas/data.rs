//! Secrets Manager and RDS

use hasura_infra_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, document, document_list, string_list, tags_type};

/// AWS::SecretsManager::Secret
pub fn secretsmanager_secret_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::SecretsManager::Secret",
        resource_type_name: "secretsmanager_secret",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.secretsmanager_secret")
            .with_description("Secret whose value is generated by Secrets Manager")
            .attribute(AttributeSchema::new("name", AttributeType::String).with_provider_name("Name"))
            .attribute(
                AttributeSchema::new("description", AttributeType::String)
                    .with_provider_name("Description"),
            )
            .attribute(
                AttributeSchema::new("generate_secret_string", document())
                    .with_description(
                        "Generation policy. The value itself never leaves Secrets Manager.",
                    )
                    .with_provider_name("GenerateSecretString"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::RDS::DBSubnetGroup
pub fn rds_db_subnet_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::RDS::DBSubnetGroup",
        resource_type_name: "rds_db_subnet_group",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.rds_db_subnet_group")
            .attribute(
                AttributeSchema::new("db_subnet_group_name", AttributeType::String)
                    .with_description("Stored lowercase by RDS.")
                    .with_provider_name("DBSubnetGroupName"),
            )
            .attribute(
                AttributeSchema::new("db_subnet_group_description", AttributeType::String)
                    .required()
                    .with_provider_name("DBSubnetGroupDescription"),
            )
            .attribute(
                AttributeSchema::new("subnet_ids", string_list())
                    .required()
                    .with_provider_name("SubnetIds"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::RDS::DBInstance
pub fn rds_db_instance_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::RDS::DBInstance",
        resource_type_name: "rds_db_instance",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.rds_db_instance")
            .with_description("PostgreSQL instance; credentials come from a generated secret")
            .attribute(
                AttributeSchema::new("db_instance_identifier", AttributeType::String)
                    .with_provider_name("DBInstanceIdentifier"),
            )
            .attribute(AttributeSchema::new("db_name", AttributeType::String).with_provider_name("DBName"))
            .attribute(
                AttributeSchema::new("engine", AttributeType::String)
                    .required()
                    .with_provider_name("Engine"),
            )
            .attribute(
                AttributeSchema::new("engine_version", AttributeType::String)
                    .with_provider_name("EngineVersion"),
            )
            .attribute(
                AttributeSchema::new("db_instance_class", AttributeType::String)
                    .required()
                    .with_provider_name("DBInstanceClass"),
            )
            .attribute(
                AttributeSchema::new("allocated_storage", types::positive_int())
                    .with_description("Storage in GiB. Sent to the engine as a string.")
                    .with_provider_name("AllocatedStorage"),
            )
            .attribute(
                AttributeSchema::new("auto_minor_version_upgrade", AttributeType::Bool)
                    .with_provider_name("AutoMinorVersionUpgrade"),
            )
            .attribute(
                AttributeSchema::new("publicly_accessible", AttributeType::Bool)
                    .with_provider_name("PubliclyAccessible"),
            )
            .attribute(
                AttributeSchema::new("db_subnet_group_name", AttributeType::String)
                    .with_provider_name("DBSubnetGroupName"),
            )
            .attribute(
                AttributeSchema::new("vpc_security_groups", string_list())
                    .with_provider_name("VPCSecurityGroups"),
            )
            .attribute(
                AttributeSchema::new("master_user_secret_arn", AttributeType::String)
                    .required()
                    .with_description(
                        "Secret holding username and password; passed to the engine as \
                         dynamic references.",
                    ),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::RDS::DBProxy
pub fn rds_db_proxy_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::RDS::DBProxy",
        resource_type_name: "rds_db_proxy",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.rds_db_proxy")
            .attribute(
                AttributeSchema::new("db_proxy_name", AttributeType::String)
                    .required()
                    .with_provider_name("DBProxyName"),
            )
            .attribute(
                AttributeSchema::new(
                    "engine_family",
                    AttributeType::Enum(vec![
                        "MYSQL".to_string(),
                        "POSTGRESQL".to_string(),
                        "SQLSERVER".to_string(),
                    ]),
                )
                .required()
                .with_provider_name("EngineFamily"),
            )
            .attribute(
                AttributeSchema::new("auth", document_list())
                    .required()
                    .with_provider_name("Auth"),
            )
            .attribute(
                AttributeSchema::new("role_arn", AttributeType::String)
                    .required()
                    .with_description("Role the proxy assumes to read the secret.")
                    .with_provider_name("RoleArn"),
            )
            .attribute(
                AttributeSchema::new("vpc_subnet_ids", string_list())
                    .required()
                    .with_provider_name("VpcSubnetIds"),
            )
            .attribute(
                AttributeSchema::new("vpc_security_group_ids", string_list())
                    .with_provider_name("VpcSecurityGroupIds"),
            )
            .attribute(
                AttributeSchema::new("debug_logging", AttributeType::Bool)
                    .with_provider_name("DebugLogging"),
            )
            .attribute(
                AttributeSchema::new("require_tls", AttributeType::Bool)
                    .with_provider_name("RequireTLS"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::RDS::DBProxyTargetGroup
pub fn rds_db_proxy_target_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::RDS::DBProxyTargetGroup",
        resource_type_name: "rds_db_proxy_target_group",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.rds_db_proxy_target_group")
            .attribute(
                AttributeSchema::new("db_proxy_name", AttributeType::String)
                    .required()
                    .with_provider_name("DBProxyName"),
            )
            .attribute(
                AttributeSchema::new(
                    "target_group_name",
                    AttributeType::Enum(vec!["default".to_string()]),
                )
                .required()
                .with_provider_name("TargetGroupName"),
            )
            .attribute(
                AttributeSchema::new("db_instance_identifiers", string_list())
                    .with_provider_name("DBInstanceIdentifiers"),
            ),
    }
}

pub fn configs() -> Vec<AwsccSchemaConfig> {
    vec![
        secretsmanager_secret_config(),
        rds_db_subnet_group_config(),
        rds_db_instance_config(),
        rds_db_proxy_config(),
        rds_db_proxy_target_group_config(),
    ]
}
