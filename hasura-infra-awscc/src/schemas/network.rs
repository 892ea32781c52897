//! EC2 networking: VPC, subnets, routing, NAT and security groups

use hasura_infra_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, document_list, string_list, tags_type};

fn protocol() -> AttributeType {
    AttributeType::Enum(vec![
        "tcp".to_string(),
        "udp".to_string(),
        "icmp".to_string(),
        "-1".to_string(),
    ])
}

/// AWS::EC2::VPC
pub fn ec2_vpc_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::VPC",
        resource_type_name: "ec2_vpc",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_vpc")
            .with_description("Virtual private cloud holding every other network resource")
            .attribute(
                AttributeSchema::new("cidr_block", types::cidr())
                    .required()
                    .with_description("The IPv4 network range for the VPC, in CIDR notation.")
                    .with_provider_name("CidrBlock"),
            )
            .attribute(
                AttributeSchema::new("enable_dns_support", AttributeType::Bool)
                    .with_provider_name("EnableDnsSupport"),
            )
            .attribute(
                AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool)
                    .with_description("Required for private DNS on interface endpoints.")
                    .with_provider_name("EnableDnsHostnames"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::InternetGateway
pub fn ec2_internet_gateway_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::InternetGateway",
        resource_type_name: "ec2_internet_gateway",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_internet_gateway")
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::VPCGatewayAttachment
pub fn ec2_vpc_gateway_attachment_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::VPCGatewayAttachment",
        resource_type_name: "ec2_vpc_gateway_attachment",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_vpc_gateway_attachment")
            .attribute(
                AttributeSchema::new("vpc_id", AttributeType::String)
                    .required()
                    .with_provider_name("VpcId"),
            )
            .attribute(
                AttributeSchema::new("internet_gateway_id", AttributeType::String)
                    .required()
                    .with_provider_name("InternetGatewayId"),
            ),
    }
}

/// AWS::EC2::Subnet
pub fn ec2_subnet_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::Subnet",
        resource_type_name: "ec2_subnet",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_subnet")
            .with_description("Subnet in one availability zone of the VPC")
            .attribute(
                AttributeSchema::new("vpc_id", AttributeType::String)
                    .required()
                    .with_provider_name("VpcId"),
            )
            .attribute(
                AttributeSchema::new("cidr_block", types::cidr())
                    .required()
                    .with_provider_name("CidrBlock"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .with_description("The Availability Zone of the subnet (e.g. us-east-1a).")
                    .with_provider_name("AvailabilityZone"),
            )
            .attribute(
                AttributeSchema::new("map_public_ip_on_launch", AttributeType::Bool)
                    .with_description("Instances launched here receive a public IPv4 address.")
                    .with_provider_name("MapPublicIpOnLaunch"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::RouteTable
pub fn ec2_route_table_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::RouteTable",
        resource_type_name: "ec2_route_table",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_route_table")
            .attribute(
                AttributeSchema::new("vpc_id", AttributeType::String)
                    .required()
                    .with_provider_name("VpcId"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::Route
pub fn ec2_route_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::Route",
        resource_type_name: "ec2_route",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_route")
            .with_description("Route to an internet or NAT gateway")
            .attribute(
                AttributeSchema::new("route_table_id", AttributeType::String)
                    .required()
                    .with_provider_name("RouteTableId"),
            )
            .attribute(
                AttributeSchema::new("destination_cidr_block", types::cidr())
                    .required()
                    .with_provider_name("DestinationCidrBlock"),
            )
            .attribute(
                AttributeSchema::new("gateway_id", AttributeType::String)
                    .with_provider_name("GatewayId"),
            )
            .attribute(
                AttributeSchema::new("nat_gateway_id", AttributeType::String)
                    .with_provider_name("NatGatewayId"),
            ),
    }
}

/// AWS::EC2::SubnetRouteTableAssociation
pub fn ec2_subnet_route_table_association_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SubnetRouteTableAssociation",
        resource_type_name: "ec2_subnet_route_table_association",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_subnet_route_table_association")
            .attribute(
                AttributeSchema::new("route_table_id", AttributeType::String)
                    .required()
                    .with_provider_name("RouteTableId"),
            )
            .attribute(
                AttributeSchema::new("subnet_id", AttributeType::String)
                    .required()
                    .with_provider_name("SubnetId"),
            ),
    }
}

/// AWS::EC2::EIP
pub fn ec2_eip_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::EIP",
        resource_type_name: "ec2_eip",
        has_tags: true,
        outputs: &[("allocation_id", "AllocationId")],
        schema: ResourceSchema::new("awscc.ec2_eip")
            .attribute(
                AttributeSchema::new(
                    "domain",
                    AttributeType::Enum(vec!["vpc".to_string(), "standard".to_string()]),
                )
                .with_provider_name("Domain"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::NatGateway
pub fn ec2_nat_gateway_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::NatGateway",
        resource_type_name: "ec2_nat_gateway",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_nat_gateway")
            .with_description("Public NAT gateway giving a private subnet outbound access")
            .attribute(
                AttributeSchema::new("subnet_id", AttributeType::String)
                    .required()
                    .with_description("The public subnet the NAT gateway lives in.")
                    .with_provider_name("SubnetId"),
            )
            .attribute(
                AttributeSchema::new("allocation_id", AttributeType::String)
                    .required()
                    .with_description("Allocation ID of the Elastic IP address.")
                    .with_provider_name("AllocationId"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::SecurityGroup
pub fn ec2_security_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SecurityGroup",
        resource_type_name: "ec2_security_group",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_security_group")
            .with_description("Network boundary; ingress rules are separate resources")
            .attribute(
                AttributeSchema::new("group_name", AttributeType::String)
                    .with_provider_name("GroupName"),
            )
            .attribute(
                AttributeSchema::new("group_description", AttributeType::String)
                    .required()
                    .with_provider_name("GroupDescription"),
            )
            .attribute(
                AttributeSchema::new("vpc_id", AttributeType::String)
                    .required()
                    .with_provider_name("VpcId"),
            )
            .attribute(
                AttributeSchema::new("security_group_egress", document_list())
                    .with_description(
                        "Outbound rules. When omitted, all outbound traffic is allowed.",
                    )
                    .with_provider_name("SecurityGroupEgress"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::SecurityGroupIngress
pub fn ec2_security_group_ingress_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SecurityGroupIngress",
        resource_type_name: "ec2_security_group_ingress",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_security_group_ingress")
            .with_description("One inbound rule of a security group")
            .attribute(
                AttributeSchema::new("group_id", AttributeType::String)
                    .required()
                    .with_provider_name("GroupId"),
            )
            .attribute(
                AttributeSchema::new("ip_protocol", protocol())
                    .required()
                    .with_provider_name("IpProtocol"),
            )
            .attribute(
                AttributeSchema::new("from_port", types::port()).with_provider_name("FromPort"),
            )
            .attribute(AttributeSchema::new("to_port", types::port()).with_provider_name("ToPort"))
            .attribute(AttributeSchema::new("cidr_ip", types::cidr()).with_provider_name("CidrIp"))
            .attribute(
                AttributeSchema::new("source_security_group_id", AttributeType::String)
                    .with_description("Security group whose members may connect.")
                    .with_provider_name("SourceSecurityGroupId"),
            )
            .attribute(
                AttributeSchema::new("description", AttributeType::String)
                    .with_provider_name("Description"),
            ),
    }
}

/// AWS::EC2::VPCEndpoint
pub fn ec2_vpc_endpoint_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::VPCEndpoint",
        resource_type_name: "ec2_vpc_endpoint",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_vpc_endpoint")
            .attribute(
                AttributeSchema::new("vpc_id", AttributeType::String)
                    .required()
                    .with_provider_name("VpcId"),
            )
            .attribute(
                AttributeSchema::new("service_name", AttributeType::String)
                    .required()
                    .with_description("e.g. com.amazonaws.us-east-1.secretsmanager")
                    .with_provider_name("ServiceName"),
            )
            .attribute(
                AttributeSchema::new(
                    "vpc_endpoint_type",
                    AttributeType::Enum(vec![
                        "Interface".to_string(),
                        "Gateway".to_string(),
                        "GatewayLoadBalancer".to_string(),
                    ]),
                )
                .with_provider_name("VpcEndpointType"),
            )
            .attribute(
                AttributeSchema::new("private_dns_enabled", AttributeType::Bool)
                    .with_provider_name("PrivateDnsEnabled"),
            )
            .attribute(
                AttributeSchema::new("subnet_ids", string_list()).with_provider_name("SubnetIds"),
            )
            .attribute(
                AttributeSchema::new("security_group_ids", string_list())
                    .with_provider_name("SecurityGroupIds"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

pub fn configs() -> Vec<AwsccSchemaConfig> {
    vec![
        ec2_vpc_config(),
        ec2_internet_gateway_config(),
        ec2_vpc_gateway_attachment_config(),
        ec2_subnet_config(),
        ec2_route_table_config(),
        ec2_route_config(),
        ec2_subnet_route_table_association_config(),
        ec2_eip_config(),
        ec2_nat_gateway_config(),
        ec2_security_group_config(),
        ec2_security_group_ingress_config(),
        ec2_vpc_endpoint_config(),
    ]
}
