use hasura_infra_awscc::schemas;
use hasura_infra_core::resource::Resource;
use hasura_infra_stacks::{ConfigBuilder, Topology, Unit};

fn declarations() -> Vec<Resource> {
    let config = ConfigBuilder::new()
        .environment(Some("prod".to_string()))
        .jwt_secret_arn(Some(
            "arn:aws:secretsmanager:us-east-1:123456789012:secret:jwt-AbCdEf".to_string(),
        ))
        .db_secret_arn(Some(
            "arn:aws:secretsmanager:us-east-1:123456789012:secret:db-AbCdEf".to_string(),
        ))
        .domain_name(Some("example.com".to_string()))
        .subdomain_name(Some("api".to_string()))
        .build()
        .unwrap();
    let topology = Topology::build(&config).unwrap();

    Unit::all()
        .into_iter()
        .flat_map(|unit| topology.resources(unit).to_vec())
        .collect()
}

#[test]
fn every_declaration_passes_its_schema() {
    for resource in declarations() {
        if let Err(errors) = schemas::validate(&resource) {
            panic!("{} failed validation: {:?}", resource.id, errors);
        }
    }
}

#[test]
fn no_declared_attribute_is_silently_dropped() {
    for resource in declarations().iter().filter(|r| !r.is_data_source()) {
        let config = schemas::get(&resource.id.resource_type).unwrap();
        for (name, _) in resource.provider_attributes() {
            assert!(
                config.schema.attributes.contains_key(name),
                "{} declares {} which its schema does not map",
                resource.id,
                name
            );
        }
    }
}

#[test]
fn tagged_declarations_use_taggable_types() {
    for resource in declarations() {
        if resource.attributes.contains_key("tags") {
            let config = schemas::get(&resource.id.resource_type).unwrap();
            assert!(config.has_tags, "{} is tagged but its type is not", resource.id);
        }
    }
}

#[test]
fn referenced_outputs_are_exposed() {
    let declarations = declarations();
    for resource in &declarations {
        for (_, value) in resource.provider_attributes() {
            let mut refs = Vec::new();
            value.collect_refs(&mut refs);
            for (binding, attr) in refs {
                if attr == "id" {
                    continue;
                }
                let target = declarations
                    .iter()
                    .find(|r| r.binding() == binding)
                    .unwrap_or_else(|| panic!("{} references unknown {}", resource.id, binding));
                let config = schemas::get(&target.id.resource_type).unwrap();
                assert!(
                    config.outputs.iter().any(|(a, _)| *a == attr)
                        || target.attributes.contains_key(attr),
                    "{} references {}.{} which is never produced",
                    resource.id,
                    binding,
                    attr
                );
            }
        }
    }
}
