//! Naming - Deterministic identities for deployed resources
//!
//! Every name derives from the environment and project so that several
//! deployments can share one account without colliding.

/// `{project}-{environment}-{role}`
pub fn name(role: &str, environment: &str, project: &str) -> String {
    format!("{}-{}-{}", project, environment, role)
}

/// Database name inside the PostgreSQL instance: `{project}_{environment}`
pub fn database_name(environment: &str, project: &str) -> String {
    format!("{}_{}", project, environment)
}

/// Database instance identifier: `{project}-{environment}`
pub fn instance_identifier(environment: &str, project: &str) -> String {
    format!("{}-{}", project, environment)
}

/// Name of a deployment unit, e.g. `hasura-dev-network`
pub fn stack_name(unit: &str, environment: &str, project: &str) -> String {
    name(unit, environment, project)
}

pub fn fqdn(subdomain: &str, domain: &str) -> String {
    format!("{}.{}", subdomain, domain.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prefixed_by_project_and_environment() {
        assert_eq!(name("bastion-host", "dev", "hasura"), "hasura-dev-bastion-host");
        assert_eq!(name("proxy", "prod", "shop"), "shop-prod-proxy");
    }

    #[test]
    fn database_identifiers() {
        assert_eq!(database_name("dev", "hasura"), "hasura_dev");
        assert_eq!(instance_identifier("dev", "hasura"), "hasura-dev");
    }

    #[test]
    fn fqdn_joins_labels() {
        assert_eq!(fqdn("api", "example.com"), "api.example.com");
        assert_eq!(fqdn("api", "example.com."), "api.example.com");
        assert_eq!(stack_name("network", "dev", "hasura"), "hasura-dev-network");
    }
}
