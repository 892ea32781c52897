//! Public ingress chain
//!
//! Internet-facing load balancer with a redirect-only HTTP listener, a TLS
//! listener forwarding to the health-checked target group, the certificate
//! and the DNS alias record. [`IngressChain`] models how the declared
//! listeners route a request.

use std::collections::BTreeMap;

use hasura_infra_core::resource::{Resource, Value};
use url::Url;

use crate::config::{LOAD_BALANCER_ROLE, TARGET_GROUP_ROLE};
use crate::network::{ANYWHERE, RuleSource, TrustBoundary};
use crate::service::CONTAINER_PORT;
use crate::stack::{Handle, Stack};

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;
pub const HEALTH_CHECK_PATH: &str = "/healthz";

/// Boundaries of the ingress path
#[derive(Debug, Clone)]
pub struct IngressBoundaries {
    pub load_balancer: TrustBoundary,
    pub service_instance: TrustBoundary,
}

/// Declare the load-balancer and service-instance boundaries with their rules
///
/// Service instances only accept traffic from the load balancer.
pub fn declare_boundaries(
    stack: &mut Stack<'_>,
    vpc: &Handle,
) -> Result<IngressBoundaries, crate::error::BuildError> {
    let mut load_balancer = TrustBoundary::declare(
        stack,
        vpc,
        "lb-security-group",
        "Public access to the load balancer",
        true,
    );
    load_balancer.allow_tcp(RuleSource::Cidr(ANYWHERE.to_string()), HTTP_PORT);
    load_balancer.allow_tcp(RuleSource::Cidr(ANYWHERE.to_string()), HTTPS_PORT);
    load_balancer.emit_rules(stack)?;

    let mut service_instance = TrustBoundary::declare(
        stack,
        vpc,
        "service-instance-security-group",
        "Load balancer access to the container hosts",
        true,
    );
    service_instance.allow_tcp(
        RuleSource::Boundary(load_balancer.handle().clone()),
        CONTAINER_PORT,
    );
    service_instance.emit_rules(stack)?;

    Ok(IngressBoundaries {
        load_balancer,
        service_instance,
    })
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub load_balancer: Handle,
    pub zone: Handle,
    pub certificate: Handle,
    pub target_group: Handle,
    pub http_listener: Handle,
    pub https_listener: Handle,
}

/// Declare the load balancer, certificate, target group and both listeners
pub fn declare_load_balancer(
    stack: &mut Stack<'_>,
    vpc: &Handle,
    public_subnets: &[Handle],
    boundary: &TrustBoundary,
) -> LoadBalancer {
    let config = stack.config();
    let fqdn = config.fqdn();

    let lb_name = config.name(LOAD_BALANCER_ROLE);
    let load_balancer = stack.declare(
        Resource::new("elbv2_load_balancer", lb_name.as_str())
            .with_attribute("name", Value::string(lb_name.as_str()))
            .with_attribute("scheme", Value::string("internet-facing"))
            .with_attribute("type", Value::string("application"))
            .with_attribute(
                "subnets",
                Value::List(public_subnets.iter().map(Handle::id).collect()),
            )
            .with_attribute("security_groups", Value::List(vec![boundary.handle().id()])),
    );

    let zone = stack.declare(
        Resource::new("route53_hosted_zone", config.name("zone"))
            .with_attribute("name", Value::string(config.domain_name.as_str()))
            .with_read_only(true),
    );

    let certificate = stack.declare(
        Resource::new("acm_certificate", config.name("certificate"))
            .with_attribute("domain_name", Value::string(fqdn.as_str()))
            .with_attribute("validation_method", Value::string("DNS"))
            .with_attribute(
                "domain_validation_options",
                Value::List(vec![Value::map([
                    ("domain_name", Value::string(fqdn.as_str())),
                    ("hosted_zone_id", zone.id()),
                ])]),
            ),
    );

    let target_group = stack.declare(
        Resource::new("elbv2_target_group", config.name(TARGET_GROUP_ROLE))
            .with_attribute("name", Value::string(config.name(TARGET_GROUP_ROLE)))
            .with_attribute("port", Value::Int(i64::from(CONTAINER_PORT)))
            .with_attribute("protocol", Value::string("HTTP"))
            .with_attribute("target_type", Value::string("instance"))
            .with_attribute("vpc_id", vpc.id())
            .with_attribute("health_check_enabled", Value::Bool(true))
            .with_attribute("health_check_path", Value::string(HEALTH_CHECK_PATH)),
    );

    let http_listener = stack.declare(
        Resource::new("elbv2_listener", config.name("lb-listener"))
            .with_attribute("load_balancer_arn", load_balancer.id())
            .with_attribute("port", Value::Int(i64::from(HTTP_PORT)))
            .with_attribute("protocol", Value::string("HTTP"))
            .with_attribute(
                "default_actions",
                Value::List(vec![Value::map([
                    ("type", Value::string("redirect")),
                    (
                        "redirect_config",
                        Value::map([
                            ("protocol", Value::string("HTTPS")),
                            ("port", Value::string(HTTPS_PORT.to_string())),
                            ("host", Value::string("#{host}")),
                            ("path", Value::string("/#{path}")),
                            ("query", Value::string("#{query}")),
                            ("status_code", Value::string("HTTP_301")),
                        ]),
                    ),
                ])]),
            ),
    );

    let https_listener = stack.declare(
        Resource::new("elbv2_listener", config.name("lb-listener2"))
            .with_attribute("load_balancer_arn", load_balancer.id())
            .with_attribute("port", Value::Int(i64::from(HTTPS_PORT)))
            .with_attribute("protocol", Value::string("HTTPS"))
            .with_attribute(
                "certificates",
                Value::List(vec![Value::map([("certificate_arn", certificate.id())])]),
            )
            .with_attribute(
                "default_actions",
                Value::List(vec![Value::map([
                    ("type", Value::string("forward")),
                    ("target_group_arn", target_group.id()),
                ])]),
            ),
    );

    LoadBalancer {
        load_balancer,
        zone,
        certificate,
        target_group,
        http_listener,
        https_listener,
    }
}

/// Declare the DNS alias record pointing at the load balancer
pub fn declare_alias_record(stack: &mut Stack<'_>, lb: &LoadBalancer) -> Handle {
    let config = stack.config();
    stack.declare(
        Resource::new("route53_record_set", config.name("alias-record"))
            .with_attribute("hosted_zone_id", lb.zone.id())
            .with_attribute("name", Value::string(config.fqdn()))
            .with_attribute("type", Value::string("A"))
            .with_attribute(
                "alias_target",
                Value::map([
                    ("dns_name", lb.load_balancer.attr("dns_name")),
                    (
                        "hosted_zone_id",
                        lb.load_balancer.attr("canonical_hosted_zone_id"),
                    ),
                ]),
            ),
    )
}

/// Action of a listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerAction {
    Redirect {
        protocol: String,
        port: String,
        host: String,
        path: String,
        query: String,
        permanent: bool,
    },
    Forward {
        /// Binding of the target group
        target_group: String,
        port: u16,
        health_check_path: Option<String>,
    },
}

/// Outcome of routing a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Redirect(String),
    Forward {
        target_group: String,
        port: u16,
        path: String,
    },
    Unrouted,
}

/// Routing model derived from the declared listeners
#[derive(Debug, Clone, Default)]
pub struct IngressChain {
    listeners: BTreeMap<u16, Vec<ListenerAction>>,
}

fn field<'a>(map: &'a std::collections::HashMap<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

impl IngressChain {
    /// Read listener and target group declarations
    pub fn from_resources(resources: &[Resource]) -> Self {
        let target_groups: BTreeMap<&str, &Resource> = resources
            .iter()
            .filter(|r| r.id.resource_type == "elbv2_target_group")
            .map(|r| (r.binding(), r))
            .collect();

        let mut listeners = BTreeMap::new();
        for listener in resources.iter().filter(|r| r.id.resource_type == "elbv2_listener") {
            let Some(Value::Int(port)) = listener.attributes.get("port") else {
                continue;
            };
            let Some(Value::List(actions)) = listener.attributes.get("default_actions") else {
                continue;
            };

            let mut parsed = Vec::new();
            for action in actions {
                let Value::Map(action) = action else { continue };
                match field(action, "type") {
                    Some("redirect") => {
                        if let Some(Value::Map(cfg)) = action.get("redirect_config") {
                            parsed.push(ListenerAction::Redirect {
                                protocol: field(cfg, "protocol").unwrap_or("HTTP").to_string(),
                                port: field(cfg, "port").unwrap_or("#{port}").to_string(),
                                host: field(cfg, "host").unwrap_or("#{host}").to_string(),
                                path: field(cfg, "path").unwrap_or("/#{path}").to_string(),
                                query: field(cfg, "query").unwrap_or("#{query}").to_string(),
                                permanent: field(cfg, "status_code") == Some("HTTP_301"),
                            });
                        }
                    }
                    Some("forward") => {
                        if let Some(Value::ResourceRef(binding, _)) = action.get("target_group_arn") {
                            let group = target_groups.get(binding.as_str());
                            let port = group
                                .and_then(|g| match g.attributes.get("port") {
                                    Some(Value::Int(p)) => u16::try_from(*p).ok(),
                                    _ => None,
                                })
                                .unwrap_or(0);
                            let health_check_path = group
                                .and_then(|g| g.attributes.get("health_check_path"))
                                .and_then(Value::as_str)
                                .map(str::to_string);
                            parsed.push(ListenerAction::Forward {
                                target_group: binding.clone(),
                                port,
                                health_check_path,
                            });
                        }
                    }
                    _ => {}
                }
            }
            if let Ok(port) = u16::try_from(*port) {
                listeners.entry(port).or_insert_with(Vec::new).extend(parsed);
            }
        }

        Self { listeners }
    }

    /// Actions of the listener on `port`
    pub fn actions(&self, port: u16) -> &[ListenerAction] {
        self.listeners.get(&port).map_or(&[], |v| v.as_slice())
    }

    pub fn ports(&self) -> Vec<u16> {
        self.listeners.keys().copied().collect()
    }

    /// Route a request URL through the listeners
    pub fn route(&self, request: &str) -> Result<Route, url::ParseError> {
        let url = Url::parse(request)?;
        let Some(port) = url.port_or_known_default() else {
            return Ok(Route::Unrouted);
        };
        let Some(action) = self.actions(port).first() else {
            return Ok(Route::Unrouted);
        };

        let route = match action {
            ListenerAction::Redirect {
                protocol,
                port: redirect_port,
                host,
                path,
                query,
                ..
            } => {
                let original_host = url.host_str().unwrap_or_default();
                let original_path = url.path().trim_start_matches('/');
                let original_query = url.query().unwrap_or_default();
                let expand = |template: &str| {
                    template
                        .replace("#{host}", original_host)
                        .replace("#{path}", original_path)
                        .replace("#{query}", original_query)
                        .replace("#{port}", &port.to_string())
                };

                let scheme = protocol.to_lowercase();
                let target_port = expand(redirect_port);
                let default_port = match scheme.as_str() {
                    "https" => "443",
                    _ => "80",
                };
                let mut location = format!("{}://{}", scheme, expand(host));
                if target_port != default_port {
                    location.push(':');
                    location.push_str(&target_port);
                }
                location.push_str(&expand(path));
                let query = expand(query);
                if !query.is_empty() {
                    location.push('?');
                    location.push_str(&query);
                }
                Route::Redirect(location)
            }
            ListenerAction::Forward {
                target_group, port, ..
            } => Route::Forward {
                target_group: target_group.clone(),
                port: *port,
                path: url.path().to_string(),
            },
        };
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(port: i64, action: Value) -> Resource {
        Resource::new("elbv2_listener", format!("listener-{}", port))
            .with_attribute("port", Value::Int(port))
            .with_attribute("default_actions", Value::List(vec![action]))
    }

    fn chain() -> IngressChain {
        let redirect = Value::map([
            ("type", Value::string("redirect")),
            (
                "redirect_config",
                Value::map([
                    ("protocol", Value::string("HTTPS")),
                    ("port", Value::string("443")),
                    ("host", Value::string("#{host}")),
                    ("path", Value::string("/#{path}")),
                    ("query", Value::string("#{query}")),
                    ("status_code", Value::string("HTTP_301")),
                ]),
            ),
        ]);
        let forward = Value::map([
            ("type", Value::string("forward")),
            ("target_group_arn", Value::ResourceRef("tg".into(), "id".into())),
        ]);
        let resources = vec![
            Resource::new("elbv2_target_group", "tg")
                .with_attribute("port", Value::Int(8080))
                .with_attribute("health_check_path", Value::string("/healthz")),
            listener(80, redirect),
            listener(443, forward),
        ];
        IngressChain::from_resources(&resources)
    }

    #[test]
    fn http_redirects_preserving_host_path_and_query() {
        assert_eq!(
            chain().route("http://api.example.com/v1/graphql?x=1").unwrap(),
            Route::Redirect("https://api.example.com/v1/graphql?x=1".to_string())
        );
        assert_eq!(
            chain().route("http://api.example.com/").unwrap(),
            Route::Redirect("https://api.example.com/".to_string())
        );
    }

    #[test]
    fn https_forwards_to_target_group() {
        assert_eq!(
            chain().route("https://api.example.com/healthz").unwrap(),
            Route::Forward {
                target_group: "tg".to_string(),
                port: 8080,
                path: "/healthz".to_string(),
            }
        );
    }

    #[test]
    fn other_ports_are_unrouted() {
        assert_eq!(chain().route("https://api.example.com:8443/").unwrap(), Route::Unrouted);
        assert!(chain().route("not a url").is_err());
    }

    #[test]
    fn actions_are_reported_per_port() {
        let chain = chain();
        assert_eq!(chain.ports(), vec![80, 443]);
        assert!(matches!(
            chain.actions(80),
            [ListenerAction::Redirect { permanent: true, .. }]
        ));
        assert!(matches!(
            &chain.actions(443)[0],
            ListenerAction::Forward { health_check_path: Some(p), .. } if p == "/healthz"
        ));
    }
}
