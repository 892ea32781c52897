//! Graph - Dependency analysis of resource declarations
//!
//! Every `ResourceRef` is an edge from the declaring resource to the resource
//! it consumes. Within a unit, references must point backwards: a declaration
//! may only consume what was declared before it, or what an earlier unit
//! exported.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::resource::{Resource, Value};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("{from} references '{target}' which is declared after it")]
    ForwardReference { from: String, target: String },

    #[error("{from} references unknown binding '{target}'")]
    UnresolvedReference { from: String, target: String },

    #[error("Binding '{0}' is declared more than once")]
    DuplicateBinding(String),

    #[error("Dependency cycle detected involving '{0}'")]
    Cycle(String),
}

/// Dependency between resources
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Target resource binding name
    pub target: String,
    /// Referenced attribute (e.g., "id")
    pub attribute: String,
    /// Where this reference is used (e.g., "vpc_id")
    pub used_in: String,
}

/// Dependency graph over binding names
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Resource binding name -> list of dependencies
    pub edges: HashMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> list of resources that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from the references found in each resource
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut graph = Self::new();
        for resource in resources {
            let mut keys: Vec<&String> = resource.attributes.keys().collect();
            keys.sort();
            for key in keys {
                let mut refs = Vec::new();
                resource.attributes[key].collect_refs(&mut refs);
                for (target, attribute) in refs {
                    graph.add_edge(
                        resource.binding().to_string(),
                        Dependency {
                            target: target.to_string(),
                            attribute: attribute.to_string(),
                            used_in: key.clone(),
                        },
                    );
                }
            }
        }
        graph
    }

    pub fn add_edge(&mut self, from: String, dependency: Dependency) {
        let target = dependency.target.clone();
        self.edges.entry(from.clone()).or_default().push(dependency);
        let dependents = self.reverse_edges.entry(target).or_default();
        if !dependents.contains(&from) {
            dependents.push(from);
        }
    }

    /// Resources that depend on others but nothing depends on them
    pub fn root_resources(&self) -> Vec<String> {
        let all_sources: HashSet<_> = self.edges.keys().cloned().collect();
        let all_targets: HashSet<_> = self.reverse_edges.keys().cloned().collect();
        let mut roots: Vec<String> = all_sources.difference(&all_targets).cloned().collect();
        roots.sort();
        roots
    }

    /// Resources that are depended on but don't depend on others
    pub fn leaf_resources(&self) -> Vec<String> {
        let all_with_deps: HashSet<_> = self.edges.keys().cloned().collect();
        let all_depended_on: HashSet<_> = self.reverse_edges.keys().cloned().collect();
        let mut leaves: Vec<String> = all_depended_on
            .difference(&all_with_deps)
            .cloned()
            .collect();
        leaves.sort();
        leaves
    }

    pub fn dependencies_of(&self, resource: &str) -> &[Dependency] {
        self.edges.get(resource).map_or(&[], |v| v.as_slice())
    }

    pub fn dependents_of(&self, resource: &str) -> &[String] {
        self.reverse_edges
            .get(resource)
            .map_or(&[], |v| v.as_slice())
    }

    /// Returns a node that lies on a cycle, if any
    pub fn find_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        let mut nodes: Vec<&String> = self.edges.keys().collect();
        nodes.sort();
        for node in nodes {
            if let Some(found) = self.find_cycle_util(node, &mut visited, &mut rec_stack) {
                return Some(found);
            }
        }
        None
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    fn find_cycle_util(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> Option<String> {
        if rec_stack.contains(node) {
            return Some(node.to_string());
        }
        if visited.contains(node) {
            return None;
        }

        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if let Some(found) = self.find_cycle_util(&dep.target, visited, rec_stack) {
                    return Some(found);
                }
            }
        }

        rec_stack.remove(node);
        None
    }

    /// Render the graph as indented text, one resource per line
    pub fn display(&self, resources: &[Resource]) -> String {
        let mut output = String::new();
        for resource in resources {
            output.push_str(&format!("{}\n", resource.id));
            for dep in self.dependencies_of(resource.binding()) {
                output.push_str(&format!(
                    "  <- {}.{} (as {})\n",
                    dep.target, dep.attribute, dep.used_in
                ));
            }
        }
        output
    }
}

/// Declarations checked for reference validity, in dependency order
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    pub resources: Vec<Resource>,
    pub graph: DependencyGraph,
}

/// Check references of a unit's declarations and order them
///
/// `external` holds the binding names exported by earlier units.
pub fn resolve(
    declarations: Vec<Resource>,
    external: &HashSet<String>,
) -> Result<ResolvedGraph, GraphError> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (idx, resource) in declarations.iter().enumerate() {
        if positions.insert(resource.binding(), idx).is_some() || external.contains(resource.binding()) {
            return Err(GraphError::DuplicateBinding(resource.binding().to_string()));
        }
    }

    for (idx, resource) in declarations.iter().enumerate() {
        for target in resource.dependencies() {
            match positions.get(target.as_str()) {
                Some(&pos) if pos < idx => {}
                Some(&pos) if pos == idx => return Err(GraphError::Cycle(target)),
                Some(_) => {
                    return Err(GraphError::ForwardReference {
                        from: resource.id.to_string(),
                        target,
                    });
                }
                None if external.contains(&target) => {}
                None => {
                    return Err(GraphError::UnresolvedReference {
                        from: resource.id.to_string(),
                        target,
                    });
                }
            }
        }
    }

    let graph = DependencyGraph::from_resources(&declarations);
    if let Some(node) = graph.find_cycle() {
        return Err(GraphError::Cycle(node));
    }

    let resources = sort_by_dependencies(&declarations);
    log::debug!("Resolved {} declarations", resources.len());

    Ok(ResolvedGraph { resources, graph })
}

/// Depth-first topological sort, stable with respect to declaration order
fn sort_by_dependencies(resources: &[Resource]) -> Vec<Resource> {
    let by_binding: HashMap<&str, &Resource> =
        resources.iter().map(|r| (r.binding(), r)).collect();

    fn visit<'a>(
        resource: &'a Resource,
        by_binding: &HashMap<&str, &'a Resource>,
        visited: &mut HashSet<&'a str>,
        sorted: &mut Vec<Resource>,
    ) {
        if !visited.insert(resource.binding()) {
            return;
        }
        for dep in resource.dependencies() {
            if let Some(dep_resource) = by_binding.get(dep.as_str()) {
                visit(dep_resource, by_binding, visited, sorted);
            }
        }
        sorted.push(resource.clone());
    }

    let mut sorted = Vec::with_capacity(resources.len());
    let mut visited = HashSet::new();
    for resource in resources {
        visit(resource, &by_binding, &mut visited, &mut sorted);
    }
    sorted
}

/// True when the value mentions the given binding
pub fn references(value: &Value, binding: &str) -> bool {
    let mut refs = Vec::new();
    value.collect_refs(&mut refs);
    refs.iter().any(|(b, _)| *b == binding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(binding: &str, attr: &str) -> Value {
        Value::ResourceRef(binding.to_string(), attr.to_string())
    }

    fn vpc_and_subnet() -> Vec<Resource> {
        vec![
            Resource::new("ec2_vpc", "vpc"),
            Resource::new("ec2_subnet", "subnet").with_attribute("vpc_id", reference("vpc", "id")),
        ]
    }

    #[test]
    fn resolves_backward_references() {
        let resolved = resolve(vpc_and_subnet(), &HashSet::new()).unwrap();
        assert_eq!(resolved.resources.len(), 2);
        assert_eq!(resolved.resources[0].binding(), "vpc");
        assert_eq!(resolved.graph.dependents_of("vpc"), &["subnet".to_string()]);
        assert_eq!(resolved.graph.root_resources(), vec!["subnet".to_string()]);
        assert_eq!(resolved.graph.leaf_resources(), vec!["vpc".to_string()]);
    }

    #[test]
    fn forward_reference_is_rejected() {
        let mut declarations = vpc_and_subnet();
        declarations.reverse();

        let err = resolve(declarations, &HashSet::new()).unwrap_err();
        assert_eq!(
            err,
            GraphError::ForwardReference {
                from: "ec2_subnet.subnet".to_string(),
                target: "vpc".to_string(),
            }
        );
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let declarations = vec![
            Resource::new("ec2_subnet", "subnet").with_attribute("vpc_id", reference("missing", "id")),
        ];
        assert!(matches!(
            resolve(declarations, &HashSet::new()),
            Err(GraphError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn external_bindings_satisfy_references() {
        let declarations = vec![
            Resource::new("ecs_cluster", "cluster").with_attribute("vpc", reference("vpc", "id")),
        ];
        let external = HashSet::from(["vpc".to_string()]);
        assert!(resolve(declarations, &external).is_ok());
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let declarations = vec![Resource::new("ec2_vpc", "vpc"), Resource::new("ec2_vpc", "vpc")];
        assert_eq!(
            resolve(declarations, &HashSet::new()).unwrap_err(),
            GraphError::DuplicateBinding("vpc".to_string())
        );
    }

    #[test]
    fn redeclaring_an_external_binding_is_rejected() {
        let external = HashSet::from(["vpc".to_string()]);
        assert!(matches!(
            resolve(vec![Resource::new("ec2_vpc", "vpc")], &external),
            Err(GraphError::DuplicateBinding(_))
        ));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let declarations = vec![
            Resource::new("ec2_security_group", "sg").with_attribute("source", reference("sg", "id")),
        ];
        assert_eq!(
            resolve(declarations, &HashSet::new()).unwrap_err(),
            GraphError::Cycle("sg".to_string())
        );
    }

    #[test]
    fn cycle_detection_on_raw_graph() {
        let mut graph = DependencyGraph::new();
        for (from, to) in [("a", "b"), ("b", "c"), ("c", "a")] {
            graph.add_edge(
                from.to_string(),
                Dependency {
                    target: to.to_string(),
                    attribute: "id".to_string(),
                    used_in: "x".to_string(),
                },
            );
        }
        assert!(graph.has_cycle());
    }

    #[test]
    fn display_lists_incoming_references() {
        let resolved = resolve(vpc_and_subnet(), &HashSet::new()).unwrap();
        let text = resolved.graph.display(&resolved.resources);
        assert!(text.contains("ec2_subnet.subnet\n  <- vpc.id (as vpc_id)"));
        assert!(references(&reference("vpc", "id"), "vpc"));
    }
}
