//! Stack construction and synthesis
//!
//! Two phases, enforced by types:
//!
//! 1. **Construction** ([`StackBuilder`]): declare nodes, dependencies and
//!    aspects. Nothing is visited yet.
//! 2. **Synthesis** ([`Stack::synthesize`]): the graph is frozen, every
//!    aspect is applied exactly once to every node, then the
//!    [`DeploymentPlan`] is emitted.
//!
//! There is no way to add a node to a [`Stack`], so no node can be visited
//! while it is still being constructed.

use crate::aspect::Aspect;
use crate::path::{ConstructPath, PATH_SEPARATOR};
use crate::plan::{DeploymentPlan, PlannedResource};
use crate::resource::Resource;
use crate::resources::Group;
use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Handle of a node within one stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised while declaring or synthesizing a stack
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructError {
    /// Ids must be non-empty and must not contain the path separator
    #[error("invalid construct id {0:?}")]
    InvalidId(String),

    /// Sibling ids must be unique
    #[error("{parent} already has a child named {id:?}")]
    DuplicateId { parent: String, id: String },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("{0} cannot depend on itself")]
    SelfDependency(String),

    /// A node and its own ancestor cannot depend on each other
    #[error("{dependent} and {dependency} are nested; dependencies must cross subtrees")]
    NestedDependency { dependent: String, dependency: String },

    #[error("dependency cycle involving {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}

#[derive(Debug)]
struct Node {
    path: ConstructPath,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    resource: Box<dyn Resource>,
}

/// Construction phase of a stack
///
/// Usage:
/// ```rust,ignore
/// let mut builder = StackBuilder::new("ServiceStack")?;
/// let vpc = builder.add(builder.root(), "Vpc", CfnResource::new("AWS::EC2::VPC"))?;
/// let cluster = builder.add(builder.root(), "Cluster", CfnResource::new("AWS::ECS::Cluster"))?;
/// builder.add_dependency(cluster, vpc)?;
/// builder.add_aspect(DeletionPolicySetter::new(PolicyDirective::destroy()));
/// let synthesis = builder.build().synthesize()?;
/// ```
#[derive(Debug)]
pub struct StackBuilder {
    name: String,
    nodes: Vec<Node>,
    // Edge direction: dependency -> dependent
    dependencies: DiGraphMap<NodeId, ()>,
    aspects: Vec<Box<dyn Aspect>>,
}

impl StackBuilder {
    /// Start a stack whose root construct is named `name`
    ///
    /// # Errors
    /// Returns [`ConstructError::InvalidId`] for an empty name or one
    /// containing the path separator
    pub fn new(name: impl Into<String>) -> Result<Self, ConstructError> {
        let name = name.into();
        validate_id(&name)?;

        let root = Node {
            path: ConstructPath::root(name.clone()),
            parent: None,
            children: IndexMap::new(),
            resource: Box::new(Group::new()),
        };
        let mut dependencies = DiGraphMap::new();
        dependencies.add_node(NodeId(0));

        Ok(Self {
            name,
            nodes: vec![root],
            dependencies,
            aspects: Vec::new(),
        })
    }

    /// The stack root, parent of all top-level constructs
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn path(&self, id: NodeId) -> Option<&ConstructPath> {
        self.nodes.get(id.0).map(|n| &n.path)
    }

    /// Declare `resource` as child `id` of `parent`
    ///
    /// # Errors
    /// Fails on an unknown parent, an invalid id, or a duplicate sibling id
    pub fn add(
        &mut self,
        parent: NodeId,
        id: &str,
        resource: impl Resource + 'static,
    ) -> Result<NodeId, ConstructError> {
        validate_id(id)?;
        let parent_node = self
            .nodes
            .get(parent.0)
            .ok_or(ConstructError::UnknownNode(parent))?;
        if parent_node.children.contains_key(id) {
            return Err(ConstructError::DuplicateId {
                parent: parent_node.path.to_string(),
                id: id.to_string(),
            });
        }

        let node_id = NodeId(self.nodes.len());
        let path = parent_node.path.child(id);
        self.nodes[parent.0].children.insert(id.to_string(), node_id);
        self.nodes.push(Node {
            path,
            parent: Some(parent),
            children: IndexMap::new(),
            resource: Box::new(resource),
        });
        self.dependencies.add_node(node_id);
        Ok(node_id)
    }

    /// Declare that `dependent` must be materialized after `dependency`
    ///
    /// Depending on a grouping construct means depending on every resource
    /// beneath it.
    ///
    /// # Errors
    /// Rejects unknown nodes, self dependencies, dependencies between a node
    /// and its own ancestor, and edges that would close a cycle
    pub fn add_dependency(&mut self, dependent: NodeId, dependency: NodeId) -> Result<(), ConstructError> {
        let dependent_path = self.path(dependent).ok_or(ConstructError::UnknownNode(dependent))?;
        let dependency_path = self.path(dependency).ok_or(ConstructError::UnknownNode(dependency))?;

        if dependent == dependency {
            return Err(ConstructError::SelfDependency(dependent_path.to_string()));
        }
        if dependent_path.is_ancestor_of(dependency_path) || dependency_path.is_ancestor_of(dependent_path) {
            return Err(ConstructError::NestedDependency {
                dependent: dependent_path.to_string(),
                dependency: dependency_path.to_string(),
            });
        }

        self.dependencies.add_edge(dependency, dependent, ());
        if petgraph::algo::is_cyclic_directed(&self.dependencies) {
            self.dependencies.remove_edge(dependency, dependent);
            return Err(ConstructError::DependencyCycle(vec![
                self.nodes[dependent.0].path.to_string(),
                self.nodes[dependency.0].path.to_string(),
            ]));
        }
        Ok(())
    }

    /// Register an aspect on the stack scope
    ///
    /// Aspects run during synthesis, in registration order.
    pub fn add_aspect(&mut self, aspect: impl Aspect + 'static) {
        self.aspects.push(Box::new(aspect));
    }

    /// Freeze the graph
    #[must_use]
    pub fn build(self) -> Stack {
        tracing::debug!(
            stack = %self.name,
            nodes = self.nodes.len(),
            dependencies = self.dependencies.edge_count(),
            aspects = self.aspects.len(),
            "stack built"
        );
        Stack {
            name: self.name,
            nodes: self.nodes,
            dependencies: self.dependencies,
            aspects: self.aspects,
        }
    }
}

fn validate_id(id: &str) -> Result<(), ConstructError> {
    if id.trim().is_empty() || id.contains(PATH_SEPARATOR) {
        return Err(ConstructError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// A fully constructed, frozen stack
#[derive(Debug)]
pub struct Stack {
    name: String,
    nodes: Vec<Node>,
    dependencies: DiGraphMap<NodeId, ()>,
    aspects: Vec<Box<dyn Aspect>>,
}

/// Output of [`Stack::synthesize`]
#[derive(Debug)]
pub struct Synthesis {
    pub stack: Stack,
    pub plan: DeploymentPlan,
    /// Total aspect invocations performed (nodes × aspects)
    pub visits: usize,
}

impl Stack {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn resource(&self, id: NodeId) -> Option<&dyn Resource> {
        self.nodes.get(id.0).map(|n| n.resource.as_ref())
    }

    #[must_use]
    pub fn path(&self, id: NodeId) -> Option<&ConstructPath> {
        self.nodes.get(id.0).map(|n| &n.path)
    }

    /// Find a node by its slash-separated path, e.g. `Stack/Vpc/Resource`
    #[must_use]
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut segments = path.split(PATH_SEPARATOR);
        if segments.next()? != self.name {
            return None;
        }
        segments.try_fold(NodeId(0), |current, segment| {
            self.nodes[current.0].children.get(segment).copied()
        })
    }

    /// All node ids, depth-first from the root, children in declaration order
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut pending = vec![NodeId(0)];
        while let Some(id) = pending.pop() {
            order.push(id);
            pending.extend(self.nodes[id.0].children.values().rev().copied());
        }
        order
    }

    /// Apply every registered aspect once per node, then emit the plan
    ///
    /// # Errors
    /// Returns [`ConstructError::DependencyCycle`] if dependencies inherited
    /// through grouping constructs form a cycle
    pub fn synthesize(mut self) -> Result<Synthesis, ConstructError> {
        let aspects = std::mem::take(&mut self.aspects);
        let mut visits = 0;
        for id in self.node_ids() {
            let node = &mut self.nodes[id.0];
            for aspect in &aspects {
                tracing::debug!(path = %node.path, aspect = ?aspect, "applying aspect");
                aspect.visit(node.resource.as_mut());
                visits += 1;
            }
        }

        let plan = self.plan()?;
        tracing::info!(
            stack = %self.name,
            resources = plan.len(),
            visits,
            "stack synthesized"
        );
        Ok(Synthesis {
            stack: self,
            plan,
            visits,
        })
    }

    fn ancestors_and_self(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| self.nodes[current.0].parent)
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            out.push(current);
            pending.extend(self.nodes[current.0].children.values().copied());
        }
        out
    }

    fn plan(&self) -> Result<DeploymentPlan, ConstructError> {
        let properties: BTreeMap<NodeId, serde_json::Value> = self
            .node_ids()
            .into_iter()
            .filter_map(|id| self.nodes[id.0].resource.properties().map(|p| (id, p)))
            .collect();

        // Expand dependencies inherited from ancestors and through groups
        // down to materialized resources.
        let mut depends_on: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for &id in properties.keys() {
            let mut deps = BTreeSet::new();
            for scope in self.ancestors_and_self(id) {
                for dependency in self.dependencies.neighbors_directed(scope, Direction::Incoming) {
                    deps.extend(
                        self.subtree(dependency)
                            .into_iter()
                            .filter(|d| properties.contains_key(d) && *d != id),
                    );
                }
            }
            depends_on.insert(id, deps);
        }

        // Kahn's algorithm, ties broken by construct path for stable output
        let mut remaining: BTreeMap<NodeId, usize> =
            depends_on.iter().map(|(id, deps)| (*id, deps.len())).collect();
        let mut ready: BTreeSet<(&ConstructPath, NodeId)> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| (&self.nodes[id.0].path, *id))
            .collect();
        let mut order = Vec::with_capacity(properties.len());

        while let Some(entry) = ready.pop_first() {
            let (_, id) = entry;
            remaining.remove(&id);
            order.push(id);
            for (dependent, deps) in &depends_on {
                if deps.contains(&id) {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert((&self.nodes[dependent.0].path, *dependent));
                        }
                    }
                }
            }
        }

        if !remaining.is_empty() {
            let mut paths: Vec<String> = remaining
                .keys()
                .map(|id| self.nodes[id.0].path.to_string())
                .collect();
            paths.sort();
            return Err(ConstructError::DependencyCycle(paths));
        }

        let resources = order
            .into_iter()
            .map(|id| {
                let node = &self.nodes[id.0];
                let mut deps: Vec<String> = depends_on[&id]
                    .iter()
                    .map(|d| self.nodes[d.0].path.logical_id())
                    .collect();
                deps.sort();
                PlannedResource {
                    logical_id: node.path.logical_id(),
                    path: node.path.to_string(),
                    kind: node.resource.kind().to_string(),
                    removal_policy: node
                        .resource
                        .as_removal_policy()
                        .and_then(|p| p.removal_policy()),
                    auto_clean: node
                        .resource
                        .as_auto_clean()
                        .is_some_and(|c| c.auto_clean_enabled()),
                    properties: properties[&id].clone(),
                    depends_on: deps,
                }
            })
            .collect();

        Ok(DeploymentPlan {
            stack_name: self.name.clone(),
            resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::DeletionPolicySetter;
    use crate::policy::{PolicyDirective, RemovalPolicy};
    use crate::resources::{Bucket, CfnResource};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn builder() -> StackBuilder {
        StackBuilder::new("Stack").unwrap()
    }

    #[test]
    fn rejects_invalid_ids() {
        assert!(matches!(StackBuilder::new(""), Err(ConstructError::InvalidId(_))));
        let mut b = builder();
        let root = b.root();
        assert!(matches!(b.add(root, "a/b", Group::new()), Err(ConstructError::InvalidId(_))));
        assert!(matches!(b.add(root, "  ", Group::new()), Err(ConstructError::InvalidId(_))));
    }

    #[test]
    fn rejects_duplicate_siblings_but_not_cousins() {
        let mut b = builder();
        let root = b.root();
        let a = b.add(root, "A", Group::new()).unwrap();
        let c = b.add(root, "C", Group::new()).unwrap();
        b.add(a, "Resource", Group::new()).unwrap();
        b.add(c, "Resource", Group::new()).unwrap();

        let err = b.add(a, "Resource", Group::new()).unwrap_err();
        assert_eq!(
            err,
            ConstructError::DuplicateId {
                parent: "Stack/A".into(),
                id: "Resource".into()
            }
        );
    }

    #[test]
    fn rejects_self_nested_and_cyclic_dependencies() {
        let mut b = builder();
        let root = b.root();
        let group = b.add(root, "G", Group::new()).unwrap();
        let inner = b.add(group, "Inner", CfnResource::new("T")).unwrap();
        let x = b.add(root, "X", CfnResource::new("T")).unwrap();
        let y = b.add(root, "Y", CfnResource::new("T")).unwrap();

        assert!(matches!(b.add_dependency(x, x), Err(ConstructError::SelfDependency(_))));
        assert!(matches!(b.add_dependency(inner, group), Err(ConstructError::NestedDependency { .. })));

        b.add_dependency(y, x).unwrap();
        assert!(matches!(b.add_dependency(x, y), Err(ConstructError::DependencyCycle(_))));
        // rejected edge was rolled back
        b.add_dependency(inner, y).unwrap();
    }

    #[test]
    fn find_by_path() {
        let mut b = builder();
        let root = b.root();
        let vpc = b.add(root, "Vpc", Group::new()).unwrap();
        let subnet = b.add(vpc, "Subnet", CfnResource::new("AWS::EC2::Subnet")).unwrap();
        let stack = b.build();

        assert_eq!(stack.find("Stack"), Some(root));
        assert_eq!(stack.find("Stack/Vpc/Subnet"), Some(subnet));
        assert_eq!(stack.find("Stack/Nope"), None);
        assert_eq!(stack.find("Other/Vpc"), None);
    }

    #[test]
    fn node_ids_are_depth_first_in_declaration_order() {
        let mut b = builder();
        let root = b.root();
        let a = b.add(root, "A", Group::new()).unwrap();
        let c = b.add(root, "C", Group::new()).unwrap();
        let a1 = b.add(a, "A1", Group::new()).unwrap();
        let stack = b.build();

        assert_eq!(stack.node_ids(), vec![root, a, a1, c]);
    }

    #[test]
    fn synthesize_applies_each_aspect_once_per_node() {
        let mut b = builder();
        let root = b.root();
        b.add(root, "Bucket", Bucket::new()).unwrap();
        b.add(root, "Vpc", CfnResource::new("AWS::EC2::VPC")).unwrap();
        b.add_aspect(DeletionPolicySetter::new(PolicyDirective::retain()));
        b.add_aspect(DeletionPolicySetter::new(PolicyDirective::destroy()));

        let synthesis = b.build().synthesize().unwrap();
        assert_eq!(synthesis.visits, 3 * 2);

        // later aspect wins for policy; auto-clean was enabled by the second
        let bucket = synthesis.plan.by_path("Stack/Bucket").unwrap();
        assert_eq!(bucket.removal_policy, Some(RemovalPolicy::Destroy));
        assert!(bucket.auto_clean);
    }

    #[test]
    fn plan_orders_dependencies_first() {
        let mut b = builder();
        let root = b.root();
        let service = b.add(root, "Service", CfnResource::new("AWS::ECS::Service")).unwrap();
        let network = b.add(root, "Network", Group::new()).unwrap();
        let vpc = b.add(network, "Vpc", CfnResource::new("AWS::EC2::VPC")).unwrap();
        let subnet = b.add(network, "Subnet", CfnResource::new("AWS::EC2::Subnet")).unwrap();
        b.add_dependency(subnet, vpc).unwrap();
        b.add_dependency(service, network).unwrap();

        let plan = b.build().synthesize().unwrap().plan;
        let paths: Vec<&str> = plan.resources.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["Stack/Network/Vpc", "Stack/Network/Subnet", "Stack/Service"]);

        let service = plan.by_path("Stack/Service").unwrap();
        let mut expected = vec![
            ConstructPath::root("Stack").child("Network").child("Vpc").logical_id(),
            ConstructPath::root("Stack").child("Network").child("Subnet").logical_id(),
        ];
        expected.sort();
        assert_eq!(service.depends_on, expected);
    }

    #[test]
    fn dependencies_inherit_from_ancestors() {
        let mut b = builder();
        let root = b.root();
        let db = b.add(root, "Db", CfnResource::new("DB")).unwrap();
        let app = b.add(root, "App", Group::new()).unwrap();
        b.add(app, "Task", CfnResource::new("Task")).unwrap();
        b.add_dependency(app, db).unwrap();

        let plan = b.build().synthesize().unwrap().plan;
        let task = plan.by_path("Stack/App/Task").unwrap();
        assert_eq!(task.depends_on, vec![ConstructPath::root("Stack").child("Db").logical_id()]);
    }

    #[test]
    fn cycle_through_groups_is_reported_at_synthesis() {
        let mut b = builder();
        let root = b.root();
        let x = b.add(root, "X", CfnResource::new("T")).unwrap();
        let g = b.add(root, "G", Group::new()).unwrap();
        let inner = b.add(g, "Inner", CfnResource::new("T")).unwrap();
        b.add_dependency(x, g).unwrap();
        b.add_dependency(inner, x).unwrap();

        let err = b.build().synthesize().unwrap_err();
        assert_eq!(
            err,
            ConstructError::DependencyCycle(vec!["Stack/G/Inner".into(), "Stack/X".into()])
        );
    }

    #[test]
    fn groups_are_not_planned() {
        let mut b = builder();
        let root = b.root();
        let g = b.add(root, "G", Group::new()).unwrap();
        b.add(g, "Resource", CfnResource::new("T")).unwrap();

        let plan = b.build().synthesize().unwrap().plan;
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.resources[0].path, "Stack/G/Resource");
        assert_eq!(plan.resources[0].removal_policy, None);
    }

    #[derive(Debug, Default)]
    struct CountingAspect {
        per_node: Rc<RefCell<BTreeMap<usize, usize>>>,
    }

    impl Aspect for CountingAspect {
        fn visit(&self, node: &mut dyn Resource) {
            let address = (node as *mut dyn Resource).cast::<()>() as usize;
            *self.per_node.borrow_mut().entry(address).or_default() += 1;
        }
    }

    #[test]
    fn every_aspect_visits_every_node_once() {
        let mut b = builder();
        let root = b.root();
        let g = b.add(root, "G", Group::new()).unwrap();
        b.add(g, "Resource", CfnResource::new("T")).unwrap();
        b.add(root, "A", Bucket::new()).unwrap();

        let first = CountingAspect::default();
        let second = CountingAspect::default();
        let (first_counts, second_counts) = (first.per_node.clone(), second.per_node.clone());
        b.add_aspect(first);
        b.add_aspect(second);

        let synthesis = b.build().synthesize().unwrap();
        assert_eq!(synthesis.visits, 4 * 2);
        for counts in [first_counts, second_counts] {
            let counts = counts.borrow();
            assert_eq!(counts.len(), 4);
            assert!(counts.values().all(|&n| n == 1), "{counts:?}");
        }
    }

    #[test]
    fn synthesized_stack_is_not_visited_again() {
        let mut b = builder();
        let root = b.root();
        b.add(root, "A", Bucket::new()).unwrap();
        let aspect = CountingAspect::default();
        let counts = aspect.per_node.clone();
        b.add_aspect(aspect);

        let first = b.build().synthesize().unwrap();
        assert_eq!(first.visits, 2);
        let again = first.stack.synthesize().unwrap();
        assert_eq!(again.visits, 0);
        assert!(counts.borrow().values().all(|&n| n == 1));
        assert_eq!(again.plan, first.plan);
    }
}
