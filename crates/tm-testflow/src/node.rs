use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tm_core::model::{Behavior, DagStep};
use tm_core::testdefinition::TestDefinition;

/// Index of a node inside its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the root, following parents.
    Up,
    /// Away from the root, following children.
    Down,
}

/// Identity set of nodes. Use [`Graph::list`] for name-ordered iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet(BTreeSet<NodeId>);

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId) -> bool {
        self.0.insert(id)
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        self.0.remove(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    pub fn extend(&mut self, other: &NodeSet) {
        self.0.extend(other.iter());
    }
}

impl FromIterator<NodeId> for NodeSet {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Name of a node: the definition name plus a short hash of definition, step and flow.
pub fn unique_name(definition: &str, step: Option<&str>, flow: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(definition.as_bytes());
    hasher.update(b"/");
    hasher.update(step.unwrap_or_default().as_bytes());
    hasher.update(b"/");
    hasher.update(flow.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", definition, &digest[..8])
}

/// One test definition instance bound to one step occurrence.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    pub test_definition: TestDefinition,
    /// `None` only for the synthetic root.
    pub step: Option<DagStep>,
    pub flow: String,
    parents: NodeSet,
    children: NodeSet,
    input_source: Option<NodeId>,
    has_output: bool,
    is_serial: bool,
}

impl Node {
    pub fn new(mut test_definition: TestDefinition, step: Option<DagStep>, flow: &str) -> Self {
        let name = unique_name(
            &test_definition.info.name,
            step.as_ref().map(|s| s.name.as_str()),
            flow,
        );
        test_definition.set_name(&name);
        Self {
            name,
            test_definition,
            step,
            flow: flow.to_string(),
            parents: NodeSet::new(),
            children: NodeSet::new(),
            input_source: None,
            has_output: false,
            is_serial: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_name(&self) -> Option<&str> {
        self.step.as_ref().map(|s| s.name.as_str())
    }

    pub fn parents(&self) -> &NodeSet {
        &self.parents
    }

    pub fn children(&self) -> &NodeSet {
        &self.children
    }

    pub fn neighbours(&self, direction: Direction) -> &NodeSet {
        match direction {
            Direction::Up => &self.parents,
            Direction::Down => &self.children,
        }
    }

    pub fn input_source(&self) -> Option<NodeId> {
        self.input_source
    }

    pub fn has_output(&self) -> bool {
        self.has_output
    }

    pub fn is_serial(&self) -> bool {
        self.is_serial
    }

    /// Tagged by the user to run after its parallel siblings.
    pub fn has_serial_behavior(&self) -> bool {
        self.test_definition.has_behavior(Behavior::Serial)
    }

    pub fn continue_on_error(&self) -> bool {
        self.step
            .as_ref()
            .is_some_and(|s| s.definition.continue_on_error)
    }

    pub fn is_untrusted(&self) -> bool {
        self.step.as_ref().is_some_and(|s| s.definition.untrusted)
    }
}

/// Arena owning every node of a flow. Edges are stored on both ends.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.ids().find(|id| self.node(*id).name == name)
    }

    /// Members of `set` sorted by node name.
    pub fn list(&self, set: &NodeSet) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = set.iter().collect();
        ids.sort_by(|a, b| self.node(*a).name.cmp(&self.node(*b).name).then(a.cmp(b)));
        ids
    }

    pub fn names(&self, set: &NodeSet) -> Vec<String> {
        self.list(set)
            .into_iter()
            .map(|id| self.node(id).name.clone())
            .collect()
    }

    pub fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.insert(child);
        self.nodes[child.0].parents.insert(parent);
    }

    pub fn add_children(&mut self, parent: NodeId, children: &NodeSet) {
        for child in children.iter() {
            self.link(parent, child);
        }
    }

    pub fn add_parents(&mut self, child: NodeId, parents: &NodeSet) {
        for parent in parents.iter() {
            self.link(parent, child);
        }
    }

    /// Removes all children and the reciprocal parent edges.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children.iter() {
            self.nodes[child.0].parents.remove(id);
        }
    }

    /// Removes all parents and the reciprocal child edges.
    pub fn clear_parents(&mut self, id: NodeId) {
        let parents = std::mem::take(&mut self.nodes[id.0].parents);
        for parent in parents.iter() {
            self.nodes[parent.0].children.remove(id);
        }
    }

    /// Union of the children of all members.
    pub fn children_of(&self, set: &NodeSet) -> NodeSet {
        self.neighbours_of(set, Direction::Down)
    }

    /// Union of the parents of all members.
    pub fn parents_of(&self, set: &NodeSet) -> NodeSet {
        self.neighbours_of(set, Direction::Up)
    }

    fn neighbours_of(&self, set: &NodeSet, direction: Direction) -> NodeSet {
        let mut result = NodeSet::new();
        for id in set.iter() {
            result.extend(self.node(id).neighbours(direction));
        }
        result
    }

    pub fn set_input_source(&mut self, id: NodeId, source: NodeId) {
        self.nodes[id.0].input_source = Some(source);
    }

    /// Enables the standard outputs of a node so that others can consume them.
    pub fn set_output(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        if !node.has_output {
            node.test_definition.add_std_output(false);
            node.has_output = true;
        }
    }

    /// Marks a convergence point. Its outputs are also published on the workflow.
    pub fn set_serial(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        if !node.is_serial {
            node.test_definition.add_std_output(true);
            node.is_serial = true;
        }
    }
}
