//! Scope tree: the namespace layout a module installs into the runtime.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: `ScopeNode` (free functions, enum constants, class identity)
//! - Edges: `Contains(name)` from a scope to each child
//!
//! Siblings are also kept in an explicit child list, since installation
//! walks them in declaration order.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use lualite_core::TypeHash;

use crate::stub::FunctionStub;

/// Edge types in the scope graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEdge {
    /// Parent scope contains the child under this name.
    Contains(String),
}

/// What a node installs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A plain namespace table.
    Namespace,
    /// A class table: constructors, statics and `__classname`.
    Class(TypeHash),
}

/// Data stored in each scope node.
pub struct ScopeNode {
    /// Absent only for an anonymous module root.
    pub name: Option<String>,
    pub kind: ScopeKind,
    /// Children in declaration order.
    pub children: Vec<NodeIndex>,
    /// Free functions (class statics for class nodes).
    pub functions: Vec<(String, FunctionStub)>,
    /// Integer constants.
    pub enums: Vec<(String, i64)>,
}

impl ScopeNode {
    fn new(name: Option<String>, kind: ScopeKind) -> Self {
        Self {
            name,
            kind,
            children: Vec::new(),
            functions: Vec::new(),
            enums: Vec::new(),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, ScopeKind::Class(_))
    }
}

impl std::fmt::Debug for ScopeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let functions: Vec<&str> = self.functions.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ScopeNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("functions", &functions)
            .field("enums", &self.enums)
            .finish()
    }
}

/// The scope graph of one module.
pub struct ScopeTree {
    graph: DiGraph<ScopeNode, ScopeEdge>,
    root: NodeIndex,
}

impl ScopeTree {
    /// Create a tree whose root has the given name, or none for a module
    /// that installs straight into the globals.
    pub fn new(root_name: Option<String>) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(ScopeNode::new(root_name, ScopeKind::Namespace));
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, node: NodeIndex) -> Option<&ScopeNode> {
        self.graph.node_weight(node)
    }

    pub fn node_mut(&mut self, node: NodeIndex) -> Option<&mut ScopeNode> {
        self.graph.node_weight_mut(node)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Children of a node in declaration order.
    pub fn children(&self, node: NodeIndex) -> &[NodeIndex] {
        self.node(node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Find a namespace child by name.
    pub fn find_scope(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.graph
            .edges(parent)
            .filter(|edge| matches!(edge.weight(), ScopeEdge::Contains(child) if child == name))
            .map(|edge| edge.target())
            .find(|&child| self.graph[child].kind == ScopeKind::Namespace)
    }

    /// Get or create a namespace child.
    pub fn get_or_create_scope(&mut self, parent: NodeIndex, name: &str) -> NodeIndex {
        if let Some(child) = self.find_scope(parent, name) {
            return child;
        }
        self.add_child(parent, name, ScopeKind::Namespace)
    }

    /// Add a class node. Each declaration gets its own node; two nodes with
    /// the same name share one runtime table at install time.
    pub fn add_class(&mut self, parent: NodeIndex, name: &str, class: TypeHash) -> NodeIndex {
        self.add_child(parent, name, ScopeKind::Class(class))
    }

    fn add_child(&mut self, parent: NodeIndex, name: &str, kind: ScopeKind) -> NodeIndex {
        let child = self
            .graph
            .add_node(ScopeNode::new(Some(name.to_string()), kind));
        self.graph
            .add_edge(parent, child, ScopeEdge::Contains(name.to_string()));
        self.graph[parent].children.push(child);
        child
    }

    /// Find the parent of a node.
    pub fn find_parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .map(|edge| edge.source())
            .next()
    }

    /// Names from the root down to `node`, the root's own name included
    /// when it has one.
    pub fn path(&self, node: NodeIndex) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(index) = current {
            if let Some(name) = &self.graph[index].name {
                path.push(name.clone());
            }
            current = self.find_parent(index);
        }
        path.reverse();
        path
    }

    /// Dotted name of a node, as script code would reach it.
    pub fn qualified_name(&self, node: NodeIndex) -> String {
        self.path(node).join(".")
    }

    /// All nodes, parents before children, siblings in declaration order.
    pub fn preorder(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        order
    }
}

impl std::fmt::Debug for ScopeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeTree")
            .field("root", &self.root)
            .field("nodes", &self.graph.node_count())
            .finish()
    }
}
