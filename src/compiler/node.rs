//! Executable tree nodes

#![allow(clippy::must_use_candidate)]

use crate::pipeline::{Filter, Stage, Step};

/// A node of the compiled tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Ordered children
    List(ListNode),
    /// Guarded child
    Filter(FilterNode),
    /// Container step (leaf)
    Container(ContainerNode),
}

impl Node {
    /// Returns the container leaf, if this node is one
    pub fn as_container(&self) -> Option<&ContainerNode> {
        match self {
            Node::Container(c) => Some(c),
            _ => None,
        }
    }

    /// Mutable access to the container leaf
    pub fn as_container_mut(&mut self) -> Option<&mut ContainerNode> {
        match self {
            Node::Container(c) => Some(c),
            _ => None,
        }
    }
}

/// Children executed in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListNode {
    /// Child nodes
    pub nodes: Vec<Node>,
}

impl ListNode {
    /// Appends a child
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the list has no children
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A guard around exactly one child
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    /// Conditions tested before the child runs
    pub filter: Filter,
    node: Box<Node>,
}

impl FilterNode {
    /// Wraps `node` in a guard
    pub fn new(filter: Filter, node: Node) -> Self {
        Self {
            filter,
            node: Box::new(node),
        }
    }

    /// The guarded child
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Stage of the guarded container, if the child is one
    pub fn guarded_stage(&self) -> Option<Stage> {
        self.node.as_container().map(ContainerNode::stage)
    }
}

/// A step run in its own container.
///
/// The stage is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerNode {
    stage: Stage,
    /// Container settings
    pub step: Step,
}

impl ContainerNode {
    /// Creates a container leaf for `stage`
    pub fn new(stage: Stage, step: Step) -> Self {
        Self { stage, step }
    }

    /// Stage this step belongs to
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

/// Compiled pipeline. The root is always a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    pub(crate) root: ListNode,
}

impl Tree {
    /// Root list of the tree
    pub fn root(&self) -> &ListNode {
        &self.root
    }

    /// All container leaves in walk order
    pub fn containers(&self) -> Vec<&ContainerNode> {
        fn collect<'a>(node: &'a Node, out: &mut Vec<&'a ContainerNode>) {
            match node {
                Node::List(list) => list.nodes.iter().for_each(|n| collect(n, out)),
                Node::Filter(filter) => collect(filter.node(), out),
                Node::Container(c) => out.push(c),
            }
        }

        let mut out = Vec::new();
        for node in &self.root.nodes {
            collect(node, &mut out);
        }
        out
    }
}
