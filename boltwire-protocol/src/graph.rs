//! Graph entities: nodes, relationships and paths.

use crate::value::Value;
use std::collections::BTreeMap;

/// Property map carried by nodes and relationships.
pub type Properties = BTreeMap<String, Value>;

/// A node returned by the server.
///
/// `element_id` is the stable identifier; `id` is the legacy numeric id and
/// may be reused by the server after deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub element_id: String,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl Node {
    pub fn new(id: i64, element_id: impl Into<String>) -> Self {
        Self {
            id,
            element_id: element_id.into(),
            labels: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Identity used to de-duplicate nodes inside a path.
    pub(crate) fn same_entity(&self, other: &Node) -> bool {
        self.id == other.id && self.element_id == other.element_id
    }
}

/// A relationship bound to its start and end nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: i64,
    pub element_id: String,
    pub start_node_id: i64,
    pub start_node_element_id: String,
    pub end_node_id: i64,
    pub end_node_element_id: String,
    pub rel_type: String,
    pub properties: Properties,
}

impl Relationship {
    pub fn new(id: i64, element_id: impl Into<String>, rel_type: impl Into<String>) -> Self {
        Self {
            id,
            element_id: element_id.into(),
            start_node_id: -1,
            start_node_element_id: String::new(),
            end_node_id: -1,
            end_node_element_id: String::new(),
            rel_type: rel_type.into(),
            properties: Properties::new(),
        }
    }

    /// Binds this relationship to its endpoints.
    pub fn between(mut self, start: &Node, end: &Node) -> Self {
        self.start_node_id = start.id;
        self.start_node_element_id = start.element_id.clone();
        self.end_node_id = end.id;
        self.end_node_element_id = end.element_id.clone();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub(crate) fn starts_at(&self, node: &Node) -> bool {
        self.start_node_id == node.id && self.start_node_element_id == node.element_id
    }

    pub(crate) fn to_unbound(&self) -> UnboundRelationship {
        UnboundRelationship {
            id: self.id,
            element_id: self.element_id.clone(),
            rel_type: self.rel_type.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// A relationship without endpoint information, as carried inside paths.
#[derive(Debug, Clone, PartialEq)]
pub struct UnboundRelationship {
    pub id: i64,
    pub element_id: String,
    pub rel_type: String,
    pub properties: Properties,
}

impl UnboundRelationship {
    pub(crate) fn bind(&self, start: &Node, end: &Node) -> Relationship {
        Relationship {
            id: self.id,
            element_id: self.element_id.clone(),
            start_node_id: start.id,
            start_node_element_id: start.element_id.clone(),
            end_node_id: end.id,
            end_node_element_id: end.element_id.clone(),
            rel_type: self.rel_type.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// An alternating walk of nodes and relationships.
///
/// `nodes.len() == relationships.len() + 1`, and `relationships[i]` connects
/// `nodes[i]` and `nodes[i + 1]` in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl Path {
    /// A zero-length path consisting of a single node.
    pub fn single(start: Node) -> Self {
        Self {
            nodes: vec![start],
            relationships: Vec::new(),
        }
    }

    /// Extends the path by one hop.
    pub fn push(mut self, relationship: Relationship, node: Node) -> Self {
        self.relationships.push(relationship);
        self.nodes.push(node);
        self
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }

    /// Number of relationships in the path.
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// Iterates `(from, relationship, to)` in walk order.
    pub fn segments(&self) -> impl Iterator<Item = (&Node, &Relationship, &Node)> {
        self.relationships
            .iter()
            .enumerate()
            .map(move |(i, rel)| (&self.nodes[i], rel, &self.nodes[i + 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Node {
        Node::new(1, "4:db:1").with_label("Person")
    }

    fn bob() -> Node {
        Node::new(2, "4:db:2").with_label("Person")
    }

    #[test]
    fn test_node_builder() {
        let node = alice().with_property("name", "Alice");
        assert!(node.has_label("Person"));
        assert!(!node.has_label("Robot"));
        assert_eq!(node.get("name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn test_relationship_binding() {
        let rel = Relationship::new(10, "5:db:10", "KNOWS").between(&alice(), &bob());
        assert!(rel.starts_at(&alice()));
        assert!(!rel.starts_at(&bob()));

        let unbound = rel.to_unbound();
        assert_eq!(unbound.bind(&alice(), &bob()), rel);
    }

    #[test]
    fn test_path_segments() {
        let rel = Relationship::new(10, "5:db:10", "KNOWS").between(&alice(), &bob());
        let path = Path::single(alice()).push(rel.clone(), bob());
        assert_eq!(path.len(), 1);
        assert_eq!(path.start(), Some(&alice()));
        assert_eq!(path.end(), Some(&bob()));

        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].1, &rel);
    }
}
