//! The record tree.
//!
//! A [`Tree`] is a nested structure of groups, lists, and leaves. The same
//! shape is used for plain values ([`Record`], the public snapshot type) and
//! internally for per-field state. List items carry an [`ItemId`] that is
//! assigned once, when the item is created, and never changes while the
//! item lives; removing one item leaves every other item's identity intact.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::{FieldPath, Segment};
use crate::value::Value;

/// Stable identity of a list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generates a fresh identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of a [`Tree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node<L> {
    /// A single field.
    Leaf(L),
    /// Named children.
    Group(BTreeMap<String, Node<L>>),
    /// Ordered items, each with a stable identity.
    List(Vec<Item<L>>),
}

/// An element of a list node.
#[derive(Debug, Clone, PartialEq)]
pub struct Item<L> {
    /// The item's stable identity.
    pub id: ItemId,
    /// The item's content.
    pub node: Node<L>,
}

impl<L> Item<L> {
    /// Wraps a node with a fresh identity.
    pub fn new(node: Node<L>) -> Self {
        Self {
            id: ItemId::new(),
            node,
        }
    }

    /// Maps every leaf of the item, keeping its identity. `path` is the
    /// item's own position.
    pub fn map<M>(&self, path: &FieldPath, f: &mut impl FnMut(&FieldPath, &L) -> M) -> Item<M> {
        Item {
            id: self.id,
            node: map_node(&self.node, path, f),
        }
    }
}

/// One step of a [`StableKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StableSegment {
    /// A named child of a group.
    Key(String),
    /// A list item, by identity rather than position.
    Item(ItemId),
}

/// A path that addresses list items by identity.
///
/// Unlike a [`FieldPath`], a stable key keeps pointing at the same item when
/// earlier items are removed, and stops resolving once its item is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StableKey(Vec<StableSegment>);

/// A tree of groups, lists, and leaves of type `L`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree<L> {
    root: BTreeMap<String, Node<L>>,
}

/// The value tree of a form.
pub type Record = Tree<Value>;

impl<L> Default for Tree<L> {
    fn default() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }
}

impl<L> Tree<L> {
    /// Creates a tree from its top-level children.
    pub const fn new(root: BTreeMap<String, Node<L>>) -> Self {
        Self { root }
    }

    /// Returns the top-level children.
    pub const fn children(&self) -> &BTreeMap<String, Node<L>> {
        &self.root
    }

    /// Returns the node at `path`.
    pub fn get(&self, path: &FieldPath) -> Option<&Node<L>> {
        let mut segments = path.segments().iter();
        let mut node = match segments.next() {
            Some(Segment::Key(k)) => self.root.get(k)?,
            _ => return None,
        };
        for segment in segments {
            node = match (node, segment) {
                (Node::Group(children), Segment::Key(k)) => children.get(k)?,
                (Node::List(items), Segment::Index(i)) => &items.get(*i)?.node,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Returns the node at `path` mutably.
    pub fn get_mut(&mut self, path: &FieldPath) -> Option<&mut Node<L>> {
        let mut segments = path.segments().iter();
        let mut node = match segments.next() {
            Some(Segment::Key(k)) => self.root.get_mut(k)?,
            _ => return None,
        };
        for segment in segments {
            node = match (node, segment) {
                (Node::Group(children), Segment::Key(k)) => children.get_mut(k)?,
                (Node::List(items), Segment::Index(i)) => &mut items.get_mut(*i)?.node,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Returns the leaf at `path`.
    pub fn leaf(&self, path: &FieldPath) -> Option<&L> {
        match self.get(path)? {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Returns the leaf at `path` mutably.
    pub fn leaf_mut(&mut self, path: &FieldPath) -> Option<&mut L> {
        match self.get_mut(path)? {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Returns the list items at `path`.
    pub fn list(&self, path: &FieldPath) -> Option<&[Item<L>]> {
        match self.get(path)? {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the list items at `path` mutably.
    pub fn list_mut(&mut self, path: &FieldPath) -> Option<&mut Vec<Item<L>>> {
        match self.get_mut(path)? {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the identities of the items in the list at `path`, in order.
    pub fn item_ids(&self, path: &FieldPath) -> Option<Vec<ItemId>> {
        self.list(path)
            .map(|items| items.iter().map(|item| item.id).collect())
    }

    /// Returns every leaf with its concrete path, in key order.
    pub fn leaves(&self) -> Vec<(FieldPath, &L)> {
        let mut out = Vec::new();
        for (key, node) in &self.root {
            collect_leaves(node, FieldPath::root().key(key.clone()), &mut out);
        }
        out
    }

    /// Returns every list with its concrete path and length.
    pub fn lists(&self) -> Vec<(FieldPath, usize)> {
        let mut out = Vec::new();
        for (key, node) in &self.root {
            collect_lists(node, FieldPath::root().key(key.clone()), &mut out);
        }
        out
    }

    /// Builds a tree of the same shape, with the same item identities, by
    /// mapping every leaf.
    pub fn map<M>(&self, f: &mut impl FnMut(&FieldPath, &L) -> M) -> Tree<M> {
        let root = self
            .root
            .iter()
            .map(|(key, node)| {
                let path = FieldPath::root().key(key.clone());
                (key.clone(), map_node(node, &path, &mut *f))
            })
            .collect();
        Tree { root }
    }

    /// Converts a positional path into a [`StableKey`].
    pub fn stable_key(&self, path: &FieldPath) -> Option<StableKey> {
        let mut segments = path.segments().iter();
        let (mut node, mut out) = match segments.next() {
            Some(Segment::Key(k)) => (self.root.get(k)?, vec![StableSegment::Key(k.clone())]),
            _ => return None,
        };
        for segment in segments {
            node = match (node, segment) {
                (Node::Group(children), Segment::Key(k)) => {
                    out.push(StableSegment::Key(k.clone()));
                    children.get(k)?
                }
                (Node::List(items), Segment::Index(i)) => {
                    let item = items.get(*i)?;
                    out.push(StableSegment::Item(item.id));
                    &item.node
                }
                _ => return None,
            };
        }
        Some(StableKey(out))
    }

    /// Converts a [`StableKey`] back into the node's current positional path.
    ///
    /// Returns `None` if any item along the key has been removed.
    pub fn resolve(&self, key: &StableKey) -> Option<FieldPath> {
        let mut segments = key.0.iter();
        let (mut node, mut path) = match segments.next() {
            Some(StableSegment::Key(k)) => (self.root.get(k)?, FieldPath::root().key(k.clone())),
            _ => return None,
        };
        for segment in segments {
            node = match (node, segment) {
                (Node::Group(children), StableSegment::Key(k)) => {
                    path = path.key(k.clone());
                    children.get(k)?
                }
                (Node::List(items), StableSegment::Item(id)) => {
                    let index = items.iter().position(|item| item.id == *id)?;
                    path = path.index(index);
                    &items[index].node
                }
                _ => return None,
            };
        }
        Some(path)
    }
}

impl Record {
    /// Converts the record to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.root
                .iter()
                .map(|(key, node)| (key.clone(), node_to_json(node)))
                .collect(),
        )
    }

    /// Returns the value at `path`.
    pub fn value(&self, path: &FieldPath) -> Option<&Value> {
        self.leaf(path)
    }
}

/// Converts a value node to JSON.
pub fn node_to_json(node: &Node<Value>) -> serde_json::Value {
    match node {
        Node::Leaf(value) => value.to_json(),
        Node::Group(children) => serde_json::Value::Object(
            children
                .iter()
                .map(|(key, child)| (key.clone(), node_to_json(child)))
                .collect(),
        ),
        Node::List(items) => {
            serde_json::Value::Array(items.iter().map(|item| node_to_json(&item.node)).collect())
        }
    }
}

fn collect_leaves<'a, L>(node: &'a Node<L>, path: FieldPath, out: &mut Vec<(FieldPath, &'a L)>) {
    match node {
        Node::Leaf(leaf) => out.push((path, leaf)),
        Node::Group(children) => {
            for (key, child) in children {
                collect_leaves(child, path.key(key.clone()), out);
            }
        }
        Node::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_leaves(&item.node, path.index(i), out);
            }
        }
    }
}

fn collect_lists<L>(node: &Node<L>, path: FieldPath, out: &mut Vec<(FieldPath, usize)>) {
    match node {
        Node::Leaf(_) => {}
        Node::Group(children) => {
            for (key, child) in children {
                collect_lists(child, path.key(key.clone()), out);
            }
        }
        Node::List(items) => {
            out.push((path.clone(), items.len()));
            for (i, item) in items.iter().enumerate() {
                collect_lists(&item.node, path.index(i), out);
            }
        }
    }
}

fn map_node<L, M>(node: &Node<L>, path: &FieldPath, f: &mut impl FnMut(&FieldPath, &L) -> M) -> Node<M> {
    match node {
        Node::Leaf(leaf) => Node::Leaf(f(path, leaf)),
        Node::Group(children) => Node::Group(
            children
                .iter()
                .map(|(key, child)| (key.clone(), map_node(child, &path.key(key.clone()), &mut *f)))
                .collect(),
        ),
        Node::List(items) => Node::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| Item {
                    id: item.id,
                    node: map_node(&item.node, &path.index(i), &mut *f),
                })
                .collect(),
        ),
    }
}
