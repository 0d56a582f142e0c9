//! Knowledge node domain model.
//!
//! # Responsibility
//! - Define the canonical record persisted under `node_<id>` ledger keys.
//! - Provide the archive lifecycle transition.
//!
//! # Invariants
//! - `id` is generated client-side and never reused.
//! - `status` only moves from `Active` to `Archived`.
//! - Unrecognized `kind` values round-trip unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Well-known ledger key holding the ordered node id list.
pub const INDEX_KEY: &str = "node_keys";
/// Prefix for per-node ledger keys.
pub const NODE_KEY_PREFIX: &str = "node_";

/// Opaque client-generated node identifier.
pub type NodeId = String;

/// Returns the ledger key for one node id.
pub fn node_key(id: &str) -> String {
    format!("{NODE_KEY_PREFIX}{id}")
}

/// Returns whether `id` can be embedded in a ledger key.
///
/// Ids are opaque. Only the empty id and `keys` are refused: the first has no
/// key of its own and the second would address `node_keys`.
pub fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty() && node_key(id) != INDEX_KEY
}

/// Node category.
///
/// The known set is closed for creation UIs, but values written by other
/// clients are kept as `Other` instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Concept,
    Entity,
    Relation,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Concept => "concept",
            Self::Entity => "entity",
            Self::Relation => "relation",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Maps a wire value to a kind. Matching is exact.
    pub fn parse(value: &str) -> Self {
        match value {
            "concept" => Self::Concept,
            "entity" => Self::Entity,
            "relation" => Self::Relation,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns whether this is one of the built-in kinds.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// Node lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Active,
    Archived,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl Display for NodeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One knowledge unit as reconstructed from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Identifier taken from the ledger key, not from the stored payload.
    pub id: NodeId,
    /// Confidentiality-transformed content. Never inspected by the store.
    pub payload: String,
    pub kind: NodeKind,
    /// Ids of related nodes. Dangling references are allowed.
    pub relations: Vec<NodeId>,
    /// Unix epoch seconds.
    pub created_at: i64,
    /// Identity address captured at creation.
    pub owner: String,
    pub status: NodeStatus,
    /// Stored fields this client does not model; written back verbatim.
    pub extra: BTreeMap<String, Value>,
}

impl NodeRecord {
    /// Creates an active node with no relations.
    pub fn new(
        id: impl Into<NodeId>,
        kind: NodeKind,
        payload: impl Into<String>,
        owner: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            kind,
            relations: Vec::new(),
            created_at,
            owner: owner.into(),
            status: NodeStatus::Active,
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style relation list setter.
    pub fn with_relations(mut self, relations: Vec<NodeId>) -> Self {
        self.relations = relations;
        self
    }

    /// Moves the node to `Archived`.
    ///
    /// Returns `false` when it was already archived, so callers can skip the
    /// write-back.
    pub fn archive(&mut self) -> bool {
        if self.status == NodeStatus::Archived {
            return false;
        }
        self.status = NodeStatus::Archived;
        true
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// Ledger key this record lives under.
    pub fn key(&self) -> String {
        node_key(&self.id)
    }
}
