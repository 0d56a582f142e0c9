//! Byte payload codec for node records and the node index.
//!
//! # Responsibility
//! - Map `NodeRecord` and the id list to UTF-8 JSON payloads.
//! - Fill defaults for optional fields missing from older payloads.
//!
//! # Invariants
//! - Wire names are `data`, `nodeType`, `relations`, `timestamp`, `owner`,
//!   `status`.
//! - Missing or `null` `status` decodes as `active`; missing or `null`
//!   `relations` decodes as `[]`.
//! - Unknown fields survive a decode/encode cycle.

use crate::model::node::{NodeId, NodeKind, NodeRecord, NodeStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CodecResult<T> = Result<T, CodecError>;

/// Payload decode/encode failure.
#[derive(Debug)]
pub enum CodecError {
    /// Empty payloads mean "absent" and must be handled before decoding.
    Empty,
    Utf8(std::str::Utf8Error),
    Json(serde_json::Error),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "payload is empty"),
            Self::Utf8(err) => write!(f, "payload is not valid UTF-8: {err}"),
            Self::Json(err) => write!(f, "payload is not a valid structured literal: {err}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Empty => None,
            Self::Utf8(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<std::str::Utf8Error> for CodecError {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredNode {
    data: String,
    #[serde(rename = "nodeType")]
    node_type: NodeKind,
    #[serde(default)]
    relations: Option<Vec<NodeId>>,
    timestamp: i64,
    owner: String,
    #[serde(default)]
    status: Option<NodeStatus>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// Encodes one node record. The id is carried by the key, not the payload.
pub fn encode_node(record: &NodeRecord) -> CodecResult<Vec<u8>> {
    let stored = StoredNode {
        data: record.payload.clone(),
        node_type: record.kind.clone(),
        relations: Some(record.relations.clone()),
        timestamp: record.created_at,
        owner: record.owner.clone(),
        status: Some(record.status),
        extra: record.extra.clone(),
    };
    Ok(serde_json::to_vec(&stored)?)
}

/// Decodes one node record stored under the key for `id`.
pub fn decode_node(id: &str, bytes: &[u8]) -> CodecResult<NodeRecord> {
    let text = payload_text(bytes)?;
    let stored: StoredNode = serde_json::from_str(text)?;
    Ok(NodeRecord {
        id: id.to_string(),
        payload: stored.data,
        kind: stored.node_type,
        relations: stored.relations.unwrap_or_default(),
        created_at: stored.timestamp,
        owner: stored.owner,
        status: stored.status.unwrap_or_default(),
        extra: stored.extra,
    })
}

/// Encodes the ordered node id list.
pub fn encode_index(ids: &[NodeId]) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(ids)?)
}

/// Decodes the ordered node id list.
pub fn decode_index(bytes: &[u8]) -> CodecResult<Vec<NodeId>> {
    let text = payload_text(bytes)?;
    Ok(serde_json::from_str(text)?)
}

fn payload_text(bytes: &[u8]) -> CodecResult<&str> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(std::str::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::{decode_index, decode_node, encode_index, encode_node, CodecError};
    use crate::model::node::{NodeKind, NodeRecord, NodeStatus};
    use serde_json::{json, Value};

    #[test]
    fn decode_fills_missing_status_and_relations() {
        let bytes = br#"{"data":"FHE-abc","nodeType":"entity","timestamp":5,"owner":"0x1"}"#;
        let node = decode_node("5-aaaaaaa", bytes).expect("legacy payload should decode");
        assert_eq!(node.id, "5-aaaaaaa");
        assert_eq!(node.kind, NodeKind::Entity);
        assert_eq!(node.status, NodeStatus::Active);
        assert!(node.relations.is_empty());
    }

    #[test]
    fn decode_treats_null_optionals_as_missing() {
        let bytes = br#"{"data":"x","nodeType":"concept","relations":null,"timestamp":1,"owner":"o","status":null}"#;
        let node = decode_node("1-a", bytes).expect("null optionals should decode");
        assert_eq!(node.status, NodeStatus::Active);
        assert!(node.relations.is_empty());
    }

    #[test]
    fn decode_rejects_missing_required_fields_and_garbage() {
        assert!(matches!(
            decode_node("x", br#"{"nodeType":"concept"}"#),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(decode_node("x", b"not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode_node("x", &[0xff, 0xfe]), Err(CodecError::Utf8(_))));
        assert!(matches!(decode_node("x", b""), Err(CodecError::Empty)));
        assert!(matches!(
            decode_node("x", br#"{"data":"x","nodeType":"concept","timestamp":1,"owner":"o","status":"deleted"}"#),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn unknown_fields_and_kinds_survive_reencode() {
        let original = json!({
            "data": "FHE-eyJ9",
            "nodeType": "hypothesis",
            "relations": ["1-a", "2-b"],
            "timestamp": 1_700_000_000,
            "owner": "0xowner",
            "status": "archived",
            "confidence": 0.5
        });
        let bytes = serde_json::to_vec(&original).expect("fixture should serialize");
        let node = decode_node("3-c", &bytes).expect("payload should decode");
        assert_eq!(node.kind, NodeKind::Other("hypothesis".to_string()));

        let reencoded = encode_node(&node).expect("node should encode");
        let value: Value = serde_json::from_slice(&reencoded).expect("encoded payload is JSON");
        assert_eq!(value, original);
    }

    #[test]
    fn record_encode_decode_is_value_equal() {
        let node = NodeRecord::new("9-z", NodeKind::Relation, "blob", "0xabc", 42)
            .with_relations(vec!["1-a".to_string()]);
        let decoded = decode_node("9-z", &encode_node(&node).expect("encode"))
            .expect("decode");
        assert_eq!(decoded, node);
    }

    #[test]
    fn index_encodes_as_plain_string_list() {
        let ids = vec!["1-a".to_string(), "2-b".to_string()];
        let bytes = encode_index(&ids).expect("index should encode");
        assert_eq!(bytes, br#"["1-a","2-b"]"#.to_vec());
        assert_eq!(decode_index(&bytes).expect("index should decode"), ids);
        assert!(decode_index(br#"{"ids":[]}"#).is_err());
    }
}
