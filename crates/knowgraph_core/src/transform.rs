//! Confidentiality transform seam.
//!
//! The store runs raw node content through a `ConfidentialityTransform`
//! before anything reaches the ledger and never inverts the result.

use crate::model::node::NodeKind;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

/// Pure mapping from raw node content to an opaque stored blob.
pub trait ConfidentialityTransform: Send + Sync {
    fn transform(&self, kind: &NodeKind, plain: &[u8]) -> String;
}

impl<F> ConfidentialityTransform for F
where
    F: Fn(&NodeKind, &[u8]) -> String + Send + Sync,
{
    fn transform(&self, kind: &NodeKind, plain: &[u8]) -> String {
        self(kind, plain)
    }
}

/// Prefix marking envelope-encoded payloads.
pub const ENVELOPE_PREFIX: &str = "FHE-";

/// Placeholder envelope compatible with payloads written by the web client:
/// `FHE-` followed by base64 of `{"content": .., "type": ..}`.
///
/// This is an encoding, not encryption.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeTransform;

#[derive(Serialize)]
struct Envelope<'a> {
    content: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl ConfidentialityTransform for EnvelopeTransform {
    fn transform(&self, kind: &NodeKind, plain: &[u8]) -> String {
        let content = String::from_utf8_lossy(plain);
        let envelope = Envelope {
            content: &content,
            kind: kind.as_str(),
        };
        // Serializing two string fields cannot fail.
        let json = serde_json::to_vec(&envelope).unwrap_or_default();
        format!("{ENVELOPE_PREFIX}{}", STANDARD.encode(json))
    }
}
