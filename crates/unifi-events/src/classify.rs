//! Classification of raw stream elements into `<group>.<name>` topics.
//!
//! Controller events carry a `key` such as `EVT_WU_Connected` (wireless
//! user connected) or `EVT_SW_Lost_Contact` (switch lost contact). The
//! two-letter group becomes the first topic segment and the remainder the
//! second, both lower-cased: `wu.connected`, `sw.lost_contact`.

use serde_json::Value;

use crate::bus::EventBus;

const KEY_MARKER: &str = "EVT_";

/// Result of classifying one raw element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Event { group: String, name: String },
    /// No `key`, or a key outside the `EVT_<XX>_<name>` scheme.
    Ignored,
}

impl Classification {
    /// Dotted topic for a classified event.
    pub fn topic(&self) -> Option<String> {
        match self {
            Self::Event { group, name } => Some(format!("{group}.{name}")),
            Self::Ignored => None,
        }
    }
}

/// Match `key` against `EVT_<two uppercase letters>_<name>`.
///
/// The marker may appear anywhere in the key; the first occurrence that
/// satisfies the scheme wins. An empty name does not match: `EVT_WU_` would
/// otherwise publish under `wu.`, a topic with an empty trailing segment.
pub fn classify_key(key: &str) -> Classification {
    for (start, _) in key.match_indices(KEY_MARKER) {
        let rest = &key[start + KEY_MARKER.len()..];
        let bytes = rest.as_bytes();
        let shaped = bytes.len() > 3
            && bytes[0].is_ascii_uppercase()
            && bytes[1].is_ascii_uppercase()
            && bytes[2] == b'_';
        if shaped {
            return Classification::Event {
                group: rest[..2].to_ascii_lowercase(),
                name: rest[3..].to_lowercase(),
            };
        }
    }
    Classification::Ignored
}

/// Classify a raw element by its `key` field.
pub fn classify(element: &Value) -> Classification {
    element
        .get("key")
        .and_then(Value::as_str)
        .map_or(Classification::Ignored, classify_key)
}

/// Classify `element` and publish it under its topic.
///
/// Returns the topic when the element was published.
pub fn dispatch(bus: &EventBus, element: Value) -> Option<String> {
    let Some(topic) = classify(&element).topic() else {
        tracing::trace!(key = ?element.get("key"), "dropping unclassified element");
        return None;
    };
    bus.publish(&topic, element);
    Some(topic)
}
