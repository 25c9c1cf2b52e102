//! Conversation identity
//!
//! Every two-party thread is keyed by the unordered pair of its participants.
//! All components derive keys through [`conversation_key`]; building a key any
//! other way splits a conversation in two.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between the two canonicalized participant ids
const KEY_SEPARATOR: char = '_';

/// Canonical key of a two-party conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a key from its stored form (e.g. a database column).
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Whether `user_id` is one of the two participants of this key
    pub fn involves(&self, user_id: Uuid) -> bool {
        let id = user_id.to_string();
        self.0
            .split(KEY_SEPARATOR)
            .any(|part| part == id.as_str())
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the conversation key for a pair of participants.
///
/// Commutative: the pair is ordered by the lexicographic order of the
/// hyphenated lowercase form before joining, so `(a, b)` and `(b, a)`
/// produce the same key.
pub fn conversation_key(a: Uuid, b: Uuid) -> ConversationKey {
    let (a, b) = (a.to_string(), b.to_string());
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    ConversationKey(format!("{first}{KEY_SEPARATOR}{second}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_commutative() {
        for _ in 0..64 {
            let a = Uuid::new_v4();
            let b = Uuid::new_v4();
            assert_eq!(conversation_key(a, b), conversation_key(b, a));
        }
    }

    #[test]
    fn test_distinct_pairs_get_distinct_keys() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_ne!(conversation_key(a, b), conversation_key(a, c));
    }

    #[test]
    fn test_key_orders_smaller_id_first() {
        let a = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
        let b = Uuid::parse_str("ffffffff-0000-4000-8000-000000000001").unwrap();
        let key = conversation_key(b, a);
        assert!(key.as_str().starts_with("00000000"));
        assert!(key.involves(a));
        assert!(key.involves(b));
        assert!(!key.involves(Uuid::new_v4()));
    }

    #[test]
    fn test_key_serializes_as_plain_string() {
        let key = conversation_key(Uuid::new_v4(), Uuid::new_v4());
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.as_str()));
    }
}
