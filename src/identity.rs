use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

/// GitHub username → Discord user id, supplied by the operator as a
/// base64-encoded JSON object. Read-only for the run's duration.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<String, String>,
}

impl IdentityMap {
    /// A bad or absent mapping degrades to an empty map: notifications for
    /// unmapped users are skipped later, one at a time, with a notice.
    pub fn from_base64(encoded: Option<&str>) -> Self {
        let Some(encoded) = encoded else {
            return Self::default();
        };
        let decoded = match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Error decoding user mapping (invalid base64): {}", e);
                return Self::default();
            }
        };
        match serde_json::from_slice::<HashMap<String, serde_json::Value>>(&decoded) {
            Ok(raw) => Self {
                // Discord ids arrive as JSON strings or bare numbers
                // depending on how the operator wrote the secret.
                entries: raw
                    .into_iter()
                    .filter_map(|(user, id)| match id {
                        serde_json::Value::String(s) => Some((user, s)),
                        serde_json::Value::Number(n) => Some((user, n.to_string())),
                        _ => None,
                    })
                    .collect(),
            },
            Err(e) => {
                warn!("Error decoding user mapping (invalid JSON): {}", e);
                Self::default()
            }
        }
    }

    pub fn resolve(&self, username: &str) -> Option<&str> {
        self.entries.get(username).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    #[test]
    fn test_valid_mapping_resolves() {
        let encoded = STANDARD.encode(r#"{"alice": "111", "bob": "222"}"#);
        let map = IdentityMap::from_base64(Some(&encoded));
        assert_eq!(map.len(), 2);
        assert_eq!(map.resolve("alice"), Some("111"));
        assert_eq!(map.resolve("carol"), None);
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let encoded = STANDARD.encode(r#"{"alice": 111}"#);
        let map = IdentityMap::from_base64(Some(&encoded));
        assert_eq!(map.resolve("alice"), Some("111"));
    }

    #[test]
    fn test_absent_mapping_is_empty() {
        assert!(IdentityMap::from_base64(None).is_empty());
    }

    #[test]
    fn test_invalid_base64_is_empty() {
        assert!(IdentityMap::from_base64(Some("not base64!!!")).is_empty());
    }

    #[test]
    fn test_non_json_content_is_empty() {
        let encoded = STANDARD.encode("just some text");
        assert!(IdentityMap::from_base64(Some(&encoded)).is_empty());
    }
}
