//! External identifier encoding
//!
//! Internal keys never leave the service in raw form. [`IdentifierCodec`]
//! turns a key into an opaque string and back, and can rewrite every
//! id-like field of a JSON structure in place.
//!
//! [`KeyedIdCodec`] is a 4-round Feistel permutation over the 64-bit key,
//! with SHA-256 round functions keyed by a configured secret. The output is
//! the permuted block as 16 lowercase hex characters, so every key has
//! exactly one encoding and decoding is exact.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{CollectionError, Result};
use crate::model::Key;

const ROUNDS: usize = 4;
const ENCODED_LEN: usize = 16;

/// Keys ending in `_id` that carry foreign identifiers, not internal keys.
const PASSTHROUGH_KEYS: &[&str] = &["tool_id", "external_id"];

pub trait IdentifierCodec: Send + Sync {
    fn encode_id(&self, id: Key) -> String;

    fn decode_id(&self, encoded: &str) -> Result<Key>;

    /// Replace every integer under `id`, `*_id` and `*_ids` keys with its
    /// encoded form. With `recursive`, nested objects and arrays are walked
    /// to any depth. Values that are already strings are left untouched.
    fn encode_all_ids(&self, value: &mut Value, recursive: bool) {
        let Value::Object(map) = value else {
            return;
        };

        for (key, entry) in map.iter_mut() {
            if is_id_key(key) {
                if let Some(raw) = entry.as_i64() {
                    *entry = Value::String(self.encode_id(raw));
                    continue;
                }
            }

            if key.ends_with("_ids") && entry.is_array() {
                if let Value::Array(items) = entry {
                    let raw: Option<Vec<Key>> = items.iter().map(Value::as_i64).collect();
                    if let Some(raw) = raw {
                        *items = raw
                            .into_iter()
                            .map(|id| Value::String(self.encode_id(id)))
                            .collect();
                    }
                }
                continue;
            }

            if recursive {
                match entry {
                    Value::Object(_) => self.encode_all_ids(entry, true),
                    Value::Array(items) => {
                        for item in items.iter_mut() {
                            self.encode_all_ids(item, true);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn is_id_key(key: &str) -> bool {
    (key == "id" || key.ends_with("_id")) && !PASSTHROUGH_KEYS.contains(&key)
}

/// Secret-keyed reversible id encoding.
#[derive(Clone)]
pub struct KeyedIdCodec {
    round_keys: [[u8; 32]; ROUNDS],
}

impl KeyedIdCodec {
    pub fn new(secret: &str) -> Self {
        let mut round_keys = [[0u8; 32]; ROUNDS];
        for (round, slot) in round_keys.iter_mut().enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(secret.as_bytes());
            hasher.update([round as u8]);
            slot.copy_from_slice(&hasher.finalize());
        }
        Self { round_keys }
    }

    fn round(&self, round: usize, half: u32) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(self.round_keys[round]);
        hasher.update(half.to_be_bytes());
        let digest = hasher.finalize();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    fn permute(&self, block: u64) -> u64 {
        let (mut left, mut right) = ((block >> 32) as u32, block as u32);
        for round in 0..ROUNDS {
            let next = left ^ self.round(round, right);
            left = right;
            right = next;
        }
        (u64::from(left) << 32) | u64::from(right)
    }

    fn unpermute(&self, block: u64) -> u64 {
        let (mut left, mut right) = ((block >> 32) as u32, block as u32);
        for round in (0..ROUNDS).rev() {
            let previous = right ^ self.round(round, left);
            right = left;
            left = previous;
        }
        (u64::from(left) << 32) | u64::from(right)
    }
}

impl std::fmt::Debug for KeyedIdCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedIdCodec").finish_non_exhaustive()
    }
}

impl IdentifierCodec for KeyedIdCodec {
    fn encode_id(&self, id: Key) -> String {
        hex::encode(self.permute(id as u64).to_be_bytes())
    }

    fn decode_id(&self, encoded: &str) -> Result<Key> {
        if encoded.len() != ENCODED_LEN {
            return Err(CollectionError::InvalidIdentifier(format!(
                "'{encoded}' is not a {ENCODED_LEN}-character id"
            )));
        }
        let bytes = hex::decode(encoded)
            .map_err(|e| CollectionError::InvalidIdentifier(format!("'{encoded}': {e}")))?;
        let block: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
            CollectionError::InvalidIdentifier(format!("'{encoded}' has the wrong length"))
        })?;
        Ok(self.unpermute(u64::from_be_bytes(block)) as Key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> KeyedIdCodec {
        KeyedIdCodec::new("unit-test-secret")
    }

    #[test]
    fn test_round_trip_keys() {
        let codec = codec();
        for id in [0, 1, 2, 42, 1_000_000, Key::MAX] {
            let encoded = codec.encode_id(id);
            assert_eq!(encoded.len(), 16);
            assert_eq!(codec.decode_id(&encoded).unwrap(), id);
        }
    }

    #[test]
    fn test_encoding_hides_raw_key() {
        let codec = codec();
        assert_ne!(codec.encode_id(1), format!("{:016x}", 1));
        assert_ne!(codec.encode_id(1), codec.encode_id(2));
    }

    #[test]
    fn test_secret_changes_encoding() {
        let a = KeyedIdCodec::new("alpha");
        let b = KeyedIdCodec::new("beta");
        assert_ne!(a.encode_id(7), b.encode_id(7));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let codec = codec();
        for bad in ["", "abc", "zzzzzzzzzzzzzzzz", "0123456789abcdef0", "not-an-id!!!!!!!"] {
            let err = codec.decode_id(bad).unwrap_err();
            assert!(
                matches!(err, CollectionError::InvalidIdentifier(_)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_encode_all_ids_recursive() {
        let codec = codec();
        let mut value = json!({
            "id": 5,
            "element_index": 3,
            "hid": 9,
            "tool_id": "cat1",
            "object": {
                "id": 11,
                "history_id": 2,
                "elements": [{ "id": 12, "object": { "id": 13 } }],
            },
            "input_ids": [1, 2],
        });

        codec.encode_all_ids(&mut value, true);

        assert_eq!(value["id"], json!(codec.encode_id(5)));
        assert_eq!(value["element_index"], json!(3));
        assert_eq!(value["hid"], json!(9));
        assert_eq!(value["tool_id"], json!("cat1"));
        assert_eq!(value["object"]["id"], json!(codec.encode_id(11)));
        assert_eq!(value["object"]["history_id"], json!(codec.encode_id(2)));
        assert_eq!(
            value["object"]["elements"][0]["object"]["id"],
            json!(codec.encode_id(13))
        );
        assert_eq!(
            value["input_ids"],
            json!([codec.encode_id(1), codec.encode_id(2)])
        );
    }

    #[test]
    fn test_encode_all_ids_shallow_leaves_nested() {
        let codec = codec();
        let mut value = json!({ "id": 1, "object": { "id": 2 } });
        codec.encode_all_ids(&mut value, false);
        assert_eq!(value["id"], json!(codec.encode_id(1)));
        assert_eq!(value["object"]["id"], json!(2));
    }

    #[test]
    fn test_encode_all_ids_is_idempotent_on_strings() {
        let codec = codec();
        let mut value = json!({ "id": 1 });
        codec.encode_all_ids(&mut value, true);
        let once = value.clone();
        codec.encode_all_ids(&mut value, true);
        assert_eq!(value, once);
    }
}
