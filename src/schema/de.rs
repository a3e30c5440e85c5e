use crate::schema::decoded::{Decoded, Hex};
use crate::schema::error;
use crate::schema::key::Key;
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;
use snafu::ensure;
use std::collections::HashMap;
use std::fmt;

/// Validates the key ID for each key during deserialization and fails if any don't match.
pub(super) fn deserialize_keys<'de, D>(
    deserializer: D,
) -> Result<HashMap<Decoded<Hex>, Key>, D::Error>
where
    D: Deserializer<'de>,
{
    // An inner function that does actual key ID validation:
    // * fails if a key ID doesn't match its contents
    // * fails if there is a duplicate key ID
    // If this passes we insert the entry.
    fn validate_and_insert_entry(
        keyid: Decoded<Hex>,
        key: Key,
        map: &mut HashMap<Decoded<Hex>, Key>,
    ) -> Result<(), error::Error> {
        let calculated = key.key_id()?.clone();
        let keyid_hex = hex::encode(&keyid);
        ensure!(
            keyid == calculated,
            error::InvalidKeyIdSnafu {
                keyid: keyid_hex.clone(),
                calculated: hex::encode(&calculated),
            }
        );
        ensure!(
            map.insert(keyid, key).is_none(),
            error::DuplicateKeyIdSnafu { keyid: keyid_hex }
        );
        Ok(())
    }

    // The rest of this is fitting the above function into serde and doing error type conversion.
    struct Visitor;

    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = HashMap<Decoded<Hex>, Key>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map")
        }

        fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
        where
            M: serde::de::MapAccess<'de>,
        {
            let mut map = HashMap::new();
            while let Some((keyid, key)) = access.next_entry()? {
                validate_and_insert_entry(keyid, key, &mut map).map_err(M::Error::custom)?;
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(Visitor)
}

/// Deserializes the remaining fields of a role, skipping the `_type` tag that
/// serde already accounts for, so that it is not duplicated on serialization.
pub(super) fn extra_skip_type<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut map = HashMap::deserialize(deserializer)?;
    map.remove("_type");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use crate::schema::key::Key;
    use crate::schema::{Root, Signed};

    fn key_json(key: &Key) -> (String, String) {
        let keyid = key.key_id().unwrap().to_string();
        (keyid, serde_json::to_string(key).unwrap())
    }

    /// A root whose key is registered under the wrong ID fails to parse.
    #[test]
    fn mismatched_key_id_rejected() {
        let key = Key::ed25519("2f685fa7546f1856b123223ab086b3def14c89d24eef18f49c32508c2f60e241");
        let (_, key_json) = key_json(&key);
        let bad_id = "00".repeat(32);
        let json = format!(
            concat!(
                r#"{{"signed":{{"_type":"root","spec_version":"1.0.31","consistent_snapshot":false,"#,
                r#""version":1,"expires":"2038-01-01T00:00:00Z","keys":{{"{bad_id}":{key}}},"#,
                r#""roles":{{}}}},"signatures":[]}}"#
            ),
            bad_id = bad_id,
            key = key_json,
        );
        let err = Signed::<Root>::from_bytes(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Invalid key ID"), "{err}");
    }

    /// The same key ID twice in the keys map fails to parse.
    #[test]
    fn duplicate_key_id_rejected() {
        let key = Key::ed25519("2f685fa7546f1856b123223ab086b3def14c89d24eef18f49c32508c2f60e241");
        let (keyid, key_json) = key_json(&key);
        let json = format!(
            concat!(
                r#"{{"signed":{{"_type":"root","spec_version":"1.0.31","consistent_snapshot":false,"#,
                r#""version":1,"expires":"2038-01-01T00:00:00Z","#,
                r#""keys":{{"{keyid}":{key},"{keyid}":{key}}},"roles":{{}}}},"signatures":[]}}"#
            ),
            keyid = keyid,
            key = key_json,
        );
        let err = Signed::<Root>::from_bytes(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Duplicate key ID"), "{err}");
    }
}
