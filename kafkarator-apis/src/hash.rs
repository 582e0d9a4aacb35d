use serde::Serialize;

use crate::{Config, StreamSpec, TopicAcl, TopicSpec, canonical_acls};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

#[derive(thiserror::Error, Debug)]
#[error("failed to serialize spec for hashing: {0}")]
pub struct HashError(#[from] serde_json::Error);

/// Specs that can be fingerprinted for change detection.
pub trait SpecHash {
    /// Canonical JSON bytes of the spec.
    fn canonical_json(&self) -> Result<Vec<u8>, serde_json::Error>;
}

#[derive(Serialize)]
struct CanonicalTopicSpec<'a> {
    pool: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a Config>,
    acl: Option<Vec<&'a TopicAcl>>,
}

impl SpecHash for TopicSpec {
    fn canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let acl = canonical_acls(&self.acl);
        serde_json::to_vec(&CanonicalTopicSpec {
            pool: &self.pool,
            config: self.config.as_ref(),
            acl: if acl.is_empty() { None } else { Some(acl) },
        })
    }
}

impl SpecHash for StreamSpec {
    fn canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn fnv1(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |h, b| {
        h.wrapping_mul(FNV_PRIME) ^ u64::from(*b)
    })
}

/// Structural hash of a byte sequence, every element hashed on its own and
/// folded into the running value.
fn fold(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |h, b| {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&h.to_le_bytes());
        buf[8..].copy_from_slice(&fnv1(&[*b]).to_le_bytes());
        fnv1(&buf)
    })
}

/// Stable fingerprint of a spec as 16 lowercase hex digits.
pub fn spec_hash<S: SpecHash>(spec: &S) -> Result<String, HashError> {
    let json = spec.canonical_json()?;
    Ok(format!("{:016x}", fold(&json)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Access;

    fn spec(acl: Vec<TopicAcl>) -> TopicSpec {
        TopicSpec {
            pool: "nav-dev".to_string(),
            config: Some(Config {
                partitions: Some(1),
                retention_hours: Some(72),
                ..Default::default()
            }),
            acl,
        }
    }

    #[test]
    fn empty_topic_spec() {
        let empty = TopicSpec {
            pool: String::new(),
            config: None,
            acl: vec![],
        };
        assert_eq!(
            r#"{"pool":"","acl":null}"#,
            String::from_utf8(empty.canonical_json().unwrap()).unwrap()
        );
        assert_eq!("dd7b6d7c6d11a91f", spec_hash(&empty).unwrap());
    }

    #[test]
    fn acl_order_and_duplicates_do_not_matter() {
        let a = TopicAcl::new(Access::Read, "team", "app");
        let b = TopicAcl::new(Access::Write, "other", "producer");
        let one = spec(vec![a.clone(), b.clone()]);
        let two = spec(vec![b.clone(), a.clone(), b.clone()]);
        assert_eq!(spec_hash(&one).unwrap(), spec_hash(&two).unwrap());
    }

    #[test]
    fn spec_changes_change_the_hash() {
        let acl = vec![TopicAcl::new(Access::Read, "team", "app")];
        let base = spec(acl.clone());
        let mut changed = spec(acl);
        changed.config.as_mut().unwrap().partitions = Some(2);
        let base_hash = spec_hash(&base).unwrap();
        assert_eq!(16, base_hash.len());
        assert_eq!(base_hash, spec_hash(&base).unwrap());
        assert_ne!(base_hash, spec_hash(&changed).unwrap());
    }

    #[test]
    fn stream_spec_hash() {
        let s = StreamSpec {
            pool: "nav-dev".to_string(),
            user: None,
        };
        let mut other = s.clone();
        other.user = Some("app".to_string());
        assert_ne!(spec_hash(&s).unwrap(), spec_hash(&other).unwrap());
    }
}
