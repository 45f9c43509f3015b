//! Embedded one-level relations.
//!
//! Relation embedding comes back either as a single JSON record (point
//! lookups) or as a JSON collection (list queries). Both shapes are
//! collapsed into a plain `Option` here so nothing past the store ever
//! sees the difference.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::models::UserId;

/// A related row as the query layer returned it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Related<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Related<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Related::Many(rows) => rows.into_iter().next(),
            Related::One(row) => Some(row),
        }
    }
}

/// The post owner as embedded next to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: UserId,
    pub display_name: Option<String>,
}

/// Decode an embedded relation column (`NULL`, a record or a collection).
pub fn decode_related<T: DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>, serde_json::Error> {
    match raw {
        None => Ok(None),
        Some(json) => {
            let related: Option<Related<T>> = serde_json::from_str(json)?;
            Ok(related.and_then(Related::into_option))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_singleton_collection_agree() {
        let record: Option<OwnerRef> =
            decode_related(Some(r#"{"id":"u1","display_name":"Ana"}"#)).unwrap();
        let collection: Option<OwnerRef> =
            decode_related(Some(r#"[{"id":"u1","display_name":"Ana"}]"#)).unwrap();
        assert_eq!(record, collection);
        assert_eq!(record.unwrap().display_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn empty_collection_null_and_missing_are_absent() {
        assert_eq!(decode_related::<OwnerRef>(Some("[]")).unwrap(), None);
        assert_eq!(decode_related::<OwnerRef>(Some("null")).unwrap(), None);
        assert_eq!(decode_related::<OwnerRef>(None).unwrap(), None);
    }

    #[test]
    fn collection_keeps_first_row() {
        let owner: Option<OwnerRef> = decode_related(Some(
            r#"[{"id":"u1","display_name":"Ana"},{"id":"u2","display_name":"Bo"}]"#,
        ))
        .unwrap();
        assert_eq!(owner.unwrap().id, UserId::new("u1"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(decode_related::<OwnerRef>(Some("{oops")).is_err());
    }
}
