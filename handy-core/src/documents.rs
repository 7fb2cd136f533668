//! Document database capability.
//!
//! Documents are addressed by collection and id. Payloads travel as JSON
//! field maps; typed access goes through [`Record`] so each collection has
//! an explicit schema.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Timestamp;
use crate::error::DocumentError;
use crate::records::Record;

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// Default page size for [`DocumentStore::list`].
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Collections known to the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Services,
    Bookings,
    Reviews,
    Chats,
    Messages,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Services => "services",
            Collection::Bookings => "bookings",
            Collection::Reviews => "reviews",
            Collection::Chats => "chats",
            Collection::Messages => "messages",
        }
    }

    pub fn all() -> &'static [Collection] {
        &[
            Collection::Users,
            Collection::Services,
            Collection::Bookings,
            Collection::Reviews,
            Collection::Chats,
            Collection::Messages,
        ]
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document: its id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Decode the fields into a typed record of `R`'s collection.
    pub fn decode<R: Record>(&self) -> Result<R, DocumentError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            DocumentError::Schema {
                collection: R::COLLECTION.to_string(),
                id: self.id.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Cursor-based page request, ordered by document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub start_after: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            start_after: None,
        }
    }
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            start_after: None,
        }
    }

    /// Request the page following `page`, or `None` when `page` was the last.
    pub fn after(page: &Page, limit: usize) -> Option<Self> {
        page.last_id.as_ref().map(|id| Self {
            limit,
            start_after: Some(id.clone()),
        })
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub documents: Vec<Document>,
    /// Id of the last document when more may follow.
    pub last_id: Option<String>,
}

/// Document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document. A missing document is `Ok(None)`.
    async fn get(&self, collection: Collection, id: &str)
        -> Result<Option<Document>, DocumentError>;

    /// Write a document. With `merge`, fields are merged into an existing
    /// document; otherwise the document is replaced.
    async fn set(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), DocumentError>;

    /// Merge fields into an existing document. Fails with `NotFound` if the
    /// document does not exist.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<(), DocumentError>;

    /// List documents of a collection ordered by id.
    async fn list(&self, collection: Collection, page: PageRequest)
        -> Result<Page, DocumentError>;
}

/// Load a typed record. Missing documents are `Ok(None)`.
pub async fn get_record<R, S>(store: &S, id: &str) -> Result<Option<R>, DocumentError>
where
    R: Record,
    S: DocumentStore + ?Sized,
{
    match store.get(R::COLLECTION, id).await? {
        Some(document) => document.decode().map(Some),
        None => Ok(None),
    }
}

/// Store a typed record.
pub async fn set_record<R, S>(
    store: &S,
    id: &str,
    record: &R,
    merge: bool,
) -> Result<(), DocumentError>
where
    R: Record,
    S: DocumentStore + ?Sized,
{
    let fields = match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => {
            return Err(DocumentError::Schema {
                collection: R::COLLECTION.to_string(),
                id: id.to_string(),
                reason: "record did not serialize to an object".to_string(),
            })
        }
        Err(e) => {
            return Err(DocumentError::Schema {
                collection: R::COLLECTION.to_string(),
                id: id.to_string(),
                reason: e.to_string(),
            })
        }
    };
    store.set(R::COLLECTION, id, fields, merge).await
}

/// Update a document and stamp `updatedAt` with `now` in epoch milliseconds.
pub async fn update_stamped<S>(
    store: &S,
    collection: Collection,
    id: &str,
    mut fields: Fields,
    now: Timestamp,
) -> Result<(), DocumentError>
where
    S: DocumentStore + ?Sized,
{
    fields.insert("updatedAt".to_string(), Value::from(now.timestamp_millis()));
    store.update(collection, id, fields).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::UserRecord;
    use serde_json::json;

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::Users.as_str(), "users");
        assert_eq!(Collection::Bookings.to_string(), "bookings");
        assert_eq!(Collection::all().len(), 6);
    }

    #[test]
    fn test_decode_schema_error_names_document() {
        let mut fields = Fields::new();
        fields.insert("email".to_string(), json!(42));
        let document = Document::new("u1", fields);

        let err = document
            .decode::<UserRecord>()
            .expect_err("numeric email should not decode");
        match err {
            DocumentError::Schema { collection, id, .. } => {
                assert_eq!(collection, "users");
                assert_eq!(id, "u1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_page_request_after() {
        let last = Page {
            documents: vec![],
            last_id: Some("b".to_string()),
        };
        let next = PageRequest::after(&last, 5).expect("more pages");
        assert_eq!(next.start_after.as_deref(), Some("b"));
        assert_eq!(next.limit, 5);

        let done = Page::default();
        assert!(PageRequest::after(&done, 5).is_none());
        assert_eq!(PageRequest::default().limit, DEFAULT_PAGE_SIZE);
    }
}
