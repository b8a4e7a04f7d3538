//! Document-store seam.
//!
//! All persistent state lives in an external document database. The crate
//! only talks to it through [`DocumentStore`]; [`MemoryStore`] is the
//! in-process implementation used for seeding, tests and local runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::StoreError;

/// Collection holding [`crate::models::User`] records.
pub const USERS: &str = "usuarios";
/// Collection holding [`crate::models::Trip`] records.
pub const TRIPS: &str = "viajes";
/// Collection holding [`crate::models::Expense`] records.
pub const EXPENSES: &str = "gastos";

/// A stored document: its id plus a flat map of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Filter evaluated by the store itself.
///
/// Equality on any field, range bounds on a single sortable field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq { field: String, value: Value },
    Gte { field: String, value: Value },
    Lte { field: String, value: Value },
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Gte {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Lte {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Predicate::Eq { field, .. }
            | Predicate::Gte { field, .. }
            | Predicate::Lte { field, .. } => field,
        }
    }

    fn is_range(&self) -> bool {
        !matches!(self, Predicate::Eq { .. })
    }

    /// Documents missing the field never match.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(self.field()) else {
            return false;
        };

        match self {
            Predicate::Eq { value, .. } => actual == value,
            Predicate::Gte { value, .. } => matches!(
                compare(actual, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::Lte { value, .. } => matches!(
                compare(actual, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Rejects queries with range bounds on more than one field.
pub fn validate_predicates(predicates: &[Predicate]) -> Result<(), StoreError> {
    let mut range_field: Option<&str> = None;
    for predicate in predicates.iter().filter(|p| p.is_range()) {
        match range_field {
            Some(field) if field != predicate.field() => {
                return Err(StoreError::InvalidQuery(format!(
                    "range filters on both '{}' and '{}'",
                    field,
                    predicate.field()
                )));
            }
            _ => range_field = Some(predicate.field()),
        }
    }
    Ok(())
}

/// Operations consumed from the external document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of `collection` matching all `predicates`, in insertion order.
    async fn read_collection(
        &self,
        collection: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Document>, StoreError>;

    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Stores a new document and returns its generated id.
    async fn insert(&self, collection: &str, fields: Map<String, Value>)
    -> Result<String, StoreError>;

    /// Merges `fields` into an existing document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Deleting an id that does not exist succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// In-memory DocumentStore for seeding, tests and local runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a seed document shaped as
    /// `{ "<collection>": [ { "id": "...", ...fields } ] }`.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let collections: HashMap<String, Vec<Document>> = serde_json::from_str(json)
            .map_err(|e| StoreError::Decode {
                id: "seed".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            collections: Arc::new(Mutex::new(collections)),
        })
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot read seed {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Document>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_collection(
        &self,
        collection: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Document>, StoreError> {
        validate_predicates(predicates)?;

        let collections = self.lock();
        let docs = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| predicates.iter().all(|p| p.matches(doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(docs)
    }

    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.lock();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .cloned())
    }

    async fn insert(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .push(Document::new(id.clone(), fields));
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut collections = self.lock();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        doc.fields.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(docs) = self.lock().get_mut(collection) {
            docs.retain(|doc| doc.id != id);
        }
        Ok(())
    }
}

/// Store doubles shared by the unit tests of the view layer.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    /// Fails every operation on the named collection.
    pub struct FailingStore {
        pub inner: MemoryStore,
        pub failing: &'static str,
    }

    impl FailingStore {
        fn check(&self, collection: &str) -> Result<(), StoreError> {
            if collection == self.failing {
                Err(StoreError::Unavailable("permission denied".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn read_collection(
            &self,
            collection: &str,
            predicates: &[Predicate],
        ) -> Result<Vec<Document>, StoreError> {
            self.check(collection)?;
            self.inner.read_collection(collection, predicates).await
        }

        async fn read_one(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<Document>, StoreError> {
            self.check(collection)?;
            self.inner.read_one(collection, id).await
        }

        async fn insert(
            &self,
            collection: &str,
            fields: Map<String, Value>,
        ) -> Result<String, StoreError> {
            self.check(collection)?;
            self.inner.insert(collection, fields).await
        }

        async fn update(
            &self,
            collection: &str,
            id: &str,
            fields: Map<String, Value>,
        ) -> Result<(), StoreError> {
            self.check(collection)?;
            self.inner.update(collection, id, fields).await
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
            self.check(collection)?;
            self.inner.delete(collection, id).await
        }
    }

    /// Delays the n-th collection read on `collection` by the matching entry of `delays`.
    pub struct DelayedStore {
        pub inner: MemoryStore,
        pub collection: &'static str,
        pub delays: Vec<Duration>,
        pub calls: AtomicUsize,
    }

    impl DelayedStore {
        pub fn new(inner: MemoryStore, collection: &'static str, delays: Vec<Duration>) -> Self {
            Self {
                inner,
                collection,
                delays,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for DelayedStore {
        async fn read_collection(
            &self,
            collection: &str,
            predicates: &[Predicate],
        ) -> Result<Vec<Document>, StoreError> {
            if collection == self.collection {
                let call = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
                if let Some(delay) = self.delays.get(call) {
                    tokio::time::sleep(*delay).await;
                }
            }
            self.inner.read_collection(collection, predicates).await
        }

        async fn read_one(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<Document>, StoreError> {
            self.inner.read_one(collection, id).await
        }

        async fn insert(
            &self,
            collection: &str,
            fields: Map<String, Value>,
        ) -> Result<String, StoreError> {
            self.inner.insert(collection, fields).await
        }

        async fn update(
            &self,
            collection: &str,
            id: &str,
            fields: Map<String, Value>,
        ) -> Result<(), StoreError> {
            self.inner.update(collection, id, fields).await
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
            self.inner.delete(collection, id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_in_insertion_order() {
        let store = MemoryStore::new();

        let first = store
            .insert(TRIPS, fields(json!({"empresa": "A"})))
            .await
            .unwrap();
        let second = store
            .insert(TRIPS, fields(json!({"empresa": "B"})))
            .await
            .unwrap();

        let docs = store.read_collection(TRIPS, &[]).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, first);
        assert_eq!(docs[1].id, second);
    }

    #[tokio::test]
    async fn test_equality_and_range_predicates() {
        let store = MemoryStore::from_json(
            r#"{"gastos": [
                {"id": "g1", "empresa": "A", "creadoEn": 100},
                {"id": "g2", "empresa": "B", "creadoEn": 200},
                {"id": "g3", "empresa": "A", "creadoEn": 300},
                {"id": "g4", "empresa": "A"}
            ]}"#,
        )
        .unwrap();

        let docs = store
            .read_collection(
                EXPENSES,
                &[
                    Predicate::eq("empresa", "A"),
                    Predicate::gte("creadoEn", 100),
                    Predicate::lte("creadoEn", 250),
                ],
            )
            .await
            .unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["g1"]);
    }

    #[tokio::test]
    async fn test_range_on_two_fields_is_rejected() {
        let store = MemoryStore::new();
        let result = store
            .read_collection(
                EXPENSES,
                &[Predicate::gte("creadoEn", 1), Predicate::lte("monto", 10)],
            )
            .await;

        assert!(matches!(result, Err(StoreError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        let id = store
            .insert(USERS, fields(json!({"nombre": "Ana", "rol": "transportista"})))
            .await
            .unwrap();

        store
            .update(USERS, &id, fields(json!({"rol": "admin"})))
            .await
            .unwrap();

        let doc = store.read_one(USERS, &id).await.unwrap().unwrap();
        assert_eq!(doc.get("nombre"), Some(&json!("Ana")));
        assert_eq!(doc.get("rol"), Some(&json!("admin")));
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryStore::new();
        let result = store.update(USERS, "nope", Map::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::from_json(r#"{"viajes": [{"id": "v1"}]}"#).unwrap();

        store.delete(TRIPS, "v1").await.unwrap();
        store.delete(TRIPS, "v1").await.unwrap();
        store.delete(TRIPS, "missing").await.unwrap();

        assert!(store.read_collection(TRIPS, &[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_bad_seed_is_a_decode_error() {
        let result = MemoryStore::from_json("[1, 2, 3]");
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }
}
