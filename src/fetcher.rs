//! Typed reads against the document store, plus the per-view request scope
//! that keeps late or superseded responses from being applied.

use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{AppError, StoreError};
use crate::models::{Expense, Record, Trip, User};
use crate::store::{Document, DocumentStore, Predicate, TRIPS, USERS};

/// Identifies one request issued by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// What happened to a response handed to [`ViewScope::deliver`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    Applied(T),
    /// A newer request was issued after this one.
    Stale,
    /// The view was torn down.
    Closed,
}

impl<T> Delivery<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Delivery::Applied(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Delivery<U> {
        match self {
            Delivery::Applied(value) => Delivery::Applied(f(value)),
            Delivery::Stale => Delivery::Stale,
            Delivery::Closed => Delivery::Closed,
        }
    }
}

/// Lifetime of one mounted view.
///
/// Only the latest ticket may apply its result, and nothing applies after
/// [`close`](Self::close).
#[derive(Debug, Default)]
pub struct ViewScope {
    latest: AtomicU64,
    closed: AtomicBool,
}

impl ViewScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        !self.is_closed() && self.latest.load(Ordering::SeqCst) == ticket.0
    }

    pub fn deliver<T>(&self, ticket: RequestTicket, value: T) -> Delivery<T> {
        if self.is_closed() {
            debug!("request {} finished after its view closed", ticket.0);
            Delivery::Closed
        } else if self.latest.load(Ordering::SeqCst) != ticket.0 {
            debug!("request {} superseded, dropping response", ticket.0);
            Delivery::Stale
        } else {
            Delivery::Applied(value)
        }
    }
}

/// Decodes every document, skipping the ones that do not fit `T`.
pub fn decode_all<T: Record>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match T::from_document(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("skipping document in {}: {}", T::COLLECTION, e);
                None
            }
        })
        .collect()
}

/// Typed collection reads shared by every view.
#[derive(Clone)]
pub struct Fetcher {
    store: Arc<dyn DocumentStore>,
}

impl Fetcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    async fn read<T: Record>(&self, predicates: &[Predicate]) -> Result<Vec<T>, AppError> {
        let docs = self
            .store
            .read_collection(T::COLLECTION, predicates)
            .await
            .map_err(|e| {
                warn!("reading {} failed: {}", T::COLLECTION, e);
                AppError::Read(e)
            })?;
        Ok(decode_all(docs))
    }

    pub async fn users(&self) -> Result<Vec<User>, AppError> {
        self.read(&[]).await
    }

    pub async fn trips(&self) -> Result<Vec<Trip>, AppError> {
        self.read(&[]).await
    }

    pub async fn expenses(&self, predicates: &[Predicate]) -> Result<Vec<Expense>, AppError> {
        self.read(predicates).await
    }

    pub async fn expenses_for_trip(&self, trip_id: &str) -> Result<Vec<Expense>, AppError> {
        self.read(&[Predicate::eq("viajeId", trip_id)]).await
    }

    /// A single trip; `None` when the id does not exist.
    pub async fn trip(&self, id: &str) -> Result<Option<Trip>, AppError> {
        let doc = self
            .store
            .read_one(TRIPS, id)
            .await
            .map_err(AppError::Read)?;

        doc.map(Trip::from_document)
            .transpose()
            .map_err(AppError::Read)
    }

    /// A user by document id, falling back to the auth uid.
    pub async fn user(&self, reference: &str) -> Result<Option<User>, AppError> {
        if reference.is_empty() {
            return Ok(None);
        }

        if let Some(doc) = self
            .store
            .read_one(USERS, reference)
            .await
            .map_err(AppError::Read)?
        {
            return User::from_document(doc).map(Some).map_err(AppError::Read);
        }

        let mut by_uid: Vec<User> = self.read(&[Predicate::eq("uid", reference)]).await?;
        Ok(if by_uid.is_empty() {
            None
        } else {
            Some(by_uid.swap_remove(0))
        })
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.store.delete(collection, id).await.map_err(write_error)
    }
}

pub(crate) fn write_error(e: StoreError) -> AppError {
    warn!("write failed: {}", e);
    AppError::Write(e)
}
