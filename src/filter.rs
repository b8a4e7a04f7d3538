//! Client-side filters for the record lists.
//!
//! Every active filter is ANDed; an unset filter (`None` or an empty string)
//! matches everything.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppError;
use crate::labels::{NO_COMPANY, OTHER_CATEGORY, category_label, company_label};
use crate::models::{CREATED_AT, Expense, Role, Trip, User};
use crate::store::Predicate;

/// Something that can decide whether a record belongs to the filtered view.
pub trait RecordFilter<T> {
    fn matches(&self, record: &T) -> bool;
}

/// Records accepted by `filter`, in input order.
pub fn apply<T: Clone, F: RecordFilter<T>>(records: &[T], filter: &F) -> Vec<T> {
    records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect()
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Case-insensitive substring test; an empty needle matches everything.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Inclusive date range over creation timestamps.
///
/// The lower bound is the start of `start`, the upper bound the last
/// millisecond of `end`. Either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Parses two `YYYY-MM-DD` inputs; blank inputs leave that side open.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        Ok(Self {
            start: parse_date(start)?,
            end: parse_date(end)?,
        })
    }

    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        self.start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    pub fn upper_bound(&self) -> Option<DateTime<Utc>> {
        self.end
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|dt| dt.and_utc())
    }

    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Both bounds are set.
    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.lower_bound().is_none_or(|lo| ts >= lo) && self.upper_bound().is_none_or(|hi| ts <= hi)
    }
}

fn parse_date(value: &str) -> Result<Option<NaiveDate>, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| AppError::Validation(format!("Fecha inválida: {}", value)))
}

/// Filters of the expense report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseFilter {
    pub range: DateRange,
    pub company: Option<String>,
    pub user: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    /// Matched against the free-text description
    pub search: String,
}

impl ExpenseFilter {
    /// Predicates the document store can evaluate.
    ///
    /// Sentinel labels have no stored counterpart and stay client-side.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();

        if let Some(lo) = self.range.lower_bound() {
            predicates.push(Predicate::gte(CREATED_AT, lo.timestamp_millis()));
        }
        if let Some(hi) = self.range.upper_bound() {
            predicates.push(Predicate::lte(CREATED_AT, hi.timestamp_millis()));
        }
        if let Some(company) = active(&self.company).filter(|c| *c != NO_COMPANY) {
            predicates.push(Predicate::eq("empresa", company));
        }
        if let Some(user) = active(&self.user) {
            predicates.push(Predicate::eq("userId", user));
        }
        if let Some(category) = active(&self.category).filter(|c| *c != OTHER_CATEGORY) {
            predicates.push(Predicate::eq("categoria", category));
        }
        if let Some(size) = active(&self.size) {
            predicates.push(Predicate::eq("tamaño", size));
        }

        predicates
    }
}

impl RecordFilter<Expense> for ExpenseFilter {
    fn matches(&self, expense: &Expense) -> bool {
        if !self.range.is_open() && !expense.creado_en.is_some_and(|ts| self.range.contains(ts)) {
            return false;
        }
        if active(&self.company).is_some_and(|c| company_label(&expense.empresa) != c) {
            return false;
        }
        if active(&self.user).is_some_and(|u| expense.user_id.as_deref() != Some(u)) {
            return false;
        }
        if active(&self.category).is_some_and(|c| category_label(&expense.categoria) != c) {
            return false;
        }
        if active(&self.size).is_some_and(|s| expense.tamano != s) {
            return false;
        }
        contains_ignore_case(&expense.descripcion, &self.search)
    }
}

/// Filters of the trip list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripFilter {
    pub user: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Matched against every display field of the trip
    pub search: String,
}

fn trip_search_text(trip: &Trip) -> String {
    format!(
        "{} {} {} {} {} {} {}",
        trip.empresa,
        trip.origen,
        trip.destino,
        trip.fecha,
        trip.operador,
        trip.costo,
        trip.user_id.as_deref().unwrap_or("")
    )
}

impl RecordFilter<Trip> for TripFilter {
    fn matches(&self, trip: &Trip) -> bool {
        if active(&self.user).is_some_and(|u| trip.user_id.as_deref() != Some(u)) {
            return false;
        }
        if active(&self.origin).is_some_and(|o| trip.origen != o) {
            return false;
        }
        if active(&self.destination).is_some_and(|d| trip.destino != d) {
            return false;
        }
        contains_ignore_case(&trip_search_text(trip), &self.search)
    }
}

/// Filters of the personnel list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    /// Matched against name, surname and email
    pub search: String,
    pub role: Option<Role>,
}

impl RecordFilter<User> for UserFilter {
    fn matches(&self, user: &User) -> bool {
        if self.role.is_some_and(|r| user.role() != r) {
            return false;
        }
        let text = format!("{} {} {}", user.nombre, user.apellido, user.email);
        contains_ignore_case(&text, &self.search)
    }
}
