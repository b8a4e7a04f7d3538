//! Grouped sums, rankings and KPIs derived from a filtered record list.
//!
//! Everything here is a pure function of its inputs. Where a record has no
//! timestamp the caller-supplied `now` stands in for it, so results are
//! reproducible for a fixed `now`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::filter::{ExpenseFilter, RecordFilter, TripFilter, apply};
use crate::labels::{
    UserDirectory, UserLabelPolicy, category_label, company_label, trip_company_label,
};
use crate::models::{Expense, Role, Trip, User};

/// Length of the user ranking.
pub const TOP_N: usize = 10;

/// Average expense above which the dashboard raises an alert.
pub const HIGH_AVERAGE_THRESHOLD: f64 = 3000.0;

/// Number of latest trips / expenses shown on the dashboard.
pub const RECENT_ITEMS: usize = 5;

/// Minimum number of users before the dashboard stops warning.
pub const MIN_ACTIVE_USERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub label: String,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Month,
    Company,
    Category,
    User,
}

/// `YYYY-MM` bucket of a timestamp.
pub fn month_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

/// es-MX style `d/m/yyyy, HH:MM:SS`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%-d/%-m/%Y, %H:%M:%S").to_string()
}

// Sums by label, keeping the order in which labels first appear.
fn accumulate<I>(pairs: I) -> Vec<GroupTotal>
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut groups: Vec<GroupTotal> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (label, amount) in pairs {
        match index.get(&label) {
            Some(&i) => groups[i].total += amount,
            None => {
                index.insert(label.clone(), groups.len());
                groups.push(GroupTotal {
                    label,
                    total: amount,
                });
            }
        }
    }

    groups
}

/// Totals per month, ascending by month.
pub fn totals_by_month(expenses: &[Expense], now: DateTime<Utc>) -> Vec<GroupTotal> {
    let mut groups = accumulate(
        expenses
            .iter()
            .map(|e| (month_key(e.creado_en.unwrap_or(now)), e.monto)),
    );
    groups.sort_by(|a, b| a.label.cmp(&b.label));
    groups
}

pub fn totals_by_company(expenses: &[Expense]) -> Vec<GroupTotal> {
    accumulate(
        expenses
            .iter()
            .map(|e| (company_label(&e.empresa).to_string(), e.monto)),
    )
}

pub fn totals_by_category(expenses: &[Expense]) -> Vec<GroupTotal> {
    accumulate(
        expenses
            .iter()
            .map(|e| (category_label(&e.categoria).to_string(), e.monto)),
    )
}

/// Totals per owner, labelled with the owner's name.
///
/// Expenses without an owner are left out of this grouping.
pub fn totals_by_user(expenses: &[Expense], users: &UserDirectory) -> Vec<GroupTotal> {
    accumulate(
        expenses
            .iter()
            .filter_map(|e| e.user_id.as_deref().filter(|u| !u.is_empty()).map(|u| (u, e.monto)))
            .map(|(uid, amount)| (uid.to_string(), amount)),
    )
    .into_iter()
    .map(|group| GroupTotal {
        label: users.label(UserLabelPolicy::Report, Some(&group.label)),
        total: group.total,
    })
    .collect()
}

pub fn group_totals(
    expenses: &[Expense],
    key: GroupKey,
    users: &UserDirectory,
    now: DateTime<Utc>,
) -> Vec<GroupTotal> {
    match key {
        GroupKey::Month => totals_by_month(expenses, now),
        GroupKey::Company => totals_by_company(expenses),
        GroupKey::Category => totals_by_category(expenses),
        GroupKey::User => totals_by_user(expenses, users),
    }
}

/// The `n` owners with the highest totals, highest first.
pub fn top_users(expenses: &[Expense], users: &UserDirectory, n: usize) -> Vec<GroupTotal> {
    let mut totals = totals_by_user(expenses, users);
    totals.sort_by(|a, b| b.total.total_cmp(&a.total));
    totals.truncate(n);
    totals
}

/// `total / count`, or 0 for an empty set.
/// Sum of `values`; `0.0` for an empty set.
pub fn sum_amounts<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().fold(0.0, |acc, v| acc + v)
}

pub fn average(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Kpis {
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub top_user: Option<GroupTotal>,
}

impl Kpis {
    pub fn compute(expenses: &[Expense], users: &UserDirectory) -> Self {
        let total = sum_amounts(expenses.iter().map(|e| e.monto));
        let count = expenses.len();

        Self {
            count,
            total,
            average: average(total, count),
            top_user: top_users(expenses, users, 1).into_iter().next(),
        }
    }
}

/// One line of the expense table and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseRow {
    pub fecha: DateTime<Utc>,
    pub fecha_txt: String,
    pub empresa: String,
    pub usuario: String,
    pub categoria: String,
    pub descripcion: String,
    pub tamano: String,
    pub monto: f64,
}

/// Table rows, newest first.
pub fn expense_rows(
    expenses: &[Expense],
    users: &UserDirectory,
    now: DateTime<Utc>,
) -> Vec<ExpenseRow> {
    let mut rows: Vec<ExpenseRow> = expenses
        .iter()
        .map(|e| {
            let fecha = e.creado_en.unwrap_or(now);
            ExpenseRow {
                fecha,
                fecha_txt: format_timestamp(fecha),
                empresa: company_label(&e.empresa).to_string(),
                usuario: users.label(UserLabelPolicy::Report, e.user_id.as_deref()),
                categoria: category_label(&e.categoria).to_string(),
                descripcion: e.descripcion.clone(),
                tamano: e.tamano.clone(),
                monto: e.monto,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.fecha.cmp(&a.fecha));
    rows
}

/// One line of the trip table and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripRow {
    pub id: String,
    pub empresa: String,
    pub origen: String,
    pub destino: String,
    pub usuario: String,
    pub fecha: String,
    pub operador: String,
    pub costo: f64,
}

pub fn trip_rows(trips: &[Trip], users: &UserDirectory) -> Vec<TripRow> {
    trips
        .iter()
        .map(|t| TripRow {
            id: t.id.clone(),
            empresa: t.empresa.clone(),
            origen: t.origen.clone(),
            destino: t.destino.clone(),
            usuario: users.label(UserLabelPolicy::TripList, t.user_id.as_deref()),
            fecha: t.fecha.clone(),
            operador: t.operador.clone(),
            costo: t.costo,
        })
        .collect()
}

/// Distinct non-empty values, in first-seen order.
pub fn distinct<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !seen.iter().any(|v| v == value) {
            seen.push(value.to_string());
        }
    }
    seen
}

/// Choices offered by the report's selectors.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReportOptions {
    pub companies: Vec<String>,
    pub categories: Vec<String>,
    pub sizes: Vec<String>,
}

impl ReportOptions {
    pub fn from_expenses(expenses: &[Expense]) -> Self {
        Self {
            companies: distinct(expenses.iter().map(|e| company_label(&e.empresa))),
            categories: distinct(expenses.iter().map(|e| category_label(&e.categoria))),
            sizes: distinct(expenses.iter().map(|e| e.tamano.as_str())),
        }
    }
}

/// Everything the report page shows, derived in one pass from the same
/// filtered set.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReportView {
    pub kpis: Kpis,
    pub monthly: Vec<GroupTotal>,
    pub by_company: Vec<GroupTotal>,
    pub by_category: Vec<GroupTotal>,
    pub top_users: Vec<GroupTotal>,
    pub rows: Vec<ExpenseRow>,
    pub options: ReportOptions,
}

impl ReportView {
    /// `expenses` is the fetched set; `filter` is applied to it here.
    /// Selector options come from the fetched set so choices do not vanish
    /// while typing a search.
    pub fn build(
        expenses: &[Expense],
        filter: &ExpenseFilter,
        users: &UserDirectory,
        now: DateTime<Utc>,
    ) -> Self {
        let filtered = apply(expenses, filter);

        Self {
            kpis: Kpis::compute(&filtered, users),
            monthly: totals_by_month(&filtered, now),
            by_company: totals_by_company(&filtered),
            by_category: totals_by_category(&filtered),
            top_users: top_users(&filtered, users, TOP_N),
            rows: expense_rows(&filtered, users, now),
            options: ReportOptions::from_expenses(expenses),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleCount {
    pub role: Role,
    pub total: usize,
}

/// Users per role; untagged users count as `transportista`.
pub fn role_summary(users: &[User]) -> Vec<RoleCount> {
    let mut counts: Vec<RoleCount> = Vec::new();
    for user in users {
        let role = user.role();
        match counts.iter_mut().find(|c| c.role == role) {
            Some(count) => count.total += 1,
            None => counts.push(RoleCount { role, total: 1 }),
        }
    }
    counts
}

/// Trip list rows plus the "showing x of y" counters and selector options.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TripListView {
    pub rows: Vec<TripRow>,
    pub shown: usize,
    pub total: usize,
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
}

impl TripListView {
    pub fn build(trips: &[Trip], filter: &TripFilter, users: &UserDirectory) -> Self {
        let filtered: Vec<Trip> = trips
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();

        Self {
            rows: trip_rows(&filtered, users),
            shown: filtered.len(),
            total: trips.len(),
            origins: distinct(trips.iter().map(|t| t.origen.as_str())),
            destinations: distinct(trips.iter().map(|t| t.destino.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    HighAverage { average: f64 },
    NoTrips,
    FewUsers,
}

impl Alert {
    pub fn message(&self) -> String {
        match self {
            Alert::HighAverage { average } => format!("Gasto promedio elevado: ${:.2}", average),
            Alert::NoTrips => "No hay viajes registrados.".to_string(),
            Alert::FewUsers => "Pocos usuarios activos. Agrega más transportistas.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentExpense {
    pub categoria: String,
    pub monto: f64,
    pub empresa: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentTrip {
    pub id: String,
    pub empresa: String,
    pub origen: String,
    pub destino: String,
}

/// Landing-page summary over the unfiltered collections.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DashboardSummary {
    pub trip_count: usize,
    pub expense_count: usize,
    pub user_count: usize,
    pub average_expense: f64,
    pub by_company: Vec<GroupTotal>,
    pub recent_expenses: Vec<RecentExpense>,
    pub recent_trips: Vec<RecentTrip>,
    pub alerts: Vec<Alert>,
}

impl DashboardSummary {
    pub fn build(trips: &[Trip], expenses: &[Expense], users: &[User]) -> Self {
        let total = sum_amounts(expenses.iter().map(|e| e.monto));
        let average_expense = average(total, expenses.len());

        let mut alerts = Vec::new();
        if average_expense > HIGH_AVERAGE_THRESHOLD {
            alerts.push(Alert::HighAverage {
                average: average_expense,
            });
        }
        if trips.is_empty() {
            alerts.push(Alert::NoTrips);
        }
        if users.len() < MIN_ACTIVE_USERS {
            alerts.push(Alert::FewUsers);
        }

        Self {
            trip_count: trips.len(),
            expense_count: expenses.len(),
            user_count: users.len(),
            average_expense,
            by_company: totals_by_company(expenses),
            recent_expenses: expenses
                .iter()
                .rev()
                .take(RECENT_ITEMS)
                .map(|e| RecentExpense {
                    categoria: e.categoria.clone(),
                    monto: e.monto,
                    empresa: company_label(&e.empresa).to_string(),
                })
                .collect(),
            recent_trips: trips
                .iter()
                .rev()
                .take(RECENT_ITEMS)
                .map(|t| RecentTrip {
                    id: t.id.clone(),
                    empresa: trip_company_label(&t.empresa).to_string(),
                    origen: t.origen.clone(),
                    destino: t.destino.clone(),
                })
                .collect(),
            alerts,
        }
    }
}
