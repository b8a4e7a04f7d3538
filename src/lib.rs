/*!
# Logística Admin

Back office of a freight logistics company: personnel, trips and expenses,
with reports that can be downloaded as spreadsheets.

## Overview

Records live in three collections of a document store (`usuarios`, `viajes`,
`gastos`). Every page of the dashboard reads them through the fetcher, derives
what it shows with the filter and aggregate engine, and is protected by the
session guard.

## Architecture

### Session Guard
- Subscribes to the auth state and decides between a neutral loading state,
  a redirect to `/login`, a 403 or rendering the protected view
- Local provider with argon2 password hashes and uuid sessions

### Record Fetcher
- Typed reads of whole collections or of predicate-filtered expenses
- Request tickets so that only the newest load of a view is applied, and
  nothing is applied after the view is closed

### Filter / Aggregate Engine
- Date ranges (whole-day inclusive bounds), categorical filters and
  case-insensitive search
- Grouped sums by month, company, category and user, top 10 ranking, KPIs,
  dashboard alerts
- One label policy for missing companies, categories and users

### Exporter
- Title row, header row, one row per record and a totals row
- Currency formatting on the amount column, xlsx or CSV

## Modules

- **models**: User, Trip and Expense records
- **labels**: Fallback labels and user lookup
- **filter**: Filters and date ranges
- **aggregate**: Grouping, ranking, KPIs and the per-page derived views
- **exporter**: Spreadsheet export
- **store**: Document store abstraction and the in-memory store
- **auth**: Authentication, sessions and the guard
- **fetcher**: Typed reads and stale-response protection
- **views**: One controller per page
- **settings**: Layered configuration
- **graph** (`web`): PNG bar charts
- **app** (`web`): Routing and middleware

## REST API Endpoints

- `/login`, `/logout` - Session management
- `/api/dashboard` - Counters, recent activity and alerts
- `/api/users`, `/api/users/{id}`, `/api/users/{id}/role` - Personnel
- `/api/trips`, `/api/trips/{id}`, `/api/trips/export` - Trips
- `/api/reports`, `/api/reports/export`, `/api/reports/charts/{kind}` - Expense report
*/

pub mod aggregate;
pub mod auth;
pub mod error;
pub mod exporter;
pub mod fetcher;
pub mod filter;
pub mod labels;
pub mod models;
pub mod settings;
pub mod store;
pub mod views;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod graph;

pub use error::{AppError, AuthError, ExportError, StoreError};
pub use models::{Expense, NewUser, Role, Trip, User};
pub use settings::Settings;
pub use store::{DocumentStore, MemoryStore};
