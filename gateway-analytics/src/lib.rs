//! Analytic Store Adapter (C8): atomic bulk load of columnar reference
//! data and opaque query execution over it.

mod store;

pub use store::{AnalyticsStore, Row, SqliteAnalyticsStore};
