//! # printcode core
//!
//! Storage-agnostic logic for the printer service-code catalog:
//! canonicalization, header-driven row mapping, model aliasing, the
//! transactional ingestion pipeline, exact-match search, and the
//! [`store::CatalogStore`] trait with an in-memory implementation.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The application
//! crate supplies the SQLite store and the tabular source readers.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`canonical`] | Storage form and match-mode projections of a code |
//! | [`mapper`] | `RawRow` → `ErrorCodeRecord` / `DipSwitchRecord` |
//! | [`resolver`] | Alias → canonical model mapping |
//! | [`ingest`] | Batch ingestion with per-row and per-model isolation |
//! | [`matcher`] | Loose prefix keys and the exact-match filter |
//! | [`switch_refs`] | DIP-switch references inside error-code text |
//! | [`store`] | Catalog store and transaction traits |

pub mod canonical;
pub mod ingest;
pub mod mapper;
pub mod matcher;
pub mod models;
pub mod resolver;
pub mod store;
pub mod switch_refs;
