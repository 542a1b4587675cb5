//! # pcode
//!
//! A service-code catalog for printer models: error codes with their
//! troubleshooting text, and DIP-switch settings, imported from vendor
//! CSV/XLSX sheets and searched by model and code.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ CSV / XLSX  │──▶│   Pipeline   │──▶│  SQLite   │
//! │   sheets    │   │ map+resolve  │   │  catalog  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │   CLI    │       │   HTTP   │
//!                  │ (pcode)  │       │   API    │
//!                  └──────────┘       └──────────┘
//! ```
//!
//! Domain logic (code canonicalization, row mapping, model aliasing, the
//! ingestion pipeline and exact matching) lives in the `printcode-core`
//! crate; this crate adds configuration, SQLite storage, source readers,
//! the CLI and the HTTP server.
//!
//! ## Quick Start
//!
//! ```bash
//! pcode init
//! pcode printer add C6100
//! pcode import error_codes codes.xlsx --model C6100 --model C6085
//! pcode search C6085 202
//! pcode serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite catalog store |
//! | [`source`] | CSV/XLSX readers |
//! | [`ingest`] | Import orchestration |
//! | [`printers`] | Printer registry |
//! | [`search`] | Error-code and DIP-switch lookup |
//! | [`server`] | HTTP API server |

pub mod config;
pub mod db;
pub mod ingest;
pub mod migrate;
pub mod printers;
pub mod search;
pub mod server;
pub mod source;
pub mod sqlite_store;
