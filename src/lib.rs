//! # Feed Sync
//!
//! Pulls articles from a catalog of RSS/Atom feeds into a store, at most
//! once per URL, and attaches a semantic embedding to each new article.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌────────┐   ┌───────────┐   ┌──────────┐
//! │ Catalog  │──▶│  Fetch  │──▶│ Parse  │──▶│ Dedup gate│──▶│  Store   │
//! │ sources  │   │  HTTP   │   │RSS/Atom│   │  per URL  │   │ SQLite   │
//! └──────────┘   └─────────┘   └────────┘   └───────────┘   └────┬─────┘
//!                                                                │
//!                                                          ┌─────▼─────┐
//!                                                          │ Embedding │
//!                                                          └───────────┘
//! ```
//!
//! A run either fails up front (the catalog cannot be read) or completes
//! with a [`report::RunSummary`] listing every source, entry and embedding
//! failure. One bad feed never stops the others.
//!
//! ## Quick Start
//!
//! ```bash
//! feedsync init                 # create database
//! feedsync sources              # list the catalog
//! feedsync sync                 # run once
//! feedsync sync --dry-run       # fetch and dedup, write nothing
//! feedsync serve                # POST /sync trigger
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors at component boundaries |
//! | [`catalog`] | Source catalog (config or `sources` table) |
//! | [`fetch`] | Feed retrieval over HTTP |
//! | [`feed`] | RSS 2.0 / RSS 1.0 / Atom parsing |
//! | [`dedup`] | URL dedup gate |
//! | [`store`] | Article and embedding persistence |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`pipeline`] | Run orchestration and failure containment |
//! | [`report`] | Run summaries |
//! | [`server`] | HTTP trigger |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod catalog;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod server;
pub mod sources;
pub mod store;
