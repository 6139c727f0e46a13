//! # docsync
//!
//! Sync a markdown/MDX documentation tree into an embedding search index.
//!
//! docsync walks a directory tree of `.md`/`.mdx` files, splits each document
//! into addressable sections at heading boundaries, and reconciles the result
//! against a SQLite store so a downstream embedding index stays consistent
//! with source content without re-embedding unchanged material.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌────────────┐   ┌──────────┐
//! │  Walker  │──▶│ Parse + Section │──▶│ Reconciler │──▶│  SQLite  │
//! │ md/mdx   │   │ prune + slugs   │   │ classify   │   │ docs +   │
//! │ + parents│   │ + checksum      │   │ + apply    │   │ sections │
//! └──────────┘   └─────────────────┘   └─────┬──────┘   └──────────┘
//!                                            │
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │   Embedding   │
//!                                     │   gateway     │
//!                                     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsync init                      # create database
//! docsync sync                      # incremental pass
//! docsync sync --mode full          # destructive full refresh
//! docsync status                    # what's indexed
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy for the pipeline |
//! | [`walker`] | Directory walk with parent-document pairing |
//! | [`markup`] | Block-level markdown/MDX parsing and pruning |
//! | [`section`] | Heading-based sectioning and slugs |
//! | [`checksum`] | Content-addressed change detection |
//! | [`gateway`] | Embedding gateway abstraction |
//! | [`store`] | SQLite document/section store |
//! | [`migrate`] | Schema migrations |
//! | [`reconcile`] | Classification and apply state machine |
//! | [`sync`] | Pass orchestration |
//! | [`stats`] | Status command |

pub mod checksum;
pub mod config;
pub mod error;
pub mod gateway;
pub mod markup;
pub mod migrate;
pub mod models;
pub mod reconcile;
pub mod section;
pub mod stats;
pub mod store;
pub mod sync;
pub mod walker;
