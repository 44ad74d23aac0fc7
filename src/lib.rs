//! # Project Populate
//!
//! Populate a project document store from code hosts, package registries
//! and literal instructions, recording for every field which source
//! supplied its value.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Instructions │──▶│  Validate  │──▶│ Fetch (once  │──▶│ Resolve  │
//! │   (JSON)     │   │            │   │ per source)  │   │ per field│
//! └──────────────┘   └────────────┘   └──────────────┘   └────┬─────┘
//!                                                             │
//!                                                             ▼
//!                                     ┌──────────┐      ┌──────────┐
//!                                     │  SQLite  │◀─────│ Assemble │
//!                                     │  store   │      │ + stamp  │
//!                                     └──────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pop init                                  # create the store
//! pop sources                               # list sources and directives
//! pop validate --instructions projects.json # offline checks
//! pop populate --instructions projects.json # fetch, resolve, store
//! pop get my-project                        # print a stored record
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Field names, typed values, provenance, assembled records |
//! | [`error`] | Validation, fetch, parse, resolve and assembly errors |
//! | [`instruction`] | Instruction file parsing |
//! | [`traits`] | The [`Source`](traits::Source) trait and source registry |
//! | [`source_github`] | GitHub GraphQL source |
//! | [`source_npm`] | npm registry source |
//! | [`markdown`] | README cleanup helpers |
//! | [`validate`] | Pre-flight instruction checks |
//! | [`resolve`] | Per-field resolution with fallback |
//! | [`assemble`] | Per-project fetch, resolve and stamp |
//! | [`populate`] | Batch driver |
//! | [`store`] | Project store trait, SQLite and in-memory stores |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assemble;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod get;
pub mod instruction;
pub mod markdown;
pub mod migrate;
pub mod models;
pub mod populate;
pub mod resolve;
pub mod source_github;
pub mod source_npm;
pub mod sources;
pub mod store;
pub mod traits;
pub mod validate;
