//! Ledger store over SQLite.
//!
//! This module provides:
//! - Database initialization, pragmas, and migrations
//! - The `Repository` with bid, period, roster, participant, and
//!   finalization operations

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{BidCommit, BidQuery, ChunkResult, Repository, RiderSnapshot, RosterQuery, Settlement};
