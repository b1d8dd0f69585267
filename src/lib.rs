// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody Authority - Non-custodial Key Management Service
//!
//! Every sensitive operation (creating a wallet or key, signing) is an
//! *activity*. Activities are evaluated against organization policies,
//! optionally approved by a quorum, and only then dispatched to a remote
//! secure-enclave signer. Key material never enters this process.
//!
//! ## Modules
//!
//! - `activity` - Activity state machine, engine and sweeper
//! - `policy` - Policy model and evaluator
//! - `quorum` - Per-activity approval rosters and tallies
//! - `enclave` - Client side of the signer boundary
//! - `coordination` - Sessions, rate limits and distributed locks
//! - `storage` - redb system of record and audit log
//! - `auth` - Bearer sessions and roles
//! - `api` - HTTP API handlers (Axum)

pub mod activity;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod coordination;
pub mod enclave;
pub mod error;
pub mod models;
pub mod policy;
pub mod quorum;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;
