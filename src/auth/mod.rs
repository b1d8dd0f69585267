// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-session authentication for the custody API.
//!
//! ## Auth Flow
//!
//! 1. A user obtains a session token by redeeming an invitation, or by
//!    signing a login challenge with one of its API keys.
//! 2. Clients send `Authorization: Bearer <session token>`.
//! 3. The server:
//!    - Looks the token up in the coordination store (`session:<token>`)
//!    - Loads the user and checks it is still active in the organization
//!    - Takes the role from the stored user, not from the session
//!
//! ## Security
//!
//! - All non-health endpoints require authentication
//! - Session tokens are 256-bit random values and are never logged
//! - Deactivating a user invalidates its sessions on the next request

pub mod api_key;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod roles;

pub use api_key::{verify_api_key_signature, KeyCheck};
pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use roles::Role;
