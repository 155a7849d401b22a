//! Teamsync - Verifiable Team Roster Synchronization
//!
//! Maintains a cryptographically-verifiable membership list ("roster") per
//! team and keeps it in sync between a central service and local state.
//!
//! Key principles:
//! - A roster is only trusted after its detached signature verifies against
//!   an admin key drawn from the *previous* trusted roster
//! - Team UUID and name are immutable across updates
//! - Partial failures never abort a sync pass; outcomes are aggregated

pub mod api;
pub mod crypto;
pub mod keyring;
pub mod requests;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod team;
