//! Atomic Transfer Protocol
//!
//! Moves funds between two accounts as one all-or-nothing unit of work,
//! gated by the external authorizer.
//!
//! # Protocol
//!
//! ```text
//! check_request ─▶ resolve both ─▶ check_sender ─▶ authorize
//!   (no I/O)        (NotFound)     (role, early     (no lock held;
//!                                   balance)         deny → NotAuthorized)
//!                                                        │
//!       ┌────────────────────────────────────────────────┘
//!       ▼
//! begin ─▶ lock sender (fresh read) ─▶ re-check balance ─▶ lock receiver
//!       ─▶ debit + credit ─▶ append ledger ─▶ commit (locks released)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Authorize-Before-Lock**: row-lock hold time never includes network latency
//! 2. **Fresh-Read-Under-Lock**: the balance decision uses the locked row, never an earlier read
//! 3. **One Record Per Mutation**: balance writes and the ledger entry commit together or not at all
//! 4. **Sender-Then-Receiver**: lock order is by role, identical for every transfer
//!
//! Invariant 4 is role-based, not id-based. Two opposing transfers between
//! the same pair (A → B while B → A) can still wait on each other; PostgreSQL
//! aborts one of them and it surfaces as `TransferError::Unavailable`. A
//! multi-hop transfer would need a global order instead.

pub mod engine;
pub mod error;
pub mod validation;


pub use engine::TransferEngine;
pub use error::{AccountRole, DenialCause, TransferError, ValidationError};
