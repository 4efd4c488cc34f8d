//! Wallet Transfer - atomic account-to-account transfers
//!
//! Moves funds between two accounts under row locks, gated by an external
//! authorizer behind retry, timeout and a circuit breaker.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier newtypes and owner kinds
//! - [`models`] - Account, TransferRequest and TransferRecord
//! - [`store`] - Account/ledger storage contract (PostgreSQL and in-memory)
//! - [`db`] - PostgreSQL connection pool
//! - [`authorizer`] - External authorizer client and resilient gateway
//! - [`transfer`] - Transfer engine
//! - [`log_mask`] - Masking of sensitive log values
//! - [`config`] / [`logging`] - YAML config and tracing setup

// Core types - must be first!
pub mod core_types;

pub mod authorizer;
pub mod config;
pub mod db;
pub mod log_mask;
pub mod logging;
pub mod models;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use authorizer::{
    AuthorizationDecision, AuthorizationGateway, Authorizer, CircuitState, HttpAuthorizer,
    ResiliencePolicy,
};
pub use core_types::{AccountId, OwnerId, OwnerKind, TransferId};
pub use models::{Account, TransferRecord, TransferRequest};
pub use store::{AccountStore, MemoryAccountStore, PgAccountStore, StoreError};
pub use transfer::{TransferEngine, TransferError};
