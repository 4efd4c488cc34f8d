//! External authorization
//!
//! - [`client`] - the raw remote call ([`Authorizer`]) and decision parsing
//! - [`http`] - `reqwest` implementation of [`Authorizer`]
//! - [`policy`] - retry / timeout / breaker settings
//! - [`breaker`] - consecutive-failure circuit breaker
//! - [`gateway`] - [`AuthorizationGateway`], the resilient wrapper the engine calls
//!
//! # Safety Invariant
//!
//! Unavailability is never approval. Every fallback path denies.

pub mod breaker;
pub mod client;
pub mod gateway;
pub mod http;
pub mod policy;

#[cfg(test)]
pub mod mock;

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{AuthCallError, AuthResponse, Authorizer, DecisionRule};
pub use gateway::{AuthorizationDecision, AuthorizationGateway, FallbackReason};
pub use http::HttpAuthorizer;
pub use policy::{PolicyError, ResiliencePolicy};
