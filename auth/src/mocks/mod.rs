//! Mock provider implementations for testing.
//!
//! This module provides scripted, in-memory implementations of the provider
//! traits for use in unit and integration tests.

pub mod identity;

pub use identity::MockIdentityProvider;
