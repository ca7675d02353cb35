//! Core types and trait definitions for the Strata object store.
//!
//! The domain logic lives here: the bitemporal resolver, the correction-chain
//! planner, the attribute filter DSL, and the field-authorization projector,
//! plus the [`store::ObjectStore`] trait every backend implements. This crate
//! is deliberately free of HTTP and database dependencies.

#![allow(async_fn_in_trait)]

pub mod chain;
pub mod error;
pub mod external;
pub mod filter;
pub mod object;
pub mod ordering;
pub mod permission;
pub mod projection;
pub mod record;
pub mod store;
pub mod temporal;

pub use error::{Error, Result};
