// crates/reply-triage-config/src/lib.rs
// ============================================================================
// Module: Reply Triage Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for reply-triage.toml semantics.
// Dependencies: reply-triage-core, reply-triage-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `reply-triage-config` defines the configuration model for hosts that run
//! the obligee-action wizard: store backend, audit sink, validation limits,
//! and step address base path. Validation is strict and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
