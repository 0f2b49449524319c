// crates/reply-triage-cli/src/lib.rs
// ============================================================================
// Module: Reply Triage CLI Library
// Description: Shared helpers for the reply triage command-line interface.
// Purpose: Provide fixture collaborators and host wiring for the binary and tests.
// Dependencies: reply-triage-core, reply-triage-config, reply-triage-store-sqlite
// ============================================================================

//! ## Overview
//! The binary drives an obligee-action wizard against a JSON thread fixture.
//! This library holds the pieces that do not depend on argument parsing:
//! bounded input reads, fixture-backed collaborators, and the wiring from a
//! [`reply_triage_config::TriageConfig`] to a ready wizard.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod fixture;
pub mod host;
pub mod input;
