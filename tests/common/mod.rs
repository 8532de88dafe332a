//! Common test utilities for exploration tests
//!
//! This module provides scripted completion clients, explorers over
//! in-memory or on-disk history, and a helper for letting spawned request
//! tasks make progress.

pub mod fixtures;

pub use fixtures::{
    disk_store, explorer_over, memory_explorer, memory_store, photosynthesis_client, settle,
    LIGHT_REACTIONS, PHOTOSYSTEM_II,
};
