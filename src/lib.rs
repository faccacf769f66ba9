//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the
//! individual workspace crates. Host applications can depend on
//! `reader-workspace` with the `offline-core` feature (the default) and
//! reach the whole offline reading core through `core-service`, without
//! wiring each crate individually.
