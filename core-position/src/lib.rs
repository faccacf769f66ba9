//! Reading position reconciliation.
//!
//! Compares the server-reported position for a book against the locally
//! saved one and decides whether the divergence needs explicit user
//! arbitration. Below the threshold the positions are equivalent and the
//! more recently recorded one wins silently; above it, both positions are
//! handed to the UI collaborator with their ages, and the user's choice
//! becomes authoritative.

pub mod reconcile;

pub use reconcile::{
    PositionConflict, PositionPair, PositionReconciler, PositionRecord, Reconciliation,
};
