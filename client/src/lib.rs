//! # Task Sync Client Library
//!
//! Client side of the multi-user task list. It keeps a local projection of
//! the task collection consistent with the server despite two independent,
//! unordered input streams: direct responses to this client's own requests
//! and the broadcast event stream, which also echoes this client's own
//! mutations.
//!
//! ## Reconciliation
//!
//! Every inbound change, whether response or broadcast, goes through the
//! same idempotent merge: Created events deduplicate by id, Updated events
//! upsert, Deleted events tolerate absent rows. Because the merge is
//! idempotent by construction, the race between a create's direct response
//! and its broadcast echo needs no coordination at all.
//!
//! ## Liveness and Resync
//!
//! The connection monitor tracks a single liveness bit from server traffic.
//! Broadcasts missed while disconnected are gone; on every reconnect the
//! client re-fetches the full task list and replaces its projection.
//!
//! ## Module Organization
//!
//! - [`cache`] - the id-keyed task projection and merge functions.
//! - [`connection`] - connect/disconnect tracking and silence detection.
//! - [`network`] - the UDP loop, request bookkeeping, and the interactive
//!   command prompt.

pub mod cache;
pub mod connection;
pub mod network;
