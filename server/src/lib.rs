//! # Task Sync Server Library
//!
//! Authoritative server for the multi-user task list. It owns the canonical
//! task records, applies client mutations, and fans each committed change
//! out to every live connection so clients converge without manual refresh.
//!
//! ## Architecture
//!
//! ### Single-Threaded Request Loop
//! All requests are applied to the store sequentially by one event loop.
//! The ownership check and the write of a mutation therefore never
//! interleave with another request touching the same record, and id
//! assignment is trivially unique.
//!
//! ### Commit-Then-Publish
//! A broadcast event is queued only after the store has committed the
//! mutation, and the direct response is queued before the event. Failed
//! mutations produce no event at all; other clients simply never observe
//! them.
//!
//! ### Decoupled Fan-Out
//! Responses and broadcasts travel through an outbound queue drained by a
//! dedicated sender task, so the request path never blocks on delivery.
//! Delivery is best-effort: a subscriber that cannot be reached misses the
//! event and recovers by re-fetching the full task list on reconnect.
//!
//! ## Module Organization
//!
//! - [`store`] - the mutation store: create/update/delete/list with
//!   owner-checked mutations and shared read visibility.
//! - [`subscribers`] - the broadcast bus membership: registration,
//!   identity binding, liveness sweep.
//! - [`network`] - UDP transport, request dispatch, outbound queue.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:4000", 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod store;
pub mod subscribers;
