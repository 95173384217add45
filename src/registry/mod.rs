//! Camera registry
//!
//! Maps logical camera names to their device, capture loop and metadata,
//! and implements the acquire/release policy that ties each loop's
//! lifecycle to consumer demand: the loop is started lazily by the first
//! `acquire` and stopped by a `release` that finds no live subscriber.
//!
//! The stop policy is demand-recomputed, not a persistent counter: a
//! release checks the broadcast channel's current receiver count at the
//! moment of the call. A lone snapshot consumer that drops its
//! subscription before releasing therefore stops the loop it just
//! started, while a release issued next to a standing stream subscriber
//! leaves the loop running. This is an intentional compatibility point,
//! not an accounting bug.

pub mod entry;
pub mod store;

pub use entry::{CameraEntry, CameraListing};
pub use store::CameraRegistry;
