#![doc = "gallery-sync: one-way synchroniser for local media trees."]

//! Mirrors a local directory tree of media files onto a remote gallery
//! account: per-directory setup files are resolved into an effective
//! policy, the hierarchy is mapped onto owners and collections, a plan is
//! reconciled against remote state, and uploaded files are disposed of
//! according to the inherited policy.
//!
//! Pipeline: [`overlay`] → [`mapper`] → [`reconcile`] → [`dispose`],
//! orchestrated by [`sync::synchronise`]. The remote service is reached
//! through the [`remote::RemoteStore`] trait, implemented for HTTP by
//! [`client::GalleryClient`] and mockable in tests.

pub mod cli;
pub mod client;
pub mod config;
pub mod dispose;
pub mod error;
pub mod load_config;
pub mod mapper;
pub mod overlay;
pub mod reconcile;
pub mod remote;
pub mod sync;

pub use cli::{run, Cli, Commands};
pub use config::Config;
pub use error::SyncError;
pub use sync::{synchronise, SyncReport};
