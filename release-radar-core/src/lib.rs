#![doc = "release-radar-core: core logic library for release-radar."]

//! This crate contains the playlist synchronisation pipeline and everything it is built from:
//! pacing, pagination, release discovery, deduplication and batched removals.
//! Talking to an actual service is left to implementors of [`contract::CatalogApi`].
//!
//! # Usage
//! Build a [`synchronise::SynchroniseConfig`], pick a [`pacing::Clock`] and call
//! [`synchronise::synchronise`] with any `CatalogApi` implementation.

pub mod batch;
pub mod contract;
pub mod dedup;
pub mod pacing;
pub mod paginate;
pub mod scanner;
pub mod synchronise;
