//! Provider contract and concurrent location aggregation engine.
//!
//! A [`LocationProvider`] answers a [`Query`] (document + cursor position)
//! with an asynchronous stream of location results. [`merge`] fans one
//! query out to any number of providers and folds their emissions into a
//! single deduplicated stream of combined results, isolating per-provider
//! failures so a slow or broken provider can never block or corrupt the
//! aggregate.
//!
//! Two shape adapters sit on top of the one merge primitive:
//! [`locations`] always yields array-or-none, while [`location`] unwraps a
//! singleton array to a bare location.
//!
//! Provider registration and re-querying on document changes live in the
//! `locus-registry` crate; this crate is the merge primitive only.
#![warn(missing_docs)]

/// Re-export of the [`lsp_types`] dependency of this crate.
pub use lsp_types;

mod merge;
mod provider;
mod query;

pub use merge::{AggregateResult, LocationMerge, SingleLocationMerge, location, locations, merge};
pub use provider::{Location, LocationProvider, LocationResponse, ProviderError, ProviderStream};
pub use query::Query;
