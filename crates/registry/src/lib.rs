//! Provider registry and query composition.
//!
//! [`ProviderRegistry`] owns the dynamic population of location providers:
//! entries are added through [`ProviderRegistry::register`], removed by
//! dropping the returned guard, and observed by everyone else only as
//! immutable point-in-time snapshots.
//!
//! The composition layer ([`locations_and_providers`] and its exact-id
//! variant) watches the provider population and the active document
//! context, re-derives the matching provider subset on every change of
//! either, and restarts the `locus-providers` merge for the new state.
//! Superseded merge sessions are cancelled so stale results never reach
//! the caller.
#![warn(missing_docs)]

mod compose;
mod registry;

pub use compose::{
	ActiveContext, ProvidedLocations, SessionStream, locations_and_providers,
	locations_and_providers_for,
};
pub use registry::{
	DocumentSelector, ProviderEntry, ProviderId, ProviderRegistration, ProviderRegistry,
	ProviderSnapshot,
};
