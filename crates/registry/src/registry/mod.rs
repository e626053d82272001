//! The provider population.
//!
//! Mutation happens only through [`ProviderRegistry::register`] and the
//! drop of the returned [`ProviderRegistration`] guard; everything else
//! observes the population as immutable [`ProviderSnapshot`]s published
//! over a watch channel.

use std::fmt;
use std::sync::{Arc, Weak};

use locus_providers::{LocationMerge, LocationProvider, Query, SingleLocationMerge};
use lsp_types::Uri;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

/// Opaque matching criteria deciding which documents a provider applies
/// to. The predicate itself is an external collaborator; the registry
/// only ever asks it yes/no for a document identity.
pub trait DocumentSelector: Send + Sync {
	/// Whether the provider behind this selector applies to `uri`.
	fn matches(&self, uri: &Uri) -> bool;
}

impl<F> DocumentSelector for F
where
	F: Fn(&Uri) -> bool + Send + Sync,
{
	fn matches(&self, uri: &Uri) -> bool {
		self(uri)
	}
}

/// Stable identifier a provider may be registered under, for exact-id
/// selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderId(Arc<str>);

impl ProviderId {
	/// Creates an identifier.
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}
}

impl From<&str> for ProviderId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl fmt::Display for ProviderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Ties a registration guard to the entry it removes on drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RegistrationToken(u64);

/// One registered provider: selector, provider function, optional id.
/// Immutable after registration.
#[derive(Clone)]
pub struct ProviderEntry {
	selector: Arc<dyn DocumentSelector>,
	provider: Arc<dyn LocationProvider>,
	id: Option<ProviderId>,
	token: RegistrationToken,
}

impl ProviderEntry {
	/// The provider function.
	pub fn provider(&self) -> &Arc<dyn LocationProvider> {
		&self.provider
	}

	/// The identifier this entry was registered under, if any.
	pub fn id(&self) -> Option<&ProviderId> {
		self.id.as_ref()
	}

	/// Whether this entry's selector matches `uri`.
	pub fn matches(&self, uri: &Uri) -> bool {
		self.selector.matches(uri)
	}
}

/// Immutable point-in-time view of the provider population, in
/// registration order.
pub type ProviderSnapshot = Arc<[ProviderEntry]>;

struct RegistryState {
	entries: Vec<ProviderEntry>,
	next_token: u64,
}

/// Registry owning the dynamic set of location providers.
///
/// Shared as `Arc<ProviderRegistry>`; registration guards hold a weak
/// reference so a guard outliving the registry is a no-op on drop.
pub struct ProviderRegistry {
	state: RwLock<RegistryState>,
	snapshot_tx: watch::Sender<ProviderSnapshot>,
}

impl ProviderRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		let (snapshot_tx, _rx) = watch::channel::<ProviderSnapshot>(Arc::from(Vec::new()));
		Self {
			state: RwLock::new(RegistryState {
				entries: Vec::new(),
				next_token: 0,
			}),
			snapshot_tx,
		}
	}

	/// Registers a provider for the documents its selector matches.
	/// Dropping the returned guard unregisters it.
	pub fn register(
		self: &Arc<Self>,
		selector: Arc<dyn DocumentSelector>,
		provider: Arc<dyn LocationProvider>,
	) -> ProviderRegistration {
		self.insert(selector, provider, None)
	}

	/// Registers a provider under a stable identifier, for exact-id
	/// selection alongside the usual selector matching.
	pub fn register_with_id(
		self: &Arc<Self>,
		selector: Arc<dyn DocumentSelector>,
		provider: Arc<dyn LocationProvider>,
		id: ProviderId,
	) -> ProviderRegistration {
		self.insert(selector, provider, Some(id))
	}

	fn insert(
		self: &Arc<Self>,
		selector: Arc<dyn DocumentSelector>,
		provider: Arc<dyn LocationProvider>,
		id: Option<ProviderId>,
	) -> ProviderRegistration {
		let token = {
			let mut state = self.state.write();
			let token = RegistrationToken(state.next_token);
			state.next_token += 1;
			state.entries.push(ProviderEntry {
				selector,
				provider,
				id,
				token,
			});
			self.publish(&state);
			token
		};
		debug!(token = token.0, "registered location provider");
		ProviderRegistration {
			registry: Arc::downgrade(self),
			token,
		}
	}

	fn remove(&self, token: RegistrationToken) {
		let mut state = self.state.write();
		let before = state.entries.len();
		state.entries.retain(|entry| entry.token != token);
		if state.entries.len() != before {
			self.publish(&state);
			debug!(token = token.0, "unregistered location provider");
		}
	}

	fn publish(&self, state: &RegistryState) {
		self.snapshot_tx.send_replace(Arc::from(state.entries.clone()));
	}

	/// Current point-in-time snapshot.
	pub fn snapshot(&self) -> ProviderSnapshot {
		self.snapshot_tx.borrow().clone()
	}

	/// Subscribes to snapshot changes. The receiver starts at the
	/// current snapshot.
	pub fn subscribe(&self) -> watch::Receiver<ProviderSnapshot> {
		self.snapshot_tx.subscribe()
	}

	/// Number of registered providers.
	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Whether no provider is registered.
	pub fn is_empty(&self) -> bool {
		self.state.read().entries.is_empty()
	}

	/// Whether any registered provider applies to `uri`.
	pub fn has_provider_for(&self, uri: &Uri) -> bool {
		self.state
			.read()
			.entries
			.iter()
			.any(|entry| entry.matches(uri))
	}

	/// Providers applying to `uri`, in registration order.
	pub fn providers_for(&self, uri: &Uri) -> Vec<Arc<dyn LocationProvider>> {
		self.state
			.read()
			.entries
			.iter()
			.filter(|entry| entry.matches(uri))
			.map(|entry| entry.provider.clone())
			.collect()
	}

	/// Runs the merge for `query` against the providers matching it
	/// right now. Array-or-none shape.
	pub fn locations(&self, query: &Query) -> LocationMerge {
		let selected = self.providers_for(&query.uri);
		locus_providers::locations(&selected, query)
	}

	/// Runs the merge for `query` against the providers matching it
	/// right now, collapsing a singleton result to the bare location.
	pub fn location(&self, query: &Query) -> SingleLocationMerge {
		let selected = self.providers_for(&query.uri);
		locus_providers::location(&selected, query)
	}
}

impl Default for ProviderRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Disposal handle for one registration. Dropping it removes the entry
/// and notifies snapshot subscribers.
pub struct ProviderRegistration {
	registry: Weak<ProviderRegistry>,
	token: RegistrationToken,
}

impl ProviderRegistration {
	/// Explicitly unregisters the provider. Equivalent to dropping the
	/// guard.
	pub fn dispose(self) {}
}

impl Drop for ProviderRegistration {
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			registry.remove(self.token);
		}
	}
}
