//! Reactive composition of the provider population and the active
//! document context.
//!
//! [`locations_and_providers`] recomputes the matching provider subset
//! and restarts the merge whenever either input changes. Each emission
//! carries a fresh [`SessionStream`]; starting a new session cancels the
//! previous one, so emissions from a superseded session can never
//! interleave with fresh results.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use futures::future::BoxFuture;
use futures::stream;
use locus_providers::{AggregateResult, LocationMerge, LocationProvider, Query, merge};
use lsp_types::{Position, Uri};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::{ProviderId, ProviderRegistry, ProviderSnapshot};

/// The currently active document and cursor position, as reported by an
/// external source. `None` on the context channel means no document is
/// active.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveContext {
	/// Identity of the active document.
	pub uri: Uri,
	/// Cursor position within it.
	pub position: Position,
}

/// One composer emission: the merge session for the current state, plus
/// whether any provider matched. `locations` is `None` exactly when no
/// document is active.
pub struct ProvidedLocations {
	/// Result stream of the current merge session.
	pub locations: Option<SessionStream>,
	/// Whether the current state selected at least one provider.
	pub has_providers: bool,
}

impl fmt::Debug for ProvidedLocations {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProvidedLocations")
			.field("has_providers", &self.has_providers)
			.field("locations", &self.locations.as_ref().map(|_| ".."))
			.finish()
	}
}

/// How the composer picks providers out of a snapshot. Selection is
/// orthogonal to the merge; both strategies drive the identical engine.
enum Selection {
	/// Entries whose selector matches the active document.
	Matching,
	/// The entry registered under exactly this identifier.
	ById(ProviderId),
}

impl Selection {
	fn select(&self, snapshot: &ProviderSnapshot, uri: &Uri) -> Vec<Arc<dyn LocationProvider>> {
		match self {
			Selection::Matching => snapshot
				.iter()
				.filter(|entry| entry.matches(uri))
				.map(|entry| entry.provider().clone())
				.collect(),
			Selection::ById(id) => snapshot
				.iter()
				.filter(|entry| entry.id() == Some(id))
				.map(|entry| entry.provider().clone())
				.collect(),
		}
	}
}

/// Watches the provider population and the active context, emitting a
/// fresh [`ProvidedLocations`] on every change of either.
///
/// The stream ends when the context channel closes (upstream failure or
/// shutdown propagates as completion) or the registry is dropped.
pub fn locations_and_providers(
	registry: Arc<ProviderRegistry>,
	context: watch::Receiver<Option<ActiveContext>>,
	extra: Option<Value>,
) -> impl Stream<Item = ProvidedLocations> {
	compose(registry, context, extra, Selection::Matching)
}

/// Like [`locations_and_providers`], but selects by exact provider
/// identifier instead of selector matching. Typically yields zero or one
/// provider.
pub fn locations_and_providers_for(
	registry: Arc<ProviderRegistry>,
	context: watch::Receiver<Option<ActiveContext>>,
	extra: Option<Value>,
	id: ProviderId,
) -> impl Stream<Item = ProvidedLocations> {
	compose(registry, context, extra, Selection::ById(id))
}

struct ComposeState {
	/// Keeps the registry (and with it the snapshot sender and every
	/// registration guard's target) alive for the composer's lifetime,
	/// even when the caller moved their only handle in.
	_registry: Arc<ProviderRegistry>,
	providers_rx: watch::Receiver<ProviderSnapshot>,
	context_rx: watch::Receiver<Option<ActiveContext>>,
	extra: Option<Value>,
	selection: Selection,
	/// Cancels the session handed out by the previous emission.
	current: Option<CancellationToken>,
	primed: bool,
}

fn compose(
	registry: Arc<ProviderRegistry>,
	context_rx: watch::Receiver<Option<ActiveContext>>,
	extra: Option<Value>,
	selection: Selection,
) -> impl Stream<Item = ProvidedLocations> {
	let state = ComposeState {
		providers_rx: registry.subscribe(),
		_registry: registry,
		context_rx,
		extra,
		selection,
		current: None,
		primed: false,
	};
	stream::unfold(state, |mut st| async move {
		if st.primed {
			tokio::select! {
				changed = st.context_rx.changed() => {
					if changed.is_err() {
						return None;
					}
				}
				changed = st.providers_rx.changed() => {
					if changed.is_err() {
						return None;
					}
				}
			}
		} else {
			st.primed = true;
		}

		// Read both inputs and mark them seen, so a simultaneous change
		// of population and context coalesces into one recomputation.
		let context = st.context_rx.borrow_and_update().clone();
		let snapshot = st.providers_rx.borrow_and_update().clone();

		if let Some(previous) = st.current.take() {
			previous.cancel();
		}

		let item = match context {
			None => ProvidedLocations {
				locations: None,
				has_providers: false,
			},
			Some(context) => {
				let query = match &st.extra {
					Some(extra) => {
						Query::with_extra(context.uri.clone(), context.position, extra.clone())
					}
					None => Query::new(context.uri.clone(), context.position),
				};
				let selected = st.selection.select(&snapshot, &context.uri);
				let has_providers = !selected.is_empty();
				debug!(
					providers = selected.len(),
					uri = query.uri.as_str(),
					"starting merge session"
				);
				let token = CancellationToken::new();
				st.current = Some(token.clone());
				ProvidedLocations {
					locations: Some(SessionStream::new(merge(&selected, &query), token)),
					has_providers,
				}
			}
		};
		Some((item, st))
	})
}

/// One cancellable merge session.
///
/// Behaves like the underlying merge stream until the composer
/// supersedes it, at which point it drops every provider subscription
/// and terminates without emitting again. The cancellation future is
/// boxed so the session stays `Unpin` like the merge stream beneath it.
pub struct SessionStream {
	inner: Option<LocationMerge>,
	cancelled: BoxFuture<'static, ()>,
}

impl SessionStream {
	fn new(inner: LocationMerge, token: CancellationToken) -> Self {
		Self {
			inner: Some(inner),
			cancelled: Box::pin(token.cancelled_owned()),
		}
	}
}

impl Stream for SessionStream {
	type Item = AggregateResult;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();
		if this.inner.is_none() {
			return Poll::Ready(None);
		}
		if this.cancelled.as_mut().poll(cx).is_ready() {
			this.inner = None;
			return Poll::Ready(None);
		}
		let Some(session) = this.inner.as_mut() else {
			return Poll::Ready(None);
		};
		let poll = Pin::new(session).poll_next(cx);
		if matches!(poll, Poll::Ready(None)) {
			this.inner = None;
		}
		poll
	}
}
