//! The provider contract.

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::query::Query;

/// The opaque location value providers speak in: a document URI plus a
/// range within it. Always handled behind [`Arc`] so the aggregation
/// layer can compare results by identity instead of deep equality.
pub type Location = lsp_types::Location;

/// A single emission from a provider: nothing, one location, or several.
///
/// This is also the output shape of the singleton-unwrapping adapter
/// [`location`](crate::location), mirroring
/// [`lsp_types::GotoDefinitionResponse`].
#[derive(Debug, Clone)]
pub enum LocationResponse {
	/// The provider has nothing for this query.
	None,
	/// A single location.
	Scalar(Arc<Location>),
	/// Zero or more locations, in the provider's own order.
	Array(Vec<Arc<Location>>),
}

impl LocationResponse {
	/// Appends this response's locations to `out`, preserving order.
	pub(crate) fn flatten_into(&self, out: &mut Vec<Arc<Location>>) {
		match self {
			LocationResponse::None => {}
			LocationResponse::Scalar(loc) => out.push(loc.clone()),
			LocationResponse::Array(locs) => out.extend(locs.iter().cloned()),
		}
	}
}

impl From<Arc<Location>> for LocationResponse {
	fn from(loc: Arc<Location>) -> Self {
		LocationResponse::Scalar(loc)
	}
}

impl From<Vec<Arc<Location>>> for LocationResponse {
	fn from(locs: Vec<Arc<Location>>) -> Self {
		LocationResponse::Array(locs)
	}
}

/// Failure raised by a provider invocation or by its result stream.
///
/// The source is opaque: providers are external collaborators and the
/// engine only ever logs their failures, so no structure is imposed.
#[derive(Debug, thiserror::Error)]
#[error("provider failed: {source}")]
pub struct ProviderError {
	#[from]
	source: Box<dyn std::error::Error + Send + Sync>,
}

impl ProviderError {
	/// Creates an error from a plain message.
	pub fn message(msg: impl Into<String>) -> Self {
		Self {
			source: msg.into().into(),
		}
	}
}

/// Result stream of one provider invocation.
///
/// A provider may emit zero, one, or many responses over its lifetime
/// (progressive results) and may fail at any point. An error is terminal
/// for that invocation.
pub type ProviderStream = BoxStream<'static, Result<LocationResponse, ProviderError>>;

/// An externally contributed source of location results.
///
/// Every [`Query`] triggers a fresh, independent invocation; providers
/// must be safely re-invocable. Implementations are typically shared as
/// `Arc<dyn LocationProvider>`.
pub trait LocationProvider: Send + Sync {
	/// Starts one invocation for `query` and returns its result stream.
	fn locations(&self, query: &Query) -> ProviderStream;
}

impl<F> LocationProvider for F
where
	F: Fn(&Query) -> ProviderStream + Send + Sync,
{
	fn locations(&self, query: &Query) -> ProviderStream {
		self(query)
	}
}
