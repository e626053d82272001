//! Per-request query values.

use lsp_types::{Position, Uri};
use serde_json::Value;

/// A single location request: a document identity plus cursor position,
/// optionally extended with a request-specific payload.
///
/// A query is constructed fresh for every active-document change and never
/// mutated afterwards; it is cheap to clone for fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
	/// Identity of the document the request targets.
	pub uri: Uri,
	/// Cursor position within the document.
	pub position: Position,
	/// Request-specific extra fields (e.g. "include declaration" for a
	/// reference search). Opaque to the aggregation layer.
	pub extra: Option<Value>,
}

impl Query {
	/// Creates a query without an extra payload.
	pub fn new(uri: Uri, position: Position) -> Self {
		Self {
			uri,
			position,
			extra: None,
		}
	}

	/// Creates a query carrying a request-specific payload.
	pub fn with_extra(uri: Uri, position: Position, extra: Value) -> Self {
		Self {
			uri,
			position,
			extra: Some(extra),
		}
	}
}
