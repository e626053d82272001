//! Latest-of-each merge of concurrent provider streams.
//!
//! [`merge`] invokes every provider for one query up front and combines
//! their result streams: whenever any provider advances, the combined
//! snapshot of every provider's most recent value is recomputed,
//! flattened, and emitted unless it is shallow-equal to the previous
//! emission. A failing provider is logged and contributes a terminal
//! `None` without affecting the other providers.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tracing::warn;

use crate::provider::{Location, LocationProvider, LocationResponse, ProviderError, ProviderStream};
use crate::query::Query;

/// One combined emission: every flattened location in provider order,
/// or `None` when no provider found anything. Never `Some` of an empty
/// vector; empty results normalize to `None`.
pub type AggregateResult = Option<Vec<Arc<Location>>>;

/// The most recent value of one provider slot.
///
/// `Sentinel` marks a provider that has not yet spoken. It is private to
/// the engine and can never be confused with a genuine
/// [`LocationResponse::None`], which a provider emits deliberately.
enum SlotValue {
	Sentinel,
	Value(LocationResponse),
}

struct Slot {
	/// Live invocation stream; `None` once the provider completed or
	/// failed, which ends that slot's subscription.
	stream: Option<ProviderStream>,
	latest: SlotValue,
}

/// Outcome of polling one slot's stream once.
enum Advance {
	Item(LocationResponse),
	Failed(ProviderError),
	Finished,
	Pending,
}

/// Passes over the slots per poll before yielding back to the executor.
/// Bounds the work a spammy provider can force into a single poll.
const POLL_PASS_BUDGET: usize = 64;

/// Merged result stream over N concurrent provider invocations.
///
/// Created by [`merge`]. All provider invocations are issued when the
/// value is constructed; dropping it tears down every outstanding
/// subscription.
pub struct LocationMerge {
	slots: Vec<Slot>,
	/// Snapshots computed but not yet handed to the consumer, in causal
	/// order.
	ready: VecDeque<AggregateResult>,
	/// Most recently queued result, for the shallow dedup law.
	last: Option<AggregateResult>,
}

/// Invokes every provider with `query` and returns the combined stream.
///
/// An empty provider list yields `None` exactly once without invoking
/// anything. Otherwise the stream emits once per distinct combined
/// result and terminates when every provider stream has terminated.
pub fn merge(providers: &[Arc<dyn LocationProvider>], query: &Query) -> LocationMerge {
	let mut ready = VecDeque::new();
	let mut last = None;
	if providers.is_empty() {
		ready.push_back(None);
		last = Some(None);
	}
	let slots = providers
		.iter()
		.map(|provider| Slot {
			stream: Some(provider.locations(query)),
			latest: SlotValue::Sentinel,
		})
		.collect();
	LocationMerge { slots, ready, last }
}

impl LocationMerge {
	/// Recomputes the combined snapshot and queues it unless it is
	/// suppressed: all slots still sentinel (nothing to show yet), or
	/// shallow-equal to the previously queued result.
	fn push_snapshot(&mut self) {
		let mut spoken = false;
		let mut flat: Vec<Arc<Location>> = Vec::new();
		for slot in &self.slots {
			match &slot.latest {
				SlotValue::Sentinel => {}
				SlotValue::Value(response) => {
					spoken = true;
					response.flatten_into(&mut flat);
				}
			}
		}
		if !spoken {
			return;
		}
		let result = if flat.is_empty() { None } else { Some(flat) };
		if let Some(last) = &self.last
			&& shallow_eq(last, &result)
		{
			return;
		}
		self.last = Some(result.clone());
		self.ready.push_back(result);
	}
}

impl Stream for LocationMerge {
	type Item = AggregateResult;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();

		// Poll every live slot at most once per pass, applying each
		// advance to its slot before the next one so combined snapshots
		// stay totally ordered. Keep passing while progress is made and
		// nothing is queued, so a suppressed emission cannot leave a
		// stream unpolled behind a Pending return.
		for pass in 0.. {
			let mut progressed = false;
			for index in 0..this.slots.len() {
				let advance = match this.slots[index].stream.as_mut() {
					None => continue,
					Some(stream) => match stream.as_mut().poll_next(cx) {
						Poll::Pending => Advance::Pending,
						Poll::Ready(Some(Ok(response))) => Advance::Item(response),
						Poll::Ready(Some(Err(err))) => Advance::Failed(err),
						Poll::Ready(None) => Advance::Finished,
					},
				};
				match advance {
					Advance::Pending => {}
					Advance::Item(response) => {
						progressed = true;
						this.slots[index].latest = SlotValue::Value(response);
						this.push_snapshot();
					}
					Advance::Failed(err) => {
						// Isolated: this slot turns into a terminal
						// `None` contribution, the others are untouched.
						warn!(provider = index, error = %err, "location provider failed");
						progressed = true;
						this.slots[index].stream = None;
						this.slots[index].latest = SlotValue::Value(LocationResponse::None);
						this.push_snapshot();
					}
					Advance::Finished => {
						progressed = true;
						this.slots[index].stream = None;
					}
				}
			}
			if !this.ready.is_empty() || !progressed {
				break;
			}
			if pass == POLL_PASS_BUDGET {
				cx.waker().wake_by_ref();
				break;
			}
		}

		if let Some(result) = this.ready.pop_front() {
			return Poll::Ready(Some(result));
		}
		if this.slots.iter().all(|slot| slot.stream.is_none()) {
			return Poll::Ready(None);
		}
		Poll::Pending
	}
}

/// The dedup law: both `None`, or arrays of equal length whose elements
/// are pairwise the same allocation. Results can be large, so identity
/// comparison keeps this linear and cheap; the main repeat source is a
/// provider flipping from sentinel to a genuine `None` with no other
/// change, and that transition must not be visible.
fn shallow_eq(a: &AggregateResult, b: &AggregateResult) -> bool {
	match (a, b) {
		(None, None) => true,
		(Some(a), Some(b)) => {
			a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
		}
		_ => false,
	}
}

/// Array-or-none shape adapter: the merge result unmodified. Used where
/// callers need a uniform shape, e.g. reference search.
pub fn locations(providers: &[Arc<dyn LocationProvider>], query: &Query) -> LocationMerge {
	merge(providers, query)
}

/// Singleton-unwrapping shape adapter over [`merge`]: a one-element
/// combined result is collapsed to the bare location.
pub fn location(providers: &[Arc<dyn LocationProvider>], query: &Query) -> SingleLocationMerge {
	SingleLocationMerge {
		inner: merge(providers, query),
	}
}

/// Stream returned by [`location`].
pub struct SingleLocationMerge {
	inner: LocationMerge,
}

impl Stream for SingleLocationMerge {
	type Item = LocationResponse;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		Pin::new(&mut self.get_mut().inner)
			.poll_next(cx)
			.map(|opt| opt.map(unwrap_singleton))
	}
}

fn unwrap_singleton(result: AggregateResult) -> LocationResponse {
	match result {
		None => LocationResponse::None,
		Some(locs) => {
			if let [loc] = locs.as_slice() {
				LocationResponse::Scalar(Arc::clone(loc))
			} else {
				LocationResponse::Array(locs)
			}
		}
	}
}

#[cfg(test)]
mod tests;
