use std::sync::Arc;
use std::sync::Mutex;

use futures::channel::mpsc;
use futures::stream::{self, Stream, StreamExt};
use lsp_types::{Position, Range, Uri};

use super::*;
use crate::provider::{LocationProvider, LocationResponse, ProviderError, ProviderStream};
use crate::query::Query;

fn query() -> Query {
	let uri: Uri = "file:///src/main.rs".parse().unwrap();
	Query::new(uri, Position::new(3, 7))
}

fn loc(line: u32) -> Arc<Location> {
	let uri: Uri = "file:///src/lib.rs".parse().unwrap();
	Arc::new(Location {
		uri,
		range: Range::new(Position::new(line, 0), Position::new(line, 5)),
	})
}

/// Provider that replays a fixed emission schedule synchronously.
fn emits(items: Vec<Result<LocationResponse, &'static str>>) -> Arc<dyn LocationProvider> {
	Arc::new(move |_query: &Query| -> ProviderStream {
		stream::iter(
			items
				.clone()
				.into_iter()
				.map(|item| item.map_err(ProviderError::message)),
		)
		.boxed()
	})
}

/// Provider whose emissions are driven by the test through a channel.
struct ChannelProvider {
	rx: Mutex<Option<mpsc::UnboundedReceiver<Result<LocationResponse, ProviderError>>>>,
}

impl LocationProvider for ChannelProvider {
	fn locations(&self, _query: &Query) -> ProviderStream {
		match self.rx.lock().unwrap().take() {
			Some(rx) => rx.boxed(),
			None => stream::empty().boxed(),
		}
	}
}

fn channel_provider() -> (
	mpsc::UnboundedSender<Result<LocationResponse, ProviderError>>,
	Arc<dyn LocationProvider>,
) {
	let (tx, rx) = mpsc::unbounded();
	(
		tx,
		Arc::new(ChannelProvider {
			rx: Mutex::new(Some(rx)),
		}),
	)
}

async fn drain(mut merged: impl Stream<Item = AggregateResult> + Unpin) -> Vec<AggregateResult> {
	let mut out = Vec::new();
	while let Some(item) = merged.next().await {
		out.push(item);
	}
	out
}

fn same_result(a: &AggregateResult, b: &AggregateResult) -> bool {
	shallow_eq(a, b)
}

#[tokio::test]
async fn empty_provider_list_yields_null_once() {
	let mut merged = locations(&[], &query());
	assert!(merged.next().await.unwrap().is_none());
	assert!(merged.next().await.is_none());
}

#[tokio::test]
async fn single_scalar_provider() {
	let l1 = loc(1);
	let providers = [emits(vec![Ok(LocationResponse::Scalar(l1.clone()))])];

	let results = drain(locations(&providers, &query())).await;
	assert_eq!(results.len(), 1);
	let combined = results[0].as_ref().unwrap();
	assert_eq!(combined.len(), 1);
	assert!(Arc::ptr_eq(&combined[0], &l1));

	// The unwrap adapter collapses the singleton array to the bare value.
	let mut single = location(&providers, &query());
	match single.next().await.unwrap() {
		LocationResponse::Scalar(got) => assert!(Arc::ptr_eq(&got, &l1)),
		other => panic!("expected scalar, got {other:?}"),
	}
}

#[tokio::test]
async fn singleton_unwrap_passes_other_shapes_through() {
	let (l1, l2) = (loc(1), loc(2));

	let two = [emits(vec![Ok(LocationResponse::Array(vec![
		l1.clone(),
		l2.clone(),
	]))])];
	let mut single = location(&two, &query());
	match single.next().await.unwrap() {
		LocationResponse::Array(locs) => assert_eq!(locs.len(), 2),
		other => panic!("expected array, got {other:?}"),
	}

	let none = [emits(vec![Ok(LocationResponse::None)])];
	let mut single = location(&none, &query());
	assert!(matches!(
		single.next().await.unwrap(),
		LocationResponse::None
	));
}

#[tokio::test]
async fn failing_provider_is_isolated() {
	let l2 = loc(2);
	let providers = [
		emits(vec![Err("backend exploded")]),
		emits(vec![Ok(LocationResponse::Array(vec![l2.clone()]))]),
	];

	let results = drain(locations(&providers, &query())).await;
	// The failure becomes a null contribution first, then the healthy
	// provider's result lands; the failure never aborts the merge.
	let last = results.last().unwrap().as_ref().unwrap();
	assert_eq!(last.len(), 1);
	assert!(Arc::ptr_eq(&last[0], &l2));
}

#[tokio::test]
async fn duplicates_preserved_in_registration_order() {
	let (l1, l2) = (loc(1), loc(2));
	let providers = [
		emits(vec![Ok(LocationResponse::Array(vec![
			l1.clone(),
			l2.clone(),
		]))]),
		emits(vec![Ok(LocationResponse::Array(vec![l1.clone()]))]),
	];

	let results = drain(locations(&providers, &query())).await;
	let combined = results.last().unwrap().as_ref().unwrap();
	assert_eq!(combined.len(), 3);
	assert!(Arc::ptr_eq(&combined[0], &l1));
	assert!(Arc::ptr_eq(&combined[1], &l2));
	assert!(Arc::ptr_eq(&combined[2], &l1));
}

#[tokio::test]
async fn sentinel_to_null_transition_is_suppressed() {
	let l1 = loc(1);
	let (tx, slow) = channel_provider();
	let providers = [
		emits(vec![Ok(LocationResponse::Array(vec![l1.clone()]))]),
		slow,
	];
	let mut merged = locations(&providers, &query());

	// Partial result surfaces before the slow provider has spoken.
	let first = merged.next().await.unwrap().unwrap();
	assert!(Arc::ptr_eq(&first[0], &l1));

	// The slow provider answering a genuine null changes nothing visible.
	tx.unbounded_send(Ok(LocationResponse::None)).unwrap();
	drop(tx);
	assert!(merged.next().await.is_none());
}

#[tokio::test]
async fn error_after_value_turns_slot_null() {
	let (l1, l2) = (loc(1), loc(2));
	let (tx_a, a) = channel_provider();
	let (tx_b, b) = channel_provider();
	let mut merged = locations(&[a, b], &query());

	tx_a.unbounded_send(Ok(LocationResponse::Array(vec![l1.clone()])))
		.unwrap();
	let first = merged.next().await.unwrap().unwrap();
	assert_eq!(first.len(), 1);

	tx_b.unbounded_send(Ok(LocationResponse::Array(vec![l2.clone()])))
		.unwrap();
	let second = merged.next().await.unwrap().unwrap();
	assert_eq!(second.len(), 2);
	assert!(Arc::ptr_eq(&second[0], &l1));
	assert!(Arc::ptr_eq(&second[1], &l2));

	// A's failure drops its prior contribution but leaves B intact.
	tx_a.unbounded_send(Err(ProviderError::message("gone")))
		.unwrap();
	let third = merged.next().await.unwrap().unwrap();
	assert_eq!(third.len(), 1);
	assert!(Arc::ptr_eq(&third[0], &l2));

	drop(tx_b);
	assert!(merged.next().await.is_none());
}

#[tokio::test]
async fn silent_providers_produce_nothing() {
	let providers = [emits(vec![]), emits(vec![])];
	let mut merged = locations(&providers, &query());
	assert!(merged.next().await.is_none());
}

#[tokio::test]
async fn progressive_emissions_keep_provider_order() {
	let (l1, l2) = (loc(1), loc(2));
	let providers = [emits(vec![
		Ok(LocationResponse::Array(vec![l1.clone()])),
		Ok(LocationResponse::Array(vec![l1.clone(), l2.clone()])),
	])];

	let results = drain(locations(&providers, &query())).await;
	assert_eq!(results.len(), 2);
	assert_eq!(results[0].as_ref().unwrap().len(), 1);
	let last = results[1].as_ref().unwrap();
	assert!(Arc::ptr_eq(&last[0], &l1));
	assert!(Arc::ptr_eq(&last[1], &l2));
}

#[tokio::test]
async fn identical_schedules_replay_identically() {
	let (l1, l2) = (loc(1), loc(2));
	let schedule = || {
		[
			emits(vec![
				Ok(LocationResponse::Array(vec![l1.clone()])),
				Ok(LocationResponse::Array(vec![l1.clone(), l2.clone()])),
			]),
			emits(vec![Err("flaky")]),
			emits(vec![Ok(LocationResponse::Scalar(l2.clone()))]),
		]
	};

	let first = drain(locations(&schedule(), &query())).await;
	let second = drain(locations(&schedule(), &query())).await;
	assert_eq!(first.len(), second.len());
	for (a, b) in first.iter().zip(&second) {
		assert!(same_result(a, b));
	}
}

#[test]
fn shallow_equality_law() {
	let (l1, l2) = (loc(1), loc(2));

	assert!(shallow_eq(&None, &None));
	assert!(!shallow_eq(&None, &Some(vec![l1.clone()])));
	assert!(shallow_eq(
		&Some(vec![l1.clone(), l2.clone()]),
		&Some(vec![l1.clone(), l2.clone()])
	));
	assert!(!shallow_eq(
		&Some(vec![l1.clone()]),
		&Some(vec![l1.clone(), l2.clone()])
	));

	// Structurally equal but distinct allocations are not shallow-equal.
	let rebuilt = Arc::new((*l1).clone());
	assert!(!shallow_eq(&Some(vec![l1.clone()]), &Some(vec![rebuilt])));
}
