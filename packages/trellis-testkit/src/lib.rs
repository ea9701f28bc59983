mod error;

pub use error::{Error, Result};

use std::{collections::HashSet, env, time::Duration};

use ahash::RandomState;
use qdrant_client::Qdrant;
use tokio::time;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trellis_domain::{Document, HintKind, StructuralHint, terms};

/// Installs a fmt subscriber for tests. Safe to call repeatedly.
pub fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

struct SentenceBank {
	subjects: &'static [&'static str],
	verbs: &'static [&'static str],
	objects: &'static [&'static str],
	tails: &'static [&'static str],
}

const SCHEDULING: SentenceBank = SentenceBank {
	subjects: &[
		"The scheduler",
		"The run queue",
		"The load balancer",
		"The idle task",
		"The preemption path",
		"The tick handler",
		"The wakeup path",
		"The deadline server",
	],
	verbs: &[
		"rebalances",
		"inspects",
		"throttles",
		"promotes",
		"migrates",
		"parks",
		"resumes",
		"audits",
	],
	objects: &[
		"the runnable set",
		"each vruntime bucket",
		"the cgroup weights",
		"the softirq backlog",
		"the latency histogram",
		"the affinity mask",
		"the bandwidth budget",
		"the steal counter",
	],
	tails: &[
		"before the next tick lands",
		"while interrupts stay masked",
		"whenever a core goes idle",
		"until the quota refills",
		"as wakeups pile up",
		"once the window slides forward",
		"after the migration settles",
		"despite the cache penalty",
		"under sustained load",
	],
};
const RECLAIM: SentenceBank = SentenceBank {
	subjects: &[
		"The page allocator",
		"The reclaim scanner",
		"The writeback thread",
		"The swap layer",
		"The compaction pass",
		"The shrinker chain",
		"The dirty limiter",
		"The watermark probe",
	],
	verbs: &[
		"evicts", "batches", "defers", "compacts", "flushes", "isolates", "ages", "recycles",
	],
	objects: &[
		"the inactive list",
		"each folio batch",
		"the slab caches",
		"the dirty pages",
		"the migration targets",
		"the zone freelists",
		"the working set",
		"the buddy orders",
	],
	tails: &[
		"before pressure spikes again",
		"while the allocator stalls",
		"whenever watermarks dip",
		"until the refault rate drops",
		"as folios age out",
		"once writeback catches up",
		"after the batch drains",
		"despite the scan cost",
		"under memory pressure",
	],
};
const GRAPH: SentenceBank = SentenceBank {
	subjects: &[
		"The vector index",
		"The query planner",
		"The score merger",
		"The recall probe",
		"The payload filter",
		"The shard router",
		"The segment reader",
		"The rerank stage",
	],
	verbs: &[
		"ranks", "prunes", "blends", "caches", "weighs", "expands", "dedupes", "anchors",
	],
	objects: &[
		"the nearest candidates",
		"each posting block",
		"the quantized codes",
		"the similarity cutoffs",
		"the keyword matches",
		"the shard replicas",
		"the graded hits",
		"the context spans",
	],
	tails: &[
		"before recall degrades",
		"while the heap fills",
		"whenever scores cluster",
		"until the beam narrows",
		"as candidates stream in",
		"once the filter settles",
		"after the merge completes",
		"despite the fanout cost",
		"under tight latency",
	],
};

fn push_section(
	text: &mut String,
	hints: &mut Vec<StructuralHint>,
	title: &str,
	bank: &SentenceBank,
	sentences: usize,
) {
	hints.push(StructuralHint {
		offset: text.len(),
		kind: HintKind::Heading,
		title: Some(title.to_string()),
	});
	text.push_str(title);
	text.push_str("\n\n");

	for index in 0..sentences {
		text.push_str(bank.subjects[index % bank.subjects.len()]);
		text.push(' ');
		text.push_str(bank.verbs[(index / 2) % bank.verbs.len()]);
		text.push(' ');
		text.push_str(bank.objects[(index * 3) % bank.objects.len()]);
		text.push(' ');
		text.push_str(bank.tails[index % bank.tails.len()]);
		text.push_str(". ");
	}

	text.push('\n');
}

/// Two-section technical document of roughly three thousand heuristic
/// tokens, with heading hints at both section starts. Deterministic, so
/// repeated builds chunk identically.
pub fn two_section_document() -> Document {
	let mut text = String::new();
	let mut hints = Vec::new();

	push_section(&mut text, &mut hints, "Kernel Scheduling", &SCHEDULING, 72);
	push_section(&mut text, &mut hints, "Memory Reclaim", &RECLAIM, 72);

	Document::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, b"trellis-testkit:two-section"), 1, text)
		.with_hints(hints)
}

/// Single-section retrieval-flavored document of a few hundred tokens.
pub fn technical_document() -> Document {
	let mut text = String::new();
	let mut hints = Vec::new();

	push_section(&mut text, &mut hints, "Query Execution", &GRAPH, 24);

	Document::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, b"trellis-testkit:technical"), 1, text)
		.with_hints(hints)
}

/// Wraps caller-provided text in a fresh document without hints.
pub fn document_from(text: impl Into<String>) -> Document {
	Document::new(Uuid::new_v4(), 1, text)
}

/// Deterministic unit-length embedding derived from term counts. Texts
/// sharing vocabulary land on nearby vectors, so similarity math behaves
/// sensibly without a live provider.
pub fn embed_text(text: &str, dim: usize) -> Vec<f32> {
	if dim == 0 {
		return Vec::new();
	}

	let state = RandomState::with_seeds(7, 11, 13, 17);
	let mut vector = vec![0.; dim];

	for (term, count) in terms::term_frequencies(text) {
		let bucket = (state.hash_one(&term) % dim as u64) as usize;

		vector[bucket] += count as f32;
	}

	let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

	if norm > f32::EPSILON {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("TRELLIS_QDRANT_URL").ok()
}

/// Collection name that cannot collide across concurrent test runs.
pub fn unique_collection(prefix: &str) -> String {
	format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Deletes test collections, retrying while Qdrant settles. Skips quietly
/// when no Qdrant endpoint is configured.
pub async fn cleanup_qdrant_collections(collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(qdrant_url) = env_qdrant_url() else {
		eprintln!("Skipping Qdrant cleanup; set TRELLIS_QDRANT_URL to delete test collections.");

		return Ok(());
	};
	let client = Qdrant::from_url(&qdrant_url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;
	let max_attempts = 6;
	let mut remaining = collections.iter().cloned().collect::<HashSet<_>>();
	let mut backoff = Duration::from_millis(100);

	for attempt in 1..=max_attempts {
		let existing = time::timeout(Duration::from_secs(10), client.list_collections())
			.await
			.map_err(|_| Error::Message("Qdrant list_collections timed out.".to_string()))?
			.map_err(|err| Error::Message(format!("Failed to list Qdrant collections: {err}.")))?;
		let existing = existing.collections.into_iter().map(|c| c.name).collect::<HashSet<_>>();

		remaining.retain(|collection| existing.contains(collection));

		if remaining.is_empty() {
			return Ok(());
		}

		for collection in remaining.iter().cloned().collect::<Vec<_>>() {
			let result = time::timeout(
				Duration::from_secs(10),
				client.delete_collection(collection.clone()),
			)
			.await;

			match result {
				Ok(Ok(_)) => {},
				Ok(Err(err)) =>
					if attempt == max_attempts {
						return Err(Error::Message(format!(
							"Failed to delete Qdrant collection {collection:?} after {attempt} attempts: {err}."
						)));
					},
				Err(_) =>
					if attempt == max_attempts {
						return Err(Error::Message(format!(
							"Timed out deleting Qdrant collection {collection:?} after {attempt} attempts."
						)));
					},
			}
		}

		time::sleep(backoff).await;

		backoff = backoff.saturating_mul(2).min(Duration::from_secs(2));
	}

	Ok(())
}
