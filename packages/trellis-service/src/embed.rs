//! Multi-view embedding orchestration: view text construction, batched
//! provider calls with retry and timeout, a bounded single-flight cache and
//! degenerate-vector validation.

use std::{
	num::NonZeroUsize,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	time::Duration,
};

use ahash::{AHashMap, AHashSet};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{
	sync::OwnedMutexGuard,
	time::{sleep, timeout},
};
use tracing::{debug, warn};
use uuid::Uuid;

use trellis_chunking::TokenCounter;
use trellis_domain::{
	Chunk, ChunkForest, ChunkScale, Document, EmbeddingView, ViewKind, similarity, terms,
};

use crate::{Error, Result, TrellisService};

/// Delay before the second attempt of a failed batch; doubles per retry.
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_CAP: Duration = Duration::from_secs(30);
/// Keywords drawn for the semantic view and the validation summary.
const KEYWORD_LIMIT: usize = 12;
/// Budget for an ancestor title derived from head text.
const TITLE_TOKENS: u32 = 8;

/// A view that could not be generated; the chunk stays retrievable through
/// its remaining views.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AbsentView {
	pub chunk_id: Uuid,
	pub kind: ViewKind,
	pub reason: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EmbeddingReport {
	pub requested: u32,
	/// Views computed by the provider during this call.
	pub produced: u32,
	/// Views served from the cache or a concurrent caller's work.
	pub from_cache: u32,
	/// Document-scale views pooled from child vectors.
	pub pooled: u32,
	pub absent: Vec<AbsentView>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum SlotKind {
	View(ViewKind),
	/// Term-summary vector backing validation.
	Summary,
	/// Per-sentence vector for boundary detection.
	Sentence,
}

type CacheKey = (Uuid, SlotKind, [u8; 32]);
type CacheValue = (Vec<f32>, f32);
type PendingSlot = Arc<tokio::sync::Mutex<Option<CacheValue>>>;

enum Claim {
	Hit(CacheValue),
	Wait(PendingSlot),
	Work(OwnedMutexGuard<Option<CacheValue>>),
}

struct CacheState {
	ready: LruCache<CacheKey, CacheValue>,
	pending: AHashMap<CacheKey, PendingSlot>,
}

/// Bounded LRU of finished vectors plus a pending map that collapses
/// concurrent requests for one key into a single provider call.
pub(crate) struct ViewCache {
	state: Mutex<CacheState>,
}
impl ViewCache {
	pub(crate) fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

		Self {
			state: Mutex::new(CacheState {
				ready: LruCache::new(capacity),
				pending: AHashMap::new(),
			}),
		}
	}

	// The lock is never held across an await point.
	fn lock(&self) -> MutexGuard<'_, CacheState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Looks the key up; a miss either claims the slot for this caller
	/// (`Work`) or joins the caller already computing it (`Wait`).
	fn claim(&self, key: CacheKey) -> Claim {
		let mut state = self.lock();

		if let Some(value) = state.ready.get(&key) {
			return Claim::Hit(value.clone());
		}
		if let Some(slot) = state.pending.get(&key) {
			return Claim::Wait(slot.clone());
		}

		let slot = PendingSlot::default();
		let Ok(guard) = slot.clone().try_lock_owned() else {
			// A freshly created mutex can not be contended.
			return Claim::Wait(slot);
		};

		state.pending.insert(key, slot);

		Claim::Work(guard)
	}

	/// Publishes the result of a claimed slot and releases its waiters.
	/// `None` records a failed attempt; waiters see the empty slot and give
	/// up rather than repeating the call.
	fn complete(
		&self,
		key: CacheKey,
		mut guard: OwnedMutexGuard<Option<CacheValue>>,
		value: Option<CacheValue>,
	) {
		let mut state = self.lock();

		state.pending.remove(&key);

		if let Some(value) = value {
			state.ready.put(key, value.clone());
			*guard = Some(value);
		}
	}
}

struct ViewJob {
	chunk_id: Uuid,
	kind: ViewKind,
	text: String,
}

enum Validation {
	Accepted(f32),
	Rejected,
}

impl TrellisService {
	/// Generates the requested embedding views for every chunk in the forest.
	///
	/// Views already cached skip the provider; fresh vectors are validated
	/// against a term-summary embedding and retried once before being
	/// recorded absent. Per-view failures degrade gracefully; only a call in
	/// which every provider batch failed is an error.
	pub async fn embed_forest(
		&self,
		document: &Document,
		forest: &ChunkForest,
		kinds: &[ViewKind],
	) -> Result<(Vec<EmbeddingView>, EmbeddingReport)> {
		let cfg = &self.cfg.embedding;
		let budget = cfg.single_input_budget_tokens;
		let mut report = EmbeddingReport::default();
		let mut views = Vec::new();
		let mut pooled_jobs = Vec::new();
		let mut claimed = Vec::new();
		let mut waiting = Vec::new();

		for chunk in forest.iter() {
			for &kind in kinds {
				report.requested += 1;

				if chunk.token_count > budget {
					if kind == ViewKind::Content && chunk.scale == ChunkScale::Document {
						pooled_jobs.push(chunk.id);
					} else {
						report.absent.push(AbsentView {
							chunk_id: chunk.id,
							kind,
							reason: "Text exceeds the single-input budget.".to_string(),
						});
					}

					continue;
				}

				let text = view_text(document, forest, chunk, kind, &self.counter, cfg);
				let job = ViewJob { chunk_id: chunk.id, kind, text };
				let key = cache_key(job.chunk_id, SlotKind::View(job.kind), &job.text);

				match self.cache.claim(key) {
					Claim::Hit((vector, quality)) => {
						report.from_cache += 1;
						views.push(finished_view(job.chunk_id, job.kind, vector, quality));
					},
					Claim::Wait(slot) => waiting.push((job, slot)),
					Claim::Work(guard) => claimed.push((job, guard)),
				}
			}
		}

		let batch_size = cfg.batch_size.max(1) as usize;
		let floor = cfg.validation_floor;
		let mut attempted_batches = 0_u32;
		let mut failed_batches = 0_u32;

		// Summaries back fresh-vector validation; chunks fully served from
		// the cache were validated when first embedded and need none.
		let summary_vectors = self
			.summaries_for(forest, &claimed, batch_size, &mut attempted_batches, &mut failed_batches)
			.await;

		let view_texts = claimed.iter().map(|(job, _)| job.text.clone()).collect::<Vec<_>>();
		let mut view_results: Vec<Option<Vec<f32>>> = Vec::with_capacity(claimed.len());

		for batch in view_texts.chunks(batch_size) {
			attempted_batches += 1;

			match self.embed_with_retry(batch).await {
				Ok(batch_vectors) => view_results.extend(batch_vectors.into_iter().map(Some)),
				Err(err) => {
					failed_batches += 1;

					warn!(error = %err, "Embedding batch failed; its views are recorded absent.");
					view_results.extend(vec![None; batch.len()]);
				},
			}
		}

		let mut retry_jobs = Vec::new();

		for ((job, guard), vector) in claimed.into_iter().zip(view_results) {
			let key = cache_key(job.chunk_id, SlotKind::View(job.kind), &job.text);

			match vector {
				Some(vector) => {
					match validate(&vector, summary_vectors.get(&job.chunk_id), floor) {
						Validation::Accepted(quality) => {
							report.produced += 1;
							self.cache.complete(key, guard, Some((vector.clone(), quality)));
							views.push(finished_view(job.chunk_id, job.kind, vector, quality));
						},
						Validation::Rejected => retry_jobs.push((job, guard)),
					}
				},
				None => {
					self.cache.complete(key, guard, None);
					report.absent.push(AbsentView {
						chunk_id: job.chunk_id,
						kind: job.kind,
						reason: "Embedding batch failed after retries.".to_string(),
					});
				},
			}
		}

		// Rejected vectors get exactly one more chance.
		if !retry_jobs.is_empty() {
			let retry_texts =
				retry_jobs.iter().map(|(job, _)| job.text.clone()).collect::<Vec<_>>();
			let mut retry_results: Vec<Option<Vec<f32>>> = Vec::with_capacity(retry_jobs.len());

			for batch in retry_texts.chunks(batch_size) {
				attempted_batches += 1;

				match self.embed_with_retry(batch).await {
					Ok(batch_vectors) =>
						retry_results.extend(batch_vectors.into_iter().map(Some)),
					Err(err) => {
						failed_batches += 1;

						warn!(error = %err, "Validation retry batch failed.");
						retry_results.extend(vec![None; batch.len()]);
					},
				}
			}

			for ((job, guard), vector) in retry_jobs.into_iter().zip(retry_results) {
				let key = cache_key(job.chunk_id, SlotKind::View(job.kind), &job.text);
				let outcome = vector.and_then(|vector| {
					match validate(&vector, summary_vectors.get(&job.chunk_id), floor) {
						Validation::Accepted(quality) => Some((vector, quality)),
						Validation::Rejected => None,
					}
				});

				match outcome {
					Some((vector, quality)) => {
						report.produced += 1;
						self.cache.complete(key, guard, Some((vector.clone(), quality)));
						views.push(finished_view(job.chunk_id, job.kind, vector, quality));
					},
					None => {
						self.cache.complete(key, guard, None);
						report.absent.push(AbsentView {
							chunk_id: job.chunk_id,
							kind: job.kind,
							reason: "Vector failed validation twice.".to_string(),
						});
					},
				}
			}
		}

		for (job, slot) in waiting {
			match slot.lock().await.clone() {
				Some((vector, quality)) => {
					report.from_cache += 1;
					views.push(finished_view(job.chunk_id, job.kind, vector, quality));
				},
				None => report.absent.push(AbsentView {
					chunk_id: job.chunk_id,
					kind: job.kind,
					reason: "Concurrent embedding attempt failed.".to_string(),
				}),
			}
		}

		// Oversized document roots pool their children instead of truncating.
		for chunk_id in pooled_jobs {
			let children = forest.children_of(chunk_id);
			let mut child_vectors = Vec::new();
			let mut qualities = Vec::new();

			for child in &children {
				if let Some(view) = views
					.iter()
					.find(|view| view.chunk_id == child.id && view.kind == ViewKind::Content)
				{
					child_vectors.push(view.vector.clone());
					qualities.push(view.quality_score);
				}
			}

			match similarity::mean_pool(&child_vectors) {
				Some(vector) => {
					let quality = qualities.iter().sum::<f32>() / qualities.len() as f32;

					report.pooled += 1;
					views.push(finished_view(chunk_id, ViewKind::Content, vector, quality));
				},
				None => report.absent.push(AbsentView {
					chunk_id,
					kind: ViewKind::Content,
					reason: "No child vectors available for pooling.".to_string(),
				}),
			}
		}

		if attempted_batches > 0 && failed_batches == attempted_batches {
			return Err(Error::Provider {
				message: "Embedding provider unavailable: every batch failed.".to_string(),
			});
		}

		debug!(
			document_id = %document.id,
			requested = report.requested,
			produced = report.produced,
			from_cache = report.from_cache,
			pooled = report.pooled,
			absent = report.absent.len(),
			"Generated embedding views."
		);

		Ok((views, report))
	}

	/// Term-summary vectors for the chunks with freshly claimed views, run
	/// through the same cache. A failed summary batch only skips validation
	/// for its chunks.
	async fn summaries_for(
		&self,
		forest: &ChunkForest,
		claimed: &[(ViewJob, OwnedMutexGuard<Option<CacheValue>>)],
		batch_size: usize,
		attempted_batches: &mut u32,
		failed_batches: &mut u32,
	) -> AHashMap<Uuid, Vec<f32>> {
		let mut ids = Vec::new();
		let mut seen = AHashSet::new();

		for (job, _) in claimed {
			if seen.insert(job.chunk_id) {
				ids.push(job.chunk_id);
			}
		}

		let mut summaries = AHashMap::new();
		let mut summary_claimed = Vec::new();
		let mut summary_waiting = Vec::new();

		for chunk_id in ids {
			let Some(chunk) = forest.get(chunk_id) else {
				continue;
			};
			let text = terms::top_terms(&chunk.content, KEYWORD_LIMIT).join(" ");

			if text.is_empty() {
				continue;
			}

			let key = cache_key(chunk_id, SlotKind::Summary, &text);

			match self.cache.claim(key) {
				Claim::Hit((vector, _)) => {
					summaries.insert(chunk_id, vector);
				},
				Claim::Wait(slot) => summary_waiting.push((chunk_id, slot)),
				Claim::Work(guard) => summary_claimed.push((chunk_id, key, text, guard)),
			}
		}

		let texts =
			summary_claimed.iter().map(|(.., text, _)| text.clone()).collect::<Vec<_>>();
		let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(summary_claimed.len());

		for batch in texts.chunks(batch_size) {
			*attempted_batches += 1;

			match self.embed_with_retry(batch).await {
				Ok(batch_vectors) => results.extend(batch_vectors.into_iter().map(Some)),
				Err(err) => {
					*failed_batches += 1;

					warn!(error = %err, "Summary batch failed; validation skipped for its chunks.");
					results.extend(vec![None; batch.len()]);
				},
			}
		}

		for ((chunk_id, key, _, guard), vector) in summary_claimed.into_iter().zip(results) {
			match vector {
				Some(vector) => {
					summaries.insert(chunk_id, vector.clone());
					self.cache.complete(key, guard, Some((vector, 1.)));
				},
				None => self.cache.complete(key, guard, None),
			}
		}
		for (chunk_id, slot) in summary_waiting {
			if let Some((vector, _)) = slot.lock().await.clone() {
				summaries.insert(chunk_id, vector);
			}
		}

		summaries
	}

	/// Embeds the document's sentences for semantic boundary detection,
	/// cached per sentence so re-processing an unchanged document skips the
	/// provider. Any failure fails the whole set; the caller falls back to
	/// lexical boundaries.
	pub(crate) async fn sentence_vectors(
		&self,
		document: &Document,
		sentences: &[(usize, &str)],
	) -> Result<Vec<Vec<f32>>> {
		let mut vectors: Vec<Option<Vec<f32>>> = vec![None; sentences.len()];
		let mut claimed = Vec::new();
		let mut waiting = Vec::new();

		for (index, &(_, sentence)) in sentences.iter().enumerate() {
			let key = cache_key(document.id, SlotKind::Sentence, sentence);

			match self.cache.claim(key) {
				Claim::Hit((vector, _)) => vectors[index] = Some(vector),
				Claim::Wait(slot) => waiting.push((index, slot)),
				Claim::Work(guard) => claimed.push((index, key, guard)),
			}
		}

		let texts = claimed
			.iter()
			.map(|&(index, ..)| sentences[index].1.to_string())
			.collect::<Vec<_>>();
		let batch_size = self.cfg.embedding.batch_size.max(1) as usize;
		let mut produced = Vec::with_capacity(texts.len());
		let mut failure = None;

		for batch in texts.chunks(batch_size) {
			match self.embed_with_retry(batch).await {
				Ok(mut batch_vectors) => produced.append(&mut batch_vectors),
				Err(err) => {
					failure = Some(err);

					break;
				},
			}
		}

		if let Some(err) = failure {
			for (_, key, guard) in claimed {
				self.cache.complete(key, guard, None);
			}

			return Err(err);
		}

		for ((index, key, guard), vector) in claimed.into_iter().zip(produced) {
			vectors[index] = Some(vector.clone());
			self.cache.complete(key, guard, Some((vector, 1.)));
		}
		for (index, slot) in waiting {
			match slot.lock().await.clone() {
				Some((vector, _)) => vectors[index] = Some(vector),
				None =>
					return Err(Error::Provider {
						message: "Concurrent sentence embedding failed.".to_string(),
					}),
			}
		}

		let mut out = Vec::with_capacity(vectors.len());

		for vector in vectors {
			let Some(vector) = vector else {
				return Err(Error::Provider {
					message: "Sentence embedding incomplete.".to_string(),
				});
			};

			out.push(vector);
		}

		Ok(out)
	}

	/// One provider round trip with bounded retries, exponential backoff and
	/// a per-batch timeout. Checks the count and dimension of every returned
	/// vector; a mismatch is retried like any provider failure.
	pub(crate) async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let cfg = &self.cfg.embedding;
		let attempts = cfg.max_attempts.max(1);
		let mut backoff = RETRY_BASE;
		let mut last_error = None;

		for attempt in 1..=attempts {
			let call = self.providers.embedding.embed(&cfg.provider, texts);
			let outcome = match timeout(Duration::from_millis(cfg.batch_timeout_ms), call).await
			{
				Ok(result) => result,
				Err(_) =>
					Err(Error::Provider { message: "Embedding batch timed out.".to_string() }),
			};

			match outcome
				.and_then(|vectors| check_batch(vectors, texts.len(), cfg.provider.dimensions))
			{
				Ok(vectors) => return Ok(vectors),
				Err(err) => {
					warn!(error = %err, attempt, "Embedding attempt failed.");

					last_error = Some(err);
				},
			}

			if attempt < attempts {
				sleep(backoff).await;

				backoff = backoff.saturating_mul(2).min(RETRY_CAP);
			}
		}

		Err(last_error.unwrap_or_else(|| Error::Provider {
			message: "Embedding provider returned no result.".to_string(),
		}))
	}

	pub(crate) async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
		let texts = [text.to_string()];
		let mut vectors = self.embed_with_retry(&texts).await?;

		vectors.pop().ok_or_else(|| Error::Provider {
			message: "Embedding provider returned no vectors.".to_string(),
		})
	}
}

fn cache_key(chunk_id: Uuid, kind: SlotKind, text: &str) -> CacheKey {
	(chunk_id, kind, *blake3::hash(text.as_bytes()).as_bytes())
}

fn finished_view(chunk_id: Uuid, kind: ViewKind, vector: Vec<f32>, quality: f32) -> EmbeddingView {
	EmbeddingView {
		chunk_id,
		kind,
		vector,
		quality_score: quality,
		generated_at: OffsetDateTime::now_utc(),
	}
}

fn check_batch(vectors: Vec<Vec<f32>>, expected: usize, dimensions: u32) -> Result<Vec<Vec<f32>>> {
	if vectors.len() != expected {
		return Err(Error::Provider {
			message: format!(
				"Embedding count mismatch: {expected} texts, {} vectors.",
				vectors.len()
			),
		});
	}
	if vectors.iter().any(|vector| vector.len() != dimensions as usize) {
		return Err(Error::Provider {
			message: "Embedding vector dimension mismatch.".to_string(),
		});
	}

	Ok(vectors)
}

/// Fresh vectors must carry signal: cosine against the chunk's term summary
/// below the floor, or no cosine at all (zero-norm), rejects the vector.
/// Chunks without a summary pass unvalidated.
fn validate(vector: &[f32], summary: Option<&Vec<f32>>, floor: f32) -> Validation {
	let Some(summary) = summary else {
		return Validation::Accepted(1.);
	};

	match similarity::cosine_similarity(vector, summary) {
		Some(score) if score >= floor => Validation::Accepted(score.clamp(0., 1.)),
		_ => Validation::Rejected,
	}
}

fn view_text(
	document: &Document,
	forest: &ChunkForest,
	chunk: &Chunk,
	kind: ViewKind,
	counter: &TokenCounter,
	cfg: &trellis_config::Embedding,
) -> String {
	match kind {
		ViewKind::Content => chunk.content.clone(),
		ViewKind::Contextual =>
			contextual_text(forest, chunk, counter, cfg.context_window_tokens),
		ViewKind::Hierarchical => hierarchical_text(document, forest, chunk, counter),
		ViewKind::Semantic => semantic_text(chunk, cfg),
	}
}

/// Chunk text widened with nearby sibling text. Each side of the window gets
/// half the budget; the nearest sibling takes half of its side, the next one
/// half of the rest, so closer context dominates. A chunk without preceding
/// siblings borrows the head of its parent instead.
fn contextual_text(
	forest: &ChunkForest,
	chunk: &Chunk,
	counter: &TokenCounter,
	window_tokens: u32,
) -> String {
	let siblings = forest.siblings_of(chunk.id);
	let mut preceding = siblings
		.iter()
		.filter(|sibling| sibling.sequence_order < chunk.sequence_order)
		.collect::<Vec<_>>();
	let mut following = siblings
		.iter()
		.filter(|sibling| sibling.sequence_order > chunk.sequence_order)
		.collect::<Vec<_>>();

	preceding.sort_by(|a, b| b.sequence_order.cmp(&a.sequence_order));
	following.sort_by(|a, b| a.sequence_order.cmp(&b.sequence_order));

	let mut before = Vec::new();
	let mut share = window_tokens / 2;

	if preceding.is_empty() {
		if let Some(parent) = forest.parent_of(chunk.id) {
			let text = counter.head(&parent.content, share);

			if !text.is_empty() {
				before.push(text);
			}
		}
	} else {
		for sibling in preceding {
			if share == 0 {
				break;
			}

			let text = counter.tail(&sibling.content, share);

			if !text.is_empty() {
				before.push(text);
			}

			share /= 2;
		}

		// Collected nearest-first; flip into reading order.
		before.reverse();
	}

	let mut after = Vec::new();
	let mut share = window_tokens / 2;

	for sibling in following {
		if share == 0 {
			break;
		}

		let text = counter.head(&sibling.content, share);

		if !text.is_empty() {
			after.push(text);
		}

		share /= 2;
	}

	let mut parts = before;

	parts.push(chunk.content.clone());
	parts.extend(after);

	parts.join("\n")
}

/// Chunk text prefixed with its ancestor titles, structural-hint headings
/// where the document provides them, otherwise the head of the ancestor's
/// own text.
fn hierarchical_text(
	document: &Document,
	forest: &ChunkForest,
	chunk: &Chunk,
	counter: &TokenCounter,
) -> String {
	let ancestors = &chunk.hierarchy_path[..chunk.hierarchy_path.len().saturating_sub(1)];
	let mut titles = Vec::new();

	for &ancestor_id in ancestors {
		let Some(ancestor) = forest.get(ancestor_id) else {
			continue;
		};
		let title = document
			.heading_in_span(ancestor.start_offset, ancestor.end_offset)
			.map(str::to_string)
			.unwrap_or_else(|| counter.head(&ancestor.content, TITLE_TOKENS));
		let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

		if !title.is_empty() {
			titles.push(title);
		}
	}

	if titles.is_empty() {
		return chunk.content.clone();
	}

	format!("{}\n\n{}", titles.join(" > "), chunk.content)
}

/// Chunk text with its top keywords appended; domain terms are boosted so
/// they out-rank generic vocabulary in the keyword list.
fn semantic_text(chunk: &Chunk, cfg: &trellis_config::Embedding) -> String {
	let keywords = terms::top_terms_boosted(
		&chunk.content,
		KEYWORD_LIMIT,
		&cfg.domain_terms,
		cfg.domain_boost,
	);

	if keywords.is_empty() {
		return chunk.content.clone();
	}

	format!("{}\n\nKeywords: {}", chunk.content, keywords.join(", "))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_chunk(
		document_id: Uuid,
		scale: ChunkScale,
		sequence: u32,
		content: &str,
		span: (usize, usize),
	) -> Chunk {
		let id = Chunk::deterministic_id(document_id, 1, scale, sequence);

		Chunk {
			id,
			document_id,
			document_version: 1,
			scale,
			content: content.to_string(),
			token_count: content.len().div_ceil(4) as u32,
			sequence_order: sequence,
			parent_id: None,
			child_ids: Vec::new(),
			sibling_ids: Vec::new(),
			quality_score: 1.,
			coherence_score: 1.,
			hierarchy_path: vec![id],
			flags: Vec::new(),
			start_offset: span.0,
			end_offset: span.1,
		}
	}

	fn sibling_forest(document_id: Uuid) -> (ChunkForest, Uuid) {
		let root = test_chunk(document_id, ChunkScale::Document, 0, "whole document", (0, 120));
		let a = test_chunk(document_id, ChunkScale::Section, 0, "alpha block of text", (0, 40));
		let b = test_chunk(document_id, ChunkScale::Section, 1, "beta middle of text", (40, 80));
		let c = test_chunk(document_id, ChunkScale::Section, 2, "gamma tail of text", (80, 120));
		let (root_id, a_id, b_id, c_id) = (root.id, a.id, b.id, c.id);
		let mut forest = ChunkForest::new();

		for chunk in [root, a, b, c] {
			forest.insert(chunk).expect("Insert must succeed.");
		}
		for child in [a_id, b_id, c_id] {
			forest.link(root_id, child).expect("Link must succeed.");
		}

		forest.refresh_sibling_ids();

		(forest, b_id)
	}

	#[test]
	fn contextual_text_wraps_the_chunk_with_neighbors() {
		let (forest, middle) = sibling_forest(Uuid::new_v4());
		let chunk = forest.get(middle).expect("Chunk must exist.");
		let text = contextual_text(&forest, chunk, &TokenCounter::Heuristic, 8);

		let core_at = text.find("beta middle of text").expect("Core must be present.");

		assert!(text[..core_at].contains("text"), "preceding tail missing: {text}");
		assert!(text[core_at..].contains("gamma"), "following head missing: {text}");
	}

	#[test]
	fn lonely_chunk_borrows_the_parent_head() {
		let document_id = Uuid::new_v4();
		let root =
			test_chunk(document_id, ChunkScale::Document, 0, "parent opening text", (0, 60));
		let only = test_chunk(document_id, ChunkScale::Section, 0, "single child", (0, 30));
		let (root_id, only_id) = (root.id, only.id);
		let mut forest = ChunkForest::new();

		forest.insert(root).expect("Insert must succeed.");
		forest.insert(only).expect("Insert must succeed.");
		forest.link(root_id, only_id).expect("Link must succeed.");
		forest.refresh_sibling_ids();

		let chunk = forest.get(only_id).expect("Chunk must exist.");
		let text = contextual_text(&forest, chunk, &TokenCounter::Heuristic, 8);

		assert!(text.starts_with("parent"), "parent head missing: {text}");
		assert!(text.ends_with("single child"));
	}

	#[test]
	fn hierarchical_text_prefers_heading_titles() {
		let document_id = Uuid::new_v4();
		let document = Document::new(document_id, 1, "Scheduling\n\nalpha beta gamma.")
			.with_hints(vec![trellis_domain::StructuralHint {
				offset: 0,
				kind: trellis_domain::HintKind::Heading,
				title: Some("Scheduling".to_string()),
			}]);
		let root = test_chunk(document_id, ChunkScale::Document, 0, &document.raw_text, (0, 29));
		let child = test_chunk(document_id, ChunkScale::Section, 0, "alpha beta gamma.", (12, 29));
		let (root_id, child_id) = (root.id, child.id);
		let mut forest = ChunkForest::new();

		forest.insert(root).expect("Insert must succeed.");
		forest.insert(child).expect("Insert must succeed.");
		forest.link(root_id, child_id).expect("Link must succeed.");

		let chunk = forest.get(child_id).expect("Chunk must exist.");
		let text = hierarchical_text(&document, &forest, chunk, &TokenCounter::Heuristic);

		assert!(text.starts_with("Scheduling\n\n"), "title prefix missing: {text}");
		assert!(text.ends_with("alpha beta gamma."));
	}

	#[test]
	fn semantic_text_appends_boosted_keywords() {
		let document_id = Uuid::new_v4();
		let chunk = test_chunk(
			document_id,
			ChunkScale::Paragraph,
			0,
			"cache cache cache scheduler",
			(0, 27),
		);
		let cfg = trellis_config::Embedding {
			domain_terms: vec!["scheduler".to_string()],
			domain_boost: 4.,
			..Default::default()
		};
		let text = semantic_text(&chunk, &cfg);

		let keywords = text.split("Keywords: ").nth(1).expect("Keywords must be present.");

		assert!(keywords.starts_with("scheduler"), "boost must promote the domain term");
	}

	#[test]
	fn validation_rejects_degenerate_vectors() {
		let summary = vec![1., 0., 0.];

		assert!(matches!(validate(&[0., 0., 0.], Some(&summary), 0.3), Validation::Rejected));
		assert!(matches!(validate(&[0., 1., 0.], Some(&summary), 0.3), Validation::Rejected));
		assert!(matches!(
			validate(&[1., 0.1, 0.], Some(&summary), 0.3),
			Validation::Accepted(_)
		));
		assert!(matches!(validate(&[0., 0., 0.], None, 0.3), Validation::Accepted(_)));
	}

	#[tokio::test]
	async fn cache_claims_collapse_concurrent_work() {
		let cache = ViewCache::new(8);
		let key = cache_key(Uuid::new_v4(), SlotKind::View(ViewKind::Content), "text");

		let Claim::Work(guard) = cache.claim(key) else {
			panic!("first claim must win the slot");
		};
		let Claim::Wait(slot) = cache.claim(key) else {
			panic!("second claim must wait");
		};

		cache.complete(key, guard, Some((vec![1., 2.], 0.9)));

		let value = slot.lock().await.clone().expect("Waiter must see the value.");

		assert_eq!(value.0, [1., 2.]);
		assert!(matches!(cache.claim(key), Claim::Hit(_)));
	}

	#[tokio::test]
	async fn failed_work_leaves_waiters_empty_handed() {
		let cache = ViewCache::new(8);
		let key = cache_key(Uuid::new_v4(), SlotKind::Summary, "terms");

		let Claim::Work(guard) = cache.claim(key) else {
			panic!("first claim must win the slot");
		};
		let Claim::Wait(slot) = cache.claim(key) else {
			panic!("second claim must wait");
		};

		cache.complete(key, guard, None);

		assert!(slot.lock().await.is_none());
		assert!(matches!(cache.claim(key), Claim::Work(_)));
	}
}
