//! Query-time retrieval: strategy selection, hierarchical and semantic
//! expansion, multi-hop refinement and diversity-aware final ranking.

use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use trellis_domain::{Chunk, ChunkScale, ViewKind, terms};
use trellis_storage::{SearchHit, StoreFilter};

use crate::{Error, Result, TrellisService};

/// Keywords drawn from a chunk when probing the store for related content.
const RELATED_TERM_LIMIT: usize = 8;
/// Weakest forest relationship still followed during expansion.
const RELATED_STRENGTH_FLOOR: f32 = 0.5;
/// Relevance carried over to structurally expanded neighbors.
const HIERARCHICAL_DISCOUNT: f32 = 0.8;
/// Relevance carried over to semantically related chunks.
const SEMANTIC_DISCOUNT: f32 = 0.7;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
	/// Dense nearest-neighbor search over content views.
	VectorOnly,
	/// Dense search fused with sparse term matching, for queries that name
	/// exact identifiers or quoted phrases.
	Hybrid,
	/// Section and paragraph scales searched side by side, for structural and
	/// comparative questions.
	MultiScale,
	/// Conversation-aware search over contextual views.
	Contextual,
}
impl Strategy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::VectorOnly => "vector_only",
			Self::Hybrid => "hybrid",
			Self::MultiScale => "multi_scale",
			Self::Contextual => "contextual",
		}
	}
}

/// How an expanded result entered the set; base results carry none.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionSource {
	/// Parent or sibling of a base result.
	Hierarchical,
	/// Cross-reference or shared-vocabulary neighbor of a base result.
	Semantic,
}

/// Conversational surroundings of a query.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct QueryContext {
	/// Most recent conversation turns, oldest first.
	pub recent_turns: Vec<String>,
	/// Restricts retrieval to one document when set.
	pub document_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default)]
pub struct RetrievalOptions {
	/// Overrides automatic strategy selection.
	pub strategy: Option<Strategy>,
	/// Checked between hops; a raised flag returns the results gathered so
	/// far instead of starting another hop.
	pub cancellation: Option<Arc<AtomicBool>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RetrievalCandidate {
	pub chunk: Chunk,
	pub similarity_score: f32,
	pub strategy_used: Strategy,
	pub expansion_source: Option<ExpansionSource>,
	/// Relevance rank (1-based) before any ends-inward reordering.
	pub final_rank: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RetrievalResponse {
	pub results: Vec<RetrievalCandidate>,
	pub strategy: Strategy,
	/// Retrieval passes executed, the base pass included.
	pub hops: u32,
	/// Mean similarity of the top results, in `[0, 1]`.
	pub confidence: f32,
	/// Set when nothing above the quality floor matched; an empty result is
	/// an answer, not an error.
	pub no_qualifying_context: bool,
}

impl TrellisService {
	/// Runs a query end to end: strategy selection, base search, expansion,
	/// optional extra hops, then diversity-aware ranking of the final list.
	pub async fn retrieve(
		&self,
		query: &str,
		context: &QueryContext,
		options: &RetrievalOptions,
	) -> Result<RetrievalResponse> {
		if query.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "Query must not be empty.".to_string(),
			});
		}

		let strategy = options.strategy.unwrap_or_else(|| select_strategy(query, context));
		let hits = self.strategy_hits(query, strategy, context).await?;
		let mut candidates = self.qualify(&hits, strategy).await?;

		if self.cfg.retrieval.expansion.enabled && !candidates.is_empty() {
			let expanded = self.expand(&candidates, context).await?;

			candidates.extend(expanded);
		}

		sort_by_relevance(&mut candidates);

		let multi = &self.cfg.retrieval.multi_hop;
		let query_terms = terms::term_set(query);
		let mut hops = 1;

		while multi.enabled && hops < multi.max_hops {
			if options.cancellation.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
				debug!("Retrieval cancelled between hops; returning partial results.");

				break;
			}
			if confidence_of(&candidates) >= multi.confidence_floor
				&& !implies_multiple_facts(query)
			{
				break;
			}

			let covered = covered_terms(&candidates);
			let mut uncovered =
				query_terms.difference(&covered).map(String::as_str).collect::<Vec<_>>();

			if uncovered.is_empty() {
				break;
			}

			uncovered.sort_unstable();

			// The hop chases only what the results so far do not mention.
			let hop_query = uncovered.join(" ");
			let hop_context = QueryContext {
				recent_turns: Vec::new(),
				document_id: context.document_id,
			};
			let hop_hits = match self.strategy_hits(&hop_query, strategy, &hop_context).await {
				Ok(hop_hits) => hop_hits,
				Err(err) => {
					warn!(error = %err, "Hop query failed; keeping the results gathered so far.");

					break;
				},
			};
			let seen = candidates.iter().map(|c| c.chunk.id).collect::<AHashSet<_>>();
			let fresh = hop_hits
				.into_iter()
				.filter(|hit| !seen.contains(&hit.chunk_id))
				.collect::<Vec<_>>();

			if fresh.is_empty() {
				break;
			}

			let additions = self.qualify(&fresh, strategy).await?;

			if additions.is_empty() {
				break;
			}

			candidates.extend(additions);
			sort_by_relevance(&mut candidates);

			hops += 1;
		}

		let confidence = confidence_of(&candidates);

		if candidates.is_empty() {
			debug!(strategy = strategy.as_str(), "No qualifying context for the query.");

			return Ok(RetrievalResponse {
				results: Vec::new(),
				strategy,
				hops,
				confidence: 0.,
				no_qualifying_context: true,
			});
		}

		let mut selected = diversify(candidates, &self.cfg.retrieval.diversity);

		sort_by_relevance(&mut selected);

		for (index, candidate) in selected.iter_mut().enumerate() {
			candidate.final_rank = index as u32 + 1;
		}

		let results = if self.cfg.retrieval.reorder {
			reorder_ends_inward(selected)
		} else {
			selected
		};

		debug!(
			strategy = strategy.as_str(),
			hops,
			confidence,
			results = results.len(),
			"Retrieval finished."
		);

		Ok(RetrievalResponse { results, strategy, hops, confidence, no_qualifying_context: false })
	}

	async fn strategy_hits(
		&self,
		query: &str,
		strategy: Strategy,
		context: &QueryContext,
	) -> Result<Vec<SearchHit>> {
		let limit = self.cfg.retrieval.top_n as usize;
		let filter = scoped(context, vec![ChunkScale::Paragraph]);

		match strategy {
			Strategy::VectorOnly => {
				let vector = self.embed_query(query).await?;

				self.store
					.query_nearest(ViewKind::Content, &vector, limit, &filter)
					.await
					.map_err(Error::from)
			},
			Strategy::Hybrid => {
				let vector = self.embed_query(query).await?;
				let nearest =
					self.store.query_nearest(ViewKind::Content, &vector, limit, &filter).await?;
				let mut query_terms =
					terms::term_set(query).into_iter().collect::<Vec<_>>();

				query_terms.sort_unstable();

				let lexical = if query_terms.is_empty() {
					Vec::new()
				} else {
					self.store.query_terms(&query_terms, limit, &filter).await?
				};

				Ok(fuse_ranked(&[nearest, lexical], limit))
			},
			Strategy::MultiScale => {
				let vector = self.embed_query(query).await?;
				let section_filter = scoped(context, vec![ChunkScale::Section]);
				let sections = self
					.store
					.query_nearest(ViewKind::Content, &vector, limit, &section_filter)
					.await?;
				let paragraphs =
					self.store.query_nearest(ViewKind::Content, &vector, limit, &filter).await?;

				Ok(merge_best(sections, paragraphs, limit))
			},
			Strategy::Contextual => {
				let augmented = augment_query(query, context);
				let vector = self.embed_query(&augmented).await?;

				self.store
					.query_nearest(ViewKind::Contextual, &vector, limit, &filter)
					.await
					.map_err(Error::from)
			},
		}
	}

	/// Materializes hits into candidates, dropping chunks below the quality
	/// floor. Hit order is preserved.
	async fn qualify(
		&self,
		hits: &[SearchHit],
		strategy: Strategy,
	) -> Result<Vec<RetrievalCandidate>> {
		let ids = hits.iter().map(|hit| hit.chunk_id).collect::<Vec<_>>();
		let chunks = self.store.fetch_chunks(&ids).await?;
		let by_id = chunks.into_iter().map(|c| (c.id, c)).collect::<AHashMap<_, _>>();
		let floor = self.cfg.retrieval.quality_floor;
		let candidates = hits
			.iter()
			.filter_map(|hit| {
				by_id.get(&hit.chunk_id).filter(|chunk| chunk.quality_score >= floor).map(
					|chunk| RetrievalCandidate {
						chunk: chunk.clone(),
						similarity_score: hit.score,
						strategy_used: strategy,
						expansion_source: None,
						final_rank: 0,
					},
				)
			})
			.collect();

		Ok(candidates)
	}

	/// Widens base results with their parents, nearest siblings and related
	/// chunks, at a relevance discount so expansion never outranks the result
	/// that earned it.
	async fn expand(
		&self,
		base: &[RetrievalCandidate],
		context: &QueryContext,
	) -> Result<Vec<RetrievalCandidate>> {
		let cfg = &self.cfg.retrieval.expansion;
		let mut seen = base.iter().map(|c| c.chunk.id).collect::<AHashSet<_>>();
		let mut wanted = AHashMap::new();
		// Sibling choices need sequence orders, which only the fetched chunks
		// carry; remember each anchor until after the fetch.
		let mut sibling_anchors = Vec::new();
		let registry = self.registry.read().await;

		for candidate in base {
			let chunk = &candidate.chunk;
			let inherited = candidate.similarity_score * HIERARCHICAL_DISCOUNT;

			if let Some(parent_id) = chunk.parent_id
				&& !seen.contains(&parent_id)
			{
				claim(
					&mut wanted,
					parent_id,
					(inherited, ExpansionSource::Hierarchical, candidate.strategy_used),
				);
			}
			if !chunk.sibling_ids.is_empty() {
				sibling_anchors.push((
					chunk.sequence_order,
					chunk.sibling_ids.clone(),
					inherited,
					candidate.strategy_used,
				));
			}

			let related_score = candidate.similarity_score * SEMANTIC_DISCOUNT;

			if registry.forest(chunk.document_id).is_some() {
				for (related_id, strength) in
					registry.related_ids(chunk.document_id, chunk.id)
				{
					if strength < RELATED_STRENGTH_FLOOR {
						break;
					}
					if !seen.contains(&related_id) {
						claim(
							&mut wanted,
							related_id,
							(related_score, ExpansionSource::Semantic, candidate.strategy_used),
						);
					}
				}
			} else {
				// Cold store: probe by the chunk's own vocabulary instead.
				let probe = terms::top_terms(&chunk.content, RELATED_TERM_LIMIT);

				if probe.is_empty() {
					continue;
				}

				let filter = StoreFilter {
					document_id: context.document_id,
					scales: vec![chunk.scale],
				};
				let hits = self
					.store
					.query_terms(&probe, cfg.max_related as usize + 1, &filter)
					.await?;

				for hit in hits {
					if !seen.contains(&hit.chunk_id) {
						claim(
							&mut wanted,
							hit.chunk_id,
							(related_score, ExpansionSource::Semantic, candidate.strategy_used),
						);
					}
				}
			}
		}

		drop(registry);

		// One batched fetch covers parents, siblings and related chunks.
		let mut ids = wanted.keys().copied().collect::<Vec<_>>();

		for (_, sibling_ids, ..) in &sibling_anchors {
			ids.extend(sibling_ids.iter().copied());
		}

		ids.sort_unstable();
		ids.dedup();

		let fetched = self
			.store
			.fetch_chunks(&ids)
			.await?
			.into_iter()
			.map(|c| (c.id, c))
			.collect::<AHashMap<_, _>>();

		for (anchor_order, sibling_ids, score, strategy) in sibling_anchors {
			let mut siblings = sibling_ids
				.iter()
				.filter_map(|id| fetched.get(id))
				.map(|sibling| (sibling.sequence_order.abs_diff(anchor_order), sibling.id))
				.collect::<Vec<_>>();

			siblings.sort_unstable();

			for &(_, sibling_id) in siblings.iter().take(cfg.sibling_limit as usize) {
				if !seen.contains(&sibling_id) {
					claim(
						&mut wanted,
						sibling_id,
						(score, ExpansionSource::Hierarchical, strategy),
					);
				}
			}
		}

		let floor = self.cfg.retrieval.quality_floor;
		let mut expanded = wanted
			.into_iter()
			.filter_map(|(id, (score, source, strategy))| {
				let chunk = fetched.get(&id)?;

				if chunk.quality_score < floor || !seen.insert(id) {
					return None;
				}

				Some(RetrievalCandidate {
					chunk: chunk.clone(),
					similarity_score: score,
					strategy_used: strategy,
					expansion_source: Some(source),
					final_rank: 0,
				})
			})
			.collect::<Vec<_>>();

		sort_by_relevance(&mut expanded);

		Ok(expanded)
	}
}

/// Inherited score, source and originating strategy of an expansion target.
type Prospect = (f32, ExpansionSource, Strategy);

/// Records an expansion target; when several anchors claim the same chunk,
/// the best inherited score wins.
fn claim(wanted: &mut AHashMap<Uuid, Prospect>, id: Uuid, prospect: Prospect) {
	wanted
		.entry(id)
		.and_modify(|entry| {
			if prospect.0 > entry.0 {
				*entry = prospect;
			}
		})
		.or_insert(prospect);
}

/// Picks the retrieval strategy from the query's shape and surroundings.
/// Exact-term markers outweigh everything else; conversation context beats
/// structural phrasing; an ambiguous query falls back to hybrid.
pub fn select_strategy(query: &str, context: &QueryContext) -> Strategy {
	if has_exact_markers(query) {
		return Strategy::Hybrid;
	}
	if !context.recent_turns.is_empty() {
		return Strategy::Contextual;
	}
	if is_structural(query) {
		return Strategy::MultiScale;
	}
	if is_simple_factual(query) {
		return Strategy::VectorOnly;
	}

	Strategy::Hybrid
}

fn has_exact_markers(query: &str) -> bool {
	if query.matches('"').count() >= 2 || query.matches('`').count() >= 2 {
		return true;
	}

	query
		.split_whitespace()
		.any(|word| word.contains("::") || word.ends_with("()") || word.contains('_'))
}

const STRUCTURAL_MARKERS: &[&str] = &[
	"architecture", "compare", "comparison", "difference", "differences", "overall", "overview",
	"relate", "relates", "relationship", "structure", "summarize", "summary", "versus", "vs",
];

fn is_structural(query: &str) -> bool {
	terms::normalize_terms(query).iter().any(|term| STRUCTURAL_MARKERS.contains(&term.as_str()))
}

const INTERROGATIVES: &[&str] = &[
	"are", "can", "did", "does", "how", "is", "what", "when", "where", "which", "who", "whose",
	"why",
];

fn is_simple_factual(query: &str) -> bool {
	let mut words = query.split_whitespace();
	let Some(first) = words.next() else {
		return false;
	};

	INTERROGATIVES.contains(&first.to_lowercase().as_str()) && words.count() < 12
}

/// A query asking several things at once keeps hopping even when the first
/// results look confident.
fn implies_multiple_facts(query: &str) -> bool {
	query.matches('?').count() >= 2 || query.to_lowercase().split(" and ").count() > 2
}

fn augment_query(query: &str, context: &QueryContext) -> String {
	let turns = context.recent_turns.iter().rev().take(2).rev();
	let mut parts = turns.map(String::as_str).collect::<Vec<_>>();

	parts.push(query);

	parts.join("\n")
}

fn scoped(context: &QueryContext, scales: Vec<ChunkScale>) -> StoreFilter {
	StoreFilter { document_id: context.document_id, scales }
}

/// Reciprocal-rank style fusion: each list contributes `1 - rank/len` per
/// hit, and the sum is normalized by the number of contributing lists so the
/// fused score stays in `[0, 1]`.
fn fuse_ranked(lists: &[Vec<SearchHit>], limit: usize) -> Vec<SearchHit> {
	let active = lists.iter().filter(|list| !list.is_empty()).count().max(1) as f32;
	let mut fused = AHashMap::new();

	for list in lists {
		let len = list.len() as f32;

		for (rank, hit) in list.iter().enumerate() {
			*fused.entry(hit.chunk_id).or_insert(0.) += 1. - rank as f32 / len;
		}
	}

	let mut hits = fused
		.into_iter()
		.map(|(chunk_id, score)| SearchHit { chunk_id, score: score / active })
		.collect::<Vec<_>>();

	sort_hits(&mut hits);
	hits.truncate(limit);

	hits
}

/// Merges two hit lists keeping each chunk's best score.
fn merge_best(a: Vec<SearchHit>, b: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
	let mut best = AHashMap::new();

	for hit in a.into_iter().chain(b) {
		let entry = best.entry(hit.chunk_id).or_insert(hit.score);

		if hit.score > *entry {
			*entry = hit.score;
		}
	}

	let mut hits = best
		.into_iter()
		.map(|(chunk_id, score)| SearchHit { chunk_id, score })
		.collect::<Vec<_>>();

	sort_hits(&mut hits);
	hits.truncate(limit);

	hits
}

fn sort_hits(hits: &mut [SearchHit]) {
	hits.sort_by(|a, b| {
		b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id))
	});
}

fn sort_by_relevance(candidates: &mut [RetrievalCandidate]) {
	candidates.sort_by(|a, b| {
		b.similarity_score
			.total_cmp(&a.similarity_score)
			.then_with(|| a.chunk.id.cmp(&b.chunk.id))
	});
}

/// Mean similarity of the top three results; empty results have none.
fn confidence_of(candidates: &[RetrievalCandidate]) -> f32 {
	let top = candidates.len().min(3);

	if top == 0 {
		return 0.;
	}

	let sum = candidates[..top].iter().map(|c| c.similarity_score).sum::<f32>();

	(sum / top as f32).clamp(0., 1.)
}

fn covered_terms(candidates: &[RetrievalCandidate]) -> AHashSet<String> {
	let mut covered = AHashSet::new();

	for candidate in candidates {
		covered.extend(terms::term_set(&candidate.chunk.content));
	}

	covered
}

/// Greedy maximal-marginal-relevance selection over relevance-sorted
/// candidates. A candidate whose term overlap with an already selected one
/// exceeds the duplication ceiling is discarded outright; each discard spends
/// one unit of the skip budget, and an exhausted budget ends selection with
/// what has been picked so far.
fn diversify(
	candidates: Vec<RetrievalCandidate>,
	cfg: &trellis_config::Diversity,
) -> Vec<RetrievalCandidate> {
	let final_k = cfg.final_k as usize;
	let mut pool = candidates
		.into_iter()
		.map(|candidate| {
			let terms = terms::term_set(&candidate.chunk.content);

			(candidate, terms)
		})
		.collect::<Vec<_>>();
	let mut selected = Vec::new();
	let mut selected_terms: Vec<AHashSet<String>> = Vec::new();
	let mut skips = 0;

	'selection: while selected.len() < final_k && !pool.is_empty() {
		let mut best: Option<(usize, f32)> = None;
		let mut index = 0;

		while index < pool.len() {
			let max_overlap = selected_terms
				.iter()
				.map(|terms| terms::jaccard(terms, &pool[index].1))
				.fold(0_f32, f32::max);

			if max_overlap > cfg.duplication_ceiling {
				if skips >= cfg.max_skips {
					break 'selection;
				}

				skips += 1;
				// Near-duplicates never come back; removal keeps any earlier
				// best index valid because it lies before this position.
				pool.remove(index);

				continue;
			}

			let score = pool[index].0.similarity_score - cfg.mmr_lambda * max_overlap;

			if best.is_none_or(|(_, best_score)| score > best_score) {
				best = Some((index, score));
			}

			index += 1;
		}

		let Some((index, _)) = best else {
			break;
		};
		let (candidate, terms) = pool.remove(index);

		selected.push(candidate);
		selected_terms.push(terms);
	}

	selected
}

/// Places the ranked list so the strongest results sit at both ends and the
/// weakest in the middle, where long-context consumers attend least.
fn reorder_ends_inward<T>(ranked: Vec<T>) -> Vec<T> {
	let mut front = Vec::with_capacity(ranked.len());
	let mut back = Vec::new();

	for (index, item) in ranked.into_iter().enumerate() {
		if index % 2 == 0 {
			front.push(item);
		} else {
			back.push(item);
		}
	}

	back.reverse();
	front.extend(back);

	front
}

#[cfg(test)]
mod tests {
	use super::*;

	use trellis_domain::ChunkScale;

	fn candidate(content: &str, score: f32) -> RetrievalCandidate {
		let document_id = Uuid::new_v4();
		let id = Uuid::new_v4();

		RetrievalCandidate {
			chunk: Chunk {
				id,
				document_id,
				document_version: 1,
				scale: ChunkScale::Paragraph,
				content: content.to_string(),
				token_count: content.len().div_ceil(4) as u32,
				sequence_order: 0,
				parent_id: None,
				child_ids: Vec::new(),
				sibling_ids: Vec::new(),
				quality_score: 1.,
				coherence_score: 1.,
				hierarchy_path: vec![id],
				flags: Vec::new(),
				start_offset: 0,
				end_offset: content.len(),
			},
			similarity_score: score,
			strategy_used: Strategy::VectorOnly,
			expansion_source: None,
			final_rank: 0,
		}
	}

	#[test]
	fn exact_markers_pick_hybrid() {
		let context = QueryContext::default();

		assert_eq!(select_strategy("what does \"commit quorum\" mean", &context), Strategy::Hybrid);
		assert_eq!(select_strategy("find flush_buffers usage", &context), Strategy::Hybrid);
		assert_eq!(select_strategy("where is Store::upsert defined", &context), Strategy::Hybrid);
	}

	#[test]
	fn conversation_context_picks_contextual() {
		let context = QueryContext {
			recent_turns: vec!["we were discussing the scheduler".to_string()],
			document_id: None,
		};

		assert_eq!(select_strategy("and how does it recover", &context), Strategy::Contextual);
	}

	#[test]
	fn structural_queries_pick_multi_scale() {
		let context = QueryContext::default();

		assert_eq!(
			select_strategy("compare the reclaim path with the flush path", &context),
			Strategy::MultiScale
		);
		assert_eq!(
			select_strategy("give an overview of the storage layer", &context),
			Strategy::MultiScale
		);
	}

	#[test]
	fn short_factual_queries_pick_vector_only() {
		let context = QueryContext::default();

		assert_eq!(
			select_strategy("what triggers a checkpoint", &context),
			Strategy::VectorOnly
		);
	}

	#[test]
	fn ambiguous_queries_fall_back_to_hybrid() {
		let context = QueryContext::default();
		let query = "tell me about everything involved in making writes durable across failures \
		             of individual nodes in a deployment";

		assert_eq!(select_strategy(query, &context), Strategy::Hybrid);
	}

	#[test]
	fn multiple_facts_are_detected() {
		assert!(implies_multiple_facts("what is a lease? and who renews it?"));
		assert!(implies_multiple_facts("leases and quorums and failover paths"));
		assert!(!implies_multiple_facts("what is a lease and who renews it"));
	}

	#[test]
	fn fused_ranks_reward_presence_in_both_lists() {
		let shared = Uuid::new_v4();
		let dense_only = Uuid::new_v4();
		let sparse_only = Uuid::new_v4();
		let dense = vec![
			SearchHit { chunk_id: dense_only, score: 0.9 },
			SearchHit { chunk_id: shared, score: 0.8 },
		];
		let sparse = vec![
			SearchHit { chunk_id: shared, score: 1. },
			SearchHit { chunk_id: sparse_only, score: 0.5 },
		];
		let fused = fuse_ranked(&[dense, sparse], 10);

		assert_eq!(fused[0].chunk_id, shared);
		assert!(fused[0].score > fused[1].score);
		assert_eq!(fused.len(), 3);
	}

	#[test]
	fn reorder_places_strong_results_at_both_ends() {
		assert_eq!(reorder_ends_inward(vec![9, 8, 7, 6, 5]), [9, 7, 5, 6, 8]);
		assert_eq!(reorder_ends_inward(vec![3, 2, 1]), [3, 1, 2]);
		assert_eq!(reorder_ends_inward(vec![1]), [1]);
		assert_eq!(reorder_ends_inward(Vec::<u32>::new()), [0u32; 0]);
	}

	#[test]
	fn diversification_discards_near_duplicates() {
		let cfg = trellis_config::Diversity::default();
		let picked = diversify(
			vec![
				candidate("the write path flushes dirty pages to disk", 0.95),
				candidate("the write path flushes dirty pages to disk", 0.94),
				candidate("reads hit the row cache before the sstable", 0.5),
			],
			&cfg,
		);

		assert_eq!(picked.len(), 2);
		assert!((picked[0].similarity_score - 0.95).abs() < 1e-6);
		assert!((picked[1].similarity_score - 0.5).abs() < 1e-6);
	}

	#[test]
	fn exhausted_skip_budget_ends_selection() {
		let cfg = trellis_config::Diversity {
			max_skips: 1,
			..Default::default()
		};
		let picked = diversify(
			vec![
				candidate("alpha beta gamma delta", 0.9),
				candidate("alpha beta gamma delta", 0.8),
				candidate("alpha beta gamma delta", 0.7),
				candidate("unrelated vocabulary entirely", 0.1),
			],
			&cfg,
		);

		// One duplicate is skipped, the second exhausts the budget before the
		// distinct candidate is reached.
		assert_eq!(picked.len(), 1);
	}

	#[test]
	fn confidence_averages_the_top_three() {
		let candidates = vec![
			candidate("one", 0.9),
			candidate("two", 0.6),
			candidate("three", 0.3),
			candidate("four", 0.),
		];

		assert!((confidence_of(&candidates) - 0.6).abs() < 1e-6);
		assert_eq!(confidence_of(&[]), 0.);
	}
}
