//! Document processing: boundary detection, chunking, view embedding and
//! storage, plus concurrent batch orchestration with per-document failure
//! isolation.

use std::{sync::Arc, thread::available_parallelism, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use trellis_chunking::{BoundarySource, Chunker, segment_sentences};
use trellis_domain::{ChunkFlag, ChunkForest, Document, EmbeddingView, ViewKind};

use crate::{AbsentView, Result, TrellisService};

/// Outcome of processing one document end to end.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProcessingResult {
	pub document_id: Uuid,
	pub forest: ChunkForest,
	pub views: Vec<EmbeddingView>,
	pub stats: ProcessingStats,
	pub quality: QualityReport,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ProcessingStats {
	pub chunks_generated: u32,
	pub embeddings_generated: u32,
	pub average_quality: f32,
	pub elapsed_ms: u64,
}

/// Quality signals a caller may want to act on; nothing here stops the
/// pipeline.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct QualityReport {
	pub flagged: Vec<FlaggedChunk>,
	pub absent_views: Vec<AbsentView>,
	pub average_coherence: f32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FlaggedChunk {
	pub chunk_id: Uuid,
	pub quality_score: f32,
	pub flags: Vec<ChunkFlag>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BatchFailure {
	pub document_id: Uuid,
	pub error: String,
}

/// Outcome of a batch run. Failures never abort the batch; they sit next to
/// the successful results.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BatchReport {
	pub results: Vec<ProcessingResult>,
	pub failures: Vec<BatchFailure>,
	pub chunks_generated: u32,
	pub embeddings_generated: u32,
	pub average_quality: f32,
}

impl TrellisService {
	/// Processes one document: semantic boundary detection (falling back to
	/// lexical when sentence embedding fails), multi-scale chunking, view
	/// embedding, then replacement of the document's previous version in the
	/// store and the registry.
	pub async fn process(&self, document: &Document) -> Result<ProcessingResult> {
		let started = Instant::now();
		let sentence_vectors = if self.cfg.chunking.semantic_boundaries {
			let sentences = segment_sentences(&document.raw_text);

			if sentences.is_empty() {
				None
			} else {
				match self.sentence_vectors(document, &sentences).await {
					Ok(vectors) => Some(vectors),
					Err(err) => {
						warn!(
							document_id = %document.id,
							error = %err,
							"Sentence embedding failed; using lexical boundaries."
						);

						None
					},
				}
			}
		} else {
			None
		};
		let source = match &sentence_vectors {
			Some(vectors) => BoundarySource::Semantic(vectors),
			None => BoundarySource::Lexical,
		};
		let chunker = Chunker::new(&self.cfg.chunking, &self.counter);
		let forest = chunker.chunk_document(document, source)?;
		let kinds = view_kinds(&self.cfg.embedding.views);
		let (views, report) = self.embed_forest(document, &forest, &kinds).await?;
		let chunks = forest.iter().cloned().collect::<Vec<_>>();

		// Remove-then-upsert replaces the previous version entirely, including
		// chunks whose ids no longer exist after re-chunking.
		self.store.remove_document(document.id).await?;
		self.store.upsert(&chunks, &views).await?;
		self.registry.write().await.insert(document.id, forest.clone());

		let chunks_generated = forest.len() as u32;
		let average_quality = mean(forest.iter().map(|c| c.quality_score));
		let average_coherence = mean(forest.iter().map(|c| c.coherence_score));
		let flagged = forest
			.iter()
			.filter(|chunk| !chunk.flags.is_empty())
			.map(|chunk| FlaggedChunk {
				chunk_id: chunk.id,
				quality_score: chunk.quality_score,
				flags: chunk.flags.clone(),
			})
			.collect();
		let stats = ProcessingStats {
			chunks_generated,
			embeddings_generated: views.len() as u32,
			average_quality,
			elapsed_ms: started.elapsed().as_millis() as u64,
		};

		info!(
			document_id = %document.id,
			chunks = stats.chunks_generated,
			views = stats.embeddings_generated,
			average_quality = stats.average_quality,
			elapsed_ms = stats.elapsed_ms,
			"Processed document."
		);

		Ok(ProcessingResult {
			document_id: document.id,
			forest,
			views,
			stats,
			quality: QualityReport { flagged, absent_views: report.absent, average_coherence },
		})
	}

	/// Processes documents in waves of bounded concurrency. A failing
	/// document is recorded and the batch moves on.
	pub async fn process_batch(self: &Arc<Self>, documents: Vec<Document>) -> BatchReport {
		let concurrency = match self.cfg.pipeline.concurrency {
			0 => available_parallelism().map_or(1, |n| n.get()).min(4),
			n => n as usize,
		};
		let mut report = BatchReport::default();
		let mut queue = documents.into_iter();

		loop {
			let wave = queue.by_ref().take(concurrency).collect::<Vec<_>>();

			if wave.is_empty() {
				break;
			}

			let mut handles = Vec::with_capacity(wave.len());

			for document in wave {
				let service = self.clone();
				let document_id = document.id;

				handles.push((
					document_id,
					tokio::spawn(async move { service.process(&document).await }),
				));
			}

			for (document_id, handle) in handles {
				match handle.await {
					Ok(Ok(result)) => report.results.push(result),
					Ok(Err(err)) => {
						warn!(%document_id, error = %err, "Document failed; batch continues.");
						report
							.failures
							.push(BatchFailure { document_id, error: err.to_string() });
					},
					Err(err) => {
						warn!(%document_id, error = %err, "Worker panicked; batch continues.");
						report
							.failures
							.push(BatchFailure { document_id, error: err.to_string() });
					},
				}
			}
		}

		report.chunks_generated =
			report.results.iter().map(|r| r.stats.chunks_generated).sum();
		report.embeddings_generated =
			report.results.iter().map(|r| r.stats.embeddings_generated).sum();
		report.average_quality = weighted_average_quality(&report.results);

		info!(
			documents = report.results.len(),
			failures = report.failures.len(),
			chunks = report.chunks_generated,
			views = report.embeddings_generated,
			"Processed batch."
		);

		report
	}
}

/// Parses the configured view names, skipping unknown entries with a warning
/// rather than failing ingestion over a typo.
fn view_kinds(names: &[String]) -> Vec<ViewKind> {
	let mut kinds = Vec::new();

	for name in names {
		match ViewKind::parse(name) {
			Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
			Some(_) => {},
			None => warn!(name, "Unknown view kind in configuration; skipping it."),
		}
	}

	kinds
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
	let (sum, count) = values.fold((0., 0_u32), |(sum, count), value| (sum + value, count + 1));

	if count == 0 { 0. } else { sum / count as f32 }
}

/// Batch-wide quality averaged per chunk, not per document, so a large
/// document is not drowned out by a tiny one.
fn weighted_average_quality(results: &[ProcessingResult]) -> f32 {
	let chunks = results.iter().map(|r| r.stats.chunks_generated).sum::<u32>();

	if chunks == 0 {
		return 0.;
	}

	let weighted = results
		.iter()
		.map(|r| r.stats.average_quality * r.stats.chunks_generated as f32)
		.sum::<f32>();

	weighted / chunks as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn view_kinds_skip_unknown_names() {
		let kinds = view_kinds(&[
			"content".to_string(),
			"holographic".to_string(),
			"semantic".to_string(),
			"content".to_string(),
		]);

		assert_eq!(kinds, [ViewKind::Content, ViewKind::Semantic]);
	}

	#[test]
	fn mean_of_nothing_is_zero() {
		assert_eq!(mean(std::iter::empty()), 0.);
		assert_eq!(mean([1., 2., 3.].into_iter()), 2.);
	}
}
