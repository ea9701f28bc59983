pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";
/// Payload key holding the JSON-encoded chunk, decoded on fetch.
pub const CHUNK_PAYLOAD_KEY: &str = "chunk_json";

use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		point_id::PointIdOptions,
		value::Kind,
		Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Document, Filter,
		Modifier, PointStruct, Query, QueryPointsBuilder, ScoredPoint, SparseVectorParamsBuilder,
		SparseVectorsConfigBuilder, UpsertPointsBuilder, Value, Vector, VectorParamsBuilder,
		VectorsConfigBuilder,
	},
};
use uuid::Uuid;

use trellis_domain::{Chunk, EmbeddingView, ViewKind};

use crate::{BoxFuture, Error, Result, SearchHit, StoreFilter, VectorStore};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &trellis_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection with one named dense vector per view kind plus a
	/// sparse BM25 vector for term queries. A collection that already exists
	/// is left untouched.
	pub async fn ensure_collection(&self) -> Result<()> {
		let mut vectors_config = VectorsConfigBuilder::default();

		for kind in ViewKind::ALL {
			vectors_config.add_named_vector_params(
				kind.as_str(),
				VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
			);
		}

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(vectors_config)
			.sparse_vectors_config(sparse_vectors_config);

		match self.client.create_collection(builder).await {
			Ok(_) => Ok(()),
			Err(err) if err.to_string().contains("already exists") => Ok(()),
			Err(err) => Err(err.into()),
		}
	}
}
impl VectorStore for QdrantStore {
	fn upsert<'a>(
		&'a self,
		chunks: &'a [Chunk],
		views: &'a [EmbeddingView],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if chunks.is_empty() {
				return Ok(());
			}

			let mut views_by_chunk: HashMap<Uuid, Vec<&EmbeddingView>> = HashMap::new();

			for view in views {
				views_by_chunk.entry(view.chunk_id).or_default().push(view);
			}

			let mut points = Vec::with_capacity(chunks.len());

			for chunk in chunks {
				let encoded = serde_json::to_string(chunk)
					.map_err(|err| Error::InvalidArgument(err.to_string()))?;
				let mut payload = Payload::new();

				payload.insert("chunk_id", chunk.id.to_string());
				payload.insert("document_id", chunk.document_id.to_string());
				payload.insert("document_version", Value::from(chunk.document_version as i64));
				payload.insert("scale", chunk.scale.as_str().to_string());
				payload.insert("sequence_order", Value::from(chunk.sequence_order as i64));
				payload.insert(
					"parent_id",
					chunk
						.parent_id
						.map(|id| Value::from(id.to_string()))
						.unwrap_or(Value::from(Kind::NullValue(0))),
				);
				payload.insert("quality", Value::from(chunk.quality_score as f64));
				payload.insert(CHUNK_PAYLOAD_KEY, encoded);

				let mut vectors = HashMap::new();

				for view in views_by_chunk.get(&chunk.id).into_iter().flatten() {
					vectors
						.insert(view.kind.as_str().to_string(), Vector::from(view.vector.clone()));
				}

				vectors.insert(
					BM25_VECTOR_NAME.to_string(),
					Vector::from(Document::new(chunk.content.clone(), BM25_MODEL)),
				);
				points.push(PointStruct::new(chunk.id.to_string(), vectors, payload));
			}

			self.client
				.upsert_points(UpsertPointsBuilder::new(self.collection.clone(), points).wait(true))
				.await?;

			Ok(())
		})
	}

	fn query_nearest<'a>(
		&'a self,
		kind: ViewKind,
		vector: &'a [f32],
		limit: usize,
		filter: &'a StoreFilter,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move {
			let mut search = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(vector.to_vec()))
				.using(kind.as_str())
				.limit(limit as u64);

			if let Some(filter) = to_filter(filter) {
				search = search.filter(filter);
			}

			let response = self.client.query(search).await?;

			Ok(response.result.iter().filter_map(hit_from_point).collect())
		})
	}

	fn query_terms<'a>(
		&'a self,
		terms: &'a [String],
		limit: usize,
		filter: &'a StoreFilter,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move {
			if terms.is_empty() {
				return Ok(Vec::new());
			}

			let text = terms.join(" ");
			let mut search = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(Document::new(text, BM25_MODEL)))
				.using(BM25_VECTOR_NAME)
				.limit(limit as u64);

			if let Some(filter) = to_filter(filter) {
				search = search.filter(filter);
			}

			let response = self.client.query(search).await?;

			Ok(response.result.iter().filter_map(hit_from_point).collect())
		})
	}

	fn fetch_chunks<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Chunk>>> {
		Box::pin(async move {
			if ids.is_empty() {
				return Ok(Vec::new());
			}

			let ids = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
			let filter = Filter {
				must: vec![Condition::matches("chunk_id", ids.clone())],
				should: Vec::new(),
				must_not: Vec::new(),
				min_should: None,
			};
			let search = QueryPointsBuilder::new(self.collection.clone())
				.filter(filter)
				.with_payload(true)
				.limit(ids.len() as u64);
			let response = self.client.query(search).await?;

			Ok(response.result.iter().filter_map(chunk_from_point).collect())
		})
	}

	fn remove_document<'a>(&'a self, document_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let filter = Filter {
				must: vec![Condition::matches("document_id", document_id.to_string())],
				should: Vec::new(),
				must_not: Vec::new(),
				min_should: None,
			};

			self.client
				.delete_points(
					DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true),
				)
				.await?;

			Ok(())
		})
	}
}

fn to_filter(filter: &StoreFilter) -> Option<Filter> {
	let mut must = Vec::new();

	if let Some(document_id) = filter.document_id {
		must.push(Condition::matches("document_id", document_id.to_string()));
	}
	if !filter.scales.is_empty() {
		let scales =
			filter.scales.iter().map(|scale| scale.as_str().to_string()).collect::<Vec<_>>();

		must.push(Condition::matches("scale", scales));
	}
	if must.is_empty() {
		return None;
	}

	Some(Filter { must, should: Vec::new(), must_not: Vec::new(), min_should: None })
}

fn point_id_to_uuid(point_id: &qdrant_client::qdrant::PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn hit_from_point(point: &ScoredPoint) -> Option<SearchHit> {
	let chunk_id = point.id.as_ref().and_then(point_id_to_uuid)?;

	Some(SearchHit { chunk_id, score: point.score })
}

fn chunk_from_point(point: &ScoredPoint) -> Option<Chunk> {
	let value = point.payload.get(CHUNK_PAYLOAD_KEY)?;
	let Some(Kind::StringValue(raw)) = &value.kind else {
		return None;
	};

	serde_json::from_str(raw).ok()
}
