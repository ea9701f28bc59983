use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	Result,
	chunk::{Chunk, ChunkScale},
	error::Error,
	relation::Relationship,
};

/// Arena holding the complete chunk hierarchy of one processed document.
///
/// Chunks live in a flat vector; parent, child and sibling links are stored by
/// id and resolved through an index, so the structure stays serializable and
/// clone-cheap without interior pointers.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChunkForest {
	chunks: Vec<Chunk>,
	#[serde(skip)]
	index: AHashMap<Uuid, usize>,
	relationships: Vec<Relationship>,
}
impl ChunkForest {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	pub fn insert(&mut self, chunk: Chunk) -> Result<()> {
		if self.index.contains_key(&chunk.id) {
			return Err(Error::DuplicateChunk { id: chunk.id });
		}

		self.index.insert(chunk.id, self.chunks.len());
		self.chunks.push(chunk);

		Ok(())
	}

	pub fn get(&self, id: Uuid) -> Option<&Chunk> {
		self.index.get(&id).map(|&i| &self.chunks[i])
	}

	pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Chunk> {
		self.index.get(&id).map(|&i| &mut self.chunks[i])
	}

	pub fn parent_of(&self, id: Uuid) -> Option<&Chunk> {
		self.get(id).and_then(|c| c.parent_id).and_then(|p| self.get(p))
	}

	pub fn children_of(&self, id: Uuid) -> Vec<&Chunk> {
		let Some(chunk) = self.get(id) else {
			return Vec::new();
		};

		chunk.child_ids.iter().filter_map(|&c| self.get(c)).collect()
	}

	pub fn siblings_of(&self, id: Uuid) -> Vec<&Chunk> {
		let Some(chunk) = self.get(id) else {
			return Vec::new();
		};

		chunk.sibling_ids.iter().filter_map(|&s| self.get(s)).collect()
	}

	pub fn roots(&self) -> Vec<&Chunk> {
		self.chunks.iter().filter(|c| c.parent_id.is_none()).collect()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
		self.chunks.iter()
	}

	pub fn at_scale(&self, scale: ChunkScale) -> Vec<&Chunk> {
		self.chunks.iter().filter(|c| c.scale == scale).collect()
	}

	/// Wires `child` under `parent`: sets the parent pointer, appends to the
	/// parent's child list and derives the child's hierarchy path from the
	/// parent's.
	pub fn link(&mut self, parent_id: Uuid, child_id: Uuid) -> Result<()> {
		if parent_id == child_id {
			return Err(Error::InvalidLink {
				parent: parent_id,
				child: child_id,
				message: "a chunk can not be its own parent".into(),
			});
		}

		let Some(&parent_idx) = self.index.get(&parent_id) else {
			return Err(Error::UnknownChunk { id: parent_id });
		};
		let Some(&child_idx) = self.index.get(&child_id) else {
			return Err(Error::UnknownChunk { id: child_id });
		};

		if let Some(existing) = self.chunks[child_idx].parent_id
			&& existing != parent_id
		{
			return Err(Error::InvalidLink {
				parent: parent_id,
				child: child_id,
				message: format!("chunk already linked under {existing}"),
			});
		}

		let mut path = self.chunks[parent_idx].hierarchy_path.clone();

		path.push(child_id);

		let child = &mut self.chunks[child_idx];

		child.parent_id = Some(parent_id);
		child.hierarchy_path = path;

		let parent = &mut self.chunks[parent_idx];

		if !parent.child_ids.contains(&child_id) {
			parent.child_ids.push(child_id);
		}

		Ok(())
	}

	/// Rebuilds every chunk's sibling list as its parent's other children in
	/// sequence order. Roots at the same scale are siblings of each other.
	pub fn refresh_sibling_ids(&mut self) {
		let mut groups = AHashMap::<(Option<Uuid>, ChunkScale), Vec<Uuid>>::new();

		for chunk in &self.chunks {
			groups.entry((chunk.parent_id, chunk.scale)).or_default().push(chunk.id);
		}
		for ids in groups.values_mut() {
			ids.sort_by_key(|id| self.get(*id).map(|c| c.sequence_order).unwrap_or(u32::MAX));
		}
		for ids in groups.into_values() {
			for &id in &ids {
				let siblings = ids.iter().copied().filter(|&s| s != id).collect();

				if let Some(chunk) = self.get_mut(id) {
					chunk.sibling_ids = siblings;
				}
			}
		}
	}

	pub fn add_relationship(&mut self, relationship: Relationship) {
		self.relationships.push(relationship);
	}

	pub fn relationships(&self) -> &[Relationship] {
		&self.relationships
	}

	pub fn relationships_for(&self, id: Uuid) -> Vec<&Relationship> {
		self.relationships
			.iter()
			.filter(|r| r.source_chunk_id == id || r.target_chunk_id == id)
			.collect()
	}

	/// Restores the id index after deserialization.
	pub fn rebuild_index(&mut self) {
		self.index = self.chunks.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
	}

	/// Checks the structural invariants of the hierarchy: parent/child link
	/// symmetry, hierarchy-path consistency, acyclicity, scale adjacency and
	/// document-scale roots.
	pub fn validate(&self) -> Result<()> {
		for chunk in &self.chunks {
			if let Some(parent_id) = chunk.parent_id {
				let Some(parent) = self.get(parent_id) else {
					return Err(Error::UnknownChunk { id: parent_id });
				};

				if !parent.child_ids.contains(&chunk.id) {
					return Err(Error::BrokenInvariant {
						id: chunk.id,
						message: format!("parent {parent_id} does not list this chunk as a child"),
					});
				}
				if chunk.scale.coarser() != Some(parent.scale) {
					return Err(Error::BrokenInvariant {
						id: chunk.id,
						message: format!(
							"scale {} can not nest under {}",
							chunk.scale.as_str(),
							parent.scale.as_str()
						),
					});
				}

				let mut expected = parent.hierarchy_path.clone();

				expected.push(chunk.id);

				if chunk.hierarchy_path != expected {
					return Err(Error::BrokenInvariant {
						id: chunk.id,
						message: "hierarchy path does not extend the parent's path".into(),
					});
				}
			} else {
				if chunk.scale != ChunkScale::Document {
					return Err(Error::BrokenInvariant {
						id: chunk.id,
						message: format!("root chunk has scale {}", chunk.scale.as_str()),
					});
				}
				if chunk.hierarchy_path != [chunk.id] {
					return Err(Error::BrokenInvariant {
						id: chunk.id,
						message: "root hierarchy path must contain only the chunk itself".into(),
					});
				}
			}
			if chunk.hierarchy_path.last() != Some(&chunk.id) {
				return Err(Error::BrokenInvariant {
					id: chunk.id,
					message: "hierarchy path must end at the chunk itself".into(),
				});
			}
			for &child_id in &chunk.child_ids {
				let Some(child) = self.get(child_id) else {
					return Err(Error::UnknownChunk { id: child_id });
				};

				if child.parent_id != Some(chunk.id) {
					return Err(Error::BrokenInvariant {
						id: chunk.id,
						message: format!("child {child_id} does not point back to this chunk"),
					});
				}
			}

			// Walk the parent chain; it is bounded by the chunk count, so a
			// longer walk means a cycle.
			let mut hops = 0;
			let mut cursor = chunk.parent_id;

			while let Some(id) = cursor {
				hops += 1;

				if hops > self.chunks.len() {
					return Err(Error::CycleDetected { id: chunk.id });
				}

				cursor = self.get(id).and_then(|c| c.parent_id);
			}
		}

		Ok(())
	}
}
