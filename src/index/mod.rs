//! Embedding matrix and cosine nearest-neighbor index.
//!
//! The index is brute force over L2-normalised rows: a query is one
//! matrix-vector product followed by a partial sort. It is built once and
//! never mutated; rebuilding means embedding every document again.


use std::cmp::Ordering;

use indicatif::ProgressBar;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::documents::Document;
use crate::llm::{ClientError, Embedder};

pub const DEFAULT_MAX_NEIGHBORS: usize = 5;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("No documents to index")]
    Empty,
    #[error("max_neighbors must be at least 1")]
    InvalidMaxNeighbors,
    #[error("Neighbor queries must request at least one document")]
    ZeroNeighbors,
    #[error("Embedding document {document} failed: {source}")]
    Embedding {
        document: usize,
        #[source]
        source: ClientError,
    },
    #[error("Embedding for document {document} is empty")]
    EmptyVector { document: usize },
    #[error("Embedding for document {document} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        document: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Query vector has {actual} dimensions, index expects {expected}")]
    QueryDimension { expected: usize, actual: usize },
    #[error("Matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Document vectors stacked row-wise; row `i` belongs to document `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Array2<f32>,
}

impl EmbeddingMatrix {
    /// Stack vectors, requiring at least one row and a shared non-zero dimension
    #[inline]
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimension = rows.first().ok_or(IndexError::Empty)?.len();

        for (document, row) in rows.iter().enumerate() {
            if row.is_empty() {
                return Err(IndexError::EmptyVector { document });
            }
            if row.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    document,
                    expected: dimension,
                    actual: row.len(),
                });
            }
        }

        let count = rows.len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((count, dimension), flat)?;

        Ok(Self { data })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.len()).then(|| self.data.row(index))
    }
}

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    /// Cosine distance, `1 - cos(query, document)`, clipped to `[0, 2]`
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct NeighborIndex {
    normalized: Array2<f32>,
    max_neighbors: usize,
}

impl NeighborIndex {
    #[inline]
    pub fn fit(matrix: &EmbeddingMatrix, max_neighbors: usize) -> Result<Self, IndexError> {
        if max_neighbors == 0 {
            return Err(IndexError::InvalidMaxNeighbors);
        }
        if matrix.is_empty() {
            return Err(IndexError::Empty);
        }

        let mut normalized = matrix.data.clone();
        for mut row in normalized.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > f32::EPSILON {
                row.mapv_inplace(|value| value / norm);
            }
        }

        Ok(Self {
            normalized,
            max_neighbors,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.normalized.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.normalized.nrows() == 0
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.normalized.ncols()
    }

    #[inline]
    pub fn max_neighbors(&self) -> usize {
        self.max_neighbors
    }

    /// The `k` closest documents by ascending cosine distance.
    ///
    /// `k` above `max_neighbors` degrades to `max_neighbors`, and above the
    /// document count to the document count. Exact ties keep ascending index order.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension() {
            return Err(IndexError::QueryDimension {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if k == 0 {
            return Err(IndexError::ZeroNeighbors);
        }

        let mut k = k;
        if k > self.max_neighbors {
            warn!(
                "Requested {} neighbors but the index supports {}, using {}",
                k, self.max_neighbors, self.max_neighbors
            );
            k = self.max_neighbors;
        }
        k = k.min(self.len());

        let mut query = Array1::from(query.to_vec());
        let norm = query.dot(&query).sqrt();
        if norm > f32::EPSILON {
            query.mapv_inplace(|value| value / norm);
        }

        let similarities = self.normalized.dot(&query);
        let mut neighbors: Vec<Neighbor> = similarities
            .iter()
            .enumerate()
            .map(|(index, similarity)| Neighbor {
                index,
                distance: (1.0 - similarity).clamp(0.0, 2.0),
            })
            .collect();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, by_distance_then_index);
            neighbors.truncate(k);
        }
        neighbors.sort_by(by_distance_then_index);

        debug!(
            "Nearest {} of {} documents: {:?}",
            neighbors.len(),
            self.len(),
            neighbors.iter().map(|n| n.index).collect::<Vec<_>>()
        );

        Ok(neighbors)
    }
}

fn by_distance_then_index(left: &Neighbor, right: &Neighbor) -> Ordering {
    left.distance
        .total_cmp(&right.distance)
        .then(left.index.cmp(&right.index))
}

/// Everything a query needs: the fitted index, the matrix it came from and the documents
#[derive(Debug, Clone)]
pub struct IndexBundle {
    index: NeighborIndex,
    matrix: EmbeddingMatrix,
    documents: Vec<Document>,
}

impl IndexBundle {
    #[inline]
    pub fn index(&self) -> &NeighborIndex {
        &self.index
    }

    #[inline]
    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    #[inline]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    #[inline]
    pub fn document(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Embeds documents one at a time, in order, and fits the neighbor index.
pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    max_neighbors: usize,
    progress: ProgressBar,
}

impl<'a> IndexBuilder<'a> {
    #[inline]
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            max_neighbors: DEFAULT_MAX_NEIGHBORS,
            progress: ProgressBar::hidden(),
        }
    }

    #[inline]
    pub fn with_max_neighbors(mut self, max_neighbors: usize) -> Self {
        self.max_neighbors = max_neighbors;
        self
    }

    #[inline]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Fails on the first embedding error; nothing is retried or skipped.
    #[inline]
    pub fn build(&self, documents: Vec<Document>) -> Result<IndexBundle, IndexError> {
        if documents.is_empty() {
            return Err(IndexError::Empty);
        }
        if self.max_neighbors == 0 {
            return Err(IndexError::InvalidMaxNeighbors);
        }

        info!("Embedding {} documents", documents.len());
        self.progress.set_length(documents.len() as u64);
        self.progress.set_position(0);

        let vectors = self.embed_all(&documents);
        self.progress.finish_and_clear();
        let vectors = vectors?;

        let matrix = EmbeddingMatrix::from_rows(vectors)?;
        let index = NeighborIndex::fit(&matrix, self.max_neighbors)?;

        info!(
            "Indexed {} documents ({} dimensions, max {} neighbors)",
            matrix.len(),
            matrix.dimension(),
            self.max_neighbors
        );

        Ok(IndexBundle {
            index,
            matrix,
            documents,
        })
    }

    fn embed_all(&self, documents: &[Document]) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut vectors = Vec::with_capacity(documents.len());

        for (document, doc) in documents.iter().enumerate() {
            let vector = self
                .embedder
                .embed(&doc.text)
                .map_err(|source| IndexError::Embedding { document, source })?;
            vectors.push(vector);
            self.progress.inc(1);
        }

        Ok(vectors)
    }
}

/// Embed `documents` and fit an index answering up to `max_neighbors` per query
#[inline]
pub fn build_index(
    documents: Vec<Document>,
    embedder: &dyn Embedder,
    max_neighbors: usize,
) -> Result<IndexBundle, IndexError> {
    IndexBuilder::new(embedder)
        .with_max_neighbors(max_neighbors)
        .build(documents)
}
