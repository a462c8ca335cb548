//! Partitional k-means clustering for dense floating-point data.
//!
//! The crate pairs a vectorized all-pairs squared-distance kernel with a
//! clustering engine that owns the round-by-round centroid and cluster
//! state, plus file loaders and synthetic data generators for wiring up
//! end-to-end runs from the CLI entry-point.

use csv::ReaderBuilder;
use ndarray::{Array2, ArrayView2, Axis};
use ndarray_rand::rand_distr::{Distribution, Normal, Uniform};
use ndarray_rand::RandomExt;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Dense data representation used across the crate (rows = points, columns = features).
pub type DataMatrix = Array2<f64>;

/// Error type used by operations in this crate.
#[derive(Debug, Error)]
pub enum KMeansError {
    #[error("dimension mismatch: left operand has {left} columns, right operand has {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("insufficient points: k = {k} exceeds dataset size {n}")]
    InsufficientPoints { k: usize, n: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    ParseFloat(#[from] std::num::ParseFloatError),
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

/// Convenient alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, KMeansError>;

/// Configurable knobs for a clustering run, fixed for the engine's lifetime.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineConfig {
    /// Number of clusters to maintain.
    pub k: usize,
    /// Number of assign/recompute rounds a run executes, always in full.
    pub n_iter: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { k: 3, n_iter: 10 }
    }
}

impl EngineConfig {
    /// Validate configuration parameters against a specific dataset.
    pub fn validate(&self, points: &DataMatrix) -> Result<()> {
        if self.k == 0 {
            return Err(KMeansError::InvalidConfig(
                "k must be greater than zero".into(),
            ));
        }
        if points.ncols() == 0 {
            return Err(KMeansError::InvalidData(
                "dataset must have at least one feature column".into(),
            ));
        }
        if points.nrows() < self.k {
            return Err(KMeansError::InsufficientPoints {
                k: self.k,
                n: points.nrows(),
            });
        }
        Ok(())
    }
}

/// Compute the all-pairs squared Euclidean distance matrix between two vector sets.
///
/// For `a` of shape N×D and `b` of shape M×D the result has shape N×M, with
/// entry (i, j) equal to `‖a_i − b_j‖²`. The computation expands the square as
/// `‖a‖² − 2·a·b + ‖b‖²` so the bulk of the work is a single matrix product
/// rather than a nested point loop. Floating-point cancellation can leave tiny
/// negative values near zero; they are returned as-is.
pub fn pairwise_squared_distances(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Result<Array2<f64>> {
    if a.ncols() != b.ncols() {
        return Err(KMeansError::DimensionMismatch {
            left: a.ncols(),
            right: b.ncols(),
        });
    }

    let a_norms = a.mapv(|v| v * v).sum_axis(Axis(1)).insert_axis(Axis(1));
    let b_norms = b.mapv(|v| v * v).sum_axis(Axis(1)).insert_axis(Axis(0));

    let mut dists = a.dot(&b.t());
    dists *= -2.0;
    dists += &a_norms;
    dists += &b_norms;
    Ok(dists)
}

/// Index of the nearest centroid for every row of a point×centroid distance matrix.
///
/// Ties resolve to the lowest column index.
fn nearest_centroid_indices(dists: &Array2<f64>) -> Vec<usize> {
    dists
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0usize;
            let mut best_dist = row[0];
            for (idx, &dist) in row.iter().enumerate().skip(1) {
                if dist < best_dist {
                    best_dist = dist;
                    best = idx;
                }
            }
            best
        })
        .collect()
}

/// K-means clustering engine over a borrowed, immutable point set.
///
/// Construction seeds the centroid map by sampling `k` distinct points
/// uniformly at random without replacement; [`KMeansEngine::run`] then
/// executes exactly `n_iter` rounds, each reassigning every point to its
/// nearest centroid and recomputing each centroid as the mean of its
/// members. Both maps are replaced wholesale every round, so the accessors
/// always observe a complete, consistent snapshot.
#[derive(Debug)]
pub struct KMeansEngine<'a> {
    points: &'a DataMatrix,
    config: EngineConfig,
    centroids: DataMatrix,
    clusters: Vec<DataMatrix>,
}

impl<'a> KMeansEngine<'a> {
    /// Create an engine over `points`, seeding initial centroids from `rng`.
    ///
    /// Cluster index `i` starts at the point picked by the i-th drawn index;
    /// every cluster starts empty. Fails with
    /// [`KMeansError::InsufficientPoints`] when `k` exceeds the number of
    /// points, leaving no partially initialised state behind.
    pub fn new<R: Rng + ?Sized>(
        points: &'a DataMatrix,
        config: EngineConfig,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate(points)?;

        let seeds = sample(rng, points.nrows(), config.k).into_vec();
        let centroids = points.select(Axis(0), &seeds);
        let clusters = (0..config.k)
            .map(|_| DataMatrix::zeros((0, points.ncols())))
            .collect();

        tracing::debug!(
            k = config.k,
            rows = points.nrows(),
            dim = points.ncols(),
            "seeded initial centroids"
        );

        Ok(Self {
            points,
            config,
            centroids,
            clusters,
        })
    }

    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.config.k
    }

    /// Iteration budget a full run executes.
    pub fn n_iter(&self) -> usize {
        self.config.n_iter
    }

    /// Current centroid map: row `i` is the representative of cluster `i`.
    pub fn centroids(&self) -> &DataMatrix {
        &self.centroids
    }

    /// Current cluster map: entry `i` holds the member points of cluster `i`
    /// in dataset order. An empty cluster is a 0×D matrix.
    pub fn clusters(&self) -> &[DataMatrix] {
        &self.clusters
    }

    /// Number of points currently assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(|members| members.nrows()).collect()
    }

    /// Execute exactly `n_iter` rounds of assign-then-recompute.
    ///
    /// Never exits early, even when assignments have stabilised.
    pub fn run(&mut self) -> Result<()> {
        for round in 0..self.config.n_iter {
            self.assign()?;
            self.recompute_centroids();
            tracing::debug!(round, sizes = ?self.cluster_sizes(), "completed clustering round");
        }
        Ok(())
    }

    /// Rebuild the cluster map from the current centroids.
    ///
    /// Every point lands in exactly one cluster; the previous map is
    /// discarded in full, regenerating empty entries as well.
    fn assign(&mut self) -> Result<()> {
        let dists = pairwise_squared_distances(self.points.view(), self.centroids.view())?;
        let nearest = nearest_centroid_indices(&dists);

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.config.k];
        for (row, &cluster) in nearest.iter().enumerate() {
            members[cluster].push(row);
        }

        self.clusters = members
            .iter()
            .map(|rows| self.points.select(Axis(0), rows))
            .collect();
        Ok(())
    }

    /// Rebuild the centroid map from the current cluster map.
    ///
    /// A cluster with no members keeps its previous centroid unchanged
    /// rather than degrading to an undefined mean; the event is logged so
    /// callers can spot degenerate partitions.
    fn recompute_centroids(&mut self) {
        let mut next = DataMatrix::zeros((self.config.k, self.points.ncols()));
        for (cluster, members) in self.clusters.iter().enumerate() {
            match members.mean_axis(Axis(0)) {
                Some(mean) => next.row_mut(cluster).assign(&mean),
                None => {
                    tracing::warn!(cluster, "cluster received no points; keeping previous centroid");
                    next.row_mut(cluster).assign(&self.centroids.row(cluster));
                }
            }
        }
        self.centroids = next;
    }
}

/// Generate a uniform random data matrix (`n` rows, `dim` columns).
pub fn generate_points<R: Rng + ?Sized>(n: usize, dim: usize, rng: &mut R) -> DataMatrix {
    Array2::random_using((n, dim), Uniform::new(0.0, 1.0), rng)
}

/// Generate Gaussian blobs around the given centroids, useful for benches
/// and cluster-recovery tests.
pub fn generate_clustered_points<R: Rng + ?Sized>(
    n_per_cluster: usize,
    centroids: &DataMatrix,
    spread: f64,
    rng: &mut R,
) -> Result<DataMatrix> {
    let (k, dim) = (centroids.nrows(), centroids.ncols());
    let normal = Normal::new(0.0, spread)
        .map_err(|err| KMeansError::InvalidConfig(format!("invalid spread: {err}")))?;

    let mut points = DataMatrix::zeros((k * n_per_cluster, dim));
    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        for offset in 0..n_per_cluster {
            let mut row = points.row_mut(cluster_idx * n_per_cluster + offset);
            for (slot, &centre) in row.iter_mut().zip(centroid.iter()) {
                *slot = centre + normal.sample(rng);
            }
        }
    }
    Ok(points)
}

/// Loaders that materialize a [`DataMatrix`] from local files.
pub struct DataLoader;

impl DataLoader {
    /// Load whitespace-separated numeric rows (the classic benchmark-dataset
    /// format). Blank lines are skipped.
    pub fn load_text<P: AsRef<Path>>(path: P) -> Result<DataMatrix> {
        let content = std::fs::read_to_string(path)?;
        let mut records: Vec<Vec<f64>> = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut row = Vec::new();
            for field in trimmed.split_whitespace() {
                row.push(field.parse()?);
            }
            records.push(row);
        }
        matrix_from_rows(records)
    }

    /// Load a headered CSV file assuming numeric columns.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<DataMatrix> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let mut records: Vec<Vec<f64>> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut row = Vec::with_capacity(record.len());
            for field in record.iter() {
                row.push(field.parse()?);
            }
            records.push(row);
        }
        matrix_from_rows(records)
    }

    /// Load a Parquet file containing only numeric (int/float) columns.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<DataMatrix> {
        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;

        let mut records: Vec<Vec<f64>> = Vec::new();
        for (i, row) in reader.get_row_iter(None)?.enumerate() {
            let row = row?;
            let mut values = Vec::with_capacity(row.len());
            for (j, (_, field)) in row.get_column_iter().enumerate() {
                let value = match field {
                    Field::Double(v) => *v,
                    Field::Float(v) => *v as f64,
                    Field::Int(v) => *v as f64,
                    Field::Long(v) => *v as f64,
                    Field::Short(v) => *v as f64,
                    Field::Byte(v) => *v as f64,
                    Field::UInt(v) => *v as f64,
                    Field::ULong(v) => *v as f64,
                    Field::UShort(v) => *v as f64,
                    Field::UByte(v) => *v as f64,
                    Field::Null => {
                        return Err(KMeansError::InvalidData(format!(
                            "row {i} column {j} contained a NULL value which cannot be converted to f64"
                        )))
                    }
                    other => {
                        return Err(KMeansError::InvalidData(format!(
                            "unsupported parquet field at row {i} column {j}: {other:?}"
                        )))
                    }
                };
                values.push(value);
            }
            records.push(values);
        }
        matrix_from_rows(records)
    }
}

/// Pack parsed rows into a rectangular matrix, rejecting ragged input.
fn matrix_from_rows(records: Vec<Vec<f64>>) -> Result<DataMatrix> {
    let Some(first) = records.first() else {
        return Ok(Array2::zeros((0, 0)));
    };
    let dim = first.len();

    let mut arr = Array2::zeros((records.len(), dim));
    for (i, row) in records.into_iter().enumerate() {
        if row.len() != dim {
            return Err(KMeansError::InvalidData(format!(
                "found inconsistent row width at row {i}: expected {dim}, got {}",
                row.len()
            )));
        }
        for (j, value) in row.into_iter().enumerate() {
            arr[(i, j)] = value;
        }
    }
    Ok(arr)
}
