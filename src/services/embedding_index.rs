//! Embedding Index
//!
//! Nearest-centroid lookup over the precomputed cluster tables. Level-1
//! clusters are top-level request groupings; level-2 clusters refine one
//! parent. Centroids are fixed-dimension vectors written by the offline
//! clustering jobs, stored as JSON float arrays.

use sqlx::{Row, SqlitePool};

use super::agent::AgentError;

#[derive(Debug, Clone)]
pub struct Centroid {
    pub id: i64,
    pub label: String,
    /// Dashboard route tuned for this cluster, if one exists
    pub route: Option<String>,
    vector: Vec<f32>,
    norm: f32,
}

#[derive(Debug, Clone)]
pub struct ChildCentroid {
    pub id: i64,
    pub parent_id: i64,
    pub label: String,
    vector: Vec<f32>,
    norm: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed centroid vector for {table} id {id}: {reason}")]
    MalformedVector { table: &'static str, id: i64, reason: String },

    #[error("centroid dimension mismatch in {table} id {id}: expected {expected}, got {got}")]
    InconsistentDimension { table: &'static str, id: i64, expected: usize, got: usize },

    #[error("no level-1 centroids found")]
    Empty,
}

/// Loaded once at startup and shared read-only across sessions
#[derive(Debug)]
pub struct EmbeddingIndex {
    dim: usize,
    level1: Vec<Centroid>,
    level2: Vec<ChildCentroid>,
}

impl EmbeddingIndex {
    pub async fn load(pool: &SqlitePool) -> Result<Self, IndexError> {
        let level1_rows =
            sqlx::query("SELECT id, label, route, centroid FROM cluster_level1 ORDER BY id")
                .fetch_all(pool)
                .await?;

        let mut level1 = Vec::with_capacity(level1_rows.len());
        let mut dim: Option<usize> = None;
        for row in &level1_rows {
            let id: i64 = row.try_get("id")?;
            let raw: String = row.try_get("centroid")?;
            let vector = parse_vector("cluster_level1", id, &raw)?;
            check_dim("cluster_level1", id, &mut dim, vector.len())?;
            let norm = l2_norm(&vector);
            level1.push(Centroid {
                id,
                label: row.try_get("label")?,
                route: row.try_get("route")?,
                vector,
                norm,
            });
        }

        let dim = dim.ok_or(IndexError::Empty)?;

        let level2_rows =
            sqlx::query("SELECT id, parent_id, label, centroid FROM cluster_level2 ORDER BY id")
                .fetch_all(pool)
                .await?;

        let mut level2 = Vec::with_capacity(level2_rows.len());
        for row in &level2_rows {
            let id: i64 = row.try_get("id")?;
            let parent_id: Option<i64> = row.try_get("parent_id")?;

            // Orphaned level-2 rows are filtered at load
            let parent_id = match parent_id {
                Some(p) if level1.iter().any(|c| c.id == p) => p,
                _ => {
                    tracing::warn!("dropping orphan level-2 centroid {}", id);
                    continue;
                },
            };

            let raw: String = row.try_get("centroid")?;
            let vector = parse_vector("cluster_level2", id, &raw)?;
            if vector.len() != dim {
                return Err(IndexError::InconsistentDimension {
                    table: "cluster_level2",
                    id,
                    expected: dim,
                    got: vector.len(),
                });
            }
            let norm = l2_norm(&vector);
            level2.push(ChildCentroid {
                id,
                parent_id,
                label: row.try_get("label")?,
                vector,
                norm,
            });
        }

        tracing::info!(
            "embedding index loaded: {} level-1, {} level-2 centroids, dim {}",
            level1.len(),
            level2.len(),
            dim
        );

        Ok(Self { dim, level1, level2 })
    }

    /// Construct directly from centroids; used by tests and tooling
    pub fn from_centroids(
        dim: usize,
        level1: Vec<(i64, String, Option<String>, Vec<f32>)>,
        level2: Vec<(i64, i64, String, Vec<f32>)>,
    ) -> Self {
        let mut level1: Vec<Centroid> = level1
            .into_iter()
            .map(|(id, label, route, vector)| {
                let norm = l2_norm(&vector);
                Centroid { id, label, route, vector, norm }
            })
            .collect();
        level1.sort_by_key(|c| c.id);

        let mut level2: Vec<ChildCentroid> = level2
            .into_iter()
            .map(|(id, parent_id, label, vector)| {
                let norm = l2_norm(&vector);
                ChildCentroid { id, parent_id, label, vector, norm }
            })
            .collect();
        level2.sort_by_key(|c| c.id);

        Self { dim, level1, level2 }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Nearest level-1 centroid, then the nearest level-2 centroid restricted
    /// to that parent. Ties break toward the smaller id. The confidence is
    /// the child cosine similarity mapped into (0, 1].
    pub fn predict(&self, embedding: &[f32]) -> Result<(i64, i64, f64), AgentError> {
        if embedding.len() != self.dim {
            return Err(AgentError::Dimension { expected: self.dim, got: embedding.len() });
        }

        let query_norm = l2_norm(embedding);

        let parent = self
            .level1
            .iter()
            .fold(None::<(&Centroid, f64)>, |best, candidate| {
                let sim = cosine(embedding, query_norm, &candidate.vector, candidate.norm);
                match best {
                    // level1 is sorted by id, so a strict comparison keeps
                    // the smaller id on ties
                    Some((_, best_sim)) if sim <= best_sim => best,
                    _ => Some((candidate, sim)),
                }
            })
            .map(|(c, _)| c)
            .ok_or_else(|| {
                AgentError::ArtifactUnavailable("no level-1 centroids loaded".to_string())
            })?;

        let (child, child_sim) = self
            .level2
            .iter()
            .filter(|c| c.parent_id == parent.id)
            .fold(None::<(&ChildCentroid, f64)>, |best, candidate| {
                let sim = cosine(embedding, query_norm, &candidate.vector, candidate.norm);
                match best {
                    Some((_, best_sim)) if sim <= best_sim => best,
                    _ => Some((candidate, sim)),
                }
            })
            .ok_or_else(|| {
                AgentError::ArtifactUnavailable(format!(
                    "cluster {} has no level-2 centroids",
                    parent.id
                ))
            })?;

        let confidence = ((child_sim + 1.0) / 2.0).clamp(f64::EPSILON, 1.0);
        Ok((parent.id, child.id, confidence))
    }

    pub fn contains_pair(&self, parent_id: i64, child_id: i64) -> bool {
        self.level2
            .iter()
            .any(|c| c.id == child_id && c.parent_id == parent_id)
    }

    pub fn labels(&self, parent_id: i64, child_id: i64) -> Option<(String, String)> {
        let parent = self.level1.iter().find(|c| c.id == parent_id)?;
        let child = self
            .level2
            .iter()
            .find(|c| c.id == child_id && c.parent_id == parent_id)?;
        Some((parent.label.clone(), child.label.clone()))
    }

    pub fn route_for(&self, parent_id: i64) -> Option<&str> {
        self.level1
            .iter()
            .find(|c| c.id == parent_id)
            .and_then(|c| c.route.as_deref())
    }
}

fn parse_vector(table: &'static str, id: i64, raw: &str) -> Result<Vec<f32>, IndexError> {
    serde_json::from_str::<Vec<f32>>(raw).map_err(|e| IndexError::MalformedVector {
        table,
        id,
        reason: e.to_string(),
    })
}

fn check_dim(
    table: &'static str,
    id: i64,
    dim: &mut Option<usize>,
    got: usize,
) -> Result<(), IndexError> {
    match *dim {
        None => {
            *dim = Some(got);
            Ok(())
        },
        Some(expected) if expected == got => Ok(()),
        Some(expected) => Err(IndexError::InconsistentDimension { table, id, expected, got }),
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f64 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return -1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot / (a_norm * b_norm)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test database");

        sqlx::query(
            "CREATE TABLE cluster_level1 (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL,
                route TEXT,
                centroid TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE cluster_level2 (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER,
                label TEXT NOT NULL,
                centroid TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    async fn insert_level1(pool: &SqlitePool, id: i64, label: &str, route: Option<&str>, v: &str) {
        sqlx::query("INSERT INTO cluster_level1 (id, label, route, centroid) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(label)
            .bind(route)
            .bind(v)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn insert_level2(pool: &SqlitePool, id: i64, parent: Option<i64>, label: &str, v: &str) {
        sqlx::query(
            "INSERT INTO cluster_level2 (id, parent_id, label, centroid) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(parent)
        .bind(label)
        .bind(v)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn predicts_parent_then_child_within_parent() {
        let pool = seeded_pool().await;
        insert_level1(&pool, 1, "roads", Some("/backlog"), "[1.0, 0.0]").await;
        insert_level1(&pool, 2, "lighting", None, "[0.0, 1.0]").await;
        // child 10 belongs to roads; child 20 (lighting) is actually closer
        // to the query but must not be selected under parent 1
        insert_level2(&pool, 10, Some(1), "potholes", "[0.8, 0.2]").await;
        insert_level2(&pool, 20, Some(2), "streetlights", "[0.9, 0.1]").await;

        let index = EmbeddingIndex::load(&pool).await.unwrap();
        let (parent, child, confidence) = index.predict(&[1.0, 0.1]).unwrap();
        assert_eq!(parent, 1);
        assert_eq!(child, 10);
        assert!(confidence > 0.0 && confidence <= 1.0);
        assert!(index.contains_pair(parent, child));
    }

    #[tokio::test]
    async fn ties_break_toward_smaller_id() {
        let pool = seeded_pool().await;
        insert_level1(&pool, 5, "b", None, "[1.0, 0.0]").await;
        insert_level1(&pool, 3, "a", None, "[1.0, 0.0]").await;
        insert_level2(&pool, 31, Some(3), "a1", "[1.0, 0.0]").await;
        insert_level2(&pool, 30, Some(3), "a0", "[1.0, 0.0]").await;

        let index = EmbeddingIndex::load(&pool).await.unwrap();
        let (parent, child, _) = index.predict(&[1.0, 0.0]).unwrap();
        assert_eq!(parent, 3);
        assert_eq!(child, 30);
    }

    #[tokio::test]
    async fn orphan_children_are_filtered() {
        let pool = seeded_pool().await;
        insert_level1(&pool, 1, "roads", None, "[1.0, 0.0]").await;
        insert_level2(&pool, 10, Some(1), "potholes", "[1.0, 0.0]").await;
        insert_level2(&pool, 11, None, "orphan-null", "[1.0, 0.0]").await;
        insert_level2(&pool, 12, Some(99), "orphan-missing", "[1.0, 0.0]").await;

        let index = EmbeddingIndex::load(&pool).await.unwrap();
        assert!(!index.contains_pair(99, 12));
        let (_, child, _) = index.predict(&[1.0, 0.0]).unwrap();
        assert_eq!(child, 10);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_error() {
        let pool = seeded_pool().await;
        insert_level1(&pool, 1, "roads", None, "[1.0, 0.0]").await;
        insert_level2(&pool, 10, Some(1), "potholes", "[1.0, 0.0]").await;

        let index = EmbeddingIndex::load(&pool).await.unwrap();
        let err = index.predict(&[1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), "DimensionError");
    }

    #[tokio::test]
    async fn empty_level1_fails_load() {
        let pool = seeded_pool().await;
        let err = EmbeddingIndex::load(&pool).await.unwrap_err();
        assert!(matches!(err, IndexError::Empty));
    }

    #[tokio::test]
    async fn inconsistent_dims_fail_load() {
        let pool = seeded_pool().await;
        insert_level1(&pool, 1, "a", None, "[1.0, 0.0]").await;
        insert_level1(&pool, 2, "b", None, "[1.0, 0.0, 0.0]").await;
        let err = EmbeddingIndex::load(&pool).await.unwrap_err();
        assert!(matches!(err, IndexError::InconsistentDimension { .. }));
    }

    #[tokio::test]
    async fn labels_and_routes_resolve() {
        let pool = seeded_pool().await;
        insert_level1(&pool, 1, "roads", Some("/backlog"), "[1.0, 0.0]").await;
        insert_level2(&pool, 10, Some(1), "potholes", "[1.0, 0.0]").await;

        let index = EmbeddingIndex::load(&pool).await.unwrap();
        assert_eq!(
            index.labels(1, 10),
            Some(("roads".to_string(), "potholes".to_string()))
        );
        assert_eq!(index.labels(1, 99), None);
        assert_eq!(index.route_for(1), Some("/backlog"));
        assert_eq!(index.route_for(2), None);
    }
}
