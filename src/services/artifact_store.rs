//! Artifact Store
//!
//! Read-only access to pre-computed tabular artifacts and their textual
//! summaries. The first session to load a product pays the I/O cost; the
//! result is cached for the process lifetime. Summaries are preferred over
//! full artifacts wherever possible: they are the dominant latency and
//! token-cost bound for the analyzer.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::agent::AgentError;
use super::catalog::{Catalog, Product, RowFilter};

/// Concrete rows backing a product
#[derive(Debug, Clone)]
pub struct Artifact {
    pub product_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Artifact {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }
}

/// Text rendering of an artifact prepared for LLM consumption
#[derive(Debug, Clone)]
pub struct Summary {
    pub product_id: String,
    pub generated_at: DateTime<Utc>,
    /// Full rendered text sent to the analyzer
    pub text: String,
    /// (rows, columns) when derived from a loaded artifact
    pub shape: Option<(usize, usize)>,
    /// Whether the text came from a precomputed summary file
    pub used_precomputed: bool,
}

/// Loads artifacts by product id with a write-once cache. Cache population
/// is single-flight per key: concurrent cold readers block on a per-product
/// lock and observe the same cached value.
pub struct ArtifactStore {
    dir: PathBuf,
    preview_rows: usize,
    load_timeout: Duration,
    catalog: Arc<Catalog>,
    artifacts: DashMap<String, Arc<Artifact>>,
    summaries: DashMap<String, Arc<Summary>>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ArtifactStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        preview_rows: usize,
        load_timeout: Duration,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            dir: dir.into(),
            preview_rows,
            load_timeout,
            catalog,
            artifacts: DashMap::new(),
            summaries: DashMap::new(),
            key_locks: DashMap::new(),
        }
    }

    /// Summary for a product. Attempts, in order: cached value, precomputed
    /// summary file, loading the artifact and rendering a summary in memory.
    pub async fn load_summary(&self, product_id: &str) -> Result<Arc<Summary>, AgentError> {
        if let Some(cached) = self.summaries.get(product_id) {
            return Ok(Arc::clone(&cached));
        }

        let lock = self.key_lock(product_id);
        let _guard = lock.lock().await;

        // Another task may have populated the cache while we waited
        if let Some(cached) = self.summaries.get(product_id) {
            return Ok(Arc::clone(&cached));
        }

        let product = self.catalog.get(product_id)?;

        let summary = match self.read_precomputed_summary(product_id).await {
            Some(text) => Summary {
                product_id: product_id.to_string(),
                generated_at: Utc::now(),
                text,
                shape: None,
                used_precomputed: true,
            },
            None => {
                let artifact = self.load_artifact_locked(product).await?;
                self.render_summary(product, &artifact)
            },
        };

        let summary = Arc::new(summary);
        self.summaries.insert(product_id.to_string(), Arc::clone(&summary));
        tracing::debug!(
            "summary cached for {} (precomputed: {})",
            product_id,
            summary.used_precomputed
        );
        Ok(summary)
    }

    /// Full artifact rows. Used by the report builder and internally when
    /// generating a summary.
    pub async fn load_artifact(&self, product_id: &str) -> Result<Arc<Artifact>, AgentError> {
        if let Some(cached) = self.artifacts.get(product_id) {
            return Ok(Arc::clone(&cached));
        }

        let lock = self.key_lock(product_id);
        let _guard = lock.lock().await;

        if let Some(cached) = self.artifacts.get(product_id) {
            return Ok(Arc::clone(&cached));
        }

        let product = self.catalog.get(product_id)?;
        self.load_artifact_locked(product).await
    }

    /// Caller must hold the per-key lock
    async fn load_artifact_locked(&self, product: &Product) -> Result<Arc<Artifact>, AgentError> {
        if let Some(cached) = self.artifacts.get(&product.id) {
            return Ok(Arc::clone(&cached));
        }

        let path = self.dir.join(&product.source_file);
        let artifact = self.read_csv(product, &path).await?;
        let artifact = Arc::new(artifact);
        self.artifacts.insert(product.id.clone(), Arc::clone(&artifact));
        Ok(artifact)
    }

    async fn read_precomputed_summary(&self, product_id: &str) -> Option<String> {
        let path = self.dir.join("summaries").join(format!("{}.txt", product_id));
        match timeout(self.load_timeout, tokio::fs::read_to_string(&path)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    async fn read_csv(&self, product: &Product, path: &Path) -> Result<Artifact, AgentError> {
        let bytes = timeout(self.load_timeout, tokio::fs::read(path))
            .await
            .map_err(|_| {
                AgentError::ArtifactUnavailable(format!(
                    "{}: load timed out after {:?}",
                    product.id, self.load_timeout
                ))
            })?
            .map_err(|e| AgentError::ArtifactUnavailable(format!("{}: {}", product.id, e)))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(bytes.as_slice());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| AgentError::ArtifactUnavailable(format!("{}: {}", product.id, e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let filter_index = match &product.filter {
            Some(filter) => Some(Self::resolve_filter_column(&product.id, &columns, filter)?),
            None => None,
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| AgentError::ArtifactUnavailable(format!("{}: {}", product.id, e)))?;
            let row: Vec<String> = record.iter().map(|v| v.to_string()).collect();

            if let (Some(index), Some(filter)) = (filter_index, product.filter.as_ref()) {
                if row.get(index).map(|v| v.as_str()) != Some(filter.equals.as_str()) {
                    continue;
                }
            }
            rows.push(row);
        }

        Ok(Artifact { product_id: product.id.clone(), columns, rows })
    }

    fn resolve_filter_column(
        product_id: &str,
        columns: &[String],
        filter: &RowFilter,
    ) -> Result<usize, AgentError> {
        columns.iter().position(|c| c == &filter.column).ok_or_else(|| {
            AgentError::ArtifactUnavailable(format!(
                "{}: filter column '{}' not present",
                product_id, filter.column
            ))
        })
    }

    fn render_summary(&self, product: &Product, artifact: &Artifact) -> Summary {
        let (total_rows, total_cols) = artifact.shape();
        let preview = self.preview_rows.min(total_rows);
        let dtypes = infer_dtypes(artifact);

        let mut text = String::new();
        text.push_str(&format!("# {}\n", product.id));
        text.push_str(&product.description);
        text.push('\n');
        text.push_str(&format!("shape: {} rows x {} columns\n", total_rows, total_cols));
        text.push_str(&format!("columns: {}\n", artifact.columns.join(", ")));
        text.push_str(&format!(
            "dtypes: {}\n",
            artifact
                .columns
                .iter()
                .zip(dtypes.iter())
                .map(|(c, d)| format!("{}={}", c, d))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        if preview < total_rows {
            text.push_str(&format!("preview: {} rows (of {} total)\n", preview, total_rows));
        } else {
            text.push_str(&format!("preview: {} rows\n", preview));
        }

        text.push_str(&artifact.columns.join(","));
        text.push('\n');
        for row in artifact.rows.iter().take(preview) {
            text.push_str(&row.join(","));
            text.push('\n');
        }

        Summary {
            product_id: product.id.clone(),
            generated_at: Utc::now(),
            text,
            shape: Some((total_rows, total_cols)),
            used_precomputed: false,
        }
    }

    fn key_lock(&self, product_id: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(product_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Pandas-flavored dtype names: the offline jobs that write these artifacts
/// describe columns the same way.
fn infer_dtypes(artifact: &Artifact) -> Vec<&'static str> {
    (0..artifact.columns.len())
        .map(|col| {
            let mut any_value = false;
            let mut all_int = true;
            let mut all_float = true;
            for row in &artifact.rows {
                let value = match row.get(col) {
                    Some(v) if !v.trim().is_empty() => v.trim(),
                    _ => continue,
                };
                any_value = true;
                if value.parse::<i64>().is_err() {
                    all_int = false;
                }
                if value.parse::<f64>().is_err() {
                    all_float = false;
                }
            }
            if !any_value {
                "object"
            } else if all_int {
                "int64"
            } else if all_float {
                "float64"
            } else {
                "object"
            }
        })
        .collect()
}
