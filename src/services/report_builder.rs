//! Report Builder
//!
//! Composes a PDF from a structured analysis result plus chart images drawn
//! from related artifact CSVs. Charts are rendered with vector primitives:
//! bars for categorical top-N shapes, polylines for sequential series,
//! points otherwise.

use chrono::Utc;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Polygon, Rgb,
};
use std::sync::Arc;

use super::agent::AgentError;
use super::artifact_store::{Artifact, ArtifactStore};
use super::catalog::Catalog;
use super::embedding_index::EmbeddingIndex;

/// Upper bound on supporting charts per report
pub const MAX_REPORT_CHARTS: usize = 3;

const PAGE_WIDTH: f64 = 210.0;
const PAGE_HEIGHT: f64 = 297.0;
const MARGIN: f64 = 20.0;
const CHART_HEIGHT: f64 = 60.0;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("unknown cluster pair: {parent}/{child}")]
    UnknownCluster { parent: i64, child: i64 },

    #[error(transparent)]
    Artifact(#[from] AgentError),

    #[error("report rendering failed: {0}")]
    Render(String),
}

impl ReportError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCluster { .. } => "UnknownCluster",
            Self::Artifact(e) => e.kind(),
            Self::Render(_) => "RenderError",
        }
    }
}

/// Everything a report needs; answer and rationale are optional because the
/// generate endpoint may be called with the discussion text alone.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub parent_cluster_id: i64,
    pub child_cluster_id: i64,
    pub discussion: String,
    pub answer: Option<String>,
    pub rationale: Vec<String>,
    pub key_metrics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChartKind {
    Bar,
    LineChart,
    Scatter,
}

pub struct ReportBuilder {
    catalog: Arc<Catalog>,
    artifacts: Arc<ArtifactStore>,
    index: Arc<EmbeddingIndex>,
}

impl ReportBuilder {
    pub fn new(
        catalog: Arc<Catalog>,
        artifacts: Arc<ArtifactStore>,
        index: Arc<EmbeddingIndex>,
    ) -> Self {
        Self { catalog, artifacts, index }
    }

    pub async fn generate(&self, input: &ReportInput) -> Result<Vec<u8>, ReportError> {
        let (parent_label, child_label) = self
            .index
            .labels(input.parent_cluster_id, input.child_cluster_id)
            .ok_or(ReportError::UnknownCluster {
                parent: input.parent_cluster_id,
                child: input.child_cluster_id,
            })?;

        // Supporting data: load what is available, skip what is not; a
        // missing artifact should not sink the whole report
        let mut charts = Vec::new();
        for product in self.catalog.products() {
            if charts.len() == MAX_REPORT_CHARTS {
                break;
            }
            match self.artifacts.load_artifact(&product.id).await {
                Ok(artifact) => {
                    if let Some(kind) = chart_kind(&artifact) {
                        charts.push((product.description.clone(), kind, artifact));
                    }
                },
                Err(e) => {
                    tracing::warn!("skipping chart for {}: {}", product.id, e);
                },
            }
        }

        render_pdf(input, &parent_label, &child_label, &charts)
    }
}

/// Chart shape chosen by product shape: categorical first column with few
/// rows draws bars, a sequential numeric first column draws a line, any
/// other numeric pairing draws points.
fn chart_kind(artifact: &Artifact) -> Option<ChartKind> {
    if artifact.columns.len() < 2 || artifact.rows.len() < 2 {
        return None;
    }
    let y_numeric = artifact.rows.iter().all(|r| parses_numeric(r.get(1)));
    if !y_numeric {
        return None;
    }

    let x_values: Vec<Option<f64>> = artifact
        .rows
        .iter()
        .map(|r| r.get(0).and_then(|v| v.trim().parse::<f64>().ok()))
        .collect();

    if x_values.iter().all(|v| v.is_some()) {
        let xs: Vec<f64> = x_values.into_iter().flatten().collect();
        let sequential = xs.windows(2).all(|w| w[1] >= w[0]);
        if sequential {
            return Some(ChartKind::LineChart);
        }
        return Some(ChartKind::Scatter);
    }

    if artifact.rows.len() <= 15 {
        return Some(ChartKind::Bar);
    }
    None
}

fn parses_numeric(value: Option<&String>) -> bool {
    value
        .map(|v| v.trim().parse::<f64>().is_ok())
        .unwrap_or(false)
}

// ============================================================================
// PDF layout
// ============================================================================

struct PageCursor {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    font_bold: IndirectFontRef,
    y: f64,
}

impl PageCursor {
    /// Start a new page when fewer than `needed` millimeters remain
    fn ensure_room(&mut self, needed: f64) {
        if self.y - needed < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH as f32), Mm(PAGE_HEIGHT as f32), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn text(&mut self, text: &str, size: f64, bold: bool) {
        self.ensure_room(8.0);
        let font = if bold { &self.font_bold } else { &self.font };
        self.layer.use_text(text, size as f32, Mm(MARGIN as f32), Mm(self.y as f32), font);
        self.y -= size * 0.55;
    }

    fn wrapped_text(&mut self, text: &str, size: f64) {
        for line in wrap_text(text, 92) {
            self.text(&line, size, false);
        }
    }

    fn gap(&mut self, mm: f64) {
        self.y -= mm;
    }
}

fn render_pdf(
    input: &ReportInput,
    parent_label: &str,
    child_label: &str,
    charts: &[(String, ChartKind, Arc<Artifact>)],
) -> Result<Vec<u8>, ReportError> {
    let (doc, page, layer) =
        PdfDocument::new("Meridian Analytics Report", Mm(PAGE_WIDTH as f32), Mm(PAGE_HEIGHT as f32), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Render(e.to_string()))?;
    let font_bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Render(e.to_string()))?;
    let layer = doc.get_page(page).get_layer(layer);

    let mut cursor = PageCursor { doc, layer, font, font_bold, y: PAGE_HEIGHT - MARGIN };

    // Header: cluster labels and timestamp
    cursor.text("Meridian Analytics Report", 18.0, true);
    cursor.gap(2.0);
    cursor.text(&format!("Cluster: {} / {}", parent_label, child_label), 12.0, false);
    cursor.text(
        &format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M UTC")),
        10.0,
        false,
    );
    cursor.gap(6.0);

    if let Some(answer) = &input.answer {
        cursor.text("Answer", 14.0, true);
        cursor.gap(1.0);
        cursor.wrapped_text(answer, 11.0);
        cursor.gap(4.0);
    }

    if !input.rationale.is_empty() {
        cursor.text("Rationale", 14.0, true);
        cursor.gap(1.0);
        for bullet in &input.rationale {
            cursor.wrapped_text(&format!("- {}", bullet), 11.0);
        }
        cursor.gap(4.0);
    }

    if !input.key_metrics.is_empty() {
        cursor.text("Key Metrics", 14.0, true);
        cursor.gap(1.0);
        for (i, metric) in input.key_metrics.iter().enumerate() {
            cursor.text(&format!("{:>2}. {}", i + 1, metric), 11.0, false);
        }
        cursor.gap(4.0);
    }

    if !input.discussion.is_empty() {
        cursor.text("Discussion", 14.0, true);
        cursor.gap(1.0);
        cursor.wrapped_text(&input.discussion, 11.0);
        cursor.gap(4.0);
    }

    for (title, kind, artifact) in charts {
        cursor.ensure_room(CHART_HEIGHT + 14.0);
        cursor.text(title, 12.0, true);
        cursor.gap(2.0);
        draw_chart(&mut cursor, *kind, artifact);
        cursor.gap(6.0);
    }

    cursor
        .doc
        .save_to_bytes()
        .map_err(|e| ReportError::Render(e.to_string()))
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// ============================================================================
// Chart drawing
// ============================================================================

fn draw_chart(cursor: &mut PageCursor, kind: ChartKind, artifact: &Artifact) {
    let plot_left = MARGIN + 8.0;
    let plot_width = PAGE_WIDTH - 2.0 * MARGIN - 8.0;
    let plot_bottom = cursor.y - CHART_HEIGHT;
    let plot_height = CHART_HEIGHT - 6.0;

    let values: Vec<f64> = artifact
        .rows
        .iter()
        .filter_map(|r| r.get(1).and_then(|v| v.trim().parse::<f64>().ok()))
        .collect();
    if values.is_empty() {
        cursor.y = plot_bottom;
        return;
    }
    let max_value = values.iter().cloned().fold(f64::MIN, f64::max).max(1e-9);

    // axes
    cursor.layer.set_outline_color(Color::Rgb(Rgb::new(0.3, 0.3, 0.3, None)));
    cursor.layer.set_outline_thickness(0.6);
    cursor.layer.add_line(Line {
        points: vec![
            (Point::new(Mm(plot_left as f32), Mm((plot_bottom + plot_height) as f32)), false),
            (Point::new(Mm(plot_left as f32), Mm(plot_bottom as f32)), false),
            (Point::new(Mm((plot_left + plot_width) as f32), Mm(plot_bottom as f32)), false),
        ],
        is_closed: false,
    });

    let accent = Color::Rgb(Rgb::new(0.16, 0.42, 0.72, None));
    match kind {
        ChartKind::Bar => {
            cursor.layer.set_fill_color(accent);
            let slot = plot_width / values.len() as f64;
            let bar_width = (slot * 0.7).max(1.0);
            for (i, value) in values.iter().enumerate() {
                let height = ((value / max_value)) * plot_height;
                let x = plot_left + slot * i as f64 + (slot - bar_width) / 2.0;
                cursor.layer.add_polygon(rect(x, plot_bottom, bar_width, height));
            }
        },
        ChartKind::LineChart => {
            cursor.layer.set_outline_color(accent);
            cursor.layer.set_outline_thickness(1.0);
            let points = series_points(&values, max_value, plot_left, plot_bottom, plot_width, plot_height);
            cursor.layer.add_line(Line {
                points: points.into_iter().map(|p| (p, false)).collect(),
                is_closed: false,
            });
        },
        ChartKind::Scatter => {
            cursor.layer.set_fill_color(accent);
            let points = series_points(&values, max_value, plot_left, plot_bottom, plot_width, plot_height);
            for point in points {
                let x: Mm = point.x.into();
                let y: Mm = point.y.into();
                cursor.layer.add_polygon(rect((x.0 - 0.7) as f64, (y.0 - 0.7) as f64, 1.4, 1.4));
            }
        },
    }

    cursor.y = plot_bottom;
}

fn series_points(
    values: &[f64],
    max_value: f64,
    left: f64,
    bottom: f64,
    width: f64,
    height: f64,
) -> Vec<Point> {
    let step = if values.len() > 1 { width / (values.len() - 1) as f64 } else { 0.0 };
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            Point::new(
                Mm((left + step * i as f64) as f32),
                Mm((bottom + ((value / max_value)) * height) as f32),
            )
        })
        .collect()
}

fn rect(x: f64, y: f64, width: f64, height: f64) -> Polygon {
    Polygon {
        rings: vec![vec![
            (Point::new(Mm(x as f32), Mm(y as f32)), false),
            (Point::new(Mm((x + width) as f32), Mm(y as f32)), false),
            (Point::new(Mm((x + width) as f32), Mm((y + height) as f32)), false),
            (Point::new(Mm(x as f32), Mm((y + height) as f32)), false),
        ]],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::Product;
    use std::io::Write;
    use std::time::Duration;

    fn artifact(columns: &[&str], rows: &[&[&str]]) -> Artifact {
        Artifact {
            product_id: "t".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn categorical_top_n_draws_bars() {
        let a = artifact(&["category", "count"], &[&["Potholes", "120"], &["Noise", "44"]]);
        assert_eq!(chart_kind(&a), Some(ChartKind::Bar));
    }

    #[test]
    fn sequential_numeric_draws_a_line() {
        let a = artifact(&["year", "population"], &[&["2024", "145000"], &["2025", "149000"]]);
        assert_eq!(chart_kind(&a), Some(ChartKind::LineChart));
    }

    #[test]
    fn unsorted_numeric_draws_points() {
        let a = artifact(&["x", "y"], &[&["5", "1"], &["2", "9"], &["7", "3"]]);
        assert_eq!(chart_kind(&a), Some(ChartKind::Scatter));
    }

    #[test]
    fn non_numeric_values_are_not_chartable() {
        let a = artifact(&["category", "note"], &[&["Potholes", "bad"], &["Noise", "loud"]]);
        assert_eq!(chart_kind(&a), None);
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text(&"word ".repeat(40), 20);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 20));
    }

    #[tokio::test]
    async fn generated_report_is_a_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(tmp.path().join("top10.csv")).unwrap();
        file.write_all(b"category,count\nPotholes,120\nStreetlights,88\n")
            .unwrap();

        let catalog = Arc::new(
            Catalog::new(vec![Product {
                id: "top10_volume_30d".to_string(),
                description: "Top categories by volume".to_string(),
                use_cases: vec![],
                key_metrics: vec![],
                source_file: "top10.csv".to_string(),
                filter: None,
                route_hint: None,
            }])
            .unwrap(),
        );
        let artifacts = Arc::new(ArtifactStore::new(
            tmp.path(),
            50,
            Duration::from_secs(5),
            Arc::clone(&catalog),
        ));
        let index = Arc::new(EmbeddingIndex::from_centroids(
            2,
            vec![(1, "roads".to_string(), None, vec![1.0, 0.0])],
            vec![(10, 1, "potholes".to_string(), vec![1.0, 0.0])],
        ));

        let builder = ReportBuilder::new(catalog, artifacts, index);
        let input = ReportInput {
            parent_cluster_id: 1,
            child_cluster_id: 10,
            discussion: "Pothole requests dominate the roads cluster.".to_string(),
            answer: Some("Potholes lead with 120 requests.".to_string()),
            rationale: vec!["Potholes: 120".to_string(), "Streetlights: 88".to_string()],
            key_metrics: vec!["120 pothole requests".to_string()],
        };

        let bytes = builder.generate(&input).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[tokio::test]
    async fn unknown_cluster_pair_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Arc::new(
            Catalog::new(vec![Product {
                id: "p".to_string(),
                description: "p".to_string(),
                use_cases: vec![],
                key_metrics: vec![],
                source_file: "p.csv".to_string(),
                filter: None,
                route_hint: None,
            }])
            .unwrap(),
        );
        let artifacts = Arc::new(ArtifactStore::new(
            tmp.path(),
            50,
            Duration::from_secs(5),
            Arc::clone(&catalog),
        ));
        let index = Arc::new(EmbeddingIndex::from_centroids(
            2,
            vec![(1, "roads".to_string(), None, vec![1.0, 0.0])],
            vec![(10, 1, "potholes".to_string(), vec![1.0, 0.0])],
        ));

        let builder = ReportBuilder::new(catalog, artifacts, index);
        let input = ReportInput {
            parent_cluster_id: 1,
            child_cluster_id: 999,
            discussion: String::new(),
            answer: None,
            rationale: vec![],
            key_metrics: vec![],
        };

        let err = builder.generate(&input).await.unwrap_err();
        assert_eq!(err.kind(), "UnknownCluster");
    }
}
