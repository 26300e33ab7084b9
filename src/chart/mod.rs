use tracing::info;

use crate::data::types::SeriesPoint;
use crate::state::annotations::Annotation;

/// Rendering primitives the chart backend understands. One annotation
/// projects to exactly two of these; the pairing never leaves this module
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayPrimitive {
    /// Full-height vertical line at a timestamp.
    VerticalLine { x: i64 },
    /// Text anchored at a chart position.
    Label {
        x: i64,
        y: f64,
        text: String,
        source: String,
    },
}

/// Pure projection of one logical annotation onto its line and label.
pub fn project(annotation: &Annotation) -> [OverlayPrimitive; 2] {
    [
        OverlayPrimitive::VerticalLine { x: annotation.date },
        OverlayPrimitive::Label {
            x: annotation.date,
            y: annotation.y_value,
            text: annotation.content.clone(),
            source: annotation.source.clone(),
        },
    ]
}

pub fn project_all(annotations: &[Annotation]) -> Vec<OverlayPrimitive> {
    annotations.iter().flat_map(project).collect()
}

/// External collaborator that draws the chart. The core only hands it
/// domain values and never sees pixels.
pub trait ChartAdapter {
    fn render(&mut self, points: &[SeriesPoint], title: &str);
    fn set_overlays(&mut self, overlays: &[OverlayPrimitive]);
    fn set_x_window(&mut self, x_min: i64, x_max: i64);
}

/// Adapter that narrates renders through tracing; backs the CLI binary.
#[derive(Debug, Default)]
pub struct LogChart;

impl ChartAdapter for LogChart {
    fn render(&mut self, points: &[SeriesPoint], title: &str) {
        info!("chart: {} ({} points)", title, points.len());
    }

    fn set_overlays(&mut self, overlays: &[OverlayPrimitive]) {
        info!("chart: {} overlay primitives", overlays.len());
        for overlay in overlays {
            if let OverlayPrimitive::Label { x, y, text, .. } = overlay {
                info!("  label {:?} at x={} y={:.1}", text, x, y);
            }
        }
    }

    fn set_x_window(&mut self, x_min: i64, x_max: i64) {
        info!("chart: x window [{}, {}]", x_min, x_max);
    }
}
