//! Chart payloads for the graph pane.
//!
//! The charting component takes a Chart.js-like spec. We produce one from every
//! sampled function visual, and accept ones the model embeds inline between
//! `[GRAPH_DATA]` markers (see `extract::extract_graph_blocks`).

use serde::{Deserialize, Serialize};

use crate::domain::FunctionGraphData;
use crate::util::{lenient, lenient_text_vec, lenient_vec};

const LINE_BORDER: &str = "rgb(75, 192, 192)";
const LINE_FILL: &str = "rgba(75, 192, 192, 0.5)";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Scatter,
    Bar,
    Pie,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub data: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_label: Option<String>,
}

/// Chart consumed by the front-end graph component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text_vec")]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub datasets: Vec<Dataset>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub options: Option<ChartOptions>,
}

/// Line chart of a sampled function: one label per x value, one dataset of y values.
pub fn chart_from_function(graph: &FunctionGraphData) -> ChartSpec {
    let labels = graph.points.iter().map(|p| format!("{:.2}", p.x)).collect();
    let data = graph.points.iter().map(|p| p.y).collect();
    ChartSpec {
        kind: ChartKind::Line,
        title: graph.function.clone(),
        labels,
        datasets: vec![Dataset {
            label: graph.function.clone(),
            data,
            border_color: Some(LINE_BORDER.into()),
            background_color: Some(LINE_FILL.into()),
        }],
        options: Some(ChartOptions {
            x_axis_label: Some("x".into()),
            y_axis_label: Some("y".into()),
        }),
    }
}
