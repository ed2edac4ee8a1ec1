//! Infographic report model, schema validation and auto-repair.
//!
//! The model answers with free-form JSON. [`validate`] walks that raw value and
//! lists every structural defect; [`repair`] applies a single deterministic pass of
//! fixes and lifts the result into the typed [`ReportDocument`].

mod repair;
mod validate;

pub use repair::repair;
pub use validate::{validate, ErrorKind, ValidationError, ValidationResult};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A complete report: title, executive summary and renderable components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct ReportDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub infographic: Vec<ReportComponent>,
    /// Any other top-level keys the model produced, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for ReportDocument {
    fn from(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };

        let title = take_string(&mut map, "title");
        let summary = take_string(&mut map, "summary");
        let infographic = match map.remove("infographic") {
            None | Some(Value::Null) => Vec::new(),
            Some(other) => component_list(other)
                .into_iter()
                .map(ReportComponent::from)
                .collect(),
        };

        Self {
            title,
            summary,
            infographic,
            extra: map,
        }
    }
}

impl ReportDocument {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Remove `key` from `map` if it holds a string. Non-string values stay in place.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(_)) => match map.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

/// Normalize an `infographic` value to a list; a lone component becomes a one-element list.
pub(crate) fn component_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// A report component: either one of the known kinds or raw JSON kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportComponent {
    Known(Component),
    Unrecognized(Value),
}

impl From<Value> for ReportComponent {
    fn from(value: Value) -> Self {
        match serde_json::from_value::<Component>(value.clone()) {
            Ok(component) => ReportComponent::Known(component),
            Err(e) => {
                tracing::debug!("Keeping component as raw JSON: {}", e);
                ReportComponent::Unrecognized(value)
            }
        }
    }
}

impl Serialize for ReportComponent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReportComponent::Known(component) => component.serialize(serializer),
            ReportComponent::Unrecognized(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ReportComponent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ReportComponent::from)
    }
}

/// Known component kinds, discriminated by the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Header(Header),
    KpiGrid(KpiGrid),
    Chart(Chart),
    AlertList(AlertList),
    ProgressList(ProgressList),
    #[serde(rename = "layout_2_col")]
    Layout2Col(Layout2Col),
    DataTable(DataTable),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiGrid {
    #[serde(default)]
    pub items: Vec<KpiItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Text or number, shown as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `bar`, `line`, `doughnut`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<ChartData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<Value>,
    #[serde(default)]
    pub datasets: Vec<ChartDataset>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub items: Vec<AlertItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    /// Severity: `info`, `success`, `warning` or `error`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub items: Vec<ProgressItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Percentage, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout2Col {
    #[serde(default)]
    pub children: Vec<ReportComponent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub headers: Vec<Value>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A report with the opaque identifier assigned before storage or transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedReport {
    pub id: String,
    #[serde(flatten)]
    pub report: ReportDocument,
}

impl IdentifiedReport {
    pub fn new(report: ReportDocument) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_components() {
        let doc = ReportDocument::from(json!({
            "title": "Ventas",
            "summary": "Resumen",
            "infographic": [
                {"type": "header", "title": "T", "subtitle": "S"},
                {"type": "kpi_grid", "items": [{"label": "Total", "value": 42, "trend": "up"}]},
                {"type": "layout_2_col", "children": [{"type": "header", "title": "L"}]},
                {"type": "data_table", "headers": ["a"], "rows": [["1"]]}
            ]
        }));

        assert_eq!(doc.title.as_deref(), Some("Ventas"));
        assert_eq!(doc.infographic.len(), 4);
        match &doc.infographic[1] {
            ReportComponent::Known(Component::KpiGrid(grid)) => {
                assert_eq!(grid.items[0].value, Some(json!(42)));
                assert_eq!(grid.items[0].trend.as_deref(), Some("up"));
            }
            other => panic!("expected kpi_grid, got {other:?}"),
        }
        match &doc.infographic[2] {
            ReportComponent::Known(Component::Layout2Col(layout)) => {
                assert_eq!(layout.children.len(), 1);
            }
            other => panic!("expected layout_2_col, got {other:?}"),
        }
    }

    #[test]
    fn test_single_component_promoted_to_list() {
        let doc = ReportDocument::from(json!({"infographic": {"type": "header", "title": "T"}}));
        assert_eq!(doc.infographic.len(), 1);
        assert!(doc.to_value()["infographic"].is_array());
    }

    #[test]
    fn test_unknown_component_preserved() {
        let raw = json!({"type": "sparkline", "points": [1, 2, 3]});
        let doc = ReportDocument::from(json!({"infographic": [raw.clone()]}));
        assert_eq!(doc.infographic, vec![ReportComponent::Unrecognized(raw.clone())]);
        assert_eq!(doc.to_value()["infographic"][0], raw);
    }

    #[test]
    fn test_round_trip_keeps_extra_fields() {
        let input = json!({
            "title": "R",
            "theme": {"primary": "#123456"},
            "infographic": [
                {"type": "chart", "title": "C", "chartType": "bar", "legend": false,
                 "chartData": {"labels": ["a"], "datasets": [{"label": "x", "data": [1], "color": "red"}]}}
            ]
        });
        let doc: ReportDocument = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(doc.to_value(), input);
    }

    #[test]
    fn test_identified_report_flattens_id() {
        let report = IdentifiedReport::new(ReportDocument::default());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["id"], json!(report.id));
        assert!(value["infographic"].as_array().unwrap().is_empty());
    }
}
