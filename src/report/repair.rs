use super::validate::{is_defined_value, is_filled_text};
use super::{component_list, ReportDocument};
use serde_json::{json, Map, Value};
use tracing::debug;

const FALLBACK_HEADER_TITLE: &str = "Reporte de Análisis";
const FALLBACK_HEADER_SUBTITLE: &str = "Análisis generado automáticamente";
const FALLBACK_CHART_TITLE: &str = "Gráfico";
const FALLBACK_DATASET_LABEL: &str = "Datos";

/// Apply one best-effort repair pass and lift the result into a [`ReportDocument`].
///
/// The result is not re-validated; a report that cannot be fully fixed (for
/// example a chart with no data at all) is returned as repaired as it gets.
pub fn repair(candidate: Value) -> ReportDocument {
    let Value::Object(mut doc) = candidate else {
        return ReportDocument::default();
    };

    match doc.remove("infographic") {
        None | Some(Value::Null) => {}
        Some(infographic) => {
            let components: Vec<Value> = component_list(infographic)
                .into_iter()
                .map(repair_component)
                .collect();
            debug!("Repaired {} report component(s)", components.len());
            doc.insert("infographic".to_string(), Value::Array(components));
        }
    }

    ReportDocument::from(Value::Object(doc))
}

fn repair_component(component: Value) -> Value {
    let Value::Object(mut fields) = component else {
        return component;
    };

    normalize_field_names(&mut fields);

    match fields.get("type").and_then(Value::as_str) {
        Some("header") => {
            if !is_filled_text(fields.get("title")) {
                fields.insert("title".into(), json!(FALLBACK_HEADER_TITLE));
            }
            if !is_set(fields.get("subtitle")) {
                fields.insert("subtitle".into(), json!(FALLBACK_HEADER_SUBTITLE));
            }
        }
        Some("kpi_grid") => {
            if let Some(Value::Array(items)) = fields.get_mut("items") {
                items.retain(|item| {
                    is_filled_text(item.get("label")) && is_defined_value(item.get("value"))
                });
            }
        }
        Some("alert_list") => {
            if let Some(Value::Array(items)) = fields.get_mut("items") {
                for item in items.iter_mut() {
                    copy_message_to_text(item);
                }
                items.retain(|item| is_filled_text(item.get("text")));
            }
        }
        Some("chart") => {
            if !is_filled_text(fields.get("title")) {
                fields.insert("title".into(), json!(FALLBACK_CHART_TITLE));
            }
        }
        _ => {}
    }

    Value::Object(fields)
}

/// Fold common snake_case / flattened variants into the expected chart shape.
fn normalize_field_names(fields: &mut Map<String, Value>) {
    for (alias, canonical) in [("chart_type", "chartType"), ("chart_data", "chartData")] {
        if is_set(fields.get(alias)) && !is_set(fields.get(canonical)) {
            if let Some(value) = fields.get(alias).cloned() {
                fields.insert(canonical.to_string(), value);
            }
        }
    }

    let fallback_label = fields
        .get("title")
        .filter(|t| is_filled_text(Some(*t)))
        .cloned()
        .unwrap_or_else(|| json!(FALLBACK_DATASET_LABEL));

    let Some(Value::Object(chart_data)) = fields.get_mut("chartData") else {
        return;
    };
    if is_set(chart_data.get("datasets")) {
        return;
    }
    let Some(data) = chart_data.get("data").filter(|d| is_set(Some(*d))).cloned() else {
        return;
    };

    let already_datasets =
        matches!(&data, Value::Array(items) if items.first().is_some_and(Value::is_object));
    let datasets = if already_datasets {
        data
    } else {
        json!([{ "label": fallback_label, "data": data }])
    };
    chart_data.insert("datasets".to_string(), datasets);
}

fn copy_message_to_text(item: &mut Value) {
    let Value::Object(fields) = item else {
        return;
    };
    if !is_set(fields.get("text")) && is_filled_text(fields.get("message")) {
        if let Some(message) = fields.get("message").cloned() {
            fields.insert("text".to_string(), message);
        }
    }
}

/// Present, not null, not an empty string, not `false`.
fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
