use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of a schema defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Empty,
    Invalid,
    Missing,
}

/// One structural defect, located by a dotted field path such as `component[2].items[0].value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

/// Check a decoded report against the rendering schema.
///
/// Rules are independent: a component can contribute several errors. Warnings
/// never affect validity.
pub fn validate(candidate: &Value) -> ValidationResult {
    let mut report = Collector::default();

    let infographic = match candidate.get("infographic") {
        None | Some(Value::Null) => {
            report.error(
                "infographic",
                ErrorKind::Missing,
                "report must contain an infographic section",
            );
            return report.finish();
        }
        Some(value) => value,
    };

    let components: Vec<&Value> = match infographic {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    for (idx, component) in components.into_iter().enumerate() {
        let base = format!("component[{}]", idx);
        match component.get("type").and_then(Value::as_str) {
            Some("header") => {
                report.text(component.get("title"), &format!("{base}.title"), "header needs a title");
            }
            Some("kpi_grid") => check_kpi_grid(&mut report, component, &base),
            Some("chart") => check_chart(&mut report, component, &base),
            Some("alert_list") => check_alert_list(&mut report, component, &base, idx),
            Some("progress_list") => check_progress_list(&mut report, component, &base, idx),
            // Rendered defensively; no structural requirements.
            Some("layout_2_col") | Some("data_table") => {}
            Some(other) if !other.trim().is_empty() => report.error(
                &format!("{base}.type"),
                ErrorKind::Missing,
                &format!("unknown component type '{}'", other),
            ),
            _ => report.error(
                &format!("{base}.type"),
                ErrorKind::Missing,
                "every component needs a type",
            ),
        }
    }

    report.finish()
}

fn check_kpi_grid(report: &mut Collector, component: &Value, base: &str) {
    let Some(items) = report.list(component.get("items"), &format!("{base}.items"), "KPI grid needs at least one item") else {
        return;
    };

    for (j, item) in items.iter().enumerate() {
        report.text(
            item.get("label"),
            &format!("{base}.items[{j}].label"),
            "every KPI needs a label",
        );
        if !is_defined_value(item.get("value")) {
            report.error(
                &format!("{base}.items[{j}].value"),
                ErrorKind::Empty,
                "every KPI needs a value",
            );
        }
    }
}

fn check_chart(report: &mut Collector, component: &Value, base: &str) {
    report.text(component.get("title"), &format!("{base}.title"), "chart needs a title");

    if !is_defined_value(component.get("chartType")) {
        report.error(
            &format!("{base}.chartType"),
            ErrorKind::Missing,
            "chart needs a chartType (bar, line, doughnut)",
        );
    }

    let chart_data = component.get("chartData");
    report.list(
        chart_data.and_then(|d| d.get("labels")),
        &format!("{base}.chartData.labels"),
        "chart needs labels",
    );

    let datasets = report.list(
        chart_data.and_then(|d| d.get("datasets")),
        &format!("{base}.chartData.datasets"),
        "chart needs datasets",
    );
    if let Some(datasets) = datasets {
        for (j, dataset) in datasets.iter().enumerate() {
            report.list(
                dataset.get("data"),
                &format!("{base}.chartData.datasets[{j}].data"),
                "every dataset needs data",
            );
        }
    }
}

fn check_alert_list(report: &mut Collector, component: &Value, base: &str, idx: usize) {
    let Some(items) = non_empty_array(component.get("items")) else {
        report.warn(format!("alert_list at component {} has no items", idx));
        return;
    };

    for (j, item) in items.iter().enumerate() {
        if !is_filled_text(item.get("text")) && !is_filled_text(item.get("message")) {
            report.error(
                &format!("{base}.items[{j}].text"),
                ErrorKind::Empty,
                "every alert needs a text",
            );
        }
    }
}

fn check_progress_list(report: &mut Collector, component: &Value, base: &str, idx: usize) {
    let Some(items) = non_empty_array(component.get("items")) else {
        report.warn(format!("progress_list at component {} has no items", idx));
        return;
    };

    for (j, item) in items.iter().enumerate() {
        report.text(
            item.get("label"),
            &format!("{base}.items[{j}].label"),
            "every progress item needs a label",
        );
        if !is_present(item.get("value")) {
            report.error(
                &format!("{base}.items[{j}].value"),
                ErrorKind::Empty,
                "every progress item needs a value",
            );
        }
    }
}

// ============================================================================
// Field predicates
// ============================================================================

/// Present and not null.
fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

/// Present, not null and not an empty string.
pub(crate) fn is_defined_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// A string with at least one non-whitespace character.
pub(crate) fn is_filled_text(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if !s.trim().is_empty())
}

fn non_empty_array(value: Option<&Value>) -> Option<&Vec<Value>> {
    value.and_then(Value::as_array).filter(|items| !items.is_empty())
}

#[derive(Default)]
struct Collector {
    errors: Vec<ValidationError>,
    warnings: Vec<String>,
}

impl Collector {
    fn error(&mut self, field: &str, kind: ErrorKind, message: &str) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
            kind,
        });
    }

    fn warn(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Require non-blank text. Non-string values are reported as invalid.
    fn text(&mut self, value: Option<&Value>, field: &str, message: &str) {
        match value {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            None | Some(Value::Null) | Some(Value::String(_)) => {
                self.error(field, ErrorKind::Empty, message)
            }
            Some(_) => self.error(field, ErrorKind::Invalid, &format!("{} (expected text)", message)),
        }
    }

    /// Require a non-empty array. Returns it when the rule holds.
    fn list<'a>(&mut self, value: Option<&'a Value>, field: &str, message: &str) -> Option<&'a Vec<Value>> {
        match value {
            Some(Value::Array(items)) if !items.is_empty() => Some(items),
            None | Some(Value::Null) | Some(Value::Array(_)) => {
                self.error(field, ErrorKind::Empty, message);
                None
            }
            Some(_) => {
                self.error(field, ErrorKind::Invalid, &format!("{} (expected a list)", message));
                None
            }
        }
    }

    fn finish(self) -> ValidationResult {
        ValidationResult {
            is_valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_missing_infographic() {
        let result = validate(&json!({}));
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "infographic");
        assert_eq!(result.errors[0].kind, ErrorKind::Missing);

        let result = validate(&json!({"infographic": null, "title": "x"}));
        assert_eq!(fields(&result), vec!["infographic"]);
    }

    #[test]
    fn test_valid_report() {
        let result = validate(&json!({
            "title": "R",
            "infographic": [
                {"type": "header", "title": "T"},
                {"type": "kpi_grid", "items": [{"label": "Sales", "value": 0}]},
                {"type": "chart", "title": "C", "chartType": "bar",
                 "chartData": {"labels": ["a"], "datasets": [{"data": [1]}]}},
                {"type": "alert_list", "items": [{"message": "legacy"}]},
                {"type": "progress_list", "items": [{"label": "P", "value": 0}]},
                {"type": "layout_2_col"},
                {"type": "data_table"}
            ]
        }));
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_kpi_missing_value_single_error() {
        let result = validate(&json!({
            "infographic": [{"type": "kpi_grid", "items": [{"label": "Sales"}]}]
        }));
        assert_eq!(fields(&result), vec!["component[0].items[0].value"]);
        assert_eq!(result.errors[0].kind, ErrorKind::Empty);
    }

    #[test]
    fn test_kpi_empty_string_value_and_label() {
        let result = validate(&json!({
            "infographic": [{"type": "kpi_grid", "items": [{"label": "  ", "value": ""}]}]
        }));
        assert_eq!(
            fields(&result),
            vec!["component[0].items[0].label", "component[0].items[0].value"]
        );
    }

    #[test]
    fn test_kpi_without_items() {
        let result = validate(&json!({"infographic": [{"type": "kpi_grid", "items": []}]}));
        assert_eq!(fields(&result), vec!["component[0].items"]);
    }

    #[test]
    fn test_chart_errors_are_cumulative() {
        let result = validate(&json!({
            "infographic": [
                {"type": "header", "title": "ok"},
                {"type": "chart", "chartData": {"labels": [], "datasets": [{"data": []}, {"data": [2]}]}}
            ]
        }));
        assert_eq!(
            fields(&result),
            vec![
                "component[1].title",
                "component[1].chartType",
                "component[1].chartData.labels",
                "component[1].chartData.datasets[0].data",
            ]
        );
        assert_eq!(result.errors[1].kind, ErrorKind::Missing);
    }

    #[test]
    fn test_chart_without_chart_data() {
        let result = validate(&json!({
            "infographic": [{"type": "chart", "title": "C", "chartType": "line"}]
        }));
        assert_eq!(
            fields(&result),
            vec!["component[0].chartData.labels", "component[0].chartData.datasets"]
        );
    }

    #[test]
    fn test_chart_empty_chart_type() {
        let result = validate(&json!({
            "infographic": [{"type": "chart", "title": "T", "chartType": "",
                             "chartData": {"labels": ["a"], "datasets": [{"data": [1]}]}}]
        }));
        assert!(!result.is_valid);
        assert_eq!(fields(&result), vec!["component[0].chartType"]);
        assert_eq!(result.errors[0].kind, ErrorKind::Missing);
    }

    #[test]
    fn test_empty_lists_only_warn() {
        let result = validate(&json!({
            "infographic": [{"type": "alert_list"}, {"type": "progress_list", "items": []}]
        }));
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_alert_and_progress_item_errors() {
        let result = validate(&json!({
            "infographic": [
                {"type": "alert_list", "items": [{"type": "warning"}]},
                {"type": "progress_list", "items": [{"label": "P", "value": null}]}
            ]
        }));
        assert_eq!(
            fields(&result),
            vec!["component[0].items[0].text", "component[1].items[0].value"]
        );
    }

    #[test]
    fn test_missing_and_unknown_type() {
        let result = validate(&json!({
            "infographic": [{"title": "no type"}, {"type": "sparkline"}]
        }));
        assert_eq!(fields(&result), vec!["component[0].type", "component[1].type"]);
        assert!(result.errors.iter().all(|e| e.kind == ErrorKind::Missing));
    }

    #[test]
    fn test_single_object_infographic() {
        let result = validate(&json!({"infographic": {"type": "header"}}));
        assert_eq!(fields(&result), vec!["component[0].title"]);
    }

    #[test]
    fn test_non_string_title_is_invalid() {
        let result = validate(&json!({"infographic": [{"type": "header", "title": 7}]}));
        assert_eq!(result.errors[0].kind, ErrorKind::Invalid);
    }
}
