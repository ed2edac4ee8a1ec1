//! Tabular dataset types shared by ingestion, narrative building and suggestions.
//!
//! A [`Dataset`] is one uploaded file; each worksheet becomes a [`Sheet`] whose
//! rows are keyed by header name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single cell value as produced by file ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// True for null cells and blank strings. Zero is a value, not empty.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(_) => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// One row, keyed by header.
pub type Row = HashMap<String, CellValue>;

/// A worksheet inside a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Inactive sheets are left out of the narrative sent to the model.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
            is_active: true,
        }
    }
}

/// A named table set, usually one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, sheets: Vec<Sheet>) -> Self {
        Self {
            name: name.into(),
            sheets,
        }
    }

    /// Flip a sheet's active flag. Returns the new state, or `None` if no sheet has that name.
    pub fn toggle_sheet(&mut self, sheet_name: &str) -> Option<bool> {
        let sheet = self.sheets.iter_mut().find(|s| s.name == sheet_name)?;
        sheet.is_active = !sheet.is_active;
        Some(sheet.is_active)
    }

    pub fn active_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter().filter(|s| s.is_active)
    }
}
