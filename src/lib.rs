//! Infographic Analyst - conversational analysis of uploaded spreadsheets with
//! model-generated infographic reports.

pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod history;
pub mod narrative;
pub mod orchestrator;
pub mod report;
pub mod server;
pub mod sheet_parser;
pub mod sink;
pub mod store;
pub mod suggestions;
