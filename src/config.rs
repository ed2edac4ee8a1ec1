//! Prompt profiles and runtime settings.
//!
//! Profiles are loaded once from the `configs/` directory (one JSON file each) into an
//! in-memory store. Runtime settings come from the environment
//! (a `.env` file is honoured by `main`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_PROFILE: &str = "default";

/// A named set of prompts and report triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystProfile {
    pub name: String,
    pub description: String,
    pub prompts: Prompts,
    /// Lowercase substrings that mark a question as a report request.
    #[serde(default = "default_report_keywords")]
    pub report_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompts {
    /// System prompt for per-chunk batch analysis.
    pub chunk_analysis: String,
    /// System prompt for conversational answers.
    pub analyst: String,
    /// System prompt for report (infographic JSON) answers.
    pub architect: String,
}

impl AnalystProfile {
    pub fn is_report_request(&self, question: &str) -> bool {
        let question = question.to_lowercase();
        self.report_keywords
            .iter()
            .any(|k| !k.is_empty() && question.contains(&k.to_lowercase()))
    }
}

fn default_report_keywords() -> Vec<String> {
    [
        "reporte",
        "informe",
        "gráfica",
        "infografía",
        "visualización",
        "grafico",
        "graficar",
        "crea un reporte",
        "report",
        "infographic",
        "chart",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// In-memory store for all loaded profiles.
#[derive(Debug)]
pub struct ProfileStore {
    profiles: HashMap<String, AnalystProfile>,
    default_profile: String,
}

impl ProfileStore {
    /// Load every `*.json` profile in `dir`; `preferred` becomes the default when present.
    pub fn load_from_dir(dir: &Path, preferred: &str) -> Result<Self> {
        if !dir.exists() {
            anyhow::bail!("Profile directory does not exist: {:?}", dir);
        }

        let mut profiles = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read profile: {:?}", path))?;
                let profile: AnalystProfile = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse profile: {:?}", path))?;
                info!("Loaded profile: {} from {:?}", profile.name, path);
                profiles.push(profile);
            }
        }

        Self::from_profiles(profiles, preferred)
    }

    /// Build a store from profiles; `preferred` becomes the default when present.
    pub fn from_profiles(profiles: Vec<AnalystProfile>, preferred: &str) -> Result<Self> {
        let Some(first) = profiles.first() else {
            anyhow::bail!("No profiles provided");
        };
        let fallback = first.name.clone();

        let map: HashMap<String, AnalystProfile> = profiles
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        let default_profile = if map.contains_key(preferred) {
            preferred.to_string()
        } else {
            fallback
        };

        Ok(Self {
            profiles: map,
            default_profile,
        })
    }

    pub fn get(&self, name: &str) -> Option<AnalystProfile> {
        self.profiles.get(name).cloned()
    }

    /// The default profile, falling back to the built-in one.
    pub fn default_profile(&self) -> AnalystProfile {
        self.get(&self.default_profile)
            .unwrap_or_else(create_default_profile)
    }

    /// List all profile names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Runtime settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Model API key. Requests without one get a configuration hint instead of an answer.
    pub api_key: Option<String>,
    pub model: String,
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub profile_dir: PathBuf,
    pub profile: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            bind_addr: env::var("ANALYST_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            data_dir: env::var("ANALYST_DATA_DIR")
                .unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string())
                .into(),
            profile_dir: env::var("ANALYST_PROFILE_DIR")
                .unwrap_or_else(|_| "configs".to_string())
                .into(),
            profile: env::var("ANALYST_PROFILE").unwrap_or_else(|_| DEFAULT_PROFILE.to_string()),
        }
    }

    /// Load profiles from `profile_dir`, falling back to the built-in default.
    pub fn load_profiles(&self) -> Result<ProfileStore> {
        if self.profile_dir.exists() {
            return ProfileStore::load_from_dir(&self.profile_dir, &self.profile);
        }
        info!(
            "Profile directory {:?} not found, using built-in profile",
            self.profile_dir
        );
        ProfileStore::from_profiles(vec![create_default_profile()], &self.profile)
    }
}

/// Built-in profile used when no profile files are present.
pub fn create_default_profile() -> AnalystProfile {
    AnalystProfile {
        name: DEFAULT_PROFILE.to_string(),
        description: "Spreadsheet analyst with infographic reports".to_string(),
        prompts: Prompts {
            chunk_analysis: "You are a precise data analyst. Read the data block you are given and \
extract insights with exact figures. Answer based only on the provided data."
                .to_string(),
            analyst: r#"You are a senior data analyst talking with the user about their uploaded spreadsheets.

Rules:
1. Answer based only on the provided data context.
2. Do not answer with JSON.
3. Give a deep narrative, not just repeated statistics.
4. Use Markdown tables for comparisons."#
                .to_string(),
            architect: r#"You are a senior information designer and business analyst. Design a premium infographic that summarizes the data.

Rules:
1. Favour charts and KPIs with strong visual impact.
2. Explain the why and the strategy; do not restate what the charts already show.
3. When the user asks for calendars, lists, agendas or row-by-row breakdowns, use a "data_table" component.

Answer ONLY with a valid JSON object following this schema:
{
  "title": "Report title",
  "summary": "Executive summary (3-5 sentences)",
  "infographic": [
    { "type": "header", "title": "Title", "subtitle": "Main conclusion" },
    { "type": "kpi_grid", "items": [{ "label": "X", "value": "Y", "trend": "up" }] },
    { "type": "data_table", "title": "List", "headers": ["Col1", "Col2"], "rows": [["a", "b"]] },
    { "type": "alert_list", "items": [{ "type": "warning", "text": "Finding" }] },
    { "type": "progress_list", "items": [{ "label": "Goal", "value": 75 }] },
    {
      "type": "chart",
      "chartType": "bar",
      "title": "Trend",
      "analysisText": "Insightful analysis of the data shown.",
      "chartData": { "labels": [], "datasets": [{ "label": "Series", "data": [] }] }
    }
  ]
}"#
            .to_string(),
        },
        report_keywords: default_report_keywords(),
    }
}
