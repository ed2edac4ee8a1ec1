//! Conversation history persisted through a [`KeyValueStore`].
//!
//! The whole history lives under a single key as a JSON array, most recent first.
//! Every read-modify-write runs under one write lock. Read or write failures are logged and treated as an empty history so the chat
//! keeps working when storage misbehaves.

use crate::generator::ConversationMessage;
use crate::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;
use uuid::Uuid;

const STORAGE_KEY: &str = "conversation_history";

/// A report saved alongside the conversation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: String,
    pub timestamp: u64,
    pub data: serde_json::Value,
}

/// Reference to a file that was loaded into a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: u64,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub reports: Vec<ReportEntry>,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct ConversationHistory {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl ConversationHistory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn load(&self) -> Vec<ConversationEntry> {
        let raw = match self.store.get(STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Failed to load conversation history: {:#}", e);
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            error!("Failed to parse conversation history: {}", e);
            Vec::new()
        })
    }

    fn save(&self, history: &[ConversationEntry]) {
        let result = serde_json::to_string(history)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(STORAGE_KEY, json));
        if let Err(e) = result {
            error!("Failed to save conversation history: {:#}", e);
        }
    }

    /// All conversations, most recent first.
    pub fn all(&self) -> Vec<ConversationEntry> {
        self.load()
    }

    pub fn get(&self, conversation_id: &str) -> Option<ConversationEntry> {
        self.load().into_iter().find(|c| c.id == conversation_id)
    }

    /// Start a new conversation and put it at the front of the history.
    pub fn add(&self, files: Vec<FileRef>, messages: Vec<ConversationMessage>) -> ConversationEntry {
        let entry = ConversationEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: now_millis(),
            files,
            messages,
            reports: Vec::new(),
        };

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut history = self.load();
        history.insert(0, entry.clone());
        self.save(&history);
        entry
    }

    /// Append to the stored message list. Returns false if the conversation does not exist.
    pub fn append_messages(&self, conversation_id: &str, messages: Vec<ConversationMessage>) -> bool {
        self.update(conversation_id, |conv| conv.messages.extend(messages))
    }

    pub fn update_files(&self, conversation_id: &str, files: Vec<FileRef>) -> bool {
        self.update(conversation_id, |conv| conv.files = files)
    }

    /// Attach a report. Adding the same report id twice is a no-op.
    pub fn add_report(&self, conversation_id: &str, report_id: &str, data: serde_json::Value) -> bool {
        self.update(conversation_id, |conv| {
            if !conv.reports.iter().any(|r| r.id == report_id) {
                conv.reports.push(ReportEntry {
                    id: report_id.to_string(),
                    timestamp: now_millis(),
                    data,
                });
            }
        })
    }

    /// Remove a conversation. Returns true if it existed.
    pub fn delete(&self, conversation_id: &str) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut history = self.load();
        let before = history.len();
        history.retain(|c| c.id != conversation_id);
        let removed = history.len() != before;
        if removed {
            self.save(&history);
        }
        removed
    }

    fn update<F>(&self, conversation_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut ConversationEntry),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut history = self.load();
        let Some(conv) = history.iter_mut().find(|c| c.id == conversation_id) else {
            return false;
        };
        apply(conv);
        self.save(&history);
        true
    }
}
