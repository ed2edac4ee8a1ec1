//! HTTP surface: conversations, uploaded files, chat and the current report.

use crate::config::{ProfileStore, Settings};
use crate::dataset::Dataset;
use crate::error::ApiError;
use crate::generator::{Attachment, Credentials, TextGenerator};
use crate::history::{ConversationEntry, ConversationHistory, FileRef};
use crate::orchestrator::{ChatOutcome, ChatRequest, Orchestrator};
use crate::report::IdentifiedReport;
use crate::sheet_parser;
use crate::sink::StoreReportSink;
use crate::store::KeyValueStore;
use crate::suggestions;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Upload limit for multipart bodies.
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Files loaded into one conversation. Kept in memory only.
#[derive(Debug, Clone, Default)]
struct Workspace {
    datasets: Vec<Dataset>,
    attachments: Vec<(String, Attachment)>,
}

impl Workspace {
    fn contains(&self, name: &str) -> bool {
        self.datasets.iter().any(|d| d.name == name)
            || self.attachments.iter().any(|(n, _)| n == name)
    }

    fn file_refs(&self) -> Vec<FileRef> {
        self.datasets
            .iter()
            .map(|d| d.name.clone())
            .chain(self.attachments.iter().map(|(n, _)| n.clone()))
            .map(|name| FileRef { name })
            .collect()
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    profiles: Arc<ProfileStore>,
    history: ConversationHistory,
    reports: StoreReportSink,
    generator: Arc<dyn TextGenerator>,
    workspaces: Arc<RwLock<HashMap<String, Workspace>>>,
    /// One lock per conversation so chats on the same conversation run one at a time.
    chat_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        profiles: ProfileStore,
        store: Arc<dyn KeyValueStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            profiles: Arc::new(profiles),
            history: ConversationHistory::new(store.clone()),
            reports: StoreReportSink::new(store),
            generator,
            workspaces: Arc::new(RwLock::new(HashMap::new())),
            chat_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn chat_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.chat_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    fn conversation(&self, id: &str) -> Result<ConversationEntry, ApiError> {
        self.history
            .get(id)
            .ok_or_else(|| ApiError::ConversationNotFound(id.to_string()))
    }

    fn workspace(&self, id: &str) -> Workspace {
        self.workspaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Apply `f` to the conversation's workspace and sync the file list into history.
    fn with_workspace<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Workspace) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        self.conversation(id)?;
        let (result, files) = {
            let mut workspaces = self.workspaces.write().unwrap_or_else(PoisonError::into_inner);
            let workspace = workspaces.entry(id.to_string()).or_default();
            let result = f(workspace)?;
            (result, workspace.file_refs())
        };
        self.history.update_files(id, files);
        Ok(result)
    }

    /// Load one uploaded file into a conversation. A name that is already loaded is ignored.
    pub fn add_file(&self, id: &str, filename: &str, data: &[u8]) -> Result<WorkspaceView, ApiError> {
        self.conversation(id)?;
        let current = self.workspace(id);
        if current.contains(filename) {
            info!("Ignoring duplicate upload {} in {}", filename, id);
            return Ok(WorkspaceView::from(&current));
        }

        enum Loaded {
            Dataset(Dataset),
            Image(Attachment),
        }

        let loaded = if sheet_parser::is_tabular(filename) {
            sheet_parser::parse_file(filename, data)
                .map(Loaded::Dataset)
                .map_err(|e| ApiError::Unprocessable(format!("{}: {:#}", filename, e)))?
        } else if let Some(attachment) = sheet_parser::attachment_from_image(filename, data) {
            Loaded::Image(attachment)
        } else {
            return Err(ApiError::Unprocessable(format!(
                "{}: expected a spreadsheet (.csv, .xlsx, .xls, ...) or an image",
                filename
            )));
        };

        self.with_workspace(id, |ws| {
            if !ws.contains(filename) {
                match loaded {
                    Loaded::Dataset(dataset) => ws.datasets.push(dataset),
                    Loaded::Image(attachment) => ws.attachments.push((filename.to_string(), attachment)),
                }
            }
            Ok(WorkspaceView::from(&*ws))
        })
    }

    pub fn remove_file(&self, id: &str, filename: &str) -> Result<WorkspaceView, ApiError> {
        self.with_workspace(id, |ws| {
            if !ws.contains(filename) {
                return Err(ApiError::FileNotFound(filename.to_string()));
            }
            ws.datasets.retain(|d| d.name != filename);
            ws.attachments.retain(|(n, _)| n != filename);
            Ok(WorkspaceView::from(&*ws))
        })
    }

    pub fn toggle_sheet(&self, id: &str, filename: &str, sheet: &str) -> Result<bool, ApiError> {
        self.with_workspace(id, |ws| {
            let dataset = ws
                .datasets
                .iter_mut()
                .find(|d| d.name == filename)
                .ok_or_else(|| ApiError::FileNotFound(filename.to_string()))?;
            dataset
                .toggle_sheet(sheet)
                .ok_or_else(|| ApiError::SheetNotFound(sheet.to_string()))
        })
    }

    /// Answer a question in a conversation and persist the new messages.
    pub async fn chat(&self, id: &str, body: ChatBody) -> Result<ChatOutcome, ApiError> {
        let question = body.question.trim();
        if question.is_empty() {
            return Err(ApiError::BadRequest("question must not be empty".to_string()));
        }

        self.conversation(id)?;
        let lock = self.chat_lock(id);
        let _turn = lock.lock().await;

        let conversation = self.conversation(id)?;
        let profile = match &body.profile {
            Some(name) => self
                .profiles
                .get(name)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown profile: {}", name)))?,
            None => self.profiles.default_profile(),
        };

        let workspace = self.workspace(id);
        let request = ChatRequest {
            question: question.to_string(),
            datasets: workspace.datasets,
            history: conversation.messages,
            attachments: workspace.attachments.into_iter().map(|(_, a)| a).collect(),
            credentials: self.settings.api_key.as_deref().map(Credentials::new),
        };

        let orchestrator = Orchestrator::new(
            self.generator.clone(),
            Arc::new(self.reports.clone()),
            profile,
        );
        let conversation_id = id.to_string();
        let outcome = orchestrator
            .handle(request, |current, total| {
                info!("Conversation {}: analyzed block {}/{}", conversation_id, current, total);
            })
            .await;

        self.history.append_messages(id, outcome.messages.clone());

        if let Some(report) = &outcome.report {
            self.history.add_report(id, &report.id, report.report.to_value());
        }

        Ok(outcome)
    }
}

// ============================================================================
// Views and bodies
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetView {
    pub name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetView {
    pub name: String,
    pub sheets: Vec<SheetView>,
}

/// What is loaded into a conversation, without the row data.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceView {
    pub datasets: Vec<DatasetView>,
    pub attachments: Vec<String>,
}

impl From<&Workspace> for WorkspaceView {
    fn from(ws: &Workspace) -> Self {
        Self {
            datasets: ws
                .datasets
                .iter()
                .map(|d| DatasetView {
                    name: d.name.clone(),
                    sheets: d
                        .sheets
                        .iter()
                        .map(|s| SheetView {
                            name: s.name.clone(),
                            headers: s.headers.clone(),
                            row_count: s.rows.len(),
                            is_active: s.is_active,
                        })
                        .collect(),
                })
                .collect(),
            attachments: ws.attachments.iter().map(|(n, _)| n.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: ConversationEntry,
    pub workspace: WorkspaceView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatBody {
    pub question: String,
    /// Profile name; the default profile when omitted.
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleView {
    pub is_active: bool,
}

// ============================================================================
// Router and handlers
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profiles", get(list_profiles))
        .route("/conversations", get(list_conversations).post(create_conversation))
        .route(
            "/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/conversations/:id/files", post(upload_files))
        .route("/conversations/:id/files/:file", delete(delete_file))
        .route(
            "/conversations/:id/files/:file/sheets/:sheet/toggle",
            post(toggle_sheet),
        )
        .route("/conversations/:id/suggestions", get(get_suggestions))
        .route("/conversations/:id/chat", post(chat))
        .route("/reports/current", get(current_report))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_profiles(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.profiles.list())
}

async fn list_conversations(State(state): State<AppState>) -> Json<Vec<ConversationEntry>> {
    Json(state.history.all())
}

async fn create_conversation(State(state): State<AppState>) -> (StatusCode, Json<ConversationEntry>) {
    let entry = state.history.add(Vec::new(), Vec::new());
    info!("Created conversation {}", entry.id);
    (StatusCode::CREATED, Json(entry))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>, ApiError> {
    let conversation = state.conversation(&id)?;
    let workspace = WorkspaceView::from(&state.workspace(&id));
    Ok(Json(ConversationView {
        conversation,
        workspace,
    }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.history.delete(&id) {
        return Err(ApiError::ConversationNotFound(id));
    }
    state
        .workspaces
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    state
        .chat_locks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<WorkspaceView>, ApiError> {
    state.conversation(&id)?;

    let mut view = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read {}: {}", filename, e)))?;

        info!("Received file: {} ({} bytes) for {}", filename, data.len(), id);
        view = Some(state.add_file(&id, &filename, &data)?);
    }

    view.map(Json)
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))
}

async fn delete_file(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
) -> Result<Json<WorkspaceView>, ApiError> {
    state.remove_file(&id, &file).map(Json)
}

async fn toggle_sheet(
    State(state): State<AppState>,
    Path((id, file, sheet)): Path<(String, String, String)>,
) -> Result<Json<ToggleView>, ApiError> {
    let is_active = state.toggle_sheet(&id, &file, &sheet)?;
    Ok(Json(ToggleView { is_active }))
}

async fn get_suggestions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    state.conversation(&id)?;
    Ok(Json(suggestions::suggest(&state.workspace(&id).datasets)))
}

async fn chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatOutcome>, ApiError> {
    state.chat(&id, body).await.map(Json)
}

async fn current_report(State(state): State<AppState>) -> Result<Json<IdentifiedReport>, ApiError> {
    state.reports.current()?.map(Json).ok_or(ApiError::ReportNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_default_profile;
    use crate::generator::testing::ScriptedGenerator;
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    fn settings(api_key: Option<&str>) -> Settings {
        Settings {
            api_key: api_key.map(str::to_string),
            model: "test-model".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: PathBuf::from("unused"),
            profile_dir: PathBuf::from("unused"),
            profile: "default".to_string(),
        }
    }

    fn state_with(generator: Arc<ScriptedGenerator>, api_key: Option<&str>) -> AppState {
        let profiles = ProfileStore::from_profiles(vec![create_default_profile()], "default").unwrap();
        AppState::new(
            settings(api_key),
            profiles,
            Arc::new(MemoryStore::new()),
            generator,
        )
    }

    const SALES_CSV: &[u8] = b"fecha,venta,estado\n2024-01,100,ok\n2024-02,0,pendiente\n";

    #[tokio::test]
    async fn test_upload_toggle_and_remove_files() {
        let state = state_with(Arc::new(ScriptedGenerator::default()), Some("k"));
        let (_, Json(conv)) = create_conversation(State(state.clone())).await;

        let view = state.add_file(&conv.id, "ventas.csv", SALES_CSV).unwrap();
        assert_eq!(view.datasets.len(), 1);
        assert_eq!(view.datasets[0].sheets[0].row_count, 2);

        state.add_file(&conv.id, "ventas.csv", b"other,data\n1,2\n").unwrap();
        let view = state.add_file(&conv.id, "logo.png", b"png-bytes").unwrap();
        assert_eq!(view.datasets.len(), 1);
        assert_eq!(view.attachments, vec!["logo.png".to_string()]);

        let stored = state.history.get(&conv.id).unwrap();
        let names: Vec<&str> = stored.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ventas.csv", "logo.png"]);

        assert!(!state.toggle_sheet(&conv.id, "ventas.csv", "ventas").unwrap());
        assert!(matches!(
            state.toggle_sheet(&conv.id, "ventas.csv", "nope"),
            Err(ApiError::SheetNotFound(_))
        ));

        assert!(matches!(
            state.add_file(&conv.id, "notes.txt", b"x"),
            Err(ApiError::Unprocessable(_))
        ));

        let view = state.remove_file(&conv.id, "logo.png").unwrap();
        assert!(view.attachments.is_empty());
        assert!(matches!(
            state.remove_file(&conv.id, "logo.png"),
            Err(ApiError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let state = state_with(Arc::new(ScriptedGenerator::default()), Some("k"));
        assert!(matches!(
            state.add_file("missing", "a.csv", SALES_CSV),
            Err(ApiError::ConversationNotFound(_))
        ));
        let result = get_suggestions(State(state), Path("missing".to_string())).await;
        assert!(matches!(result, Err(ApiError::ConversationNotFound(_))));
    }

    #[tokio::test]
    async fn test_chat_persists_messages_and_report() {
        let answer = r#"{"title":"Ventas","infographic":[{"type":"header","title":"Resumen"}]}"#;
        let generator = Arc::new(ScriptedGenerator::texts(&["Enero vendió 100.", answer]));
        let state = state_with(generator.clone(), Some("k"));
        let (_, Json(conv)) = create_conversation(State(state.clone())).await;
        state.add_file(&conv.id, "ventas.csv", SALES_CSV).unwrap();

        let Json(suggested) = get_suggestions(State(state.clone()), Path(conv.id.clone()))
            .await
            .unwrap();
        assert_eq!(suggested.len(), 3);

        let first = state
            .chat(&conv.id, ChatBody { question: "¿Cuánto se vendió?".into(), profile: None })
            .await
            .unwrap();
        assert_eq!(first.messages[1].text, "Enero vendió 100.");
        assert!(generator.calls()[0].messages[0].text.contains("venta:0"));

        let second = state
            .chat(&conv.id, ChatBody { question: "Crea un reporte".into(), profile: None })
            .await
            .unwrap();
        let report = second.report.unwrap();

        // Prior turns are sent as history on the second call.
        assert_eq!(generator.calls()[1].messages.len(), 3);

        let stored = state.history.get(&conv.id).unwrap();
        assert_eq!(stored.messages.len(), 4);
        assert_eq!(stored.messages[3].report_id.as_deref(), Some(report.id.as_str()));
        assert_eq!(stored.reports.len(), 1);
        assert_eq!(stored.reports[0].id, report.id);

        let Json(current) = current_report(State(state.clone())).await.unwrap();
        assert_eq!(current.id, report.id);
    }

    #[tokio::test]
    async fn test_concurrent_chats_keep_every_message() {
        let generator = Arc::new(ScriptedGenerator::texts(&["first answer", "second answer"]));
        let state = state_with(generator.clone(), Some("k"));
        let (_, Json(conv)) = create_conversation(State(state.clone())).await;

        let ask = |q: &str| ChatBody { question: q.into(), profile: None };
        let (a, b) = tokio::join!(
            state.chat(&conv.id, ask("question a")),
            state.chat(&conv.id, ask("question b"))
        );
        a.unwrap();
        b.unwrap();

        let stored = state.history.get(&conv.id).unwrap();
        let texts: Vec<&str> = stored.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["question a", "first answer", "question b", "second answer"]
        );
        // The second chat waits for the first and sees its turns as history.
        assert_eq!(generator.calls()[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_chat_validation() {
        let state = state_with(Arc::new(ScriptedGenerator::default()), None);
        let (_, Json(conv)) = create_conversation(State(state.clone())).await;

        assert!(matches!(
            state.chat(&conv.id, ChatBody { question: "  ".into(), profile: None }).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            state
                .chat(&conv.id, ChatBody { question: "hola".into(), profile: Some("x".into()) })
                .await,
            Err(ApiError::BadRequest(_))
        ));

        let outcome = state
            .chat(&conv.id, ChatBody { question: "hola".into(), profile: None })
            .await
            .unwrap();
        assert_eq!(outcome.messages[1].text, "Configure your API key in settings.");
        assert!(matches!(
            current_report(State(state)).await,
            Err(ApiError::ReportNotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let state = state_with(Arc::new(ScriptedGenerator::default()), Some("k"));
        let (_, Json(conv)) = create_conversation(State(state.clone())).await;

        let status = delete_conversation(State(state.clone()), Path(conv.id.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(matches!(
            delete_conversation(State(state), Path(conv.id)).await,
            Err(ApiError::ConversationNotFound(_))
        ));
    }
}
