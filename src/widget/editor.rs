use super::api_service::{ApiPayload, EditBackend};
use crate::error::{FalError, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorEventKind {
    TextChange,
    LoadingChange,
    ErrorChange,
    EditSuccess,
    EditError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    TextChange(String),
    LoadingChange(bool),
    ErrorChange(Option<String>),
    EditSuccess(ApiPayload),
    EditError(FalError),
}

impl EditorEvent {
    pub fn kind(&self) -> EditorEventKind {
        match self {
            EditorEvent::TextChange(_) => EditorEventKind::TextChange,
            EditorEvent::LoadingChange(_) => EditorEventKind::LoadingChange,
            EditorEvent::ErrorChange(_) => EditorEventKind::ErrorChange,
            EditorEvent::EditSuccess(_) => EditorEventKind::EditSuccess,
            EditorEvent::EditError(_) => EditorEventKind::EditError,
        }
    }
}

pub type Listener = Arc<dyn Fn(&EditorEvent) + Send + Sync>;

#[derive(Debug, Default)]
struct EditorState {
    text: String,
    loading: bool,
    error: Option<String>,
}

/// Text, loading and error state behind the edit form, with listeners
/// notified on every change.
pub struct TextEditor {
    backend: Arc<dyn EditBackend>,
    state: Mutex<EditorState>,
    listeners: Mutex<Vec<(EditorEventKind, Listener)>>,
    in_flight: AtomicBool,
}

impl TextEditor {
    pub fn new(backend: Arc<dyn EditBackend>, initial_text: impl Into<String>) -> Self {
        Self {
            backend,
            state: Mutex::new(EditorState {
                text: initial_text.into(),
                ..EditorState::default()
            }),
            listeners: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn text(&self) -> String {
        self.state().text.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.state().text = text.clone();
        self.emit(EditorEvent::TextChange(text));
    }

    fn set_loading(&self, loading: bool) {
        self.state().loading = loading;
        self.emit(EditorEvent::LoadingChange(loading));
    }

    fn set_error(&self, error: Option<String>) {
        self.state().error = error.clone();
        self.emit(EditorEvent::ErrorChange(error));
    }

    /// Sends the current text to the backend. A call made while another is
    /// pending fails with `Busy` and leaves the state untouched; blank text
    /// only sets the error. Loading is cleared even when the returned future
    /// is dropped before it completes.
    pub async fn handle_edit(&self) -> Result<ApiPayload> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FalError::Busy);
        }

        let text = self.text();
        if text.trim().is_empty() {
            self.in_flight.store(false, Ordering::SeqCst);
            let error = FalError::EmptyText;
            self.set_error(Some(error.to_string()));
            return Err(error);
        }

        let _pending = PendingEdit::begin(self);
        self.set_error(None);

        let result = self
            .backend
            .submit_edit(&text, Utc::now().timestamp_millis())
            .await;
        match &result {
            Ok(payload) => self.emit(EditorEvent::EditSuccess(payload.clone())),
            Err(e) => {
                self.set_error(Some(format!("Edit failed: {}", e)));
                self.emit(EditorEvent::EditError(e.clone()));
            }
        }
        result
    }

    pub fn on<F>(&self, kind: EditorEventKind, callback: F)
    where
        F: Fn(&EditorEvent) + Send + Sync + 'static,
    {
        self.listeners().push((kind, Arc::new(callback)));
    }

    pub fn destroy(&self) {
        self.listeners().clear();
    }

    fn emit(&self, event: EditorEvent) {
        // Snapshot so a callback may register further listeners.
        let callbacks: Vec<Listener> = self
            .listeners()
            .iter()
            .filter(|(kind, _)| *kind == event.kind())
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&event);
        }
    }

    fn state(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(EditorEventKind, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the in-flight flag for one edit and releases it, with the loading
/// state, when dropped.
struct PendingEdit<'a> {
    editor: &'a TextEditor,
}

impl<'a> PendingEdit<'a> {
    fn begin(editor: &'a TextEditor) -> Self {
        editor.set_loading(true);
        Self { editor }
    }
}

impl Drop for PendingEdit<'_> {
    fn drop(&mut self) {
        self.editor.set_loading(false);
        self.editor.in_flight.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::Notify;

    struct MockBackend {
        reply: Result<ApiPayload>,
        seen: Mutex<Vec<(String, i64)>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockBackend {
        fn replying(reply: Result<ApiPayload>) -> Self {
            Self {
                reply,
                seen: Mutex::new(Vec::new()),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl EditBackend for MockBackend {
        async fn submit_edit(&self, text: &str, timestamp_ms: i64) -> Result<ApiPayload> {
            self.seen.lock().unwrap().push((text.to_string(), timestamp_ms));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reply.clone()
        }
    }

    fn record_all(editor: &TextEditor) -> Arc<Mutex<Vec<EditorEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EditorEventKind::TextChange,
            EditorEventKind::LoadingChange,
            EditorEventKind::ErrorChange,
            EditorEventKind::EditSuccess,
            EditorEventKind::EditError,
        ] {
            let sink = events.clone();
            editor.on(kind, move |e| sink.lock().unwrap().push(e.clone()));
        }
        events
    }

    #[tokio::test]
    async fn test_blank_text_sets_error_without_request() {
        let backend = Arc::new(MockBackend::replying(Ok(ApiPayload::Text("x".into()))));
        let editor = TextEditor::new(backend.clone(), "   ");
        let events = record_all(&editor);

        let err = editor.handle_edit().await.unwrap_err();
        assert_eq!(err, FalError::EmptyText);
        assert_eq!(editor.error().as_deref(), Some("Please enter some text to edit"));
        assert!(backend.seen.lock().unwrap().is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec![EditorEvent::ErrorChange(Some("Please enter some text to edit".into()))]
        );
    }

    #[tokio::test]
    async fn test_success_event_order() {
        let reply = ApiPayload::Json(json!({"text": "HELLO"}));
        let backend = Arc::new(MockBackend::replying(Ok(reply.clone())));
        let editor = TextEditor::new(backend.clone(), "");
        let events = record_all(&editor);

        editor.set_text("hello");
        let payload = editor.handle_edit().await.unwrap();
        assert_eq!(payload, reply);
        assert!(!editor.is_loading());
        assert_eq!(editor.error(), None);
        assert_eq!(backend.seen.lock().unwrap()[0].0, "hello");
        assert!(backend.seen.lock().unwrap()[0].1 > 0);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                EditorEvent::TextChange("hello".into()),
                EditorEvent::LoadingChange(true),
                EditorEvent::ErrorChange(None),
                EditorEvent::EditSuccess(reply),
                EditorEvent::LoadingChange(false),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_sets_prefixed_error() {
        let failure = FalError::HttpStatus {
            status: 500,
            detail: "500 Internal Server Error".into(),
        };
        let backend = Arc::new(MockBackend::replying(Err(failure.clone())));
        let editor = TextEditor::new(backend, "fix me");
        let events = record_all(&editor);

        assert_eq!(editor.handle_edit().await.unwrap_err(), failure);
        assert_eq!(
            editor.error(),
            Some(format!("Edit failed: {}", failure))
        );
        let kinds: Vec<_> = events.lock().unwrap().iter().map(EditorEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EditorEventKind::LoadingChange,
                EditorEventKind::ErrorChange,
                EditorEventKind::ErrorChange,
                EditorEventKind::EditError,
                EditorEventKind::LoadingChange,
            ]
        );
    }

    #[tokio::test]
    async fn test_second_edit_while_pending_is_busy() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend {
            reply: Ok(ApiPayload::Text("ok".into())),
            seen: Mutex::new(Vec::new()),
            gate: Some(gate.clone()),
        });
        let editor = Arc::new(TextEditor::new(backend.clone(), "hello"));

        let first = {
            let editor = editor.clone();
            tokio::spawn(async move { editor.handle_edit().await })
        };
        while !editor.is_loading() {
            tokio::task::yield_now().await;
        }

        assert_eq!(editor.handle_edit().await.unwrap_err(), FalError::Busy);
        assert!(editor.is_loading());

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert!(!editor.is_loading());
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    /// Hangs on the first submission, answers every later one.
    struct HangsOnce {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EditBackend for HangsOnce {
        async fn submit_edit(&self, _text: &str, _timestamp_ms: i64) -> Result<ApiPayload> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(ApiPayload::Text("ok".into()))
        }
    }

    #[tokio::test]
    async fn test_cancelled_edit_releases_editor() {
        let backend = Arc::new(HangsOnce {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let editor = TextEditor::new(backend.clone(), "hello");
        let events = record_all(&editor);

        let cancelled =
            tokio::time::timeout(std::time::Duration::from_millis(50), editor.handle_edit()).await;
        assert!(cancelled.is_err());
        assert!(!editor.is_loading());
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&EditorEvent::LoadingChange(false))
        );

        let second = editor.handle_edit().await.unwrap();
        assert_eq!(second, ApiPayload::Text("ok".into()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_edit_while_pending_keeps_state() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend {
            reply: Ok(ApiPayload::Text("ok".into())),
            seen: Mutex::new(Vec::new()),
            gate: Some(gate.clone()),
        });
        let editor = Arc::new(TextEditor::new(backend, "hello"));

        let first = {
            let editor = editor.clone();
            tokio::spawn(async move { editor.handle_edit().await })
        };
        while !editor.is_loading() {
            tokio::task::yield_now().await;
        }

        editor.set_text("   ");
        assert_eq!(editor.handle_edit().await.unwrap_err(), FalError::Busy);
        assert_eq!(editor.error(), None);

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_destroy_clears_listeners() {
        let backend = Arc::new(MockBackend::replying(Ok(ApiPayload::Text("ok".into()))));
        let editor = TextEditor::new(backend, "");
        let events = record_all(&editor);
        editor.destroy();
        editor.set_text("after");
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(editor.text(), "after");
    }
}
