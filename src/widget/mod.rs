//! Async request wrapper and the text-editor state that drives it.

pub mod api_service;
pub mod editor;

pub use api_service::{ApiPayload, ApiService, EditBackend, RequestOptions, EDIT_ENDPOINT};
pub use editor::{EditorEvent, EditorEventKind, Listener, TextEditor};
