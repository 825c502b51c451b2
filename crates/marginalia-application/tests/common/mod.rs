#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use marginalia_application::{Orchestrator, OrchestratorBuilder, Selection};
use marginalia_core::error::{MarginaliaError, Result};
use marginalia_core::geometry::Rect;
use marginalia_core::host::{PageSnapshot, PanelRenderer, PanelView};
use marginalia_core::preference::PreferenceStore;
use marginalia_core::session::SessionId;
use marginalia_core::settings::Settings;
use marginalia_infrastructure::InMemoryPreferenceStore;
use marginalia_interaction::{FrameStream, StreamRequest, StreamingEndpoint};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Render(PanelView),
    Unmount(SessionId),
}

/// Records every render/unmount call in order.
#[derive(Default)]
pub struct RecordingRenderer {
    pub events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn unmounted(&self) -> Vec<SessionId> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Unmount(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn renders_of(&self, id: &SessionId) -> Vec<PanelView> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Render(view) if &view.session_id == id => Some(view.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_render(&self) -> Option<PanelView> {
        self.events.lock().unwrap().iter().rev().find_map(|e| match e {
            RenderEvent::Render(view) => Some(view.clone()),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl PanelRenderer for RecordingRenderer {
    fn render(&self, view: &PanelView) {
        self.events
            .lock()
            .unwrap()
            .push(RenderEvent::Render(view.clone()));
    }

    fn unmount(&self, session_id: &SessionId) {
        self.events
            .lock()
            .unwrap()
            .push(RenderEvent::Unmount(session_id.clone()));
    }
}

pub enum Script {
    Frames(Vec<String>),
    /// Notifies `opened` on open, then holds the frames back until
    /// `release` is notified.
    Gated {
        frames: Vec<String>,
        opened: Arc<Notify>,
        release: Arc<Notify>,
    },
    Fail(MarginaliaError),
}

/// Endpoint that plays back queued scripts; an empty queue answers with a
/// default result.
#[derive(Default)]
pub struct ScriptedEndpoint {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<StreamRequest>>,
    open_count: AtomicUsize,
}

impl ScriptedEndpoint {
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamingEndpoint for ScriptedEndpoint {
    async fn open(&self, request: &StreamRequest) -> Result<FrameStream> {
        self.requests.lock().unwrap().push(request.clone());
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Frames(pill_frames("Answer", "An explanation.")));

        match script {
            Script::Frames(frames) => Ok(futures::stream::iter(
                frames.into_iter().map(|f| Ok(f.into_bytes())),
            )
            .boxed()),
            Script::Gated {
                frames,
                opened,
                release,
            } => {
                opened.notify_one();
                Ok(futures::stream::once(async move {
                    release.notified().await;
                    frames
                })
                .flat_map(|frames| {
                    futures::stream::iter(frames.into_iter().map(|f| Ok(f.into_bytes())))
                })
                .boxed())
            }
            Script::Fail(err) => Err(err),
        }
    }
}

/// Wire frames for an inline result, split mid-token across two frames.
pub fn pill_frames(pill: &str, explanation: &str) -> Vec<String> {
    let body = serde_json::json!({
        "pillText": pill,
        "mode": "inline",
        "explanation": explanation,
    })
    .to_string();
    let (head, tail) = body.split_at(body.len() / 2);
    vec![data_frame(head), data_frame(tail), "data: [DONE]\n".to_string()]
}

pub fn data_frame(text: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "delta": { "text": text } }))
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub renderer: Arc<RecordingRenderer>,
    pub endpoint: Arc<ScriptedEndpoint>,
    pub preferences: Arc<InMemoryPreferenceStore>,
}

pub fn harness() -> Harness {
    harness_with(Settings::default(), |builder| builder)
}

pub fn harness_with<F>(settings: Settings, configure: F) -> Harness
where
    F: FnOnce(OrchestratorBuilder) -> OrchestratorBuilder,
{
    let renderer = Arc::new(RecordingRenderer::default());
    let endpoint = Arc::new(ScriptedEndpoint::default());
    let preferences = Arc::new(InMemoryPreferenceStore::new());

    let builder = OrchestratorBuilder::new(
        endpoint.clone(),
        renderer.clone(),
        preferences.clone() as Arc<dyn PreferenceStore>,
    )
    .settings(settings);
    let orchestrator = configure(builder).build().unwrap();

    Harness {
        orchestrator,
        renderer,
        endpoint,
        preferences,
    }
}

pub fn selection(text: &str, container: Option<&SessionId>) -> Selection {
    Selection {
        text: text.to_string(),
        anchor: Rect::new(100.0, 100.0, 80.0, 20.0),
        container: container.cloned(),
        page: PageSnapshot {
            url: "https://example.com/article".to_string(),
            title: "An Article".to_string(),
            body_text: "Some body text about entropy and information.".to_string(),
            selection: text.to_string(),
        },
    }
}

impl Harness {
    /// Confirms a selection and returns the created id.
    pub async fn open(&self, text: &str, container: Option<&SessionId>) -> SessionId {
        self.orchestrator
            .confirm_selection(selection(text, container))
            .await
            .unwrap()
            .session_id()
            .cloned()
            .expect("session created")
    }

    /// Opens a session whose initial request fails, so it is not auto-pinned.
    pub async fn open_unpinned(&self, text: &str, container: Option<&SessionId>) -> SessionId {
        self.endpoint
            .push(Script::Fail(MarginaliaError::transport(Some(503), "busy")));
        self.open(text, container).await
    }
}

/// A gated script plus its `opened` and `release` handles.
pub fn gated(frames: Vec<String>) -> (Script, Arc<Notify>, Arc<Notify>) {
    let opened = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    (
        Script::Gated {
            frames,
            opened: opened.clone(),
            release: release.clone(),
        },
        opened,
        release,
    )
}
