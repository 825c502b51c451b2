//! Orchestrator: the host-facing entry point.
//!
//! Wires selection events to session creation, dispatches requests to the
//! streaming endpoint and routes results back into the session graph.
//!
//! # Concurrency
//!
//! All mutable state (graph, stacking counter, controllers) sits behind one
//! async mutex. The lock is never held across the streaming request itself:
//! a request snapshots what it needs, releases the lock, streams, then
//! re-acquires the lock to commit. If the session was closed meanwhile the
//! result is dropped.
//!
//! # Rendering
//!
//! Lifecycle events of a request (start, append, completion, failure)
//! re-render only the front-most session. Creation, geometry changes, pin
//! changes and bring-to-front render the affected panels directly.

use crate::controller::{PanelLayout, SessionController};
use crate::selection::{HypertextInstruction, RequestOutcome, Selection, SelectionOutcome};
use async_trait::async_trait;
use futures::StreamExt;
use marginalia_core::error::{MarginaliaError, Result};
use marginalia_core::geometry::{GestureKind, Position, Rect, Surface};
use marginalia_core::graph::{DetachOptions, SessionGraph};
use marginalia_core::host::{ContextOptions, ContextProvider, PanelRenderer};
use marginalia_core::panel::PanelState;
use marginalia_core::preference::{PreferenceStore, TextSize, save_text_size};
use marginalia_core::scheduler::{AutoCloseScheduler, AutoCloseTarget};
use marginalia_core::session::{
    Message, PillResult, PillStatus, RequestKind, Session, SessionId,
};
use marginalia_core::settings::Settings;
use marginalia_core::stacking::ZIndexStackCoordinator;
use marginalia_interaction::{
    StreamRequest, StreamingEndpoint, StreamingResponseParser, build_request,
    initial_user_message, resolve_context,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Close that is refused while any session in the subtree is pinned.
const SOFT_CLOSE: DetachOptions = DetachOptions {
    cascade: true,
    force: false,
};

struct State {
    graph: SessionGraph,
    stack: ZIndexStackCoordinator,
    controllers: HashMap<SessionId, SessionController>,
    surface: Surface,
    current_selection: Option<Selection>,
}

struct Inner {
    state: Mutex<State>,
    endpoint: Arc<dyn StreamingEndpoint>,
    renderer: Arc<dyn PanelRenderer>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    preferences: Arc<dyn PreferenceStore>,
    settings: Settings,
    scheduler: AutoCloseScheduler,
}

enum Request {
    Initial,
    FollowUp(String),
    Regenerate,
}

impl Request {
    fn kind(&self) -> RequestKind {
        match self {
            Request::Initial => RequestKind::Initial,
            Request::FollowUp(_) => RequestKind::FollowUp,
            Request::Regenerate => RequestKind::Regenerate,
        }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    settings: Settings,
    endpoint: Arc<dyn StreamingEndpoint>,
    renderer: Arc<dyn PanelRenderer>,
    preferences: Arc<dyn PreferenceStore>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    surface: Surface,
}

impl OrchestratorBuilder {
    pub fn new(
        endpoint: Arc<dyn StreamingEndpoint>,
        renderer: Arc<dyn PanelRenderer>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            settings: Settings::default(),
            endpoint,
            renderer,
            preferences,
            context_provider: None,
            surface: Surface::default(),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    /// # Errors
    ///
    /// `Config` if the settings fail validation.
    pub fn build(self) -> Result<Orchestrator> {
        self.settings.validate()?;
        let base_z = self.settings.panel.base_z_index;
        Ok(Orchestrator {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    graph: SessionGraph::new(),
                    stack: ZIndexStackCoordinator::new(base_z),
                    controllers: HashMap::new(),
                    surface: self.surface,
                    current_selection: None,
                }),
                endpoint: self.endpoint,
                renderer: self.renderer,
                context_provider: self.context_provider,
                preferences: self.preferences,
                settings: self.settings,
                scheduler: AutoCloseScheduler::new(),
            }),
        })
    }
}

/// Host-facing coordinator of every open annotation session.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// Handle handed to a host keybinding system.
///
/// Holds the orchestrator weakly; firing after the orchestrator is dropped
/// does nothing.
#[derive(Clone)]
pub struct ExternalTrigger {
    inner: Weak<Inner>,
}

impl ExternalTrigger {
    /// Re-runs the "confirm current selection" flow.
    pub async fn fire(&self) -> Result<SelectionOutcome> {
        match self.inner.upgrade() {
            Some(inner) => Orchestrator { inner }.trigger_from_external().await,
            None => Ok(SelectionOutcome::Ignored),
        }
    }
}

impl Orchestrator {
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    // ------------------------------------------------------------------
    // Session creation
    // ------------------------------------------------------------------

    /// Creates a session for a confirmed selection and runs its initial
    /// request.
    ///
    /// The session is nested under `selection.container` when that session
    /// is still open. Request failures are recorded on the session, so the
    /// outcome is `Created` even when the request failed.
    ///
    /// # Returns
    ///
    /// - `Created(id)` once the initial request has finished
    /// - `NestingLimitReached` when nesting would exceed the depth limit; no
    ///   session is created
    /// - `Ignored` for an empty selection
    pub async fn confirm_selection(&self, selection: Selection) -> Result<SelectionOutcome> {
        let outcome = self.create_session(selection, true).await?;
        self.run_initial(&outcome).await;
        Ok(outcome)
    }

    /// Non-nested fallback offered after `NestingLimitReached`: creates a
    /// root session for the same selection.
    pub async fn confirm_selection_unnested(
        &self,
        selection: Selection,
    ) -> Result<SelectionOutcome> {
        let outcome = self.create_session(selection, false).await?;
        self.run_initial(&outcome).await;
        Ok(outcome)
    }

    /// Records the selection that [`trigger_from_external`](Self::trigger_from_external)
    /// will confirm.
    pub async fn set_current_selection(&self, selection: Option<Selection>) {
        self.inner.state.lock().await.current_selection = selection;
    }

    /// Confirms the current selection, as the panel's button would.
    pub async fn trigger_from_external(&self) -> Result<SelectionOutcome> {
        let selection = self.inner.state.lock().await.current_selection.clone();
        match selection {
            Some(selection) => self.confirm_selection(selection).await,
            None => {
                tracing::debug!("[Orchestrator] External trigger without a selection");
                Ok(SelectionOutcome::Ignored)
            }
        }
    }

    pub fn external_trigger(&self) -> ExternalTrigger {
        ExternalTrigger {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Passes an [`ExternalTrigger`] to a host-supplied registration hook.
    pub fn register_external_trigger<F>(&self, register: F)
    where
        F: FnOnce(ExternalTrigger),
    {
        register(self.external_trigger());
    }

    /// Opens sessions that already carry a result. No request is made.
    ///
    /// # Returns
    ///
    /// Ids of the created sessions, in instruction order.
    pub async fn apply_hypertext(
        &self,
        instructions: Vec<HypertextInstruction>,
    ) -> Result<Vec<SessionId>> {
        let mut guard = self.inner.state.lock().await;
        let window = self.inner.settings.message_window;

        let mut ids = Vec::with_capacity(instructions.len());
        for instruction in instructions {
            let mut session = Session::new(instruction.subject.trim(), "");
            session.record_result(instruction.result, window);
            session.has_completed_initial = true;
            ids.push(self.inner.mount_locked(&mut guard, session, None, instruction.anchor)?);
        }
        tracing::info!("[Orchestrator] Applied {} hypertext annotation(s)", ids.len());
        Ok(ids)
    }

    async fn create_session(
        &self,
        selection: Selection,
        allow_nesting: bool,
    ) -> Result<SelectionOutcome> {
        let subject = selection.text.trim();
        if subject.is_empty() {
            return Ok(SelectionOutcome::Ignored);
        }

        let mut guard = self.inner.state.lock().await;
        let parent = if allow_nesting {
            match selection.container {
                Some(container) if guard.graph.contains(&container) => Some(container),
                Some(container) => {
                    tracing::debug!(
                        "[Orchestrator] Container {} is gone, creating a root session",
                        container
                    );
                    None
                }
                None => None,
            }
        } else {
            None
        };

        let draft = Session::new(subject, "");
        let settings = &self.inner.settings;
        let context = resolve_context(
            self.inner.context_provider.as_deref(),
            &draft,
            &selection.page,
            ContextOptions {
                truncate_context: settings.truncate_context,
            },
            settings.context_char_budget,
        );
        let session = draft.with_context(context);

        let mounted = self
            .inner
            .mount_locked(&mut guard, session, parent.as_ref(), selection.anchor);
        match (mounted, parent) {
            (Ok(id), _) => Ok(SelectionOutcome::Created(id)),
            (Err(MarginaliaError::NestingLimitExceeded { level, .. }), Some(parent)) => {
                tracing::info!(
                    "[Orchestrator] Nesting limit reached under {} (level {})",
                    parent,
                    level
                );
                Ok(SelectionOutcome::NestingLimitReached { parent, level })
            }
            (Err(e), _) => Err(e),
        }
    }

    async fn run_initial(&self, outcome: &SelectionOutcome) {
        if let SelectionOutcome::Created(id) = outcome {
            if let Err(e) = self.run_request(id, Request::Initial).await {
                tracing::debug!("[Orchestrator] Initial request for {} skipped: {}", id, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Sends a composer message.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the session is not open
    /// - `SessionBusy` if a request is already in flight
    pub async fn send_follow_up(&self, id: &SessionId, text: &str) -> Result<RequestOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(RequestOutcome::Ignored);
        }
        self.run_request(id, Request::FollowUp(text.to_string())).await
    }

    /// Sends the session's current draft.
    pub async fn send_draft(&self, id: &SessionId) -> Result<RequestOutcome> {
        let draft = {
            let guard = self.inner.state.lock().await;
            guard
                .graph
                .get(id)
                .map(|s| s.draft.clone())
                .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?
        };
        self.send_follow_up(id, &draft).await
    }

    /// Drops the most recent answer and re-issues the last user message.
    pub async fn regenerate(&self, id: &SessionId) -> Result<RequestOutcome> {
        self.run_request(id, Request::Regenerate).await
    }

    async fn run_request(&self, id: &SessionId, request: Request) -> Result<RequestOutcome> {
        let kind = request.kind();
        let window = self.inner.settings.message_window;

        let (wire, completes_initial) = {
            let mut guard = self.inner.state.lock().await;
            let st = &mut *guard;
            let session = st
                .graph
                .get_mut(id)
                .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?;
            if session.is_streaming {
                return Err(MarginaliaError::SessionBusy {
                    session_id: id.to_string(),
                });
            }

            match request {
                Request::Initial => {
                    let content = initial_user_message(session.subject());
                    session.push_message(Message::user(content), window);
                }
                Request::FollowUp(text) => {
                    session.push_message(Message::user(text), window);
                    session.draft.clear();
                }
                Request::Regenerate => {
                    if session.last_user_content().is_none() {
                        return Err(MarginaliaError::not_found("user message", id.as_str()));
                    }
                    session.pop_last_assistant();
                }
            }

            // A regenerate of a thread holding only the first question
            // stands in for the initial request.
            let user_messages = session.messages.iter().filter(|m| !m.is_assistant()).count();
            let completes_initial = !session.has_completed_initial
                && (kind == RequestKind::Initial
                    || (kind == RequestKind::Regenerate && user_messages == 1));

            session.is_streaming = true;
            session.pill_status = PillStatus::Loading;
            let wire = build_request(session, session.context(), &self.inner.settings);

            if let Some(controller) = st.controllers.get_mut(id) {
                controller.begin_request();
            }
            self.inner.render_front(st);
            tracing::debug!("[Orchestrator] {:?} request started for {}", kind, id);
            (wire, completes_initial)
        };

        let result = self.stream(id, &wire).await;

        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let Some(session) = st.graph.get_mut(id) else {
            tracing::warn!("[Orchestrator] {}", MarginaliaError::stale(id.as_str()));
            return Ok(RequestOutcome::Discarded);
        };

        session.is_streaming = false;
        let outcome = match result {
            Ok(pill) => {
                session.record_result(pill.clone(), window);
                RequestOutcome::Completed(pill)
            }
            Err(e) => {
                let text = e.to_string();
                tracing::warn!("[Orchestrator] {:?} request for {} failed: {}", kind, id, text);
                session.record_error(&text, window);
                RequestOutcome::Failed(text)
            }
        };

        let succeeded = matches!(outcome, RequestOutcome::Completed(_));
        let auto_pin = completes_initial && succeeded && !session.is_pinned;
        if completes_initial && succeeded {
            session.has_completed_initial = true;
        }
        if auto_pin {
            st.graph.set_pinned(id, true)?;
            self.inner.scheduler.cancel(id);
            tracing::info!("[Orchestrator] Auto-pinned {}", id);
        }

        if let Some(controller) = st.controllers.get_mut(id) {
            controller.end_request();
            if auto_pin {
                controller.sync_pinned(true);
            }
        }
        self.inner.render_front(st);
        Ok(outcome)
    }

    /// Opens the stream and feeds every frame to the parser in arrival order.
    async fn stream(&self, id: &SessionId, request: &StreamRequest) -> Result<PillResult> {
        let mut frames = self.inner.endpoint.open(request).await?;
        let mut parser = StreamingResponseParser::new();

        while let Some(frame) = frames.next().await {
            let done = parser.push_frame(&frame?);
            self.on_append(id, parser.accumulated()).await;
            if done {
                break;
            }
        }
        tracing::trace!("[Stream] {} frame(s) for {}", parser.frames_seen(), id);
        parser.finish()
    }

    async fn on_append(&self, id: &SessionId, text: &str) {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        if let Some(controller) = st.controllers.get_mut(id) {
            controller.append_streaming_text(text);
            self.inner.render_front(st);
        }
    }

    // ------------------------------------------------------------------
    // Panel interaction
    // ------------------------------------------------------------------

    pub async fn set_draft(&self, id: &SessionId, draft: &str) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let session = guard
            .graph
            .get_mut(id)
            .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?;
        session.draft = draft.to_string();
        Ok(())
    }

    /// Flips the pin and returns the new value.
    pub async fn toggle_pin(&self, id: &SessionId) -> Result<bool> {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let pinned = !st
            .graph
            .get(id)
            .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?
            .is_pinned;

        st.graph.set_pinned(id, pinned)?;
        if let Some(controller) = st.controllers.get_mut(id) {
            controller.set_pinned(pinned);
        }
        if pinned {
            self.inner.scheduler.cancel(id);
        }
        tracing::debug!("[Orchestrator] {} pinned={}", id, pinned);
        self.inner.render(st, id);
        Ok(pinned)
    }

    /// Closes a session and its descendants.
    ///
    /// A forced close ignores every pin. A normal close is refused while the
    /// target or any of its descendants is pinned.
    ///
    /// # Returns
    ///
    /// Closed ids in detach order (children before parents).
    pub async fn close(&self, id: &SessionId, force: bool) -> Result<Vec<SessionId>> {
        let options = if force {
            DetachOptions::forced()
        } else {
            SOFT_CLOSE
        };
        let mut guard = self.inner.state.lock().await;
        self.inner.close_locked(&mut guard, id, options)
    }

    /// Raises a session and returns its new z-index.
    pub async fn bring_to_front(&self, id: &SessionId) -> Result<i64> {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let z = st
            .stack
            .bring_to_front(&mut st.graph, id)
            .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?;

        for (other, controller) in st.controllers.iter_mut() {
            if other != id {
                controller.deactivate();
            }
        }
        if let Some(controller) = st.controllers.get_mut(id) {
            controller.activate();
        }

        // Settling may have moved the whole chain.
        let mut affected = st.graph.ancestors(id);
        affected.extend(st.graph.descendants(id));
        affected.push(id.clone());
        for session_id in &affected {
            self.inner.render(st, session_id);
        }
        Ok(z)
    }

    pub async fn pointer_enter(&self, id: &SessionId) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let controller = guard
            .controllers
            .get_mut(id)
            .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?;
        controller.pointer_enter();
        self.inner.scheduler.cancel(id);
        Ok(())
    }

    /// Arms the auto-close timer unless the session is pinned or mid-gesture.
    pub async fn pointer_leave(&self, id: &SessionId) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let (Some(session), Some(controller)) = (st.graph.get(id), st.controllers.get_mut(id))
        else {
            return Err(MarginaliaError::not_found("session", id.as_str()));
        };
        controller.pointer_leave();
        if session.is_pinned || controller.is_gesture_active() {
            return Ok(());
        }

        let target: Arc<dyn AutoCloseTarget> = self.inner.clone();
        self.inner.scheduler.schedule(
            id.clone(),
            self.inner.settings.auto_close_delay(),
            Arc::downgrade(&target),
        );
        Ok(())
    }

    /// Starts a drag or resize. Any other panel's gesture is dropped, since
    /// pointer capture is exclusive.
    pub async fn begin_gesture(
        &self,
        id: &SessionId,
        kind: GestureKind,
        pointer: Position,
    ) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let layout = self.inner.layout(st.surface);
        let session = st
            .graph
            .get(id)
            .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?;

        for (other, controller) in st.controllers.iter_mut() {
            if other != id && controller.is_gesture_active() {
                controller.release();
            }
        }
        let controller = st
            .controllers
            .get_mut(id)
            .ok_or_else(|| MarginaliaError::not_found("controller", id.as_str()))?;
        controller.begin_gesture(kind, pointer, session, &layout);
        Ok(())
    }

    /// Applies a pointer move. `None` when no gesture is active.
    pub async fn update_gesture(&self, id: &SessionId, pointer: Position) -> Result<Option<Rect>> {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let layout = self.inner.layout(st.surface);
        let (Some(session), Some(controller)) = (st.graph.get_mut(id), st.controllers.get_mut(id))
        else {
            return Err(MarginaliaError::not_found("session", id.as_str()));
        };

        let rect = controller.update_gesture(pointer, session, &layout);
        if rect.is_some() {
            self.inner.render(st, id);
        }
        Ok(rect)
    }

    /// Ends the gesture and persists the final geometry on the session.
    pub async fn end_gesture(&self, id: &SessionId) -> Result<Option<Rect>> {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let (Some(session), Some(controller)) = (st.graph.get_mut(id), st.controllers.get_mut(id))
        else {
            return Err(MarginaliaError::not_found("session", id.as_str()));
        };

        let rect = controller.end_gesture(session);
        if let Some(rect) = rect {
            tracing::debug!("[Orchestrator] {} placed at {:?}", id, rect);
            self.inner.render(st, id);
        }
        Ok(rect)
    }

    /// Moves a panel's anchor; unfrozen panels follow it.
    pub async fn update_anchor(&self, id: &SessionId, anchor: Rect) -> Result<bool> {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        let layout = self.inner.layout(st.surface);
        let (Some(session), Some(controller)) = (st.graph.get_mut(id), st.controllers.get_mut(id))
        else {
            return Err(MarginaliaError::not_found("session", id.as_str()));
        };

        let moved = controller.update_anchor(anchor, session, &layout);
        if moved {
            self.inner.render(st, id);
        }
        Ok(moved)
    }

    /// Replaces the render surface and re-clamps every open panel.
    pub async fn set_surface(&self, surface: Surface) {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        st.surface = surface;
        let layout = self.inner.layout(surface);

        let mut moved = Vec::new();
        for (id, controller) in st.controllers.iter_mut() {
            if let Some(session) = st.graph.get_mut(id) {
                if controller.fit_to_surface(session, &layout) {
                    moved.push(id.clone());
                }
            }
        }
        for id in &moved {
            self.inner.render(st, id);
        }
    }

    /// Persists the text size and applies it to every open panel.
    pub async fn set_text_size(&self, text_size: TextSize) -> Result<()> {
        save_text_size(self.inner.preferences.as_ref(), text_size)?;

        let mut guard = self.inner.state.lock().await;
        for controller in guard.controllers.values_mut() {
            controller.set_text_size(text_size);
        }
        self.inner.render_front(&guard);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection and teardown
    // ------------------------------------------------------------------

    /// Snapshot of every open session in creation order.
    pub async fn get_sessions(&self) -> Vec<Session> {
        self.inner.state.lock().await.graph.iter().cloned().collect()
    }

    pub async fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.inner.state.lock().await.graph.get(id).cloned()
    }

    /// Open session ids, bottom to top.
    pub async fn stacking_order(&self) -> Vec<SessionId> {
        let guard = self.inner.state.lock().await;
        guard.stack.stacking_order(&guard.graph)
    }

    pub async fn panel_state(&self, id: &SessionId) -> Option<PanelState> {
        self.inner
            .state
            .lock()
            .await
            .controllers
            .get(id)
            .map(|c| c.state())
    }

    pub fn is_auto_close_armed(&self, id: &SessionId) -> bool {
        self.inner.scheduler.is_armed(id)
    }

    pub fn armed_timer_count(&self) -> usize {
        self.inner.scheduler.armed_count()
    }

    /// Releases every timer, pointer capture, controller and session.
    ///
    /// Requests still in flight finish as discarded writes.
    pub async fn destroy(&self) {
        let mut guard = self.inner.state.lock().await;
        let st = &mut *guard;
        self.inner.scheduler.cancel_all();

        for id in st.graph.ids().into_iter().rev() {
            if let Some(mut controller) = st.controllers.remove(&id) {
                controller.release();
                controller.hide();
            }
            self.inner.renderer.unmount(&id);
        }
        // Controllers without a session should not exist, but never leak one.
        for (id, mut controller) in st.controllers.drain() {
            controller.release();
            self.inner.renderer.unmount(&id);
        }

        let removed = st.graph.clear();
        st.current_selection = None;
        tracing::info!("[Orchestrator] Destroyed ({} session(s) released)", removed.len());
    }
}

impl Inner {
    fn layout(&self, surface: Surface) -> PanelLayout {
        PanelLayout {
            engine: self.settings.position_engine(),
            limits: self.settings.size_limits(),
            default_size: self.settings.default_panel_size(),
            surface,
        }
    }

    fn render(&self, st: &State, id: &SessionId) {
        if let (Some(session), Some(controller)) = (st.graph.get(id), st.controllers.get(id)) {
            self.renderer.render(&controller.view(session));
        }
    }

    fn render_front(&self, st: &State) {
        if let Some(front) = st.stack.front_most(&st.graph) {
            self.render(st, &front);
        }
    }

    /// Attaches, stacks, then mounts a session. The z-index is computed
    /// before the panel is shown.
    fn mount_locked(
        &self,
        st: &mut State,
        session: Session,
        parent: Option<&SessionId>,
        anchor: Rect,
    ) -> Result<SessionId> {
        let id = st.graph.attach(session, parent)?;

        // The parent was auto-pinned to host the child.
        if let Some(parent_id) = parent {
            let pinned = st.graph.get(parent_id).is_some_and(|p| p.is_pinned);
            if let Some(controller) = st.controllers.get_mut(parent_id) {
                controller.sync_pinned(pinned);
            }
            self.scheduler.cancel(parent_id);
        }

        st.stack.bring_to_front(&mut st.graph, &id);

        let layout = self.layout(st.surface);
        let mut controller = SessionController::new(id.clone(), anchor, self.preferences.as_ref());
        if let Some(session) = st.graph.get_mut(&id) {
            controller.show(session, &layout);
        }
        for other in st.controllers.values_mut() {
            other.deactivate();
        }
        st.controllers.insert(id.clone(), controller);

        let level = st.graph.get(&id).map_or(0, |s| s.nesting_level);
        tracing::info!("[Orchestrator] Created session {} (level {})", id, level);
        self.render(st, &id);
        Ok(id)
    }

    fn close_locked(
        &self,
        st: &mut State,
        id: &SessionId,
        options: DetachOptions,
    ) -> Result<Vec<SessionId>> {
        let parent_id = st.graph.get(id).and_then(|s| s.parent_session_id.clone());
        let removed = st.graph.detach(id, options)?;

        let ids: Vec<SessionId> = removed.into_iter().map(|s| s.id).collect();
        for closed in &ids {
            self.scheduler.cancel(closed);
            if let Some(mut controller) = st.controllers.remove(closed) {
                controller.hide();
            }
            self.renderer.unmount(closed);
        }

        // The parent's pin may have been restored.
        if let Some(parent_id) = parent_id {
            if let (Some(parent), Some(controller)) =
                (st.graph.get(&parent_id), st.controllers.get_mut(&parent_id))
            {
                controller.sync_pinned(parent.is_pinned);
            }
        }

        tracing::info!("[Orchestrator] Closed {} ({} session(s))", id, ids.len());
        self.render_front(st);
        Ok(ids)
    }

    /// A soft close takes the whole subtree, so any pinned, hovered or
    /// dragged panel in it keeps the target open.
    fn close_suppressed_locked(st: &State, id: &SessionId) -> bool {
        if !st.graph.contains(id) {
            // Already gone: nothing to close.
            return true;
        }
        std::iter::once(id.clone())
            .chain(st.graph.descendants(id))
            .any(|sid| match (st.graph.get(&sid), st.controllers.get(&sid)) {
                (Some(session), Some(controller)) => controller.is_close_suppressed(session),
                (Some(session), None) => session.is_pinned,
                (None, _) => false,
            })
    }
}

#[async_trait]
impl AutoCloseTarget for Inner {
    async fn is_close_suppressed(&self, id: &SessionId) -> bool {
        let guard = self.state.lock().await;
        Self::close_suppressed_locked(&guard, id)
    }

    async fn auto_close(&self, id: &SessionId) {
        let mut guard = self.state.lock().await;
        // Conditions may have changed since the suppression check.
        if Self::close_suppressed_locked(&guard, id) {
            return;
        }
        if let Err(e) = self.close_locked(&mut guard, id, SOFT_CLOSE) {
            tracing::debug!("[AutoClose] {} not closed: {}", id, e);
        }
    }
}
