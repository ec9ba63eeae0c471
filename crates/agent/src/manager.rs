//! Session management
//!
//! Creates one actor per participant, tracks the handles and reaps actors
//! that have stopped (disconnect, inactivity timeout, shutdown).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use skyvoice_config::Settings;
use skyvoice_core::SessionId;
use skyvoice_pipeline::SpeechPipeline;
use skyvoice_tools::{CircuitState, FlightSearch, FlightSearchTool, ResilientFlightSearch};
use skyvoice_transport::Transport;

use crate::metrics;
use crate::session::{SessionActor, SessionEnd, SessionHandle};
use crate::AgentError;

struct ManagedSession {
    handle: SessionHandle,
    task: JoinHandle<SessionEnd>,
}

impl ManagedSession {
    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Session manager
pub struct SessionManager {
    settings: Settings,
    search: Arc<ResilientFlightSearch>,
    /// Shared by all sessions
    tool: Arc<FlightSearchTool>,
    sessions: RwLock<HashMap<SessionId, ManagedSession>>,
}

impl SessionManager {
    /// Wrap `search` in the resilient layer and share it across sessions
    pub fn new(settings: Settings, search: Arc<dyn FlightSearch>) -> Self {
        metrics::register_default_metrics();
        let search = Arc::new(ResilientFlightSearch::new(search, settings.tool.clone()));
        Self {
            tool: Arc::new(FlightSearchTool::new(search.clone())),
            search,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tool(&self) -> &Arc<FlightSearchTool> {
        &self.tool
    }

    /// Breaker state of the shared flight search
    pub fn circuit_state(&self) -> CircuitState {
        self.search.circuit_state()
    }

    /// Start a periodic task that reaps stopped sessions
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.settings.session.cleanup_interval();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_finished();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = manager.count(),
                                "Session cleanup"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Spawn a session actor for a new participant
    pub fn create(
        &self,
        transport: Arc<dyn Transport>,
        pipeline: Arc<dyn SpeechPipeline>,
    ) -> Result<SessionHandle, AgentError> {
        let max_sessions = self.settings.session.max_sessions;
        let mut sessions = self.sessions.write();

        if sessions.len() >= max_sessions {
            Self::reap(&mut sessions);
            if sessions.len() >= max_sessions {
                return Err(AgentError::Capacity(max_sessions));
            }
        }

        let id = SessionId::new();
        let (actor, handle) = SessionActor::new(
            id.clone(),
            &self.settings,
            transport,
            pipeline,
            Arc::clone(&self.tool),
        )?;
        let task = tokio::spawn(actor.run());

        sessions.insert(
            id.clone(),
            ManagedSession {
                handle: handle.clone(),
                task,
            },
        );
        metrics::record_active_sessions(sessions.len());
        tracing::info!(session_id = %id, "Created session");

        Ok(handle)
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(id).map(|s| s.handle.clone())
    }

    /// Stop a session and forget it
    pub async fn remove(&self, id: &SessionId) -> Result<(), AgentError> {
        let removed = {
            let mut sessions = self.sessions.write();
            let removed = sessions.remove(id);
            metrics::record_active_sessions(sessions.len());
            removed
        };

        let session = removed.ok_or_else(|| AgentError::NotFound(id.to_string()))?;
        if !session.is_finished() {
            // Already stopped actors drop the command; nothing to do then
            let _ = session.handle.shutdown().await;
        }
        tracing::info!(session_id = %id, "Removed session");
        Ok(())
    }

    /// Active session count
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Drop sessions whose actor has stopped; returns how many were removed
    pub fn cleanup_finished(&self) -> usize {
        let mut sessions = self.sessions.write();
        let removed = Self::reap(&mut sessions);
        metrics::record_active_sessions(sessions.len());
        removed
    }

    fn reap(sessions: &mut HashMap<SessionId, ManagedSession>) -> usize {
        let finished: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &finished {
            sessions.remove(id);
            tracing::debug!(session_id = %id, "Reaped stopped session");
        }
        finished.len()
    }
}
