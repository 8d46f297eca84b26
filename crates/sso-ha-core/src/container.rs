//! Container collaborators consulted during inflation.
//!
//! The SSO core never owns application sessions. It asks the container
//! which application serves a context path, then asks that application's
//! session manager whether a session id is still live on this node.
//!
//! The in-memory implementations at the bottom back the CLI fixtures and
//! the test suite, and suit embedders that keep sessions in process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::LookupError;
use crate::snapshot::SessionBinding;

// =============================================================================
// Collaborator contracts
// =============================================================================

/// A live application session, owned by its session manager.
pub trait SessionHandle: Send + Sync {
    fn id(&self) -> &str;
    fn context_path(&self) -> &str;

    fn binding(&self) -> SessionBinding {
        SessionBinding::new(self.id(), self.context_path())
    }
}

/// Per-application session lookup.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// `Ok(None)` when the session is unknown here, e.g. its own replica has
    /// not arrived yet or it already expired.
    async fn find_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<dyn SessionHandle>>, LookupError>;
}

/// A deployed application.
pub trait Application: Send + Sync {
    fn context_path(&self) -> &str;
    fn session_manager(&self) -> Arc<dyn SessionManager>;
}

/// Maps context paths to the applications deployed on this node.
pub trait ContainerRegistry: Send + Sync {
    fn resolve_application(&self, context_path: &str) -> Option<Arc<dyn Application>>;
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// Session object held by [`InMemorySessionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSession {
    id: String,
    context_path: String,
}

impl LocalSession {
    #[must_use]
    pub fn new(id: impl Into<String>, context_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_path: context_path.into(),
        }
    }
}

impl SessionHandle for LocalSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn context_path(&self) -> &str {
        &self.context_path
    }
}

/// Session manager backed by a map.
#[derive(Debug)]
pub struct InMemorySessionManager {
    context_path: String,
    sessions: RwLock<HashMap<String, Arc<LocalSession>>>,
    outage: RwLock<Option<String>>,
}

impl InMemorySessionManager {
    #[must_use]
    pub fn new(context_path: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
            sessions: RwLock::new(HashMap::new()),
            outage: RwLock::new(None),
        }
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Create (or return the existing) session `id`.
    pub fn create_session(&self, id: impl Into<String>) -> Arc<LocalSession> {
        let id = id.into();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            sessions
                .entry(id.clone())
                .or_insert_with(|| Arc::new(LocalSession::new(id, self.context_path.clone()))),
        )
    }

    /// Returns `true` if the session existed.
    pub fn invalidate(&self, id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every lookup fail with [`LookupError::Unavailable`] until cleared
    /// with `None`.
    pub fn set_outage(&self, reason: Option<String>) {
        *self.outage.write().unwrap_or_else(|e| e.into_inner()) = reason;
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn find_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<dyn SessionHandle>>, LookupError> {
        if let Some(reason) = self
            .outage
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(LookupError::Unavailable(reason));
        }
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        Ok(sessions
            .get(session_id)
            .map(|s| Arc::clone(s) as Arc<dyn SessionHandle>))
    }
}

/// Application whose sessions live in an [`InMemorySessionManager`].
#[derive(Debug)]
pub struct InMemoryApplication {
    manager: Arc<InMemorySessionManager>,
}

impl InMemoryApplication {
    #[must_use]
    pub fn new(context_path: impl Into<String>) -> Self {
        Self {
            manager: Arc::new(InMemorySessionManager::new(context_path)),
        }
    }

    pub fn sessions(&self) -> &Arc<InMemorySessionManager> {
        &self.manager
    }
}

impl Application for InMemoryApplication {
    fn context_path(&self) -> &str {
        self.manager.context_path()
    }

    fn session_manager(&self) -> Arc<dyn SessionManager> {
        Arc::clone(&self.manager) as Arc<dyn SessionManager>
    }
}

/// Container with a fixed set of in-memory applications.
#[derive(Debug, Default)]
pub struct StaticContainer {
    apps: RwLock<HashMap<String, Arc<InMemoryApplication>>>,
}

impl StaticContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy (or return the already deployed) application at `context_path`
    /// and return its session manager.
    pub fn deploy(&self, context_path: impl Into<String>) -> Arc<InMemorySessionManager> {
        let context_path = context_path.into();
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        let app = apps
            .entry(context_path.clone())
            .or_insert_with(|| Arc::new(InMemoryApplication::new(context_path)));
        Arc::clone(app.sessions())
    }

    /// Returns `true` if an application was deployed at `context_path`.
    pub fn undeploy(&self, context_path: &str) -> bool {
        self.apps
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(context_path)
            .is_some()
    }

    pub fn context_paths(&self) -> Vec<String> {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        let mut paths: Vec<String> = apps.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl ContainerRegistry for StaticContainer {
    fn resolve_application(&self, context_path: &str) -> Option<Arc<dyn Application>> {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        apps.get(context_path)
            .map(|app| Arc::clone(app) as Arc<dyn Application>)
    }
}
