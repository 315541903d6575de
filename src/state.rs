use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use chrono::Duration;
use parking_lot::RwLock;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    context::{AuthContext, AuthState, ListenerId},
    editor::PageEditor,
    error::AuthError,
    gateway::SqliteGateway,
    models::PageType,
};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Anonymous client for public reads and booking inserts.
    pub public: Arc<SqliteGateway>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(db: SqlitePool, session_ttl: Duration) -> Self {
        Self {
            public: Arc::new(SqliteGateway::new(db.clone(), session_ttl)),
            sessions: Arc::new(SessionRegistry::new(db.clone(), session_ttl)),
            db,
        }
    }
}

/// One signed-in browser: its own gateway client, authorization context and
/// open editors.
pub struct AdminSession {
    pub token: String,
    pub gateway: Arc<SqliteGateway>,
    pub auth: Arc<AuthContext<SqliteGateway>>,
    pub editors: tokio::sync::Mutex<HashMap<PageType, PageEditor<SqliteGateway>>>,
    listener: ListenerId,
}

impl AdminSession {
    pub fn new_editor(&self) -> PageEditor<SqliteGateway> {
        PageEditor::new(Arc::clone(&self.gateway), Arc::clone(&self.auth))
    }
}

type SessionMap = RwLock<HashMap<String, Arc<AdminSession>>>;

pub struct SessionRegistry {
    db: SqlitePool,
    session_ttl: Duration,
    sessions: Arc<SessionMap>,
}

impl SessionRegistry {
    pub fn new(db: SqlitePool, session_ttl: Duration) -> Self {
        Self {
            db,
            session_ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Only admin sign-ins produce a session; anything else is torn down.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<AdminSession>, AuthError> {
        let gateway = Arc::new(SqliteGateway::new(self.db.clone(), self.session_ttl));
        let auth = AuthContext::start(Arc::clone(&gateway)).await;

        let identity = match auth.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(err) => {
                auth.shutdown();
                return Err(err);
            }
        };

        let token = new_id();
        let listener = auth.subscribe({
            let sessions: Weak<SessionMap> = Arc::downgrade(&self.sessions);
            let token = token.clone();
            move |state| {
                if *state != AuthState::Anonymous {
                    return;
                }
                log::info!("Admin session for {} ended", identity.email);
                if let Some(sessions) = sessions.upgrade() {
                    sessions.write().remove(&token);
                }
            }
        });
        let session = Arc::new(AdminSession {
            token,
            gateway,
            auth,
            editors: tokio::sync::Mutex::new(HashMap::new()),
            listener,
        });
        self.sessions
            .write()
            .insert(session.token.clone(), Arc::clone(&session));

        // Expired before it was registered; the listener found nothing to remove.
        if !session.auth.is_admin() {
            self.sessions.write().remove(&session.token);
            return Err(AuthError::NotAuthorized);
        }
        Ok(session)
    }

    /// Live admin session for `token`. Sessions leave the registry as soon as
    /// their context drops to anonymous; the check here covers the gap.
    pub fn resolve(&self, token: &str) -> Option<Arc<AdminSession>> {
        let session = self.sessions.read().get(token).cloned()?;
        if session.auth.is_admin() {
            return Some(session);
        }
        if let Some(stale) = self.sessions.write().remove(token) {
            stale.auth.shutdown();
        }
        None
    }

    pub async fn sign_out(&self, token: &str) {
        let removed = self.sessions.write().remove(token);
        if let Some(session) = removed {
            session.auth.unsubscribe(session.listener);
            session.auth.sign_out().await;
            session.auth.shutdown();
        }
    }

    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<AdminSession>> =
            self.sessions.write().drain().map(|(_, session)| session).collect();
        for session in sessions {
            session.auth.sign_out().await;
            session.auth.shutdown();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
