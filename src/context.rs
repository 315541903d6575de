//! Authorization context: who is signed in and whether they hold an admin
//! grant. State only changes through the methods here; every change is
//! pushed to subscribers synchronously.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::{
    error::{AuthError, GatewayError},
    gateway::{Gateway, SessionEvent},
    models::AuthIdentity,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "identity", rename_all = "snake_case")]
pub enum AuthState {
    Anonymous,
    AuthenticatedNonAdmin(AuthIdentity),
    AuthenticatedAdmin(AuthIdentity),
}

impl AuthState {
    pub fn identity(&self) -> Option<&AuthIdentity> {
        match self {
            AuthState::Anonymous => None,
            AuthState::AuthenticatedNonAdmin(identity) | AuthState::AuthenticatedAdmin(identity) => {
                Some(identity)
            }
        }
    }
}

pub type ListenerId = u64;

type Listener = Box<dyn Fn(&AuthState) + Send + Sync>;

const STATE_CHANNEL_CAPACITY: usize = 8;

pub struct AuthContext<G: Gateway> {
    gateway: Arc<G>,
    state: RwLock<AuthState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: Mutex<ListenerId>,
    changes: broadcast::Sender<AuthState>,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

impl<G: Gateway + 'static> AuthContext<G> {
    /// Builds the context from the gateway's current session and starts
    /// listening to its session-change channel.
    pub async fn start(gateway: Arc<G>) -> Arc<Self> {
        let context = Arc::new(Self::new(gateway));
        context.restore().await;
        context.spawn_session_listener();
        context
    }

    fn new(gateway: Arc<G>) -> Self {
        let (changes, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            gateway,
            state: RwLock::new(AuthState::Anonymous),
            listeners: Mutex::new(Vec::new()),
            next_listener: Mutex::new(0),
            changes,
            session_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.read().clone()
    }

    /// Advisory only; writes are re-checked by the gateway's row policy.
    pub fn is_admin(&self) -> bool {
        matches!(*self.state.read(), AuthState::AuthenticatedAdmin(_))
    }

    pub fn identity(&self) -> Option<AuthIdentity> {
        self.state.read().identity().cloned()
    }

    /// Listeners run on the thread that changed the state and must not
    /// subscribe or unsubscribe from inside the callback.
    pub fn subscribe(&self, listener: impl Fn(&AuthState) + Send + Sync + 'static) -> ListenerId {
        let id = {
            let mut next = self.next_listener.lock();
            *next += 1;
            *next
        };
        self.listeners.lock().push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }

    /// Stream of state changes for consumers that cannot take a callback.
    pub fn changes(&self) -> broadcast::Receiver<AuthState> {
        self.changes.subscribe()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError> {
        let session = self.gateway.sign_in_with_password(email, password).await?;

        match self.classify(session.identity).await {
            Ok(AuthState::AuthenticatedAdmin(identity)) => {
                if let Err(err) = self.gateway.record_admin_login(&identity.id).await {
                    log::warn!("Could not record admin login: {err}");
                }
                log::info!("Administrator {} signed in", identity.email);
                self.transition(AuthState::AuthenticatedAdmin(identity.clone()));
                Ok(identity)
            }
            Ok(AuthState::AuthenticatedNonAdmin(identity)) => {
                log::warn!("Sign-in refused for {}: no admin grant", identity.email);
                self.force_sign_out().await;
                Err(AuthError::NotAuthorized)
            }
            Ok(AuthState::Anonymous) => {
                self.force_sign_out().await;
                Err(AuthError::NotAuthorized)
            }
            Err(err) => {
                log::error!("Admin grant lookup failed: {err}");
                self.force_sign_out().await;
                Err(AuthError::Gateway(err))
            }
        }
    }

    /// Always ends `Anonymous`, even when the gateway call fails.
    pub async fn sign_out(&self) {
        if let Err(err) = self.gateway.sign_out().await {
            log::warn!("Gateway sign-out failed: {err}");
        }
        if let Some(identity) = self.identity() {
            log::info!("{} signed out", identity.email);
        }
        self.transition(AuthState::Anonymous);
    }

    /// Applies one event from the gateway's session channel.
    pub async fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignedOut | SessionEvent::Expired => {
                self.transition(AuthState::Anonymous);
            }
            SessionEvent::SignedIn(session) => {
                // Events can arrive after the session they announce is gone.
                if !self.is_current(&session.access_token).await {
                    return;
                }
                let Ok(AuthState::AuthenticatedAdmin(identity)) =
                    self.classify(session.identity).await
                else {
                    return;
                };
                // A sign-out may have landed while the grant was looked up.
                if self.is_current(&session.access_token).await {
                    self.transition(AuthState::AuthenticatedAdmin(identity));
                }
            }
        }
    }

    async fn is_current(&self, access_token: &str) -> bool {
        match self.gateway.current_session().await {
            Ok(current) => current.is_some_and(|session| session.access_token == access_token),
            Err(err) => {
                log::warn!("Session lookup failed: {err}");
                false
            }
        }
    }

    /// Stops the session listener. The context stays readable.
    pub fn shutdown(&self) {
        if let Some(handle) = self.session_task.lock().take() {
            handle.abort();
        }
    }

    async fn restore(&self) {
        let session = match self.gateway.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                log::warn!("Could not restore session: {err}");
                return;
            }
        };

        match self.classify(session.identity).await {
            Ok(AuthState::AuthenticatedAdmin(identity)) => {
                self.transition(AuthState::AuthenticatedAdmin(identity));
            }
            Ok(_) | Err(_) => self.force_sign_out().await,
        }
    }

    async fn classify(&self, identity: AuthIdentity) -> Result<AuthState, GatewayError> {
        if self.gateway.has_admin_grant(&identity.id).await? {
            Ok(AuthState::AuthenticatedAdmin(identity))
        } else {
            Ok(AuthState::AuthenticatedNonAdmin(identity))
        }
    }

    async fn force_sign_out(&self) {
        if let Err(err) = self.gateway.sign_out().await {
            log::warn!("Forced sign-out failed: {err}");
        }
        self.transition(AuthState::Anonymous);
    }

    fn transition(&self, next: AuthState) {
        debug_assert!(!matches!(next, AuthState::AuthenticatedNonAdmin(_)));
        {
            let mut state = self.state.write();
            if *state == next {
                return;
            }
            *state = next.clone();
        }
        for (_, listener) in self.listeners.lock().iter() {
            listener(&next);
        }
        let _ = self.changes.send(next);
    }

    fn spawn_session_listener(self: &Arc<Self>) {
        let mut events = self.gateway.session_events();
        let context: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Session listener skipped {skipped} events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(context) = context.upgrade() else {
                    break;
                };
                context.handle_session_event(event).await;
            }
        });

        *self.session_task.lock() = Some(handle);
    }
}

impl<G: Gateway> Drop for AuthContext<G> {
    fn drop(&mut self) {
        if let Some(handle) = self.session_task.get_mut().take() {
            handle.abort();
        }
    }
}
