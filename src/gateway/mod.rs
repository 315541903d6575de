//! Boundary to the data backend: table reads and writes plus password
//! sessions. Workflows only ever talk to a [`Gateway`].

#[cfg(test)]
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    error::{AuthError, GatewayError},
    models::{
        BookingRequest, NewBooking, PageType, Service, ServiceOrder, Session, StaticPage,
        StaticPagePatch, TeamMember, Testimonial,
    },
};

pub use sqlite::SqliteGateway;

/// Pushed on the session-change channel whenever the gateway's session moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut,
    Expired,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// `services` ordered by category, then by `order`.
    async fn list_services(&self, order: ServiceOrder) -> Result<Vec<Service>, GatewayError>;

    async fn insert_booking(&self, booking: &NewBooking) -> Result<BookingRequest, GatewayError>;

    async fn find_static_page(
        &self,
        page_type: PageType,
    ) -> Result<Option<StaticPage>, GatewayError>;

    async fn list_static_pages(&self) -> Result<Vec<StaticPage>, GatewayError>;

    /// Last write wins; no version check is made.
    async fn update_static_page(
        &self,
        id: &str,
        patch: &StaticPagePatch,
    ) -> Result<(), GatewayError>;

    async fn has_admin_grant(&self, user_id: &str) -> Result<bool, GatewayError>;

    async fn record_admin_login(&self, user_id: &str) -> Result<(), GatewayError>;

    async fn list_team_members(&self) -> Result<Vec<TeamMember>, GatewayError>;

    async fn list_featured_testimonials(&self) -> Result<Vec<Testimonial>, GatewayError>;

    /// Fails only with [`AuthError::InvalidCredentials`] or [`AuthError::Gateway`].
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), GatewayError>;

    async fn current_session(&self) -> Result<Option<Session>, GatewayError>;

    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;
}
