//! In-process gateway for workflow tests. Counts writes and can be told to
//! fail so tests can assert which calls reached the backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    auth::new_id,
    error::{AuthError, GatewayError},
    gateway::{Gateway, SessionEvent},
    models::{
        AuthIdentity, BookingRequest, NewBooking, PageType, Service, ServiceCategory,
        ServiceOrder, Session, StaticPage, StaticPagePatch, TeamMember, Testimonial,
        STATUS_PENDING,
    },
};

#[derive(Default)]
struct Tables {
    services: Vec<Service>,
    bookings: Vec<BookingRequest>,
    pages: Vec<StaticPage>,
    users: HashMap<String, (AuthIdentity, String)>,
    admins: HashSet<String>,
    session: Option<Session>,
}

#[derive(Default)]
struct Calls {
    list_services: usize,
    insert_booking: usize,
    update_page: usize,
    sign_out: usize,
}

#[derive(Default)]
struct Faults {
    list_services: bool,
    insert_booking: bool,
    update_page: bool,
    find_page: bool,
    admin_grant: bool,
    end_session_on_grant_lookup: bool,
}

pub struct MemoryGateway {
    tables: Mutex<Tables>,
    calls: Mutex<Calls>,
    faults: Mutex<Faults>,
    events: broadcast::Sender<SessionEvent>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            tables: Mutex::new(Tables::default()),
            calls: Mutex::new(Calls::default()),
            faults: Mutex::new(Faults::default()),
            events,
        }
    }

    pub fn add_service(&self, id: &str, name: &str, category: ServiceCategory, price_cents: i64) {
        self.tables.lock().services.push(Service {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("{name} description"),
            price_cents,
            duration_minutes: 45,
            category,
            image_url: None,
            created_at: Utc::now(),
        });
    }

    pub fn remove_service(&self, id: &str) {
        self.tables.lock().services.retain(|service| service.id != id);
    }

    pub fn remove_page(&self, page_type: PageType) {
        self.tables.lock().pages.retain(|page| page.page_type != page_type);
    }

    pub fn add_page(&self, id: &str, page_type: PageType, title: &str, content: &str) {
        self.tables.lock().pages.push(StaticPage {
            id: id.to_string(),
            page_type,
            title: title.to_string(),
            content: content.to_string(),
            updated_at: Utc::now() - Duration::days(1),
            updated_by: None,
        });
    }

    pub fn add_user(&self, id: &str, email: &str, password: &str, admin: bool) {
        let mut tables = self.tables.lock();
        tables.users.insert(
            email.to_string(),
            (
                AuthIdentity {
                    id: id.to_string(),
                    email: email.to_string(),
                },
                password.to_string(),
            ),
        );
        if admin {
            tables.admins.insert(id.to_string());
        }
    }

    pub fn page(&self, page_type: PageType) -> Option<StaticPage> {
        self.tables
            .lock()
            .pages
            .iter()
            .find(|page| page.page_type == page_type)
            .cloned()
    }

    pub fn bookings(&self) -> Vec<BookingRequest> {
        self.tables.lock().bookings.clone()
    }

    pub fn expire_session(&self) {
        if self.tables.lock().session.take().is_some() {
            let _ = self.events.send(SessionEvent::Expired);
        }
    }

    pub fn fail_list_services(&self, fail: bool) {
        self.faults.lock().list_services = fail;
    }

    pub fn fail_insert_booking(&self, fail: bool) {
        self.faults.lock().insert_booking = fail;
    }

    pub fn fail_update_page(&self, fail: bool) {
        self.faults.lock().update_page = fail;
    }

    pub fn fail_find_page(&self, fail: bool) {
        self.faults.lock().find_page = fail;
    }

    pub fn fail_admin_grant(&self, fail: bool) {
        self.faults.lock().admin_grant = fail;
    }

    /// Ends the current session while the admin grant is looked up, as a
    /// concurrent sign-out would.
    pub fn end_session_on_grant_lookup(&self, end: bool) {
        self.faults.lock().end_session_on_grant_lookup = end;
    }

    pub fn list_services_calls(&self) -> usize {
        self.calls.lock().list_services
    }

    pub fn insert_booking_calls(&self) -> usize {
        self.calls.lock().insert_booking
    }

    pub fn update_page_calls(&self) -> usize {
        self.calls.lock().update_page
    }

    pub fn sign_out_calls(&self) -> usize {
        self.calls.lock().sign_out
    }
}

fn unavailable() -> GatewayError {
    GatewayError::Unavailable("injected failure".into())
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list_services(&self, order: ServiceOrder) -> Result<Vec<Service>, GatewayError> {
        self.calls.lock().list_services += 1;
        if self.faults.lock().list_services {
            return Err(unavailable());
        }
        let mut services = self.tables.lock().services.clone();
        match order {
            ServiceOrder::ByName => {
                services.sort_by(|a, b| (a.category, &a.name).cmp(&(b.category, &b.name)))
            }
            ServiceOrder::ByPrice => {
                services.sort_by_key(|service| (service.category, service.price_cents))
            }
        }
        Ok(services)
    }

    async fn insert_booking(&self, booking: &NewBooking) -> Result<BookingRequest, GatewayError> {
        self.calls.lock().insert_booking += 1;
        if self.faults.lock().insert_booking {
            return Err(unavailable());
        }
        let mut tables = self.tables.lock();
        if !tables
            .services
            .iter()
            .any(|service| service.id == booking.service_id)
        {
            return Err(GatewayError::Unavailable(
                "bookings.service_id violates foreign key".into(),
            ));
        }
        let record = BookingRequest {
            id: new_id(),
            service_id: booking.service_id.clone(),
            customer_name: booking.customer_name.clone(),
            customer_email: booking.customer_email.clone(),
            customer_phone: booking.customer_phone.clone(),
            booking_date: booking.booking_date,
            booking_time: booking.booking_time,
            notes: booking.notes.clone(),
            status: STATUS_PENDING.to_string(),
            created_at: Utc::now(),
        };
        tables.bookings.push(record.clone());
        Ok(record)
    }

    async fn find_static_page(
        &self,
        page_type: PageType,
    ) -> Result<Option<StaticPage>, GatewayError> {
        if self.faults.lock().find_page {
            return Err(unavailable());
        }
        Ok(self.page(page_type))
    }

    async fn list_static_pages(&self) -> Result<Vec<StaticPage>, GatewayError> {
        Ok(self.tables.lock().pages.clone())
    }

    async fn update_static_page(
        &self,
        id: &str,
        patch: &StaticPagePatch,
    ) -> Result<(), GatewayError> {
        self.calls.lock().update_page += 1;
        if self.faults.lock().update_page {
            return Err(unavailable());
        }
        let mut tables = self.tables.lock();
        let allowed = tables
            .session
            .as_ref()
            .is_some_and(|session| tables.admins.contains(&session.identity.id));
        if !allowed {
            return Err(GatewayError::PermissionDenied);
        }
        let Some(page) = tables.pages.iter_mut().find(|page| page.id == id) else {
            return Err(GatewayError::NotFound);
        };
        page.title = patch.title.clone();
        page.content = patch.content.clone();
        page.updated_at = patch.updated_at;
        page.updated_by = Some(patch.updated_by.clone());
        Ok(())
    }

    async fn has_admin_grant(&self, user_id: &str) -> Result<bool, GatewayError> {
        let (fail, end_session) = {
            let faults = self.faults.lock();
            (faults.admin_grant, faults.end_session_on_grant_lookup)
        };
        if end_session && self.tables.lock().session.take().is_some() {
            let _ = self.events.send(SessionEvent::SignedOut);
        }
        if fail {
            return Err(unavailable());
        }
        Ok(self.tables.lock().admins.contains(user_id))
    }

    async fn record_admin_login(&self, _user_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn list_team_members(&self) -> Result<Vec<TeamMember>, GatewayError> {
        Ok(Vec::new())
    }

    async fn list_featured_testimonials(&self) -> Result<Vec<Testimonial>, GatewayError> {
        Ok(Vec::new())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let session = {
            let mut tables = self.tables.lock();
            let identity = match tables.users.get(email) {
                Some((identity, expected)) if expected == password => identity.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            };
            let session = Session {
                access_token: new_id(),
                identity,
                expires_at: Utc::now() + Duration::hours(1),
            };
            tables.session = Some(session.clone());
            session
        };
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        self.calls.lock().sign_out += 1;
        if self.tables.lock().session.take().is_some() {
            let _ = self.events.send(SessionEvent::SignedOut);
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, GatewayError> {
        Ok(self.tables.lock().session.clone())
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
