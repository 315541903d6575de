use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    auth::{new_id, verify_password},
    db::log_activity,
    error::{AuthError, GatewayError},
    gateway::{Gateway, SessionEvent},
    models::{
        AuthIdentity, BookingRequest, NewBooking, PageType, Service, ServiceOrder, Session,
        StaticPage, StaticPagePatch, TeamMember, Testimonial, STATUS_PENDING,
    },
};

const SESSION_EVENT_CAPACITY: usize = 16;

/// One client of the SQLite-backed gateway. Each client carries its own
/// session, so a browser session maps to one `SqliteGateway`.
pub struct SqliteGateway {
    db: SqlitePool,
    session_ttl: Duration,
    session: Arc<Mutex<Option<Session>>>,
    expiry: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SqliteGateway {
    pub fn new(db: SqlitePool, session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            db,
            session_ttl,
            session: Arc::new(Mutex::new(None)),
            expiry: Mutex::new(None),
            events,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn arm_expiry(&self, session: &Session) {
        let delay = (session.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default();
        let token = session.access_token.clone();
        let slot = Arc::clone(&self.session);
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let expired = {
                let mut slot = slot.lock();
                match slot.as_ref() {
                    Some(current) if current.access_token == token => {
                        *slot = None;
                        true
                    }
                    _ => false,
                }
            };
            if expired {
                log::info!("Session expired");
                let _ = events.send(SessionEvent::Expired);
            }
        });

        if let Some(previous) = self.expiry.lock().replace(handle) {
            previous.abort();
        }
    }

    fn disarm_expiry(&self) {
        if let Some(handle) = self.expiry.lock().take() {
            handle.abort();
        }
    }

    /// Identity behind the live session, used by the row policies.
    async fn session_identity(&self) -> Result<Option<AuthIdentity>, GatewayError> {
        Ok(self
            .current_session()
            .await?
            .map(|session| session.identity))
    }
}

impl Drop for SqliteGateway {
    fn drop(&mut self) {
        self.disarm_expiry();
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn list_services(&self, order: ServiceOrder) -> Result<Vec<Service>, GatewayError> {
        let query = match order {
            ServiceOrder::ByName => {
                r#"SELECT id, name, description, price_cents, duration_minutes, category, image_url, created_at
                   FROM services
                   ORDER BY category ASC, name ASC"#
            }
            ServiceOrder::ByPrice => {
                r#"SELECT id, name, description, price_cents, duration_minutes, category, image_url, created_at
                   FROM services
                   ORDER BY category ASC, price_cents ASC"#
            }
        };

        Ok(sqlx::query_as::<_, Service>(query).fetch_all(&self.db).await?)
    }

    async fn insert_booking(&self, booking: &NewBooking) -> Result<BookingRequest, GatewayError> {
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

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"INSERT INTO bookings
               (id, service_id, customer_name, customer_email, customer_phone, booking_date, booking_time, notes, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.id)
        .bind(&record.service_id)
        .bind(&record.customer_name)
        .bind(&record.customer_email)
        .bind(&record.customer_phone)
        .bind(record.booking_date)
        .bind(record.booking_time)
        .bind(&record.notes)
        .bind(&record.status)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO booking_notifications (id, booking_id, recipient, kind, created_at)
               VALUES (?, ?, ?, 'booking_confirmation', ?)"#,
        )
        .bind(new_id())
        .bind(&record.id)
        .bind(&record.customer_email)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        log_activity(
            &self.db,
            "booking_created",
            &format!(
                "New booking requested by {} for {} at {}.",
                record.customer_name,
                record.booking_date,
                record.booking_time.format("%H:%M")
            ),
            None,
        )
        .await;

        Ok(record)
    }

    async fn find_static_page(
        &self,
        page_type: PageType,
    ) -> Result<Option<StaticPage>, GatewayError> {
        Ok(sqlx::query_as::<_, StaticPage>(
            r#"SELECT id, page_type, title, content, updated_at, updated_by
               FROM static_pages
               WHERE page_type = ?
               LIMIT 1"#,
        )
        .bind(page_type.as_str())
        .fetch_optional(&self.db)
        .await?)
    }

    async fn list_static_pages(&self) -> Result<Vec<StaticPage>, GatewayError> {
        Ok(sqlx::query_as::<_, StaticPage>(
            r#"SELECT id, page_type, title, content, updated_at, updated_by
               FROM static_pages
               ORDER BY page_type"#,
        )
        .fetch_all(&self.db)
        .await?)
    }

    async fn update_static_page(
        &self,
        id: &str,
        patch: &StaticPagePatch,
    ) -> Result<(), GatewayError> {
        let Some(identity) = self.session_identity().await? else {
            return Err(GatewayError::PermissionDenied);
        };
        if !self.has_admin_grant(&identity.id).await? {
            return Err(GatewayError::PermissionDenied);
        }

        let result = sqlx::query(
            "UPDATE static_pages SET title = ?, content = ?, updated_at = ?, updated_by = ? WHERE id = ?",
        )
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(patch.updated_at)
        .bind(&patch.updated_by)
        .bind(id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound);
        }

        log_activity(
            &self.db,
            "page_updated",
            &format!("{} updated \"{}\".", identity.email, patch.title),
            Some(&identity.id),
        )
        .await;

        Ok(())
    }

    async fn has_admin_grant(&self, user_id: &str) -> Result<bool, GatewayError> {
        let row = sqlx::query_as::<_, (String,)>("SELECT id FROM admin_users WHERE id = ? LIMIT 1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn record_admin_login(&self, user_id: &str) -> Result<(), GatewayError> {
        sqlx::query("UPDATE admin_users SET last_login = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        log_activity(&self.db, "admin_signed_in", "Administrator signed in.", Some(user_id)).await;
        Ok(())
    }

    async fn list_team_members(&self) -> Result<Vec<TeamMember>, GatewayError> {
        Ok(sqlx::query_as::<_, TeamMember>(
            "SELECT id, name, role, bio, image_url, order_index FROM team_members ORDER BY order_index ASC",
        )
        .fetch_all(&self.db)
        .await?)
    }

    async fn list_featured_testimonials(&self) -> Result<Vec<Testimonial>, GatewayError> {
        Ok(sqlx::query_as::<_, Testimonial>(
            r#"SELECT id, customer_name, rating, review, service_type, created_at
               FROM testimonials
               WHERE is_featured = 1
               ORDER BY created_at DESC"#,
        )
        .fetch_all(&self.db)
        .await?)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let user = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, email, password_hash FROM auth_users WHERE email = ? LIMIT 1",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.db)
        .await
        .map_err(GatewayError::from)?;

        let Some((id, email, password_hash)) = user else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let session = Session {
            access_token: new_id(),
            identity: AuthIdentity { id, email },
            expires_at: Utc::now() + self.session_ttl,
        };
        *self.session.lock() = Some(session.clone());
        self.arm_expiry(&session);
        self.emit(SessionEvent::SignedIn(session.clone()));

        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        self.disarm_expiry();
        let previous = self.session.lock().take();
        if previous.is_some() {
            self.emit(SessionEvent::SignedOut);
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, GatewayError> {
        let expired = {
            let mut slot = self.session.lock();
            match slot.as_ref() {
                Some(session) if session.is_expired(Utc::now()) => {
                    *slot = None;
                    true
                }
                Some(session) => return Ok(Some(session.clone())),
                None => return Ok(None),
            }
        };
        if expired {
            self.disarm_expiry();
            self.emit(SessionEvent::Expired);
        }
        Ok(None)
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::db::{seed_admin, seed_sample_content, seed_static_pages, test_pool};

    const ADMIN_EMAIL: &str = "owner@studiolux.test";
    const ADMIN_PASSWORD: &str = "correct horse";

    async fn seeded_pool() -> SqlitePool {
        let pool = test_pool().await;
        seed_admin(&pool, ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
        seed_static_pages(&pool).await.unwrap();
        seed_sample_content(&pool).await.unwrap();
        pool
    }

    fn gateway(pool: &SqlitePool) -> SqliteGateway {
        SqliteGateway::new(pool.clone(), Duration::minutes(30))
    }

    fn booking_for(service_id: &str) -> NewBooking {
        NewBooking {
            service_id: service_id.to_string(),
            customer_name: "Maria Silva".into(),
            customer_email: "maria@example.com".into(),
            customer_phone: "+351 912 345 678".into(),
            booking_date: NaiveDate::from_ymd_opt(2031, 3, 14).unwrap(),
            booking_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            notes: Some("First visit".into()),
        }
    }

    #[tokio::test]
    async fn services_are_ordered_by_category_then_requested_key() {
        let pool = seeded_pool().await;
        let gw = gateway(&pool);

        let by_name = gw.list_services(ServiceOrder::ByName).await.unwrap();
        assert!(!by_name.is_empty());
        for pair in by_name.windows(2) {
            let key = |s: &Service| (s.category.as_str(), s.name.clone());
            assert!(key(&pair[0]) <= key(&pair[1]));
        }

        let by_price = gw.list_services(ServiceOrder::ByPrice).await.unwrap();
        for pair in by_price.windows(2) {
            let key = |s: &Service| (s.category.as_str(), s.price_cents);
            assert!(key(&pair[0]) <= key(&pair[1]));
        }
    }

    #[tokio::test]
    async fn booking_insert_queues_confirmation_email() {
        let pool = seeded_pool().await;
        let gw = gateway(&pool);
        let service = gw.list_services(ServiceOrder::ByName).await.unwrap().remove(0);

        let stored = gw.insert_booking(&booking_for(&service.id)).await.unwrap();
        assert_eq!(stored.status, STATUS_PENDING);

        let row = sqlx::query_as::<_, BookingRequest>(
            r#"SELECT id, service_id, customer_name, customer_email, customer_phone,
                      booking_date, booking_time, notes, status, created_at
               FROM bookings WHERE id = ?"#,
        )
        .bind(&stored.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.booking_time, stored.booking_time);
        assert_eq!(row.notes.as_deref(), Some("First visit"));

        let (recipient,) = sqlx::query_as::<_, (String,)>(
            "SELECT recipient FROM booking_notifications WHERE booking_id = ?",
        )
        .bind(&stored.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(recipient, "maria@example.com");
    }

    #[tokio::test]
    async fn booking_with_dangling_service_is_rejected() {
        let pool = seeded_pool().await;
        let gw = gateway(&pool);

        let err = gw.insert_booking(&booking_for("no-such-service")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Database(_)));

        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM booking_notifications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let pool = seeded_pool().await;
        let gw = gateway(&pool);

        let err = gw.sign_in_with_password(ADMIN_EMAIL, "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = gw.sign_in_with_password("ghost@studiolux.test", "x").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(gw.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_updates_require_an_admin_session() {
        let pool = seeded_pool().await;
        let gw = gateway(&pool);
        let page = gw
            .find_static_page(PageType::PrivacyPolicy)
            .await
            .unwrap()
            .unwrap();
        let patch = StaticPagePatch {
            title: "Privacy".into(),
            content: "<p>Updated</p>".into(),
            updated_at: Utc::now(),
            updated_by: "someone".into(),
        };

        let err = gw.update_static_page(&page.id, &patch).await.unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied));

        let session = gw
            .sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();
        let patch = StaticPagePatch {
            updated_by: session.identity.id.clone(),
            ..patch
        };
        gw.update_static_page(&page.id, &patch).await.unwrap();

        let stored = gw
            .find_static_page(PageType::PrivacyPolicy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.content, "<p>Updated</p>");
        assert_eq!(stored.updated_by.as_deref(), Some(session.identity.id.as_str()));
    }

    #[tokio::test]
    async fn updating_a_deleted_page_is_not_found() {
        let pool = seeded_pool().await;
        let gw = gateway(&pool);
        let page = gw
            .find_static_page(PageType::TermsOfService)
            .await
            .unwrap()
            .unwrap();
        let session = gw
            .sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();
        sqlx::query("DELETE FROM static_pages WHERE id = ?")
            .bind(&page.id)
            .execute(&pool)
            .await
            .unwrap();

        let patch = StaticPagePatch {
            title: "Terms".into(),
            content: "<p>Gone</p>".into(),
            updated_at: Utc::now(),
            updated_by: session.identity.id,
        };
        let err = gw.update_static_page(&page.id, &patch).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound));

        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM activities WHERE kind = 'page_updated'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn sign_in_and_out_publish_session_events() {
        let pool = seeded_pool().await;
        let gw = gateway(&pool);
        let mut events = gw.session_events();

        let session = gw
            .sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedIn(session));

        gw.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);

        // A second sign-out has nothing to announce.
        gw.sign_out().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn sessions_expire_after_their_ttl() {
        let pool = seeded_pool().await;
        let gw = SqliteGateway::new(pool.clone(), Duration::milliseconds(50));
        let mut events = gw.session_events();

        gw.sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::SignedIn(_)));

        let next = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("expiry event")
            .unwrap();
        assert_eq!(next, SessionEvent::Expired);
        assert!(gw.current_session().await.unwrap().is_none());
    }
}
