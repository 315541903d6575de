//! Appointment booking: pick a service, a day and a half-hour slot, leave
//! contact details, submit. Any valid slot is offered regardless of existing
//! bookings.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};

use crate::{
    error::{BookingError, Field, GatewayError, ValidationErrors},
    gateway::Gateway,
    models::{BookingRequest, NewBooking, Service, ServiceOrder},
};

pub const SLOT_MINUTES: i64 = 30;

pub fn opening_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

pub fn closing_time() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default()
}

/// Every bookable start time, opening to closing inclusive.
pub fn time_slots() -> Vec<NaiveTime> {
    let mut slots = Vec::new();
    let mut slot = opening_time();
    while slot <= closing_time() {
        slots.push(slot);
        slot += Duration::minutes(SLOT_MINUTES);
    }
    slots
}

/// Accepts `HH:MM` (or `HH:MM:SS`) only when it names a slot.
pub fn parse_slot(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    let time = NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()?;
    time_slots().into_iter().find(|slot| *slot == time)
}

/// Form fields as typed by the visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingDraft {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub booking_date: String,
    pub booking_time: String,
    pub notes: String,
}

pub struct BookingWorkflow<G: Gateway> {
    gateway: Arc<G>,
    services: Vec<Service>,
    selected: Option<String>,
    pub draft: BookingDraft,
}

impl<G: Gateway> BookingWorkflow<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            services: Vec::new(),
            selected: None,
            draft: BookingDraft::default(),
        }
    }

    /// On failure the previously loaded services stay in place. Retrying is
    /// up to the caller.
    pub async fn load_services(&mut self, order: ServiceOrder) -> Result<&[Service], GatewayError> {
        let services = self.gateway.list_services(order).await.map_err(|err| {
            log::error!("Failed to load services: {err}");
            err
        })?;
        self.services = services;
        Ok(&self.services)
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Ids outside the last loaded set are ignored and `None` is returned.
    pub fn select_service(&mut self, service_id: &str) -> Option<&Service> {
        let index = self
            .services
            .iter()
            .position(|service| service.id == service_id)?;
        self.selected = Some(self.services[index].id.clone());
        Some(&self.services[index])
    }

    pub fn selected_service(&self) -> Option<&Service> {
        let selected = self.selected.as_deref()?;
        self.services.iter().find(|service| service.id == selected)
    }

    pub fn validate(&self, today: NaiveDate) -> Result<NewBooking, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let draft = &self.draft;

        let service = self.selected_service();
        if service.is_none() {
            errors.add(Field::Service, "No service selected.");
        }
        if draft.customer_name.trim().is_empty() {
            errors.add(Field::Name, "Full name is required.");
        }
        if draft.customer_email.trim().is_empty() {
            errors.add(Field::Email, "Email is required.");
        } else if !looks_like_email(draft.customer_email.trim()) {
            errors.add(Field::Email, "Enter a valid email address.");
        }
        if draft.customer_phone.trim().is_empty() {
            errors.add(Field::Phone, "Phone number is required.");
        }

        let date = if draft.booking_date.trim().is_empty() {
            errors.add(Field::Date, "Please pick a date.");
            None
        } else {
            match NaiveDate::parse_from_str(draft.booking_date.trim(), "%Y-%m-%d") {
                Ok(date) if date < today => {
                    errors.add(Field::Date, "Choose today or a later date.");
                    None
                }
                Ok(date) => Some(date),
                Err(_) => {
                    errors.add(Field::Date, "Enter the date as YYYY-MM-DD.");
                    None
                }
            }
        };

        let time = if draft.booking_time.trim().is_empty() {
            errors.add(Field::Time, "Please pick a time.");
            None
        } else {
            let slot = parse_slot(&draft.booking_time);
            if slot.is_none() {
                errors.add(Field::Time, "Pick one of the available times.");
            }
            slot
        };

        match (service, date, time) {
            (Some(service), Some(booking_date), Some(booking_time)) if errors.is_empty() => {
                Ok(NewBooking {
                    service_id: service.id.clone(),
                    customer_name: draft.customer_name.clone(),
                    customer_email: draft.customer_email.clone(),
                    customer_phone: draft.customer_phone.clone(),
                    booking_date,
                    booking_time,
                    notes: if draft.notes.trim().is_empty() {
                        None
                    } else {
                        Some(draft.notes.clone())
                    },
                })
            }
            _ => Err(errors),
        }
    }

    /// Validation failures never reach the gateway. A gateway failure leaves
    /// the draft and selection untouched so the visitor can resubmit.
    pub async fn submit(&mut self, today: NaiveDate) -> Result<BookingRequest, BookingError> {
        let booking = self.validate(today).map_err(BookingError::Validation)?;

        match self.gateway.insert_booking(&booking).await {
            Ok(record) => {
                log::info!(
                    "Booking {} accepted for {} {}",
                    record.id,
                    record.booking_date,
                    record.booking_time.format("%H:%M")
                );
                Ok(record)
            }
            Err(err) => {
                log::error!("Booking insert failed: {err}");
                Err(BookingError::Gateway(err))
            }
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !value.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::memory::MemoryGateway, models::ServiceCategory};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 10).unwrap()
    }

    fn gateway() -> Arc<MemoryGateway> {
        let gateway = MemoryGateway::new();
        gateway.add_service("svc-cut", "Cut & Blow-Dry", ServiceCategory::Hair, 3500);
        gateway.add_service("svc-colour", "Colour & Gloss", ServiceCategory::Hair, 6500);
        gateway.add_service("svc-facial", "Signature Facial", ServiceCategory::Beauty, 5500);
        Arc::new(gateway)
    }

    fn filled_draft() -> BookingDraft {
        BookingDraft {
            customer_name: "Maria Silva".into(),
            customer_email: "maria@example.com".into(),
            customer_phone: "+351 912 345 678".into(),
            booking_date: "2030-06-10".into(),
            booking_time: "14:30".into(),
            notes: "Sensitive scalp".into(),
        }
    }

    async fn ready_workflow(gateway: &Arc<MemoryGateway>) -> BookingWorkflow<MemoryGateway> {
        let mut workflow = BookingWorkflow::new(Arc::clone(gateway));
        workflow.load_services(ServiceOrder::ByName).await.unwrap();
        workflow.select_service("svc-cut").unwrap();
        workflow.draft = filled_draft();
        workflow
    }

    #[test]
    fn slots_run_every_half_hour_from_nine_to_six() {
        let slots = time_slots();
        assert_eq!(slots.len(), 19);
        assert_eq!(slots.first().unwrap().format("%H:%M").to_string(), "09:00");
        assert_eq!(slots.last().unwrap().format("%H:%M").to_string(), "18:00");
        assert!(slots
            .windows(2)
            .all(|pair| pair[1] - pair[0] == Duration::minutes(30)));
    }

    #[test]
    fn parse_slot_rejects_off_grid_times() {
        assert!(parse_slot("09:30").is_some());
        assert!(parse_slot("18:00:00").is_some());
        assert!(parse_slot("08:30").is_none());
        assert!(parse_slot("18:30").is_none());
        assert!(parse_slot("10:15").is_none());
        assert!(parse_slot("noon").is_none());
    }

    #[tokio::test]
    async fn services_load_in_category_then_name_order() {
        let gateway = gateway();
        let mut workflow = BookingWorkflow::new(Arc::clone(&gateway));
        let names: Vec<String> = workflow
            .load_services(ServiceOrder::ByName)
            .await
            .unwrap()
            .iter()
            .map(|service| service.name.clone())
            .collect();
        assert_eq!(names, vec!["Signature Facial", "Colour & Gloss", "Cut & Blow-Dry"]);
    }

    #[tokio::test]
    async fn valid_submission_round_trips_every_field() {
        let gateway = gateway();
        let mut workflow = ready_workflow(&gateway).await;

        let record = workflow.submit(today()).await.unwrap();

        assert_eq!(record.service_id, "svc-cut");
        assert_eq!(record.customer_name, "Maria Silva");
        assert_eq!(record.customer_email, "maria@example.com");
        assert_eq!(record.customer_phone, "+351 912 345 678");
        assert_eq!(record.booking_date, today());
        assert_eq!(record.booking_time, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert_eq!(record.notes.as_deref(), Some("Sensitive scalp"));
        assert_eq!(record.status, "pending");
        assert_eq!(gateway.bookings(), vec![record]);
    }

    #[tokio::test]
    async fn past_dates_never_reach_the_gateway() {
        let gateway = gateway();
        let mut workflow = ready_workflow(&gateway).await;
        workflow.draft.booking_date = "2030-06-09".into();

        let err = workflow.submit(today()).await.unwrap_err();

        match err {
            BookingError::Validation(errors) => {
                assert!(errors.contains(Field::Date));
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gateway.insert_booking_calls(), 0);
    }

    #[tokio::test]
    async fn times_outside_the_slot_grid_are_rejected() {
        let gateway = gateway();
        let mut workflow = ready_workflow(&gateway).await;

        for time in ["08:30", "18:30", "12:15"] {
            workflow.draft.booking_time = time.into();
            let err = workflow.submit(today()).await.unwrap_err();
            assert!(matches!(err, BookingError::Validation(ref e) if e.contains(Field::Time)));
        }
        assert_eq!(gateway.insert_booking_calls(), 0);
    }

    #[tokio::test]
    async fn empty_form_reports_every_required_field() {
        let gateway = gateway();
        let mut workflow = BookingWorkflow::new(Arc::clone(&gateway));
        workflow.load_services(ServiceOrder::ByName).await.unwrap();

        let err = workflow.validate(today()).unwrap_err();
        for field in [
            Field::Service,
            Field::Name,
            Field::Email,
            Field::Phone,
            Field::Date,
            Field::Time,
        ] {
            assert!(err.contains(field), "missing error for {field:?}");
        }

        workflow.draft.customer_email = "not-an-email".into();
        let err = workflow.validate(today()).unwrap_err();
        assert_eq!(err.get(Field::Email), Some("Enter a valid email address."));
    }

    #[tokio::test]
    async fn unknown_service_selection_is_a_no_op() {
        let gateway = gateway();
        let mut workflow = BookingWorkflow::new(Arc::clone(&gateway));
        workflow.load_services(ServiceOrder::ByName).await.unwrap();

        assert!(workflow.select_service("svc-missing").is_none());
        assert!(workflow.selected_service().is_none());
        assert!(workflow.select_service("svc-missing").is_none());
        assert!(workflow.selected_service().is_none());

        let chosen = workflow.select_service("svc-facial").unwrap();
        assert_eq!(chosen.name, "Signature Facial");
    }

    #[tokio::test]
    async fn selection_requires_a_loaded_catalogue() {
        let gateway = gateway();
        let mut workflow = BookingWorkflow::new(Arc::clone(&gateway));
        assert!(workflow.select_service("svc-cut").is_none());
    }

    #[tokio::test]
    async fn failed_catalogue_load_is_reported_and_retryable() {
        let gateway = gateway();
        gateway.fail_list_services(true);
        let mut workflow = BookingWorkflow::new(Arc::clone(&gateway));

        assert!(workflow.load_services(ServiceOrder::ByName).await.is_err());
        assert!(workflow.services().is_empty());

        gateway.fail_list_services(false);
        assert_eq!(workflow.load_services(ServiceOrder::ByName).await.unwrap().len(), 3);
        assert_eq!(gateway.list_services_calls(), 2);
    }

    #[tokio::test]
    async fn gateway_failure_keeps_the_form_for_a_retry() {
        let gateway = gateway();
        let mut workflow = ready_workflow(&gateway).await;
        gateway.fail_insert_booking(true);

        let err = workflow.submit(today()).await.unwrap_err();
        assert!(matches!(err, BookingError::Gateway(_)));
        assert_eq!(workflow.draft, filled_draft());
        assert_eq!(workflow.selected_service().map(|s| s.id.as_str()), Some("svc-cut"));

        gateway.fail_insert_booking(false);
        workflow.submit(today()).await.unwrap();
        assert_eq!(gateway.bookings().len(), 1);
    }

    #[tokio::test]
    async fn deleted_service_fails_at_the_gateway_without_data_loss() {
        let gateway = gateway();
        let mut workflow = ready_workflow(&gateway).await;
        gateway.remove_service("svc-cut");

        let err = workflow.submit(today()).await.unwrap_err();
        assert!(matches!(err, BookingError::Gateway(_)));
        assert_eq!(workflow.draft, filled_draft());
        assert!(gateway.bookings().is_empty());

        // Reloading drops the stale selection.
        workflow.load_services(ServiceOrder::ByName).await.unwrap();
        assert!(workflow.selected_service().is_none());
        workflow.select_service("svc-colour").unwrap();
        let record = workflow.submit(today()).await.unwrap();
        assert_eq!(record.service_id, "svc-colour");
        assert_eq!(record.customer_name, "Maria Silva");
    }

    #[tokio::test]
    async fn same_slot_can_be_booked_twice() {
        let gateway = gateway();
        let mut first = ready_workflow(&gateway).await;
        let mut second = ready_workflow(&gateway).await;
        second.draft.customer_name = "Joana Pires".into();

        first.submit(today()).await.unwrap();
        second.submit(today()).await.unwrap();

        let bookings = gateway.bookings();
        assert_eq!(bookings.len(), 2);
        assert_eq!(bookings[0].booking_time, bookings[1].booking_time);
    }

    #[tokio::test]
    async fn blank_notes_are_stored_as_none() {
        let gateway = gateway();
        let mut workflow = ready_workflow(&gateway).await;
        workflow.draft.notes = "   ".into();

        let record = workflow.submit(today()).await.unwrap();
        assert_eq!(record.notes, None);
    }
}
