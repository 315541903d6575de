use std::sync::Arc;

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use askama::Template;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::{
    auth::session_token,
    booking::{time_slots, BookingDraft, BookingWorkflow, SLOT_MINUTES},
    error::{BookingError, Field, ValidationErrors},
    gateway::{Gateway, SqliteGateway},
    models::{PageType, Service, ServiceCategory, ServiceOrder, TeamMember, Testimonial},
    state::AppState,
    templates::{long_date, render, render_status},
};

const SERVICES_UNAVAILABLE: &str = "We could not load our services right now. Please try again.";

#[derive(Clone, Debug)]
struct FilterTab {
    value: &'static str,
    label: &'static str,
    active: bool,
}

#[derive(Clone, Debug)]
struct ServiceCard {
    id: String,
    name: String,
    description: String,
    price: String,
    duration: String,
}

#[derive(Clone, Debug)]
struct CategorySection {
    label: &'static str,
    services: Vec<ServiceCard>,
}

#[derive(Clone, Debug)]
struct TeamCard {
    name: String,
    role: String,
    bio: String,
    initials: String,
}

#[derive(Clone, Debug)]
struct TestimonialCard {
    customer_name: String,
    review: String,
    service_type: String,
    has_service_type: bool,
    stars: String,
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    filters: Vec<FilterTab>,
    sections: Vec<CategorySection>,
    services_unavailable: bool,
    team: Vec<TeamCard>,
    testimonials: Vec<TestimonialCard>,
    is_admin: bool,
}

#[derive(Clone, Debug)]
struct ServiceChoice {
    id: String,
    label: String,
    selected: bool,
}

#[derive(Clone, Debug)]
struct ServiceGroup {
    label: &'static str,
    options: Vec<ServiceChoice>,
}

#[derive(Clone, Debug)]
struct SlotChoice {
    value: String,
    selected: bool,
}

#[derive(Clone, Debug, Default)]
struct FieldErrors {
    service_id: &'static str,
    customer_name: &'static str,
    customer_email: &'static str,
    customer_phone: &'static str,
    booking_date: &'static str,
    booking_time: &'static str,
}

impl From<&ValidationErrors> for FieldErrors {
    fn from(errors: &ValidationErrors) -> Self {
        let get = |field| errors.get(field).unwrap_or_default();
        Self {
            service_id: get(Field::Service),
            customer_name: get(Field::Name),
            customer_email: get(Field::Email),
            customer_phone: get(Field::Phone),
            booking_date: get(Field::Date),
            booking_time: get(Field::Time),
        }
    }
}

#[derive(Template)]
#[template(path = "book.html")]
struct BookingTemplate {
    groups: Vec<ServiceGroup>,
    slots: Vec<SlotChoice>,
    form: BookingDraft,
    errors: FieldErrors,
    selected_summary: String,
    has_selected: bool,
    message: String,
    has_message: bool,
    services_unavailable: bool,
    min_date: String,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "book_success.html")]
struct BookingSuccessTemplate {
    customer_name: String,
    customer_email: String,
    service_name: String,
    date_label: String,
    time_label: String,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "page.html")]
struct LegalPageTemplate {
    title: String,
    content_html: String,
    has_content: bool,
    updated: String,
    has_updated: bool,
    unavailable: bool,
    route_key: &'static str,
    is_admin: bool,
}

#[derive(Deserialize)]
struct HomeQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
struct BookingQuery {
    service: Option<String>,
}

#[derive(Deserialize)]
struct BookingForm {
    #[serde(default)]
    service_id: String,
    #[serde(default)]
    customer_name: String,
    #[serde(default)]
    customer_email: String,
    #[serde(default)]
    customer_phone: String,
    #[serde(default)]
    booking_date: String,
    #[serde(default)]
    booking_time: String,
    #[serde(default)]
    notes: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(
            web::resource("/book")
                .route(web::get().to(show_booking))
                .route(web::post().to(create_booking)),
        )
        .service(web::resource("/privacy-policy").route(web::get().to(privacy_policy)))
        .service(web::resource("/terms-of-service").route(web::get().to(terms_of_service)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

pub(crate) fn viewer_is_admin(state: &AppState, req: &HttpRequest) -> bool {
    session_token(req)
        .and_then(|token| state.sessions.resolve(&token))
        .is_some()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn home(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<HomeQuery>,
) -> HttpResponse {
    let filter = query
        .category
        .as_deref()
        .and_then(ServiceCategory::parse);

    let (sections, services_unavailable) =
        match state.public.list_services(ServiceOrder::ByPrice).await {
            Ok(services) => (service_sections(&services, filter), false),
            Err(err) => {
                log::error!("Failed to load services for home page: {err}");
                (Vec::new(), true)
            }
        };

    let mut filters = vec![FilterTab {
        value: "all",
        label: "All",
        active: filter.is_none(),
    }];
    filters.extend(ServiceCategory::ALL.into_iter().map(|category| FilterTab {
        value: category.as_str(),
        label: category.label(),
        active: filter == Some(category),
    }));

    let team = fetch_team(&state.public).await;
    let testimonials = fetch_testimonials(&state.public).await;

    render(HomeTemplate {
        filters,
        sections,
        services_unavailable,
        team,
        testimonials,
        is_admin: viewer_is_admin(&state, &req),
    })
}

fn service_sections(services: &[Service], filter: Option<ServiceCategory>) -> Vec<CategorySection> {
    ServiceCategory::ALL
        .into_iter()
        .filter(|category| filter.map_or(true, |wanted| wanted == *category))
        .map(|category| CategorySection {
            label: category.label(),
            services: services
                .iter()
                .filter(|service| service.category == category)
                .map(|service| ServiceCard {
                    id: service.id.clone(),
                    name: service.name.clone(),
                    description: service.description.clone(),
                    price: service.price_label(),
                    duration: format!("{} min", service.duration_minutes),
                })
                .collect(),
        })
        .filter(|section| !section.services.is_empty())
        .collect()
}

async fn fetch_team(gateway: &SqliteGateway) -> Vec<TeamCard> {
    let members: Vec<TeamMember> = gateway.list_team_members().await.unwrap_or_else(|err| {
        log::warn!("Failed to load team members: {err}");
        Vec::new()
    });
    members
        .into_iter()
        .map(|member| {
            let initials = member
                .name
                .split_whitespace()
                .filter_map(|part| part.chars().next())
                .take(2)
                .collect::<String>();
            TeamCard {
                name: member.name,
                role: member.role,
                bio: member.bio,
                initials: initials.to_uppercase(),
            }
        })
        .collect()
}

async fn fetch_testimonials(gateway: &SqliteGateway) -> Vec<TestimonialCard> {
    let rows: Vec<Testimonial> = gateway
        .list_featured_testimonials()
        .await
        .unwrap_or_else(|err| {
            log::warn!("Failed to load testimonials: {err}");
            Vec::new()
        });
    rows.into_iter()
        .map(|row| {
            let rating = row.rating.clamp(0, 5) as usize;
            let service_type = row.service_type.unwrap_or_default();
            TestimonialCard {
                customer_name: row.customer_name,
                review: row.review,
                has_service_type: !service_type.is_empty(),
                service_type,
                stars: format!("{}{}", "★".repeat(rating), "☆".repeat(5 - rating)),
            }
        })
        .collect()
}

fn booking_page(
    workflow: &BookingWorkflow<SqliteGateway>,
    errors: FieldErrors,
    message: Option<&str>,
    services_unavailable: bool,
    is_admin: bool,
) -> BookingTemplate {
    let selected_id = workflow.selected_service().map(|service| service.id.as_str());

    let groups = ServiceCategory::ALL
        .into_iter()
        .map(|category| ServiceGroup {
            label: category.label(),
            options: workflow
                .services()
                .iter()
                .filter(|service| service.category == category)
                .map(|service| ServiceChoice {
                    id: service.id.clone(),
                    label: format!(
                        "{} ({}, {} min)",
                        service.name,
                        service.price_label(),
                        service.duration_minutes
                    ),
                    selected: selected_id == Some(service.id.as_str()),
                })
                .collect::<Vec<_>>(),
        })
        .filter(|group| !group.options.is_empty())
        .collect();

    let slots = time_slots()
        .into_iter()
        .map(|slot| {
            let value = slot.format("%H:%M").to_string();
            SlotChoice {
                selected: workflow.draft.booking_time.trim() == value,
                value,
            }
        })
        .collect();

    let selected_summary = workflow
        .selected_service()
        .map(|service| {
            format!(
                "{} · {} · {} min",
                service.name,
                service.price_label(),
                service.duration_minutes
            )
        })
        .unwrap_or_default();

    BookingTemplate {
        groups,
        slots,
        form: workflow.draft.clone(),
        errors,
        has_selected: !selected_summary.is_empty(),
        selected_summary,
        message: message.unwrap_or_default().to_string(),
        has_message: message.is_some(),
        services_unavailable,
        min_date: today().format("%Y-%m-%d").to_string(),
        is_admin,
    }
}

async fn show_booking(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<BookingQuery>,
) -> HttpResponse {
    let mut workflow = BookingWorkflow::new(Arc::clone(&state.public));
    let unavailable = workflow.load_services(ServiceOrder::ByName).await.is_err();
    if let Some(service_id) = query.service.as_deref() {
        workflow.select_service(service_id);
    }

    render(booking_page(
        &workflow,
        FieldErrors::default(),
        unavailable.then_some(SERVICES_UNAVAILABLE),
        unavailable,
        viewer_is_admin(&state, &req),
    ))
}

async fn create_booking(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<BookingForm>,
) -> HttpResponse {
    let form = form.into_inner();
    let is_admin = viewer_is_admin(&state, &req);

    let mut workflow = BookingWorkflow::new(Arc::clone(&state.public));
    let loaded = workflow.load_services(ServiceOrder::ByName).await.is_ok();
    workflow.select_service(&form.service_id);
    workflow.draft = BookingDraft {
        customer_name: form.customer_name,
        customer_email: form.customer_email,
        customer_phone: form.customer_phone,
        booking_date: form.booking_date,
        booking_time: form.booking_time,
        notes: form.notes,
    };

    if !loaded {
        return render_status(
            StatusCode::SERVICE_UNAVAILABLE,
            booking_page(
                &workflow,
                FieldErrors::default(),
                Some(SERVICES_UNAVAILABLE),
                true,
                is_admin,
            ),
        );
    }

    match workflow.submit(today()).await {
        Ok(record) => {
            let service_name = workflow
                .selected_service()
                .map(|service| service.name.clone())
                .unwrap_or_default();
            let end = record.booking_time + chrono::Duration::minutes(SLOT_MINUTES);
            render(BookingSuccessTemplate {
                customer_name: record.customer_name,
                customer_email: record.customer_email,
                service_name,
                date_label: long_date(record.booking_date),
                time_label: format!(
                    "{} to {}",
                    record.booking_time.format("%H:%M"),
                    end.format("%H:%M")
                ),
                is_admin,
            })
        }
        Err(err) => {
            let fields = match &err {
                BookingError::Validation(errors) => FieldErrors::from(errors),
                BookingError::Gateway(_) => FieldErrors::default(),
            };
            render_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                booking_page(&workflow, fields, Some(err.user_message()), false, is_admin),
            )
        }
    }
}

async fn privacy_policy(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    legal_page(&state, &req, PageType::PrivacyPolicy).await
}

async fn terms_of_service(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    legal_page(&state, &req, PageType::TermsOfService).await
}

async fn legal_page(state: &AppState, req: &HttpRequest, page_type: PageType) -> HttpResponse {
    let route_key = page_type.route_key();
    let is_admin = viewer_is_admin(state, req);

    let template = match state.public.find_static_page(page_type).await {
        Ok(Some(page)) => LegalPageTemplate {
            title: page.title,
            has_content: !page.content.trim().is_empty(),
            content_html: page.content,
            updated: long_date(page.updated_at.date_naive()),
            has_updated: true,
            unavailable: false,
            route_key,
            is_admin,
        },
        Ok(None) => LegalPageTemplate {
            title: page_type.default_title().to_string(),
            content_html: String::new(),
            has_content: false,
            updated: String::new(),
            has_updated: false,
            unavailable: false,
            route_key,
            is_admin,
        },
        Err(err) => {
            log::error!("Failed to load {}: {err}", page_type.as_str());
            return render_status(
                StatusCode::SERVICE_UNAVAILABLE,
                LegalPageTemplate {
                    title: page_type.default_title().to_string(),
                    content_html: String::new(),
                    has_content: false,
                    updated: String::new(),
                    has_updated: false,
                    unavailable: true,
                    route_key,
                    is_admin,
                },
            );
        }
    };

    render(template)
}
