use std::sync::Arc;

use actix_web::{
    http::{header, StatusCode},
    middleware::from_fn,
    web, HttpRequest, HttpResponse,
};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{admin_guard, clear_session_cookie, safe_next, session_cookie, session_token, LOGIN_PATH},
    db::recent_activities,
    editor::{Confirmation, EditField, EditorState, Exit, NoticeKind, PageEditor},
    gateway::{Gateway, SqliteGateway},
    models::PageType,
    routes::{events, public::viewer_is_admin},
    state::{AdminSession, AppState},
    templates::{long_date, render, render_status},
};

#[derive(Template)]
#[template(path = "admin_login.html")]
struct LoginTemplate {
    email: String,
    next: String,
    error: String,
    has_error: bool,
    is_admin: bool,
}

#[derive(Clone, Debug)]
struct PageCard {
    title: String,
    kind: &'static str,
    updated: String,
    route_key: &'static str,
}

#[derive(Clone, Debug)]
struct ActivityView {
    message: String,
    created_at: String,
}

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct AdminDashboardTemplate {
    admin_email: String,
    pages: Vec<PageCard>,
    pages_unavailable: bool,
    activities: Vec<ActivityView>,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "admin_editor.html")]
struct EditorTemplate {
    admin_email: String,
    heading: &'static str,
    found: bool,
    ready: bool,
    title: String,
    content: String,
    updated: String,
    has_updated: bool,
    notice: String,
    has_notice: bool,
    notice_is_error: bool,
    guard_unload: bool,
    route_key: &'static str,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "admin_confirm_leave.html")]
struct ConfirmLeaveTemplate {
    message: &'static str,
    route_key: &'static str,
    is_admin: bool,
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PageForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct CancelQuery {
    confirm: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(LOGIN_PATH)
            .route(web::get().to(login_form))
            .route(web::post().to(login)),
    )
    .service(
        web::scope("/admin")
            .wrap(from_fn(admin_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/logout").route(web::post().to(logout)))
            .service(
                web::resource("/edit/{page}")
                    .route(web::get().to(edit_page))
                    .route(web::post().to(save_page)),
            )
            .service(web::resource("/edit/{page}/cancel").route(web::get().to(cancel_edit)))
            .configure(events::configure),
    );
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

async fn index() -> HttpResponse {
    redirect("/admin/dashboard")
}

async fn login_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let next = safe_next(query.next.as_deref()).to_string();
    if viewer_is_admin(&state, &req) {
        return redirect(&next);
    }
    render(LoginTemplate {
        email: String::new(),
        next,
        error: String::new(),
        has_error: false,
        is_admin: false,
    })
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<LoginForm>,
) -> HttpResponse {
    let form = form.into_inner();
    let next = safe_next(form.next.as_deref()).to_string();

    if let Some(token) = session_token(&req) {
        state.sessions.sign_out(&token).await;
    }

    match state.sessions.sign_in(form.email.trim(), &form.password).await {
        Ok(session) => HttpResponse::SeeOther()
            .append_header((header::LOCATION, next))
            .cookie(session_cookie(&req, &session.token))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish(),
        Err(err) => {
            let mut response = render_status(
                StatusCode::UNAUTHORIZED,
                LoginTemplate {
                    email: form.email,
                    next,
                    error: err.user_message().to_string(),
                    has_error: true,
                    is_admin: false,
                },
            );
            if let Err(err) = response.add_cookie(&clear_session_cookie(&req)) {
                log::warn!("Failed to clear session cookie: {err}");
            }
            response
        }
    }
}

async fn logout(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Arc<AdminSession>>,
) -> HttpResponse {
    state.sessions.sign_out(&session.token).await;
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, LOGIN_PATH))
        .cookie(clear_session_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn admin_email(session: &AdminSession) -> String {
    session
        .auth
        .identity()
        .map(|identity| identity.email)
        .unwrap_or_default()
}

async fn dashboard(
    state: web::Data<AppState>,
    session: web::ReqData<Arc<AdminSession>>,
) -> HttpResponse {
    let (pages, pages_unavailable) = match session.gateway.list_static_pages().await {
        Ok(pages) => (
            pages
                .into_iter()
                .map(|page| PageCard {
                    kind: page.page_type.default_title(),
                    route_key: page.page_type.route_key(),
                    updated: long_date(page.updated_at.date_naive()),
                    title: page.title,
                })
                .collect(),
            false,
        ),
        Err(err) => {
            log::error!("Failed to list static pages: {err}");
            (Vec::new(), true)
        }
    };

    let activities = recent_activities(&state.db, 10)
        .await
        .into_iter()
        .map(|row| ActivityView {
            message: row.message,
            created_at: row.created_at.format("%d %b %Y %H:%M").to_string(),
        })
        .collect();

    render(AdminDashboardTemplate {
        admin_email: admin_email(&session),
        pages,
        pages_unavailable,
        activities,
        is_admin: true,
    })
}

/// HTML forms submit textarea values with CRLF line breaks; those alone are
/// not an edit.
fn differs(current: &str, submitted: &str) -> bool {
    current.replace("\r\n", "\n") != submitted.replace("\r\n", "\n")
}

fn editor_page(
    session: &AdminSession,
    page_type: PageType,
    editor: &PageEditor<SqliteGateway>,
    error: Option<&str>,
) -> EditorTemplate {
    let (notice, notice_is_error) = match (error, editor.notice()) {
        (Some(message), _) => (message.to_string(), true),
        (None, Some(notice)) => (notice.text.clone(), notice.kind == NoticeKind::Error),
        (None, None) => (String::new(), false),
    };
    let updated = editor
        .page()
        .map(|page| long_date(page.updated_at.date_naive()))
        .unwrap_or_default();

    EditorTemplate {
        admin_email: admin_email(session),
        heading: page_type.default_title(),
        found: editor.state() != EditorState::NotFound,
        ready: editor.page().is_some(),
        title: editor.title().to_string(),
        content: editor.content().to_string(),
        has_updated: !updated.is_empty(),
        updated,
        has_notice: !notice.is_empty(),
        notice,
        notice_is_error,
        guard_unload: editor.discard_guard(Exit::Unload).is_some(),
        route_key: page_type.route_key(),
        is_admin: true,
    }
}

fn unknown_page(session: &AdminSession) -> HttpResponse {
    render_status(
        StatusCode::NOT_FOUND,
        EditorTemplate {
            admin_email: admin_email(session),
            heading: "Page not found",
            found: false,
            ready: false,
            title: String::new(),
            content: String::new(),
            updated: String::new(),
            has_updated: false,
            notice: String::new(),
            has_notice: false,
            notice_is_error: false,
            guard_unload: false,
            route_key: "",
            is_admin: true,
        },
    )
}

fn editor_status(editor: &PageEditor<SqliteGateway>) -> StatusCode {
    if editor.state() == EditorState::NotFound {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}

/// Unsaved edits are kept across reloads; anything else is reloaded fresh.
async fn edit_page(
    session: web::ReqData<Arc<AdminSession>>,
    path: web::Path<String>,
) -> HttpResponse {
    let route_key = path.into_inner();
    let Some(page_type) = PageType::from_route_key(&route_key) else {
        return unknown_page(&session);
    };

    let mut editors = session.editors.lock().await;
    let keep = editors
        .get(&page_type)
        .is_some_and(|editor| editor.is_dirty());
    if !keep {
        let mut editor = session.new_editor();
        // Failures are reflected in the editor's state and notice.
        let _ = editor.load(&route_key).await;
        editors.insert(page_type, editor);
    }

    match editors.get(&page_type) {
        Some(editor) => render_status(
            editor_status(editor),
            editor_page(&session, page_type, editor, None),
        ),
        None => unknown_page(&session),
    }
}

async fn save_page(
    session: web::ReqData<Arc<AdminSession>>,
    path: web::Path<String>,
    form: web::Form<PageForm>,
) -> HttpResponse {
    let route_key = path.into_inner();
    let Some(page_type) = PageType::from_route_key(&route_key) else {
        return unknown_page(&session);
    };
    let form = form.into_inner();

    let mut editors = session.editors.lock().await;
    if !editors.contains_key(&page_type) {
        let mut editor = session.new_editor();
        let _ = editor.load(&route_key).await;
        editors.insert(page_type, editor);
    }
    let Some(editor) = editors.get_mut(&page_type) else {
        return unknown_page(&session);
    };

    let mut error = None;
    let edits = [
        (EditField::Title, editor.title(), form.title),
        (EditField::Content, editor.content(), form.content),
    ]
    .into_iter()
    .filter(|(_, current, submitted)| differs(current, submitted))
    .map(|(field, _, submitted)| (field, submitted.replace("\r\n", "\n")))
    .collect::<Vec<_>>();
    for (field, value) in edits {
        if let Err(err) = editor.edit(field, value) {
            error = Some(err.user_message());
        }
    }

    if error.is_none() {
        if let Err(err) = editor.save().await {
            log::debug!("Save of {route_key} did not complete: {err}");
            if editor.notice().is_none() {
                error = Some(err.user_message());
            }
        }
    }

    render_status(
        editor_status(editor),
        editor_page(&session, page_type, editor, error),
    )
}

async fn cancel_edit(
    session: web::ReqData<Arc<AdminSession>>,
    path: web::Path<String>,
    query: web::Query<CancelQuery>,
) -> HttpResponse {
    let route_key = path.into_inner();
    let Some(page_type) = PageType::from_route_key(&route_key) else {
        return redirect("/admin/dashboard");
    };
    let confirmed = query.confirm.as_deref() == Some("1");

    let mut editors = session.editors.lock().await;
    let prompt = editors
        .get(&page_type)
        .and_then(|editor| editor.discard_guard(Exit::Navigate));

    if let (Some(Confirmation::Prompt(message)), false) = (prompt, confirmed) {
        return render(ConfirmLeaveTemplate {
            message,
            route_key: page_type.route_key(),
            is_admin: true,
        });
    }

    editors.remove(&page_type);
    redirect(&format!("/{route_key}"))
}
