use std::{fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    config::AppConfig,
    models::{ActivityRow, PageType},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool, config: &AppConfig) -> Result<(), sqlx::Error> {
    seed_admin(pool, &config.admin_email, &config.admin_password).await?;
    seed_static_pages(pool).await?;
    if config.seed_sample_data {
        seed_sample_content(pool).await?;
    }
    Ok(())
}

pub async fn log_activity(pool: &SqlitePool, kind: &str, message: &str, user_id: Option<&str>) {
    let result = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("Failed to record {kind} activity: {err}");
    }
}

pub async fn recent_activities(pool: &SqlitePool, limit: i64) -> Vec<ActivityRow> {
    sqlx::query_as::<_, ActivityRow>(
        "SELECT message, created_at FROM activities ORDER BY created_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .unwrap_or_default()
}

/// Creates the sign-in account and its admin grant when missing.
pub async fn seed_admin(pool: &SqlitePool, email: &str, password: &str) -> Result<(), sqlx::Error> {
    let email = email.trim().to_lowercase();
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM auth_users WHERE email = ? LIMIT 1")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    let now = Utc::now();
    let user_id = match existing {
        Some((id,)) => id,
        None => {
            if password == "admin" {
                log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
            }
            let password_hash = hash_password(password)
                .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
            let id = new_id();
            sqlx::query(
                "INSERT INTO auth_users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&email)
            .bind(password_hash)
            .bind(now)
            .execute(pool)
            .await?;
            id
        }
    };

    sqlx::query("INSERT OR IGNORE INTO admin_users (id, last_login, created_at) VALUES (?, NULL, ?)")
        .bind(&user_id)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn seed_static_pages(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let pages = [
        (
            PageType::PrivacyPolicy,
            r#"<h2>Who we are</h2>
<p>StudioLux is a hair and beauty salon. This policy explains how we handle the personal data you share when you book with us.</p>
<h2>What we collect</h2>
<p>Your name, email address, phone number and appointment preferences, used only to manage your bookings.</p>
<h2>Your rights</h2>
<p>You may ask us to access, correct or delete your data at any time.</p>"#,
        ),
        (
            PageType::TermsOfService,
            r#"<h2>Bookings</h2>
<p>Booking requests are confirmed by our team. We will contact you if the requested time is unavailable.</p>
<h2>Cancellations</h2>
<p>Please let us know at least 24 hours in advance if you cannot attend.</p>"#,
        ),
    ];

    for (page_type, content) in pages {
        let exists = sqlx::query_as::<_, (String,)>(
            "SELECT id FROM static_pages WHERE page_type = ? LIMIT 1",
        )
        .bind(page_type.as_str())
        .fetch_optional(pool)
        .await?;
        if exists.is_some() {
            continue;
        }
        sqlx::query(
            r#"INSERT INTO static_pages (id, page_type, title, content, updated_at, updated_by)
               VALUES (?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(new_id())
        .bind(page_type.as_str())
        .bind(page_type.default_title())
        .bind(content)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Catalogue, team and testimonials for a fresh install.
pub async fn seed_sample_content(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let (services,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM services")
        .fetch_one(pool)
        .await?;
    if services > 0 {
        return Ok(());
    }

    let now = Utc::now();
    let catalogue = [
        ("Cut & Blow-Dry", "Consultation, wash, precision cut and finish.", 3500, 60, "hair"),
        ("Men's Cut", "Classic or modern cut with styling.", 1800, 30, "hair"),
        ("Colour & Gloss", "Full colour with a glossing treatment.", 6500, 120, "hair"),
        ("Balayage", "Hand-painted highlights for a natural blend.", 9500, 150, "hair"),
        ("Classic Manicure", "Shape, cuticle care and polish.", 1800, 45, "beauty"),
        ("Gel Pedicure", "Long-lasting gel colour with foot care.", 2800, 60, "beauty"),
        ("Signature Facial", "Deep cleanse, exfoliation and mask.", 5500, 75, "beauty"),
        ("Brow Shaping", "Wax and tidy for defined brows.", 1200, 20, "beauty"),
    ];
    for (name, description, price_cents, duration, category) in catalogue {
        sqlx::query(
            r#"INSERT INTO services (id, name, description, price_cents, duration_minutes, category, image_url, created_at)
               VALUES (?, ?, ?, ?, ?, ?, NULL, ?)"#,
        )
        .bind(new_id())
        .bind(name)
        .bind(description)
        .bind(price_cents)
        .bind(duration)
        .bind(category)
        .bind(now)
        .execute(pool)
        .await?;
    }

    let team = [
        ("Ana Ferreira", "Founder & Creative Director", "Fifteen years of colour and cutting work."),
        ("Rita Lopes", "Senior Stylist", "Specialist in balayage and lived-in colour."),
        ("Joana Pires", "Beauty Therapist", "Facials, brows and nail care."),
    ];
    for (index, (name, role, bio)) in team.into_iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO team_members (id, name, role, bio, image_url, order_index, created_at)
               VALUES (?, ?, ?, ?, NULL, ?, ?)"#,
        )
        .bind(new_id())
        .bind(name)
        .bind(role)
        .bind(bio)
        .bind(index as i64)
        .bind(now)
        .execute(pool)
        .await?;
    }

    let testimonials = [
        ("Sara Costa", 5, "The best balayage I have ever had. Warm team and a beautiful space.", Some("Balayage"), true),
        ("Marta Sousa", 5, "Booked online in a minute and the facial was wonderful.", Some("Signature Facial"), true),
        ("Inês Rocha", 4, "Lovely manicure, will be back.", None, false),
    ];
    for (customer_name, rating, review, service_type, featured) in testimonials {
        sqlx::query(
            r#"INSERT INTO testimonials (id, customer_name, rating, review, service_type, is_featured, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(new_id())
        .bind(customer_name)
        .bind(rating)
        .bind(review)
        .bind(service_type)
        .bind(featured)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
