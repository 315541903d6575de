use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

pub const STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Beauty,
    Hair,
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 2] = [ServiceCategory::Hair, ServiceCategory::Beauty];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCategory::Beauty => "beauty",
            ServiceCategory::Hair => "hair",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ServiceCategory::Beauty => "Beauty",
            ServiceCategory::Hair => "Hair",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "beauty" => Some(ServiceCategory::Beauty),
            "hair" => Some(ServiceCategory::Hair),
            _ => None,
        }
    }
}

/// Secondary sort key applied after category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOrder {
    ByName,
    ByPrice,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub duration_minutes: i64,
    pub category: ServiceCategory,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn price_label(&self) -> String {
        format_euro(self.price_cents)
    }
}

pub fn format_euro(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}€{}.{:02}", cents / 100, cents % 100)
}

/// A booking as submitted; the gateway assigns id, status and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub service_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BookingRequest {
    pub id: String,
    pub service_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    PrivacyPolicy,
    TermsOfService,
}

impl PageType {
    /// Maps the key used in URLs (`privacy-policy`) to a page type.
    pub fn from_route_key(key: &str) -> Option<Self> {
        match key {
            "privacy-policy" => Some(PageType::PrivacyPolicy),
            "terms-of-service" => Some(PageType::TermsOfService),
            _ => None,
        }
    }

    pub fn route_key(self) -> &'static str {
        match self {
            PageType::PrivacyPolicy => "privacy-policy",
            PageType::TermsOfService => "terms-of-service",
        }
    }

    /// Key stored in `static_pages.page_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            PageType::PrivacyPolicy => "privacy_policy",
            PageType::TermsOfService => "terms_of_service",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            PageType::PrivacyPolicy => "Privacy Policy",
            PageType::TermsOfService => "Terms of Service",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StaticPage {
    pub id: String,
    pub page_type: PageType,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPagePatch {
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthIdentity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub identity: AuthIdentity,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub role: String,
    pub bio: String,
    pub image_url: Option<String>,
    pub order_index: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Testimonial {
    pub id: String,
    pub customer_name: String,
    pub rating: i64,
    pub review: String,
    pub service_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: DateTime<Utc>,
}
