use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::editor::EditorState;

/// Failure reported by the data gateway. Retryable by re-issuing the call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Permission denied by row policy")]
    PermissionDenied,

    #[error("No matching row")]
    NotFound,

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account has no administrative grant")]
    NotAuthorized,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password.",
            AuthError::NotAuthorized => {
                "Access denied. This account does not have administrative permissions."
            }
            AuthError::Gateway(_) => "Sign-in is temporarily unavailable. Please try again.",
        }
    }
}

/// Booking form fields that can carry a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Service,
    Name,
    Email,
    Phone,
    Date,
    Time,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Service => "service_id",
            Field::Name => "customer_name",
            Field::Email => "customer_email",
            Field::Phone => "customer_phone",
            Field::Date => "booking_date",
            Field::Time => "booking_time",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<Field, &'static str>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: Field, message: &'static str) {
        self.fields.entry(field).or_insert(message);
    }

    pub fn get(&self, field: Field) -> Option<&'static str> {
        self.fields.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.keys().map(|field| field.as_str()).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Booking rejected: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl BookingError {
    pub fn user_message(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "Please correct the highlighted fields.",
            BookingError::Gateway(_) => {
                "We could not place your booking. Please try again."
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Page not found")]
    NotFound,

    #[error("Administrator session required")]
    Unauthorized,

    #[error("Editor cannot save while {0:?}")]
    NotReady(EditorState),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl EditorError {
    pub fn user_message(&self) -> &'static str {
        match self {
            EditorError::NotFound => "This page does not exist.",
            EditorError::Unauthorized => "Your administrator session has ended. Sign in again.",
            EditorError::NotReady(_) => "The page has not finished loading.",
            EditorError::Gateway(_) => "Could not save. Please try again.",
        }
    }
}
