//! Schema'd records, one per collection.
//!
//! Every field is optional on the wire and defaults when absent, so records
//! written by older clients still decode. The user role is decoded
//! leniently: anything other than a known role reads as "no role".

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::documents::Collection;

/// A typed record bound to its collection.
pub trait Record: Serialize + serde::de::DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;
}

/// Marketplace role of a signed-in user.
///
/// `Client` is the least-privileged role and the fallback whenever the
/// stored role is missing or unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    #[serde(alias = "user")]
    Client,
    Worker,
}

impl Role {
    /// Parse a stored role value. `"user"` is the legacy name for clients.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "client" | "user" => Some(Role::Client),
            "worker" => Some(Role::Worker),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Worker => "worker",
        }
    }
}

/// How a raw `role` field read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleField {
    Valid(Role),
    Missing,
    Invalid(String),
}

impl RoleField {
    pub fn classify(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => RoleField::Missing,
            Some(Value::String(s)) => match Role::parse(s) {
                Some(role) => RoleField::Valid(role),
                None => RoleField::Invalid(s.clone()),
            },
            Some(other) => RoleField::Invalid(other.to_string()),
        }
    }

    /// The role to act on, failing open to `Client`.
    pub fn effective(&self) -> Role {
        match self {
            RoleField::Valid(role) => *role,
            RoleField::Missing | RoleField::Invalid(_) => Role::Client,
        }
    }
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match RoleField::classify(value.as_ref()) {
        RoleField::Valid(role) => Ok(Some(role)),
        RoleField::Missing | RoleField::Invalid(_) => Ok(None),
    }
}

/// Geographic point with a display address.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

/// `users` collection.
///
/// Profile fields keep the names the mobile app already stores. Stored
/// profiles carry the address as `correoElectronico`, provisioned ones as
/// `email`; both decode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    pub uid: String,
    #[serde(rename = "nombreCompleto")]
    pub full_name: String,
    #[serde(alias = "correoElectronico")]
    pub email: String,
    #[serde(rename = "telefono")]
    pub phone: String,
    #[serde(rename = "ciudadRegion")]
    pub region: String,
    #[serde(deserialize_with = "lenient_role", skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub is_active: bool,
    /// Epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Record for UserRecord {
    const COLLECTION: Collection = Collection::Users;
}

impl UserRecord {
    /// Default profile for an identity with no stored user document.
    pub fn provisional(uid: impl Into<String>, email: Option<&str>, name: Option<&str>) -> Self {
        Self {
            uid: uid.into(),
            full_name: name.unwrap_or_default().to_string(),
            email: email.unwrap_or_default().to_string(),
            role: Some(Role::Client),
            is_active: true,
            ..Default::default()
        }
    }

    pub fn effective_role(&self) -> Role {
        self.role.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    #[default]
    Fixed,
    Hourly,
}

/// `services` collection: an offering published by a worker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRecord {
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub price_type: PriceType,
    pub provider_id: String,
    pub provider_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_photo: Option<String>,
    pub images: Vec<String>,
    pub rating: f64,
    pub review_count: u32,
    pub is_active: bool,
    pub location: GeoLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Record for ServiceRecord {
    const COLLECTION: Collection = Collection::Services;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
}

/// `bookings` collection: a client's request for a service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingRecord {
    pub service_id: String,
    pub client_id: String,
    pub worker_id: String,
    pub status: BookingStatus,
    pub scheduled_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<i64>,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub location: GeoLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Record for BookingRecord {
    const COLLECTION: Collection = Collection::Bookings;
}

/// `reviews` collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewRecord {
    pub booking_id: String,
    pub reviewer_id: String,
    pub reviewed_id: String,
    pub rating: u8,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl Record for ReviewRecord {
    const COLLECTION: Collection = Collection::Reviews;
}
