//! Service appointments

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Appointment entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub id: i32,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    pub service_id: Option<String>,
    pub notes: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub status: String,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    pub service_id: Option<String>,
    pub notes: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

/// Validated booking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub service_id: String,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}
