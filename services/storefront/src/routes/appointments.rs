//! Appointment booking for signed-in customers

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    routing::{delete, get, post},
};
use axum_extra::extract::WithRejection;
use chrono::{NaiveDate, NaiveTime};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    error::{ApiError, ApiResult, is_foreign_key_violation},
    middleware::{AuthUser, auth_middleware},
    models::{Appointment, AppointmentRequest, NewAppointment},
    state::AppState,
    validation::{Validator, validate_date, validate_min_length, validate_time},
};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/appointments", post(create_appointment))
        .route("/api/appointments/my", get(my_appointments))
        .route("/api/appointments/:id", delete(cancel_appointment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

fn parse_appointment(payload: AppointmentRequest) -> ApiResult<NewAppointment> {
    let mut validator = Validator::new();
    let service_id = validator.require("serviceId", payload.service_id);
    if let Some(service_id) = &service_id {
        validator.check("serviceId", validate_min_length(service_id, 1));
    }
    let date = validator.require("date", payload.date);
    if let Some(date) = &date {
        validator.check("date", validate_date(date));
    }
    let time = validator.require("time", payload.time);
    if let Some(time) = &time {
        validator.check("time", validate_time(time));
    }
    validator.finish()?;

    let invalid = || ApiError::BadRequest("Invalid payload".to_string());
    let (Some(service_id), Some(date), Some(time)) = (service_id, date, time) else {
        return Err(invalid());
    };
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(&time, "%H:%M").map_err(|_| invalid())?;

    Ok(NewAppointment {
        service_id,
        notes: payload.notes,
        date,
        time,
    })
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Json(payload), _): WithRejection<Json<AppointmentRequest>, ApiError>,
) -> ApiResult<Json<Appointment>> {
    let appointments = state.appointments()?;
    let appointment = parse_appointment(payload)?;

    let created = appointments
        .create(auth.id, &appointment)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                ApiError::BadRequest("Unknown service".to_string())
            } else {
                error!("Failed to book appointment: {}", e);
                ApiError::Internal("Failed to book appointment".to_string())
            }
        })?;

    info!("User {} booked appointment {}", auth.id, created.id);
    Ok(Json(created))
}

pub async fn my_appointments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Appointment>>> {
    Ok(Json(state.appointments()?.list_for_user(auth.id).await?))
}

/// Soft cancel; only the owner may cancel
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    if !state.appointments()?.cancel(id, auth.id).await? {
        return Err(ApiError::NotFound("Not found".to_string()));
    }
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(date: &str, time: &str) -> AppointmentRequest {
        AppointmentRequest {
            service_id: Some("phone-repair".to_string()),
            notes: None,
            date: Some(date.to_string()),
            time: Some(time.to_string()),
        }
    }

    #[test]
    fn test_parse_appointment() {
        let appointment = parse_appointment(request("2026-03-14", "09:30")).unwrap();
        assert_eq!(appointment.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(appointment.time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(appointment.service_id, "phone-repair");
    }

    #[test]
    fn test_parse_appointment_rejects_bad_slots() {
        for (date, time) in [
            ("14/03/2026", "09:30"),
            ("2026-02-30", "09:30"),
            ("2026-03-14", "9:30"),
            ("2026-03-14", "25:00"),
        ] {
            assert!(
                matches!(
                    parse_appointment(request(date, time)),
                    Err(ApiError::InvalidPayload(_))
                ),
                "{date} {time} should be rejected"
            );
        }
    }
}
