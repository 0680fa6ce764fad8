//! Appointment repository

use sqlx::PgPool;

use crate::models::{Appointment, NewAppointment};

#[derive(Clone)]
pub struct AppointmentRepository {
    pool: PgPool,
}

impl AppointmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i32,
        appointment: &NewAppointment,
    ) -> sqlx::Result<Appointment> {
        sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (user_id, service_id, notes, date, time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, service_id, notes, date, time, status
            "#,
        )
        .bind(user_id)
        .bind(&appointment.service_id)
        .bind(appointment.notes.as_deref())
        .bind(appointment.date)
        .bind(appointment.time)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_for_user(&self, user_id: i32) -> sqlx::Result<Vec<Appointment>> {
        sqlx::query_as::<_, Appointment>(
            r#"
            SELECT id, service_id, notes, date, time, status, created_at
            FROM appointments
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Mark an appointment canceled; false when it is not the user's
    pub async fn cancel(&self, id: i32, user_id: i32) -> sqlx::Result<bool> {
        let result =
            sqlx::query("UPDATE appointments SET status = 'canceled' WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
