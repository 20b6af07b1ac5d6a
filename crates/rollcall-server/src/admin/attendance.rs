use axum::Json;
use axum::extract::{Query, State};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{AdminError, Tenant};
use crate::app::AppState;
use crate::directory::AttendancePolicy;
use crate::storage::{AttendanceRecord, AttendanceStatus, NewAttendance};

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyBody {
    opening_time: String,
    grace_minutes: i64,
}

impl From<AttendancePolicy> for PolicyBody {
    fn from(policy: AttendancePolicy) -> Self {
        Self {
            opening_time: policy.opening_time_text(),
            grace_minutes: policy.grace_minutes,
        }
    }
}

pub async fn get_policy(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<PolicyBody>, AdminError> {
    let policy = state.settings.attendance_policy(&tenant.0).await?;
    Ok(Json(policy.into()))
}

pub async fn set_policy(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(body): Json<PolicyBody>,
) -> Result<Json<PolicyBody>, AdminError> {
    let policy = AttendancePolicy::new(&body.opening_time, body.grace_minutes)?;
    state.settings.set_attendance_policy(&tenant.0, &policy).await?;
    Ok(Json(policy.into()))
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    date: String,
}

pub async fn list(
    State(state): State<AppState>,
    tenant: Tenant,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, AdminError> {
    let date = parse_date(&query.date)?;
    Ok(Json(state.db.list_attendance_by_date(&tenant.0, &date).await?))
}

/// Manual entry; replaces whatever the person has for that day.
#[derive(Debug, Deserialize)]
pub struct ManualEntry {
    person_id: i64,
    date: String,
    status: AttendanceStatus,
    check_in_time: Option<String>,
    notes: Option<String>,
}

pub async fn manual_entry(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(entry): Json<ManualEntry>,
) -> Result<Json<AttendanceRecord>, AdminError> {
    let person = state.db.get_person(entry.person_id).await?;
    if !person.is_some_and(|p| p.tenant_id == tenant.0) {
        return Err(AdminError::NotFound(format!("person {} not found", entry.person_id)));
    }

    let date = parse_date(&entry.date)?;
    let check_in_time = entry
        .check_in_time
        .as_deref()
        .map(|raw| {
            NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M"))
                .map(|t| t.format("%H:%M:%S").to_string())
                .map_err(|_| AdminError::BadRequest(format!("invalid check_in_time: {raw}")))
        })
        .transpose()?;

    let record = state
        .db
        .upsert_attendance(&NewAttendance {
            tenant_id: &tenant.0,
            person_id: entry.person_id,
            date: &date,
            check_in_time: check_in_time.as_deref(),
            status: entry.status,
            device_id: None,
            notes: entry.notes.as_deref(),
        })
        .await?;
    Ok(Json(record))
}

fn parse_date(raw: &str) -> Result<String, AdminError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| AdminError::BadRequest(format!("invalid date: {raw}")))
}
