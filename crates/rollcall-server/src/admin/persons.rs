//! Person CRUD hooks. The person directory itself lives elsewhere; these
//! endpoints keep the local mirror current and push the change to terminals.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use super::{AdminError, Tenant};
use crate::app::AppState;
use crate::storage::Person;

#[derive(Debug, Deserialize)]
pub struct UpsertPerson {
    name: String,
    card_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PersonChange {
    person: Option<Person>,
    /// Terminal commands queued for the change.
    commands: usize,
}

async fn check_owner(state: &AppState, tenant: &Tenant, id: i64) -> Result<Option<Person>, AdminError> {
    let existing = state.db.get_person(id).await?;
    if let Some(person) = &existing
        && person.tenant_id != tenant.0
    {
        return Err(AdminError::Forbidden(format!(
            "person {id} belongs to another tenant"
        )));
    }
    Ok(existing)
}

pub async fn upsert(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
    Json(req): Json<UpsertPerson>,
) -> Result<Json<PersonChange>, AdminError> {
    if req.name.trim().is_empty() {
        return Err(AdminError::BadRequest("name is required".into()));
    }
    check_owner(&state, &tenant, id).await?;

    let card = req.card_id.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let person = state.db.upsert_person(id, &tenant.0, req.name.trim(), card).await?;
    let commands = state.sync.enroll_person(&tenant.0, id).await?;

    Ok(Json(PersonChange {
        person: Some(person),
        commands,
    }))
}

pub async fn remove(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<Json<PersonChange>, AdminError> {
    if check_owner(&state, &tenant, id).await?.is_none() {
        return Err(AdminError::NotFound(format!("person {id} not found")));
    }

    state.db.deactivate_person(id).await?;
    let commands = state.sync.remove_person(&tenant.0, id).await?;

    Ok(Json(PersonChange {
        person: state.db.get_person(id).await?,
        commands,
    }))
}
