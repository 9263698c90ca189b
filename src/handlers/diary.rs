//! Diary entry handlers.
//!
//! An entry and its activity tags commit in a single transaction: a tag
//! referencing an unknown activity rolls the whole entry back. History reads
//! load the entries and their tags in two queries and stitch them in memory.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, is_foreign_key_violation, storage_error, ApiError, ApiResult},
    helpers::session_user_id,
    models::{DiaryEntry, DiaryEntryActivity, NewDiaryEntry},
    schema::{activities, diary_entries, diary_entry_activities, patient_links},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDiaryEntryRequest {
    /// When the entry refers to; defaults to now.
    #[serde(default)]
    pub recorded_at: Option<NaiveDateTime>,
    #[schema(example = 4)]
    pub mood: i32,
    #[schema(example = "Dia tranquilo, caminhei no parque.")]
    pub note: String,
    /// Catalog activities performed that day.
    #[serde(default)]
    pub activity_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiaryEntryResponse {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub mood: i32,
    pub note: String,
    /// Comma-joined activity labels, the shape the history screen renders.
    #[schema(example = "Caminhada ao ar livre, Leitura")]
    pub activities_csv: String,
}

enum EntryFailure {
    UnknownActivity,
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for EntryFailure {
    fn from(e: diesel::result::Error) -> Self {
        if is_foreign_key_violation(&e) {
            Self::UnknownActivity
        } else {
            Self::Db(e)
        }
    }
}

/// Records a diary entry with its activity tags atomically.
#[utoipa::path(
    post,
    path = "/diary",
    tag = "Diário",
    request_body = CreateDiaryEntryRequest,
    responses(
        (status = 201, description = "Entry recorded", body = DiaryEntryResponse),
        (status = 422, description = "Empty note or unknown activity", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateDiaryEntryRequest>,
) -> ApiResult<(StatusCode, Json<DiaryEntryResponse>)> {
    let patient_id = session_user_id(&claims)?;

    let note = payload.note.trim().to_string();
    if note.is_empty() {
        return Err(ApiError::validation("Preencha todos os campos obrigatórios."));
    }

    let mut activity_ids = payload.activity_ids;
    activity_ids.sort();
    activity_ids.dedup();

    let recorded_at = payload
        .recorded_at
        .unwrap_or_else(|| Utc::now().naive_utc());

    let mut conn = get_db_conn(&state.db_pool)?;

    let result = conn.transaction::<DiaryEntry, EntryFailure, _>(|conn| {
        let entry: DiaryEntry = diesel::insert_into(diary_entries::table)
            .values(&NewDiaryEntry {
                patient_id,
                recorded_at,
                mood: payload.mood,
                note: note.clone(),
            })
            .get_result(conn)?;

        let tags: Vec<DiaryEntryActivity> = activity_ids
            .iter()
            .map(|&activity_id| DiaryEntryActivity {
                entry_id: entry.id,
                activity_id,
            })
            .collect();

        diesel::insert_into(diary_entry_activities::table)
            .values(&tags)
            .execute(conn)?;

        Ok(entry)
    });

    let entry = result.map_err(|e| match e {
        EntryFailure::UnknownActivity => ApiError::validation("Atividade não encontrada."),
        EntryFailure::Db(e) => {
            error!(error = %e, "Failed to record diary entry");
            ApiError::storage()
        }
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let activities_csv = labels_for_entries(&mut conn, &[entry.id])?
        .remove(&entry.id)
        .unwrap_or_default();

    info!(entry_id = %entry.id, patient_id = %patient_id, "Diary entry recorded");

    Ok((
        StatusCode::CREATED,
        Json(DiaryEntryResponse {
            id: entry.id,
            patient_id: entry.patient_id,
            recorded_at: entry.recorded_at,
            mood: entry.mood,
            note: entry.note,
            activities_csv,
        }),
    ))
}

/// Returns a patient's diary history, newest first. Patients read their own
/// history; a psychologist reads the history of a linked patient.
#[utoipa::path(
    get,
    path = "/diary/history/{patient_id}",
    tag = "Diário",
    params(("patient_id" = Uuid, Path, description = "Patient whose history to read")),
    responses(
        (status = 200, description = "Diary history", body = [DiaryEntryResponse]),
        (status = 403, description = "Not the patient nor their psychologist", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Json<Vec<DiaryEntryResponse>>> {
    let caller_id = session_user_id(&claims)?;

    let mut conn = get_db_conn(&state.db_pool)?;

    if caller_id != patient_id {
        let is_linked: bool = diesel::select(diesel::dsl::exists(
            patient_links::table
                .filter(patient_links::patient_id.eq(patient_id))
                .filter(patient_links::psychologist_id.eq(caller_id)),
        ))
        .get_result(&mut conn)
        .map_err(|e| storage_error("check patient link", e))?;

        if !is_linked {
            return Err(ApiError::forbidden("Acesso negado."));
        }
    }

    let entries: Vec<DiaryEntry> = diary_entries::table
        .filter(diary_entries::patient_id.eq(patient_id))
        .order(diary_entries::recorded_at.desc())
        .select(DiaryEntry::as_select())
        .load(&mut conn)
        .map_err(|e| storage_error("load diary history", e))?;

    let entry_ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
    let mut labels = labels_for_entries(&mut conn, &entry_ids)?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| {
                let activities_csv = labels.remove(&entry.id).unwrap_or_default();
                DiaryEntryResponse {
                    id: entry.id,
                    patient_id: entry.patient_id,
                    recorded_at: entry.recorded_at,
                    mood: entry.mood,
                    note: entry.note,
                    activities_csv,
                }
            })
            .collect(),
    ))
}

/// Loads the tag labels for a batch of entries in one query and comma-joins
/// them per entry.
fn labels_for_entries(
    conn: &mut PgConnection,
    entry_ids: &[Uuid],
) -> ApiResult<HashMap<Uuid, String>> {
    if entry_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, String)> = diary_entry_activities::table
        .inner_join(activities::table)
        .filter(diary_entry_activities::entry_id.eq_any(entry_ids))
        .order((diary_entry_activities::entry_id, activities::label.asc()))
        .select((diary_entry_activities::entry_id, activities::label))
        .load(conn)
        .map_err(|e| storage_error("load entry activities", e))?;

    let mut labels: HashMap<Uuid, String> = HashMap::new();
    for (entry_id, label) in rows {
        match labels.entry(entry_id) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let joined = slot.get_mut();
                joined.push_str(", ");
                joined.push_str(&label);
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(label);
            }
        }
    }

    Ok(labels)
}
