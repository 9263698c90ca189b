use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role, fixed at registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Psychologist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Psychologist => "psychologist",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "psychologist" => Ok(Role::Psychologist),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl ToSql<Text, Pg> for Role {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for Role {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        std::str::from_utf8(bytes.as_bytes())?
            .parse()
            .map_err(|e: String| e.into())
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub birth_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub birth_date: NaiveDate,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::master_codes)]
pub struct MasterCode {
    pub id: Uuid,
    pub code: String,
    pub redeemed_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::master_codes)]
pub struct NewMasterCode {
    pub code: String,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::patient_codes)]
pub struct PatientCode {
    pub id: Uuid,
    pub code: String,
    pub issued_by: Uuid,
    pub redeemed_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::patient_codes)]
pub struct NewPatientCode {
    pub code: String,
    pub issued_by: Uuid,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::patient_links)]
pub struct PatientLink {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub psychologist_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::patient_links)]
pub struct NewPatientLink {
    pub patient_id: Uuid,
    pub psychologist_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::activities)]
pub struct Activity {
    pub id: Uuid,
    #[schema(example = "Caminhada ao ar livre")]
    pub label: String,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::activities)]
pub struct NewActivity {
    pub label: String,
    pub created_by: Uuid,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::diary_entries)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub mood: i32,
    pub note: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::diary_entries)]
pub struct NewDiaryEntry {
    pub patient_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub mood: i32,
    pub note: String,
}

#[derive(Debug, Insertable, Queryable)]
#[diesel(table_name = crate::schema::diary_entry_activities)]
pub struct DiaryEntryActivity {
    pub entry_id: Uuid,
    pub activity_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::consultation_notes)]
pub struct ConsultationNote {
    pub id: Uuid,
    pub psychologist_id: Uuid,
    pub patient_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub note: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::consultation_notes)]
pub struct NewConsultationNote {
    pub psychologist_id: Uuid,
    pub patient_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub note: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::agenda_slots)]
pub struct AgendaSlot {
    pub id: Uuid,
    pub psychologist_id: Uuid,
    pub starts_at: NaiveDateTime,
    pub patient_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::agenda_slots)]
pub struct NewAgendaSlot {
    pub psychologist_id: Uuid,
    pub starts_at: NaiveDateTime,
}
