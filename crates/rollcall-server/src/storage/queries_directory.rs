//! Person and tenant settings mirror.

use rollcall_core::db::unix_timestamp;

use super::db::{DatabaseError, RollcallDatabase};
use super::models::{Person, TenantSettings};

impl RollcallDatabase {
    /// Insert or refresh a person. Re-activates a deactivated person.
    pub async fn upsert_person(
        &self,
        id: i64,
        tenant_id: &str,
        name: &str,
        card_id: Option<&str>,
    ) -> Result<Person, DatabaseError> {
        let now = unix_timestamp();

        let person = sqlx::query_as::<_, Person>(
            r"
            INSERT INTO persons (id, tenant_id, name, card_id, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                name = excluded.name,
                card_id = excluded.card_id,
                is_active = 1,
                updated_at = excluded.updated_at
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(name)
        .bind(card_id)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(person)
    }

    pub async fn get_person(&self, id: i64) -> Result<Option<Person>, DatabaseError> {
        let person = sqlx::query_as::<_, Person>("SELECT * FROM persons WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(person)
    }

    /// Active person of a tenant carrying `card_id`.
    pub async fn find_person_by_card(
        &self,
        tenant_id: &str,
        card_id: &str,
    ) -> Result<Option<Person>, DatabaseError> {
        let person = sqlx::query_as::<_, Person>(
            r"
            SELECT * FROM persons
            WHERE tenant_id = ? AND card_id = ? AND is_active = 1
            ORDER BY id ASC
            LIMIT 1
            ",
        )
        .bind(tenant_id)
        .bind(card_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(person)
    }

    /// Active persons with a non-empty card: the ones every terminal of the
    /// tenant should hold.
    pub async fn list_enrollable_persons(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<Person>, DatabaseError> {
        let persons = sqlx::query_as::<_, Person>(
            r"
            SELECT * FROM persons
            WHERE tenant_id = ? AND is_active = 1 AND card_id IS NOT NULL AND card_id <> ''
            ORDER BY id ASC
            ",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        Ok(persons)
    }

    pub async fn deactivate_person(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE persons SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_tenant_settings(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantSettings>, DatabaseError> {
        let settings =
            sqlx::query_as::<_, TenantSettings>("SELECT * FROM tenant_settings WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(settings)
    }

    pub async fn set_tenant_settings(
        &self,
        tenant_id: &str,
        opening_time: &str,
        grace_minutes: i64,
    ) -> Result<TenantSettings, DatabaseError> {
        let settings = sqlx::query_as::<_, TenantSettings>(
            r"
            INSERT INTO tenant_settings (tenant_id, opening_time, grace_minutes, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (tenant_id) DO UPDATE SET
                opening_time = excluded.opening_time,
                grace_minutes = excluded.grace_minutes,
                updated_at = excluded.updated_at
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(opening_time)
        .bind(grace_minutes)
        .bind(unix_timestamp())
        .fetch_one(self.pool())
        .await?;

        Ok(settings)
    }
}
