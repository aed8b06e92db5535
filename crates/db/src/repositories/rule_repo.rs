//! Repository for the `rules` and `referential_versions` tables.

use rulesref_core::ports::RuleQuery;
use rulesref_core::rules::RuleRecord;
use rulesref_core::types::TenantId;
use sqlx::{PgConnection, PgPool};

use crate::models::rule::RuleRow;

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `rules` SELECT queries.
const COLUMNS: &str = "\
    id, tenant, rule_id, rule_type, rule_value, rule_duration, \
    rule_measurement, rule_description, creation_date, update_date";

/// Column list for INSERT (excludes auto-generated `id`).
const INSERT_COLUMNS: &str = "\
    tenant, rule_id, rule_type, rule_value, rule_duration, \
    rule_measurement, rule_description, creation_date, update_date";

const INSERT_ARITY: usize = 9;

/// Rows per INSERT statement. PostgreSQL caps a statement at 65535 bind
/// parameters.
pub const INSERT_CHUNK: usize = 1000;

/// `INSERT ... VALUES ($1, ..., $9), ($10, ...)` for `rows` rows.
fn insert_statement(rows: usize) -> String {
    let mut query = format!("INSERT INTO rules ({INSERT_COLUMNS}) VALUES ");
    for n in 0..rows {
        if n > 0 {
            query.push_str(", ");
        }
        let first = n * INSERT_ARITY + 1;
        let placeholders: Vec<String> = (first..first + INSERT_ARITY)
            .map(|i| format!("${i}"))
            .collect();
        query.push_str(&format!("({})", placeholders.join(", ")));
    }
    query
}

// ---------------------------------------------------------------------------
// RuleRepo
// ---------------------------------------------------------------------------

/// Query and mutation operations on a tenant's rules.
///
/// Mutations take a connection so callers can group them in one transaction.
pub struct RuleRepo;

impl RuleRepo {
    pub async fn exists_any(pool: &PgPool, tenant: TenantId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM rules WHERE tenant = $1)")
            .bind(tenant)
            .fetch_one(pool)
            .await
    }

    /// All rules of a tenant in insertion order.
    pub async fn list(pool: &PgPool, tenant: TenantId) -> Result<Vec<RuleRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rules WHERE tenant = $1 ORDER BY id ASC");
        sqlx::query_as::<_, RuleRow>(&query)
            .bind(tenant)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_rule_id(
        pool: &PgPool,
        tenant: TenantId,
        rule_id: &str,
    ) -> Result<Option<RuleRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rules WHERE tenant = $1 AND rule_id = $2");
        sqlx::query_as::<_, RuleRow>(&query)
            .bind(tenant)
            .bind(rule_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_query(
        pool: &PgPool,
        tenant: TenantId,
        filter: &RuleQuery,
    ) -> Result<Vec<RuleRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM rules \
             WHERE tenant = $1 \
               AND ($2::TEXT IS NULL OR rule_type = $2) \
               AND ($3::TEXT[] IS NULL OR rule_id = ANY($3)) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, RuleRow>(&query)
            .bind(tenant)
            .bind(filter.rule_type.map(|t| t.as_str()))
            .bind(filter.rule_ids.as_deref())
            .fetch_all(pool)
            .await
    }

    /// Batch insert, [`INSERT_CHUNK`] rows per multi-row INSERT.
    ///
    /// Every chunk runs on `conn`, so a surrounding transaction covers the
    /// whole batch.
    pub async fn insert_many(
        conn: &mut PgConnection,
        tenant: TenantId,
        records: &[RuleRecord],
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for chunk in records.chunks(INSERT_CHUNK) {
            let query = insert_statement(chunk.len());
            let mut q = sqlx::query(&query);
            for record in chunk {
                q = q
                    .bind(tenant)
                    .bind(&record.rule_id)
                    .bind(record.rule_type.as_str())
                    .bind(&record.rule_value)
                    .bind(record.rule_duration.to_string())
                    .bind(record.rule_measurement.as_str())
                    .bind(&record.rule_description)
                    .bind(record.creation_date)
                    .bind(record.update_date);
            }
            inserted += q.execute(&mut *conn).await?.rows_affected();
        }
        Ok(inserted)
    }

    pub async fn update(
        conn: &mut PgConnection,
        tenant: TenantId,
        record: &RuleRecord,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rules SET \
                rule_type = $3, rule_value = $4, rule_duration = $5, \
                rule_measurement = $6, rule_description = $7, update_date = $8 \
             WHERE tenant = $1 AND rule_id = $2",
        )
        .bind(tenant)
        .bind(&record.rule_id)
        .bind(record.rule_type.as_str())
        .bind(&record.rule_value)
        .bind(record.rule_duration.to_string())
        .bind(record.rule_measurement.as_str())
        .bind(&record.rule_description)
        .bind(record.update_date)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_by_rule_ids(
        conn: &mut PgConnection,
        tenant: TenantId,
        rule_ids: &[String],
    ) -> Result<u64, sqlx::Error> {
        if rule_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM rules WHERE tenant = $1 AND rule_id = ANY($2)")
            .bind(tenant)
            .bind(rule_ids)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Increment and return the tenant's referential version, starting at 1.
    pub async fn bump_version(conn: &mut PgConnection, tenant: TenantId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO referential_versions (tenant, version) VALUES ($1, 1) \
             ON CONFLICT (tenant) DO UPDATE \
                SET version = referential_versions.version + 1, updated_at = NOW() \
             RETURNING version",
        )
        .bind(tenant)
        .fetch_one(conn)
        .await
    }

    pub async fn current_version(pool: &PgPool, tenant: TenantId) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT version FROM referential_versions WHERE tenant = $1")
            .bind(tenant)
            .fetch_optional(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_stays_under_bind_parameter_limit() {
        let query = insert_statement(INSERT_CHUNK);
        let last = format!("${}", INSERT_CHUNK * INSERT_ARITY);
        assert!(query.ends_with(&format!("{last})")));
        assert!(INSERT_CHUNK * INSERT_ARITY <= u16::MAX as usize);
    }

    #[test]
    fn placeholders_continue_across_rows() {
        assert!(insert_statement(2).ends_with("($1, $2, $3, $4, $5, $6, $7, $8, $9), \
             ($10, $11, $12, $13, $14, $15, $16, $17, $18)"));
    }
}
