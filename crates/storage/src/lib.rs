use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use spend_goals_core::store::{GoalStore, StoreError};
use spend_goals_core::types::{SpendingGoal, TierType, ValidatedGoal};

/// SQLite extended result code for a violated UNIQUE constraint.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to the spending goal repository.
    pub fn goals(&self) -> GoalRepository {
        GoalRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// Errors raised while opening or migrating the database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// Repository backing [`GoalStore`] with the `spending_goals` table.
#[derive(Clone)]
pub struct GoalRepository {
    pool: SqlitePool,
}

const GOAL_COLUMNS: &str = "id, tenant, title, threshold_amount, tier_type, tier_value, \
     announcement_template, external_discount_ref, created_at, updated_at";

#[async_trait]
impl GoalStore for GoalRepository {
    async fn create(
        &self,
        tenant: &str,
        goal: &ValidatedGoal,
        external_ref: &str,
    ) -> Result<SpendingGoal, StoreError> {
        let now = to_rfc3339(Utc::now());
        let sql = format!(
            "INSERT INTO spending_goals ({GOAL_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {GOAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GoalRow>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(tenant)
            .bind(&goal.title)
            .bind(goal.threshold_amount.to_string())
            .bind(goal.reward.tier_type().as_str())
            .bind(goal.reward.value().map(|value| value.to_string()))
            .bind(&goal.announcement_template)
            .bind(external_ref)
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;

        row.into_domain()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<SpendingGoal>, StoreError> {
        let sql = format!("SELECT {GOAL_COLUMNS} FROM spending_goals WHERE id = ?");
        let row = sqlx::query_as::<_, GoalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(GoalRow::into_domain).transpose()
    }

    async fn update(
        &self,
        id: &str,
        goal: &ValidatedGoal,
        external_ref: &str,
    ) -> Result<SpendingGoal, StoreError> {
        let sql = format!(
            "UPDATE spending_goals \
             SET title = ?, threshold_amount = ?, tier_type = ?, tier_value = ?, \
                 announcement_template = ?, external_discount_ref = ?, updated_at = ? \
             WHERE id = ? \
             RETURNING {GOAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GoalRow>(&sql)
            .bind(&goal.title)
            .bind(goal.threshold_amount.to_string())
            .bind(goal.reward.tier_type().as_str())
            .bind(goal.reward.value().map(|value| value.to_string()))
            .bind(&goal.announcement_template)
            .bind(external_ref)
            .bind(to_rfc3339(Utc::now()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?
            .ok_or(StoreError::NotFound)?;

        row.into_domain()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM spending_goals WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_by_tenant(&self, tenant: &str) -> Result<Vec<SpendingGoal>, StoreError> {
        let sql = format!(
            "SELECT {GOAL_COLUMNS} FROM spending_goals WHERE tenant = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, GoalRow>(&sql)
            .bind(tenant)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut goals = rows
            .into_iter()
            .map(GoalRow::into_domain)
            .collect::<Result<Vec<_>, _>>()?;
        // Amounts are stored as text, so order numerically here.
        goals.sort_by(|a, b| a.threshold_amount.cmp(&b.threshold_amount));
        Ok(goals)
    }
}

/// Raw `spending_goals` row.
#[derive(Debug, sqlx::FromRow)]
struct GoalRow {
    id: String,
    tenant: String,
    title: String,
    threshold_amount: String,
    tier_type: String,
    tier_value: Option<String>,
    announcement_template: String,
    external_discount_ref: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GoalRow {
    fn into_domain(self) -> Result<SpendingGoal, StoreError> {
        let tier_type = TierType::from_str(&self.tier_type)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let threshold_amount = parse_decimal("threshold_amount", &self.threshold_amount)?;
        let tier_value = self
            .tier_value
            .as_deref()
            .map(|raw| parse_decimal("tier_value", raw))
            .transpose()?;

        Ok(SpendingGoal {
            id: self.id,
            tenant: self.tenant,
            title: self.title,
            threshold_amount,
            tier_type,
            tier_value,
            announcement_template: self.announcement_template,
            external_discount_ref: self.external_discount_ref,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|err| StoreError::Corrupt(format!("{column}: {err}")))
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err)
            if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) =>
        {
            StoreError::FreeShippingConflict
        }
        other => backend(other),
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(err))
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
