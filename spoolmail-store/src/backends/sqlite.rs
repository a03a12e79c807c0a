use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqlitePoolOptions, SqliteRow},
};
use tracing::debug;

use crate::{EmailRecord, Filter, NewEmail, QueueStore, StoreError, scaffold};

/// Columns that may hold the arrival time, most preferred first
const CREATED_COLUMNS: [&str; 3] = ["created_on", "created_at", "created_date"];

/// Queue store backed by a SQLite table
///
/// The pool holds a single connection: the daemon is the only consumer of
/// the table, and `sqlite::memory:` databases are per-connection.
#[derive(Debug, Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteQueueStore {
    /// Connect to `url` and use the table named after `table_name`
    /// (`"Email"` uses the `emails` table).
    ///
    /// # Errors
    /// If the table name is not a usable identifier or the database cannot be opened
    pub async fn connect(url: &str, table_name: &str) -> crate::Result<Self> {
        let table = table_identifier(table_name)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        debug!(url, table = %table, "Connected to queue store");

        Ok(Self { pool, table })
    }

    /// Use an existing pool
    ///
    /// # Errors
    /// If the table name is not a usable identifier
    pub fn with_pool(pool: SqlitePool, table_name: &str) -> crate::Result<Self> {
        Ok(Self {
            pool,
            table: table_identifier(table_name)?,
        })
    }

    /// Create the queue table if it does not exist yet
    ///
    /// # Errors
    /// If the statement fails
    pub async fn migrate(&self) -> crate::Result<()> {
        sqlx::query(&scaffold::create_table_statement(&self.table, true))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn table_identifier(table_name: &str) -> crate::Result<String> {
    let table = scaffold::tableize(table_name);

    let valid = table
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(table)
    } else {
        Err(StoreError::InvalidTableName(table_name.to_string()))
    }
}

/// SQL narrowing for `filter`, with `NULL` attempts read as never attempted
///
/// The arrival time may live in any of `CREATED_COLUMNS`, so `Expired` is only
/// narrowed to attempted rows here and finished with [`Filter::matches`].
fn predicate(filter: &Filter) -> (&'static str, Option<i64>) {
    match *filter {
        Filter::All => ("1 = 1", None),
        Filter::Deliverable { attempted_before } => (
            "COALESCE(last_send_attempt, 0) < ?",
            Some(attempted_before),
        ),
        Filter::Expired { .. } => ("COALESCE(last_send_attempt, 0) > 0", None),
    }
}

const fn is_exact(filter: &Filter) -> bool {
    !matches!(filter, Filter::Expired { .. })
}

/// The first arrival time found among `CREATED_COLUMNS`, stored either as a
/// unix timestamp or as a datetime
fn arrival_time(row: &SqliteRow) -> Option<i64> {
    CREATED_COLUMNS.iter().find_map(|column| {
        row.try_get::<Option<i64>, _>(*column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<NaiveDateTime>, _>(*column)
                    .ok()
                    .flatten()
                    .map(|created| created.and_utc().timestamp())
            })
    })
}

fn email_from_row(row: &SqliteRow) -> Result<EmailRecord, sqlx::Error> {
    Ok(EmailRecord {
        id: row.try_get("id")?,
        mail: row.try_get::<Option<String>, _>("mail")?.unwrap_or_default(),
        from_address: row
            .try_get::<Option<String>, _>("from_address")?
            .unwrap_or_default(),
        to_address: row
            .try_get::<Option<String>, _>("to_address")?
            .unwrap_or_default(),
        last_send_attempt: row
            .try_get::<Option<i64>, _>("last_send_attempt")?
            .unwrap_or(0),
        created_on: arrival_time(row),
    })
}

fn emails_from_rows(rows: &[SqliteRow]) -> crate::Result<Vec<EmailRecord>> {
    rows.iter()
        .map(email_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn create(&self, email: NewEmail) -> crate::Result<EmailRecord> {
        let sql = format!(
            "INSERT INTO {} (mail, from_address, to_address, last_send_attempt, created_on) \
             VALUES (?, ?, ?, 0, ?) RETURNING *",
            self.table
        );

        let row = sqlx::query(&sql)
            .bind(&email.mail)
            .bind(&email.from_address)
            .bind(&email.to_address)
            .bind(email.created_on)
            .fetch_one(&self.pool)
            .await?;

        Ok(email_from_row(&row)?)
    }

    async fn find(&self, filter: &Filter, limit: Option<usize>) -> crate::Result<Vec<EmailRecord>> {
        let (clause, value) = predicate(filter);
        let exact = is_exact(filter);
        let sql = format!(
            "SELECT * FROM {} WHERE {clause} ORDER BY id ASC LIMIT ?",
            self.table
        );

        // SQLite treats a negative limit as no limit
        let sql_limit = match limit {
            Some(limit) if exact => i64::try_from(limit).unwrap_or(i64::MAX),
            _ => -1,
        };

        let mut query = sqlx::query(&sql);
        if let Some(value) = value {
            query = query.bind(value);
        }
        let rows = query.bind(sql_limit).fetch_all(&self.pool).await?;
        let emails = emails_from_rows(&rows)?;

        if exact {
            return Ok(emails);
        }

        Ok(emails
            .into_iter()
            .filter(|email| filter.matches(email))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn destroy_all(&self, filter: &Filter) -> crate::Result<Vec<EmailRecord>> {
        let doomed = self.find(filter, None).await?;
        if doomed.is_empty() {
            return Ok(doomed);
        }

        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let mut transaction = self.pool.begin().await?;
        for email in &doomed {
            sqlx::query(&sql)
                .bind(email.id)
                .execute(&mut *transaction)
                .await?;
        }
        transaction.commit().await?;

        debug!(table = %self.table, count = doomed.len(), "Deleted queued emails");
        Ok(doomed)
    }

    async fn destroy(&self, email: &EmailRecord) -> crate::Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        sqlx::query(&sql).bind(email.id).execute(&self.pool).await?;
        Ok(())
    }

    async fn save(&self, email: &EmailRecord) -> crate::Result<()> {
        let sql = format!(
            "UPDATE {} SET mail = ?, from_address = ?, to_address = ?, last_send_attempt = ? \
             WHERE id = ?",
            self.table
        );

        let result = sqlx::query(&sql)
            .bind(&email.mail)
            .bind(&email.from_address)
            .bind(&email.to_address)
            .bind(email.last_send_attempt)
            .bind(email.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(email.id));
        }

        Ok(())
    }
}
