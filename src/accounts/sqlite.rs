//! SQLite-based account store.

use super::{now_string, password, Account, AccountStore, AccountStoreError, NewAccount};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS accounts (
    username TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    is_staff INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;

/// Columns every accounts table has; anything else is a profile column.
const CORE_COLUMNS: &[&str] = &[
    "username",
    "email",
    "password_hash",
    "is_superuser",
    "is_staff",
    "created_at",
];

pub struct SqliteAccountStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteAccountStore {
    /// Open (or create) the account database at `path`.
    ///
    /// `profile_columns` are optional columns this deployment's schema carries;
    /// missing ones are added to an existing table.
    pub async fn open(
        path: impl Into<PathBuf>,
        profile_columns: &[String],
    ) -> Result<Self, AccountStoreError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AccountStoreError::Database(format!("Failed to create account store dir: {}", e))
            })?;
        }

        let db_path = path.clone();
        let columns = profile_columns.to_vec();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| {
                AccountStoreError::Database(format!("Failed to open SQLite database: {}", e))
            })?;
            conn.execute_batch(SCHEMA).map_err(|e| {
                AccountStoreError::Database(format!("Failed to run schema: {}", e))
            })?;
            Self::add_profile_columns(&conn, &columns)?;
            Ok::<_, AccountStoreError>(conn)
        })
        .await
        .map_err(|e| AccountStoreError::Internal(format!("Task join error: {}", e)))??;

        tracing::debug!("Opened account store at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory(profile_columns: &[String]) -> Result<Self, AccountStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Self::add_profile_columns(&conn, profile_columns)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Location of the database file, if on disk.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Profile columns currently present in the accounts table.
    pub async fn profile_columns(&self) -> Result<Vec<String>, AccountStoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut columns: Vec<String> = Self::table_columns(&conn)?
                .into_iter()
                .filter(|c| !CORE_COLUMNS.contains(&c.as_str()))
                .collect();
            columns.sort();
            Ok::<_, AccountStoreError>(columns)
        })
        .await
        .map_err(|e| AccountStoreError::Internal(format!("Task join error: {}", e)))?
    }

    fn add_profile_columns(conn: &Connection, columns: &[String]) -> Result<(), AccountStoreError> {
        let existing = Self::table_columns(conn)?;
        for column in columns {
            validate_identifier(column)?;
            if existing.contains(column) {
                continue;
            }
            tracing::info!(
                "Running migration: adding '{}' column to accounts table",
                column
            );
            conn.execute(
                &format!("ALTER TABLE accounts ADD COLUMN \"{}\" TEXT", column),
                [],
            )
            .map_err(|e| {
                AccountStoreError::Database(format!("Failed to add {} column: {}", column, e))
            })?;
        }
        Ok(())
    }

    fn table_columns(conn: &Connection) -> Result<HashSet<String>, AccountStoreError> {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('accounts')")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    fn insert(conn: &Connection, account: &NewAccount) -> Result<(), AccountStoreError> {
        let columns = Self::table_columns(conn)?;
        for (name, _) in &account.profile {
            if CORE_COLUMNS.contains(&name.as_str()) || !columns.contains(name) {
                return Err(AccountStoreError::UnknownField(name.clone()));
            }
        }

        let mut names: Vec<String> = CORE_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut values = vec![
            Value::Text(account.username.clone()),
            Value::Text(account.email.trim().to_string()),
            Value::Text(password::hash_password(&account.password)),
            Value::Integer(1),
            Value::Integer(1),
            Value::Text(now_string()),
        ];
        for (name, value) in &account.profile {
            names.push(name.clone());
            values.push(Value::Text(value.clone()));
        }

        let column_list = names
            .iter()
            .map(|n| format!("\"{}\"", n))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=names.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO accounts ({}) VALUES ({})",
            column_list, placeholders
        );

        match conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(AccountStoreError::AlreadyExists(account.username.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_identifier(name: &str) -> Result<(), AccountStoreError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AccountStoreError::Validation(format!(
            "invalid column name '{}'",
            name
        )))
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    async fn exists(&self, username: &str) -> Result<bool, AccountStoreError> {
        let conn = self.conn.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let found = conn
                .prepare("SELECT 1 FROM accounts WHERE username = ?1")?
                .exists(params![username])?;
            Ok::<_, AccountStoreError>(found)
        })
        .await
        .map_err(|e| AccountStoreError::Internal(format!("Task join error: {}", e)))?
    }

    async fn get_account(&self, username: &str) -> Result<Option<Account>, AccountStoreError> {
        let conn = self.conn.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare("SELECT * FROM accounts WHERE username = ?1")?;
            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(|n| n.to_string())
                .collect();

            let account = stmt
                .query_row(params![username], |row| {
                    let mut profile = BTreeMap::new();
                    for (idx, name) in names.iter().enumerate() {
                        if CORE_COLUMNS.contains(&name.as_str()) {
                            continue;
                        }
                        if let Some(value) = row.get::<_, Option<String>>(idx)? {
                            profile.insert(name.clone(), value);
                        }
                    }
                    Ok(Account {
                        username: row.get("username")?,
                        email: row.get("email")?,
                        password_hash: row.get("password_hash")?,
                        is_superuser: row.get("is_superuser")?,
                        is_staff: row.get("is_staff")?,
                        profile,
                        created_at: row.get("created_at")?,
                    })
                })
                .optional()?;
            Ok::<_, AccountStoreError>(account)
        })
        .await
        .map_err(|e| AccountStoreError::Internal(format!("Task join error: {}", e)))?
    }

    async fn create_admin(&self, account: &NewAccount) -> Result<(), AccountStoreError> {
        account.validate()?;
        // Wait for the connection here, not on the blocking pool, so a caller
        // that gives up while queued never gets a late insert.
        let conn = self.conn.clone().lock_owned().await;
        let account = account.clone();
        tokio::task::spawn_blocking(move || Self::insert(&conn, &account))
        .await
        .map_err(|e| AccountStoreError::Internal(format!("Task join error: {}", e)))?
    }
}
