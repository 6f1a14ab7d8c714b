//! Account queries.

use rusqlite::{OptionalExtension, Row, params};
use tether_core::{Account, Identity};
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;

const ACCOUNT_COLUMNS: &str = "id, email, password, name, role";

/// Input for creating an account out-of-band.
#[derive(Clone, Debug)]
pub struct NewAccount {
    /// Unique email.
    pub email: String,
    /// Credential secret.
    pub password: String,
    /// Display name.
    pub name: String,
    /// Role tag.
    pub role: String,
}

/// Repository over the `accounts` table.
#[derive(Clone)]
pub struct AccountRepo {
    db: Database,
}

fn column<T: rusqlite::types::FromSql>(
    row: &Row<'_>,
    idx: usize,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table: "accounts",
        column,
        detail: e.to_string(),
    })
}

fn account_from_row(row: &Row<'_>) -> Result<Account, StoreError> {
    Ok(Account {
        id: column(row, 0, "id")?,
        email: column(row, 1, "email")?,
        password: column(row, 2, "password")?,
        name: column(row, 3, "name")?,
        role: column(row, 4, "role")?,
    })
}

impl AccountRepo {
    /// Create a repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Account whose email and password both match.
    ///
    /// The password is compared as stored (plaintext).
    #[instrument(skip(self, secret), fields(identity = %identity))]
    pub fn find_by_credentials(
        &self,
        identity: &Identity,
        secret: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1 AND password = ?2"
            ))?;
            let mut rows = stmt.query(params![identity.as_str(), secret])?;
            match rows.next()? {
                Some(row) => account_from_row(row).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Account for an identity.
    #[instrument(skip(self), fields(identity = %identity))]
    pub fn find_by_identity(&self, identity: &Identity) -> Result<Option<Account>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"
            ))?;
            let mut rows = stmt.query(params![identity.as_str()])?;
            match rows.next()? {
                Some(row) => account_from_row(row).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Insert an account; a duplicate email is a [`StoreError::Conflict`].
    #[instrument(skip(self, account), fields(email = %account.email))]
    pub fn insert(&self, account: &NewAccount) -> Result<Account, StoreError> {
        self.db.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM accounts WHERE email = ?1",
                    [&account.email],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Conflict(format!(
                    "account {} already exists",
                    account.email
                )));
            }

            let _ = conn.execute(
                "INSERT INTO accounts (email, password, name, role) VALUES (?1, ?2, ?3, ?4)",
                params![account.email, account.password, account.name, account.role],
            )?;
            Ok(Account {
                id: conn.last_insert_rowid(),
                email: account.email.clone(),
                password: account.password.clone(),
                name: account.name.clone(),
                role: account.role.clone(),
            })
        })
    }

    /// All accounts ordered by id.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Account>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"
            ))?;
            let mut rows = stmt.query([])?;
            let mut accounts = Vec::new();
            while let Some(row) = rows.next()? {
                accounts.push(account_from_row(row)?);
            }
            Ok(accounts)
        })
    }

    /// Number of accounts.
    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or_default())
        })
    }
}
