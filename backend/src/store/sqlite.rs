use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tokenless_common::{MealRequest, MealType, RequestFilter, RequestStatus, Role, User};

/// SQLite-backed store for the `users` and `meal_requests` collections.
///
/// Holds a single shared connection that is opened on first use, checked
/// with `SELECT 1` before each reuse, and reopened when that check fails.
pub struct Store {
    path: String,
    conn: Mutex<Option<Connection>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Constraint(err.to_string()),
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Fields an admin may change on a user. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_onboarded: Option<bool>,
}

const USER_COLUMNS: &str =
    "uid, display_name, email, role, is_onboarded, is_blocked, created_at, updated_at, approved_at";

const REQUEST_COLUMNS: &str = "id, student_id, student_name, student_email, meal_type, token_id, \
     status, is_blocked, requested_at, updated_at";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        uid TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        email TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'student',
        is_onboarded INTEGER NOT NULL DEFAULT 0,
        is_blocked INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        approved_at TEXT
    );

    CREATE TABLE IF NOT EXISTS meal_requests (
        id TEXT PRIMARY KEY,
        student_id TEXT NOT NULL,
        student_name TEXT NOT NULL,
        student_email TEXT NOT NULL,
        meal_type TEXT NOT NULL,
        token_id TEXT NOT NULL,
        status TEXT NOT NULL,
        is_blocked INTEGER NOT NULL DEFAULT 0,
        day_bucket TEXT NOT NULL,
        requested_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at);
    CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
    CREATE INDEX IF NOT EXISTS idx_meal_requests_student_id ON meal_requests(student_id);
    CREATE INDEX IF NOT EXISTS idx_meal_requests_requested_at ON meal_requests(requested_at);

    -- At most one pending request per student, meal and day.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_meal_requests_one_pending
        ON meal_requests(student_id, meal_type, day_bucket)
        WHERE status = 'pending';
";

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_enum<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = tokenless_common::ParseError>,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let approved_at: Option<String> = row.get(8)?;
    Ok(User {
        uid: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        role: parse_enum(3, &row.get::<_, String>(3)?)?,
        is_onboarded: row.get::<_, i32>(4)? != 0,
        is_blocked: row.get::<_, i32>(5)? != 0,
        created_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_ts(7, &row.get::<_, String>(7)?)?,
        approved_at: approved_at.map(|v| parse_ts(8, &v)).transpose()?,
    })
}

fn request_from_row(row: &Row) -> rusqlite::Result<MealRequest> {
    Ok(MealRequest {
        id: row.get(0)?,
        student_id: row.get(1)?,
        student_name: row.get(2)?,
        student_email: row.get(3)?,
        meal_type: parse_enum(4, &row.get::<_, String>(4)?)?,
        token_id: row.get(5)?,
        status: parse_enum(6, &row.get::<_, String>(6)?)?,
        is_blocked: row.get::<_, i32>(7)? != 0,
        requested_at: parse_ts(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_ts(9, &row.get::<_, String>(9)?)?,
    })
}

fn find_request_in(conn: &Connection, id: &str) -> rusqlite::Result<Option<MealRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM meal_requests WHERE id = ?1"),
        params![id],
        request_from_row,
    )
    .optional()
}

fn find_user_in(conn: &Connection, uid: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"),
        params![uid],
        user_from_row,
    )
    .optional()
}

impl Store {
    /// Create a store for `database_url`. The connection itself is opened lazily.
    pub fn new(database_url: &str) -> Self {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            path: path.to_string(),
            conn: Mutex::new(None),
        }
    }

    /// Create a store and open its connection immediately.
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        let store = Self::new(database_url);
        store.with_conn(|_| Ok(()))?;
        Ok(store)
    }

    fn connect(path: &str) -> Result<Connection, StoreError> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Store connected to database: {}", path);
        Ok(conn)
    }

    fn is_alive(conn: &Connection) -> bool {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }

    /// Run `f` against the shared connection, (re)connecting as needed.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if guard.as_ref().is_some_and(|conn| !Self::is_alive(conn)) {
            tracing::warn!("Store connection stale, reconnecting");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(Self::connect(&self.path)?);
        }

        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(StoreError::Database("connection unavailable".to_string())),
        }
    }

    /// Liveness check used by the health endpoint.
    pub fn ping(&self) -> bool {
        self.with_conn(|_| Ok(())).is_ok()
    }

    // ========== Users ==========

    pub fn find_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| Ok(find_user_in(conn, uid)?))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 LIMIT 1"),
                    params![email],
                    user_from_row,
                )
                .optional()?)
        })
    }

    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    user.uid,
                    user.display_name,
                    user.email,
                    user.role.as_str(),
                    user.is_onboarded,
                    user.is_blocked,
                    format_ts(&user.created_at),
                    format_ts(&user.updated_at),
                    user.approved_at.as_ref().map(format_ts),
                ],
            )?;
            tracing::debug!("Inserted user: {}", user.uid);
            Ok(())
        })
    }

    /// Find a user by subject id, creating it from `template` when absent.
    ///
    /// An existing user's email is refreshed when the identity provider
    /// supplies a non-empty one.
    pub fn find_or_create_user(&self, template: &User) -> Result<(User, bool), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let result = match find_user_in(&tx, &template.uid)? {
                Some(mut existing) => {
                    if !template.email.is_empty() && template.email != existing.email {
                        tx.execute(
                            "UPDATE users SET email = ?1, updated_at = ?2 WHERE uid = ?3",
                            params![template.email, format_ts(&Utc::now()), template.uid],
                        )?;
                        existing.email = template.email.clone();
                    }
                    (existing, false)
                }
                None => {
                    tx.execute(
                        &format!(
                            "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                        ),
                        params![
                            template.uid,
                            template.display_name,
                            template.email,
                            template.role.as_str(),
                            template.is_onboarded,
                            template.is_blocked,
                            format_ts(&template.created_at),
                            format_ts(&template.updated_at),
                            template.approved_at.as_ref().map(format_ts),
                        ],
                    )?;
                    tracing::info!(
                        uid = %template.uid,
                        role = %template.role,
                        "Created new user on first sign-in"
                    );
                    let created = find_user_in(&tx, &template.uid)?.unwrap_or_else(|| template.clone());
                    (created, true)
                }
            };

            tx.commit()?;
            Ok(result)
        })
    }

    /// Users, newest first, optionally restricted to one role.
    pub fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 IS NULL OR role = ?1)
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let users = stmt
                .query_map(params![role.map(|r| r.as_str())], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }

    /// Users still waiting for onboarding approval, newest first.
    pub fn list_pending_onboarding(&self) -> Result<Vec<User>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE is_onboarded = 0
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }

    pub fn count_pending_onboarding(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM users WHERE is_onboarded = 0",
                [],
                |row| row.get::<_, i64>(0),
            )? as u64)
        })
    }

    /// Apply `update` and return the updated user, or `None` if absent.
    pub fn update_user(
        &self,
        uid: &str,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE users SET
                    display_name = COALESCE(?1, display_name),
                    email = COALESCE(?2, email),
                    role = COALESCE(?3, role),
                    is_onboarded = COALESCE(?4, is_onboarded),
                    updated_at = ?5
                 WHERE uid = ?6",
                params![
                    update.display_name,
                    update.email,
                    update.role.map(|r| r.as_str()),
                    update.is_onboarded,
                    format_ts(&now),
                    uid,
                ],
            )?;
            let user = if changed == 0 {
                None
            } else {
                find_user_in(&tx, uid)?
            };
            tx.commit()?;
            Ok(user)
        })
    }

    /// Mark a user onboarded, stamping `approved_at`.
    pub fn approve_user(&self, uid: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE users SET is_onboarded = 1, approved_at = ?1, updated_at = ?1 WHERE uid = ?2",
                params![format_ts(&now), uid],
            )?;
            let user = if changed == 0 {
                None
            } else {
                find_user_in(&tx, uid)?
            };
            tx.commit()?;
            Ok(user)
        })
    }

    /// Delete a user. Returns the number of rows removed.
    pub fn delete_user(&self, uid: &str) -> Result<usize, StoreError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE uid = ?1", params![uid])?))
    }

    // ========== Meal requests ==========

    /// Insert a new request. A second pending request for the same student,
    /// meal and `day_bucket` fails with [`StoreError::Constraint`].
    pub fn insert_request(&self, request: &MealRequest, day_bucket: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO meal_requests ({REQUEST_COLUMNS}, day_bucket)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    request.id,
                    request.student_id,
                    request.student_name,
                    request.student_email,
                    request.meal_type.as_str(),
                    request.token_id,
                    request.status.as_str(),
                    request.is_blocked,
                    format_ts(&request.requested_at),
                    format_ts(&request.updated_at),
                    day_bucket,
                ],
            )?;
            tracing::debug!("Inserted meal request: {}", request.id);
            Ok(())
        })
    }

    pub fn find_request(&self, id: &str) -> Result<Option<MealRequest>, StoreError> {
        self.with_conn(|conn| Ok(find_request_in(conn, id)?))
    }

    /// The pending request for `student_id` and `meal_type` on `day_bucket`, if any.
    pub fn find_pending_request(
        &self,
        student_id: &str,
        meal_type: MealType,
        day_bucket: &str,
    ) -> Result<Option<MealRequest>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {REQUEST_COLUMNS} FROM meal_requests
                         WHERE student_id = ?1 AND meal_type = ?2 AND day_bucket = ?3
                           AND status = 'pending'
                         LIMIT 1"
                    ),
                    params![student_id, meal_type.as_str(), day_bucket],
                    request_from_row,
                )
                .optional()?)
        })
    }

    /// Requests matching `filter`, newest first.
    pub fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<MealRequest>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM meal_requests
                 WHERE (?1 IS NULL OR student_id = ?1)
                   AND (?2 IS NULL OR status = ?2)
                   AND (?3 IS NULL OR meal_type = ?3)
                 ORDER BY requested_at DESC, rowid DESC"
            ))?;
            let requests = stmt
                .query_map(
                    params![
                        filter.student_id,
                        filter.status.map(|s| s.as_str()),
                        filter.meal_type.map(|m| m.as_str()),
                    ],
                    request_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
    }

    /// Whether any stored request for the student carries the block flag.
    pub fn has_blocked_request(&self, student_id: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM meal_requests WHERE student_id = ?1 AND is_blocked = 1)",
                params![student_id],
                |row| row.get::<_, i32>(0),
            )? != 0)
        })
    }

    pub fn count_requests(&self, status: RequestStatus) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM meal_requests WHERE status = ?1",
                params![status.as_str()],
                |row| row.get::<_, i64>(0),
            )? as u64)
        })
    }

    /// Set a request's status. When `expected` is given the update only
    /// applies if the current status matches it.
    ///
    /// Returns the updated request, or `None` if nothing matched.
    pub fn update_request_status(
        &self,
        id: &str,
        status: RequestStatus,
        expected: Option<RequestStatus>,
        now: DateTime<Utc>,
    ) -> Result<Option<MealRequest>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE meal_requests SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND (?4 IS NULL OR status = ?4)",
                params![
                    status.as_str(),
                    format_ts(&now),
                    id,
                    expected.map(|s| s.as_str()),
                ],
            )?;
            let request = if changed == 0 {
                None
            } else {
                find_request_in(&tx, id)?
            };
            tx.commit()?;
            Ok(request)
        })
    }

    /// Delete a request, returning the removed record.
    pub fn delete_request(&self, id: &str) -> Result<Option<MealRequest>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let existing = find_request_in(&tx, id)?;
            if existing.is_some() {
                tx.execute("DELETE FROM meal_requests WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(existing)
        })
    }

    /// Set the block flag on the user and mirror it onto all of the
    /// student's requests, in one transaction.
    ///
    /// Returns the number of requests whose flag actually changed.
    pub fn set_student_blocked(
        &self,
        student_id: &str,
        blocked: bool,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let now = format_ts(&now);
            tx.execute(
                "UPDATE users SET is_blocked = ?1, updated_at = ?2 WHERE uid = ?3",
                params![blocked, now, student_id],
            )?;
            let modified = tx.execute(
                "UPDATE meal_requests SET is_blocked = ?1, updated_at = ?2
                 WHERE student_id = ?3 AND is_blocked != ?1",
                params![blocked, now, student_id],
            )?;
            tx.commit()?;
            Ok(modified)
        })
    }
}
