//! SQLite Record Store
//!
//! Durable `RecordStore` over a single SQLite connection.
//!
//! ## Transactions
//!
//! Every transaction is opened with `BEGIN IMMEDIATE`, taking the write lock
//! up front so two claimants can never both read a row as pending. Claims are
//! conditional `UPDATE ... WHERE id = ? AND status = ?` statements whose
//! affected-row count tells the caller whether it won. An uncommitted
//! `rusqlite::Transaction` rolls back when dropped.
//!
//! ## Tables
//!
//! - `donations` - offers, with `accepted_by` set once accepted
//! - `requests` - needs, with a unique `matched_donation_id` once matched
//! - `schema_version` - migration bookkeeping

pub mod schema;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    city_key, Donation, DonationDraft, DonationId, DonationStatus, PendingQuery, Request,
    RequestDraft, RequestId, RequestStatus, ScanOrder, StoreError, UserId,
};
use crate::ports::outbound::{
    RecordStore, StoreHealth, StoreSnapshot, StoreTransaction, SystemTimeSource, TimeSource,
};

const DONATION_COLUMNS: &str = "id, owner_id, donor_name, age, blood_group, organ, contact, city, \
     availability_date, medical_notes, requested_compensation, status, accepted_by, created_at";

const REQUEST_COLUMNS: &str = "id, requester_id, requester_name, age, blood_group, organ_needed, \
     contact, city, medical_reason, budget, status, matched_donation_id, created_at";

/// Map a driver error, keeping constraint failures distinguishable.
pub(crate) fn sql_error(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Constraint(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: T::Err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn donation_from_row(row: &Row<'_>) -> rusqlite::Result<Donation> {
    Ok(Donation {
        id: DonationId(row.get(0)?),
        owner: UserId(row.get(1)?),
        donor_name: row.get(2)?,
        age: row.get(3)?,
        blood_group: parsed(row, 4)?,
        organ: parsed(row, 5)?,
        contact: row.get(6)?,
        city: row.get(7)?,
        availability_date: row.get(8)?,
        medical_notes: row.get(9)?,
        requested_compensation: parsed::<Decimal>(row, 10)?,
        status: parsed(row, 11)?,
        accepted_by: row.get::<_, Option<i64>>(12)?.map(UserId),
        created_at: row.get::<_, i64>(13)? as u64,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<Request> {
    Ok(Request {
        id: RequestId(row.get(0)?),
        requester: UserId(row.get(1)?),
        requester_name: row.get(2)?,
        age: row.get(3)?,
        blood_group: parsed(row, 4)?,
        organ_needed: parsed(row, 5)?,
        contact: row.get(6)?,
        city: row.get(7)?,
        medical_reason: row.get(8)?,
        budget: parsed::<Decimal>(row, 9)?,
        status: parsed(row, 10)?,
        matched_donation: row.get::<_, Option<i64>>(11)?.map(DonationId),
        created_at: row.get::<_, i64>(12)? as u64,
    })
}

/// Build a pending-pool SELECT for either table.
fn pending_sql(
    table: &str,
    columns: &str,
    organ_column: &str,
    owner_column: &str,
    query: &PendingQuery,
) -> (String, Vec<Value>) {
    let mut clauses = vec!["status = 'pending'".to_string()];
    let mut values = Vec::new();

    if let Some(organ) = &query.filter.organ {
        clauses.push(format!("{organ_column} = ?"));
        values.push(Value::Text(organ.as_str().to_string()));
    }
    if let Some(group) = query.filter.blood_group {
        clauses.push("blood_group = ?".to_string());
        values.push(Value::Text(group.as_str().to_string()));
    }
    if let Some(city) = &query.filter.city {
        // Folded in Rust; SQLite's own case folding is ASCII-only.
        clauses.push("instr(city_key, ?) > 0".to_string());
        values.push(Value::Text(city_key(city)));
    }
    if let Some(owner) = query.owner {
        clauses.push(format!("{owner_column} = ?"));
        values.push(Value::Integer(owner.0));
    }

    let direction = match query.order {
        ScanOrder::OldestFirst => "ASC",
        ScanOrder::NewestFirst => "DESC",
    };
    let mut sql = format!(
        "SELECT {columns} FROM {table} WHERE {} ORDER BY created_at {direction}, id {direction}",
        clauses.join(" AND ")
    );
    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        values.push(Value::Integer(limit as i64));
    }
    (sql, values)
}

fn fetch_donation(conn: &Connection, id: DonationId) -> Result<Option<Donation>, StoreError> {
    conn.query_row(
        &format!("SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?"),
        params![id.0],
        donation_from_row,
    )
    .optional()
    .map_err(sql_error)
}

fn fetch_request(conn: &Connection, id: RequestId) -> Result<Option<Request>, StoreError> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"),
        params![id.0],
        request_from_row,
    )
    .optional()
    .map_err(sql_error)
}

fn query_rows<T>(
    conn: &Connection,
    sql: &str,
    values: Vec<Value>,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare_cached(sql).map_err(sql_error)?;
    let rows = stmt
        .query_map(params_from_iter(values), map)
        .map_err(sql_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sql_error)
}

fn select_pending_donations(
    conn: &Connection,
    query: &PendingQuery,
) -> Result<Vec<Donation>, StoreError> {
    let (sql, values) = pending_sql("donations", DONATION_COLUMNS, "organ", "owner_id", query);
    query_rows(conn, &sql, values, donation_from_row)
}

fn select_pending_requests(
    conn: &Connection,
    query: &PendingQuery,
) -> Result<Vec<Request>, StoreError> {
    let (sql, values) = pending_sql(
        "requests",
        REQUEST_COLUMNS,
        "organ_needed",
        "requester_id",
        query,
    );
    query_rows(conn, &sql, values, request_from_row)
}

/// One open `BEGIN IMMEDIATE` transaction.
struct SqliteTransaction<'c> {
    tx: rusqlite::Transaction<'c>,
    now: i64,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn donation_for_update(&mut self, id: DonationId) -> Result<Option<Donation>, StoreError> {
        fetch_donation(&self.tx, id)
    }

    fn request_for_update(&mut self, id: RequestId) -> Result<Option<Request>, StoreError> {
        fetch_request(&self.tx, id)
    }

    fn request_linked_to(&mut self, donation: DonationId) -> Result<Option<Request>, StoreError> {
        self.tx
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE matched_donation_id = ?"),
                params![donation.0],
                request_from_row,
            )
            .optional()
            .map_err(sql_error)
    }

    fn pending_donations(&mut self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError> {
        select_pending_donations(&self.tx, query)
    }

    fn pending_requests(&mut self, query: &PendingQuery) -> Result<Vec<Request>, StoreError> {
        select_pending_requests(&self.tx, query)
    }

    fn insert_pending_donation(
        &mut self,
        owner: UserId,
        draft: &DonationDraft,
    ) -> Result<Donation, StoreError> {
        self.tx
            .execute(
                "INSERT INTO donations (owner_id, donor_name, age, blood_group, organ, contact,
                    city, city_key, availability_date, medical_notes, requested_compensation,
                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    owner.0,
                    draft.donor_name,
                    draft.age,
                    draft.blood_group.as_str(),
                    draft.organ.as_str(),
                    draft.contact,
                    draft.city,
                    city_key(&draft.city),
                    draft.availability_date,
                    draft.medical_notes,
                    draft.requested_compensation.to_string(),
                    self.now,
                ],
            )
            .map_err(sql_error)?;
        let id = DonationId(self.tx.last_insert_rowid());
        fetch_donation(&self.tx, id)?
            .ok_or_else(|| StoreError::Backend(format!("donation {id} vanished after insert")))
    }

    fn insert_pending_request(
        &mut self,
        requester: UserId,
        draft: &RequestDraft,
    ) -> Result<Request, StoreError> {
        self.tx
            .execute(
                "INSERT INTO requests (requester_id, requester_name, age, blood_group,
                    organ_needed, contact, city, city_key, medical_reason, budget, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    requester.0,
                    draft.requester_name,
                    draft.age,
                    draft.blood_group.as_str(),
                    draft.organ_needed.as_str(),
                    draft.contact,
                    draft.city,
                    city_key(&draft.city),
                    draft.medical_reason,
                    draft.budget.to_string(),
                    self.now,
                ],
            )
            .map_err(sql_error)?;
        let id = RequestId(self.tx.last_insert_rowid());
        fetch_request(&self.tx, id)?
            .ok_or_else(|| StoreError::Backend(format!("request {id} vanished after insert")))
    }

    fn conditional_update_donation(
        &mut self,
        id: DonationId,
        expected: DonationStatus,
        next: DonationStatus,
        accepted_by: UserId,
    ) -> Result<u64, StoreError> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                from: expected.as_str(),
                to: next.as_str(),
            });
        }
        let changed = self
            .tx
            .execute(
                "UPDATE donations SET status = ?1, accepted_by = ?2 WHERE id = ?3 AND status = ?4",
                params![next.as_str(), accepted_by.0, id.0, expected.as_str()],
            )
            .map_err(sql_error)?;
        Ok(changed as u64)
    }

    fn conditional_update_request(
        &mut self,
        id: RequestId,
        expected: RequestStatus,
        next: RequestStatus,
        donation: DonationId,
    ) -> Result<u64, StoreError> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                from: expected.as_str(),
                to: next.as_str(),
            });
        }
        let changed = self
            .tx
            .execute(
                "UPDATE requests SET status = ?1, matched_donation_id = ?2
                 WHERE id = ?3 AND status = ?4",
                params![next.as_str(), donation.0, id.0, expected.as_str()],
            )
            .map_err(sql_error)?;
        Ok(changed as u64)
    }
}

/// SQLite-backed record store.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn TimeSource>,
}

impl SqliteRecordStore {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("[matching] Opening SQLite database at {:?}", path);

        let conn = Connection::open(path).map_err(sql_error)?;
        conn.busy_timeout(busy_timeout).map_err(sql_error)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(sql_error)?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("[matching] Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(sql_error)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(sql_error)?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemTimeSource),
        })
    }

    /// Replace the clock used to stamp new rows.
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Flush and close the connection.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self.conn.into_inner();
        if let Err(e) = conn.execute_batch("PRAGMA optimize;") {
            warn!("[matching] PRAGMA optimize failed on close: {}", e);
        }
        conn.close().map_err(|(_, e)| sql_error(e))?;
        info!("[matching] SQLite database closed");
        Ok(())
    }

    fn count_pending(conn: &Connection, table: &str) -> Result<u64, StoreError> {
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE status = 'pending'"),
                [],
                |row| row.get(0),
            )
            .map_err(sql_error)?;
        Ok(count as u64)
    }
}

impl RecordStore for SqliteRecordStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_error)?;
        let mut scoped = SqliteTransaction {
            tx,
            now: self.clock.now() as i64,
        };
        let value = f(&mut scoped)?;
        scoped.tx.commit().map_err(sql_error)?;
        Ok(value)
    }

    fn get_donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError> {
        fetch_donation(&self.conn.lock(), id)
    }

    fn get_request(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        fetch_request(&self.conn.lock(), id)
    }

    fn scan_pending_donations(&self, query: &PendingQuery) -> Result<Vec<Donation>, StoreError> {
        select_pending_donations(&self.conn.lock(), query)
    }

    fn scan_pending_requests(&self, query: &PendingQuery) -> Result<Vec<Request>, StoreError> {
        select_pending_requests(&self.conn.lock(), query)
    }

    fn donations_owned_by(&self, owner: UserId) -> Result<Vec<Donation>, StoreError> {
        query_rows(
            &self.conn.lock(),
            &format!(
                "SELECT {DONATION_COLUMNS} FROM donations WHERE owner_id = ?
                 ORDER BY created_at DESC, id DESC"
            ),
            vec![Value::Integer(owner.0)],
            donation_from_row,
        )
    }

    fn requests_owned_by(&self, requester: UserId) -> Result<Vec<Request>, StoreError> {
        query_rows(
            &self.conn.lock(),
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM requests WHERE requester_id = ?
                 ORDER BY created_at DESC, id DESC"
            ),
            vec![Value::Integer(requester.0)],
            request_from_row,
        )
    }

    fn request_matched_to(&self, donation: DonationId) -> Result<Option<Request>, StoreError> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE matched_donation_id = ?"),
                params![donation.0],
                request_from_row,
            )
            .optional()
            .map_err(sql_error)
    }

    fn health_check(&self) -> Result<StoreHealth, StoreError> {
        let conn = self.conn.lock();
        Ok(StoreHealth {
            backend: "sqlite".into(),
            now: self.clock.now(),
            pending_donations: Self::count_pending(&conn, "donations")?,
            pending_requests: Self::count_pending(&conn, "requests")?,
        })
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let conn = self.conn.lock();
        Ok(StoreSnapshot {
            donations: query_rows(
                &conn,
                &format!("SELECT {DONATION_COLUMNS} FROM donations ORDER BY id"),
                Vec::new(),
                donation_from_row,
            )?,
            requests: query_rows(
                &conn,
                &format!("SELECT {REQUEST_COLUMNS} FROM requests ORDER BY id"),
                Vec::new(),
                request_from_row,
            )?,
        })
    }
}
