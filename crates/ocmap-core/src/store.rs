use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::types::{AddressRecord, Coordinate};

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Source of outstanding addresses and sink for resolved coordinates.
///
/// A record is outstanding when its coordinate is unset (`NULL`), its
/// address is not in the target set, it is not a cadastral-lot reference and
/// its motivation is not already covered by a target entry.
pub trait RecordStore {
    fn count_outstanding(&self) -> Result<usize>;
    /// Oldest outstanding record, if any.
    fn first_outstanding(&self) -> Result<Option<AddressRecord>>;
    fn insert_resolved(&self, record: &AddressRecord, coordinate: &Coordinate) -> Result<()>;
    /// Set both coordinate fields of every source row for `address` to `''`.
    fn mark_empty(&self, address: &str) -> Result<()>;
    /// Rows in the priority list for `date`; zero means today's data is not in yet.
    fn count_priority_rows(&self, date: NaiveDate) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS priority_list (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    data_date   TEXT NOT NULL,
    address     TEXT NOT NULL,
    motivation  TEXT,
    latitude    TEXT,
    longitude   TEXT
);
CREATE INDEX IF NOT EXISTS idx_priority_list_address ON priority_list (address);
CREATE INDEX IF NOT EXISTS idx_priority_list_date ON priority_list (data_date);

CREATE TABLE IF NOT EXISTS location_court (
    address     TEXT PRIMARY KEY,
    latitude    TEXT NOT NULL,
    longitude   TEXT NOT NULL,
    motivation  TEXT
);
";

const OUTSTANDING: &str = "
FROM priority_list p
WHERE (p.latitude IS NULL OR p.longitude IS NULL)
  AND p.address NOT IN (SELECT address FROM location_court)
  AND p.address NOT LIKE '%地號%'
  AND COALESCE(p.motivation, '') NOT IN (
      SELECT motivation FROM location_court
      WHERE motivation IS NOT NULL AND motivation <> ''
  )
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Append one row to the priority list. Used by loaders and tests.
    pub fn insert_priority_row(
        &self,
        data_date: NaiveDate,
        address: &str,
        motivation: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO priority_list (data_date, address, motivation) VALUES (?1, ?2, ?3)",
            params![date_key(data_date), address, motivation],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Coordinate stored in the target set for `address`.
    pub fn resolved(&self, address: &str) -> Result<Option<Coordinate>> {
        let row = self
            .conn
            .query_row(
                "SELECT latitude, longitude FROM location_court WHERE address = ?1",
                params![address],
                |r| Ok(Coordinate::new(r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Raw source coordinate columns for `address` (first row).
    pub fn source_coordinate(&self, address: &str) -> Result<Option<Coordinate>> {
        let row = self
            .conn
            .query_row(
                "SELECT latitude, longitude FROM priority_list WHERE address = ?1 ORDER BY id LIMIT 1",
                params![address],
                |r| {
                    Ok(Coordinate {
                        latitude: r.get(0)?,
                        longitude: r.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl RecordStore for SqliteStore {
    fn count_outstanding(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) {OUTSTANDING}"), [], |r| r.get(0))?;
        Ok(n as usize)
    }

    fn first_outstanding(&self) -> Result<Option<AddressRecord>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT p.address, COALESCE(p.motivation, '') {OUTSTANDING} ORDER BY p.id LIMIT 1"
                ),
                [],
                |r| Ok(AddressRecord::new(r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    fn insert_resolved(&self, record: &AddressRecord, coordinate: &Coordinate) -> Result<()> {
        self.conn.execute(
            "INSERT INTO location_court (address, latitude, longitude, motivation)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (address) DO NOTHING",
            params![
                record.address,
                coordinate.latitude_str(),
                coordinate.longitude_str(),
                record.motivation
            ],
        )?;
        Ok(())
    }

    fn mark_empty(&self, address: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE priority_list SET latitude = '', longitude = '' WHERE address = ?1",
            params![address],
        )?;
        Ok(())
    }

    fn count_priority_rows(&self, date: NaiveDate) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM priority_list WHERE data_date = ?1",
            params![date_key(date)],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
