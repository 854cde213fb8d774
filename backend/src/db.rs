use crate::schema::*;
use crate::utils::{generate_api_key, generate_friendly_id, ms_since_epoch};
use anyhow::Result;
use common::req::LogLevel;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::{Sqlite, SqliteConnection};
use log::{debug, info};

use self::models::*;

// keep in sync with schema.rs
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL,
    mac_address TEXT NOT NULL UNIQUE,
    api_key TEXT NOT NULL UNIQUE,
    friendly_id TEXT NOT NULL UNIQUE,
    refresh_interval INTEGER NOT NULL,
    user_id TEXT,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS device_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    device_id INTEGER NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
    log_data TEXT NOT NULL,
    created_at BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS device_logs_device_id ON device_logs (device_id);

CREATE TABLE IF NOT EXISTS system_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    source TEXT,
    metadata TEXT,
    created_at BIGINT NOT NULL
);
"#;

const DEFAULT_DEVICE_NAME: &str = "TRMNL Device";

/// Attempts at minting unique tokens before giving up.
const CREATE_ATTEMPTS: usize = 5;

pub mod models {
    use crate::schema::*;
    use diesel::prelude::*;

    #[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
    #[diesel(table_name = devices)]
    pub struct Device {
        pub id: i32,
        pub name: String,
        pub mac_address: String,
        pub api_key: String,
        pub friendly_id: String,
        pub refresh_interval: i32, // s
        pub user_id: Option<String>,
        pub created_at: i64, // ms
        pub updated_at: i64, // ms
    }

    impl Device {
        pub fn is_claimed(&self) -> bool {
            self.user_id.is_some()
        }
    }

    #[derive(Debug, Insertable)]
    #[diesel(table_name = devices)]
    pub struct NewDevice<'a> {
        pub name: &'a str,
        pub mac_address: &'a str,
        pub api_key: &'a str,
        pub friendly_id: &'a str,
        pub refresh_interval: i32,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Debug, Clone, Queryable, Selectable)]
    #[diesel(table_name = device_logs)]
    pub struct DeviceLog {
        pub id: i32,
        pub device_id: i32,
        pub log_data: String, // json
        pub created_at: i64,
    }

    #[derive(Debug, Insertable)]
    #[diesel(table_name = device_logs)]
    pub struct NewDeviceLog {
        pub device_id: i32,
        pub log_data: String,
        pub created_at: i64,
    }

    #[derive(Debug, Clone, Queryable, Selectable)]
    #[diesel(table_name = system_logs)]
    pub struct SystemLog {
        pub id: i32,
        pub level: String,
        pub message: String,
        pub source: Option<String>,
        pub metadata: Option<String>, // json
        pub created_at: i64,
    }

    #[derive(Debug, Insertable)]
    #[diesel(table_name = system_logs)]
    pub struct NewSystemLog<'a> {
        pub level: &'a str,
        pub message: &'a str,
        pub source: Option<&'a str>,
        pub metadata: Option<String>,
        pub created_at: i64,
    }

    impl From<Device> for common::req::DeviceInfo {
        fn from(device: Device) -> Self {
            Self {
                id: device.id,
                name: device.name,
                mac_address: device.mac_address,
                friendly_id: device.friendly_id,
                refresh_interval: device.refresh_interval,
                user_id: device.user_id,
                created_at: device.created_at,
                updated_at: device.updated_at,
            }
        }
    }

    impl From<DeviceLog> for common::req::DeviceLogEntry {
        fn from(log: DeviceLog) -> Self {
            let log_data = serde_json::from_str(&log.log_data)
                .unwrap_or(serde_json::Value::String(log.log_data));
            Self {
                id: log.id,
                device_id: log.device_id,
                log_data,
                created_at: log.created_at,
            }
        }
    }

    impl From<SystemLog> for common::req::SystemLogEntry {
        fn from(log: SystemLog) -> Self {
            Self {
                id: log.id,
                level: log.level,
                message: log.message,
                source: log.source,
                metadata: log.metadata.and_then(|m| serde_json::from_str(&m).ok()),
                created_at: log.created_at,
            }
        }
    }
}

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    /// Opens the sqlite database and creates missing tables.
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(database_url)?;
        conn.batch_execute(SCHEMA_SQL)?;
        info!("Connected to {database_url}");

        Ok(Self { conn })
    }

    pub fn find_by_mac(&mut self, mac: &str) -> QueryResult<Option<Device>> {
        devices::table
            .filter(devices::mac_address.eq(mac))
            .select(Device::as_select())
            .first(&mut self.conn)
            .optional()
    }

    pub fn find_by_key(&mut self, key: &str) -> QueryResult<Option<Device>> {
        devices::table
            .filter(devices::api_key.eq(key))
            .select(Device::as_select())
            .first(&mut self.conn)
            .optional()
    }

    pub fn find_by_mac_and_key(&mut self, mac: &str, key: &str) -> QueryResult<Option<Device>> {
        devices::table
            .filter(devices::mac_address.eq(mac))
            .filter(devices::api_key.eq(key))
            .select(Device::as_select())
            .first(&mut self.conn)
            .optional()
    }

    /// Registers `mac` with freshly minted credentials.
    ///
    /// If another writer registered the same MAC first, the unique constraint
    /// fires and the existing record is returned instead. A violation without
    /// an existing record means a generated token collided, so new ones are
    /// drawn.
    pub fn create(&mut self, mac: &str, refresh_interval: i32) -> QueryResult<Device> {
        self.create_with(mac, refresh_interval, || {
            (generate_api_key(), generate_friendly_id())
        })
    }

    /// `create` with the `(api_key, friendly_id)` source made explicit.
    fn create_with(
        &mut self,
        mac: &str,
        refresh_interval: i32,
        mut tokens: impl FnMut() -> (String, String),
    ) -> QueryResult<Device> {
        let mut last_err = DieselError::NotFound;

        for _ in 0..CREATE_ATTEMPTS {
            let now = ms_since_epoch();
            let (api_key, friendly_id) = tokens();
            let new_device = NewDevice {
                name: DEFAULT_DEVICE_NAME,
                mac_address: mac,
                api_key: &api_key,
                friendly_id: &friendly_id,
                refresh_interval,
                created_at: now,
                updated_at: now,
            };

            match diesel::insert_into(devices::table)
                .values(&new_device)
                .execute(&mut self.conn)
            {
                Ok(_) => {
                    return self.find_by_mac(mac)?.ok_or(DieselError::NotFound);
                }
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                    if let Some(existing) = self.find_by_mac(mac)? {
                        debug!("{mac} registered concurrently, returning existing record");
                        return Ok(existing);
                    }
                    debug!("token collision ({}), retrying", info.message());
                    last_err =
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err)
    }

    /// Returns the record for `mac`, creating it if needed. The flag tells
    /// whether this call created it.
    pub fn find_or_create(
        &mut self,
        mac: &str,
        refresh_interval: i32,
    ) -> QueryResult<(Device, bool)> {
        if let Some(device) = self.find_by_mac(mac)? {
            return Ok((device, false));
        }
        let device = self.create(mac, refresh_interval)?;
        Ok((device, true))
    }

    pub fn devices(&mut self) -> QueryResult<Vec<Device>> {
        devices::table
            .order(devices::id.asc())
            .select(Device::as_select())
            .load(&mut self.conn)
    }

    /// Claims (or releases, with `None`) a device. Returns the number of updated rows.
    pub fn attach_owner(&mut self, mac: &str, owner: Option<&str>) -> QueryResult<usize> {
        diesel::update(devices::table.filter(devices::mac_address.eq(mac)))
            .set((
                devices::user_id.eq(owner),
                devices::updated_at.eq(ms_since_epoch()),
            ))
            .execute(&mut self.conn)
    }

    pub fn set_refresh_interval(&mut self, mac: &str, seconds: i32) -> QueryResult<usize> {
        diesel::update(devices::table.filter(devices::mac_address.eq(mac)))
            .set((
                devices::refresh_interval.eq(seconds),
                devices::updated_at.eq(ms_since_epoch()),
            ))
            .execute(&mut self.conn)
    }

    pub fn insert_device_log(
        &mut self,
        device_id: i32,
        log_data: &serde_json::Value,
    ) -> QueryResult<()> {
        diesel::insert_into(device_logs::table)
            .values(&NewDeviceLog {
                device_id,
                log_data: log_data.to_string(),
                created_at: ms_since_epoch(),
            })
            .execute(&mut self.conn)?;

        Ok(())
    }

    /// Newest first.
    pub fn device_logs(
        &mut self,
        device_id: Option<i32>,
        limit: i64,
    ) -> QueryResult<Vec<DeviceLog>> {
        let mut query = device_logs::table
            .select(DeviceLog::as_select())
            .order(device_logs::id.desc())
            .limit(limit)
            .into_boxed::<Sqlite>();
        if let Some(device_id) = device_id {
            query = query.filter(device_logs::device_id.eq(device_id));
        }
        query.load(&mut self.conn)
    }

    pub fn insert_system_log(
        &mut self,
        level: LogLevel,
        message: &str,
        source: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> QueryResult<()> {
        diesel::insert_into(system_logs::table)
            .values(&NewSystemLog {
                level: level.as_str(),
                message,
                source,
                metadata: metadata.map(|m| m.to_string()),
                created_at: ms_since_epoch(),
            })
            .execute(&mut self.conn)?;

        Ok(())
    }

    /// Newest first.
    pub fn system_logs(&mut self, limit: i64) -> QueryResult<Vec<SystemLog>> {
        system_logs::table
            .select(SystemLog::as_select())
            .order(system_logs::id.desc())
            .limit(limit)
            .load(&mut self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db() -> Db {
        Db::connect(":memory:").unwrap()
    }

    #[test]
    fn colliding_tokens_are_redrawn() {
        let mut db = db();
        let first = db.create("AA:AA:AA:AA:AA:AA", 900).unwrap();

        let mut draws = vec![
            ("fresh-key".to_string(), "FRESH1".to_string()),
            (first.api_key.clone(), "OTHER1".to_string()),
            ("other-key".to_string(), first.friendly_id.clone()),
        ];
        let second = db
            .create_with("BB:BB:BB:BB:BB:BB", 900, || draws.pop().unwrap())
            .unwrap();

        assert_eq!(second.mac_address, "BB:BB:BB:BB:BB:BB");
        assert_eq!(second.api_key, "fresh-key");
        assert_eq!(second.friendly_id, "FRESH1");
        assert!(draws.is_empty());
        assert_eq!(db.devices().unwrap().len(), 2);
    }

    #[test]
    fn create_gives_up_after_repeated_collisions() {
        let mut db = db();
        let first = db.create("AA:AA:AA:AA:AA:AA", 900).unwrap();

        let mut draws = 0;
        let err = db
            .create_with("BB:BB:BB:BB:BB:BB", 900, || {
                draws += 1;
                (first.api_key.clone(), format!("ID{draws:04}"))
            })
            .unwrap_err();

        assert!(matches!(
            err,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
        ));
        assert_eq!(draws, CREATE_ATTEMPTS);
        assert!(db.find_by_mac("BB:BB:BB:BB:BB:BB").unwrap().is_none());
    }

    #[test]
    fn create_and_lookup() {
        let mut db = db();
        let device = db.create("AA:BB:CC:DD:EE:FF", 900).unwrap();

        assert_eq!(device.refresh_interval, 900);
        assert_eq!(device.name, DEFAULT_DEVICE_NAME);
        assert!(!device.is_claimed());

        let by_mac = db.find_by_mac("AA:BB:CC:DD:EE:FF").unwrap().unwrap();
        let by_key = db.find_by_key(&device.api_key).unwrap().unwrap();
        let by_both = db
            .find_by_mac_and_key("AA:BB:CC:DD:EE:FF", &device.api_key)
            .unwrap()
            .unwrap();
        assert_eq!(by_mac, device);
        assert_eq!(by_key, device);
        assert_eq!(by_both, device);

        assert!(db.find_by_mac("11:22:33:44:55:66").unwrap().is_none());
        assert!(db
            .find_by_mac_and_key("AA:BB:CC:DD:EE:FF", "wrong")
            .unwrap()
            .is_none());
    }

    #[test]
    fn create_twice_returns_existing() {
        let mut db = db();
        let first = db.create("AA:BB:CC:DD:EE:FF", 900).unwrap();
        let second = db.create("AA:BB:CC:DD:EE:FF", 300).unwrap();

        assert_eq!(first, second);
        assert_eq!(db.devices().unwrap().len(), 1);
    }

    #[test]
    fn find_or_create_flags_creation() {
        let mut db = db();
        let (created, was_created) = db.find_or_create("AA:BB:CC:DD:EE:FF", 900).unwrap();
        let (found, was_created_again) = db.find_or_create("AA:BB:CC:DD:EE:FF", 900).unwrap();

        assert!(was_created);
        assert!(!was_created_again);
        assert_eq!(created, found);
    }

    #[test]
    fn owner_and_interval_updates() {
        let mut db = db();
        db.create("AA:BB:CC:DD:EE:FF", 900).unwrap();

        assert_eq!(db.attach_owner("AA:BB:CC:DD:EE:FF", Some("user-1")).unwrap(), 1);
        assert_eq!(db.set_refresh_interval("AA:BB:CC:DD:EE:FF", 120).unwrap(), 1);
        assert_eq!(db.attach_owner("00:00:00:00:00:01", Some("user-1")).unwrap(), 0);

        let device = db.find_by_mac("AA:BB:CC:DD:EE:FF").unwrap().unwrap();
        assert_eq!(device.user_id.as_deref(), Some("user-1"));
        assert_eq!(device.refresh_interval, 120);
    }

    #[test]
    fn device_logs_are_filtered_and_newest_first() {
        let mut db = db();
        let a = db.create("AA:AA:AA:AA:AA:AA", 900).unwrap();
        let b = db.create("BB:BB:BB:BB:BB:BB", 900).unwrap();

        db.insert_device_log(a.id, &json!([{"n": 1}])).unwrap();
        db.insert_device_log(b.id, &json!([{"n": 2}])).unwrap();
        db.insert_device_log(a.id, &json!([{"n": 3}])).unwrap();

        let logs = db.device_logs(Some(a.id), 10).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].log_data, r#"[{"n":3}]"#);

        assert_eq!(db.device_logs(None, 10).unwrap().len(), 3);
        assert_eq!(db.device_logs(None, 1).unwrap().len(), 1);
    }

    #[test]
    fn system_logs_roundtrip_metadata() {
        let mut db = db();
        db.insert_system_log(
            LogLevel::Warn,
            "prefetch failed",
            Some("display"),
            Some(&json!({"url": "x"})),
        )
        .unwrap();

        let logs = db.system_logs(100).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, "warn");

        let entry: common::req::SystemLogEntry = logs[0].clone().into();
        assert_eq!(entry.metadata, Some(json!({"url": "x"})));
    }
}
