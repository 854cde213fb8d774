use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use common::req::LogLevel;
use log::warn;

use crate::{config::Config, db::Db, error::DeviceError};

pub struct AppState {
    pub db: Mutex<Db>,
    pub config: Config,
    /// Used for prefetching rendered screens.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.prefetch_timeout)
            .build()?;

        Ok(Self {
            db: Mutex::new(db),
            config,
            http,
        })
    }

    pub fn db(&self) -> Result<MutexGuard<'_, Db>, DeviceError> {
        Ok(self.db.lock()?)
    }

    /// Mirrors an event into the `system_logs` table. Never fails the caller.
    ///
    /// Must not be called while holding the db lock.
    pub fn system_log(
        &self,
        level: LogLevel,
        message: &str,
        source: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let res = self.db().and_then(|mut db| {
            db.insert_system_log(level, message, Some(source), metadata.as_ref())
                .map_err(DeviceError::from)
        });

        if let Err(err) = res {
            warn!("Failed to write system log {message:?}: {err}");
        }
    }
}
