use actix_web::{web, Responder};
use common::{device::LogResponse, req::LogLevel};
use log::{debug, error, info, warn};
use serde_json::{json, Map, Value};

use crate::{
    config::Config,
    db::{models::Device, Db},
    error::DeviceError,
    headers::DeviceHeaders,
    state::AppState,
    utils::{iso8601_from_millis, ms_since_epoch, normalize_mac},
};

/// Upper bound on a log upload. Larger bodies are recorded as an empty batch.
pub const MAX_LOG_BODY: usize = 4 * 1024 * 1024;

#[derive(Debug, serde::Deserialize)]
struct LogUpload {
    log: LogBatch,
}

#[derive(Debug, serde::Deserialize)]
struct LogBatch {
    logs_array: Vec<Value>,
}

/// `POST /api/log`: stores a batch of device log events.
///
/// The firmware never retries this request, so the answer is always a
/// success and problems only show up in the server log.
pub async fn upload_log(
    headers: DeviceHeaders,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> impl Responder {
    let events = read_body(payload).await.and_then(|body| parse_batch(&body));
    ingest(&headers, events, &state);
    web::Json(LogResponse::received())
}

async fn read_body(payload: web::Payload) -> Result<web::Bytes, DeviceError> {
    match payload.to_bytes_limited(MAX_LOG_BODY).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(_)) => Err(DeviceError::MalformedPayload(format!(
            "body exceeds {MAX_LOG_BODY} bytes"
        ))),
        Err(err) => Err(DeviceError::MalformedPayload(err.to_string())),
    }
}

pub fn ingest(
    headers: &DeviceHeaders,
    events: Result<Vec<Value>, DeviceError>,
    state: &AppState,
) {
    let events = events.unwrap_or_else(|err| {
        warn!("{err}, recording an empty batch");
        Vec::new()
    });

    let now = ms_since_epoch();
    let count = events.len();
    let log_data = Value::Array(
        events
            .into_iter()
            .map(|event| normalize_event(event, now))
            .collect(),
    );

    match store(headers, &log_data, state) {
        Ok(device) => info!("Stored {count} log events for {}", device.friendly_id),
        Err(err) => {
            error!("Dropping {count} log events: {err}");
            state.system_log(
                LogLevel::Error,
                "Failed to store device log",
                "telemetry",
                Some(json!({ "error": err.to_string(), "events": count })),
            );
        }
    }
}

fn parse_batch(body: &[u8]) -> Result<Vec<Value>, DeviceError> {
    let upload: LogUpload = serde_json::from_slice(body)?;
    Ok(upload.log.logs_array)
}

/// Adds an ISO-8601 `timestamp` derived from `creation_timestamp` (epoch
/// seconds), or from `now_ms` when the event carries none.
///
/// Events that are not JSON objects are kept under a `value` key.
pub fn normalize_event(event: Value, now_ms: i64) -> Value {
    let mut event = match event {
        Value::Object(fields) => fields,
        other => {
            let mut fields = Map::new();
            fields.insert("value".to_string(), other);
            fields
        }
    };

    let ms = event
        .get("creation_timestamp")
        .and_then(Value::as_f64)
        .map(|secs| (secs * 1000.0).round() as i64)
        .unwrap_or(now_ms);
    let timestamp = iso8601_from_millis(ms)
        .or_else(|| iso8601_from_millis(now_ms))
        .unwrap_or_default();

    event.insert("timestamp".to_string(), Value::String(timestamp));
    Value::Object(event)
}

fn store(
    headers: &DeviceHeaders,
    log_data: &Value,
    state: &AppState,
) -> Result<Device, DeviceError> {
    let mut db = state.db()?;
    let device = resolve_device(&mut db, headers, &state.config)?;
    db.insert_device_log(device.id, log_data)?;
    Ok(device)
}

/// The device owning the token, or the default device when there is no
/// usable token.
fn resolve_device(
    db: &mut Db,
    headers: &DeviceHeaders,
    config: &Config,
) -> Result<Device, DeviceError> {
    match headers.token() {
        Ok(token) => match db.find_by_key(token) {
            Ok(Some(device)) => return Ok(device),
            Ok(None) => warn!("Unknown access token on log upload, using default device"),
            Err(err) => warn!("Token lookup failed ({err}), using default device"),
        },
        Err(err) => debug!("{err}, using default device"),
    }

    let mac = normalize_mac(&config.default_device_mac);
    let (device, created) = db.find_or_create(&mac, config.default_refresh_interval)?;
    if created {
        info!("Created default device {} for {mac}", device.friendly_id);
    }
    Ok(device)
}
