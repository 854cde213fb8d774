use actix_web::{web, Responder};
use common::{device::SetupResponse, req::LogLevel};
use log::{error, info, warn};
use serde_json::json;

use crate::{db::models::Device, error::DeviceError, headers::DeviceHeaders, state::AppState};

/// `GET /api/setup`: hands out the credentials for the MAC in the `ID` header,
/// registering the device on first contact.
pub async fn setup(headers: DeviceHeaders, state: web::Data<AppState>) -> impl Responder {
    web::Json(provision(&headers, &state))
}

pub fn provision(headers: &DeviceHeaders, state: &AppState) -> SetupResponse {
    let mac = match headers.mac() {
        Ok(mac) => mac,
        Err(err) => {
            warn!("Setup rejected: {err}");
            return SetupResponse::not_found("ID header is required.");
        }
    };

    let (device, created) = match register(state, mac) {
        Ok(res) => res,
        Err(err) => {
            error!("Setup for {mac} failed: {err}");
            return SetupResponse::not_found("Device not found");
        }
    };

    if created {
        info!("Provisioned {mac} as {}", device.friendly_id);
        state.system_log(
            LogLevel::Info,
            "Provisioned new device",
            "setup",
            Some(json!({ "mac_address": mac, "friendly_id": device.friendly_id })),
        );
    }

    let message = if device.is_claimed() {
        format!("Device {} is already attached to an account.", device.friendly_id)
    } else {
        welcome_message(&device)
    };

    SetupResponse::provisioned(device.api_key, device.friendly_id, message)
}

pub fn welcome_message(device: &Device) -> String {
    format!(
        "Device {} added to BYOS! Please log in to attach it to a user to continue.",
        device.friendly_id
    )
}

fn register(state: &AppState, mac: &str) -> Result<(Device, bool), DeviceError> {
    let mut db = state.db()?;
    Ok(db.find_or_create(mac, state.config.default_refresh_interval)?)
}
