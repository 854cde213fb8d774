use actix_web::{web, Responder};
use common::device::{DeviceStatus, DisplayResponse};
use log::{info, warn};

use crate::{
    db::models::Device,
    error::DeviceError,
    headers::DeviceHeaders,
    prefetch::spawn_prefetch,
    setup::welcome_message,
    state::AppState,
    utils::{battery_percentage, generate_filename_suffix},
};

/// Bounds for the poll interval of claimed devices, in seconds.
pub const MIN_REFRESH_RATE: u32 = 60;
pub const MAX_REFRESH_RATE: u32 = 3600;

/// Unclaimed devices check back quickly so claiming shows up fast.
pub const SETUP_REFRESH_RATE: u32 = 30;

/// `GET /api/display`: tells the device which image to show next.
pub async fn display(headers: DeviceHeaders, state: web::Data<AppState>) -> impl Responder {
    web::Json(poll(&headers, &state))
}

pub fn poll(headers: &DeviceHeaders, state: &AppState) -> DisplayResponse {
    let device = match authenticate(headers, state) {
        Ok(device) => device,
        Err(err) => {
            warn!("Display poll rejected, asking device to reset: {err}");
            return DisplayResponse::reset();
        }
    };

    log_device_metrics(&device, headers);

    if !device.is_claimed() {
        let url = &state.config.placeholder_image_url;
        return DisplayResponse::image(
            DeviceStatus::ACCEPTED,
            url.clone(),
            url_filename(url).to_string(),
            SETUP_REFRESH_RATE,
        )
        .with_message(welcome_message(&device));
    }

    let filename = screen_filename(&device, state.config.random_filenames);
    let image_url = format!(
        "{}/{}",
        state.config.render_url.trim_end_matches('/'),
        filename
    );

    if state.config.prefetch {
        // detached: the response never waits for the renderer
        drop(spawn_prefetch(
            state.http.clone(),
            image_url.clone(),
            state.config.prefetch_timeout,
        ));
    }

    DisplayResponse::image(
        DeviceStatus::OK,
        image_url,
        filename,
        clamp_refresh_rate(device.refresh_interval),
    )
}

/// Both the token and the MAC have to point at the same record.
fn authenticate(headers: &DeviceHeaders, state: &AppState) -> Result<Device, DeviceError> {
    let token = headers.token()?;
    let mac = headers.mac()?;

    let mut db = state.db()?;
    match db.find_by_mac_and_key(mac, token)? {
        Some(device) => Ok(device),
        None if db.find_by_mac(mac)?.is_some() => {
            Err(DeviceError::CredentialMismatch(mac.to_string()))
        }
        None => Err(DeviceError::UnknownDevice(mac.to_string())),
    }
}

fn log_device_metrics(device: &Device, headers: &DeviceHeaders) {
    info!(
        "Display poll from {} (battery {:?}V / {:?}%, fw {:?}, rssi {:?}, refresh {:?})",
        device.friendly_id,
        headers.battery_voltage,
        headers.battery_voltage.map(battery_percentage),
        headers.fw_version,
        headers.rssi,
        headers.refresh_rate,
    );
}

pub fn clamp_refresh_rate(seconds: i32) -> u32 {
    seconds.clamp(MIN_REFRESH_RATE as i32, MAX_REFRESH_RATE as i32) as u32
}

/// A fresh name per poll keeps the device from showing a cached image.
fn screen_filename(device: &Device, random: bool) -> String {
    if random {
        format!("{}-{}.bmp", device.friendly_id, generate_filename_suffix())
    } else {
        format!("{}.bmp", device.friendly_id)
    }
}

fn url_filename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}
