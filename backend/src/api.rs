use actix_cors::Cors;
use actix_web::{
    error::ErrorBadRequest,
    get,
    http::header,
    middleware::{Logger, NormalizePath},
    put,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use common::req::{DeviceInfo, DeviceLogEntry, LogLevel, SystemLogEntry};
use log::info;
use serde_json::json;

use crate::{
    display, error::DeviceError, setup, state::AppState, telemetry, utils::normalize_mac,
};

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 1000;

#[get("/")]
async fn hello() -> impl Responder {
    HttpResponse::Ok().body("byos backend")
}

#[get("/api/devices")]
async fn api_devices(state: web::Data<AppState>) -> Result<impl Responder, DeviceError> {
    let devices = state.db()?.devices()?;
    Ok(web::Json(
        devices.into_iter().map(DeviceInfo::from).collect::<Vec<_>>(),
    ))
}

#[derive(serde::Deserialize, Debug)]
struct SetOwnerParams {
    mac: String,
    /// Empty or missing releases the device.
    user_id: Option<String>,
}

#[put("/api/device/owner")]
async fn api_set_owner(
    query: web::Query<SetOwnerParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, DeviceError> {
    let mac = normalize_mac(&query.mac);
    let owner = query.user_id.as_deref().filter(|u| !u.is_empty());

    if state.db()?.attach_owner(&mac, owner)? == 0 {
        return Err(DeviceError::UnknownDevice(mac));
    }

    info!("Owner of {mac} set to {owner:?}");
    state.system_log(
        LogLevel::Info,
        "Device owner changed",
        "admin",
        Some(json!({ "mac_address": mac, "user_id": owner })),
    );
    Ok(HttpResponse::Ok().finish())
}

#[derive(serde::Deserialize, Debug)]
struct SetRefreshIntervalParams {
    mac: String,
    seconds: i32,
}

#[put("/api/device/refresh_interval")]
async fn api_set_refresh_interval(
    query: web::Query<SetRefreshIntervalParams>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    if query.seconds <= 0 {
        return Err(ErrorBadRequest("refresh interval must be positive"));
    }

    let mac = normalize_mac(&query.mac);
    let updated = state
        .db()?
        .set_refresh_interval(&mac, query.seconds)
        .map_err(DeviceError::from)?;
    if updated == 0 {
        return Err(DeviceError::UnknownDevice(mac).into());
    }

    info!("Refresh interval of {mac} set to {}s", query.seconds);
    Ok(HttpResponse::Ok().finish())
}

#[derive(serde::Deserialize, Debug)]
struct LogsParams {
    device_id: Option<i32>,
    limit: Option<i64>,
}

impl LogsParams {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .clamp(1, MAX_LOG_LIMIT)
    }
}

#[get("/api/logs")]
async fn api_device_logs(
    query: web::Query<LogsParams>,
    state: web::Data<AppState>,
) -> Result<impl Responder, DeviceError> {
    let logs = state.db()?.device_logs(query.device_id, query.limit())?;
    Ok(web::Json(
        logs.into_iter()
            .map(DeviceLogEntry::from)
            .collect::<Vec<_>>(),
    ))
}

#[get("/api/system_logs")]
async fn api_system_logs(
    query: web::Query<LogsParams>,
    state: web::Data<AppState>,
) -> Result<impl Responder, DeviceError> {
    let logs = state.db()?.system_logs(query.limit())?;
    Ok(web::Json(
        logs.into_iter()
            .map(SystemLogEntry::from)
            .collect::<Vec<_>>(),
    ))
}

/// Device endpoints under both the firmware paths and the short aliases,
/// plus the admin endpoints.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(vec!["/api/setup", "/provision"]).route(web::get().to(setup::setup)))
        .service(
            web::resource(vec!["/api/display", "/poll"]).route(web::get().to(display::display)),
        )
        .service(
            web::resource(vec!["/api/log", "/telemetry"])
                .route(web::post().to(telemetry::upload_log)),
        )
        .service(hello)
        .service(api_devices)
        .service(api_set_owner)
        .service(api_set_refresh_interval)
        .service(api_device_logs)
        .service(api_system_logs);
}

pub async fn new_http_server(state: AppState) -> std::io::Result<()> {
    let bind = (state.config.host.clone(), state.config.port);
    let cors_origin = state.config.cors_origin.clone();
    let state = Data::new(state);

    info!("Listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure)
            .wrap(
                Cors::default()
                    .allowed_origin(&cors_origin) // dashboard
                    .allowed_methods(vec!["GET", "POST", "PUT"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .max_age(3600),
            )
            // firmware versions disagree on trailing slashes
            .wrap(NormalizePath::trim())
            .wrap(Logger::default())
    })
    .bind(bind)?
    .run()
    .await
}

#[cfg(test)]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($state.clone())
                .configure($crate::api::configure)
                .wrap(actix_web::middleware::NormalizePath::trim()),
        )
        .await
    };
}

#[cfg(test)]
pub(crate) use test_app;


#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test as atest};
    use serde_json::json;

    use super::testing::*;
    use super::*;

    #[actix_web::test]
    async fn claim_device_through_admin_api() {
        let state = test_state(test_config());
        let app = test_app!(state);
        provision_device(&state, "AA:BB:CC:DD:EE:FF");

        let req = atest::TestRequest::put()
            .uri("/api/device/owner?mac=aa:bb:cc:dd:ee:ff&user_id=user-7")
            .to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::OK);

        let req = atest::TestRequest::get().uri("/api/devices").to_request();
        let devices: Vec<DeviceInfo> = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(devices.len(), 1);
        assert!(devices[0].is_claimed());
        assert_eq!(devices[0].user_id.as_deref(), Some("user-7"));

        let req = atest::TestRequest::get().uri("/api/system_logs").to_request();
        let logs: Vec<SystemLogEntry> = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(logs[0].source.as_deref(), Some("admin"));
    }

    #[actix_web::test]
    async fn admin_errors_use_http_status() {
        let state = test_state(test_config());
        let app = test_app!(state);

        let req = atest::TestRequest::put()
            .uri("/api/device/owner?mac=AA:BB:CC:DD:EE:FF&user_id=user-7")
            .to_request();
        assert_eq!(
            atest::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        provision_device(&state, "AA:BB:CC:DD:EE:FF");
        let req = atest::TestRequest::put()
            .uri("/api/device/refresh_interval?mac=AA:BB:CC:DD:EE:FF&seconds=0")
            .to_request();
        assert_eq!(
            atest::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn refresh_interval_update() {
        let state = test_state(test_config());
        let app = test_app!(state);
        provision_device(&state, "AA:BB:CC:DD:EE:FF");

        let req = atest::TestRequest::put()
            .uri("/api/device/refresh_interval?mac=AA:BB:CC:DD:EE:FF&seconds=300")
            .to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::OK);

        let device = state
            .db()
            .unwrap()
            .find_by_mac("AA:BB:CC:DD:EE:FF")
            .unwrap()
            .unwrap();
        assert_eq!(device.refresh_interval, 300);
    }

    #[actix_web::test]
    async fn device_logs_listing() {
        let state = test_state(test_config());
        let app = test_app!(state);
        let a = provision_device(&state, "AA:AA:AA:AA:AA:AA");
        let b = provision_device(&state, "BB:BB:BB:BB:BB:BB");
        {
            let mut db = state.db().unwrap();
            db.insert_device_log(a.id, &json!([{ "n": 1 }])).unwrap();
            db.insert_device_log(b.id, &json!([{ "n": 2 }])).unwrap();
        }

        let req = atest::TestRequest::get()
            .uri(&format!("/api/logs?device_id={}", b.id))
            .to_request();
        let logs: Vec<DeviceLogEntry> = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_data, json!([{ "n": 2 }]));
    }
}
