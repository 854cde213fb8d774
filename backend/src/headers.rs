use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};

use crate::error::DeviceError;
use crate::utils::normalize_mac;

pub const ID: &str = "ID";
pub const ACCESS_TOKEN: &str = "Access-Token";
pub const REFRESH_RATE: &str = "Refresh-Rate";
pub const BATTERY_VOLTAGE: &str = "Battery-Voltage";
pub const FW_VERSION: &str = "FW-Version";
pub const RSSI: &str = "RSSI";

/// Headers the firmware sends with every request. Missing or blank values are `None`.
#[derive(Debug, Default, Clone)]
pub struct DeviceHeaders {
    pub mac_address: Option<String>, // normalized
    pub access_token: Option<String>,
    pub refresh_rate: Option<u32>,    // s
    pub battery_voltage: Option<f32>, // V
    pub fw_version: Option<String>,
    pub rssi: Option<i32>, // dBm
}

impl DeviceHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        Self {
            mac_address: text(ID).map(|mac| normalize_mac(&mac)),
            access_token: text(ACCESS_TOKEN),
            refresh_rate: text(REFRESH_RATE).and_then(|v| v.parse().ok()),
            battery_voltage: text(BATTERY_VOLTAGE).and_then(|v| v.parse().ok()),
            fw_version: text(FW_VERSION),
            rssi: text(RSSI).and_then(|v| v.parse().ok()),
        }
    }

    pub fn mac(&self) -> Result<&str, DeviceError> {
        self.mac_address
            .as_deref()
            .ok_or(DeviceError::MissingIdentity(ID))
    }

    pub fn token(&self) -> Result<&str, DeviceError> {
        self.access_token
            .as_deref()
            .ok_or(DeviceError::MissingIdentity(ACCESS_TOKEN))
    }
}

impl FromRequest for DeviceHeaders {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(Self::from_headers(req.headers())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn parses_firmware_headers() {
        let req = TestRequest::default()
            .insert_header((ID, "aa:bb:cc:dd:ee:ff"))
            .insert_header((ACCESS_TOKEN, "token"))
            .insert_header((REFRESH_RATE, "900"))
            .insert_header((BATTERY_VOLTAGE, "4.05"))
            .insert_header((FW_VERSION, "1.4.8"))
            .insert_header((RSSI, "-61"))
            .to_http_request();

        let headers = DeviceHeaders::from_headers(req.headers());
        assert_eq!(headers.mac().unwrap(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(headers.token().unwrap(), "token");
        assert_eq!(headers.refresh_rate, Some(900));
        assert_eq!(headers.battery_voltage, Some(4.05));
        assert_eq!(headers.fw_version.as_deref(), Some("1.4.8"));
        assert_eq!(headers.rssi, Some(-61));
    }

    #[test]
    fn blank_and_garbage_values_are_absent() {
        let req = TestRequest::default()
            .insert_header((ID, "   "))
            .insert_header((REFRESH_RATE, "soon"))
            .to_http_request();

        let headers = DeviceHeaders::from_headers(req.headers());
        assert!(matches!(headers.mac(), Err(DeviceError::MissingIdentity(ID))));
        assert!(matches!(
            headers.token(),
            Err(DeviceError::MissingIdentity(ACCESS_TOKEN))
        ));
        assert_eq!(headers.refresh_rate, None);
    }
}
