// keep in sync with the firmware's response parser
//
// The firmware treats any non-200 HTTP status as fatal, so every device
// endpoint answers 200 and carries the real outcome in `status`.

/// Outcome carried in the `status` field of a device response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DeviceStatus(pub u32);

impl DeviceStatus {
    pub const OK: Self = Self(0);
    /// Known device that still has to be claimed by a user.
    pub const ACCEPTED: Self = Self(202);
    pub const NOT_FOUND: Self = Self(500);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialFunction {
    #[default]
    None,
    RestartPlaylist,
}

/// Answer to `GET /api/setup`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SetupResponse {
    pub status: DeviceStatus,
    pub api_key: Option<String>,
    pub friendly_id: Option<String>,
    pub image_url: Option<String>,
    pub filename: Option<String>,
    pub message: Option<String>,
}

impl SetupResponse {
    pub fn provisioned(api_key: String, friendly_id: String, message: String) -> Self {
        Self {
            status: DeviceStatus::OK,
            api_key: Some(api_key),
            friendly_id: Some(friendly_id),
            image_url: None,
            filename: None,
            message: Some(message),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: DeviceStatus::NOT_FOUND,
            api_key: None,
            friendly_id: None,
            image_url: None,
            filename: None,
            message: Some(message.to_string()),
        }
    }
}

/// Answer to `GET /api/display`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DisplayResponse {
    pub status: DeviceStatus,
    pub image_url: Option<String>,
    pub filename: Option<String>,
    /// Seconds until the next poll, as a string.
    pub refresh_rate: Option<String>,
    pub reset_firmware: bool,
    pub update_firmware: bool,
    pub firmware_url: Option<String>,
    pub special_function: SpecialFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DisplayResponse {
    pub fn image(
        status: DeviceStatus,
        image_url: String,
        filename: String,
        refresh_rate: u32,
    ) -> Self {
        Self {
            status,
            image_url: Some(image_url),
            filename: Some(filename),
            refresh_rate: Some(refresh_rate.to_string()),
            reset_firmware: false,
            update_firmware: false,
            firmware_url: None,
            special_function: SpecialFunction::None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: String) -> Self {
        self.message = Some(message);
        self
    }

    /// Tells the device to forget its credentials and provision again.
    pub fn reset() -> Self {
        Self {
            status: DeviceStatus::NOT_FOUND,
            image_url: None,
            filename: None,
            refresh_rate: None,
            reset_firmware: true,
            update_firmware: false,
            firmware_url: None,
            special_function: SpecialFunction::None,
            message: Some("Device not found".to_string()),
        }
    }
}

/// Answer to `POST /api/log`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogResponse {
    pub status: DeviceStatus,
    pub message: String,
}

impl LogResponse {
    pub fn received() -> Self {
        Self {
            status: DeviceStatus::OK,
            message: "Log received".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_response_shape() {
        let json = serde_json::to_value(DisplayResponse::reset()).unwrap();
        assert_eq!(json["status"], 500);
        assert_eq!(json["reset_firmware"], true);
        assert_eq!(json["special_function"], "none");
        assert!(json["firmware_url"].is_null());
    }

    #[test]
    fn image_response_has_string_refresh_rate() {
        let res = DisplayResponse::image(
            DeviceStatus::OK,
            "http://host/a.bmp".to_string(),
            "a.bmp".to_string(),
            180,
        );
        let json = serde_json::to_value(res).unwrap();
        assert_eq!(json["refresh_rate"], "180");
        assert_eq!(json["status"], 0);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn special_function_names() {
        assert_eq!(
            serde_json::to_string(&SpecialFunction::RestartPlaylist).unwrap(),
            "\"restart_playlist\""
        );
    }
}
