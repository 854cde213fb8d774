// types served by the admin endpoints of the backend

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct DeviceInfo {
    pub id: i32,
    pub name: String,
    pub mac_address: String, // unique, uppercase
    pub friendly_id: String,
    pub refresh_interval: i32, // s
    pub user_id: Option<String>,
    pub created_at: i64, // ms
    pub updated_at: i64, // ms
}

impl DeviceInfo {
    pub fn is_claimed(&self) -> bool {
        self.user_id.is_some()
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct DeviceLogEntry {
    pub id: i32,
    pub device_id: i32,
    pub log_data: serde_json::Value,
    pub created_at: i64, // ms
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SystemLogEntry {
    pub id: i32,
    pub level: String,
    pub message: String,
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64, // ms
}
