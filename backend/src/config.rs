use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Result};
use log::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// External endpoint that renders the screen bitmaps.
    pub render_url: String,
    pub placeholder_image_url: String,
    /// Fresh filename per poll instead of `<friendly_id>.bmp`.
    pub random_filenames: bool,
    pub prefetch: bool,
    pub prefetch_timeout: Duration,
    pub default_refresh_interval: i32, // s
    /// Telemetry without a valid token is filed under this device.
    pub default_device_mac: String,
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "byos.sqlite".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8081,
            render_url: "http://127.0.0.1:3000/api/bitmap".to_string(),
            placeholder_image_url: "https://usetrmnl.com/images/setup/setup-logo.bmp".to_string(),
            random_filenames: true,
            prefetch: true,
            prefetch_timeout: Duration::from_secs(10),
            default_refresh_interval: 900,
            default_device_mac: "00:00:00:00:00:00".to_string(),
            cors_origin: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Reads the environment (and `.env` if present), falling back to the defaults.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            database_url: try_load("DATABASE_URL", defaults.database_url)?,
            host: try_load("BYOS_HOST", defaults.host)?,
            port: try_load("BYOS_PORT", defaults.port)?,
            render_url: try_load("BYOS_RENDER_URL", defaults.render_url)?,
            placeholder_image_url: try_load(
                "BYOS_PLACEHOLDER_IMAGE_URL",
                defaults.placeholder_image_url,
            )?,
            random_filenames: try_load("BYOS_RANDOM_FILENAMES", defaults.random_filenames)?,
            prefetch: try_load("BYOS_PREFETCH", defaults.prefetch)?,
            prefetch_timeout: Duration::from_secs(try_load(
                "BYOS_PREFETCH_TIMEOUT_SECS",
                defaults.prefetch_timeout.as_secs(),
            )?),
            default_refresh_interval: try_load(
                "BYOS_DEFAULT_REFRESH_INTERVAL",
                defaults.default_refresh_interval,
            )?,
            default_device_mac: try_load("BYOS_DEFAULT_DEVICE_MAC", defaults.default_device_mac)?,
            cors_origin: try_load("BYOS_CORS_ORIGIN", defaults.cors_origin)?,
        })
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key} value {value:?}: {e}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
