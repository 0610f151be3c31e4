use std::env;

use crate::error::AppError;
use crate::models::courier::GeoPoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub eta_refresh_secs: u64,
    pub delivery_fee_cents: u64,
    /// Dispatch hub used for coarse ETA estimates before a courier is
    /// assigned. Defaults to lower Manhattan.
    pub hub: GeoPoint,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            eta_refresh_secs: parse_or_default("ETA_REFRESH_SECS", 90)?,
            delivery_fee_cents: parse_or_default("DELIVERY_FEE_CENTS", 500)?,
            hub: GeoPoint {
                lat: parse_or_default("HUB_LAT", 40.7128)?,
                lng: parse_or_default("HUB_LNG", -74.0060)?,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
