use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::GeoPoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub event_buffer_size: usize,
    pub distance_timeout: Duration,
    pub road_factor: f64,
    pub system_admin_ids: Vec<Uuid>,
    pub known_places_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let road_factor: f64 = parse_or_default("ROAD_FACTOR", 1.25)?;
        if !road_factor.is_finite() || road_factor < 1.0 {
            return Err(AppError::Internal(format!(
                "invalid ROAD_FACTOR: {road_factor} must be >= 1.0"
            )));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: parse_log_format()?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            distance_timeout: Duration::from_millis(parse_or_default("DISTANCE_TIMEOUT_MS", 3000)?),
            road_factor,
            system_admin_ids: parse_id_list("SYSTEM_ADMIN_IDS")?,
            known_places_path: env::var("KNOWN_PLACES_PATH")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Reads the place-name gazetteer used by the built-in distance resolver.
    pub fn load_known_places(&self) -> Result<HashMap<String, GeoPoint>, AppError> {
        let Some(path) = &self.known_places_path else {
            return Ok(HashMap::new());
        };

        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Internal(format!("failed to read {}: {err}", path.display()))
        })?;

        serde_json::from_str(&raw).map_err(|err| {
            AppError::Internal(format!("invalid known places in {}: {err}", path.display()))
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

fn parse_log_format() -> Result<bool, AppError> {
    match env::var("LOG_FORMAT").as_deref().map(str::trim) {
        Err(_) | Ok("") | Ok("compact") => Ok(false),
        Ok("json") => Ok(true),
        Ok(other) => Err(AppError::Internal(format!(
            "invalid LOG_FORMAT: {other} (expected compact or json)"
        ))),
    }
}

fn parse_id_list(key: &str) -> Result<Vec<Uuid>, AppError> {
    let Ok(raw) = env::var(key) else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|err| AppError::Internal(format!("invalid {key} entry {part}: {err}")))
        })
        .collect()
}
