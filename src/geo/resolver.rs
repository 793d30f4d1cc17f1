use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::geo::haversine_km;
use crate::models::location::{GeoPoint, Location};
use crate::observability::metrics::Metrics;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DistanceError {
    #[error("no coordinates known for {0}")]
    NoMatch(String),

    #[error("distance provider failed: {0}")]
    Provider(String),

    #[error("distance lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Driving distance between two places, in kilometres.
#[async_trait]
pub trait DistanceResolver: Send + Sync {
    async fn resolve(&self, from: &Location, to: &Location) -> Result<f64, DistanceError>;
}

/// Estimates road distance from great-circle distance scaled by a detour factor.
///
/// Coordinates come from the location itself or, failing that, from a gazetteer of
/// known place names (matched case-insensitively).
pub struct GreatCircleResolver {
    known_places: HashMap<String, GeoPoint>,
    road_factor: f64,
}

impl GreatCircleResolver {
    pub fn new(known_places: HashMap<String, GeoPoint>, road_factor: f64) -> Self {
        let known_places = known_places
            .into_iter()
            .map(|(name, point)| (normalize(&name), point))
            .collect();

        Self {
            known_places,
            road_factor,
        }
    }

    fn locate(&self, location: &Location) -> Result<GeoPoint, DistanceError> {
        if let Some(point) = location.point {
            return Ok(point);
        }

        self.known_places
            .get(&normalize(&location.address))
            .copied()
            .ok_or_else(|| DistanceError::NoMatch(location.address.clone()))
    }
}

#[async_trait]
impl DistanceResolver for GreatCircleResolver {
    async fn resolve(&self, from: &Location, to: &Location) -> Result<f64, DistanceError> {
        let a = self.locate(from)?;
        let b = self.locate(to)?;
        Ok(haversine_km(&a, &b) * self.road_factor)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Resolves a distance with a hard deadline. Failures are logged and absorbed.
pub async fn resolve_bounded(
    resolver: &dyn DistanceResolver,
    from: &Location,
    to: &Location,
    timeout: Duration,
    metrics: &Metrics,
) -> Option<f64> {
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, resolver.resolve(from, to)).await {
        Ok(result) => result,
        Err(_) => Err(DistanceError::Timeout(timeout)),
    };

    let outcome = match &result {
        Ok(_) => "success",
        Err(DistanceError::Timeout(_)) => "timeout",
        Err(_) => "error",
    };
    metrics
        .distance_resolution_seconds
        .observe(start.elapsed().as_secs_f64());
    metrics
        .distance_resolutions_total
        .with_label_values(&[outcome])
        .inc();

    match result {
        Ok(km) if km.is_finite() && km >= 0.0 => Some((km * 10.0).round() / 10.0),
        Ok(km) => {
            warn!(from = %from.address, to = %to.address, km, "discarding invalid distance");
            None
        }
        Err(err) => {
            warn!(from = %from.address, to = %to.address, error = %err, "distance unavailable");
            None
        }
    }
}
