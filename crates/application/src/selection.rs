//! Driver selection for new deliveries.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use common::DriverId;
use domain::Driver;
use store::DriverLoadReader;
use thiserror::Error;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// How a driver is picked for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionStrategy {
    /// Closest known position to the delivery point.
    #[default]
    NearestToDelivery,

    /// Fewest packages already scheduled on the delivery date.
    LeastPackagesOnDate,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::NearestToDelivery => "NearestToDelivery",
            SelectionStrategy::LeastPackagesOnDate => "LeastPackagesOnDate",
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A strategy name that matches no known strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown driver selection strategy: {0:?}")]
pub struct UnknownStrategy(pub String);

impl FromStr for SelectionStrategy {
    type Err = UnknownStrategy;

    /// Accepts the strategy name (any case) or its ordinal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value == "0" || value.eq_ignore_ascii_case("NearestToDelivery") {
            Ok(SelectionStrategy::NearestToDelivery)
        } else if value == "1" || value.eq_ignore_ascii_case("LeastPackagesOnDate") {
            Ok(SelectionStrategy::LeastPackagesOnDate)
        } else {
            Err(UnknownStrategy(s.to_string()))
        }
    }
}

/// What the engine knows about the delivery being assigned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionCriteria {
    pub delivery_date: NaiveDate,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub strategy: SelectionStrategy,
}

/// Great-circle distance in kilometres between two points given in degrees.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

fn by_name(a: &Driver, b: &Driver) -> Ordering {
    a.name().cmp(b.name()).then_with(|| a.id().cmp(&b.id()))
}

/// Picks exactly one driver for a delivery, or none when there are no drivers.
pub struct DriverSelectionEngine<L>
where
    L: DriverLoadReader,
{
    loads: L,
}

impl<L> DriverSelectionEngine<L>
where
    L: DriverLoadReader,
{
    /// Creates an engine reading per-date workload from `loads`.
    pub fn new(loads: L) -> Self {
        Self { loads }
    }

    /// Selects a driver according to `criteria.strategy`.
    ///
    /// A failing workload query degrades to nearest-driver selection instead
    /// of failing the whole selection.
    #[tracing::instrument(skip(self, drivers), fields(drivers = drivers.len(), strategy = %criteria.strategy))]
    pub async fn select<'a>(
        &self,
        drivers: &'a [Driver],
        criteria: &SelectionCriteria,
    ) -> Option<&'a Driver> {
        if drivers.is_empty() {
            return None;
        }

        let selected = match criteria.strategy {
            SelectionStrategy::NearestToDelivery => Self::nearest(drivers, criteria),
            SelectionStrategy::LeastPackagesOnDate => {
                match self.loads.driver_delivery_loads(criteria.delivery_date).await {
                    Ok(loads) => Self::least_loaded(drivers, &loads),
                    Err(e) => {
                        metrics::counter!("driver_selection_fallbacks_total").increment(1);
                        tracing::warn!(
                            error = %e,
                            date = %criteria.delivery_date,
                            "driver load query failed, falling back to nearest driver"
                        );
                        Self::nearest(drivers, criteria)
                    }
                }
            }
        };

        if let Some(driver) = selected {
            tracing::debug!(driver_id = %driver.id(), name = driver.name(), "driver selected");
        }
        selected
    }

    fn nearest<'a>(drivers: &'a [Driver], criteria: &SelectionCriteria) -> Option<&'a Driver> {
        let located = drivers
            .iter()
            .filter_map(|driver| {
                driver.position().map(|(lat, lon)| {
                    let distance = haversine_km(
                        criteria.delivery_latitude,
                        criteria.delivery_longitude,
                        lat,
                        lon,
                    );
                    (distance, driver)
                })
            })
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| by_name(a, b)));

        match located {
            Some((_, driver)) => Some(driver),
            None => drivers.iter().min_by(|a, b| by_name(a, b)),
        }
    }

    fn least_loaded<'a>(
        drivers: &'a [Driver],
        loads: &[store::DriverDeliveryLoad],
    ) -> Option<&'a Driver> {
        let counts: HashMap<DriverId, i64> = loads
            .iter()
            .map(|load| (load.driver_id, load.packages_count))
            .collect();
        let count_of = |driver: &Driver| counts.get(&driver.id()).copied().unwrap_or(0);

        drivers
            .iter()
            .min_by(|a, b| count_of(*a).cmp(&count_of(*b)).then_with(|| by_name(a, b)))
    }
}
