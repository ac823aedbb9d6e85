use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;
use crate::models::agent::{GeoPoint, VehicleClass};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FareRate {
    pub base_fare: f64,
    pub per_km: f64,
    pub avg_speed_kmh: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FareEstimate {
    pub fare: f64,
    pub eta_minutes: u32,
    pub distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct FareTable {
    bike: FareRate,
    scooter: FareRate,
    auto: FareRate,
    car: FareRate,
}

impl Default for FareTable {
    fn default() -> Self {
        Self {
            bike: FareRate {
                base_fare: 30.0,
                per_km: 6.0,
                avg_speed_kmh: 25.0,
            },
            scooter: FareRate {
                base_fare: 35.0,
                per_km: 7.0,
                avg_speed_kmh: 25.0,
            },
            auto: FareRate {
                base_fare: 50.0,
                per_km: 9.0,
                avg_speed_kmh: 22.0,
            },
            car: FareRate {
                base_fare: 150.0,
                per_km: 12.0,
                avg_speed_kmh: 30.0,
            },
        }
    }
}

impl FareTable {
    pub fn rate(&self, vehicle_class: VehicleClass) -> &FareRate {
        match vehicle_class {
            VehicleClass::Bike => &self.bike,
            VehicleClass::Scooter => &self.scooter,
            VehicleClass::Auto => &self.auto,
            VehicleClass::Car => &self.car,
        }
    }

    pub fn with_rate(mut self, vehicle_class: VehicleClass, rate: FareRate) -> Self {
        match vehicle_class {
            VehicleClass::Bike => self.bike = rate,
            VehicleClass::Scooter => self.scooter = rate,
            VehicleClass::Auto => self.auto = rate,
            VehicleClass::Car => self.car = rate,
        }
        self
    }

    pub fn estimate(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
        vehicle_class: VehicleClass,
        demand_factor: f64,
    ) -> FareEstimate {
        self.estimate_for_distance(haversine_km(origin, destination), vehicle_class, demand_factor)
    }

    pub fn estimate_for_distance(
        &self,
        distance_km: f64,
        vehicle_class: VehicleClass,
        demand_factor: f64,
    ) -> FareEstimate {
        let rate = self.rate(vehicle_class);
        let distance_km = if distance_km.is_finite() {
            distance_km.max(0.0)
        } else {
            0.0
        };
        let demand = normalize_demand(demand_factor);

        let raw = rate.base_fare + rate.per_km * distance_km * demand;
        let fare = round_currency(raw.max(rate.base_fare));

        let eta_minutes = if rate.avg_speed_kmh > 0.0 {
            (distance_km / rate.avg_speed_kmh * 60.0).ceil() as u32
        } else {
            0
        };

        FareEstimate {
            fare,
            eta_minutes,
            distance_km,
        }
    }
}

pub fn normalize_demand(demand_factor: f64) -> f64 {
    if demand_factor.is_finite() {
        demand_factor.max(1.0)
    } else {
        1.0
    }
}

fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
