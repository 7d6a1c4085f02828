//! Car records, legs and listing types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result, tenant::SiteNo};

/// Lifecycle state of a car record.
///
/// `HandedOver` is terminal and only ever observed in the archive data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarStatus {
    InRequest,
    AssignedParking,
    Parked,
    OutRequest,
    AssignedBringing,
    BroughtToClient,
    HandedOver,
}

impl CarStatus {
    pub const ALL: [CarStatus; 7] = [
        CarStatus::InRequest,
        CarStatus::AssignedParking,
        CarStatus::Parked,
        CarStatus::OutRequest,
        CarStatus::AssignedBringing,
        CarStatus::BroughtToClient,
        CarStatus::HandedOver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::InRequest => "in_request",
            CarStatus::AssignedParking => "assigned_parking",
            CarStatus::Parked => "parked",
            CarStatus::OutRequest => "out_request",
            CarStatus::AssignedBringing => "assigned_bringing",
            CarStatus::BroughtToClient => "brought_to_client",
            CarStatus::HandedOver => "handed_over",
        }
    }
}

impl fmt::Display for CarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CarStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::StorageFailure(format!("Unknown car status: {:?}", s)))
    }
}

/// One half of a car's journey, each with its own driver and seen flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    /// Inbound: from the drop-off point to a parking spot
    Parking,
    /// Outbound: from the parking spot back to the client
    Bringing,
}

impl Leg {
    /// The leg an assignment request targets for a record in `status`.
    ///
    /// Returns `None` when no driver can be (re)assigned in that state.
    pub fn for_assignment(status: CarStatus) -> Option<Leg> {
        match status {
            CarStatus::InRequest | CarStatus::AssignedParking => Some(Leg::Parking),
            CarStatus::OutRequest | CarStatus::AssignedBringing => Some(Leg::Bringing),
            _ => None,
        }
    }

    /// States from which this leg accepts an assignment
    pub fn assignable_from(&self) -> [CarStatus; 2] {
        match self {
            Leg::Parking => [CarStatus::InRequest, CarStatus::AssignedParking],
            Leg::Bringing => [CarStatus::OutRequest, CarStatus::AssignedBringing],
        }
    }

    /// Status a record takes once a driver is bound to this leg
    pub fn assigned_status(&self) -> CarStatus {
        match self {
            Leg::Parking => CarStatus::AssignedParking,
            Leg::Bringing => CarStatus::AssignedBringing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Parking => "parking",
            Leg::Bringing => "bringing",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Leg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "parking" => Ok(Leg::Parking),
            "bringing" => Ok(Leg::Bringing),
            other => Err(Error::InvalidInput(format!(
                "Invalid leg {:?}, must be 'parking' or 'bringing'",
                other
            ))),
        }
    }
}

/// Input of a car-in request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCar {
    pub car_no: String,
    pub valet_id: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// A car record of a tenant's active or archive data set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarRecord {
    pub car_no: String,
    pub site_no: SiteNo,
    pub valet_id: String,
    pub phone_number: Option<String>,
    pub status: CarStatus,
    pub parking_spot: Option<String>,
    pub driver_assigned_for_parking: Option<String>,
    pub driver_assigned_for_bringing: Option<String>,
    pub seen_parking: bool,
    pub seen_bringing: bool,
    pub car_in_requested_at: DateTime<Utc>,
    pub driver_assigned_at: Option<DateTime<Utc>>,
    pub parked_at: Option<DateTime<Utc>>,
    pub car_out_requested_at: Option<DateTime<Utc>>,
    pub brought_at: Option<DateTime<Utc>>,
    pub handed_over_at: Option<DateTime<Utc>>,
    pub seen_parking_at: Option<DateTime<Utc>>,
    pub seen_bringing_at: Option<DateTime<Utc>>,
}

impl CarRecord {
    /// Driver bound to a leg, if any
    pub fn driver_for(&self, leg: Leg) -> Option<&str> {
        match leg {
            Leg::Parking => self.driver_assigned_for_parking.as_deref(),
            Leg::Bringing => self.driver_assigned_for_bringing.as_deref(),
        }
    }
}

/// Immutable copy of a record in the archive data set, stamped with the
/// hand-over time and status `handed_over`.
pub type ArchivedRecord = CarRecord;

/// Data set a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Active,
    Archive,
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSource::Active => write!(f, "active"),
            RecordSource::Archive => write!(f, "archive"),
        }
    }
}

/// A record tagged with the data set it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedRecord {
    #[serde(flatten)]
    pub record: CarRecord,
    pub source: RecordSource,
}

/// Per-driver workload for a tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStats {
    pub driver_id: String,
    /// `parking_today + retrieval_today`
    pub jobs_in_progress: u64,
    /// Parking legs parked today plus bringing legs brought today, counted
    /// once each across the active and archive data sets
    pub jobs_completed_today: u64,
    /// Cars currently `assigned_parking` to the driver
    pub parking_today: u64,
    /// Cars currently `assigned_bringing` to the driver
    pub retrieval_today: u64,
}
