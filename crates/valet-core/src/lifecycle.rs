//! Car lifecycle transition table
//!
//! ```text
//! in_request -> assigned_parking -> parked -> out_request
//!            -> assigned_bringing -> brought_to_client -> handed_over
//! ```
//!
//! Storage adapters must not hand-code guards. They take the accepted states
//! from [`Event::accepted_from`] and embed them in the filter of the very
//! statement that performs the write, so the check and the write are one
//! atomic step.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::car::{CarStatus, Leg};
use crate::{Error, Result};

/// An operation requested against a single car record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    CarIn,
    /// Assign or reassign the driver of whichever leg the status selects
    AssignDriver,
    MarkParked,
    RequestCarOut,
    MarkBrought,
    MarkHandedOver,
    /// Driver acknowledgment; never changes the status
    MarkSeen(Leg),
}

const ASSIGNABLE: &[CarStatus] = &[
    CarStatus::InRequest,
    CarStatus::AssignedParking,
    CarStatus::OutRequest,
    CarStatus::AssignedBringing,
];

const PARKING_SEEN: &[CarStatus] = &[
    CarStatus::AssignedParking,
    CarStatus::Parked,
    CarStatus::OutRequest,
    CarStatus::AssignedBringing,
    CarStatus::BroughtToClient,
];

const BRINGING_SEEN: &[CarStatus] = &[CarStatus::AssignedBringing, CarStatus::BroughtToClient];

impl Event {
    /// States of an existing record from which the event is accepted.
    ///
    /// `CarIn` creates records and accepts no existing state.
    pub fn accepted_from(&self) -> &'static [CarStatus] {
        match self {
            Event::CarIn => &[],
            Event::AssignDriver => ASSIGNABLE,
            Event::MarkParked => &[CarStatus::AssignedParking],
            Event::RequestCarOut => &[CarStatus::Parked],
            Event::MarkBrought => &[CarStatus::AssignedBringing],
            Event::MarkHandedOver => &[CarStatus::BroughtToClient],
            Event::MarkSeen(Leg::Parking) => PARKING_SEEN,
            Event::MarkSeen(Leg::Bringing) => BRINGING_SEEN,
        }
    }

    pub fn accepts(&self, current: CarStatus) -> bool {
        self.accepted_from().contains(&current)
    }

    /// Status after applying the event to a record in `current`.
    ///
    /// Returns `None` when the event is rejected in that state.
    pub fn next_status(&self, current: CarStatus) -> Option<CarStatus> {
        if !self.accepts(current) {
            return None;
        }
        match self {
            Event::CarIn => None,
            Event::AssignDriver => Leg::for_assignment(current).map(|leg| leg.assigned_status()),
            Event::MarkParked => Some(CarStatus::Parked),
            Event::RequestCarOut => Some(CarStatus::OutRequest),
            Event::MarkBrought => Some(CarStatus::BroughtToClient),
            Event::MarkHandedOver => Some(CarStatus::HandedOver),
            Event::MarkSeen(_) => Some(current),
        }
    }

    /// Error describing why the event was rejected for a record in `current`.
    ///
    /// Mark-brought and hand-over report `PreconditionFailed` (a no-op on a
    /// state mismatch); everything else reports `InvalidTransition`.
    pub fn rejection(&self, car_no: &str, current: CarStatus) -> Error {
        match self {
            Event::MarkBrought | Event::MarkHandedOver => Error::PreconditionFailed {
                car_no: car_no.to_string(),
                current,
                expected: self.accepted_from()[0],
            },
            _ => Error::InvalidTransition {
                car_no: car_no.to_string(),
                current,
                event: *self,
            },
        }
    }

    /// Validate the event against `current`, returning the next status
    pub fn check(&self, car_no: &str, current: CarStatus) -> Result<CarStatus> {
        self.next_status(current)
            .ok_or_else(|| self.rejection(car_no, current))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CarIn => write!(f, "check in"),
            Event::AssignDriver => write!(f, "assign a driver"),
            Event::MarkParked => write!(f, "be marked parked"),
            Event::RequestCarOut => write!(f, "be requested out"),
            Event::MarkBrought => write!(f, "be marked brought"),
            Event::MarkHandedOver => write!(f, "be handed over"),
            Event::MarkSeen(leg) => write!(f, "have its {} leg marked seen", leg),
        }
    }
}

/// A status-advancing step that binds no driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Parked { parking_spot: String },
    OutRequested,
    Brought,
}

impl Advance {
    pub fn event(&self) -> Event {
        match self {
            Advance::Parked { .. } => Event::MarkParked,
            Advance::OutRequested => Event::RequestCarOut,
            Advance::Brought => Event::MarkBrought,
        }
    }

    pub fn target(&self) -> CarStatus {
        match self {
            Advance::Parked { .. } => CarStatus::Parked,
            Advance::OutRequested => CarStatus::OutRequest,
            Advance::Brought => CarStatus::BroughtToClient,
        }
    }
}
