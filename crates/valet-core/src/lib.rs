//! Valet Core Types and Traits
//!
//! This crate provides the fundamental types and traits shared by every
//! valet crate:
//! - Tenant handles with validated data-set names
//! - Car records, legs and the lifecycle transition table
//! - Site users and their roles
//! - Store traits implemented by storage adapters
//! - Core error types and the clock abstraction

pub mod car;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod store;
pub mod tenant;
pub mod user;

pub use car::{ArchivedRecord, CarRecord, CarStatus, DriverStats, Leg, NewCar, RecordSource, SourcedRecord};
pub use clock::{Clock, DayRange, FixedClock, SystemClock};
pub use error::{Error, KeyKind, Result};
pub use lifecycle::{Advance, Event};
pub use store::{CarStore, SiteDirectory};
pub use tenant::{SiteDefinition, SiteNo, TableName, TenantTables};
pub use user::{NewUser, ROLE_ADMIN, ROLE_DRIVER, SiteUser, UserStats};
