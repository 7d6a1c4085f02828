//! Valet Engine
//!
//! Tenant-scoped car lifecycle operations on top of any [`valet_core::CarStore`].
//!
//! # Components
//! - [`TenantRegistry`]: validated, cached site-number resolution
//! - [`DriverAssignmentManager`]: driver binding and workload statistics
//! - [`ArchivalMover`]: transactional hand-over into the archive
//! - [`ValetEngine`]: the operation surface used by the request layer

pub mod archival;
pub mod drivers;
pub mod engine;
pub mod registry;
pub mod static_directory;

pub use archival::ArchivalMover;
pub use drivers::DriverAssignmentManager;
pub use engine::{SEARCH_LIMIT, ValetEngine};
pub use registry::{IntoSiteNo, TenantRegistry};
pub use static_directory::StaticSiteDirectory;
