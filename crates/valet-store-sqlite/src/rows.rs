//! Row mapping between SQLite and core record types

use chrono::{DateTime, Utc};
use valet_core::{CarRecord, CarStatus, Error, Result, SiteNo};

/// Columns of the active and archive tables, in `CarRow` order
pub(crate) const CAR_COLUMNS: &str = "car_no, site_no, valet_id, phone_number, status, \
     parking_spot, driver_assigned_for_parking, driver_assigned_for_bringing, \
     seen_parking, seen_bringing, timestamp_car_in_request, timestamp_driver_assigned, \
     timestamp_parked, timestamp_car_out_request, timestamp_car_brought, \
     timestamp_car_handed_over, timestamp_seen_parking, timestamp_seen_bringing";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CarRow {
    car_no: String,
    site_no: i64,
    valet_id: String,
    phone_number: Option<String>,
    status: String,
    parking_spot: Option<String>,
    driver_assigned_for_parking: Option<String>,
    driver_assigned_for_bringing: Option<String>,
    seen_parking: bool,
    seen_bringing: bool,
    timestamp_car_in_request: DateTime<Utc>,
    timestamp_driver_assigned: Option<DateTime<Utc>>,
    timestamp_parked: Option<DateTime<Utc>>,
    timestamp_car_out_request: Option<DateTime<Utc>>,
    timestamp_car_brought: Option<DateTime<Utc>>,
    timestamp_car_handed_over: Option<DateTime<Utc>>,
    timestamp_seen_parking: Option<DateTime<Utc>>,
    timestamp_seen_bringing: Option<DateTime<Utc>>,
}

impl TryFrom<CarRow> for CarRecord {
    type Error = Error;

    fn try_from(row: CarRow) -> Result<Self> {
        Ok(CarRecord {
            status: row.status.parse::<CarStatus>()?,
            site_no: SiteNo::new(row.site_no).map_err(|_| {
                Error::StorageFailure(format!(
                    "Car {} stored with invalid site number {}",
                    row.car_no, row.site_no
                ))
            })?,
            car_no: row.car_no,
            valet_id: row.valet_id,
            phone_number: row.phone_number,
            parking_spot: row.parking_spot,
            driver_assigned_for_parking: row.driver_assigned_for_parking,
            driver_assigned_for_bringing: row.driver_assigned_for_bringing,
            seen_parking: row.seen_parking,
            seen_bringing: row.seen_bringing,
            car_in_requested_at: row.timestamp_car_in_request,
            driver_assigned_at: row.timestamp_driver_assigned,
            parked_at: row.timestamp_parked,
            car_out_requested_at: row.timestamp_car_out_request,
            brought_at: row.timestamp_car_brought,
            handed_over_at: row.timestamp_car_handed_over,
            seen_parking_at: row.timestamp_seen_parking,
            seen_bringing_at: row.timestamp_seen_bringing,
        })
    }
}

pub(crate) fn into_records(rows: Vec<CarRow>) -> Result<Vec<CarRecord>> {
    rows.into_iter().map(CarRecord::try_from).collect()
}

/// Render statuses as a SQL list literal for an `IN (...)` filter.
///
/// Status strings are fixed identifiers, never user input.
pub(crate) fn status_list(statuses: &[CarStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Last four characters of a search query
pub(crate) fn last_four(value: &str) -> &str {
    let count = value.chars().count();
    if count <= 4 {
        return value;
    }
    let skip = value
        .char_indices()
        .nth(count - 4)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &value[skip..]
}
