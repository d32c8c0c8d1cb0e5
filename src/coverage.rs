use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::dataset::DatasetDescriptor;
use crate::domain::{BoundingBox, Protocol, QueryBounds, QueryDate};
use crate::erddap::ErddapClient;
use crate::error::BrokerError;

/// Whether `dataset` may hold data inside the query window.
///
/// Tabular datasets are probed with a one-row `time` request; any probe
/// failure counts as no coverage. Gridded datasets are decided locally from
/// their WMS time values and bounding box.
pub fn covers<C>(
    client: &C,
    dataset: &DatasetDescriptor,
    start: &QueryDate,
    end: &QueryDate,
    bounds: &QueryBounds,
) -> bool
where
    C: ErddapClient + ?Sized,
{
    if !covers_spatial(dataset, bounds) {
        return false;
    }
    match dataset.protocol() {
        Protocol::Tabular => match probe(client, dataset, start, end, bounds) {
            Ok(found) => found,
            Err(err) => {
                debug!(dataset = %dataset.name(), error = %err, "coverage probe failed");
                false
            }
        },
        Protocol::Gridded => covers_grid_time(dataset, start, end),
    }
}

/// Rectangle test; datasets without a bounding box always pass.
pub fn covers_spatial(dataset: &DatasetDescriptor, bounds: &QueryBounds) -> bool {
    let Some(dataset_box) = dataset.bounding_box() else {
        return true;
    };
    let query_box = BoundingBox::from(*bounds);
    query_box.intersects(dataset_box) || query_box.contains(dataset_box)
}

pub fn covers_grid_time(dataset: &DatasetDescriptor, start: &QueryDate, end: &QueryDate) -> bool {
    let available = dataset.time_grid_values();
    daily_range(start, end)
        .iter()
        .any(|day| available.contains(day))
}

/// Days from `start` (inclusive) to `end` (exclusive) in one-day steps, as `YYYY-MM-DD`.
pub fn daily_range(start: &QueryDate, end: &QueryDate) -> Vec<String> {
    days_between(start.date_time(), end.date_time())
}

fn days_between(start: NaiveDateTime, end: NaiveDateTime) -> Vec<String> {
    let mut current = Some(start);
    let mut days = Vec::new();
    while let Some(day) = current.filter(|day| *day < end) {
        days.push(day.format("%Y-%m-%d").to_string());
        current = day.checked_add_signed(TimeDelta::days(1));
    }
    days
}

pub fn probe_url(
    dataset: &DatasetDescriptor,
    start: &QueryDate,
    end: &QueryDate,
    bounds: &QueryBounds,
) -> String {
    format!(
        "{url}.csv?time&time%3E={start}&time%3C={end}\
         &latitude%3E={min_lat}&latitude%3C={max_lat}\
         &longitude%3E={min_lon}&longitude%3C={max_lon}\
         &orderByLimit(%22time/6months,1%22)",
        url = dataset.data_url(),
        min_lat = bounds.min_lat,
        max_lat = bounds.max_lat,
        min_lon = bounds.min_lon,
        max_lon = bounds.max_lon,
    )
}

fn probe<C>(
    client: &C,
    dataset: &DatasetDescriptor,
    start: &QueryDate,
    end: &QueryDate,
    bounds: &QueryBounds,
) -> Result<bool, BrokerError>
where
    C: ErddapClient + ?Sized,
{
    let url = probe_url(dataset, start, end, bounds);
    debug!(dataset = %dataset.name(), url = %url, "probing spatiotemporal coverage");
    let table = client
        .fetch_table(&url)
        .map_err(|err| BrokerError::CoverageProbe(err.to_string()))?;
    Ok(!table.is_empty())
}
