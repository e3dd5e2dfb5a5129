//! Front-desk aggregates computed across resources.

use chrono::NaiveDate;
use serde_json::{json, Value};

use super::{
    bookings::{self, CHECKED_IN, CONFIRMED, PENDING},
    has_status, incidents, invoices, kennels, tasks, vaccinations, HandlerContext,
    ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope},
    seed::Record,
    store::DemoStore,
    time::{parse_day, today},
    AppResult,
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "dashboard",
    list: Some(stats),
    detail: None,
    create: None,
    update: None,
    patch: None,
    delete: None,
    actions: &[("stats", stats), ("today", today_view)],
};

fn report_day(ctx: &HandlerContext<'_>) -> NaiveDate {
    ctx.param("date").and_then(parse_day).unwrap_or_else(today)
}

/// Bookings due to arrive on `day` that have not checked in yet.
fn arrivals(store: &DemoStore, day: NaiveDate) -> Vec<Record> {
    bookings::expanded_with_status(store, &[PENDING, CONFIRMED])
        .into_iter()
        .filter(|booking| bookings::day_of(booking, "startDate") == Some(day))
        .collect()
}

/// Checked-in bookings due to leave on `day`.
fn departures(store: &DemoStore, day: NaiveDate) -> Vec<Record> {
    bookings::expanded_with_status(store, &[CHECKED_IN])
        .into_iter()
        .filter(|booking| bookings::day_of(booking, "endDate") == Some(day))
        .collect()
}

/// Checked-in bookings as a percentage of active kennel capacity, one decimal.
fn occupancy_rate(store: &DemoStore, checked_in: usize) -> f64 {
    let capacity: i64 = store
        .collection("kennels")
        .iter()
        .filter(|kennel| kennels::is_active(kennel))
        .map(kennels::capacity)
        .sum();
    if capacity <= 0 {
        return 0.0;
    }
    let rate = checked_in as f64 / capacity as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

fn vaccination_counts(store: &DemoStore) -> (usize, usize) {
    store
        .collection("vaccinations")
        .iter()
        .map(|record| vaccinations::with_status(store.config(), record.clone()))
        .fold((0, 0), |(expiring, expired), record| {
            match record.get("status").and_then(Value::as_str) {
                Some(vaccinations::EXPIRING) => (expiring + 1, expired),
                Some(vaccinations::EXPIRED) => (expiring, expired + 1),
                _ => (expiring, expired),
            }
        })
}

fn stats(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let day = report_day(ctx);
    let store = &*ctx.store;

    let checked_in = store
        .collection("bookings")
        .iter()
        .filter(|booking| has_status(booking, &[CHECKED_IN]))
        .count();
    let (pending_tasks, overdue_tasks) = tasks::open_count(store);
    let open_incidents = store
        .collection("incidents")
        .iter()
        .filter(|incident| has_status(incident, &[incidents::OPEN]))
        .count();
    let (outstanding_cents, overdue_invoices) = invoices::receivables(store);
    let (expiring, expired) = vaccination_counts(store);

    Ok(Envelope::ok(json!({
        "date": day.format("%Y-%m-%d").to_string(),
        "arrivalsToday": arrivals(store, day).len(),
        "departuresToday": departures(store, day).len(),
        "checkedIn": checked_in,
        "occupancyRate": occupancy_rate(store, checked_in),
        "pendingTasks": pending_tasks,
        "overdueTasks": overdue_tasks,
        "openIncidents": open_incidents,
        "outstandingCents": outstanding_cents,
        "overdueInvoices": overdue_invoices,
        "expiringVaccinations": expiring,
        "expiredVaccinations": expired,
    })))
}

fn today_view(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let day = report_day(ctx);
    let store = &*ctx.store;
    Ok(Envelope::ok(json!({
        "date": day.format("%Y-%m-%d").to_string(),
        "arrivals": records_to_value(arrivals(store, day)),
        "departures": records_to_value(departures(store, day)),
        "checkedIn": records_to_value(bookings::expanded_with_status(store, &[CHECKED_IN])),
    })))
}
