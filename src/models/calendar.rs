//! Calendar aggregation: seven independent sources queried concurrently and
//! merged into one event list. A failing source is logged and reported in
//! `meta.sources` but never fails the request.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    utils::{from_bson_date, parse_date, parse_end_date, push_and, start_of_day, to_bson_date},
};

use super::{
    daily_activity::DailyActivity,
    employee_leave::{EmployeeLeave, LeaveStatus},
    holiday::{self, Holiday},
    maintenance::MaintenanceSchedule,
    role::AccessScope,
    safety_inspection::SafetyInspectionSchedule,
    shift_detail::{ShiftDetail, ShiftType},
    ticket::{self, Ticket, TicketStatus},
};

const MAX_RANGE_DAYS: i64 = 366;

pub const COLOR_CRITICAL: &str = "#dc2626";
pub const COLOR_HIGH: &str = "#ef4444";
pub const COLOR_MEDIUM: &str = "#f59e0b";
pub const COLOR_LOW: &str = "#10b981";
pub const COLOR_UNKNOWN: &str = "#6b7280";
pub const COLOR_SAFETY: &str = "#f97316";
pub const COLOR_SHIFT: &str = "#3b82f6";
pub const COLOR_NIGHT_SHIFT: &str = "#6366f1";
pub const COLOR_HOLIDAY: &str = "#8b5cf6";
pub const COLOR_LEAVE: &str = "#ec4899";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CalendarSource {
    DailyActivity,
    Maintenance,
    SafetyInspection,
    Ticket,
    Shift,
    Holiday,
    Leave,
}

impl CalendarSource {
    pub const ALL: [CalendarSource; 7] = [
        CalendarSource::DailyActivity,
        CalendarSource::Maintenance,
        CalendarSource::SafetyInspection,
        CalendarSource::Ticket,
        CalendarSource::Shift,
        CalendarSource::Holiday,
        CalendarSource::Leave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarSource::DailyActivity => "daily_activity",
            CalendarSource::Maintenance => "maintenance",
            CalendarSource::SafetyInspection => "safety_inspection",
            CalendarSource::Ticket => "ticket",
            CalendarSource::Shift => "shift",
            CalendarSource::Holiday => "holiday",
            CalendarSource::Leave => "leave",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|source| source.as_str() == value)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub types: Option<String>,
    pub department: Option<String>,
    pub employee_id: Option<String>,
}

/// Validated calendar request.
#[derive(Debug, Clone)]
pub struct CalendarWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sources: Vec<CalendarSource>,
    pub department: Option<String>,
    pub employee_id: Option<String>,
}

impl CalendarWindow {
    pub fn wants(&self, source: CalendarSource) -> bool {
        self.sources.contains(&source)
    }
}

fn month_bounds(date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    let next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
    };
    Some((start_of_day(first), start_of_day(next) - Duration::milliseconds(1)))
}

impl CalendarQuery {
    /// Missing bounds default to the current month (or the start date's month).
    pub fn window(&self, now: DateTime<Utc>) -> Result<CalendarWindow, ApiError> {
        let not_blank = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());
        let start = match not_blank(&self.start_date) {
            Some(start) => parse_date(&start)?,
            None => month_bounds(now.date_naive())
                .ok_or_else(|| ApiError::internal("INVALID_CALENDAR_MONTH"))?
                .0,
        };
        let end = match not_blank(&self.end_date) {
            Some(end) => parse_end_date(&end)?,
            None => month_bounds(start.date_naive())
                .ok_or_else(|| ApiError::internal("INVALID_CALENDAR_MONTH"))?
                .1,
        };
        if end < start {
            return Err(ApiError::validation("endDate must not be before startDate"));
        }
        if end - start > Duration::days(MAX_RANGE_DAYS) {
            return Err(ApiError::validation(format!(
                "Date range cannot exceed {MAX_RANGE_DAYS} days"
            )));
        }

        let sources = match not_blank(&self.types) {
            Some(types) => {
                let mut sources = Vec::new();
                for kind in types.split(',').filter(|kind| !kind.trim().is_empty()) {
                    let source = CalendarSource::parse(kind)
                        .ok_or_else(|| ApiError::validation(format!("Unknown event type: {}", kind.trim())))?;
                    if !sources.contains(&source) {
                        sources.push(source);
                    }
                }
                if sources.is_empty() {
                    CalendarSource::ALL.to_vec()
                } else {
                    sources
                }
            }
            None => CalendarSource::ALL.to_vec(),
        };

        Ok(CalendarWindow {
            start,
            end,
            sources,
            department: not_blank(&self.department).map(|v| v.trim().to_string()),
            employee_id: not_blank(&self.employee_id).map(|v| v.trim().to_string()),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventProps {
    pub source: CalendarSource,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub department: Option<String>,
    pub reference_id: String,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub color: &'static str,
    pub extended_props: EventProps,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceStatus {
    pub source: CalendarSource,
    pub count: usize,
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMeta {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub sources: Vec<SourceStatus>,
}

#[derive(Debug, Serialize)]
pub struct CalendarEvents {
    pub events: Vec<CalendarEvent>,
    pub meta: CalendarMeta,
}

pub fn priority_color(priority: Option<&str>) -> &'static str {
    match priority.map(str::to_lowercase).as_deref() {
        Some("critical") => COLOR_CRITICAL,
        Some("high") => COLOR_HIGH,
        Some("medium") => COLOR_MEDIUM,
        Some("low") => COLOR_LOW,
        _ => COLOR_UNKNOWN,
    }
}

pub fn from_daily_activity(activity: &DailyActivity) -> CalendarEvent {
    let reference_id = activity._id.map(|id| id.to_hex()).unwrap_or_default();
    CalendarEvent {
        id: format!("daily_activity-{reference_id}"),
        title: activity.title.clone(),
        start: from_bson_date(activity.date),
        end: None,
        all_day: true,
        color: priority_color(Some(activity.priority.as_str())),
        extended_props: EventProps {
            source: CalendarSource::DailyActivity,
            status: Some(activity.status.as_str().to_string()),
            priority: Some(activity.priority.as_str().to_string()),
            department: activity.department.clone(),
            reference_id,
            details: json!({
                "area": activity.area,
                "assetId": activity.asset_id,
                "assetName": activity.asset_name,
                "attendedBy": activity.attended_by,
                "durationMinutes": activity.duration_minutes,
            }),
        },
    }
}

pub fn from_maintenance(schedule: &MaintenanceSchedule, now: DateTime<Utc>) -> Option<CalendarEvent> {
    let start = schedule.due()?;
    let reference_id = schedule._id.to_hex();
    Some(CalendarEvent {
        id: format!("maintenance-{reference_id}"),
        title: schedule.display_title(),
        start,
        end: None,
        all_day: true,
        color: priority_color(schedule.priority.as_deref()),
        extended_props: EventProps {
            source: CalendarSource::Maintenance,
            status: schedule.status.clone(),
            priority: schedule.priority.clone(),
            department: schedule.department.clone(),
            reference_id,
            details: json!({
                "assetId": schedule.asset_id,
                "assetName": schedule.asset_name,
                "frequency": schedule.frequency,
                "assignedTechnician": schedule.assigned_technician,
                "overdue": schedule.is_overdue(now),
            }),
        },
    })
}

pub fn from_safety_inspection(schedule: &SafetyInspectionSchedule) -> Option<CalendarEvent> {
    let start = schedule.due()?;
    let reference_id = schedule._id.to_hex();
    Some(CalendarEvent {
        id: format!("safety_inspection-{reference_id}"),
        title: schedule.display_title(),
        start,
        end: None,
        all_day: true,
        color: COLOR_SAFETY,
        extended_props: EventProps {
            source: CalendarSource::SafetyInspection,
            status: schedule.status.clone(),
            priority: schedule.priority.clone().or_else(|| schedule.risk_level.clone()),
            department: schedule.department.clone(),
            reference_id,
            details: json!({
                "assetId": schedule.asset_id,
                "assetName": schedule.asset_name,
                "frequency": schedule.frequency,
                "riskLevel": schedule.risk_level,
                "assignedInspector": schedule.assigned_inspector,
            }),
        },
    })
}

pub fn from_ticket(ticket: &Ticket) -> CalendarEvent {
    let reference_id = ticket._id.map(|id| id.to_hex()).unwrap_or_default();
    CalendarEvent {
        id: format!("ticket-{reference_id}"),
        title: format!("{}: {}", ticket.ticket_id, ticket.subject),
        start: from_bson_date(ticket.due_date.unwrap_or(ticket.created_at)),
        end: None,
        all_day: true,
        color: priority_color(Some(ticket.priority.as_str())),
        extended_props: EventProps {
            source: CalendarSource::Ticket,
            status: Some(ticket.status.as_str().to_string()),
            priority: Some(ticket.priority.as_str().to_string()),
            department: ticket.department.clone(),
            reference_id,
            details: json!({
                "ticketId": ticket.ticket_id,
                "area": ticket.area,
                "assetName": ticket.asset_name,
                "assignedTo": ticket.assigned_to,
                "hasDueDate": ticket.due_date.is_some(),
            }),
        },
    }
}

pub fn from_holiday(holiday: &Holiday) -> CalendarEvent {
    let reference_id = holiday._id.map(|id| id.to_hex()).unwrap_or_default();
    CalendarEvent {
        id: format!("holiday-{reference_id}"),
        title: holiday.name.clone(),
        start: from_bson_date(holiday.date),
        end: None,
        all_day: true,
        color: COLOR_HOLIDAY,
        extended_props: EventProps {
            source: CalendarSource::Holiday,
            status: None,
            priority: None,
            department: holiday.department.clone(),
            reference_id,
            details: json!({
                "type": holiday.kind,
                "description": holiday.description,
            }),
        },
    }
}

/// All-day leave event; `end` is exclusive, the day after the last leave day.
pub fn from_leave(leave: &EmployeeLeave) -> CalendarEvent {
    let reference_id = leave._id.map(|id| id.to_hex()).unwrap_or_default();
    CalendarEvent {
        id: format!("leave-{reference_id}"),
        title: format!("{} on leave", leave.employee_name),
        start: from_bson_date(leave.start_date),
        end: Some(from_bson_date(leave.end_date) + Duration::days(1)),
        all_day: true,
        color: COLOR_LEAVE,
        extended_props: EventProps {
            source: CalendarSource::Leave,
            status: Some(leave.status.as_str().to_string()),
            priority: None,
            department: leave.department.clone(),
            reference_id,
            details: json!({
                "employeeId": leave.employee_id,
                "employeeName": leave.employee_name,
                "leaveType": leave.leave_type,
                "days": leave.days,
            }),
        },
    }
}

/// One event per working day of every shift inside `[start, end]`.
/// Overnight shifts end on the following day; shifts with unreadable
/// times are skipped.
pub fn expand_shifts(shifts: &[ShiftDetail], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<CalendarEvent> {
    let first = start.date_naive();
    let last = end.date_naive();
    let mut events = Vec::new();

    for shift in shifts {
        let Some((start_time, end_time)) = shift.times() else {
            tracing::warn!(
                employee_id = %shift.employee_id,
                start = %shift.shift_start_time,
                end = %shift.shift_end_time,
                "skipping shift with malformed times"
            );
            continue;
        };
        let reference_id = shift._id.map(|id| id.to_hex()).unwrap_or_default();
        let overnight = end_time <= start_time;
        let color = if shift.shift_type == ShiftType::Night {
            COLOR_NIGHT_SHIFT
        } else {
            COLOR_SHIFT
        };

        for day in first.iter_days().take_while(|day| *day <= last) {
            if !shift.works_on(day) {
                continue;
            }
            let shift_start = day.and_time(start_time).and_utc();
            let end_day = if overnight { day + Duration::days(1) } else { day };
            let shift_end = end_day.and_time(end_time).and_utc();
            events.push(CalendarEvent {
                id: format!("shift-{reference_id}-{day}"),
                title: format!("{} shift", shift.employee_name),
                start: shift_start,
                end: Some(shift_end),
                all_day: false,
                color,
                extended_props: EventProps {
                    source: CalendarSource::Shift,
                    status: Some("scheduled".to_string()),
                    priority: None,
                    department: shift.department.clone(),
                    reference_id: reference_id.clone(),
                    details: json!({
                        "employeeId": shift.employee_id,
                        "employeeName": shift.employee_name,
                        "shiftType": shift.shift_type,
                        "overnight": overnight,
                    }),
                },
            });
        }
    }
    events
}

/// Scope filter for a department-bearing source plus the explicit
/// department a super admin asked for.
fn scoped(scope: &AccessScope, owner_fields: &[&str], window: &CalendarWindow) -> Document {
    let mut filter = scope.filter("department", owner_fields);
    if let Some(department) = scope.department_filter(window.department.as_deref()) {
        filter.insert("department", department);
    }
    filter
}

fn in_range(window: &CalendarWindow) -> Document {
    doc! { "$gte": to_bson_date(window.start), "$lte": to_bson_date(window.end) }
}

fn daily_activity_filter(window: &CalendarWindow, scope: &AccessScope) -> Document {
    let mut filter = scoped(scope, &["createdBy.id", "attendedById"], window);
    filter.insert("date", in_range(window));
    if let Some(employee_id) = &window.employee_id {
        filter.insert("attendedById", employee_id);
    }
    filter
}

/// Maintenance and safety schedules are department records without owners.
fn schedule_filter(window: &CalendarWindow, scope: &AccessScope) -> Document {
    let mut filter = scoped(scope, &[], window);
    filter.insert("nextDueDate", in_range(window));
    filter
}

/// Tickets without a due date fall back to their creation date.
fn ticket_filter(window: &CalendarWindow, scope: &AccessScope) -> Document {
    let mut filter = scoped(scope, &ticket::OWNER_FIELDS, window);
    push_and(
        &mut filter,
        doc! { "$or": [
            { "dueDate": in_range(window) },
            { "dueDate": null, "createdAt": in_range(window) },
        ] },
    );
    if let Some(employee_id) = &window.employee_id {
        filter.insert("assignedToId", employee_id);
    }
    filter
}

fn shift_filter(window: &CalendarWindow, scope: &AccessScope) -> Document {
    let mut filter = scoped(scope, &["employeeId"], window);
    if let Some(employee_id) = &window.employee_id {
        filter.insert("employeeId", employee_id);
    }
    filter
}

fn holiday_filter(window: &CalendarWindow, scope: &AccessScope) -> Document {
    let mut filter = holiday::visibility(scope, window.department.as_deref());
    filter.insert("date", in_range(window));
    filter
}

/// Approved leaves overlapping the window.
fn leave_filter(window: &CalendarWindow, scope: &AccessScope) -> Document {
    let mut filter = scoped(scope, &["employeeId"], window);
    filter.insert("status", LeaveStatus::Approved.as_str());
    filter.insert("startDate", doc! { "$lte": to_bson_date(window.end) });
    filter.insert("endDate", doc! { "$gte": to_bson_date(window.start) });
    if let Some(employee_id) = &window.employee_id {
        filter.insert("employeeId", employee_id);
    }
    filter
}

async fn daily_activities(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> Result<Vec<CalendarEvent>, ApiError> {
    let activities = DailyActivity::find_capped(daily_activity_filter(window, scope), limit).await?;
    Ok(activities.iter().map(from_daily_activity).collect())
}

async fn maintenance(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> Result<Vec<CalendarEvent>, ApiError> {
    let now = Utc::now();
    let schedules = MaintenanceSchedule::find_capped(schedule_filter(window, scope), limit).await?;
    Ok(schedules
        .iter()
        .filter_map(|schedule| from_maintenance(schedule, now))
        .collect())
}

async fn safety_inspections(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> Result<Vec<CalendarEvent>, ApiError> {
    let schedules = SafetyInspectionSchedule::find_capped(schedule_filter(window, scope), limit).await?;
    Ok(schedules.iter().filter_map(from_safety_inspection).collect())
}

async fn tickets(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> Result<Vec<CalendarEvent>, ApiError> {
    let tickets = Ticket::find_capped(ticket_filter(window, scope), doc! { "dueDate": 1, "createdAt": 1 }, limit).await?;
    Ok(tickets.iter().map(from_ticket).collect())
}

async fn shifts(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> Result<Vec<CalendarEvent>, ApiError> {
    let shifts = ShiftDetail::find_active_between(shift_filter(window, scope), window.start, window.end, limit).await?;
    Ok(expand_shifts(&shifts, window.start, window.end))
}

async fn holidays(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> Result<Vec<CalendarEvent>, ApiError> {
    let holidays = Holiday::find_capped(holiday_filter(window, scope), limit).await?;
    Ok(holidays.iter().map(from_holiday).collect())
}

async fn leaves(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> Result<Vec<CalendarEvent>, ApiError> {
    let leaves = EmployeeLeave::find_capped(leave_filter(window, scope), limit).await?;
    Ok(leaves.iter().map(from_leave).collect())
}

async fn when_wanted<F>(wanted: bool, fetch: F) -> Option<Result<Vec<CalendarEvent>, ApiError>>
where
    F: Future<Output = Result<Vec<CalendarEvent>, ApiError>>,
{
    if wanted {
        Some(fetch.await)
    } else {
        None
    }
}

/// Queries every requested source concurrently and merges the results,
/// sorted by start.
pub async fn aggregate(window: &CalendarWindow, scope: &AccessScope, limit: i64) -> CalendarEvents {
    let (daily, maintenance, safety, tickets, shifts, holidays, leaves) = futures::join!(
        when_wanted(window.wants(CalendarSource::DailyActivity), daily_activities(window, scope, limit)),
        when_wanted(window.wants(CalendarSource::Maintenance), maintenance(window, scope, limit)),
        when_wanted(window.wants(CalendarSource::SafetyInspection), safety_inspections(window, scope, limit)),
        when_wanted(window.wants(CalendarSource::Ticket), tickets(window, scope, limit)),
        when_wanted(window.wants(CalendarSource::Shift), shifts(window, scope, limit)),
        when_wanted(window.wants(CalendarSource::Holiday), holidays(window, scope, limit)),
        when_wanted(window.wants(CalendarSource::Leave), leaves(window, scope, limit)),
    );
    merge(
        window,
        vec![
            (CalendarSource::DailyActivity, daily),
            (CalendarSource::Maintenance, maintenance),
            (CalendarSource::SafetyInspection, safety),
            (CalendarSource::Ticket, tickets),
            (CalendarSource::Shift, shifts),
            (CalendarSource::Holiday, holidays),
            (CalendarSource::Leave, leaves),
        ],
    )
}

pub fn merge(
    window: &CalendarWindow,
    results: Vec<(CalendarSource, Option<Result<Vec<CalendarEvent>, ApiError>>)>,
) -> CalendarEvents {
    let mut events = Vec::new();
    let mut sources = Vec::new();
    for (source, result) in results {
        match result {
            None => {}
            Some(Ok(found)) => {
                sources.push(SourceStatus {
                    source,
                    count: found.len(),
                    ok: true,
                });
                events.extend(found);
            }
            Some(Err(error)) => {
                tracing::warn!(source = source.as_str(), error = ?error, "calendar source failed");
                sources.push(SourceStatus {
                    source,
                    count: 0,
                    ok: false,
                });
            }
        }
    }
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    CalendarEvents {
        events,
        meta: CalendarMeta {
            start_date: window.start,
            end_date: window.end,
            sources,
        },
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailyCount {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ShiftHours {
    pub employee: String,
    pub shifts: usize,
    pub hours: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarReport {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_events: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_department: BTreeMap<String, usize>,
    pub daily: Vec<DailyCount>,
    pub overdue_maintenance: usize,
    pub ticket_completion_rate: f64,
    pub shift_hours: Vec<ShiftHours>,
    pub sources: Vec<SourceStatus>,
}

/// Summary counts over an aggregated event list.
pub fn build_report(aggregated: CalendarEvents) -> CalendarReport {
    let events = &aggregated.events;
    let mut by_source = BTreeMap::new();
    let mut by_status = BTreeMap::new();
    let mut by_priority = BTreeMap::new();
    let mut by_department = BTreeMap::new();
    let mut daily: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut shift_hours: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    let mut overdue_maintenance = 0;
    let (mut tickets, mut completed_tickets) = (0_usize, 0_usize);

    for event in events {
        let props = &event.extended_props;
        *by_source.entry(props.source.as_str().to_string()).or_insert(0) += 1;
        if let Some(status) = &props.status {
            *by_status.entry(status.to_lowercase()).or_insert(0) += 1;
        }
        if let Some(priority) = &props.priority {
            *by_priority.entry(priority.to_lowercase()).or_insert(0) += 1;
        }
        let department = props.department.clone().unwrap_or_else(|| "unassigned".to_string());
        *by_department.entry(department).or_insert(0) += 1;
        *daily.entry(event.start.date_naive()).or_insert(0) += 1;

        match props.source {
            CalendarSource::Maintenance if props.details["overdue"] == Value::Bool(true) => {
                overdue_maintenance += 1;
            }
            CalendarSource::Ticket => {
                tickets += 1;
                if props.status.as_deref() == Some(TicketStatus::Completed.as_str()) {
                    completed_tickets += 1;
                }
            }
            CalendarSource::Shift => {
                let employee = props.details["employeeName"]
                    .as_str()
                    .unwrap_or("unknown")
                    .to_string();
                let hours = event
                    .end
                    .map(|end| (end - event.start).num_minutes() as f64 / 60.0)
                    .unwrap_or(0.0);
                let entry = shift_hours.entry(employee).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += hours;
            }
            _ => {}
        }
    }

    let ticket_completion_rate = if tickets > 0 {
        (completed_tickets as f64 / tickets as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    CalendarReport {
        start_date: aggregated.meta.start_date,
        end_date: aggregated.meta.end_date,
        total_events: events.len(),
        by_source,
        by_status,
        by_priority,
        by_department,
        daily: daily
            .into_iter()
            .map(|(date, count)| DailyCount {
                date: date.to_string(),
                count,
            })
            .collect(),
        overdue_maintenance,
        ticket_completion_rate,
        shift_hours: shift_hours
            .into_iter()
            .map(|(employee, (shifts, hours))| ShiftHours {
                employee,
                shifts,
                hours: (hours * 100.0).round() / 100.0,
            })
            .collect(),
        sources: aggregated.meta.sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{role::UserRole, Actor, Priority};
    use chrono::TimeZone;
    use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};

    fn shift(start: &str, end: &str, days: &[&str], kind: ShiftType) -> ShiftDetail {
        ShiftDetail {
            _id: Some(ObjectId::new()),
            employee_id: "EMP-3".to_string(),
            employee_name: "Lee Park".to_string(),
            email: None,
            department: Some("Ops".to_string()),
            shift_type: kind,
            shift_start_time: start.to_string(),
            shift_end_time: end.to_string(),
            work_days: days.iter().map(|day| day.to_string()).collect(),
            effective_from: None,
            effective_to: None,
            is_active: true,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    fn window(start: &str, end: &str) -> CalendarWindow {
        CalendarQuery {
            start_date: Some(start.to_string()),
            end_date: Some(end.to_string()),
            ..Default::default()
        }
        .window(Utc::now())
        .unwrap()
    }

    #[test]
    fn monday_shift_over_two_weeks_yields_two_events() {
        // 2024-06-03 and 2024-06-10 are the only Mondays in range.
        let range = window("2024-06-03", "2024-06-16");
        let events = expand_shifts(
            &[shift("08:00", "16:00", &["monday"], ShiftType::Day)],
            range.start,
            range.end,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start.to_rfc3339(), "2024-06-03T08:00:00+00:00");
        assert_eq!(events[1].end.unwrap().to_rfc3339(), "2024-06-10T16:00:00+00:00");
        assert_eq!(events[0].color, COLOR_SHIFT);
    }

    #[test]
    fn overnight_shift_ends_next_day() {
        let range = window("2024-06-03", "2024-06-03");
        let events = expand_shifts(
            &[shift("22:00", "06:00", &["monday"], ShiftType::Night)],
            range.start,
            range.end,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end.unwrap().to_rfc3339(), "2024-06-04T06:00:00+00:00");
        assert_eq!(events[0].color, COLOR_NIGHT_SHIFT);
    }

    #[test]
    fn malformed_shift_is_skipped_without_affecting_others() {
        let range = window("2024-06-03", "2024-06-09");
        let events = expand_shifts(
            &[
                shift("8am", "16:00", &["monday"], ShiftType::Day),
                shift("08:00", "16:00", &["tuesday", "wednesday"], ShiftType::Day),
            ],
            range.start,
            range.end,
        );
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn window_defaults_and_limits() {
        let now = Utc.with_ymd_and_hms(2024, 2, 14, 9, 30, 0).unwrap();
        let window = CalendarQuery::default().window(now).unwrap();
        assert_eq!(window.start.to_rfc3339(), "2024-02-01T00:00:00+00:00");
        assert_eq!(window.end.date_naive().to_string(), "2024-02-29");
        assert_eq!(window.sources.len(), 7);

        let reversed = CalendarQuery {
            start_date: Some("2024-03-10".to_string()),
            end_date: Some("2024-03-01".to_string()),
            ..Default::default()
        };
        assert!(reversed.window(now).is_err());

        let too_long = CalendarQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2025-06-01".to_string()),
            ..Default::default()
        };
        assert!(too_long.window(now).is_err());

        let typed = CalendarQuery {
            types: Some("ticket, holiday,ticket".to_string()),
            ..Default::default()
        }
        .window(now)
        .unwrap();
        assert_eq!(typed.sources, vec![CalendarSource::Ticket, CalendarSource::Holiday]);
        assert!(CalendarQuery {
            types: Some("parties".to_string()),
            ..Default::default()
        }
        .window(now)
        .is_err());
    }

    #[test]
    fn priority_palette() {
        assert_eq!(priority_color(Some("Critical")), COLOR_CRITICAL);
        assert_eq!(priority_color(Some("low")), COLOR_LOW);
        assert_eq!(priority_color(None), COLOR_UNKNOWN);
    }

    fn ticket(status: TicketStatus, due: Option<i64>) -> Ticket {
        Ticket {
            _id: Some(ObjectId::new()),
            ticket_id: "TKT-20240603-ABCD".to_string(),
            subject: "Leaking valve".to_string(),
            description: None,
            priority: Priority::High,
            status,
            department: Some("Ops".to_string()),
            area: None,
            asset_id: None,
            asset_name: None,
            reported_by: Actor {
                id: "u1".to_string(),
                name: "Reporter".to_string(),
            },
            assigned_to: None,
            assigned_to_id: None,
            due_date: due.map(BsonDateTime::from_millis),
            status_approval: None,
            comments: Vec::new(),
            completed_at: None,
            created_at: BsonDateTime::from_millis(1_717_372_800_000),
            updated_at: BsonDateTime::from_millis(1_717_372_800_000),
        }
    }

    #[test]
    fn ticket_without_due_date_falls_back_to_creation() {
        let event = from_ticket(&ticket(TicketStatus::Open, None));
        assert_eq!(event.start.to_rfc3339(), "2024-06-03T00:00:00+00:00");
        assert_eq!(event.color, COLOR_HIGH);
    }

    #[test]
    fn failing_source_is_reported_and_skipped() {
        let range = window("2024-06-03", "2024-06-16");
        let merged = merge(
            &range,
            vec![
                (
                    CalendarSource::Ticket,
                    Some(Ok(vec![from_ticket(&ticket(TicketStatus::Completed, None))])),
                ),
                (
                    CalendarSource::Maintenance,
                    Some(Err(ApiError::internal("DATABASE_NOT_AVAILABLE"))),
                ),
                (CalendarSource::Holiday, None),
            ],
        );
        assert_eq!(merged.events.len(), 1);
        assert_eq!(
            merged.meta.sources,
            vec![
                SourceStatus {
                    source: CalendarSource::Ticket,
                    count: 1,
                    ok: true
                },
                SourceStatus {
                    source: CalendarSource::Maintenance,
                    count: 0,
                    ok: false
                },
            ]
        );
    }

    #[test]
    fn report_counts_events() {
        let range = window("2024-06-03", "2024-06-16");
        let mut events = expand_shifts(
            &[shift("08:00", "16:00", &["monday"], ShiftType::Day)],
            range.start,
            range.end,
        );
        events.push(from_ticket(&ticket(TicketStatus::Completed, None)));
        events.push(from_ticket(&ticket(TicketStatus::Open, Some(1_717_459_200_000))));
        let merged = merge(&range, vec![(CalendarSource::Shift, Some(Ok(events)))]);
        let report = build_report(merged);

        assert_eq!(report.total_events, 4);
        assert_eq!(report.by_source.get("shift"), Some(&2));
        assert_eq!(report.by_source.get("ticket"), Some(&2));
        assert_eq!(report.by_priority.get("high"), Some(&2));
        assert_eq!(report.ticket_completion_rate, 50.0);
        assert_eq!(
            report.shift_hours,
            vec![ShiftHours {
                employee: "Lee Park".to_string(),
                shifts: 2,
                hours: 16.0
            }]
        );
        assert_eq!(report.daily[0], DailyCount { date: "2024-06-03".to_string(), count: 2 });
    }

    fn caller(role: UserRole) -> AccessScope {
        AccessScope {
            role,
            department: Some("Ops".to_string()),
            user_id: "u-1".to_string(),
            employee_id: Some("EMP-3".to_string()),
        }
    }

    fn asking_for(department: Option<&str>, employee_id: Option<&str>) -> CalendarWindow {
        CalendarWindow {
            department: department.map(str::to_string),
            employee_id: employee_id.map(str::to_string),
            ..window("2024-06-01", "2024-06-30")
        }
    }

    fn owned_by_caller(fields: &[&str]) -> Vec<Document> {
        fields
            .iter()
            .map(|field| doc! { *field: { "$in": ["u-1", "EMP-3"] } })
            .collect()
    }

    #[test]
    fn normal_user_tickets_are_owned_and_in_own_department() {
        let range = asking_for(Some("Mechanical"), None);
        let dates = doc! { "$or": [
            { "dueDate": in_range(&range) },
            { "dueDate": null, "createdAt": in_range(&range) },
        ] };

        assert_eq!(
            ticket_filter(&range, &caller(UserRole::NormalUser)),
            doc! {
                "department": "Ops",
                "$or": owned_by_caller(&ticket::OWNER_FIELDS),
                "$and": [dates.clone()],
            }
        );
        assert_eq!(
            ticket_filter(&range, &caller(UserRole::Manager)),
            doc! { "department": "Ops", "$and": [dates.clone()] }
        );
        assert_eq!(
            ticket_filter(&asking_for(Some("Mechanical"), Some("EMP-9")), &caller(UserRole::SuperAdmin)),
            doc! { "department": "Mechanical", "$and": [dates], "assignedToId": "EMP-9" }
        );
    }

    #[test]
    fn people_sources_never_widen_past_the_caller() {
        let range = asking_for(Some("Mechanical"), Some("EMP-9"));

        let shifts = shift_filter(&range, &caller(UserRole::NormalUser));
        assert_eq!(
            shifts,
            doc! {
                "department": "Ops",
                "$or": owned_by_caller(&["employeeId"]),
                "employeeId": "EMP-9",
            }
        );

        let leaves = leave_filter(&range, &caller(UserRole::NormalUser));
        assert_eq!(leaves.get_str("department").unwrap(), "Ops");
        assert_eq!(leaves.get_array("$or").unwrap().len(), 1);
        assert_eq!(leaves.get_str("status").unwrap(), "approved");
        assert!(leaves.get_document("startDate").unwrap().contains_key("$lte"));
        assert!(leaves.get_document("endDate").unwrap().contains_key("$gte"));

        let managed = leave_filter(&range, &caller(UserRole::Manager));
        assert_eq!(managed.get_str("department").unwrap(), "Ops");
        assert!(!managed.contains_key("$or"));

        let activities = daily_activity_filter(&asking_for(None, None), &caller(UserRole::NormalUser));
        assert_eq!(
            activities,
            doc! {
                "department": "Ops",
                "$or": owned_by_caller(&["createdBy.id", "attendedById"]),
                "date": in_range(&asking_for(None, None)),
            }
        );
    }

    #[test]
    fn schedules_and_holidays_follow_department_visibility() {
        let range = asking_for(Some("Mechanical"), None);
        assert_eq!(
            schedule_filter(&range, &caller(UserRole::NormalUser)),
            doc! { "department": "Ops", "nextDueDate": in_range(&range) }
        );
        assert_eq!(
            schedule_filter(&range, &caller(UserRole::SuperAdmin)),
            doc! { "department": "Mechanical", "nextDueDate": in_range(&range) }
        );

        assert_eq!(
            holiday_filter(&range, &caller(UserRole::NormalUser)),
            doc! {
                "$or": [{ "department": null }, { "department": "Ops" }],
                "date": in_range(&range),
            }
        );
        assert_eq!(
            holiday_filter(&asking_for(None, None), &caller(UserRole::SuperAdmin)),
            doc! { "date": in_range(&range) }
        );
    }

    #[actix_web::test]
    async fn only_requested_sources_are_queried() {
        let range = CalendarQuery {
            start_date: Some("2024-06-01".to_string()),
            end_date: Some("2024-06-30".to_string()),
            types: Some("holiday, ticket".to_string()),
            ..Default::default()
        }
        .window(Utc::now())
        .unwrap();

        let aggregated = aggregate(&range, &caller(UserRole::Manager), 50).await;
        let queried: Vec<CalendarSource> = aggregated.meta.sources.iter().map(|status| status.source).collect();
        assert_eq!(queried, [CalendarSource::Ticket, CalendarSource::Holiday]);
        assert!(aggregated.events.is_empty());
    }
}
