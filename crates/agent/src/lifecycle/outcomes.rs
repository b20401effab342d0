use std::collections::BTreeMap;

use chrono::NaiveDate;
use leavedesk_core::domain::leave::{
    format_days, LeaveKind, LeaveRequest, LeaveRequestId, LeaveStatus,
};
use leavedesk_core::domain::user::{User, UserId};
use leavedesk_core::errors::DomainError;
use leavedesk_core::flows::LeaveEvent;
use leavedesk_core::policy::BalanceReport;
use leavedesk_db::repositories::LeaveRecord;

const LONG_DATE: &str = "%B %d, %Y";

pub const PERMISSION_DENIED_APPROVAL: &str =
    "You don't have permission to approve leave requests. This action requires HR or manager access.";
pub const PERMISSION_DENIED_REPORTS: &str =
    "You don't have permission to access leave reports. This action requires HR or manager access.";
pub const NO_TEAM: &str = "You don't have any team members reporting to you.";

fn day_count(days: f64) -> String {
    if days == 1.0 {
        "1 day".to_string()
    } else {
        format!("{} days", format_days(days))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Human names of the required fields that were null.
    MissingFields(Vec<&'static str>),
    Invalid(DomainError),
    UnknownEmployee,
    Submitted { request: LeaveRequest, on_behalf_of: Option<String> },
}

impl SubmitOutcome {
    pub fn render(&self) -> String {
        match self {
            Self::MissingFields(fields) => format!(
                "I'd be happy to process your leave request, but I need a few more details. \
                 Could you please provide the {}?",
                fields.join(", ")
            ),
            Self::Invalid(DomainError::InvalidDate(value)) => format!(
                "I couldn't read the date '{value}'. Please give dates in YYYY-MM-DD format, \
                 for example 2024-05-15."
            ),
            Self::Invalid(DomainError::InvalidDateRange { start, end }) => format!(
                "The end date {end} is before the start date {start}. Please check the dates and try again."
            ),
            Self::Invalid(DomainError::UnknownLeaveKind(kind)) => format!(
                "'{kind}' is not a leave type I recognise. Please choose one of: {}.",
                LeaveKind::ALL.iter().map(LeaveKind::as_str).collect::<Vec<_>>().join(", ")
            ),
            Self::Invalid(other) => format!("I couldn't process those leave details: {other}."),
            Self::UnknownEmployee => {
                "I couldn't find your user profile in our system. Please contact HR for assistance."
                    .to_string()
            }
            Self::Submitted { request, on_behalf_of } => {
                let headline = match on_behalf_of {
                    Some(name) => {
                        format!("The leave request for {name} has been submitted successfully!")
                    }
                    None => "Your leave request has been submitted successfully!".to_string(),
                };
                let closing = match on_behalf_of {
                    Some(_) => "The request is pending approval.",
                    None => "Your request is pending approval. I'll notify you once it's approved.",
                };
                format!(
                    "{headline}\n\nDetails:\n- Request ID: {}\n- Type: {}\n- From: {}\n- To: {}\n\
                     - Duration: {} day(s)\n- Status: {}\n\n{closing}",
                    request.id,
                    request.kind.label(),
                    request.window.start(),
                    request.window.end(),
                    format_days(request.duration_days()),
                    request.status.label(),
                )
            }
        }
    }
}

/// Result of approve, reject or cancel.
#[derive(Clone, Debug, PartialEq)]
pub enum DecisionOutcome {
    PermissionDenied,
    NotFound,
    Ambiguous { candidates: Vec<LeaveRecord>, total: usize },
    /// The row left its eligible state between lookup and write.
    NoLongerEligible(LeaveRequestId),
    Applied {
        record: LeaveRecord,
        from: LeaveStatus,
        /// `None` when the transition has no calendar effect.
        calendar_synced: Option<bool>,
    },
}

impl DecisionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn render(&self, event: LeaveEvent, requester: &UserId) -> String {
        match (self, event) {
            (Self::PermissionDenied, _) => PERMISSION_DENIED_APPROVAL.to_string(),
            (Self::NotFound, LeaveEvent::Cancel) => {
                "I couldn't find any active leave requests that match your cancellation criteria. \
                 Please specify which leave request you'd like to cancel."
                    .to_string()
            }
            (Self::NotFound, _) => format!(
                "I couldn't find any pending leave requests matching your criteria. \
                 Please specify which request you'd like to {}.",
                event.as_str()
            ),
            (Self::Ambiguous { candidates, total }, LeaveEvent::Cancel) => {
                let lines = candidates
                    .iter()
                    .map(|record| {
                        let request = &record.request;
                        format!(
                            "ID: {} - {} leave from {} to {} (Status: {})",
                            request.id,
                            request.kind.label(),
                            request.window.start(),
                            request.window.end(),
                            request.status.label()
                        )
                    })
                    .collect::<Vec<_>>();
                format!(
                    "I found multiple leave requests that could be cancelled. Please specify which one by ID:\n\n{}{}",
                    lines.join("\n"),
                    overflow_note(candidates.len(), *total)
                )
            }
            (Self::Ambiguous { candidates, total }, _) => {
                let lines = candidates
                    .iter()
                    .map(|record| {
                        let request = &record.request;
                        format!(
                            "ID: {} - {}: {} leave from {} to {}",
                            request.id,
                            record.employee_name,
                            request.kind.as_str(),
                            request.window.start(),
                            request.window.end()
                        )
                    })
                    .collect::<Vec<_>>();
                format!(
                    "I found multiple pending leave requests. Please specify which one you'd like to {}:\n\n{}{}",
                    event.as_str(),
                    lines.join("\n"),
                    overflow_note(candidates.len(), *total)
                )
            }
            (Self::NoLongerEligible(id), LeaveEvent::Cancel) => {
                format!("Leave request #{id} can no longer be cancelled. No changes were made.")
            }
            (Self::NoLongerEligible(id), _) => {
                format!("Leave request #{id} is no longer pending. No changes were made.")
            }
            (Self::Applied { record, calendar_synced, .. }, event) => {
                let request = &record.request;
                let mut message = match event {
                    LeaveEvent::Approve => format!(
                        "Leave request #{} for {} has been approved successfully. They have been notified of this decision.",
                        request.id, record.employee_name
                    ),
                    LeaveEvent::Reject => format!(
                        "Leave request #{} for {} has been rejected. They have been notified of this decision.",
                        request.id, record.employee_name
                    ),
                    LeaveEvent::Cancel if &request.employee_id == requester => format!(
                        "Your {} leave request from {} to {} has been successfully cancelled.",
                        request.kind.as_str(),
                        request.window.start().format(LONG_DATE),
                        request.window.end().format(LONG_DATE)
                    ),
                    LeaveEvent::Cancel => format!(
                        "The {} leave request for {} from {} to {} has been successfully cancelled.",
                        request.kind.as_str(),
                        record.employee_name,
                        request.window.start().format(LONG_DATE),
                        request.window.end().format(LONG_DATE)
                    ),
                };
                if *calendar_synced == Some(false) {
                    message.push_str(
                        "\n\nNote: the shared calendar could not be updated automatically.",
                    );
                }
                message
            }
        }
    }
}

fn overflow_note(shown: usize, total: usize) -> String {
    if total > shown {
        format!("\n...and {} more.", total - shown)
    } else {
        String::new()
    }
}

pub fn render_balance(report: &BalanceReport) -> String {
    let lines = report
        .balances
        .iter()
        .filter_map(|balance| {
            let allotment = balance.allotment.days()?;
            let remaining = balance.remaining()?;
            Some(format!(
                "{} Leave: {} days remaining (used {} of {})",
                balance.kind.label(),
                format_days(remaining),
                format_days(balance.used),
                format_days(allotment)
            ))
        })
        .collect::<Vec<_>>();

    let mut message = format!(
        "Here's your current leave balance for {}:\n\n{}",
        report.year,
        lines.join("\n")
    );

    if report.pending.total > 0 {
        let pending = report
            .pending
            .shown
            .iter()
            .map(|request| {
                format!(
                    "- {} leave from {} to {} ({})",
                    request.kind.label(),
                    request.window.start(),
                    request.window.end(),
                    day_count(request.duration_days())
                )
            })
            .collect::<Vec<_>>();
        message.push_str(&format!(
            "\n\nYou also have {} pending leave request(s):\n{}",
            report.pending.total,
            pending.join("\n")
        ));
        if report.pending.overflow() > 0 {
            message.push_str(&format!(
                "\n...and {} more pending request(s).",
                report.pending.overflow()
            ));
        }
    }
    message
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub employee_name: Option<String>,
    pub status: Option<LeaveStatus>,
    pub start_on_or_after: Option<NaiveDate>,
    pub start_on_or_before: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ListOutcome {
    EmployeeNotFound(String),
    AmbiguousEmployee { query: String, candidates: Vec<User>, total: usize },
    Listed { employee_name: String, records: Vec<LeaveRecord> },
}

pub fn render_employee_not_found(name: &str) -> String {
    format!("I couldn't find an employee named '{name}' in our system.")
}

pub fn render_ambiguous_employee(query: &str, candidates: &[User], total: usize) -> String {
    let lines = candidates
        .iter()
        .map(|user| format!("- {} ({})", user.username, user.email))
        .collect::<Vec<_>>();
    format!(
        "I found several employees matching '{query}'. Please tell me which one you mean:\n\n{}{}",
        lines.join("\n"),
        overflow_note(candidates.len(), total)
    )
}

impl ListOutcome {
    /// `status_text` and `time_text` echo the caller's own wording of the filters.
    pub fn render(&self, status_text: Option<&str>, time_text: Option<&str>) -> String {
        match self {
            Self::EmployeeNotFound(name) => render_employee_not_found(name),
            Self::AmbiguousEmployee { query, candidates, total } => {
                render_ambiguous_employee(query, candidates, *total)
            }
            Self::Listed { employee_name, records } if records.is_empty() => format!(
                "No leave requests found for {employee_name}{}{}.",
                status_text.map(|status| format!(" with status '{status}'")).unwrap_or_default(),
                time_text.map(|time| format!(" for {time}")).unwrap_or_default()
            ),
            Self::Listed { employee_name, records } => {
                let rows = records
                    .iter()
                    .map(|record| {
                        let request = &record.request;
                        format!(
                            "{} {} leave from {} to {} ({}) - {}",
                            request.status.emoji(),
                            request.kind.label(),
                            request.window.start(),
                            request.window.end(),
                            day_count(request.duration_days()),
                            request.status.label()
                        )
                    })
                    .collect::<Vec<_>>();
                format!(
                    "Here are the {}leave requests for {employee_name}{}:\n\n{}",
                    status_text.map(|status| format!("{status} ")).unwrap_or_default(),
                    time_text.map(|time| format!(" for {time}")).unwrap_or_default(),
                    rows.join("\n")
                )
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Usage,
    Upcoming,
    Calendar,
    Department,
}

impl ReportKind {
    /// Unknown or missing report types fall back to a usage report.
    pub fn parse_lossy(value: Option<&str>) -> Self {
        match value.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("upcoming") => Self::Upcoming,
            Some("calendar") => Self::Calendar,
            Some("department") => Self::Department,
            _ => Self::Usage,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberUsage {
    pub employee: User,
    pub days_by_kind: BTreeMap<LeaveKind, f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReportOutcome {
    PermissionDenied,
    NoTeam,
    TeamUsage(Vec<MemberUsage>),
    OrganisationUsage {
        days_by_kind: BTreeMap<LeaveKind, f64>,
        total_employees: u64,
        approved_requests: usize,
    },
    Upcoming { window_days: i64, records: Vec<LeaveRecord> },
    Calendar { team: bool, from: NaiveDate, to: NaiveDate, records: Vec<LeaveRecord> },
    DepartmentRestricted,
    DepartmentUnavailable { department: Option<String> },
}

impl ReportOutcome {
    pub fn render(&self) -> String {
        match self {
            Self::PermissionDenied => PERMISSION_DENIED_REPORTS.to_string(),
            Self::NoTeam => NO_TEAM.to_string(),
            Self::TeamUsage(members) => {
                let mut message = "Leave usage report for your team:\n".to_string();
                for member in members {
                    message.push_str(&format!("\n{}:\n", member.employee.username));
                    if member.days_by_kind.is_empty() {
                        message.push_str("- No approved leave this year\n");
                    }
                    for (kind, days) in &member.days_by_kind {
                        message.push_str(&format!("- {}: {}\n", kind.label(), day_count(*days)));
                    }
                }
                message
            }
            Self::OrganisationUsage { days_by_kind, total_employees, approved_requests } => {
                let mut message = "Organization-wide leave usage this year:\n\n".to_string();
                if days_by_kind.is_empty() {
                    message.push_str("No approved leave yet.\n");
                }
                for (kind, days) in days_by_kind {
                    message.push_str(&format!("{}: {}\n", kind.label(), day_count(*days)));
                }
                let average = if *total_employees == 0 {
                    0.0
                } else {
                    *approved_requests as f64 / *total_employees as f64
                };
                message.push_str(&format!(
                    "\nTotal employees: {total_employees}\nTotal leave requests: {approved_requests}\n\
                     Average leaves per employee: {average:.1}"
                ));
                message
            }
            Self::Upcoming { window_days, records } if records.is_empty() => {
                format!("No upcoming approved leaves for the next {window_days} days.")
            }
            Self::Upcoming { window_days, records } => {
                let rows = records
                    .iter()
                    .map(|record| {
                        let request = &record.request;
                        format!(
                            "• {}: {} leave from {} to {} ({})",
                            record.employee_name,
                            request.kind.label(),
                            request.window.start(),
                            request.window.end(),
                            day_count(request.duration_days())
                        )
                    })
                    .collect::<Vec<_>>();
                format!("Upcoming leaves for the next {window_days} days:\n\n{}", rows.join("\n"))
            }
            Self::Calendar { team, from, to, records } if records.is_empty() => {
                if *team {
                    format!("No approved leaves for your team between {from} and {to}.")
                } else {
                    format!("No approved leaves between {from} and {to}.")
                }
            }
            Self::Calendar { team, from, to, records } => {
                let mut by_employee: BTreeMap<&str, Vec<&LeaveRequest>> = BTreeMap::new();
                for record in records {
                    by_employee
                        .entry(record.employee_name.as_str())
                        .or_default()
                        .push(&record.request);
                }
                let title = if *team { "Team Leave Calendar" } else { "Leave Calendar" };
                let mut message = format!("{title} ({from} to {to}):\n");
                for (name, requests) in by_employee {
                    message.push_str(&format!("\n{name}:\n"));
                    for request in requests {
                        message.push_str(&format!(
                            "• {} leave: {} to {}\n",
                            request.kind.label(),
                            request.window.start(),
                            request.window.end()
                        ));
                    }
                }
                message
            }
            Self::DepartmentRestricted => {
                "Department-wide leave reports are only available to HR personnel.".to_string()
            }
            Self::DepartmentUnavailable { department: None } => {
                "Please specify a department to generate a leave report.".to_string()
            }
            Self::DepartmentUnavailable { department: Some(department) } => format!(
                "Department leave reports for {department} are not yet available. \
                 Try a usage, upcoming or calendar report instead."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use leavedesk_core::domain::leave::{
        LeaveKind, LeaveRequest, LeaveRequestId, LeaveStatus, LeaveWindow,
    };
    use leavedesk_core::domain::user::UserId;
    use leavedesk_core::errors::DomainError;
    use leavedesk_core::flows::LeaveEvent;
    use leavedesk_core::policy::LeavePolicy;
    use leavedesk_db::repositories::LeaveRecord;

    use super::{render_balance, DecisionOutcome, ReportKind, SubmitOutcome};

    fn request(id: i64, start: &str, end: &str, status: LeaveStatus) -> LeaveRequest {
        let now = Utc::now();
        LeaveRequest {
            id: LeaveRequestId(id),
            employee_id: UserId("U-1".to_string()),
            kind: LeaveKind::Annual,
            window: LeaveWindow::parse(start, end).expect("window"),
            half_day: false,
            reason: "vacation".to_string(),
            status,
            approved_by: None,
            approved_at: None,
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(id: i64, name: &str) -> LeaveRecord {
        LeaveRecord {
            request: request(id, "2024-05-15", "2024-05-18", LeaveStatus::Pending),
            employee_name: name.to_string(),
            employee_email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    #[test]
    fn missing_fields_are_named_exactly() {
        let message = SubmitOutcome::MissingFields(vec!["start date", "end date"]).render();
        assert!(message.ends_with("Could you please provide the start date, end date?"));
    }

    #[test]
    fn submitted_confirmation_reports_duration_and_status() {
        let message = SubmitOutcome::Submitted {
            request: request(3, "2024-05-15", "2024-05-18", LeaveStatus::Pending),
            on_behalf_of: None,
        }
        .render();
        assert!(message.contains("Duration: 4 day(s)"));
        assert!(message.contains("Status: Pending"));
    }

    #[test]
    fn parse_errors_render_as_guidance() {
        let message =
            SubmitOutcome::Invalid(DomainError::InvalidDate("next tuesday".to_string())).render();
        assert!(message.contains("YYYY-MM-DD"));
    }

    #[test]
    fn approval_disambiguation_lists_ids_and_owners() {
        let outcome = DecisionOutcome::Ambiguous {
            candidates: vec![record(1, "John Smith"), record(2, "John Doe")],
            total: 2,
        };
        let message = outcome.render(LeaveEvent::Approve, &UserId("U-hr".to_string()));
        assert!(message.contains("ID: 1 - John Smith: annual leave from 2024-05-15 to 2024-05-18"));
        assert!(message.contains("ID: 2 - John Doe"));
        assert!(!message.contains("more."));
    }

    #[test]
    fn own_cancellation_uses_long_dates() {
        let outcome = DecisionOutcome::Applied {
            record: record(1, "Jane"),
            from: LeaveStatus::Pending,
            calendar_synced: None,
        };
        let message = outcome.render(LeaveEvent::Cancel, &UserId("U-1".to_string()));
        assert_eq!(
            message,
            "Your annual leave request from May 15, 2024 to May 18, 2024 has been successfully cancelled."
        );
    }

    #[test]
    fn balance_lines_and_pending_overflow_render() {
        let history: Vec<_> = (1..=4)
            .map(|day| {
                let on = format!("2024-07-0{day}");
                request(day, &on, &on, LeaveStatus::Pending)
            })
            .chain(std::iter::once(request(9, "2024-03-04", "2024-03-08", LeaveStatus::Approved)))
            .collect();
        let report = LeavePolicy::default().compute_balance(2024, &history, 3);
        let message = render_balance(&report);

        assert!(message.contains("Annual Leave: 15 days remaining (used 5 of 20)"));
        assert!(message.contains("You also have 4 pending leave request(s):"));
        assert!(message.contains("- Annual leave from 2024-07-01 to 2024-07-01 (1 day)"));
        assert!(message.ends_with("...and 1 more pending request(s)."));
        assert!(!message.contains("Unpaid"));
    }

    #[test]
    fn unknown_report_types_default_to_usage() {
        assert_eq!(ReportKind::parse_lossy(None), ReportKind::Usage);
        assert_eq!(ReportKind::parse_lossy(Some("Calendar")), ReportKind::Calendar);
        assert_eq!(ReportKind::parse_lossy(Some("quarterly")), ReportKind::Usage);
    }
}
