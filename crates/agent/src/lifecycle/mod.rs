//! The single owner of leave request mutations and leave-derived reports.
//!
//! Every status change goes through [`LeaveLifecycle`] first and is then written with
//! a conditional update, so a concurrent decision on the same row can never be
//! applied twice. Calendar effects run after the write and never undo it.

mod outcomes;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use leavedesk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use leavedesk_core::clock::{Clock, SystemClock};
use leavedesk_core::config::LeaveConfig;
use leavedesk_core::domain::leave::{
    LeaveDecision, LeaveKind, LeaveRequest, LeaveStatus, LeaveWindow, NewLeaveRequest,
};
use leavedesk_core::domain::user::{Role, User, UserId, UserProfile};
use leavedesk_core::flows::{LeaveAction, LeaveEvent, LeaveLifecycle};
use leavedesk_core::policy::{BalanceReport, EligibilityVerdict, LeavePolicy};
use leavedesk_core::selector::{LeaveSelector, SelectorResolution, DEFAULT_DISAMBIGUATION_LIMIT};
use leavedesk_db::repositories::{LeaveQuery, LeaveRecord, LeaveRequestRepository, UserRepository};
use tracing::{error, info, warn};

use crate::calendar::{CalendarAction, CalendarEvent, CalendarGateway};
use crate::errors::LeaveEngineError;
use crate::extraction::LeaveRequestFields;

pub use outcomes::{
    render_ambiguous_employee, render_balance, render_employee_not_found, DecisionOutcome,
    ListFilter, ListOutcome, MemberUsage, ReportKind, ReportOutcome, SubmitOutcome,
    PERMISSION_DENIED_APPROVAL, PERMISSION_DENIED_REPORTS,
};

const DEFAULT_REASON: &str = "Not specified";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub disambiguation_limit: usize,
    pub list_limit: usize,
    pub pending_preview: usize,
    pub upcoming_window_days: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            disambiguation_limit: DEFAULT_DISAMBIGUATION_LIMIT,
            list_limit: 10,
            pending_preview: 3,
            upcoming_window_days: 30,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &LeaveConfig) -> Self {
        Self {
            disambiguation_limit: config.disambiguation_limit,
            list_limit: config.list_limit,
            pending_preview: config.pending_preview,
            upcoming_window_days: config.upcoming_window_days,
        }
    }
}

/// Who scoped a report: a manager sees direct reports, HR sees everyone.
enum ReportScope {
    Team(Vec<User>),
    Organisation,
}

impl ReportScope {
    fn employee_ids(&self) -> Option<Vec<UserId>> {
        match self {
            Self::Team(members) => Some(members.iter().map(|member| member.id.clone()).collect()),
            Self::Organisation => None,
        }
    }
}

pub struct LeaveEngine {
    users: Arc<dyn UserRepository>,
    leaves: Arc<dyn LeaveRequestRepository>,
    calendar: Arc<dyn CalendarGateway>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: LeavePolicy,
    settings: EngineSettings,
    lifecycle: LeaveLifecycle,
}

impl LeaveEngine {
    pub fn new(
        users: Arc<dyn UserRepository>,
        leaves: Arc<dyn LeaveRequestRepository>,
        calendar: Arc<dyn CalendarGateway>,
    ) -> Self {
        Self {
            users,
            leaves,
            calendar,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            policy: LeavePolicy::default(),
            settings: EngineSettings::default(),
            lifecycle: LeaveLifecycle,
        }
    }

    pub fn with_policy(mut self, policy: LeavePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn policy(&self) -> &LeavePolicy {
        &self.policy
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Creates a pending request for `employee_id` from extracted fields.
    ///
    /// Missing fields are reported in the fixed order leave type, start date, end date.
    pub async fn submit(
        &self,
        employee_id: &UserId,
        fields: &LeaveRequestFields,
        on_behalf_of: Option<String>,
    ) -> Result<SubmitOutcome, LeaveEngineError> {
        let mut missing = Vec::new();
        if fields.leave_type.is_none() {
            missing.push("leave type");
        }
        if fields.start_date.is_none() {
            missing.push("start date");
        }
        if fields.end_date.is_none() {
            missing.push("end date");
        }
        let (Some(kind), Some(start), Some(end)) =
            (&fields.leave_type, &fields.start_date, &fields.end_date)
        else {
            return Ok(SubmitOutcome::MissingFields(missing));
        };

        let kind = match kind.parse::<LeaveKind>() {
            Ok(kind) => kind,
            Err(error) => return Ok(SubmitOutcome::Invalid(error)),
        };
        let window = match LeaveWindow::parse(start, end) {
            Ok(window) => window,
            Err(error) => return Ok(SubmitOutcome::Invalid(error)),
        };

        if self.users.find_by_id(employee_id).await?.is_none() {
            return Ok(SubmitOutcome::UnknownEmployee);
        }

        let request = self
            .leaves
            .insert(
                NewLeaveRequest {
                    employee_id: employee_id.clone(),
                    kind,
                    window,
                    half_day: fields.half_day,
                    reason: fields.reason.clone().unwrap_or_else(|| DEFAULT_REASON.to_string()),
                },
                self.clock.now(),
            )
            .await?;

        info!(
            event_name = "leave.request.submitted",
            leave_request_id = request.id.0,
            employee_id = %employee_id,
            kind = kind.as_str(),
            duration_days = request.duration_days(),
            "leave request submitted"
        );

        Ok(SubmitOutcome::Submitted { request, on_behalf_of })
    }

    pub async fn approve(
        &self,
        selector: &LeaveSelector,
        decider: &UserProfile,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, LeaveEngineError> {
        self.decide(LeaveEvent::Approve, selector, decider, comment, correlation_id).await
    }

    pub async fn reject(
        &self,
        selector: &LeaveSelector,
        decider: &UserProfile,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, LeaveEngineError> {
        self.decide(LeaveEvent::Reject, selector, decider, comment, correlation_id).await
    }

    /// Approve or reject. The role check happens before any repository access.
    pub async fn decide(
        &self,
        event: LeaveEvent,
        selector: &LeaveSelector,
        decider: &UserProfile,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, LeaveEngineError> {
        if event == LeaveEvent::Cancel {
            return Err(LeaveEngineError::Invariant(
                "cancellation is not a decision; use cancel".to_string(),
            ));
        }
        if !decider.role.can_decide_leave() {
            warn!(
                event_name = "leave.decision.denied",
                correlation_id,
                user_id = %decider.user_id,
                role = decider.role.as_str(),
                "caller may not decide leave requests"
            );
            return Ok(DecisionOutcome::PermissionDenied);
        }

        let query = self.selector_query(event, selector, None);
        let matches = self.leaves.query(&query).await?;
        let limit = self.settings.disambiguation_limit;
        let record = match SelectorResolution::from_matches(matches, limit) {
            SelectorResolution::NotFound => return Ok(DecisionOutcome::NotFound),
            SelectorResolution::Ambiguous { candidates, total } => {
                return Ok(DecisionOutcome::Ambiguous { candidates, total })
            }
            SelectorResolution::Unique(record) => record,
        };

        let default_comment = match event {
            LeaveEvent::Approve => "Approved",
            _ => "Rejected",
        };
        let decision = LeaveDecision {
            decided_by: Some(decider.user_id.clone()),
            comment: Some(comment.unwrap_or_else(|| default_comment.to_string())),
            decided_at: self.clock.now(),
        };
        self.transition(event, record, Some(decision), &decider.user_id, correlation_id).await
    }

    /// Cancels a pending or approved leave.
    ///
    /// HR selects across every employee; everyone else only sees their own leaves and
    /// the name filter is ignored.
    pub async fn cancel(
        &self,
        selector: &LeaveSelector,
        requester: &UserProfile,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, LeaveEngineError> {
        let owner = (!requester.role.is_hr()).then(|| requester.user_id.clone());
        let query = self.selector_query(LeaveEvent::Cancel, selector, owner);
        let matches = self.leaves.query(&query).await?;
        let limit = self.settings.disambiguation_limit;
        let record = match SelectorResolution::from_matches(matches, limit) {
            SelectorResolution::NotFound => return Ok(DecisionOutcome::NotFound),
            SelectorResolution::Ambiguous { candidates, total } => {
                return Ok(DecisionOutcome::Ambiguous { candidates, total })
            }
            SelectorResolution::Unique(record) => record,
        };
        self.transition(LeaveEvent::Cancel, record, None, &requester.user_id, correlation_id).await
    }

    fn selector_query(
        &self,
        event: LeaveEvent,
        selector: &LeaveSelector,
        owner: Option<UserId>,
    ) -> LeaveQuery {
        let employee_name = if owner.is_some() {
            None
        } else {
            selector
                .employee_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        };
        LeaveQuery {
            request_id: selector.request_id,
            employee_ids: owner.map(|owner| vec![owner]),
            employee_name,
            statuses: event.eligible_sources(),
            start_on_or_after: selector.start_date,
            start_on_or_before: selector.start_date,
            end_on_or_after: selector.end_date,
            end_on_or_before: selector.end_date,
            ..LeaveQuery::default()
        }
    }

    async fn transition(
        &self,
        event: LeaveEvent,
        record: LeaveRecord,
        decision: Option<LeaveDecision>,
        actor: &UserId,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, LeaveEngineError> {
        let id = record.request.id;
        let audit = AuditContext::new(Some(id), correlation_id, actor.0.clone());

        let outcome = match self.lifecycle.apply_with_audit(
            record.request.status,
            event,
            self.audit.as_ref(),
            &audit,
        ) {
            Ok(outcome) => outcome,
            Err(transition_error) => {
                // The query only returns eligible sources, so the row changed underneath us.
                error!(
                    event_name = "leave.transition.illegal",
                    correlation_id,
                    leave_request_id = id.0,
                    error = %transition_error,
                    "selected leave request is not in an eligible state"
                );
                return Ok(DecisionOutcome::NotFound);
            }
        };

        let updated = self
            .leaves
            .transition_status(id, outcome.from, outcome.to, decision, self.clock.now())
            .await?;
        let Some(updated) = updated else {
            warn!(
                event_name = "leave.transition.lost_race",
                correlation_id,
                leave_request_id = id.0,
                expected = outcome.from.as_str(),
                "leave request changed before the update was written"
            );
            self.audit.emit(
                AuditEvent::new(
                    &audit,
                    "leave.transition_lost_race",
                    AuditCategory::Persistence,
                    AuditOutcome::Rejected,
                )
                .with_metadata("expected", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str()),
            );
            return Ok(DecisionOutcome::NoLongerEligible(id));
        };

        info!(
            event_name = "leave.transition.applied",
            correlation_id,
            leave_request_id = id.0,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            actor = %actor,
            "leave request status changed"
        );

        let mut calendar_synced = None;
        for action in &outcome.actions {
            let synced = self.run_calendar_effect(action, &updated, &audit).await;
            calendar_synced = Some(calendar_synced.unwrap_or(true) && synced);
        }

        Ok(DecisionOutcome::Applied { record: updated, from: outcome.from, calendar_synced })
    }

    /// Best effort: failures are logged and audited, never propagated.
    async fn run_calendar_effect(
        &self,
        action: &LeaveAction,
        record: &LeaveRecord,
        audit: &AuditContext,
    ) -> bool {
        let action = match action {
            LeaveAction::CreateCalendarEvent => CalendarAction::CreateEvent,
            LeaveAction::DeleteCalendarEvent => CalendarAction::DeleteEvent,
        };
        let event = CalendarEvent::for_leave(action, record);
        let result = self.calendar.apply(&event).await;
        let (synced, detail) = match &result {
            Ok(true) => (true, "applied".to_string()),
            Ok(false) => (false, "declined by calendar".to_string()),
            Err(gateway_error) => (false, gateway_error.to_string()),
        };

        if synced {
            info!(
                event_name = "effects.calendar.applied",
                correlation_id = %audit.correlation_id,
                leave_request_id = record.request.id.0,
                action = ?action,
                "calendar updated"
            );
        } else {
            warn!(
                event_name = "effects.calendar.failed",
                correlation_id = %audit.correlation_id,
                leave_request_id = record.request.id.0,
                action = ?action,
                error = %detail,
                "calendar update failed; leave status is unaffected"
            );
        }

        self.audit.emit(
            AuditEvent::new(
                audit,
                "leave.calendar_effect",
                AuditCategory::Effects,
                if synced { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("action", format!("{action:?}"))
            .with_metadata("detail", detail),
        );
        synced
    }

    /// Balance for `employee_id` in `year`, from the owner's full history.
    pub async fn compute_balance(
        &self,
        employee_id: &UserId,
        year: i32,
    ) -> Result<BalanceReport, LeaveEngineError> {
        let history = self.history(employee_id, Vec::new()).await?;
        Ok(self.policy.compute_balance(year, &history, self.settings.pending_preview))
    }

    /// Advisory check against approved history; never blocks a submission.
    pub async fn check_eligibility(
        &self,
        employee_id: &UserId,
        kind: &str,
        window: LeaveWindow,
    ) -> Result<EligibilityVerdict, LeaveEngineError> {
        let approved = self.history(employee_id, vec![LeaveStatus::Approved]).await?;
        Ok(self.policy.check_eligibility(kind, window, self.clock.today(), &approved))
    }

    async fn history(
        &self,
        employee_id: &UserId,
        statuses: Vec<LeaveStatus>,
    ) -> Result<Vec<LeaveRequest>, LeaveEngineError> {
        let query = LeaveQuery::for_employee(employee_id.clone()).with_statuses(statuses);
        Ok(self.leaves.query(&query).await?.into_iter().map(|record| record.request).collect())
    }

    pub async fn resolve_employee(
        &self,
        name: &str,
    ) -> Result<SelectorResolution<User>, LeaveEngineError> {
        let matches = self.users.search_by_name(name.trim()).await?;
        Ok(SelectorResolution::from_matches(matches, self.settings.disambiguation_limit))
    }

    /// Lists the requester's leaves, or another employee's when the requester is HR or a manager.
    pub async fn list(
        &self,
        requester: &UserProfile,
        filter: &ListFilter,
    ) -> Result<ListOutcome, LeaveEngineError> {
        let named = filter
            .employee_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let (employee_id, employee_name) = match named {
            Some(name) if requester.role.can_decide_leave() => {
                match self.resolve_employee(name).await? {
                    SelectorResolution::NotFound => {
                        return Ok(ListOutcome::EmployeeNotFound(name.to_string()))
                    }
                    SelectorResolution::Ambiguous { candidates, total } => {
                        return Ok(ListOutcome::AmbiguousEmployee {
                            query: name.to_string(),
                            candidates,
                            total,
                        })
                    }
                    SelectorResolution::Unique(user) => (user.id, user.username),
                }
            }
            _ => (requester.user_id.clone(), requester.display_name.clone()),
        };

        let query = LeaveQuery {
            employee_ids: Some(vec![employee_id]),
            statuses: filter.status.into_iter().collect(),
            start_on_or_after: filter.start_on_or_after,
            start_on_or_before: filter.start_on_or_before,
            limit: Some(self.settings.list_limit),
            ..LeaveQuery::default()
        };
        let records = self.leaves.query(&query).await?;
        Ok(ListOutcome::Listed { employee_name, records })
    }

    /// Leave reports for HR (organisation-wide) and managers (direct reports).
    pub async fn report(
        &self,
        requester: &UserProfile,
        kind: ReportKind,
        department: Option<String>,
    ) -> Result<ReportOutcome, LeaveEngineError> {
        if !requester.role.can_decide_leave() {
            return Ok(ReportOutcome::PermissionDenied);
        }
        if kind == ReportKind::Department {
            if requester.role != Role::Hr {
                return Ok(ReportOutcome::DepartmentRestricted);
            }
            return Ok(ReportOutcome::DepartmentUnavailable { department });
        }

        let scope = if requester.role.is_hr() {
            ReportScope::Organisation
        } else {
            let members = self.users.list_direct_reports(&requester.user_id).await?;
            if members.is_empty() {
                return Ok(ReportOutcome::NoTeam);
            }
            ReportScope::Team(members)
        };

        let outcome = match kind {
            ReportKind::Usage => self.report_usage(scope).await?,
            ReportKind::Upcoming => self.report_upcoming(&scope).await?,
            ReportKind::Calendar => self.report_calendar(&scope).await?,
            ReportKind::Department => ReportOutcome::DepartmentUnavailable { department },
        };
        info!(
            event_name = "leave.report.generated",
            user_id = %requester.user_id,
            report = ?kind,
            "leave report generated"
        );
        Ok(outcome)
    }

    async fn report_usage(&self, scope: ReportScope) -> Result<ReportOutcome, LeaveEngineError> {
        let year = self.clock.today().year();
        let query = LeaveQuery {
            employee_ids: scope.employee_ids(),
            statuses: vec![LeaveStatus::Approved],
            ..LeaveQuery::default()
        };
        let approved: Vec<LeaveRecord> = self
            .leaves
            .query(&query)
            .await?
            .into_iter()
            .filter(|record| record.request.window.within_year(year))
            .collect();

        match scope {
            ReportScope::Team(members) => {
                let usage = members
                    .into_iter()
                    .map(|employee| {
                        let mut days_by_kind = BTreeMap::new();
                        let own = approved.iter().filter(|r| r.request.employee_id == employee.id);
                        for record in own {
                            *days_by_kind.entry(record.request.kind).or_insert(0.0) +=
                                record.request.duration_days();
                        }
                        MemberUsage { employee, days_by_kind }
                    })
                    .collect();
                Ok(ReportOutcome::TeamUsage(usage))
            }
            ReportScope::Organisation => {
                let mut days_by_kind = BTreeMap::new();
                for record in &approved {
                    *days_by_kind.entry(record.request.kind).or_insert(0.0) +=
                        record.request.duration_days();
                }
                Ok(ReportOutcome::OrganisationUsage {
                    days_by_kind,
                    total_employees: self.users.count().await?,
                    approved_requests: approved.len(),
                })
            }
        }
    }

    async fn report_upcoming(
        &self,
        scope: &ReportScope,
    ) -> Result<ReportOutcome, LeaveEngineError> {
        let today = self.clock.today();
        let window_days = self.settings.upcoming_window_days;
        let query = LeaveQuery {
            employee_ids: scope.employee_ids(),
            statuses: vec![LeaveStatus::Approved],
            start_on_or_after: Some(today),
            start_on_or_before: Some(today + Duration::days(window_days)),
            ..LeaveQuery::default()
        };
        let records = self.leaves.query(&query).await?;
        Ok(ReportOutcome::Upcoming { window_days, records })
    }

    /// Approved leaves overlapping the current calendar month.
    async fn report_calendar(
        &self,
        scope: &ReportScope,
    ) -> Result<ReportOutcome, LeaveEngineError> {
        let (from, to) = month_bounds(self.clock.today())?;
        let query = LeaveQuery {
            employee_ids: scope.employee_ids(),
            statuses: vec![LeaveStatus::Approved],
            overlapping: Some((from, to)),
            ..LeaveQuery::default()
        };
        let records = self.leaves.query(&query).await?;
        Ok(ReportOutcome::Calendar {
            team: matches!(scope, ReportScope::Team(_)),
            from,
            to,
            records,
        })
    }
}

fn month_bounds(day: NaiveDate) -> Result<(NaiveDate, NaiveDate), LeaveEngineError> {
    let invalid = || LeaveEngineError::Invariant(format!("no month boundaries for {day}"));
    let first = NaiveDate::from_ymd_opt(day.year(), day.month(), 1).ok_or_else(invalid)?;
    let (next_year, next_month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|next| next.pred_opt())
        .ok_or_else(invalid)?;
    Ok((first, last))
}
