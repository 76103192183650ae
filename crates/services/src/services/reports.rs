use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use sea_orm::{ConnectionTrait, DbErr};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

use db::models::{
    assignment::{Assignment, AssignmentFilter},
    expense::Expense,
    user::User,
    worked_hours::WorkedHours,
};
use db::types::VisitStatus;

#[derive(Debug, Clone, Serialize, TS)]
pub struct WorkerActivity {
    pub worker_id: Uuid,
    pub worker_name: String,
    pub completed_visits: i64,
    pub worked_minutes: i64,
    pub pay_cents: i64,
    pub travel_cost_cents: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct ActivityReport {
    #[ts(type = "Date")]
    pub from: DateTime<Utc>,
    #[ts(type = "Date")]
    pub to: DateTime<Utc>,
    pub workers: Vec<WorkerActivity>,
    pub total_pay_cents: i64,
    pub total_travel_cost_cents: i64,
    pub total_expenses_cents: i64,
    pub expense_count: i64,
}

/// Aggregates realized activity over `[from, to)`: per-worker hours, pay
/// (minutes x hourly rate), travel costs (one flat rate per completed
/// visit), and the expense totals of the same range.
pub async fn activity_report<C: ConnectionTrait>(
    db: &C,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<ActivityReport, DbErr> {
    let realized = WorkedHours::find_in_range(db, from, to).await?;

    let mut per_worker: BTreeMap<Uuid, (i64, i64)> = BTreeMap::new();
    for record in &realized {
        let minutes = (record.end_at - record.start_at).num_minutes();
        let entry = per_worker.entry(record.worker_id).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += minutes;
    }

    let mut workers = Vec::with_capacity(per_worker.len());
    let mut total_pay_cents = 0;
    let mut total_travel_cost_cents = 0;
    for (worker_id, (completed_visits, worked_minutes)) in per_worker {
        let Some(user) = User::find_by_id(db, worker_id).await? else {
            continue;
        };

        let pay_cents = worked_minutes * user.hourly_rate_cents / 60;
        let travel_cost_cents = completed_visits * user.travel_cost_cents;
        total_pay_cents += pay_cents;
        total_travel_cost_cents += travel_cost_cents;

        workers.push(WorkerActivity {
            worker_id,
            worker_name: format!("{} {}", user.first_name, user.last_name),
            completed_visits,
            worked_minutes,
            pay_cents,
            travel_cost_cents,
        });
    }

    let expenses = Expense::find_filtered(db, Some(from.date_naive()), Some(to.date_naive())).await?;
    let total_expenses_cents: i64 = expenses.iter().map(|expense| expense.amount_cents).sum();

    Ok(ActivityReport {
        from,
        to,
        workers,
        total_pay_cents,
        total_travel_cost_cents,
        total_expenses_cents,
        expense_count: expenses.len() as i64,
    })
}

/// Distinct `YYYY-MM` months carrying activity, newest first: months with a
/// non-cancelled assignment or a recorded expense.
pub async fn active_months<C: ConnectionTrait>(db: &C) -> Result<Vec<String>, DbErr> {
    let mut months = std::collections::BTreeSet::new();

    let assignments = Assignment::find_filtered(db, &AssignmentFilter::default()).await?;
    for assignment in assignments {
        if assignment.status != VisitStatus::Cancelled {
            months.insert(format!(
                "{:04}-{:02}",
                assignment.start_at.year(),
                assignment.start_at.month()
            ));
        }
    }

    let expenses = Expense::find_filtered(db, None, None).await?;
    for expense in expenses {
        months.insert(format!(
            "{:04}-{:02}",
            expense.incurred_on.year(),
            expense.incurred_on.month()
        ));
    }

    Ok(months.into_iter().rev().collect())
}
