use chrono::{DateTime, Duration, Months, Utc};
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use db::models::{
    appointment::{Appointment, AppointmentError},
    assignment::{Assignment, AssignmentError, OverlapActor},
};

/// Recurrence never expands past this horizon, whatever `until` says.
const MAX_HORIZON_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Appointment(#[from] AppointmentError),
    #[error("{0}")]
    ValidationError(String),
    #[error("Schedule conflict for {dimension} starting {start_at}")]
    Conflict {
        dimension: &'static str,
        start_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct RecurrenceRule {
    pub frequency: RecurrenceFrequency,
    pub interval: u32,
    #[ts(type = "Date")]
    pub until: DateTime<Utc>,
}

/// One concrete interval produced by expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Expands a base interval into its concrete occurrences.
///
/// The first occurrence is always emitted. Occurrence `n` starts at
/// `start + n * interval` units of the chosen frequency (months are added
/// from the original start, so a month-end clamp never shifts the rest of
/// the series), preserving the original duration. Expansion stops once the
/// computed start exceeds `min(until, now + 1 year)`.
pub fn expand_occurrences(
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    rule: Option<&RecurrenceRule>,
    now: DateTime<Utc>,
) -> Result<Vec<Occurrence>, SchedulingError> {
    if start_at >= end_at {
        return Err(SchedulingError::ValidationError(
            "Interval must start before it ends".to_string(),
        ));
    }

    let duration = end_at - start_at;
    let mut occurrences = vec![Occurrence { start_at, end_at }];

    let Some(rule) = rule else {
        return Ok(occurrences);
    };
    if rule.interval == 0 {
        return Err(SchedulingError::ValidationError(
            "Recurrence interval must be at least 1".to_string(),
        ));
    }

    let horizon = rule.until.min(now + Duration::days(MAX_HORIZON_DAYS));

    for n in 1u32.. {
        let Some(steps) = n.checked_mul(rule.interval) else {
            break;
        };

        let next_start = match rule.frequency {
            RecurrenceFrequency::Daily => {
                start_at.checked_add_signed(Duration::days(i64::from(steps)))
            }
            RecurrenceFrequency::Weekly => {
                start_at.checked_add_signed(Duration::weeks(i64::from(steps)))
            }
            RecurrenceFrequency::Monthly => start_at.checked_add_months(Months::new(steps)),
        };

        let Some(next_start) = next_start else {
            break;
        };
        if next_start > horizon {
            break;
        }

        occurrences.push(Occurrence {
            start_at: next_start,
            end_at: next_start + duration,
        });
    }

    Ok(occurrences)
}

/// Runs the overlap checker for every occurrence against both the worker
/// and the patient dimension. The first conflict rejects the whole batch
/// unless `ignore_conflicts` is set.
pub async fn ensure_assignment_slots_free<C: ConnectionTrait>(
    db: &C,
    worker_id: Uuid,
    patient_id: Uuid,
    occurrences: &[Occurrence],
    exclude: Option<Uuid>,
    ignore_conflicts: bool,
) -> Result<(), SchedulingError> {
    if ignore_conflicts {
        return Ok(());
    }

    for occurrence in occurrences {
        for actor in [
            OverlapActor::Worker(worker_id),
            OverlapActor::Patient(patient_id),
        ] {
            let conflict = Assignment::find_overlapping(
                db,
                actor,
                occurrence.start_at,
                occurrence.end_at,
                exclude,
            )
            .await?;

            if let Some(existing) = conflict {
                tracing::debug!(
                    dimension = actor.dimension(),
                    conflicting_id = %existing.id,
                    start_at = %occurrence.start_at,
                    "Rejecting occurrence batch on conflict"
                );
                return Err(SchedulingError::Conflict {
                    dimension: actor.dimension(),
                    start_at: occurrence.start_at,
                });
            }
        }
    }

    Ok(())
}

/// Worker-dimension gate for appointments.
pub async fn ensure_appointment_slot_free<C: ConnectionTrait>(
    db: &C,
    worker_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    exclude: Option<Uuid>,
    ignore_conflicts: bool,
) -> Result<(), SchedulingError> {
    if ignore_conflicts {
        return Ok(());
    }

    let conflict = Appointment::find_overlapping(db, worker_id, start_at, end_at, exclude).await?;
    if conflict.is_some() {
        return Err(SchedulingError::Conflict {
            dimension: "worker",
            start_at,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn weekly_until(until: DateTime<Utc>) -> RecurrenceRule {
        RecurrenceRule {
            frequency: RecurrenceFrequency::Weekly,
            interval: 1,
            until,
        }
    }

    #[test]
    fn single_occurrence_without_rule() {
        let occurrences = expand_occurrences(
            dt(2026, 3, 2, 9, 0),
            dt(2026, 3, 2, 10, 0),
            None,
            dt(2026, 3, 1, 0, 0),
        )
        .unwrap();
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].start_at, dt(2026, 3, 2, 9, 0));
    }

    #[test]
    fn weekly_expansion_preserves_duration_and_order() {
        let occurrences = expand_occurrences(
            dt(2026, 3, 2, 9, 0),
            dt(2026, 3, 2, 10, 30),
            Some(&weekly_until(dt(2026, 3, 30, 0, 0))),
            dt(2026, 3, 1, 0, 0),
        )
        .unwrap();

        assert_eq!(occurrences.len(), 4); // Mar 2, 9, 16, 23
        let duration = Duration::minutes(90);
        for pair in occurrences.windows(2) {
            assert!(pair[0].start_at < pair[1].start_at);
        }
        for occurrence in &occurrences {
            assert_eq!(occurrence.end_at - occurrence.start_at, duration);
        }
    }

    #[test]
    fn interval_multiplier_skips_periods() {
        let rule = RecurrenceRule {
            frequency: RecurrenceFrequency::Daily,
            interval: 3,
            until: dt(2026, 3, 10, 0, 0),
        };
        let occurrences = expand_occurrences(
            dt(2026, 3, 1, 9, 0),
            dt(2026, 3, 1, 10, 0),
            Some(&rule),
            dt(2026, 3, 1, 0, 0),
        )
        .unwrap();

        let starts: Vec<_> = occurrences.iter().map(|o| o.start_at).collect();
        assert_eq!(
            starts,
            vec![
                dt(2026, 3, 1, 9, 0),
                dt(2026, 3, 4, 9, 0),
                dt(2026, 3, 7, 9, 0)
            ]
        );
    }

    #[test]
    fn monthly_series_does_not_drift_after_month_end_clamp() {
        let rule = RecurrenceRule {
            frequency: RecurrenceFrequency::Monthly,
            interval: 1,
            until: dt(2026, 4, 30, 23, 0),
        };
        let occurrences = expand_occurrences(
            dt(2026, 1, 31, 9, 0),
            dt(2026, 1, 31, 10, 0),
            Some(&rule),
            dt(2026, 1, 1, 0, 0),
        )
        .unwrap();

        let starts: Vec<_> = occurrences.iter().map(|o| o.start_at).collect();
        assert_eq!(
            starts,
            vec![
                dt(2026, 1, 31, 9, 0),
                dt(2026, 2, 28, 9, 0),
                dt(2026, 3, 31, 9, 0),
                dt(2026, 4, 30, 9, 0)
            ]
        );
    }

    #[test]
    fn one_year_cap_bounds_distant_until() {
        let now = dt(2026, 3, 1, 0, 0);
        let rule = weekly_until(dt(2036, 1, 1, 0, 0));
        let occurrences = expand_occurrences(
            dt(2026, 3, 2, 9, 0),
            dt(2026, 3, 2, 10, 0),
            Some(&rule),
            now,
        )
        .unwrap();

        let cap = now + Duration::days(365);
        assert!(occurrences.iter().all(|o| o.start_at <= cap));
        // A weekly series over one year lands in the low fifties.
        assert!(occurrences.len() > 50 && occurrences.len() < 55);
    }

    #[test]
    fn until_before_second_occurrence_keeps_only_the_first() {
        let occurrences = expand_occurrences(
            dt(2026, 3, 2, 9, 0),
            dt(2026, 3, 2, 10, 0),
            Some(&weekly_until(dt(2026, 3, 3, 0, 0))),
            dt(2026, 3, 1, 0, 0),
        )
        .unwrap();
        assert_eq!(occurrences.len(), 1);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let rule = RecurrenceRule {
            frequency: RecurrenceFrequency::Daily,
            interval: 0,
            until: dt(2026, 3, 10, 0, 0),
        };
        let err = expand_occurrences(
            dt(2026, 3, 1, 9, 0),
            dt(2026, 3, 1, 10, 0),
            Some(&rule),
            dt(2026, 3, 1, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, SchedulingError::ValidationError(_)));
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let err = expand_occurrences(
            dt(2026, 3, 1, 10, 0),
            dt(2026, 3, 1, 9, 0),
            None,
            dt(2026, 3, 1, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, SchedulingError::ValidationError(_)));
    }
}
