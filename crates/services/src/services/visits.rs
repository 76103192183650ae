use sea_orm::ConnectionTrait;
use thiserror::Error;

use db::{
    models::{
        appointment::{Appointment, AppointmentError},
        assignment::{Assignment, AssignmentError},
        user::{User, UserRole},
        worked_hours::{WorkedHours, WorkedHoursError},
    },
    types::VisitStatus,
};

use crate::services::scheduling::{self, Occurrence, SchedulingError};

/// Lifecycle transitions shared by the per-record routes and the bulk
/// endpoint. Callers wrap these in a transaction.
#[derive(Debug, Error)]
pub enum VisitError {
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Appointment(#[from] AppointmentError),
    #[error(transparent)]
    WorkedHours(#[from] WorkedHoursError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    #[error("{0}")]
    Forbidden(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: VisitStatus, to: VisitStatus },
}

fn is_admin(actor: &User) -> bool {
    actor.role == UserRole::Admin
}

fn owns_assignment(actor: &User, assignment: &Assignment) -> bool {
    assignment.worker_id == actor.id
}

fn owns_appointment(actor: &User, appointment: &Appointment) -> bool {
    appointment.worker_id == actor.id
}

fn require_owner_or_admin(owned: bool, actor: &User, action: &str) -> Result<(), VisitError> {
    if is_admin(actor) || owned {
        Ok(())
    } else {
        Err(VisitError::Forbidden(format!(
            "Only the assigned worker or an administrator may {action}"
        )))
    }
}

/// PLANNED -> COMPLETED; records realized time in the same transaction.
pub async fn complete_assignment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    assignment: &Assignment,
) -> Result<Assignment, VisitError> {
    require_owner_or_admin(owns_assignment(actor, assignment), actor, "complete it")?;
    if assignment.status != VisitStatus::Planned {
        return Err(VisitError::InvalidTransition {
            from: assignment.status.clone(),
            to: VisitStatus::Completed,
        });
    }

    let completed = Assignment::set_status(db, assignment.id, VisitStatus::Completed).await?;
    WorkedHours::create_for_assignment(db, &completed).await?;
    Ok(completed)
}

/// PLANNED -> CANCELLED for everyone entitled; admins may also cancel a
/// COMPLETED assignment, which removes its realized time.
pub async fn cancel_assignment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    assignment: &Assignment,
) -> Result<Assignment, VisitError> {
    require_owner_or_admin(owns_assignment(actor, assignment), actor, "cancel it")?;
    match &assignment.status {
        VisitStatus::Planned => {}
        VisitStatus::Completed if is_admin(actor) => {
            WorkedHours::delete_by_assignment(db, assignment.id).await?;
        }
        from => {
            return Err(VisitError::InvalidTransition {
                from: from.clone(),
                to: VisitStatus::Cancelled,
            });
        }
    }

    Ok(Assignment::set_status(db, assignment.id, VisitStatus::Cancelled).await?)
}

/// CANCELLED -> PLANNED, admin only. The interval stopped counting as busy
/// while cancelled, so it is re-validated against current conflicts.
pub async fn replan_assignment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    assignment: &Assignment,
) -> Result<Assignment, VisitError> {
    if !is_admin(actor) {
        return Err(VisitError::Forbidden(
            "Only an administrator may replan a cancelled assignment".to_string(),
        ));
    }
    if assignment.status != VisitStatus::Cancelled {
        return Err(VisitError::InvalidTransition {
            from: assignment.status.clone(),
            to: VisitStatus::Planned,
        });
    }

    let occurrence = Occurrence {
        start_at: assignment.start_at,
        end_at: assignment.end_at,
    };
    scheduling::ensure_assignment_slots_free(
        db,
        assignment.worker_id,
        assignment.patient_id,
        &[occurrence],
        Some(assignment.id),
        false,
    )
    .await?;

    Ok(Assignment::set_status(db, assignment.id, VisitStatus::Planned).await?)
}

/// Deletion: admin always; the owning worker only while not COMPLETED.
/// Realized time goes with the record.
pub async fn delete_assignment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    assignment: &Assignment,
) -> Result<(), VisitError> {
    require_owner_or_admin(owns_assignment(actor, assignment), actor, "delete it")?;
    if assignment.status == VisitStatus::Completed && !is_admin(actor) {
        return Err(VisitError::Forbidden(
            "Only an administrator may delete a completed assignment".to_string(),
        ));
    }

    WorkedHours::delete_by_assignment(db, assignment.id).await?;
    Assignment::delete(db, assignment.id).await?;
    Ok(())
}

pub async fn complete_appointment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    appointment: &Appointment,
) -> Result<Appointment, VisitError> {
    require_owner_or_admin(owns_appointment(actor, appointment), actor, "complete it")?;
    if appointment.status != VisitStatus::Planned {
        return Err(VisitError::InvalidTransition {
            from: appointment.status.clone(),
            to: VisitStatus::Completed,
        });
    }

    Ok(Appointment::set_status(db, appointment.id, VisitStatus::Completed).await?)
}

pub async fn cancel_appointment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    appointment: &Appointment,
) -> Result<Appointment, VisitError> {
    require_owner_or_admin(owns_appointment(actor, appointment), actor, "cancel it")?;
    match &appointment.status {
        VisitStatus::Planned => {}
        VisitStatus::Completed if is_admin(actor) => {}
        from => {
            return Err(VisitError::InvalidTransition {
                from: from.clone(),
                to: VisitStatus::Cancelled,
            });
        }
    }

    Ok(Appointment::set_status(db, appointment.id, VisitStatus::Cancelled).await?)
}

pub async fn replan_appointment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    appointment: &Appointment,
) -> Result<Appointment, VisitError> {
    if !is_admin(actor) {
        return Err(VisitError::Forbidden(
            "Only an administrator may replan a cancelled appointment".to_string(),
        ));
    }
    if appointment.status != VisitStatus::Cancelled {
        return Err(VisitError::InvalidTransition {
            from: appointment.status.clone(),
            to: VisitStatus::Planned,
        });
    }

    scheduling::ensure_appointment_slot_free(
        db,
        appointment.worker_id,
        appointment.start_at,
        appointment.end_at,
        Some(appointment.id),
        false,
    )
    .await?;

    Ok(Appointment::set_status(db, appointment.id, VisitStatus::Planned).await?)
}

pub async fn delete_appointment<C: ConnectionTrait>(
    db: &C,
    actor: &User,
    appointment: &Appointment,
) -> Result<(), VisitError> {
    require_owner_or_admin(owns_appointment(actor, appointment), actor, "delete it")?;
    if appointment.status == VisitStatus::Completed && !is_admin(actor) {
        return Err(VisitError::Forbidden(
            "Only an administrator may delete a completed appointment".to_string(),
        ));
    }

    Appointment::delete(db, appointment.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;
    use uuid::Uuid;

    use super::*;
    use db::models::{
        assignment::CreateAssignment,
        patient::{CreatePatient, Patient},
        user::CreateUser,
    };

    struct Fixture {
        db: sea_orm::DatabaseConnection,
        admin: User,
        worker: User,
        other_worker: User,
        patient_id: Uuid,
    }

    async fn setup() -> Fixture {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();

        let make_user = |email: &str, role: UserRole| CreateUser {
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            password_salt: "salt".to_string(),
            role,
            hourly_rate_cents: 2_000,
            travel_cost_cents: 300,
        };

        let admin = User::create(&db, &make_user("admin@example.com", UserRole::Admin), Uuid::new_v4())
            .await
            .unwrap();
        let worker = User::create(&db, &make_user("worker@example.com", UserRole::Worker), Uuid::new_v4())
            .await
            .unwrap();
        let other_worker = User::create(
            &db,
            &make_user("other@example.com", UserRole::Worker),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let patient_id = Uuid::new_v4();
        Patient::create(
            &db,
            &CreatePatient {
                first_name: "Jean".to_string(),
                last_name: "Petit".to_string(),
                address: "1 rue de la Paix".to_string(),
                phone: None,
                notes: None,
            },
            patient_id,
        )
        .await
        .unwrap();

        Fixture {
            db,
            admin,
            worker,
            other_worker,
            patient_id,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    async fn planned_assignment(fixture: &Fixture, start: u32, end: u32) -> Assignment {
        Assignment::create(
            &fixture.db,
            &CreateAssignment {
                worker_id: fixture.worker.id,
                patient_id: fixture.patient_id,
                start_at: at(start),
                end_at: at(end),
            },
            Uuid::new_v4(),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn completing_creates_exactly_one_worked_hours_row() {
        let fixture = setup().await;
        let assignment = planned_assignment(&fixture, 9, 10).await;

        let completed = complete_assignment(&fixture.db, &fixture.worker, &assignment)
            .await
            .unwrap();
        assert_eq!(completed.status, VisitStatus::Completed);

        let record = WorkedHours::find_by_assignment(&fixture.db, assignment.id)
            .await
            .unwrap()
            .expect("worked hours row");
        assert_eq!(record.start_at, assignment.start_at);
        assert_eq!(record.end_at, assignment.end_at);
    }

    #[tokio::test]
    async fn completing_twice_is_an_invalid_transition() {
        let fixture = setup().await;
        let assignment = planned_assignment(&fixture, 9, 10).await;

        let completed = complete_assignment(&fixture.db, &fixture.worker, &assignment)
            .await
            .unwrap();
        let err = complete_assignment(&fixture.db, &fixture.admin, &completed)
            .await
            .unwrap_err();
        assert!(matches!(err, VisitError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn other_workers_cannot_touch_the_assignment() {
        let fixture = setup().await;
        let assignment = planned_assignment(&fixture, 9, 10).await;

        let err = complete_assignment(&fixture.db, &fixture.other_worker, &assignment)
            .await
            .unwrap_err();
        assert!(matches!(err, VisitError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_cancel_of_completed_removes_worked_hours() {
        let fixture = setup().await;
        let assignment = planned_assignment(&fixture, 9, 10).await;
        let completed = complete_assignment(&fixture.db, &fixture.worker, &assignment)
            .await
            .unwrap();

        // The worker cannot cancel a completed assignment.
        let err = cancel_assignment(&fixture.db, &fixture.worker, &completed)
            .await
            .unwrap_err();
        assert!(matches!(err, VisitError::InvalidTransition { .. }));

        let cancelled = cancel_assignment(&fixture.db, &fixture.admin, &completed)
            .await
            .unwrap();
        assert_eq!(cancelled.status, VisitStatus::Cancelled);
        assert!(
            WorkedHours::find_by_assignment(&fixture.db, assignment.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn replan_is_admin_only_and_rechecks_conflicts() {
        let fixture = setup().await;
        let assignment = planned_assignment(&fixture, 9, 10).await;
        let cancelled = cancel_assignment(&fixture.db, &fixture.worker, &assignment)
            .await
            .unwrap();

        let err = replan_assignment(&fixture.db, &fixture.worker, &cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, VisitError::Forbidden(_)));

        // Occupy the slot while the original is cancelled.
        planned_assignment(&fixture, 9, 10).await;

        let err = replan_assignment(&fixture.db, &fixture.admin, &cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VisitError::Scheduling(SchedulingError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn replanning_into_a_free_slot_succeeds() {
        let fixture = setup().await;
        let assignment = planned_assignment(&fixture, 9, 10).await;
        let cancelled = cancel_assignment(&fixture.db, &fixture.admin, &assignment)
            .await
            .unwrap();

        let replanned = replan_assignment(&fixture.db, &fixture.admin, &cancelled)
            .await
            .unwrap();
        assert_eq!(replanned.status, VisitStatus::Planned);
    }

    #[tokio::test]
    async fn workers_cannot_delete_completed_assignments() {
        let fixture = setup().await;
        let assignment = planned_assignment(&fixture, 9, 10).await;
        let completed = complete_assignment(&fixture.db, &fixture.worker, &assignment)
            .await
            .unwrap();

        let err = delete_assignment(&fixture.db, &fixture.worker, &completed)
            .await
            .unwrap_err();
        assert!(matches!(err, VisitError::Forbidden(_)));

        delete_assignment(&fixture.db, &fixture.admin, &completed)
            .await
            .unwrap();
        assert!(
            Assignment::find_by_id(&fixture.db, assignment.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            WorkedHours::find_by_assignment(&fixture.db, assignment.id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
