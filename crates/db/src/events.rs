use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_ASSIGNMENT_CREATED: &str = "assignment.created";
pub const EVENT_ASSIGNMENT_UPDATED: &str = "assignment.updated";
pub const EVENT_ASSIGNMENT_DELETED: &str = "assignment.deleted";

pub const EVENT_APPOINTMENT_CREATED: &str = "appointment.created";
pub const EVENT_APPOINTMENT_UPDATED: &str = "appointment.updated";
pub const EVENT_APPOINTMENT_DELETED: &str = "appointment.deleted";

pub const EVENT_PATIENT_CREATED: &str = "patient.created";
pub const EVENT_PATIENT_UPDATED: &str = "patient.updated";
pub const EVENT_PATIENT_DELETED: &str = "patient.deleted";

pub const EVENT_USER_CREATED: &str = "user.created";
pub const EVENT_USER_UPDATED: &str = "user.updated";
pub const EVENT_USER_DELETED: &str = "user.deleted";

pub const EVENT_EXPENSE_CREATED: &str = "expense.created";
pub const EVENT_EXPENSE_UPDATED: &str = "expense.updated";
pub const EVENT_EXPENSE_DELETED: &str = "expense.deleted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEventPayload {
    pub assignment_id: Uuid,
    pub worker_id: Uuid,
    pub patient_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEventPayload {
    pub appointment_id: Uuid,
    pub worker_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientEventPayload {
    pub patient_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEventPayload {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseEventPayload {
    pub expense_id: Uuid,
}
