pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentAction, AppointmentError, AppointmentStatus, DisplayStatus, VisitType,
};
pub use router::appointment_routes;
