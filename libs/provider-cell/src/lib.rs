pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Office, ProviderError, SlotCandidate, UnavailabilityPeriod, VisitType, WeeklyScheduleEntry,
};
pub use router::provider_routes;
