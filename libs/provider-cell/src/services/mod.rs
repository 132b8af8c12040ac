pub mod office;
pub mod schedule;
pub mod slots;

pub use office::OfficeService;
pub use schedule::ScheduleService;
pub use slots::SlotCalculatorService;
