pub mod scheduler;
pub mod signal_service;

pub use scheduler::{Scheduler, ShutdownFlag};
pub use signal_service::AppState;
