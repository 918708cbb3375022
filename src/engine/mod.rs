pub mod context;
pub mod executor;
pub mod monitor;
pub mod pool;
pub mod runner;
pub mod scheduler;

pub use context::IterationContext;
pub use executor::TickPlan;
pub use pool::{VuLease, VuPool};
pub use runner::LoadTestRunner;
pub use scheduler::{RateScheduler, SchedulerReport};
