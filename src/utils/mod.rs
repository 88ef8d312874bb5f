pub mod async_task;

pub(crate) use async_task::spawn_task;
pub(crate) use async_task::task_with_timeout_and_exponential_backoff;
pub use async_task::TimerGuard;
pub use async_task::TimerRegistry;
