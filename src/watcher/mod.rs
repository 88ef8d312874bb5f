mod facade;
mod notifier;
mod subscriptions;

pub use facade::*;
pub use notifier::*;
pub use subscriptions::*;

#[cfg(test)]
mod subscriptions_test;
