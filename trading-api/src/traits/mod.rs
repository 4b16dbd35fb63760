pub mod broker;
pub mod news;
pub mod notifier;
