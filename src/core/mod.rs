pub mod formatter;
pub mod models;
pub mod notify;
pub mod providers;
pub mod registry;
pub mod secrets;
pub mod session;
pub mod settings;
pub mod thresholds;
