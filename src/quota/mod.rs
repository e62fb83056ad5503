//! Quota lookup and increase requests.

pub mod client;
pub mod dispatch;
pub mod provider;
