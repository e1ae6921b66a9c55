pub mod api;
pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod draw;
pub mod error;
pub mod profile;
pub mod roulette;
pub mod session;
pub mod storage;
pub mod toast;
pub mod ui;
pub mod view;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
