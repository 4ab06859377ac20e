#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::ignored_unit_patterns
)]

pub mod codec;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod error;
pub mod event;
pub mod http;
pub mod model;
pub mod protocol;
pub mod router;
pub mod schema;
pub mod sync;
