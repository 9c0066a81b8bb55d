//! HTTP request handlers.

pub mod assets;
pub mod auth;
pub mod common;
pub mod uploads;

pub use assets::*;
pub use auth::*;
pub use common::*;
pub use uploads::*;
