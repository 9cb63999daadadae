pub mod classify;
pub mod compose;
pub mod error;
pub mod flow;
pub mod message;
pub mod postback;
pub mod profile;
pub mod questions;
