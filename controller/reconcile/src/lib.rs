#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod default_group;
mod delete;
mod error;
pub mod observed;
mod reconciler;
mod recorder;
pub mod retry;

pub use self::{
    error::Error,
    reconciler::Reconciler,
    recorder::{Event, EventKind, Recorder},
    retry::RetryConfig,
};
