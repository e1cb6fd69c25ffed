#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod convert;
mod index;
mod metrics;
mod recorder;
mod resource_id;


pub use self::{
    controller::{Controller, FINALIZER},
    index::{Index, SharedIndex, Update},
    metrics::{ControllerMetrics, IndexMetrics},
    resource_id::ResourceId,
};
