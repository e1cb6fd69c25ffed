#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use sg_controller_ec2 as ec2;
pub use sg_controller_k8s_api as k8s;
pub use sg_controller_k8s_status as status;
pub use sg_controller_reconcile as reconcile;

mod args;
mod lease;

pub use self::args::Args;
