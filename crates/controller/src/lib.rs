//! Vigil controllers: one per watched resource kind, run together by a
//! [`Supervisor`].

#![forbid(unsafe_code)]

mod controller;
mod supervisor;

pub use controller::{Controller, ControllerConfig};
pub use supervisor::Supervisor;
