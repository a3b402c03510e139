#![deny(warnings)]

pub mod audio;
pub mod config;
pub mod emotion;
pub mod features;
pub mod fusion;
pub mod pipeline;
pub mod pitch;
pub mod semantic;
pub mod store;
pub mod training;
pub mod util;
