#![forbid(unsafe_code)]

pub mod codegen;
pub mod devices;

pub mod utils;
