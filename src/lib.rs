#![crate_name = "kismetc"]

#[macro_use]
extern crate lazy_static;

pub mod kismet_compiler;
