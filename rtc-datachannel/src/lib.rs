#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod data_channel;
pub mod message;
pub mod payload;
