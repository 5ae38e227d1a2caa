#![allow(dead_code)]

mod index;

pub use index::*;
