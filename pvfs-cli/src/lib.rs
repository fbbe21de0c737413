extern crate clap;
extern crate pvfs;

pub mod cli;
pub mod error;
pub mod extract;
pub mod info;
pub mod tree;
pub mod utils;
