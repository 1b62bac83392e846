#![doc = include_str!("../README.md")]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod detect;
pub mod lock;
pub mod process;
pub mod restore;
pub mod retention;
pub mod store;
pub mod strategy;
pub mod target;
pub mod version;
