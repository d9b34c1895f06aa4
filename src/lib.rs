//! protonkit - run winetricks and other tools for Steam Play games
//!
//! Library crate shared by the `protonkit` and `protonkit-launch` binaries:
//! Steam discovery, Proton resolution and the environment Wine tools run in.

#[macro_use]
pub mod paths;

pub mod command;
pub mod config;
pub mod error;
pub mod flatpak;
pub mod gui;
pub mod logging;
pub mod steam;
pub mod utils;
pub mod vdf;
pub mod wine;
pub mod winetricks;

pub use error::{Error, Result};
