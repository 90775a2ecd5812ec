//! Core of the droidtap auto-clicker: locate a target on an Android screen
//! and keep tapping near it until told to stop.

pub mod automation;
pub mod error;
pub mod locator;
pub mod logger;
pub mod platform;
pub mod settings;
pub mod sleep;
pub mod types;
