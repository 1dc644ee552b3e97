//! Appium automation session adapter.
//!
//! Talks to an Appium server over the W3C WebDriver HTTP protocol, using the
//! Appium device extensions for GSM call simulation and screen locking.

pub mod client;
pub mod protocol;

pub use client::AppiumSession;
