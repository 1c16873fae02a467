#![no_std]

// Shared logic for the power button sequencer.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing the hardware seams as traits the other
// crates implement.

pub mod console;
pub mod dwell;
pub mod ports;
pub mod sequencer;
pub mod sim;
pub mod telemetry;
