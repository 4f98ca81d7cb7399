#![no_std]

extern crate alloc;

// Power management control for a WiFi radio.
//
// The crate owns the radio power-mode state machine, its command issue and
// completion protocol, the callback/veto registries and the deferred message
// queue. It avoids the standard library so the same logic runs in MCU
// firmware and in host tooling; completion callbacks are boxed closures, so a
// global allocator is required.

pub mod command;
pub mod config;
pub mod deferred;
pub mod pmc;
pub mod power;
pub mod registry;
pub mod repl;
pub mod telemetry;
pub mod timers;
pub mod wowl;
