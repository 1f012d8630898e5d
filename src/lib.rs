//! # towerlink
//!
//! A portable, no_std Rust implementation of the serial communication core of a
//! tower board talking to a host PC: a byte-oriented UART transport and a fixed
//! 5-byte packet protocol layered on top of it.
//!
//! This crate provides:
//! - `critical-section` protected byte channels shared by interrupt and thread contexts
//! - an interrupt-driven UART transport with a single-byte RX hand-off and a
//!   transmit-interrupt state machine
//! - self-synchronising packet framing with an XOR checksum and no start marker
//! - a `Dispatcher` seam for command handling, with the ack/nak echo convention
//! - optional polled operation driven by an `embedded-hal` delay
//! - interrupt-to-worker wake-ups through `embassy-sync` signals, usable from
//!   async tasks or from kernel threads parked through the [`wait::Park`] hook
//!
//! ## Crate features
//! | Feature         | Description |
//! |-----------------|-------------|
//! | `std`           | Disables `#![no_std]`, uses the `std` critical-section implementation, replaces `heapless::Vec` with `std::vec::Vec` and adds the thread-parking `put`/`get`/`handle` wrappers and timed channel operations |
//! | `isr` (default) | Static-transport helpers and the `init_serial_transport!` / `serial_isr!` macros |
//! | `delay-loop`    | Polled loop driven by `embedded_hal::delay::DelayNs` |
//! | `defmt-0-3`     | Uses `defmt` logging |
//! | `log`           | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use towerlink::packet::PacketLink;
//! use towerlink::uart::SerialConfig;
//!
//! towerlink::init_serial_transport!(Uart2, Uart2::steal());
//!
//! struct Kernel;
//! impl towerlink::wait::Park for Kernel { /* task notifications */ }
//!
//! #[interrupt]
//! fn UART2_RX_TX() {
//!     towerlink::serial_isr!();
//! }
//!
//! fn main() -> ! {
//!     SERIAL_TRANSPORT.init(&SerialConfig::new(CLOCK_HZ)).unwrap();
//!     spawn(|| towerlink::uart::run_rx_worker::<Kernel, _, _>(&SERIAL_TRANSPORT));
//!     spawn(|| towerlink::uart::run_tx_worker::<Kernel, _, _>(&SERIAL_TRANSPORT));
//!
//!     let mut link = PacketLink::new(&SERIAL_TRANSPORT);
//!     let mut tower = Tower::new();
//!     loop {
//!         towerlink::wait::block_on::<Kernel, _>(link.handle_async(&mut tower));
//!     }
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - The transport must be initialised before its interrupt is unmasked at the NVIC
//! - Waiting operations suspend on signals raised by the ISR or the opposite channel end; drive them from tasks or threads, never from the ISR
//! - Only one transport should own a given UART
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;

#[cfg(not(feature = "std"))]
pub use heapless;

#[macro_use]
mod logging;

pub(crate) mod checksum;
pub mod consts;
pub mod dispatch;
pub mod error;
pub mod fifo;
pub mod packet;
pub mod uart;
pub mod wait;

pub use dispatch::{Dispatcher, Responses};
pub use error::Error;
pub use fifo::ByteChannel;
pub use packet::{ByteIo, Packet, PacketLink};
pub use uart::{SerialConfig, SerialPeripheral, SerialTransport};
