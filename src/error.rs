//! Error type for the fallible, non-hot-path operations of the crate.
//!
//! Back-pressure (a full or empty channel) and checksum mismatches are not
//! errors: the former is reported as [`nb::Error::WouldBlock`] by the
//! non-blocking operations and the latter is absorbed by the framing layer.

use thiserror::Error;

/// Errors surfaced while configuring the transport or waiting with a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// A baud rate of zero was requested.
    #[error("baud rate must be non-zero")]
    ZeroBaudRate,

    /// The module clock cannot be divided down to the requested baud rate
    /// within the 13-bit divisor field.
    #[error("a {clock_hz} Hz module clock cannot generate {baud_rate} baud")]
    UnreachableBaudRate {
        /// Module clock feeding the baud rate generator, in Hz.
        clock_hz: u32,
        /// Requested line rate.
        baud_rate: u32,
    },

    /// A timed channel operation ran past its deadline.
    #[error("channel operation timed out")]
    Timeout,
}
