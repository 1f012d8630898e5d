//! Constants used across the tower serial protocol implementation.
//!
//! This module defines the wire layout of a packet, the sizing of the byte
//! channels that sit between interrupt and worker contexts, and the UART
//! clocking parameters used when programming the baud rate generator.
//!
//! ## Key Concepts
//!
//! - **Packet**: a fixed 5-byte unit, `command, param1, param2, param3, checksum`.
//! - **Acknowledge bit**: the top bit of `command`, reserved for the ack/nak
//!   convention and otherwise opaque to the framing layer.
//! - **FIFO sizing**: channel capacities are powers of two so indices wrap
//!   with a mask.
//! - **Baud generation**: the peripheral oversamples each bit 16 times and
//!   carries a 5-bit fine-adjust field next to the 13-bit integer divisor.

/// Number of bytes in a packet on the wire, including the trailing checksum.
pub const PACKET_LEN: usize = 5;

/// Number of payload bytes covered by the checksum.
pub const PAYLOAD_LEN: usize = PACKET_LEN - 1;

/// Bit of the command byte meaning "acknowledgement requested" on a received
/// command and "acknowledged" on an echoed response.
pub const PACKET_ACK_MASK: u8 = 0x80;

/// Bits of the command byte carrying the 7-bit command code.
pub const COMMAND_CODE_MASK: u8 = 0x7f;

/// Default capacity (in bytes) of each direction's channel.
pub const FIFO_SIZE: usize = 256;

/// Maximum number of response packets a dispatcher may queue for one command.
///
/// The largest reply in the tower protocol is the four-packet startup burst.
pub const MAX_RESPONSES: usize = 8;

/// Receiver oversampling factor of the UART baud rate generator.
pub const UART_SAMPLE_RATE: u32 = 16;

/// Number of fractional steps in the baud rate fine-adjust field (`BRFA`).
pub const UART_BRFA_STEPS: u32 = 32;

/// Largest integer divisor (`SBR`) representable in the 13-bit register field.
pub const UART_SBR_MAX: u16 = 0x1fff;

/// Default line rate used by the tower and its host.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Number of status-register reads performed while waiting for the
/// transmitter to report an empty data register.
pub const TX_READY_POLL_LIMIT: u16 = 64;

/// Command codes used by the tower protocol.
///
/// The framing layer never interprets these; they are provided so that
/// [`Dispatcher`](crate::dispatch::Dispatcher) implementations and hosts
/// agree on the numbering.
pub mod commands {
    /// PC to tower: request the startup burst.
    pub const GET_STARTUP_VALUES: u8 = 0x04;
    /// PC to tower: write (0x00-0x07) or erase (0x08) a flash byte.
    pub const FLASH_PROGRAM_BYTE: u8 = 0x07;
    /// PC to tower: read a flash byte.
    pub const FLASH_READ_BYTE: u8 = 0x08;
    /// PC to tower: request the firmware version.
    pub const GET_VERSION: u8 = 0x09;
    /// Both directions: get or set the protocol mode.
    pub const PROTOCOL_MODE: u8 = 0x0a;
    /// Both directions: get or set the tower number.
    pub const TOWER_NUMBER: u8 = 0x0b;
    /// Both directions: set the real-time clock.
    pub const SET_TIME: u8 = 0x0c;
    /// Both directions: get or set the tower mode.
    pub const TOWER_MODE: u8 = 0x0d;
    /// Tower to PC: startup announcement.
    pub const TOWER_STARTUP: u8 = 0x04;
    /// Tower to PC: firmware version.
    pub const TOWER_VERSION: u8 = 0x09;
}
