//! 5-byte packet framing with checksum-based resynchronisation.
//!
//! Every packet on the wire is exactly [`PACKET_LEN`] bytes:
//!
//! ```text
//! +---------+--------+--------+--------+----------+
//! | command | param1 | param2 | param3 | checksum |
//! +---------+--------+--------+--------+----------+
//! ```
//!
//! where `checksum = command ^ param1 ^ param2 ^ param3`. There is no start
//! or end delimiter. The receiver keeps a window over the five most recent
//! bytes and checks it after every byte, so a valid frame is found at any
//! alignment, however much noise precedes it.
//!
//! ## Limitations
//!
//! - An 8-bit XOR accepts noise that happens to satisfy the checksum. Such a
//!   window is delivered as a packet; there is no stronger integrity check.
//! - The acknowledge bit ([`PACKET_ACK_MASK`]) is carried but never
//!   interpreted here. See [`crate::dispatch`].

use core::convert::Infallible;

use crate::checksum::xor_checksum;
use crate::consts::{COMMAND_CODE_MASK, PACKET_ACK_MASK, PACKET_LEN, PAYLOAD_LEN};
use crate::fifo::ByteChannel;
#[cfg(feature = "std")]
use crate::wait::block_on_thread;

/// One decoded (or to-be-encoded) protocol packet.
///
/// The checksum is not stored: it is derived from the four payload bytes
/// when encoding and verified when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Packet {
    /// Command byte, including the acknowledge bit.
    pub command: u8,
    /// First parameter byte.
    pub param1: u8,
    /// Second parameter byte.
    pub param2: u8,
    /// Third parameter byte.
    pub param3: u8,
}

impl Packet {
    /// Creates a packet from its command and parameter bytes.
    pub const fn new(command: u8, param1: u8, param2: u8, param3: u8) -> Self {
        Self {
            command,
            param1,
            param2,
            param3,
        }
    }

    /// Creates a packet whose `param2`/`param3` carry a 16-bit value, low byte first.
    pub const fn from_param23(command: u8, param1: u8, value: u16) -> Self {
        let [lo, hi] = value.to_le_bytes();
        Self::new(command, param1, lo, hi)
    }

    /// The four payload bytes in transmission order.
    pub const fn payload(&self) -> [u8; PAYLOAD_LEN] {
        [self.command, self.param1, self.param2, self.param3]
    }

    /// XOR of the four payload bytes.
    pub fn checksum(&self) -> u8 {
        xor_checksum(&self.payload())
    }

    /// Encodes the packet as it appears on the wire.
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        [
            self.command,
            self.param1,
            self.param2,
            self.param3,
            self.checksum(),
        ]
    }

    /// Decodes a wire frame, returning `None` if the checksum does not match.
    pub fn from_bytes(bytes: &[u8; PACKET_LEN]) -> Option<Self> {
        let packet = Self::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        (packet.checksum() == bytes[4]).then_some(packet)
    }

    /// The 7-bit command code, without the acknowledge bit.
    pub const fn command_code(&self) -> u8 {
        self.command & COMMAND_CODE_MASK
    }

    /// Whether the acknowledge bit is set.
    pub const fn ack_requested(&self) -> bool {
        self.command & PACKET_ACK_MASK != 0
    }

    /// A copy of this packet with the acknowledge bit set.
    pub const fn with_ack(self) -> Self {
        Self {
            command: self.command | PACKET_ACK_MASK,
            ..self
        }
    }

    /// A copy of this packet with the acknowledge bit cleared.
    pub const fn without_ack(self) -> Self {
        Self {
            command: self.command & !PACKET_ACK_MASK,
            ..self
        }
    }

    /// `param2` and `param3` read as one little-endian 16-bit value.
    pub const fn param23(&self) -> u16 {
        u16::from_le_bytes([self.param2, self.param3])
    }
}

/// The receiver's sliding window over the byte stream.
///
/// Holds up to the five most recent bytes, oldest first. Once full, each new
/// byte pushes the oldest one out. The window is only tested when it holds
/// five bytes, and it is emptied after every match.
#[derive(Debug, Clone, Default)]
pub struct AssemblyWindow {
    bytes: [u8; PACKET_LEN],
    len: usize,
}

impl AssemblyWindow {
    /// Creates an empty window.
    pub const fn new() -> Self {
        Self {
            bytes: [0; PACKET_LEN],
            len: 0,
        }
    }

    /// Number of bytes currently held.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no bytes are held.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forgets any partially assembled frame.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Slides `byte` into the window.
    ///
    /// # Returns
    /// - the packet, if the window now holds a checksum-valid frame
    /// - whether a stale byte fell out of the window to make room
    pub fn push(&mut self, byte: u8) -> (Option<Packet>, bool) {
        let evicted = self.len == PACKET_LEN;
        if evicted {
            self.bytes.copy_within(1.., 0);
            self.bytes[PACKET_LEN - 1] = byte;
        } else {
            self.bytes[self.len] = byte;
            self.len += 1;
        }

        if self.len < PACKET_LEN {
            return (None, evicted);
        }
        match Packet::from_bytes(&self.bytes) {
            Some(packet) => {
                self.len = 0;
                (Some(packet), evicted)
            }
            None => (None, evicted),
        }
    }
}

/// A byte source and sink the framing layer runs on top of.
///
/// Implemented by [`SerialTransport`](crate::uart::SerialTransport) and by
/// [`ChannelIo`]. The `try_*` methods report a momentarily full or empty
/// path as [`nb::Error::WouldBlock`]; the async methods suspend instead.
pub trait ByteIo {
    /// Takes the next inbound byte.
    fn read_byte(&self) -> nb::Result<u8, Infallible>;

    /// Queues one outbound byte.
    fn write_byte(&self, byte: u8) -> nb::Result<(), Infallible>;

    /// Takes the next inbound byte, suspending until one arrives.
    fn read(&self) -> impl Future<Output = u8>;

    /// Queues one outbound byte, suspending until there is room.
    fn write(&self, byte: u8) -> impl Future<Output = ()>;
}

impl<T: ByteIo + ?Sized> ByteIo for &T {
    fn read_byte(&self) -> nb::Result<u8, Infallible> {
        (**self).read_byte()
    }

    fn write_byte(&self, byte: u8) -> nb::Result<(), Infallible> {
        (**self).write_byte(byte)
    }

    fn read(&self) -> impl Future<Output = u8> {
        (**self).read()
    }

    fn write(&self, byte: u8) -> impl Future<Output = ()> {
        (**self).write(byte)
    }
}

/// [`ByteIo`] over a pair of bare channels, with no hardware behind them.
///
/// Useful for loopback links and for feeding recorded byte streams into a
/// [`PacketLink`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelIo<'a, const N: usize> {
    inbound: &'a ByteChannel<N>,
    outbound: &'a ByteChannel<N>,
}

impl<'a, const N: usize> ChannelIo<'a, N> {
    /// Reads from `inbound` and writes to `outbound`.
    pub const fn new(inbound: &'a ByteChannel<N>, outbound: &'a ByteChannel<N>) -> Self {
        Self { inbound, outbound }
    }
}

impl<const N: usize> ByteIo for ChannelIo<'_, N> {
    fn read_byte(&self) -> nb::Result<u8, Infallible> {
        self.inbound.try_get()
    }

    fn write_byte(&self, byte: u8) -> nb::Result<(), Infallible> {
        self.outbound.try_put(byte)
    }

    fn read(&self) -> impl Future<Output = u8> {
        self.inbound.get_async()
    }

    fn write(&self, byte: u8) -> impl Future<Output = ()> {
        self.outbound.put_async(byte)
    }
}

/// Packet-level endpoint of a serial link.
///
/// Owns the assembly window and hands complete packets out by value, so the
/// caller never shares mutable packet state with the receive path.
///
/// # Example
///
/// ```rust
/// use towerlink::fifo::ByteChannel;
/// use towerlink::packet::{ChannelIo, Packet, PacketLink};
///
/// let inbound: ByteChannel<16> = ByteChannel::new();
/// let outbound: ByteChannel<16> = ByteChannel::new();
/// let mut link = PacketLink::new(ChannelIo::new(&inbound, &outbound));
///
/// for b in [0xff, 0xaa, 0x01, 0x02, 0x03, 0xaa] {
///     inbound.put(b);
/// }
/// assert_eq!(link.get(), Packet::new(0xaa, 0x01, 0x02, 0x03));
/// assert_eq!(link.bytes_discarded(), 1);
/// ```
#[derive(Debug)]
pub struct PacketLink<IO> {
    io: IO,
    window: AssemblyWindow,
    packets_received: u16,
    bytes_discarded: u16,
}

impl<IO: ByteIo> PacketLink<IO> {
    /// Wraps a byte path with an empty assembly window.
    pub const fn new(io: IO) -> Self {
        Self {
            io,
            window: AssemblyWindow::new(),
            packets_received: 0,
            bytes_discarded: 0,
        }
    }

    /// The underlying byte path.
    pub fn io(&self) -> &IO {
        &self.io
    }

    /// Releases the underlying byte path.
    pub fn into_inner(self) -> IO {
        self.io
    }

    /// Number of checksum-valid packets delivered so far (wrapping).
    pub fn packets_received(&self) -> u16 {
        self.packets_received
    }

    /// Number of bytes slid out of the window without forming a packet (wrapping).
    pub fn bytes_discarded(&self) -> u16 {
        self.bytes_discarded
    }

    fn accept(&mut self, byte: u8) -> Option<Packet> {
        let (packet, evicted) = self.window.push(byte);
        if evicted {
            self.bytes_discarded = self.bytes_discarded.wrapping_add(1);
            debug!("resync: window slid past a stale byte");
        }
        let packet = packet?;
        self.packets_received = self.packets_received.wrapping_add(1);
        debug!("packet received, command {}", packet.command);
        Some(packet)
    }

    /// Consumes available inbound bytes until a packet is assembled.
    ///
    /// # Returns
    /// - `Ok(packet)`: a checksum-valid packet
    /// - `Err(WouldBlock)`: the inbound path ran dry first; the partial
    ///   window is kept for the next call
    pub fn try_get(&mut self) -> nb::Result<Packet, Infallible> {
        loop {
            let byte = self.io.read_byte()?;
            if let Some(packet) = self.accept(byte) {
                return Ok(packet);
            }
        }
    }

    /// Consumes inbound bytes until a packet is assembled, suspending
    /// whenever the inbound path is empty.
    pub async fn get_async(&mut self) -> Packet {
        loop {
            let byte = self.io.read().await;
            if let Some(packet) = self.accept(byte) {
                return packet;
            }
        }
    }

    /// Sends `packet` followed by its checksum, suspending for room as needed.
    pub async fn put_async(&mut self, packet: Packet) {
        for byte in packet.to_bytes() {
            self.io.write(byte).await;
        }
    }

    /// Parks the calling thread until the next packet arrives.
    #[cfg(feature = "std")]
    pub fn get(&mut self) -> Packet {
        block_on_thread(self.get_async())
    }

    /// Sends `packet`, parking the calling thread while the outbound path is full.
    #[cfg(feature = "std")]
    pub fn put(&mut self, packet: Packet) {
        block_on_thread(self.put_async(packet))
    }
}
