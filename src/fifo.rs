//! Bounded byte channel shared between interrupt and worker contexts.
//!
//! [`ByteChannel`] is a fixed-capacity ring buffer of bytes. It is the single
//! hand-off point between the serial interrupt and the threads that consume
//! or produce bytes, in both the receive and transmit directions.
//!
//! ## Semantics
//!
//! - [`try_put`](ByteChannel::try_put) / [`try_get`](ByteChannel::try_get)
//!   never block. A full or empty channel yields [`nb::Error::WouldBlock`].
//!   Both are safe from interrupt context.
//! - [`put_async`](ByteChannel::put_async) / [`get_async`](ByteChannel::get_async)
//!   suspend until the channel can make progress. A successful `try_get`
//!   wakes a waiting producer and a successful `try_put` wakes a waiting
//!   consumer. Drive them from an executor or with [`crate::wait::block_on`].
//! - With `std`, [`put`](ByteChannel::put) / [`get`](ByteChannel::get) park
//!   the calling thread, and `put_timeout` / `get_timeout` bound the wait.
//! - Nothing is ever overwritten or dropped. A full channel is back-pressure.
//!
//! Each direction supports one waiting producer and one waiting consumer.
//! The indices and the used count are only touched inside
//! `critical_section::with`, and no critical section is held while waiting.

use core::cell::RefCell;
use core::convert::Infallible;
use core::fmt;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::consts::FIFO_SIZE;
#[cfg(feature = "std")]
use crate::error::Error;

/// Wake-up flag raised from interrupt or thread context.
pub(crate) type Wake = Signal<CriticalSectionRawMutex, ()>;

#[derive(Debug)]
struct Ring<const N: usize> {
    /// Index of the oldest unread byte.
    start: usize,
    /// Index of the next free slot.
    end: usize,
    used: usize,
    buf: [u8; N],
}

impl<const N: usize> Ring<N> {
    const MASK: usize = N - 1;

    const fn new() -> Self {
        Self {
            start: 0,
            end: 0,
            used: 0,
            buf: [0; N],
        }
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.used == N {
            return false;
        }
        self.buf[self.end] = byte;
        self.end = (self.end + 1) & Self::MASK;
        self.used += 1;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.used == 0 {
            return None;
        }
        let byte = self.buf[self.start];
        self.start = (self.start + 1) & Self::MASK;
        self.used -= 1;
        Some(byte)
    }
}

/// A fixed-capacity FIFO of bytes with non-blocking and suspending access.
///
/// `N` must be a power of two; this is checked at compile time.
///
/// # Example
///
/// ```rust
/// use towerlink::fifo::ByteChannel;
///
/// static CHANNEL: ByteChannel<16> = ByteChannel::new();
///
/// CHANNEL.put(0x2a);
/// assert_eq!(CHANNEL.len(), 1);
/// assert_eq!(CHANNEL.get(), 0x2a);
/// assert!(CHANNEL.try_get().is_err());
/// ```
pub struct ByteChannel<const N: usize = FIFO_SIZE> {
    ring: Mutex<RefCell<Ring<N>>>,
    /// Raised by every successful put.
    data: Wake,
    /// Raised by every successful get.
    space: Wake,
}

impl<const N: usize> ByteChannel<N> {
    const CAPACITY_IS_POWER_OF_TWO: () = assert!(
        N.is_power_of_two(),
        "ByteChannel capacity must be a power of two"
    );

    /// Creates an empty channel.
    pub const fn new() -> Self {
        let () = Self::CAPACITY_IS_POWER_OF_TWO;
        Self {
            ring: Mutex::new(RefCell::new(Ring::new())),
            data: Signal::new(),
            space: Signal::new(),
        }
    }

    /// Total number of bytes the channel can hold.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes currently stored.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.ring.borrow_ref(cs).used)
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        N - self.len()
    }

    /// Returns `true` when no bytes are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Stores `byte` if there is room.
    ///
    /// # Returns
    /// - `Ok(())`: the byte was appended
    /// - `Err(WouldBlock)`: the channel is full and nothing changed
    ///
    /// Safe to call from interrupt context.
    pub fn try_put(&self, byte: u8) -> nb::Result<(), Infallible> {
        if critical_section::with(|cs| self.ring.borrow_ref_mut(cs).push(byte)) {
            self.data.signal(());
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Removes and returns the oldest byte if there is one.
    ///
    /// Safe to call from interrupt context.
    pub fn try_get(&self) -> nb::Result<u8, Infallible> {
        let byte = critical_section::with(|cs| self.ring.borrow_ref_mut(cs).pop())
            .ok_or(nb::Error::WouldBlock)?;
        self.space.signal(());
        Ok(byte)
    }

    /// Stores `byte`, suspending while the channel is full.
    pub async fn put_async(&self, byte: u8) {
        while self.try_put(byte).is_err() {
            self.space.wait().await;
        }
    }

    /// Removes the oldest byte, suspending while the channel is empty.
    pub async fn get_async(&self) -> u8 {
        loop {
            if let Ok(byte) = self.try_get() {
                return byte;
            }
            self.data.wait().await;
        }
    }

    /// Completes once a get has freed a slot since the last call.
    pub(crate) async fn space_freed(&self) {
        self.space.wait().await;
    }

    /// Stores `byte`, parking the calling thread while the channel is full.
    ///
    /// Never call this from an interrupt handler.
    #[cfg(feature = "std")]
    pub fn put(&self, byte: u8) {
        crate::wait::block_on_thread(self.put_async(byte))
    }

    /// Removes the oldest byte, parking the calling thread while the channel is empty.
    ///
    /// Never call this from an interrupt handler.
    #[cfg(feature = "std")]
    pub fn get(&self) -> u8 {
        crate::wait::block_on_thread(self.get_async())
    }

    /// Like [`put`](Self::put), but gives up after `timeout`.
    #[cfg(feature = "std")]
    pub fn put_timeout(&self, byte: u8, timeout: std::time::Duration) -> Result<(), Error> {
        crate::wait::block_on_thread_timeout(self.put_async(byte), timeout).ok_or(Error::Timeout)
    }

    /// Like [`get`](Self::get), but gives up after `timeout`.
    #[cfg(feature = "std")]
    pub fn get_timeout(&self, timeout: std::time::Duration) -> Result<u8, Error> {
        crate::wait::block_on_thread_timeout(self.get_async(), timeout).ok_or(Error::Timeout)
    }
}

impl<const N: usize> Default for ByteChannel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for ByteChannel<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteChannel")
            .field("capacity", &N)
            .field("used", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_channel_is_empty() {
        let channel: ByteChannel<8> = ByteChannel::new();
        assert_eq!(channel.capacity(), 8);
        assert_eq!(channel.len(), 0);
        assert_eq!(channel.available(), 8);
        assert!(channel.is_empty());
        assert!(!channel.is_full());
        assert_eq!(channel.try_get(), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn test_bytes_come_out_in_arrival_order() {
        let channel: ByteChannel<16> = ByteChannel::new();
        let input = [0x10, 0x00, 0xff, 0x7e, 0x80, 0x01];
        for &b in &input {
            channel.put(b);
        }
        let output: Vec<u8> = (0..input.len()).map(|_| channel.get()).collect();
        assert_eq!(output, input);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_full_channel_refuses_without_overwriting() {
        let channel: ByteChannel<4> = ByteChannel::new();
        for b in 1..=4 {
            assert_eq!(channel.try_put(b), Ok(()));
        }
        assert!(channel.is_full());
        assert_eq!(channel.try_put(5), Err(nb::Error::WouldBlock));
        assert_eq!(channel.len(), 4);
        assert_eq!(channel.get(), 1);
        assert_eq!(channel.try_put(5), Ok(()));
        assert_eq!([channel.get(), channel.get(), channel.get(), channel.get()], [2, 3, 4, 5]);
    }

    #[test]
    fn test_used_count_stays_within_bounds_across_wraparound() {
        let channel: ByteChannel<8> = ByteChannel::new();
        let mut expected = std::collections::VecDeque::new();
        // Deterministic interleaving of puts and gets that laps the ring several times.
        for step in 0u32..500 {
            let value = (step.wrapping_mul(37) & 0xff) as u8;
            if step % 3 == 2 {
                assert_eq!(channel.try_get().ok(), expected.pop_front());
            } else if channel.try_put(value).is_ok() {
                expected.push_back(value);
            } else {
                assert_eq!(expected.len(), 8);
            }
            assert!(channel.len() <= channel.capacity());
            assert_eq!(channel.len(), expected.len());
        }
        while let Some(b) = expected.pop_front() {
            assert_eq!(channel.get(), b);
        }
        assert!(channel.is_empty());
    }

    #[test]
    fn test_put_blocks_until_a_get_frees_a_slot() {
        let channel: ByteChannel<256> = ByteChannel::new();
        for i in 0..256u16 {
            channel.put(i as u8);
        }
        assert!(channel.is_full());

        thread::scope(|s| {
            let producer = s.spawn(|| channel.put(0xa5));
            thread::sleep(Duration::from_millis(50));
            assert!(!producer.is_finished());
            assert_eq!(channel.len(), 256);

            assert_eq!(channel.get(), 0);
            producer.join().unwrap();
        });

        assert!(channel.is_full());
        for i in 1..256u16 {
            assert_eq!(channel.get(), i as u8);
        }
        assert_eq!(channel.get(), 0xa5);
    }

    #[test]
    fn test_get_blocks_until_a_put_arrives() {
        let channel: ByteChannel<4> = ByteChannel::new();
        thread::scope(|s| {
            let consumer = s.spawn(|| channel.get());
            thread::sleep(Duration::from_millis(20));
            assert!(!consumer.is_finished());
            channel.put(0x42);
            assert_eq!(consumer.join().unwrap(), 0x42);
        });
    }

    #[test]
    fn test_timed_operations_report_timeout() {
        let channel: ByteChannel<2> = ByteChannel::new();
        assert_eq!(
            channel.get_timeout(Duration::from_millis(5)),
            Err(Error::Timeout)
        );
        channel.put(1);
        channel.put(2);
        assert_eq!(
            channel.put_timeout(3, Duration::from_millis(5)),
            Err(Error::Timeout)
        );
        assert_eq!(channel.get_timeout(Duration::from_millis(5)), Ok(1));
        assert_eq!(channel.put_timeout(3, Duration::from_millis(5)), Ok(()));
    }
}
