//! Interrupt-driven (or polled) UART transport between hardware registers
//! and a pair of [`ByteChannel`]s.
//!
//! The hardware is reached through the [`SerialPeripheral`] trait, so the
//! same transport drives a real register block, a simulator or a test mock.
//!
//! ## Interrupt strategy ([`TransportMode::Interrupt`])
//!
//! - **RX**: [`on_interrupt`](SerialTransport::on_interrupt) reads exactly
//!   one byte into a single-slot hand-off and wakes the RX worker
//!   ([`service_rx_async`](SerialTransport::service_rx_async)), which moves
//!   it into the inbound channel, suspending while the channel is full. If a
//!   second byte arrives before the slot is drained, the ISR masks the RX
//!   interrupt and leaves the byte in the data register; the worker unmasks
//!   it once the slot is free again.
//! - **TX**: [`out_char_async`](SerialTransport::out_char_async) queues a
//!   byte and enables the transmit-ready interrupt. The ISR masks it again
//!   and wakes the TX worker
//!   ([`service_tx_async`](SerialTransport::service_tx_async)), which writes
//!   one byte and re-enables the interrupt only while bytes remain queued.
//!
//! The ISR never touches a channel and never waits. Workers suspend on
//! [`embassy_sync::signal::Signal`]s raised by the ISR; run them as async
//! tasks ([`rx_task`](SerialTransport::rx_task),
//! [`tx_task`](SerialTransport::tx_task)) or as kernel threads through
//! [`crate::wait::block_on`].
//!
//! ## Polled strategy ([`TransportMode::Polled`])
//!
//! [`poll`](SerialTransport::poll) checks both status flags and moves at
//! most one byte in each direction. It does nothing on a transport
//! initialised for interrupts. See [`poll`](crate::uart::poll) for a
//! delay-driven loop.
//!
//! ## Baud rate generation
//!
//! The module clock is divided by `16 * baud`. The integer part goes in the
//! 13-bit `SBR` field and the remainder, in 1/32 steps, in the 5-bit `BRFA`
//! field:
//!
//! | Module clock | Baud    | SBR | BRFA |
//! |--------------|---------|-----|------|
//! | 20.97152 MHz | 115200  |  11 |   12 |
//! | 50 MHz       | 115200  |  27 |    4 |
//! | 48 MHz       | 9600    | 312 |   16 |

use core::cell::RefCell;
use core::convert::Infallible;
use core::fmt;

use critical_section::Mutex;
use embassy_sync::signal::Signal;

use crate::consts::{
    DEFAULT_BAUD_RATE, FIFO_SIZE, TX_READY_POLL_LIMIT, UART_BRFA_STEPS, UART_SAMPLE_RATE,
    UART_SBR_MAX,
};
use crate::error::Error;
use crate::fifo::{ByteChannel, Wake};
use crate::packet::ByteIo;
#[cfg(feature = "std")]
use crate::wait::block_on_thread;

#[cfg(feature = "isr")]
mod isr;
#[cfg_attr(feature = "isr", allow(unused_imports))]
#[cfg(feature = "isr")]
pub use isr::*;

#[cfg(feature = "isr")]
mod macros;

#[cfg(feature = "delay-loop")]
pub mod poll;

/// Register-level access to one byte-oriented serial peripheral.
///
/// Implementations map each method onto the device's status, control and
/// data registers. Methods take `&mut self` and are always called inside a
/// critical section.
pub trait SerialPeripheral {
    /// Programs the baud rate generator and enables transmitter and receiver.
    fn configure(&mut self, divisor: BaudDivisor);

    /// "Receiver has data" status flag.
    fn rx_ready(&mut self) -> bool;

    /// "Transmitter ready" (data register empty) status flag.
    fn tx_ready(&mut self) -> bool;

    /// Reads the data register, which also clears the receive-ready condition.
    fn read_data(&mut self) -> u8;

    /// Writes the data register, which starts transmission and clears the
    /// transmit-ready condition.
    fn write_data(&mut self, byte: u8);

    /// Masks or unmasks the receive-ready interrupt.
    fn set_rx_interrupt(&mut self, enabled: bool);

    /// Masks or unmasks the transmit-ready interrupt.
    fn set_tx_interrupt(&mut self, enabled: bool);
}

/// Baud rate generator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct BaudDivisor {
    /// Integer divisor, 13 bits.
    pub sbr: u16,
    /// Fine adjust in 1/32 steps, 5 bits.
    pub brfa: u8,
}

/// Computes the baud rate divisor for `baud_rate` from a `module_clock_hz` clock.
///
/// # Errors
/// - [`Error::ZeroBaudRate`] for a zero baud rate
/// - [`Error::UnreachableBaudRate`] if the integer divisor is zero or
///   does not fit in 13 bits
pub fn compute_baud_divisor(module_clock_hz: u32, baud_rate: u32) -> Result<BaudDivisor, Error> {
    if baud_rate == 0 {
        return Err(Error::ZeroBaudRate);
    }
    let unreachable = Error::UnreachableBaudRate {
        clock_hz: module_clock_hz,
        baud_rate,
    };
    let divisor = u64::from(baud_rate) * u64::from(UART_SAMPLE_RATE);
    let sbr = u64::from(module_clock_hz) / divisor;
    if sbr == 0 || sbr > u64::from(UART_SBR_MAX) {
        return Err(unreachable);
    }
    let brfa = (u64::from(module_clock_hz) % divisor) * u64::from(UART_BRFA_STEPS) / divisor;
    Ok(BaudDivisor {
        sbr: u16::try_from(sbr).map_err(|_| unreachable)?,
        brfa: u8::try_from(brfa).map_err(|_| unreachable)?,
    })
}

/// Compile-time baud rate divisor calculator.
///
/// Same arithmetic as [`compute_baud_divisor`]; an unreachable rate fails
/// const evaluation instead of returning an error.
///
/// ```rust
/// use towerlink::uart::{BaudDivisor, const_baud_divisor};
///
/// const DIVISOR: BaudDivisor = const_baud_divisor(50_000_000, 115_200);
/// assert_eq!(DIVISOR, BaudDivisor { sbr: 27, brfa: 4 });
/// ```
pub const fn const_baud_divisor(module_clock_hz: u32, baud_rate: u32) -> BaudDivisor {
    assert!(baud_rate != 0, "baud rate must be non-zero");
    let divisor = baud_rate as u64 * UART_SAMPLE_RATE as u64;
    let sbr = module_clock_hz as u64 / divisor;
    assert!(
        sbr != 0 && sbr <= UART_SBR_MAX as u64,
        "baud rate out of range for this clock"
    );
    let brfa = (module_clock_hz as u64 % divisor) * UART_BRFA_STEPS as u64 / divisor;
    BaudDivisor {
        sbr: sbr as u16,
        brfa: brfa as u8,
    }
}

/// How bytes are moved between the peripheral and the channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TransportMode {
    /// RX/TX interrupts plus worker threads.
    #[default]
    Interrupt,
    /// Periodic calls to [`SerialTransport::poll`]; interrupts stay masked.
    Polled,
}

/// Line configuration passed to [`SerialTransport::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SerialConfig {
    /// Line rate in bits per second.
    pub baud_rate: u32,
    /// Clock feeding the UART module, in Hz.
    pub module_clock_hz: u32,
    /// Scheduling strategy.
    pub mode: TransportMode,
}

impl SerialConfig {
    /// Interrupt-driven configuration at [`DEFAULT_BAUD_RATE`].
    pub const fn new(module_clock_hz: u32) -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            module_clock_hz,
            mode: TransportMode::Interrupt,
        }
    }

    /// Replaces the line rate.
    pub const fn with_baud_rate(self, baud_rate: u32) -> Self {
        Self { baud_rate, ..self }
    }

    /// Replaces the scheduling strategy.
    pub const fn with_mode(self, mode: TransportMode) -> Self {
        Self { mode, ..self }
    }
}

/// State of the transmit-ready interrupt.
///
/// `Disabled -> Enabled` when a byte is queued with [`SerialTransport::out_char`];
/// `Enabled -> Disabled` when the interrupt fires and the TX worker finds
/// nothing left to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TxState {
    /// Transmit-ready interrupt masked; nothing queued, or a byte is being handed over.
    #[default]
    Disabled,
    /// Transmit-ready interrupt unmasked; the ISR will wake the TX worker.
    Enabled,
}

#[derive(Debug)]
struct Inner<P> {
    uart: P,
    mode: TransportMode,
    initialised: bool,
    /// Byte captured by the ISR, waiting for the RX worker.
    rx_slot: Option<u8>,
    rx_irq: bool,
    /// Set by the ISR when the transmitter became ready.
    tx_signal: bool,
    tx_state: TxState,
    rx_stalls: u16,
}

impl<P: SerialPeripheral> Inner<P> {
    fn set_rx_irq(&mut self, enabled: bool) {
        if self.rx_irq != enabled {
            self.rx_irq = enabled;
            self.uart.set_rx_interrupt(enabled);
        }
    }

    fn set_tx_state(&mut self, state: TxState) {
        if self.tx_state != state {
            self.tx_state = state;
            self.uart.set_tx_interrupt(state == TxState::Enabled);
        }
    }

    /// Bounded wait on the transmit-ready flag.
    fn wait_tx_ready(&mut self) -> bool {
        (0..TX_READY_POLL_LIMIT).any(|_| self.uart.tx_ready())
    }
}

/// A UART bridged to an inbound and an outbound [`ByteChannel`].
///
/// All methods take `&self`; the transport is meant to live in a `static`
/// shared by the interrupt handler and the worker threads (see
/// [`init_serial_transport!`](crate::init_serial_transport)).
///
/// # Example
///
/// ```rust
/// use towerlink::uart::{BaudDivisor, SerialConfig, SerialPeripheral, SerialTransport};
///
/// struct Loopback(Option<u8>);
///
/// impl SerialPeripheral for Loopback {
///     fn configure(&mut self, _divisor: BaudDivisor) {}
///     fn rx_ready(&mut self) -> bool { self.0.is_some() }
///     fn tx_ready(&mut self) -> bool { self.0.is_none() }
///     fn read_data(&mut self) -> u8 { self.0.take().unwrap_or(0) }
///     fn write_data(&mut self, byte: u8) { self.0 = Some(byte) }
///     fn set_rx_interrupt(&mut self, _enabled: bool) {}
///     fn set_tx_interrupt(&mut self, _enabled: bool) {}
/// }
///
/// static UART: SerialTransport<Loopback, 16> = SerialTransport::new(Loopback(None));
///
/// UART.init(&SerialConfig::new(50_000_000)).unwrap();
/// UART.out_char(0x42);
/// UART.on_interrupt(); // transmitter ready
/// UART.service_tx();   // byte written to the data register
/// UART.on_interrupt(); // receiver has data
/// UART.service_rx();   // byte moved to the inbound channel
/// assert_eq!(UART.in_char(), 0x42);
/// ```
pub struct SerialTransport<P, const N: usize = FIFO_SIZE> {
    inner: Mutex<RefCell<Inner<P>>>,
    rx: ByteChannel<N>,
    tx: ByteChannel<N>,
    /// Raised by the ISR when a byte lands in the RX slot.
    rx_wake: Wake,
    /// Raised by the ISR when the transmitter became ready.
    tx_wake: Wake,
}

impl<P, const N: usize> SerialTransport<P, N> {
    /// Wraps `uart`. Nothing is touched until [`init`](Self::init).
    pub const fn new(uart: P) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                uart,
                mode: TransportMode::Interrupt,
                initialised: false,
                rx_slot: None,
                rx_irq: false,
                tx_signal: false,
                tx_state: TxState::Disabled,
                rx_stalls: 0,
            })),
            rx: ByteChannel::new(),
            tx: ByteChannel::new(),
            rx_wake: Signal::new(),
            tx_wake: Signal::new(),
        }
    }

    /// Channel holding received bytes.
    pub fn inbound(&self) -> &ByteChannel<N> {
        &self.rx
    }

    /// Channel holding bytes waiting to be transmitted.
    pub fn outbound(&self) -> &ByteChannel<N> {
        &self.tx
    }
}

impl<P: SerialPeripheral, const N: usize> SerialTransport<P, N> {
    /// Programs the baud rate and arms the receive path.
    ///
    /// In [`TransportMode::Interrupt`] the RX interrupt is unmasked; it stays
    /// unmasked for the life of the transport except while back-pressure
    /// holds a byte in the data register. Bytes queued before `init` arm the
    /// transmit interrupt here.
    pub fn init(&self, config: &SerialConfig) -> Result<(), Error> {
        let divisor = compute_baud_divisor(config.module_clock_hz, config.baud_rate)?;
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.uart.configure(divisor);
            inner.mode = config.mode;
            inner.rx_slot = None;
            inner.tx_signal = false;
            inner.set_tx_state(TxState::Disabled);
            inner.set_rx_irq(config.mode == TransportMode::Interrupt);
            if config.mode == TransportMode::Interrupt && !self.tx.is_empty() {
                inner.set_tx_state(TxState::Enabled);
            }
            inner.initialised = true;
        });
        debug!(
            "uart ready: sbr {} brfa {} baud {}",
            divisor.sbr, divisor.brfa, config.baud_rate
        );
        Ok(())
    }

    /// Interrupt handler body. Call it from the UART's vector.
    ///
    /// Handles at most one event per call, receive first. Never waits.
    pub fn on_interrupt(&self) {
        let stalled = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if !inner.initialised {
                return false;
            }
            if inner.rx_irq && inner.uart.rx_ready() {
                if inner.rx_slot.is_none() {
                    inner.rx_slot = Some(inner.uart.read_data());
                    self.rx_wake.signal(());
                    false
                } else {
                    inner.set_rx_irq(false);
                    inner.rx_stalls = inner.rx_stalls.wrapping_add(1);
                    true
                }
            } else {
                if inner.tx_state == TxState::Enabled && inner.uart.tx_ready() {
                    inner.set_tx_state(TxState::Disabled);
                    inner.tx_signal = true;
                    self.tx_wake.signal(());
                }
                false
            }
        });
        if stalled {
            warn!("rx paused: previous byte not yet delivered");
        }
    }

    /// RX worker step: moves the captured byte into the inbound channel.
    ///
    /// # Returns
    /// - `Ok(())`: one byte delivered and the RX interrupt re-armed
    /// - `Err(WouldBlock)`: no byte captured, or the inbound channel is full
    pub fn try_service_rx(&self) -> nb::Result<(), Infallible> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let byte = inner.rx_slot.ok_or(nb::Error::WouldBlock)?;
            self.rx.try_put(byte)?;
            inner.rx_slot = None;
            if inner.mode == TransportMode::Interrupt {
                inner.set_rx_irq(true);
            }
            Ok(())
        })
    }

    /// Suspends until a captured byte has been delivered; see
    /// [`try_service_rx`](Self::try_service_rx).
    pub async fn service_rx_async(&self) {
        while self.try_service_rx().is_err() {
            let (captured, full) = critical_section::with(|cs| {
                (self.inner.borrow_ref(cs).rx_slot.is_some(), self.rx.is_full())
            });
            match (captured, full) {
                (false, _) => self.rx_wake.wait().await,
                (true, true) => self.rx.space_freed().await,
                // A get freed room after the failed attempt.
                (true, false) => {}
            }
        }
    }

    /// Parks the calling thread until a captured byte has been delivered.
    #[cfg(feature = "std")]
    pub fn service_rx(&self) {
        block_on_thread(self.service_rx_async())
    }

    /// TX worker step: hands one queued byte to the transmitter.
    ///
    /// # Returns
    /// - `Ok(())`: the ISR's signal was consumed; a byte was written if one
    ///   was queued, and the interrupt re-armed if more remain
    /// - `Err(WouldBlock)`: no signal pending, or the transmitter did not
    ///   report ready within [`TX_READY_POLL_LIMIT`] reads, in which case
    ///   the interrupt is re-armed to signal again once it is
    pub fn try_service_tx(&self) -> nb::Result<(), Infallible> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if !inner.tx_signal {
                return Err(nb::Error::WouldBlock);
            }
            if self.tx.is_empty() {
                // Drained: stay disabled until the next out_char.
                inner.tx_signal = false;
                return Ok(());
            }
            if !inner.wait_tx_ready() {
                inner.tx_signal = false;
                inner.set_tx_state(TxState::Enabled);
                return Err(nb::Error::WouldBlock);
            }
            let byte = self.tx.try_get()?;
            inner.uart.write_data(byte);
            inner.tx_signal = false;
            if !self.tx.is_empty() {
                inner.set_tx_state(TxState::Enabled);
            }
            Ok(())
        })
    }

    /// Suspends until the transmitter has been serviced; see
    /// [`try_service_tx`](Self::try_service_tx).
    pub async fn service_tx_async(&self) {
        while self.try_service_tx().is_err() {
            self.tx_wake.wait().await;
        }
    }

    /// Parks the calling thread until the transmitter has been serviced.
    #[cfg(feature = "std")]
    pub fn service_tx(&self) {
        block_on_thread(self.service_tx_async())
    }

    /// Polled strategy: moves at most one byte in each direction.
    ///
    /// A received byte is left in the data register while the inbound
    /// channel is full. Does nothing unless the transport was initialised
    /// in [`TransportMode::Polled`].
    pub fn poll(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if !inner.initialised || inner.mode != TransportMode::Polled {
                return;
            }
            if inner.uart.rx_ready() && !self.rx.is_full() {
                let byte = inner.uart.read_data();
                // Cannot fail: fullness was checked under the same critical section.
                let _ = self.rx.try_put(byte);
            }
            if inner.uart.tx_ready() {
                if let Ok(byte) = self.tx.try_get() {
                    inner.uart.write_data(byte);
                }
            }
        })
    }

    /// Takes a received byte if one is available.
    pub fn try_in_char(&self) -> nb::Result<u8, Infallible> {
        self.rx.try_get()
    }

    /// Takes the next received byte, suspending until one arrives.
    pub async fn in_char_async(&self) -> u8 {
        self.rx.get_async().await
    }

    /// Parks the calling thread until a received byte is available.
    #[cfg(feature = "std")]
    pub fn in_char(&self) -> u8 {
        self.rx.get()
    }

    fn arm_tx(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.initialised && inner.mode == TransportMode::Interrupt && !inner.tx_signal {
                inner.set_tx_state(TxState::Enabled);
            }
        });
    }

    /// Queues `byte` for transmission if the outbound channel has room.
    pub fn try_out_char(&self, byte: u8) -> nb::Result<(), Infallible> {
        self.tx.try_put(byte)?;
        self.arm_tx();
        Ok(())
    }

    /// Queues `byte` for transmission, suspending while the outbound channel is full.
    pub async fn out_char_async(&self, byte: u8) {
        self.tx.put_async(byte).await;
        self.arm_tx();
    }

    /// Parks the calling thread until `byte` is queued for transmission.
    #[cfg(feature = "std")]
    pub fn out_char(&self, byte: u8) {
        block_on_thread(self.out_char_async(byte))
    }

    /// Current transmit interrupt state.
    pub fn tx_state(&self) -> TxState {
        critical_section::with(|cs| self.inner.borrow_ref(cs).tx_state)
    }

    /// Whether the RX interrupt is currently masked by back-pressure
    /// (always `false` in polled mode).
    pub fn rx_paused(&self) -> bool {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            inner.initialised && inner.mode == TransportMode::Interrupt && !inner.rx_irq
        })
    }

    /// Number of times the ISR had to pause reception (wrapping).
    pub fn rx_stalls(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).rx_stalls)
    }

    /// Runs `f` with exclusive access to the peripheral.
    pub fn with_peripheral<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs).uart))
    }

    /// RX worker task body. Never completes.
    pub async fn rx_task(&self) {
        loop {
            self.service_rx_async().await;
        }
    }

    /// TX worker task body. Never completes.
    pub async fn tx_task(&self) {
        loop {
            self.service_tx_async().await;
        }
    }

    /// RX worker body for an OS thread.
    #[cfg(feature = "std")]
    pub fn rx_worker(&self) -> ! {
        loop {
            self.service_rx();
        }
    }

    /// TX worker body for an OS thread.
    #[cfg(feature = "std")]
    pub fn tx_worker(&self) -> ! {
        loop {
            self.service_tx();
        }
    }
}

impl<P: SerialPeripheral, const N: usize> ByteIo for SerialTransport<P, N> {
    fn read_byte(&self) -> nb::Result<u8, Infallible> {
        self.try_in_char()
    }

    fn write_byte(&self, byte: u8) -> nb::Result<(), Infallible> {
        self.try_out_char(byte)
    }

    fn read(&self) -> impl Future<Output = u8> {
        self.in_char_async()
    }

    fn write(&self, byte: u8) -> impl Future<Output = ()> {
        self.out_char_async(byte)
    }
}

impl<P, const N: usize> fmt::Debug for SerialTransport<P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (mode, tx_state, rx_stalls) = critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            (inner.mode, inner.tx_state, inner.rx_stalls)
        });
        f.debug_struct("SerialTransport")
            .field("mode", &mode)
            .field("tx_state", &tx_state)
            .field("rx_stalls", &rx_stalls)
            .field("rx", &self.rx)
            .field("tx", &self.tx)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod mock;
