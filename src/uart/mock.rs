//! In-memory [`SerialPeripheral`] for unit tests.

use std::collections::VecDeque;

use super::{BaudDivisor, SerialPeripheral};

/// Models the receive shift register as a queue of pending bytes and the
/// transmit data register as a single slot that [`complete_tx`](Self::complete_tx)
/// shifts out onto `sent`.
#[derive(Debug)]
pub(crate) struct MockUart {
    pub(crate) divisor: Option<BaudDivisor>,
    pub(crate) rx_irq: bool,
    pub(crate) tx_irq: bool,
    /// Holds the transmitter busy even with an empty data register.
    pub(crate) busy: bool,
    pub(crate) sent: Vec<u8>,
    line_in: VecDeque<u8>,
    data_out: Option<u8>,
}

impl MockUart {
    pub(crate) const fn new() -> Self {
        Self {
            divisor: None,
            rx_irq: false,
            tx_irq: false,
            busy: false,
            sent: Vec::new(),
            line_in: VecDeque::new(),
            data_out: None,
        }
    }

    /// Bytes arriving on the line.
    pub(crate) fn inject(&mut self, bytes: &[u8]) {
        self.line_in.extend(bytes);
    }

    pub(crate) fn pending_rx(&self) -> usize {
        self.line_in.len()
    }

    /// Finishes shifting out the byte in the data register, if any.
    pub(crate) fn complete_tx(&mut self) {
        if let Some(byte) = self.data_out.take() {
            self.sent.push(byte);
        }
    }
}

impl SerialPeripheral for MockUart {
    fn configure(&mut self, divisor: BaudDivisor) {
        self.divisor = Some(divisor);
    }

    fn rx_ready(&mut self) -> bool {
        !self.line_in.is_empty()
    }

    fn tx_ready(&mut self) -> bool {
        !self.busy && self.data_out.is_none()
    }

    fn read_data(&mut self) -> u8 {
        self.line_in.pop_front().unwrap_or(0)
    }

    fn write_data(&mut self, byte: u8) {
        assert!(self.data_out.is_none(), "data register overwritten");
        self.data_out = Some(byte);
    }

    fn set_rx_interrupt(&mut self, enabled: bool) {
        self.rx_irq = enabled;
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.tx_irq = enabled;
    }
}
