//! Delay-driven loop for [`TransportMode::Polled`](super::TransportMode::Polled).
//!
//! For boards without a usable UART interrupt: both status flags are checked
//! every `poll_us` microseconds. Pick `poll_us` shorter than one character
//! time (about 86 µs at 115200 baud) or received bytes will be overrun in
//! hardware.

use embedded_hal::delay::DelayNs;

use super::{SerialPeripheral, SerialTransport};

/// Polls the transport forever.
///
/// # Example
/// ```rust,ignore
/// SERIAL_TRANSPORT.init(&SerialConfig::new(CLOCK_HZ).with_mode(TransportMode::Polled))?;
/// towerlink::uart::poll::run_poll_loop(&SERIAL_TRANSPORT, &mut delay, 50);
/// ```
pub fn run_poll_loop<D: DelayNs, P: SerialPeripheral, const N: usize>(
    transport: &SerialTransport<P, N>,
    delay: &mut D,
    poll_us: u32,
) -> ! {
    loop {
        transport.poll();
        delay.delay_us(poll_us);
    }
}

/// Polls the transport `iterations` times, then returns.
///
/// Useful for interleaving polling with other work in a super-loop.
pub fn poll_for<D: DelayNs, P: SerialPeripheral, const N: usize>(
    transport: &SerialTransport<P, N>,
    delay: &mut D,
    poll_us: u32,
    iterations: usize,
) {
    for _ in 0..iterations {
        transport.poll();
        delay.delay_us(poll_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Packet, PacketLink};
    use crate::uart::mock::MockUart;
    use crate::uart::{SerialConfig, TransportMode};
    use embedded_hal_mock::eh1::delay::NoopDelay;

    #[test]
    fn test_poll_for_exchanges_a_packet() {
        let transport: SerialTransport<MockUart, 16> = SerialTransport::new(MockUart::new());
        let config = SerialConfig::new(20_971_520).with_mode(TransportMode::Polled);
        transport.init(&config).unwrap();

        let request = Packet::new(0x89, 0, 0, 0);
        transport.with_peripheral(|uart| uart.inject(&[0x55, 0xaa]));
        transport.with_peripheral(|uart| uart.inject(&request.to_bytes()));
        let mut delay = NoopDelay::new();
        poll_for(&transport, &mut delay, 50, 7);
        transport.with_peripheral(|uart| assert_eq!(uart.pending_rx(), 0));

        let mut link = PacketLink::new(&transport);
        assert_eq!(link.get(), request);
        assert_eq!(link.bytes_discarded(), 2);

        link.put(request.without_ack());
        for _ in 0..5 {
            poll_for(&transport, &mut delay, 50, 1);
            transport.with_peripheral(|uart| uart.complete_tx());
        }
        transport.with_peripheral(|uart| {
            assert_eq!(uart.sent, Packet::new(0x09, 0, 0, 0).to_bytes());
        });
    }
}
