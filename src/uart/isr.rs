//! Entry points for a transport living in a `static`.
//!
//! These take `&'static` references so they can be handed directly to an
//! interrupt vector or an RTOS thread-creation call.

use super::{SerialPeripheral, SerialTransport};
use crate::wait::{Park, block_on};

/// Services one UART interrupt.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn UART2_RX_TX() {
///     towerlink::uart::global_serial_isr(&SERIAL_TRANSPORT);
/// }
/// ```
pub fn global_serial_isr<P: SerialPeripheral, const N: usize>(
    transport: &'static SerialTransport<P, N>,
) {
    transport.on_interrupt();
}

/// RX worker thread entry. Never returns.
///
/// The thread is parked through `W` between bytes. Run it at a higher
/// priority than any consumer of the inbound channel so the one-byte
/// hand-off is drained promptly.
pub fn run_rx_worker<W: Park, P: SerialPeripheral, const N: usize>(
    transport: &'static SerialTransport<P, N>,
) -> ! {
    loop {
        block_on::<W, _>(transport.service_rx_async());
    }
}

/// TX worker thread entry. Never returns.
pub fn run_tx_worker<W: Park, P: SerialPeripheral, const N: usize>(
    transport: &'static SerialTransport<P, N>,
) -> ! {
    loop {
        block_on::<W, _>(transport.service_tx_async());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Packet, PacketLink};
    use crate::uart::mock::MockUart;
    use crate::uart::{SerialConfig, TxState};
    use crate::wait::test_park::StdPark;
    use std::thread;

    crate::init_serial_transport!(MockUart, MockUart::new(), 16);

    #[test]
    fn test_parked_workers_drive_static_transport() {
        SERIAL_TRANSPORT
            .init(&SerialConfig::new(48_000_000).with_baud_rate(38_400))
            .unwrap();
        let request = Packet::new(0x0a, 1, 0, 0);
        SERIAL_TRANSPORT.with_peripheral(|uart| uart.inject(&request.to_bytes()));

        thread::scope(|s| {
            // Each worker pass moves exactly one byte.
            let rx = s.spawn(|| {
                for _ in 0..5 {
                    block_on::<StdPark, _>(SERIAL_TRANSPORT.service_rx_async());
                }
            });
            let tx = s.spawn(|| {
                for _ in 0..5 {
                    block_on::<StdPark, _>(SERIAL_TRANSPORT.service_tx_async());
                }
            });
            let hardware = s.spawn(|| {
                while SERIAL_TRANSPORT.with_peripheral(|uart| uart.sent.len()) < 5 {
                    SERIAL_TRANSPORT.with_peripheral(|uart| uart.complete_tx());
                    crate::serial_isr!();
                    thread::yield_now();
                }
            });

            let mut link = PacketLink::new(&SERIAL_TRANSPORT);
            let received = block_on::<StdPark, _>(link.get_async());
            assert_eq!(received, request);
            block_on::<StdPark, _>(link.put_async(Packet::new(0x0a, 1, 0, 0)));

            rx.join().unwrap();
            tx.join().unwrap();
            hardware.join().unwrap();
        });

        SERIAL_TRANSPORT.with_peripheral(|uart| {
            assert_eq!(uart.sent, request.to_bytes());
        });
        global_serial_isr(&SERIAL_TRANSPORT);
        assert_eq!(SERIAL_TRANSPORT.tx_state(), TxState::Disabled);
        assert!(SERIAL_TRANSPORT.outbound().is_empty());
        assert!(SERIAL_TRANSPORT.inbound().is_empty());
    }
}
