/// Declares the global `SERIAL_TRANSPORT` shared by the UART interrupt and
/// its worker threads.
///
/// # Arguments
/// - `$uart`: the concrete [`SerialPeripheral`](crate::uart::SerialPeripheral) type
/// - `$init`: a const expression constructing it
/// - `$n` (optional): channel capacity, defaults to [`FIFO_SIZE`](crate::consts::FIFO_SIZE)
///
/// # Example
/// ```rust,ignore
/// towerlink::init_serial_transport!(Uart2, Uart2::steal());
///
/// fn main() {
///     SERIAL_TRANSPORT.init(&SerialConfig::new(CLOCK_HZ)).unwrap();
/// }
/// ```
#[macro_export]
macro_rules! init_serial_transport {
    ( $uart:ty, $init:expr ) => {
        /// UART transport shared by the interrupt handler and the worker threads.
        pub static SERIAL_TRANSPORT: $crate::uart::SerialTransport<$uart> =
            $crate::uart::SerialTransport::new($init);
    };
    ( $uart:ty, $init:expr, $n:expr ) => {
        /// UART transport shared by the interrupt handler and the worker threads.
        pub static SERIAL_TRANSPORT: $crate::uart::SerialTransport<$uart, { $n }> =
            $crate::uart::SerialTransport::new($init);
    };
}

/// Services one interrupt on the `SERIAL_TRANSPORT` declared by
/// [`init_serial_transport!`].
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn UART2_RX_TX() {
///     towerlink::serial_isr!();
/// }
/// ```
///
/// Does nothing until `SERIAL_TRANSPORT.init` has run.
#[macro_export]
macro_rules! serial_isr {
    () => {
        SERIAL_TRANSPORT.on_interrupt();
    };
}
