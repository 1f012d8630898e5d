//! The seam between the framing layer and command handling.
//!
//! A [`Dispatcher`] owns all command-specific behaviour. The link only
//! delivers checksum-valid packets to it, sends back whatever responses it
//! queued, and applies the acknowledge convention:
//!
//! - a received command without [`PACKET_ACK_MASK`] gets no echo;
//! - with the bit set, the packet is echoed with the bit still set when the
//!   dispatcher reports success (ack), or with it cleared on failure (nak).
//!
//! [`PACKET_ACK_MASK`]: crate::consts::PACKET_ACK_MASK

#[cfg(feature = "std")]
use core::convert::Infallible;

#[cfg(not(feature = "std"))]
use heapless::Vec;
#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
use crate::consts::MAX_RESPONSES;
use crate::packet::{ByteIo, Packet, PacketLink};
#[cfg(feature = "std")]
use crate::wait::block_on_thread;

/// Response packets queued by a dispatcher, sent in order.
#[cfg(not(feature = "std"))]
pub type Responses = Vec<Packet, MAX_RESPONSES>;

/// Response packets queued by a dispatcher, sent in order.
#[cfg(feature = "std")]
pub type Responses = Vec<Packet>;

/// Command handling for received packets.
pub trait Dispatcher {
    /// Acts on `packet`, pushing any reply packets onto `responses`.
    ///
    /// # Returns
    /// `true` if the command was recognised and carried out. Only consulted
    /// when the sender asked for an acknowledgement.
    fn dispatch(&mut self, packet: &Packet, responses: &mut Responses) -> bool;
}

impl<IO: ByteIo> PacketLink<IO> {
    /// Dispatches `packet`, then sends the queued responses and, if the
    /// sender asked for one, the ack or nak echo.
    async fn reply<D: Dispatcher + ?Sized>(&mut self, dispatcher: &mut D, packet: Packet) -> bool {
        let mut responses = Responses::new();
        let success = dispatcher.dispatch(&packet, &mut responses);

        for response in responses {
            self.put_async(response).await;
        }
        if packet.ack_requested() {
            if success {
                self.put_async(packet.with_ack()).await;
            } else {
                warn!("nak for command {}", packet.command_code());
                self.put_async(packet.without_ack()).await;
            }
        }
        success
    }

    /// Waits for a packet, dispatches it, and sends the replies.
    ///
    /// # Returns
    /// The dispatcher's verdict.
    pub async fn handle_async<D: Dispatcher + ?Sized>(&mut self, dispatcher: &mut D) -> bool {
        let packet = self.get_async().await;
        self.reply(dispatcher, packet).await
    }

    /// Receives one packet if available, dispatches it, and sends the replies.
    ///
    /// Parks the calling thread while the replies wait for outbound room.
    ///
    /// # Returns
    /// - `Ok(success)`: a packet was handled; `success` is the dispatcher's verdict
    /// - `Err(WouldBlock)`: no complete packet yet
    #[cfg(feature = "std")]
    pub fn try_handle<D: Dispatcher + ?Sized>(
        &mut self,
        dispatcher: &mut D,
    ) -> nb::Result<bool, Infallible> {
        let packet = self.try_get()?;
        Ok(block_on_thread(self.reply(dispatcher, packet)))
    }

    /// Parks the calling thread until a packet arrives, then handles it as
    /// [`handle_async`](Self::handle_async) does.
    #[cfg(feature = "std")]
    pub fn handle<D: Dispatcher + ?Sized>(&mut self, dispatcher: &mut D) -> bool {
        block_on_thread(self.handle_async(dispatcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::commands::{
        GET_STARTUP_VALUES, GET_VERSION, TOWER_MODE, TOWER_NUMBER, TOWER_STARTUP, TOWER_VERSION,
    };
    use crate::fifo::ByteChannel;
    use crate::packet::ChannelIo;
    use crate::wait::block_on;
    use crate::wait::test_park::StdPark;

    /// Just enough of the tower's command set to exercise the link.
    struct Tower {
        number: u16,
        handled: usize,
    }

    impl Dispatcher for Tower {
        fn dispatch(&mut self, packet: &Packet, responses: &mut Responses) -> bool {
            self.handled += 1;
            match packet.command_code() {
                GET_STARTUP_VALUES => {
                    responses.push(Packet::new(TOWER_STARTUP, 0, 0, 0));
                    responses.push(Packet::new(TOWER_VERSION, b'v', 1, 0));
                    responses.push(Packet::from_param23(TOWER_NUMBER, 1, self.number));
                    responses.push(Packet::from_param23(TOWER_MODE, 1, 1));
                    true
                }
                GET_VERSION => {
                    responses.push(Packet::new(TOWER_VERSION, b'v', 1, 0));
                    true
                }
                TOWER_NUMBER if packet.param1 == 2 => {
                    self.number = packet.param23();
                    true
                }
                _ => false,
            }
        }
    }

    fn sent<const N: usize>(channel: &ByteChannel<N>) -> Vec<Packet> {
        let bytes: Vec<u8> = core::iter::from_fn(|| channel.try_get().ok()).collect();
        bytes
            .chunks(5)
            .map(|chunk| {
                let frame: [u8; 5] = chunk.try_into().unwrap();
                Packet::from_bytes(&frame).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_startup_request_without_ack_sends_only_responses() {
        let inbound: ByteChannel<64> = ByteChannel::new();
        let outbound: ByteChannel<64> = ByteChannel::new();
        let mut link = PacketLink::new(ChannelIo::new(&inbound, &outbound));
        let mut tower = Tower {
            number: 1382,
            handled: 0,
        };

        for b in Packet::new(GET_STARTUP_VALUES, 0, 0, 0).to_bytes() {
            inbound.put(b);
        }
        assert!(link.handle(&mut tower));
        assert_eq!(
            sent(&outbound),
            [
                Packet::new(TOWER_STARTUP, 0, 0, 0),
                Packet::new(TOWER_VERSION, b'v', 1, 0),
                Packet::new(TOWER_NUMBER, 1, 0x66, 0x05),
                Packet::new(TOWER_MODE, 1, 1, 0),
            ]
        );
    }

    #[test]
    fn test_ack_requested_success_echoes_with_ack_bit() {
        let inbound: ByteChannel<64> = ByteChannel::new();
        let outbound: ByteChannel<64> = ByteChannel::new();
        let mut link = PacketLink::new(ChannelIo::new(&inbound, &outbound));
        let mut tower = Tower {
            number: 0,
            handled: 0,
        };

        let request = Packet::from_param23(TOWER_NUMBER, 2, 1382).with_ack();
        assert_eq!(request.command, 0x8b);
        for b in request.to_bytes() {
            inbound.put(b);
        }
        assert_eq!(link.try_handle(&mut tower), Ok(true));
        assert_eq!(tower.number, 1382);
        assert_eq!(sent(&outbound), [request]);
        assert_eq!(request.command_code(), 0x0b);
    }

    #[test]
    fn test_ack_requested_failure_echoes_nak() {
        let inbound: ByteChannel<64> = ByteChannel::new();
        let outbound: ByteChannel<64> = ByteChannel::new();
        let mut link = PacketLink::new(ChannelIo::new(&inbound, &outbound));
        let mut tower = Tower {
            number: 0,
            handled: 0,
        };

        let request = Packet::new(0x7f, 1, 2, 3).with_ack();
        for b in request.to_bytes() {
            inbound.put(b);
        }
        assert_eq!(link.try_handle(&mut tower), Ok(false));
        assert_eq!(sent(&outbound), [Packet::new(0x7f, 1, 2, 3)]);
    }

    #[test]
    fn test_handle_async_waits_for_outbound_room() {
        let inbound: ByteChannel<8> = ByteChannel::new();
        let outbound: ByteChannel<8> = ByteChannel::new();
        let mut link = PacketLink::new(ChannelIo::new(&inbound, &outbound));
        let mut tower = Tower {
            number: 0,
            handled: 0,
        };

        let request = Packet::new(GET_VERSION, 0, 0, 0).with_ack();
        for b in request.to_bytes() {
            inbound.put(b);
        }
        // Response plus echo is ten bytes: the link must wait for the host to drain.
        let wire = std::thread::scope(|s| {
            let host = s.spawn(|| (0..10).map(|_| outbound.get()).collect::<Vec<u8>>());
            assert!(block_on::<StdPark, _>(link.handle_async(&mut tower)));
            host.join().unwrap()
        });
        assert_eq!(
            wire,
            [
                Packet::new(TOWER_VERSION, b'v', 1, 0).to_bytes(),
                request.to_bytes()
            ]
            .concat()
        );
    }

    #[test]
    fn test_try_handle_without_packet_does_not_dispatch() {
        let inbound: ByteChannel<64> = ByteChannel::new();
        let outbound: ByteChannel<64> = ByteChannel::new();
        let mut link = PacketLink::new(ChannelIo::new(&inbound, &outbound));
        let mut tower = Tower {
            number: 0,
            handled: 0,
        };

        inbound.put(GET_VERSION);
        assert_eq!(link.try_handle(&mut tower), Err(nb::Error::WouldBlock));
        assert_eq!(tower.handled, 0);
        assert!(outbound.is_empty());
    }
}
