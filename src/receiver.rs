//! Receiver state machine: handshake acceptor, in-order byte acceptor,
//! graceful-close responder (`spec.md` §4.3).
//!
//! The state machine itself performs no I/O beyond writing accepted
//! payload bytes to its sink; the event loop (`run`, below) owns the
//! transport, the datagram assembly buffer, and the window computation.

use std::io::Write;

use log::{debug, info, warn};

use crate::err::Result;
use crate::packet::{self, Header, TYPE_ACK, TYPE_FIN, TYPE_SYN};
use crate::trace::{self, Direction};
use crate::transport::{Recv, Transport};

/// The engine's bounded datagram assembly buffer, per `spec.md` §5 and
/// the canonical implementation's `PACKET_BUFFER_LENGTH`.
pub const ASSEMBLY_BUFFER_LEN: usize = 65535 + 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Waiting,
    SynSentAck,
    Receiving,
    FinSent,
    Closed,
}

pub struct Outbound {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Outbound {
    fn control(kind: u8, sequence_number: u16, ack_number: u16, window_size: u16) -> Self {
        Outbound {
            header: Header {
                kind,
                sequence_number,
                ack_number,
                payload_size: 0,
                window_size,
            },
            payload: Vec::new(),
        }
    }
}

/// The receiver's connection state: current phase, expected-next cursor,
/// and the pending handshake/teardown correlation value (`spec.md` §3).
pub struct Receiver<W> {
    state: State,
    expected_next: u16,
    pending_handshake: u16,
    sink: W,
}

impl<W: Write> Receiver<W> {
    pub fn new(sink: W) -> Self {
        Receiver {
            state: State::Waiting,
            expected_next: 0,
            pending_handshake: 0,
            sink,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Consumes the receiver, returning ownership of its sink.
    pub fn into_sink(self) -> W {
        self.sink
    }

    /// Dispatch one inbound packet, writing any accepted payload to the
    /// sink and returning the outbound packets the transition produces.
    /// `window` is the receiver's current advertisement, computed by the
    /// caller from the assembly buffer's free space (`spec.md` §4.3).
    pub fn on_packet(&mut self, header: &Header, payload: &[u8], window: u16) -> std::io::Result<Vec<Outbound>> {
        match self.state {
            State::Waiting if header.is_syn() && !header.is_ack() => {
                let s = header.sequence_number;
                self.pending_handshake = s.wrapping_add(1);
                self.expected_next = s.wrapping_add(2);
                self.state = State::SynSentAck;

                Ok(vec![Outbound::control(TYPE_SYN | TYPE_ACK, self.pending_handshake, s, window)])
            }

            State::SynSentAck if header.is_ack() && header.ack_number == self.pending_handshake => {
                self.state = State::Receiving;
                Ok(vec![])
            }

            State::Receiving if header.is_fin() => {
                let s = header.sequence_number;
                self.pending_handshake = s.wrapping_add(1);
                self.state = State::FinSent;

                Ok(vec![
                    Outbound::control(TYPE_ACK, 0, s, window),
                    Outbound::control(TYPE_FIN, self.pending_handshake, 0, window),
                ])
            }

            State::Receiving if header.is_dat() => {
                if header.sequence_number == self.expected_next {
                    self.sink.write_all(payload)?;
                    let ack = header.sequence_number;
                    self.expected_next = self.expected_next.wrapping_add(header.payload_size);

                    Ok(vec![Outbound::control(TYPE_ACK, 0, ack, window)])
                } else {
                    debug!(
                        "out-of-order DAT: got sequence {}, expected {}",
                        header.sequence_number, self.expected_next
                    );
                    Ok(vec![Outbound::control(TYPE_ACK, 0, self.expected_next, window)])
                }
            }

            State::FinSent if header.is_ack() && header.ack_number == self.pending_handshake => {
                self.sink.flush()?;
                self.state = State::Closed;
                Ok(vec![])
            }

            _ => {
                warn!(
                    "dropping out-of-state packet (state {:?}, type {})",
                    self.state,
                    header.type_name()
                );
                Ok(vec![])
            }
        }
    }
}

/// Receiver event loop: purely reactive, no timers (`spec.md` §4.6).
pub fn run<W: Write>(transport: &Transport, sink: W) -> Result<()> {
    let local = transport.local_addr()?;
    let mut receiver = Receiver::new(sink);
    let mut assembly = Vec::<u8>::new();

    info!("receiver waiting for a connection on {local}");

    while !receiver.is_closed() {
        let Recv::Datagram(bytes, from) = transport.recv(None)? else {
            continue;
        };
        assembly.extend_from_slice(&bytes);

        while assembly.len() >= packet::HEADER_LEN {
            let window = (ASSEMBLY_BUFFER_LEN.saturating_sub(assembly.len()) / 2) as u16;

            let (header, payload, consumed) = match packet::decode(&assembly) {
                Ok(v) => v,
                Err(crate::err::Error::ShortBuffer) => break,
                Err(crate::err::Error::InvalidFlags(k)) => {
                    warn!("dropping undecodable packet with flags {k:#x}");
                    break;
                }
                Err(e) => return Err(e),
            };
            let payload = payload.to_vec();

            trace::log_packet(&header, Direction::Received, local, from);

            let outbound = receiver.on_packet(&header, &payload, window)?;
            for out in outbound {
                trace::log_packet(&out.header, Direction::Sent, local, from);
                let wire = packet::encode(&out.header, &out.payload);
                transport.send(&wire, from)?;
            }

            assembly.drain(..consumed);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Header, TYPE_ACK, TYPE_DAT, TYPE_FIN, TYPE_SYN};

    fn syn(seq: u16) -> Header {
        Header {
            kind: TYPE_SYN,
            sequence_number: seq,
            ack_number: 0,
            payload_size: 0,
            window_size: 0,
        }
    }

    fn ack(ack_number: u16) -> Header {
        Header {
            kind: TYPE_ACK,
            sequence_number: 0,
            ack_number,
            payload_size: 0,
            window_size: 0,
        }
    }

    fn dat(seq: u16, payload: &[u8]) -> Header {
        Header {
            kind: TYPE_DAT,
            sequence_number: seq,
            ack_number: 0,
            payload_size: payload.len() as u16,
            window_size: 0,
        }
    }

    fn fin(seq: u16) -> Header {
        Header {
            kind: TYPE_FIN,
            sequence_number: seq,
            ack_number: 0,
            payload_size: 0,
            window_size: 0,
        }
    }

    #[test]
    fn scenario_one_ab_over_a_lossless_link() {
        let mut recv = Receiver::new(Vec::new());

        let out = recv.on_packet(&syn(100), &[], 4096).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].header.kind, TYPE_SYN | TYPE_ACK);
        assert_eq!(out[0].header.sequence_number, 101);
        assert_eq!(out[0].header.ack_number, 100);
        assert_eq!(recv.state(), State::SynSentAck);

        let out = recv.on_packet(&ack(101), &[], 4096).unwrap();
        assert!(out.is_empty());
        assert_eq!(recv.state(), State::Receiving);

        let out = recv.on_packet(&dat(102, b"ab"), b"ab", 4096).unwrap();
        assert_eq!(out[0].header.ack_number, 102);
        assert_eq!(recv.sink.as_slice(), b"ab".as_slice());

        let out = recv.on_packet(&fin(104), &[], 4096).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].header.ack_number, 104);
        assert_eq!(out[1].header.sequence_number, 105);
        assert_eq!(recv.state(), State::FinSent);

        let out = recv.on_packet(&ack(105), &[], 4096).unwrap();
        assert!(out.is_empty());
        assert!(recv.is_closed());
    }

    #[test]
    fn scenario_two_empty_source() {
        let mut recv = Receiver::new(Vec::new());
        recv.on_packet(&syn(100), &[], 4096).unwrap();
        recv.on_packet(&ack(101), &[], 4096).unwrap();

        let out = recv.on_packet(&fin(102), &[], 4096).unwrap();
        assert_eq!(out[0].header.ack_number, 102);
        assert_eq!(out[1].header.sequence_number, 103);

        recv.on_packet(&ack(103), &[], 4096).unwrap();
        assert!(recv.is_closed());
        assert!(recv.sink.is_empty());
    }

    #[test]
    fn out_of_order_dat_is_discarded_and_acks_the_cursor() {
        let mut recv = Receiver::new(Vec::new());
        recv.on_packet(&syn(100), &[], 4096).unwrap();
        recv.on_packet(&ack(101), &[], 4096).unwrap();

        // B arrives before A: expected_next is 102, this carries seq 104.
        let out = recv.on_packet(&dat(104, b"cd"), b"cd", 4096).unwrap();
        assert_eq!(out[0].header.ack_number, 102);
        assert!(recv.sink.is_empty());

        // A arrives: accepted.
        let out = recv.on_packet(&dat(102, b"ab"), b"ab", 4096).unwrap();
        assert_eq!(out[0].header.ack_number, 102);
        assert_eq!(recv.sink.as_slice(), b"ab".as_slice());

        // A arrives again (duplicate): discarded, cursor ack for 104.
        let out = recv.on_packet(&dat(102, b"ab"), b"ab", 4096).unwrap();
        assert_eq!(out[0].header.ack_number, 104);
        assert_eq!(recv.sink.as_slice(), b"ab".as_slice());

        // B is retransmitted and now matches the cursor.
        let out = recv.on_packet(&dat(104, b"cd"), b"cd", 4096).unwrap();
        assert_eq!(out[0].header.ack_number, 104);
        assert_eq!(recv.sink.as_slice(), b"abcd".as_slice());
    }

    #[test]
    fn delivering_the_same_dat_twice_is_idempotent() {
        let mut recv = Receiver::new(Vec::new());
        recv.on_packet(&syn(100), &[], 4096).unwrap();
        recv.on_packet(&ack(101), &[], 4096).unwrap();

        let first = recv.on_packet(&dat(102, b"ab"), b"ab", 4096).unwrap();
        let state_after_first = recv.sink.clone();

        let second = recv.on_packet(&dat(102, b"ab"), b"ab", 4096).unwrap();

        assert_eq!(recv.sink, state_after_first);
        assert_eq!(first[0].header.ack_number, second[0].header.ack_number);
    }

    #[test]
    fn out_of_state_packets_are_silently_dropped() {
        let mut recv = Receiver::new(Vec::new());
        let out = recv.on_packet(&dat(0, b"x"), b"x", 4096).unwrap();
        assert!(out.is_empty());
        assert_eq!(recv.state(), State::Waiting);
    }
}
