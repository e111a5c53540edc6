//! Sender state machine: handshake initiator, window-bounded data
//! transmitter, retransmission manager, graceful-close initiator
//! (`spec.md` §4.4).
//!
//! The registry only ever holds at most one in-flight segment: `spec.md`
//! §4.4 reads the next DAT from the source only "while the registry has
//! no unacked segments", i.e. this is a stop-and-wait sender bounded by
//! the peer-advertised window, not a sliding window with multiple
//! segments in flight.

use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::err::Result;
use crate::packet::{self, Header, TYPE_ACK, TYPE_DAT, TYPE_FIN, TYPE_SYN};
use crate::registry::{Registry, Segment};
use crate::trace::{self, Direction};
use crate::transport::{Recv, Transport};

/// Default retransmission timer, matching the canonical implementation's
/// `TIMEOUT_USEC` (100ms).
pub const TIMEOUT: Duration = Duration::from_millis(100);

/// The canonical implementation's constant initial sequence number.
pub const DEFAULT_ISS: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Waiting,
    SynSent,
    Sending,
    EofSentWaitAcks,
    FinSent,
    FinAcked,
    Closed,
}

pub struct Outbound {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Outbound {
    fn control(kind: u8, sequence_number: u16, ack_number: u16) -> Self {
        Outbound {
            header: Header {
                kind,
                sequence_number,
                ack_number,
                payload_size: 0,
                window_size: 0,
            },
            payload: Vec::new(),
        }
    }

    fn data(sequence_number: u16, payload: Vec<u8>) -> Self {
        Outbound {
            header: Header {
                kind: TYPE_DAT,
                sequence_number,
                ack_number: 0,
                payload_size: payload.len() as u16,
                window_size: 0,
            },
            payload,
        }
    }
}

pub struct Sender<R> {
    state: State,
    iss: u16,
    next_seq: u16,
    file_position: u64,
    peer_window: u16,
    last_acked: Option<u16>,
    our_fin_acked: bool,
    peer_fin_acked: bool,
    pending_handshake: u16,
    registry: Registry,
    source: R,
}

impl<R: Read> Sender<R> {
    pub fn new(source: R, iss: u16) -> Self {
        Sender {
            state: State::Waiting,
            iss,
            next_seq: iss,
            file_position: 0,
            peer_window: 4096,
            last_acked: None,
            our_fin_acked: false,
            peer_fin_acked: false,
            pending_handshake: 0,
            registry: Registry::new(),
            source,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Begin the handshake: send SYN(seq=iss).
    pub fn start(&mut self) -> Outbound {
        self.state = State::SynSent;
        Outbound::control(TYPE_SYN, self.iss, 0)
    }

    /// Dispatch one inbound packet, returning the outbound packets the
    /// transition produces.
    pub fn on_packet(&mut self, header: &Header) -> std::io::Result<Vec<Outbound>> {
        match self.state {
            State::SynSent if header.is_syn() && header.is_ack() && header.ack_number == self.iss => {
                self.peer_window = header.window_size.max(1);
                self.next_seq = self.iss.wrapping_add(2);
                self.state = State::Sending;

                let mut out = vec![Outbound::control(TYPE_ACK, 0, header.sequence_number)];
                out.extend(self.advance()?);
                Ok(out)
            }

            State::Sending | State::EofSentWaitAcks if header.is_ack() && !header.is_fin() => {
                self.on_ack(header.ack_number, header.window_size)
            }

            State::FinSent | State::FinAcked if header.is_ack() && header.ack_number == self.pending_handshake => {
                self.our_fin_acked = true;
                if self.peer_fin_acked {
                    self.state = State::Closed;
                } else {
                    self.state = State::FinAcked;
                }
                Ok(vec![])
            }

            State::FinSent | State::FinAcked if header.is_fin() => {
                self.peer_fin_acked = true;
                let ack = Outbound::control(TYPE_ACK, 0, header.sequence_number);
                if self.our_fin_acked {
                    self.state = State::Closed;
                }
                Ok(vec![ack])
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

    /// Scan the registry for a segment that has been outstanding longer
    /// than `timeout` and retransmit it, exactly one per call.
    pub fn on_timer_tick(&mut self, now: Instant) -> Option<Outbound> {
        if self.state != State::Sending && self.state != State::EofSentWaitAcks {
            return None;
        }

        let sequence = self.registry.oldest_expired(now, TIMEOUT)?;
        self.registry.mark_sent(sequence, now);
        let segment = self.registry.get(sequence)?;

        debug!("retransmitting sequence {sequence} after timeout");
        Some(Outbound::data(sequence, segment.data.clone()))
    }

    fn on_ack(&mut self, ack_number: u16, peer_window: u16) -> std::io::Result<Vec<Outbound>> {
        if self.registry.remove(ack_number).is_some() {
            self.last_acked = Some(ack_number);
            self.peer_window = peer_window.max(1);

            if self.registry.is_empty() {
                return self.advance();
            }
            Ok(vec![])
        } else if self.last_acked == Some(ack_number) {
            debug!("duplicate ack for {ack_number}, treating as a loss signal");
            Ok(self.retransmit_now(Instant::now()).into_iter().collect())
        } else {
            Ok(vec![])
        }
    }

    fn retransmit_now(&mut self, now: Instant) -> Option<Outbound> {
        let sequence = self.registry.oldest_expired(now, Duration::ZERO)?;
        self.registry.mark_sent(sequence, now);
        let segment = self.registry.get(sequence)?;
        Some(Outbound::data(sequence, segment.data.clone()))
    }

    /// Called whenever the registry has just become empty: either send
    /// the next chunk, or begin graceful close if the source is drained.
    fn advance(&mut self) -> std::io::Result<Vec<Outbound>> {
        debug_assert!(self.registry.is_empty());

        if self.state == State::Sending {
            let mut buf = vec![0u8; self.peer_window.max(1) as usize];
            let n = read_fully(&mut self.source, &mut buf)?;

            if n == 0 {
                self.state = State::EofSentWaitAcks;
            } else {
                buf.truncate(n);
                let sequence = self.next_seq;
                self.registry.insert(Segment {
                    sequence,
                    file_position: self.file_position,
                    data: buf.clone(),
                    sent_time: Instant::now(),
                });
                self.file_position += n as u64;
                self.next_seq = self.next_seq.wrapping_add(n as u16);

                return Ok(vec![Outbound::data(sequence, buf)]);
            }
        }

        if self.state == State::EofSentWaitAcks && self.registry.is_empty() {
            self.pending_handshake = self.next_seq;
            self.state = State::FinSent;
            info!("source drained, sending FIN at sequence {}", self.next_seq);
            return Ok(vec![Outbound::control(TYPE_FIN, self.next_seq, 0)]);
        }

        Ok(vec![])
    }
}

/// Reads until `buf` is full or the source is exhausted, since a single
/// `Read::read` call is permitted to return short of `buf.len()` even
/// when more data remains.
fn read_fully<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Sender event loop: initiates the handshake, then alternates between
/// waiting (bounded by the retransmission timer) for a reply and acting
/// on a timeout by resending the oldest outstanding segment
/// (`spec.md` §4.4, §4.9).
pub fn run<R: Read>(transport: &Transport, source: R, peer: SocketAddr, iss: u16) -> Result<()> {
    let local = transport.local_addr()?;
    let mut sender = Sender::new(source, iss);

    let syn = sender.start();
    send_all(transport, local, peer, vec![syn])?;

    while !sender.is_closed() {
        match transport.recv(Some(TIMEOUT))? {
            Recv::Timeout => {
                if let Some(out) = sender.on_timer_tick(Instant::now()) {
                    send_all(transport, local, peer, vec![out])?;
                }
            }
            Recv::Datagram(bytes, from) => {
                let (header, _payload, _consumed) = match packet::decode(&bytes) {
                    Ok(v) => v,
                    Err(crate::err::Error::ShortBuffer) => continue,
                    Err(crate::err::Error::InvalidFlags(k)) => {
                        warn!("dropping undecodable packet with flags {k:#x}");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                trace::log_packet(&header, Direction::Received, local, from);

                let out = sender.on_packet(&header)?;
                send_all(transport, local, from, out)?;
            }
        }
    }

    info!("sender finished, {} bytes sent", sender.file_position);
    Ok(())
}

fn send_all(transport: &Transport, local: SocketAddr, peer: SocketAddr, out: Vec<Outbound>) -> Result<()> {
    for outbound in out {
        trace::log_packet(&outbound.header, Direction::Sent, local, peer);
        let wire = packet::encode(&outbound.header, &outbound.payload);
        transport.send(&wire, peer)?;
    }
    Ok(())
}
