//! Long message service
//!
//! Transfers payloads larger than a frame over DTXC messages. A transfer opens with a header
//! carrying the total length:
//!
//! ```text
//! [DTXC, stream, 0, len_hi, len_lo, crc_hi, crc_lo, flags]
//! ```
//!
//! followed by continuations with 5 payload bytes each:
//!
//! ```text
//! [DTXC, stream, seq, d0, d1, d2, d3, d4]
//! ```
//!
//! The sequence number starts at 1 and wraps from 255 back to 1. CRC and flags are sent as
//! zero and ignored on receipt. Continuations are paced by the fragment delay so that slower
//! receivers keep up.
//!
//! One inbound and one outbound transfer run at a time. Inbound transfers are accepted on
//! subscribed streams only; a new header restarts reception.

use embassy_time::{Duration, Instant};
use heapless::{Deque, Vec};

use crate::action::Action;
use crate::core::{ServiceId, opcodes};
use crate::message::Message;
use crate::utils::deadline;

use super::{Capability, Context};

const FRAGMENT_PAYLOAD: usize = 5;
const MAX_STREAMS: usize = 4;
const RECEIPT_QUEUE_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct LongMessageConfig {
    /// Delay between outbound fragments
    pub fragment_delay: Duration,
    /// Longest gap between inbound fragments
    pub receive_timeout: Duration,
}

impl Default for LongMessageConfig {
    fn default() -> Self {
        Self {
            fragment_delay: Duration::from_millis(20),
            receive_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LongMessageError {
    /// An outbound transfer is in progress
    Busy,
    /// Payload exceeds the transmit buffer
    TooLong,
    /// Subscription table is full
    TooManyStreams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveStatus {
    Complete,
    /// Complete, but the payload did not fit the receive buffer
    Truncated,
    /// A fragment was lost, the transfer is abandoned
    SequenceError,
    /// The sender stalled, the transfer is abandoned
    Timeout,
}

/// Outcome of an inbound transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Receipt {
    pub stream: u8,
    /// Number of payload bytes received
    pub length: usize,
    pub status: ReceiveStatus,
}

#[derive(Debug)]
struct Inbound {
    stream: u8,
    expected: usize,
    received: usize,
    next_sequence: u8,
    last_fragment: Instant,
}

#[derive(Debug)]
struct Outbound {
    stream: u8,
    length: usize,
    offset: usize,
    /// None until the header is sent
    sequence: Option<u8>,
    due: Option<Instant>,
}

pub struct LongMessageService<'a> {
    config: LongMessageConfig,
    streams: Vec<u8, MAX_STREAMS>,
    rx_buffer: &'a mut [u8],
    rx_length: usize,
    inbound: Option<Inbound>,
    receipts: Deque<Receipt, RECEIPT_QUEUE_CAPACITY>,
    tx_buffer: &'a mut [u8],
    outbound: Option<Outbound>,
    completed: u16,
    failed: u16,
}

impl<'a> LongMessageService<'a> {
    pub fn new(config: LongMessageConfig, rx_buffer: &'a mut [u8], tx_buffer: &'a mut [u8]) -> Self {
        Self {
            config,
            streams: Vec::new(),
            rx_buffer,
            rx_length: 0,
            inbound: None,
            receipts: Deque::new(),
            tx_buffer,
            outbound: None,
            completed: 0,
            failed: 0,
        }
    }

    /// Accepts inbound transfers on `stream`.
    pub fn subscribe(&mut self, stream: u8) -> Result<(), LongMessageError> {
        if self.streams.contains(&stream) {
            return Ok(());
        }
        self.streams
            .push(stream)
            .map_err(|_| LongMessageError::TooManyStreams)
    }

    /// Starts an outbound transfer. Fragments are emitted by subsequent processing cycles.
    pub fn send(&mut self, stream: u8, data: &[u8]) -> Result<(), LongMessageError> {
        if self.outbound.is_some() {
            return Err(LongMessageError::Busy);
        }
        if data.len() > self.tx_buffer.len() || data.len() > usize::from(u16::MAX) {
            return Err(LongMessageError::TooLong);
        }
        self.tx_buffer[..data.len()].copy_from_slice(data);
        self.outbound = Some(Outbound {
            stream,
            length: data.len(),
            offset: 0,
            sequence: None,
            due: None,
        });
        Ok(())
    }

    pub fn is_sending(&self) -> bool {
        self.outbound.is_some()
    }

    pub fn take_receipt(&mut self) -> Option<Receipt> {
        self.receipts.pop_front()
    }

    /// Payload of the last inbound transfer
    ///
    /// Valid until the next header arrives.
    pub fn received_data(&self) -> &[u8] {
        &self.rx_buffer[..self.rx_length]
    }

    fn receive(&mut self, now: Instant, msg: &Message) {
        if msg.opcode() != Some(opcodes::DTXC) {
            return;
        }
        let (Some(stream), Some(sequence)) = (msg.byte(1), msg.byte(2)) else {
            return;
        };
        if !self.streams.contains(&stream) {
            return;
        }

        if sequence == 0 {
            let Some(expected) = msg.u16_at(3) else {
                return;
            };
            if self.inbound.is_some() {
                debug!("Long message restarted on stream {}", stream);
            }
            self.rx_length = 0;
            let inbound = Inbound {
                stream,
                expected: usize::from(expected),
                received: 0,
                next_sequence: 1,
                last_fragment: now,
            };
            if inbound.expected == 0 {
                self.finish(&inbound);
            } else {
                self.inbound = Some(inbound);
            }
            return;
        }

        let Some(inbound) = self.inbound.as_mut().filter(|inbound| inbound.stream == stream) else {
            return;
        };
        if sequence != inbound.next_sequence {
            warn!(
                "Long message sequence error: expected {}, got {}",
                inbound.next_sequence, sequence
            );
            self.abort(ReceiveStatus::SequenceError);
            return;
        }

        let remaining = inbound.expected - inbound.received;
        let payload = &msg[3..];
        let payload = &payload[..payload.len().min(remaining)];
        let start = inbound.received.min(self.rx_buffer.len());
        let end = (inbound.received + payload.len()).min(self.rx_buffer.len());
        self.rx_buffer[start..end].copy_from_slice(&payload[..end - start]);
        self.rx_length = end;

        inbound.received += payload.len();
        inbound.next_sequence = next_sequence(inbound.next_sequence);
        inbound.last_fragment = now;
        if inbound.received >= inbound.expected {
            if let Some(inbound) = self.inbound.take() {
                self.finish(&inbound);
            }
        }
    }

    fn finish(&mut self, inbound: &Inbound) {
        let status = if inbound.received > self.rx_buffer.len() {
            ReceiveStatus::Truncated
        } else {
            ReceiveStatus::Complete
        };
        self.completed = self.completed.wrapping_add(1);
        self.push_receipt(Receipt {
            stream: inbound.stream,
            length: inbound.received,
            status,
        });
    }

    fn abort(&mut self, status: ReceiveStatus) {
        if let Some(inbound) = self.inbound.take() {
            self.failed = self.failed.wrapping_add(1);
            self.push_receipt(Receipt {
                stream: inbound.stream,
                length: inbound.received,
                status,
            });
        }
    }

    fn push_receipt(&mut self, receipt: Receipt) {
        if self.receipts.is_full() {
            self.receipts.pop_front();
        }
        unwrap!(self.receipts.push_back(receipt));
    }

    fn poll_timeout(&mut self, now: Instant) {
        let stalled = self.inbound.as_ref().is_some_and(|inbound| {
            now.saturating_duration_since(inbound.last_fragment) > self.config.receive_timeout
        });
        if stalled {
            warn!("Long message receive timeout");
            self.abort(ReceiveStatus::Timeout);
        }
    }

    fn poll_transmit(&mut self, ctx: &mut Context<'_, '_>) {
        let Some(outbound) = &mut self.outbound else {
            return;
        };
        if outbound.due.is_some_and(|due| ctx.now < due) {
            return;
        }

        let mut bytes = [0u8; 8];
        bytes[0] = opcodes::DTXC;
        bytes[1] = outbound.stream;
        let finished = match outbound.sequence {
            None => {
                bytes[3..5].copy_from_slice(&(outbound.length as u16).to_be_bytes());
                outbound.sequence = Some(1);
                outbound.length == 0
            }
            Some(sequence) => {
                let end = (outbound.offset + FRAGMENT_PAYLOAD).min(outbound.length);
                let chunk = &self.tx_buffer[outbound.offset..end];
                bytes[2] = sequence;
                bytes[3..3 + chunk.len()].copy_from_slice(chunk);
                outbound.offset = end;
                outbound.sequence = Some(next_sequence(sequence));
                outbound.offset >= outbound.length
            }
        };
        ctx.send(unwrap!(Message::new(&bytes)));
        outbound.due = Some(deadline(ctx.now, self.config.fragment_delay));

        if finished {
            self.outbound = None;
        }
    }
}

impl Capability for LongMessageService<'_> {
    fn id(&self) -> ServiceId {
        ServiceId::LONG_MESSAGE
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        if let Some(Action::MessageIn(msg)) = action {
            self.receive(ctx.now, msg);
        }
        self.poll_timeout(ctx.now);
        self.poll_transmit(ctx);
    }

    fn diagnostic_count(&self) -> u8 {
        2
    }

    fn diagnostic(&self, _ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        match code {
            1 => Some(self.completed),
            2 => Some(self.failed),
            _ => None,
        }
    }
}

const fn next_sequence(sequence: u8) -> u8 {
    if sequence == u8::MAX { 1 } else { sequence + 1 }
}
