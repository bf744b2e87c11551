//! CAN transport service
//!
//! Bridges the action queue and the [`Transport`](crate::transport::Transport): outbound
//! messages are transmitted when popped, received frames are queued as inbound messages.
//! Also owns the bus address and its self-enumeration.

use crate::action::Action;
use crate::core::{BusAddress, CommandError, ResponseCode, ServiceId, opcodes};
use crate::enumeration::{Enumerator, Outcome};
use crate::frame::{Data, Frame, Header};
use crate::message::Message;

use super::{Capability, Context};

#[derive(Debug, Default)]
pub struct CanService {
    enumerator: Enumerator,
    received: u16,
    transmitted: u16,
    transmit_errors: u16,
    enumerations: u16,
    conflicts: u16,
    address_changes: u16,
}

impl CanService {
    pub fn new() -> Self {
        Self::default()
    }

    fn transmit(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        match ctx.send_now(msg) {
            Ok(()) => self.transmitted = self.transmitted.wrapping_add(1),
            Err(_) => {
                self.transmit_errors = self.transmit_errors.wrapping_add(1);
                warn!("Transmit queue full, message dropped");
            }
        }
    }

    fn start_enumeration(&mut self, ctx: &mut Context<'_, '_>, from_peer_request: bool) {
        if !self.enumerator.start(ctx.now, from_peer_request) {
            return;
        }
        info!("Bus address enumeration started");
        self.enumerations = self.enumerations.wrapping_add(1);
        let request = Frame::new_remote(Header::new(ctx.config.bus_address()));
        if ctx.transport.send(&request).is_err() {
            warn!("Enumeration request not sent");
        }
    }

    fn finish_enumeration(&mut self, ctx: &mut Context<'_, '_>, outcome: Outcome) {
        info!("Bus address {} claimed", outcome.address.into_u8());
        if outcome.address != ctx.config.bus_address() {
            self.address_changes = self.address_changes.wrapping_add(1);
        }
        ctx.config.set_bus_address(outcome.address);
        if outcome.from_peer_request {
            ctx.reply(opcodes::NNACK, &[]);
        }
    }

    fn handle_frame(&mut self, ctx: &mut Context<'_, '_>, frame: Frame) {
        let Some(header) = frame.header() else {
            return;
        };
        let own_address = ctx.config.bus_address();

        if frame.data.is_empty() {
            self.enumerator.record_response(header.address);
            if frame.remote && own_address.is_assigned() {
                let answer = Frame::new(Header::new(own_address), Data::default());
                if ctx.transport.send(&answer).is_err() {
                    warn!("Enumeration answer not sent");
                }
            }
            return;
        }
        if frame.remote {
            return;
        }

        if own_address.is_assigned() && header.address == own_address {
            warn!("Bus address {} used by another node", own_address.into_u8());
            self.conflicts = self.conflicts.wrapping_add(1);
            self.enumerator.require();
        }
        self.received = self.received.wrapping_add(1);
        ctx.put(Action::MessageIn(Message::from(frame.data)));
    }

    fn handle_message(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        match msg.opcode() {
            Some(opcodes::ENUM) if ctx.is_for_me(msg) => {
                ctx.put(Action::StartEnumeration {
                    from_peer_request: true,
                })
            }
            Some(opcodes::CANID) if ctx.is_for_me(msg) => {
                let address = msg
                    .byte(3)
                    .and_then(BusAddress::new)
                    .filter(|address| address.is_assignable());
                match address {
                    Some(address) => {
                        if address != ctx.config.bus_address() {
                            self.address_changes = self.address_changes.wrapping_add(1);
                        }
                        ctx.config.set_bus_address(address);
                        ctx.send_success(opcodes::CANID, ServiceId::CAN);
                    }
                    None => {
                        ctx.reply(opcodes::CMDERR, &[CommandError::InvalidEvent.into_u8()]);
                        ctx.send_response(
                            opcodes::CANID,
                            ServiceId::CAN,
                            ResponseCode::INVALID_COMMAND_PARAMETER,
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

impl Capability for CanService {
    fn id(&self) -> ServiceId {
        ServiceId::CAN
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        match action {
            Some(Action::MessageOut(msg)) => self.transmit(ctx, msg),
            Some(Action::StartEnumeration { from_peer_request }) => {
                self.start_enumeration(ctx, *from_peer_request)
            }
            Some(Action::MessageIn(msg)) => self.handle_message(ctx, msg),
            _ => {}
        }

        if self.enumerator.take_required() {
            self.start_enumeration(ctx, false);
        }
        if ctx.transport.available() {
            if let Some(frame) = ctx.transport.receive() {
                self.handle_frame(ctx, frame);
            }
        }
        if let Some(outcome) = self.enumerator.poll(ctx.now, ctx.timing.enumeration_window) {
            self.finish_enumeration(ctx, outcome);
        }
    }

    fn diagnostic_count(&self) -> u8 {
        6
    }

    fn diagnostic(&self, _ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        match code {
            1 => Some(self.received),
            2 => Some(self.transmitted),
            3 => Some(self.transmit_errors),
            4 => Some(self.enumerations),
            5 => Some(self.conflicts),
            6 => Some(self.address_changes),
            _ => None,
        }
    }
}
