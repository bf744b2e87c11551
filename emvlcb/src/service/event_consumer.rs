use heapless::Deque;

use crate::action::Action;
use crate::config::NodeConfig;
use crate::core::opcodes::EventOpcode;
use crate::core::{Mode, ServiceId};
use crate::message::Message;
use crate::params::flags;

use super::{Capability, Context};

const CONSUMED_QUEUE_CAPACITY: usize = 8;

/// Learned event seen on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConsumedEvent {
    /// Slot of the matching learned event
    pub slot: u8,
    /// Node number as sent. For short events this is the producer node number, while the
    /// learned event is stored with node number 0.
    pub node_number: u16,
    pub event_number: u16,
    pub short: bool,
    pub on: bool,
    data: [u8; 3],
    data_length: u8,
}

impl ConsumedEvent {
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.data_length)]
    }
}

/// Matches accessory events against the learned event table
#[derive(Debug, Default)]
pub struct EventConsumerService {
    consume_own_events: bool,
    events: Deque<ConsumedEvent, CONSUMED_QUEUE_CAPACITY>,
    consumed: u16,
    dropped: u16,
}

impl EventConsumerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also consumes events this node produces.
    pub fn with_own_events() -> Self {
        Self {
            consume_own_events: true,
            ..Self::default()
        }
    }

    pub fn take_event(&mut self) -> Option<ConsumedEvent> {
        self.events.pop_front()
    }

    fn consume(&mut self, ctx: &Context<'_, '_>, msg: &Message) {
        let Some(event) = match_event(&*ctx.config, msg) else {
            return;
        };
        if self.events.is_full() {
            self.events.pop_front();
            self.dropped = self.dropped.wrapping_add(1);
            warn!("Consumed event queue full, oldest event dropped");
        }
        unwrap!(self.events.push_back(event));
        self.consumed = self.consumed.wrapping_add(1);
    }
}

impl Capability for EventConsumerService {
    fn id(&self) -> ServiceId {
        ServiceId::EVENT_CONSUMER
    }

    fn parameter_flags(&self) -> u8 {
        if self.consume_own_events {
            flags::CONSUMER | flags::CONSUME_OWN_EVENTS
        } else {
            flags::CONSUMER
        }
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        if ctx.config.mode() != Mode::Normal {
            return;
        }
        match action {
            Some(Action::MessageIn(msg)) => self.consume(ctx, msg),
            Some(Action::MessageOut(msg)) if self.consume_own_events => self.consume(ctx, msg),
            _ => {}
        }
    }

    fn diagnostic_count(&self) -> u8 {
        2
    }

    fn diagnostic(&self, _ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        match code {
            1 => Some(self.consumed),
            2 => Some(self.dropped),
            _ => None,
        }
    }
}

/// Looks an accessory event up in the learned event table.
pub(crate) fn match_event(config: &NodeConfig<'_>, msg: &Message) -> Option<ConsumedEvent> {
    let opcode = EventOpcode::decode(msg.opcode()?)?;
    if !msg.is_complete() {
        return None;
    }
    let node_number = msg.u16_at(1)?;
    let event_number = msg.u16_at(3)?;
    let key = if opcode.short { 0 } else { node_number };
    let slot = config.find_event(key, event_number).ok()?;

    let mut data = [0u8; 3];
    let data_length = usize::from(opcode.data);
    data[..data_length].copy_from_slice(&msg[5..5 + data_length]);
    Some(ConsumedEvent {
        slot,
        node_number,
        event_number,
        short: opcode.short,
        on: opcode.on,
        data,
        data_length: opcode.data,
    })
}
