use crate::action::Action;
use crate::core::{Mode, ModeCommand, ServiceId, opcodes};
use crate::message::Message;

use super::event_consumer::match_event;
use super::{Capability, Context};

/// Answers every consumed event with ENRSP while acknowledgement is enabled
///
/// Enabled and disabled with MODE; the setting is persisted.
#[derive(Debug, Default)]
pub struct EventAckService {
    acknowledged: u16,
}

impl EventAckService {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_message(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        if msg.opcode() == Some(opcodes::MODE) && ctx.is_for_me(msg) {
            match msg.byte(3).and_then(ModeCommand::try_from_u8) {
                Some(ModeCommand::EventAckOn) => ctx.config.set_event_ack(true),
                Some(ModeCommand::EventAckOff) => ctx.config.set_event_ack(false),
                _ => {}
            }
            return;
        }
        if !ctx.config.event_ack_enabled() || ctx.config.mode() != Mode::Normal {
            return;
        }
        let Some(event) = match_event(&*ctx.config, msg) else {
            return;
        };
        let [nn_hi, nn_lo] = event.node_number.to_be_bytes();
        let [en_hi, en_lo] = event.event_number.to_be_bytes();
        ctx.reply(opcodes::ENRSP, &[nn_hi, nn_lo, en_hi, en_lo, event.slot]);
        self.acknowledged = self.acknowledged.wrapping_add(1);
    }
}

impl Capability for EventAckService {
    fn id(&self) -> ServiceId {
        ServiceId::EVENT_ACKNOWLEDGE
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        if let Some(Action::MessageIn(msg)) = action {
            self.handle_message(ctx, msg);
        }
    }

    fn diagnostic_count(&self) -> u8 {
        1
    }

    fn diagnostic(&self, _ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        (code == 1).then_some(self.acknowledged)
    }
}
