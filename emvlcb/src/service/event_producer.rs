use crate::action::Action;
use crate::core::opcodes::EventOpcode;
use crate::core::{Mode, ServiceId};
use crate::message::Message;
use crate::params::flags;

use super::{Capability, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProduceError {
    /// Events are only produced in normal mode
    NotNormal,
    /// No event learned in the slot
    EmptySlot,
    /// More than 3 data bytes
    TooMuchData,
}

/// Sends learned events on behalf of the application
///
/// An event learned with node number 0 is sent as a short event, otherwise as a long event
/// carrying the learned node number.
#[derive(Debug, Default)]
pub struct EventProducerService {
    produced: u16,
}

impl EventProducerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn produce(
        &mut self,
        ctx: &mut Context<'_, '_>,
        slot: u8,
        on: bool,
        data: &[u8],
    ) -> Result<(), ProduceError> {
        if ctx.config.mode() != Mode::Normal {
            return Err(ProduceError::NotNormal);
        }
        let data_length = u8::try_from(data.len())
            .ok()
            .filter(|length| *length <= 3)
            .ok_or(ProduceError::TooMuchData)?;
        if ctx.config.is_slot_free(slot) {
            return Err(ProduceError::EmptySlot);
        }
        let (stored_node_number, event_number) =
            ctx.config.read_event(slot).map_err(|_| ProduceError::EmptySlot)?;

        let short = stored_node_number == 0;
        let node_number = if short {
            ctx.node_number()
        } else {
            stored_node_number
        };
        let opcode = unwrap!(
            EventOpcode {
                short,
                on,
                data: data_length,
            }
            .encode()
        );

        let mut args = [0u8; 5];
        args[..2].copy_from_slice(&event_number.to_be_bytes());
        args[2..2 + data.len()].copy_from_slice(data);
        ctx.send(Message::with_node_number(
            opcode,
            node_number,
            &args[..2 + data.len()],
        ));
        self.produced = self.produced.wrapping_add(1);
        Ok(())
    }
}

impl Capability for EventProducerService {
    fn id(&self) -> ServiceId {
        ServiceId::EVENT_PRODUCER
    }

    fn parameter_flags(&self) -> u8 {
        flags::PRODUCER
    }

    fn process(&mut self, _ctx: &mut Context<'_, '_>, _action: Option<&Action>) {}

    fn diagnostic_count(&self) -> u8 {
        1
    }

    fn diagnostic(&self, _ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        (code == 1).then_some(self.produced)
    }
}
