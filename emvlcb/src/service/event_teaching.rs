//! Event teaching service
//!
//! Learn mode gates the table-modifying commands (EVLRN, EVULN, REQEV, NNCLR). Table reads by
//! index work in any mode.

use crate::action::Action;
use crate::config::EventError;
use crate::core::{CommandError, ModeCommand, ServiceId, opcodes};
use crate::message::Message;
use crate::utils::Burst;

use super::{Capability, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    /// ENRSP for each stored event
    Events,
    /// EVANS for each variable of a slot
    Variables { slot: u8 },
    /// NEVAL for each variable of a slot
    IndexedVariables { slot: u8 },
}

#[derive(Debug, Default)]
pub struct EventTeachingService {
    burst: Option<Burst<Reply>>,
    learned: u16,
}

impl EventTeachingService {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_message(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        let Some(opcode) = msg.opcode() else {
            return;
        };
        match opcode {
            opcodes::NNLRN => {
                if ctx.is_for_me(msg) {
                    info!("Learn mode on");
                    ctx.config.set_learn(true);
                } else if ctx.config.learn() && msg.node_number().is_some() {
                    info!("Learn mode off, another node is learning");
                    ctx.config.set_learn(false);
                }
            }
            opcodes::NNULN if ctx.is_for_me(msg) => ctx.config.set_learn(false),
            opcodes::MODE if ctx.is_for_me(msg) => match msg.byte(3).and_then(ModeCommand::try_from_u8) {
                Some(ModeCommand::LearnOn) => ctx.config.set_learn(true),
                Some(ModeCommand::LearnOff) => ctx.config.set_learn(false),
                _ => {}
            },
            opcodes::NNCLR if ctx.is_for_me(msg) => {
                if ctx.config.learn() {
                    info!("Event table cleared");
                    ctx.config.clear_all_events();
                    ctx.send_success(opcodes::NNCLR, ServiceId::EVENT_TEACHING);
                } else {
                    ctx.send_command_error(
                        opcodes::NNCLR,
                        ServiceId::EVENT_TEACHING,
                        CommandError::NotInLearnMode,
                    );
                }
            }
            opcodes::NNEVN if ctx.is_for_me(msg) => {
                let free = ctx.config.free_slot_count();
                ctx.reply(opcodes::EVNLF, &[free]);
            }
            opcodes::RQEVN if ctx.is_for_me(msg) => {
                let stored = ctx.config.stored_event_count();
                ctx.reply(opcodes::NUMEV, &[stored]);
            }
            opcodes::NERD if ctx.is_for_me(msg) => {
                let end = u16::from(ctx.config.event_count());
                self.burst = Some(Burst::new(Reply::Events, 0, end, ctx.now));
            }
            opcodes::NENRD if ctx.is_for_me(msg) => self.read_event_by_index(ctx, msg),
            opcodes::REVAL if ctx.is_for_me(msg) => self.read_variable_by_index(ctx, msg),
            opcodes::EVLRN if ctx.config.learn() => self.learn(ctx, msg),
            opcodes::EVULN if ctx.config.learn() => self.unlearn(ctx, msg),
            opcodes::REQEV if ctx.config.learn() => self.read_variable(ctx, msg),
            _ => {}
        }
    }

    fn learn(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        const SERVICE: ServiceId = ServiceId::EVENT_TEACHING;
        if !msg.is_complete() {
            ctx.send_command_error(opcodes::EVLRN, SERVICE, CommandError::InvalidCommand);
            return;
        }
        let (node_number, event_number) = event_of(msg);
        let index = unwrap!(msg.byte(5));
        let value = unwrap!(msg.byte(6));
        if index == 0 || index > ctx.config.event_variable_count() {
            ctx.send_command_error(opcodes::EVLRN, SERVICE, CommandError::InvalidEventVariableIndex);
            return;
        }

        let slot = match ctx.config.find_event(node_number, event_number) {
            Ok(slot) => slot,
            Err(_) => match ctx.config.find_free_slot() {
                Ok(slot) => {
                    unwrap!(ctx.config.write_event(slot, node_number, event_number));
                    for variable in 1..=ctx.config.event_variable_count() {
                        unwrap!(ctx.config.write_event_variable(slot, variable, 0));
                    }
                    ctx.config.update_hash_entry(slot);
                    self.learned = self.learned.wrapping_add(1);
                    slot
                }
                Err(_) => {
                    ctx.send_command_error(opcodes::EVLRN, SERVICE, CommandError::TooManyEvents);
                    return;
                }
            },
        };
        unwrap!(ctx.config.write_event_variable(slot, index, value));
        debug!(
            "Event {}:{} variable {} set to {} in slot {}",
            node_number, event_number, index, value, slot
        );
        ctx.send_success(opcodes::EVLRN, SERVICE);
        ctx.put(Action::IndicateActivity);
    }

    fn unlearn(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        if !msg.is_complete() {
            ctx.send_command_error(
                opcodes::EVULN,
                ServiceId::EVENT_TEACHING,
                CommandError::InvalidCommand,
            );
            return;
        }
        let (node_number, event_number) = event_of(msg);
        match ctx.config.find_event(node_number, event_number) {
            Ok(slot) => {
                unwrap!(ctx.config.clear_event(slot));
                ctx.config.update_hash_entry(slot);
                ctx.send_success(opcodes::EVULN, ServiceId::EVENT_TEACHING);
                ctx.put(Action::IndicateActivity);
            }
            Err(_) => ctx.send_command_error(
                opcodes::EVULN,
                ServiceId::EVENT_TEACHING,
                CommandError::NoEvent,
            ),
        }
    }

    /// REQEV: event variable by event identity
    fn read_variable(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        const SERVICE: ServiceId = ServiceId::EVENT_TEACHING;
        if !msg.is_complete() {
            ctx.send_command_error(opcodes::REQEV, SERVICE, CommandError::InvalidCommand);
            return;
        }
        let (node_number, event_number) = event_of(msg);
        let index = unwrap!(msg.byte(5));
        let Ok(slot) = ctx.config.find_event(node_number, event_number) else {
            ctx.send_command_error(opcodes::REQEV, SERVICE, CommandError::NoEvent);
            return;
        };
        let count = ctx.config.event_variable_count();
        if index == 0 {
            send_evans(ctx, slot, 0, count);
            self.burst = Some(Burst::new(
                Reply::Variables { slot },
                1,
                u16::from(count) + 1,
                ctx.now,
            ));
        } else {
            match ctx.config.read_event_variable(slot, index) {
                Ok(value) => send_evans(ctx, slot, index, value),
                Err(_) => ctx.send_command_error(
                    opcodes::REQEV,
                    SERVICE,
                    CommandError::InvalidEventVariableIndex,
                ),
            }
        }
    }

    fn read_event_by_index(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        match msg.byte(3).filter(|slot| !ctx.config.is_slot_free(*slot)) {
            Some(slot) => send_enrsp(ctx, slot),
            None => ctx.send_command_error(
                opcodes::NENRD,
                ServiceId::EVENT_TEACHING,
                CommandError::InvalidEventIndex,
            ),
        }
    }

    /// REVAL: event variable by slot
    fn read_variable_by_index(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        const SERVICE: ServiceId = ServiceId::EVENT_TEACHING;
        let (Some(slot), Some(index)) = (msg.byte(3), msg.byte(4)) else {
            ctx.send_command_error(opcodes::REVAL, SERVICE, CommandError::InvalidCommand);
            return;
        };
        if ctx.config.is_slot_free(slot) {
            ctx.send_command_error(opcodes::REVAL, SERVICE, CommandError::InvalidEventIndex);
            return;
        }
        if index == 0 {
            let count = ctx.config.event_variable_count();
            ctx.reply(opcodes::NEVAL, &[slot, 0, count]);
            self.burst = Some(Burst::new(
                Reply::IndexedVariables { slot },
                1,
                u16::from(count) + 1,
                ctx.now,
            ));
            return;
        }
        match ctx.config.read_event_variable(slot, index) {
            Ok(value) => ctx.reply(opcodes::NEVAL, &[slot, index, value]),
            Err(EventError::InvalidVariableIndex) => ctx.send_command_error(
                opcodes::REVAL,
                SERVICE,
                CommandError::InvalidEventVariableIndex,
            ),
            Err(_) => {
                ctx.send_command_error(opcodes::REVAL, SERVICE, CommandError::InvalidEventIndex)
            }
        }
    }

    fn poll_burst(&mut self, ctx: &mut Context<'_, '_>) {
        if let Some(burst) = &mut self.burst {
            if burst.kind() == Reply::Events {
                burst.skip_while(|slot| ctx.config.is_slot_free(slot as u8));
            }
        }
        let item = self
            .burst
            .as_mut()
            .and_then(|burst| burst.poll(ctx.now, ctx.timing.burst_interval));
        if self.burst.as_ref().is_some_and(|burst| burst.is_finished()) {
            self.burst = None;
        }
        let Some((reply, index)) = item else {
            return;
        };
        let index = index as u8;
        match reply {
            Reply::Events => send_enrsp(ctx, index),
            Reply::Variables { slot } => {
                let value = ctx.config.read_event_variable(slot, index).unwrap_or(0);
                send_evans(ctx, slot, index, value);
            }
            Reply::IndexedVariables { slot } => {
                let value = ctx.config.read_event_variable(slot, index).unwrap_or(0);
                ctx.reply(opcodes::NEVAL, &[slot, index, value]);
            }
        }
    }
}

impl Capability for EventTeachingService {
    fn id(&self) -> ServiceId {
        ServiceId::EVENT_TEACHING
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        if let Some(Action::MessageIn(msg)) = action {
            self.handle_message(ctx, msg);
        }
        self.poll_burst(ctx);
    }

    fn diagnostic_count(&self) -> u8 {
        3
    }

    fn diagnostic(&self, ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        match code {
            1 => Some(ctx.config.stored_event_count().into()),
            2 => Some(ctx.config.free_slot_count().into()),
            3 => Some(self.learned),
            _ => None,
        }
    }
}

/// Event identity of EVLRN, EVULN and REQEV
fn event_of(msg: &Message) -> (u16, u16) {
    (unwrap!(msg.u16_at(1)), unwrap!(msg.u16_at(3)))
}

fn send_evans(ctx: &mut Context<'_, '_>, slot: u8, index: u8, value: u8) {
    let Ok((node_number, event_number)) = ctx.config.read_event(slot) else {
        return;
    };
    let [en_hi, en_lo] = event_number.to_be_bytes();
    ctx.send(Message::with_node_number(
        opcodes::EVANS,
        node_number,
        &[en_hi, en_lo, index, value],
    ));
}

fn send_enrsp(ctx: &mut Context<'_, '_>, slot: u8) {
    let Ok((node_number, event_number)) = ctx.config.read_event(slot) else {
        return;
    };
    let [nn_hi, nn_lo] = node_number.to_be_bytes();
    let [en_hi, en_lo] = event_number.to_be_bytes();
    ctx.reply(opcodes::ENRSP, &[nn_hi, nn_lo, en_hi, en_lo, slot]);
}
