use crate::action::Action;
use crate::core::{CommandError, ServiceId, opcodes};
use crate::message::Message;
use crate::utils::Burst;

use super::{Capability, Context};

/// Node variable access: NVRD, NVSET and NVSETRD
#[derive(Debug, Default)]
pub struct NodeVariableService {
    burst: Option<Burst<()>>,
}

impl NodeVariableService {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_message(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        let Some(opcode) = msg.opcode() else {
            return;
        };
        if !matches!(opcode, opcodes::NVRD | opcodes::NVSET | opcodes::NVSETRD)
            || !ctx.is_for_me(msg)
        {
            return;
        }
        if !msg.is_complete() {
            ctx.send_command_error(opcode, ServiceId::NODE_VARIABLE, CommandError::InvalidCommand);
            return;
        }

        let index = unwrap!(msg.byte(3));
        let count = ctx.config.node_variable_count();
        if opcode == opcodes::NVRD && index == 0 {
            ctx.reply(opcodes::NVANS, &[0, count]);
            self.burst = Some(Burst::new((), 1, u16::from(count) + 1, ctx.now));
            return;
        }
        if index == 0 || index > count {
            ctx.send_command_error(
                opcode,
                ServiceId::NODE_VARIABLE,
                CommandError::InvalidNodeVariableIndex,
            );
            return;
        }

        match opcode {
            opcodes::NVRD => send_value(ctx, index),
            opcodes::NVSET => {
                ctx.config.write_node_variable(index, unwrap!(msg.byte(4)));
                ctx.send_write_ack();
            }
            _ => {
                ctx.config.write_node_variable(index, unwrap!(msg.byte(4)));
                send_value(ctx, index);
            }
        }
    }
}

fn send_value(ctx: &mut Context<'_, '_>, index: u8) {
    let value = ctx.config.read_node_variable(index);
    ctx.reply(opcodes::NVANS, &[index, value]);
}

impl Capability for NodeVariableService {
    fn id(&self) -> ServiceId {
        ServiceId::NODE_VARIABLE
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        if let Some(Action::MessageIn(msg)) = action {
            self.handle_message(ctx, msg);
        }

        let item = self
            .burst
            .as_mut()
            .and_then(|burst| burst.poll(ctx.now, ctx.timing.burst_interval));
        if self.burst.as_ref().is_some_and(|burst| burst.is_finished()) {
            self.burst = None;
        }
        if let Some(((), index)) = item {
            send_value(ctx, index as u8);
        }
    }
}
