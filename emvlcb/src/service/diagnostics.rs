use crate::action::Action;
use crate::core::{ResponseCode, opcodes};
use crate::message::Message;
use crate::utils::Burst;

use super::{Capability, Context};

/// Answers diagnostic requests addressed to one service
///
/// RDGN carries a service index (0 for all services) and a diagnostic code (0 for all codes).
#[derive(Debug, Default)]
pub(crate) struct DiagnosticReporter {
    burst: Option<Burst<()>>,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self { burst: None }
    }

    pub fn process(
        &mut self,
        service: &dyn Capability,
        ctx: &mut Context<'_, '_>,
        action: Option<&Action>,
    ) {
        if let Some(Action::MessageIn(msg)) = action {
            if msg.opcode() == Some(opcodes::RDGN) && msg.is_complete() && ctx.is_for_me(msg) {
                self.handle_request(service, ctx, msg);
            }
        }

        let item = self
            .burst
            .as_mut()
            .and_then(|burst| burst.poll(ctx.now, ctx.timing.burst_interval));
        if self.burst.as_ref().is_some_and(|burst| burst.is_finished()) {
            self.burst = None;
        }
        if let Some(((), code)) = item {
            send_value(service, ctx, code as u8);
        }
    }

    fn handle_request(&mut self, service: &dyn Capability, ctx: &mut Context<'_, '_>, msg: &Message) {
        let index = unwrap!(msg.byte(3));
        let code = unwrap!(msg.byte(4));
        if index != 0 && index != ctx.index {
            return;
        }

        let count = service.diagnostic_count();
        if code == 0 {
            if count > 0 {
                self.burst = Some(Burst::new((), 1, u16::from(count) + 1, ctx.now));
            }
        } else if code <= count {
            send_value(service, ctx, code);
        } else if index != 0 {
            ctx.send_response(opcodes::RDGN, service.id(), ResponseCode::INVALID_DIAGNOSTIC);
        }
    }
}

fn send_value(service: &dyn Capability, ctx: &mut Context<'_, '_>, code: u8) {
    let value = service.diagnostic(ctx, code).unwrap_or(0);
    let [hi, lo] = value.to_be_bytes();
    ctx.reply(opcodes::DGN, &[ctx.index, code, hi, lo]);
}
