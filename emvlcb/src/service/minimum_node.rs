//! Minimum node service
//!
//! Owns the mode state machine and the node number negotiation:
//!
//! ```text
//! Uninitialised --ChangeMode--> Setup --SNN--> Normal
//!                                 ^              |
//!                                 +--ChangeMode--+
//! ```
//!
//! A negotiation that does not complete within the setup timeout reverts to the previous
//! mode. Also answers node queries (QNN, parameters, module name, service discovery), resets
//! and the heartbeat.

use embassy_time::Instant;

use crate::action::Action;
use crate::core::{CommandError, Mode, ModeCommand, ResponseCode, ServiceId, opcodes};
use crate::message::Message;
use crate::utils::{Burst, deadline};

use super::{Capability, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Parameters,
    Services,
}

#[derive(Debug, Clone, Copy)]
struct Negotiation {
    started: Instant,
    previous_mode: Mode,
    previous_node_number: u16,
}

#[derive(Debug, Default)]
pub struct MinimumNodeService {
    negotiation: Option<Negotiation>,
    heartbeat_due: Option<Instant>,
    heartbeat_sequence: u8,
    burst: Option<Burst<Reply>>,
    started: Option<Instant>,
    node_number_changes: u16,
}

impl MinimumNodeService {
    pub fn new() -> Self {
        Self::default()
    }

    fn change_mode(&mut self, ctx: &mut Context<'_, '_>) {
        match ctx.config.mode() {
            Mode::Uninitialised => {
                self.enter_setup(ctx);
                ctx.put(Action::StartEnumeration {
                    from_peer_request: false,
                });
                ctx.reply(opcodes::RQNN, &[]);
            }
            Mode::Normal => {
                ctx.reply(opcodes::NNREL, &[]);
                self.enter_setup(ctx);
                ctx.reply(opcodes::RQNN, &[]);
            }
            Mode::Setup => self.leave_setup(ctx),
        }
    }

    fn renegotiate(&mut self, ctx: &mut Context<'_, '_>) {
        if ctx.config.mode() == Mode::Normal {
            self.enter_setup(ctx);
            ctx.reply(opcodes::RQNN, &[]);
        }
    }

    fn enter_setup(&mut self, ctx: &mut Context<'_, '_>) {
        let previous_mode = ctx.config.mode();
        self.negotiation = Some(Negotiation {
            started: ctx.now,
            previous_mode,
            previous_node_number: ctx.config.node_number(),
        });
        info!("Entering setup mode from {}", previous_mode.into_u8());
        self.set_mode(ctx, Mode::Setup);
    }

    /// Abandons a negotiation and restores the previous identity.
    fn leave_setup(&mut self, ctx: &mut Context<'_, '_>) {
        let Some(negotiation) = self.negotiation.take() else {
            return;
        };
        info!("Node number negotiation abandoned");
        if negotiation.previous_mode == Mode::Normal {
            ctx.config.set_node_number(negotiation.previous_node_number);
            self.set_mode(ctx, Mode::Normal);
            ctx.reply(opcodes::NNACK, &[]);
        } else {
            self.set_mode(ctx, negotiation.previous_mode);
        }
    }

    fn complete_setup(&mut self, ctx: &mut Context<'_, '_>, node_number: u16) {
        self.negotiation = None;
        if node_number != ctx.config.node_number() {
            self.node_number_changes = self.node_number_changes.wrapping_add(1);
        }
        ctx.config.set_node_number(node_number);
        info!("Node number {} assigned", node_number);
        self.set_mode(ctx, Mode::Normal);
        ctx.reply(opcodes::NNACK, &[]);
        ctx.put(Action::IndicateActivity);
    }

    fn set_mode(&mut self, ctx: &mut Context<'_, '_>, mode: Mode) {
        ctx.config.set_mode(mode);
        if mode != Mode::Normal {
            ctx.config.set_learn(false);
        }
        self.heartbeat_due = None;
        ctx.put(Action::IndicateMode(mode));
    }

    fn handle_message(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        let Some(opcode) = msg.opcode() else {
            return;
        };
        let mode = ctx.config.mode();

        // Broadcast queries
        match opcode {
            opcodes::QNN if mode != Mode::Uninitialised => {
                let flags = ctx.params.flags(mode, ctx.config.learn());
                let (manufacturer, module_id) = (ctx.params.manufacturer(), ctx.params.module_id());
                ctx.reply(opcodes::PNN, &[manufacturer, module_id, flags]);
                return;
            }
            opcodes::RQNP if mode == Mode::Setup => {
                let mut params = [0u8; 7];
                for (index, param) in (1u8..).zip(params.iter_mut()) {
                    *param = ctx.params.get(index, mode, ctx.config.learn()).unwrap_or(0);
                }
                ctx.send(unwrap!(Message::new(&concat(opcodes::PARAMS, &params))));
                return;
            }
            opcodes::RQMN if mode == Mode::Setup => {
                let name = *ctx.params.name();
                ctx.send(unwrap!(Message::new(&concat(opcodes::NAME, &name))));
                return;
            }
            opcodes::SNN if mode == Mode::Setup => {
                if let Some(node_number) = msg.node_number().filter(|nn| *nn != 0) {
                    self.complete_setup(ctx, node_number);
                }
                return;
            }
            _ => {}
        }

        if !ctx.is_for_me(msg) {
            return;
        }
        match opcode {
            opcodes::RQNPN => self.read_parameter(ctx, msg),
            opcodes::NNRST => {
                info!("Restart requested");
                ctx.restart.restart();
            }
            opcodes::NNRSM => {
                // The release must hit the bus before the store is wiped
                let release = Message::with_node_number(opcodes::NNREL, ctx.node_number(), &[]);
                if ctx.send_now(&release).is_err() {
                    warn!("Node number release not sent");
                }
                ctx.config.reset_to_factory_defaults(ctx.restart);
            }
            opcodes::MODE => self.handle_mode_command(ctx, msg),
            opcodes::RQSD => self.describe_services(ctx, msg),
            opcodes::RDGN => {
                if let Some(index) = msg.byte(3) {
                    if usize::from(index) > ctx.services.len() {
                        ctx.send_response(
                            opcodes::RDGN,
                            ServiceId::MINIMUM_NODE,
                            ResponseCode::INVALID_SERVICE,
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn read_parameter(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        let Some(index) = msg.byte(3) else {
            ctx.send_command_error(
                opcodes::RQNPN,
                ServiceId::MINIMUM_NODE,
                CommandError::InvalidCommand,
            );
            return;
        };
        let count = ctx.params.count();
        if index == 0 {
            ctx.reply(opcodes::PARAN, &[0, count]);
            self.burst = Some(Burst::new(Reply::Parameters, 1, u16::from(count) + 1, ctx.now));
        } else if index <= count {
            self.send_parameter(ctx, index);
        } else {
            ctx.send_command_error(
                opcodes::RQNPN,
                ServiceId::MINIMUM_NODE,
                CommandError::InvalidParameterIndex,
            );
        }
    }

    fn send_parameter(&self, ctx: &mut Context<'_, '_>, index: u8) {
        let value = ctx
            .params
            .get(index, ctx.config.mode(), ctx.config.learn())
            .unwrap_or(0);
        ctx.reply(opcodes::PARAN, &[index, value]);
    }

    fn handle_mode_command(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        let Some(command) = msg.byte(3) else {
            return;
        };
        match ModeCommand::try_from_u8(command) {
            Some(ModeCommand::Setup) => self.renegotiate(ctx),
            Some(ModeCommand::Normal) => {
                if ctx.config.mode() == Mode::Setup && ctx.config.node_number() != 0 {
                    self.negotiation = None;
                    self.set_mode(ctx, Mode::Normal);
                }
            }
            Some(ModeCommand::HeartbeatOn) => ctx.config.set_heartbeat(true),
            Some(ModeCommand::HeartbeatOff) => ctx.config.set_heartbeat(false),
            // Sub-modes owned by other services
            Some(_) => {}
            None => ctx.send_response(
                opcodes::MODE,
                ServiceId::MINIMUM_NODE,
                ResponseCode::INVALID_MODE,
            ),
        }
    }

    fn describe_services(&mut self, ctx: &mut Context<'_, '_>, msg: &Message) {
        let Some(index) = msg.byte(3) else {
            return;
        };
        let count = ctx.services.len() as u8;
        if index == 0 {
            ctx.reply(opcodes::SD, &[0, 0, count]);
            self.burst = Some(Burst::new(Reply::Services, 1, u16::from(count) + 1, ctx.now));
        } else if let Some(info) = ctx.services.get(usize::from(index) - 1) {
            let id = info.id.into_u8();
            ctx.reply(opcodes::ESD, &[index, id, 0, 0, 0]);
        } else {
            ctx.send_response(
                opcodes::RQSD,
                ServiceId::MINIMUM_NODE,
                ResponseCode::INVALID_SERVICE,
            );
        }
    }

    fn send_burst_item(&self, ctx: &mut Context<'_, '_>, reply: Reply, index: u8) {
        match reply {
            Reply::Parameters => self.send_parameter(ctx, index),
            Reply::Services => {
                let info = ctx.services[usize::from(index) - 1];
                ctx.reply(opcodes::SD, &[index, info.id.into_u8(), info.version]);
            }
        }
    }

    fn poll_timeout(&mut self, ctx: &mut Context<'_, '_>) {
        let expired = self.negotiation.is_some_and(|negotiation| {
            ctx.now.saturating_duration_since(negotiation.started) >= ctx.timing.setup_timeout
        });
        if expired {
            warn!("Setup timed out");
            self.leave_setup(ctx);
        }
    }

    fn poll_heartbeat(&mut self, ctx: &mut Context<'_, '_>) {
        if ctx.config.mode() != Mode::Normal || !ctx.config.heartbeat_enabled() {
            self.heartbeat_due = None;
            return;
        }
        let interval = ctx.timing.heartbeat_interval;
        let due = *self
            .heartbeat_due
            .get_or_insert_with(|| deadline(ctx.now, interval));
        if ctx.now >= due {
            ctx.reply(opcodes::HEARTB, &[self.heartbeat_sequence, 0, 0]);
            self.heartbeat_sequence = self.heartbeat_sequence.wrapping_add(1);
            self.heartbeat_due = Some(deadline(due, interval).max(ctx.now));
        }
    }
}

impl Capability for MinimumNodeService {
    fn id(&self) -> ServiceId {
        ServiceId::MINIMUM_NODE
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        self.started.get_or_insert(ctx.now);
        match action {
            Some(Action::ChangeMode) => self.change_mode(ctx),
            Some(Action::Renegotiate) => self.renegotiate(ctx),
            Some(Action::MessageIn(msg)) => self.handle_message(ctx, msg),
            _ => {}
        }

        self.poll_timeout(ctx);
        self.poll_heartbeat(ctx);

        let item = self
            .burst
            .as_mut()
            .and_then(|burst| burst.poll(ctx.now, ctx.timing.burst_interval));
        if self.burst.as_ref().is_some_and(|burst| burst.is_finished()) {
            self.burst = None;
        }
        if let Some((reply, index)) = item {
            self.send_burst_item(ctx, reply, index as u8);
        }
    }

    fn diagnostic_count(&self) -> u8 {
        6
    }

    fn diagnostic(&self, ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        let uptime = self
            .started
            .map(|started| ctx.now.saturating_duration_since(started).as_secs())
            .unwrap_or(0);
        let stats = ctx.queue.stats();
        match code {
            // Status: always healthy
            1 => Some(0),
            2 => Some((uptime >> 16) as u16),
            3 => Some(uptime as u16),
            4 => Some(self.node_number_changes),
            5 => Some(stats.overflows.min(u32::from(u16::MAX)) as u16),
            6 => Some(stats.high_water as u16),
            _ => None,
        }
    }
}

fn concat<const N: usize>(opcode: u8, args: &[u8; N]) -> heapless::Vec<u8, 8> {
    let mut bytes = heapless::Vec::new();
    unwrap!(bytes.push(opcode));
    unwrap!(bytes.extend_from_slice(args));
    bytes
}
