//! Capability services
//!
//! A node is assembled from an ordered list of [`Service`]s. Every processing cycle the
//! coordinator offers the popped [`Action`] (or nothing) to each of them in list order. A service
//! reacts to the actions it recognizes and ignores the rest; there is no short-circuit, so an
//! inbound message may be handled by several services.

use embassy_time::Instant;

use crate::action::Action;
use crate::config::NodeConfig;
use crate::core::{CommandError, ResponseCode, ServiceId, opcodes};
use crate::frame::{Frame, Header};
use crate::message::Message;
use crate::node::{ActionQueue, Timing};
use crate::params::Parameters;
use crate::store::Restart;
use crate::transport::{SendError, Transport};

mod can;
mod diagnostics;
mod event_ack;
mod event_consumer;
mod event_producer;
mod event_teaching;
mod long_message;
mod minimum_node;
mod node_variable;

pub use can::CanService;
pub(crate) use diagnostics::DiagnosticReporter;
pub use event_ack::EventAckService;
pub use event_consumer::{ConsumedEvent, EventConsumerService};
pub use event_producer::{EventProducerService, ProduceError};
pub use event_teaching::EventTeachingService;
pub use long_message::{
    LongMessageConfig, LongMessageError, LongMessageService, Receipt, ReceiveStatus,
};
pub use minimum_node::MinimumNodeService;
pub use node_variable::NodeVariableService;

/// Discovery record of a registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub version: u8,
}

/// A capability of the node
pub enum Service<'a> {
    MinimumNode(MinimumNodeService),
    Can(CanService),
    NodeVariable(NodeVariableService),
    EventTeaching(EventTeachingService),
    EventConsumer(EventConsumerService),
    EventProducer(EventProducerService),
    EventAck(EventAckService),
    LongMessage(LongMessageService<'a>),
}

impl<'a> Service<'a> {
    fn as_capability(&self) -> &dyn Capability {
        match self {
            Service::MinimumNode(service) => service,
            Service::Can(service) => service,
            Service::NodeVariable(service) => service,
            Service::EventTeaching(service) => service,
            Service::EventConsumer(service) => service,
            Service::EventProducer(service) => service,
            Service::EventAck(service) => service,
            Service::LongMessage(service) => service,
        }
    }

    fn as_capability_mut(&mut self) -> &mut dyn Capability {
        match self {
            Service::MinimumNode(service) => service,
            Service::Can(service) => service,
            Service::NodeVariable(service) => service,
            Service::EventTeaching(service) => service,
            Service::EventConsumer(service) => service,
            Service::EventProducer(service) => service,
            Service::EventAck(service) => service,
            Service::LongMessage(service) => service,
        }
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            id: self.id(),
            version: self.version(),
        }
    }
}

impl Capability for Service<'_> {
    fn id(&self) -> ServiceId {
        self.as_capability().id()
    }

    fn version(&self) -> u8 {
        self.as_capability().version()
    }

    fn parameter_flags(&self) -> u8 {
        self.as_capability().parameter_flags()
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>) {
        self.as_capability_mut().process(ctx, action)
    }

    fn diagnostic_count(&self) -> u8 {
        self.as_capability().diagnostic_count()
    }

    fn diagnostic(&self, ctx: &Context<'_, '_>, code: u8) -> Option<u16> {
        self.as_capability().diagnostic(ctx, code)
    }
}

macro_rules! impl_from_service {
    ($variant:ident, $ty:ty) => {
        impl<'a> From<$ty> for Service<'a> {
            fn from(value: $ty) -> Self {
                Service::$variant(value)
            }
        }
    };
}

impl_from_service!(MinimumNode, MinimumNodeService);
impl_from_service!(Can, CanService);
impl_from_service!(NodeVariable, NodeVariableService);
impl_from_service!(EventTeaching, EventTeachingService);
impl_from_service!(EventConsumer, EventConsumerService);
impl_from_service!(EventProducer, EventProducerService);
impl_from_service!(EventAck, EventAckService);
impl_from_service!(LongMessage, LongMessageService<'a>);

pub(crate) trait Capability {
    fn id(&self) -> ServiceId;

    fn version(&self) -> u8 {
        1
    }

    /// Static bits this service contributes to the flags parameter
    fn parameter_flags(&self) -> u8 {
        0
    }

    fn process(&mut self, ctx: &mut Context<'_, '_>, action: Option<&Action>);

    /// Number of diagnostic values, reported with codes `1..=count`
    fn diagnostic_count(&self) -> u8 {
        0
    }

    fn diagnostic(&self, _ctx: &Context<'_, '_>, _code: u8) -> Option<u16> {
        None
    }
}

/// Node state lent to a service for one processing step
pub(crate) struct Context<'c, 'a> {
    pub now: Instant,
    /// 1-based position of the service in the node service list
    pub index: u8,
    pub services: &'c [ServiceInfo],
    pub config: &'c mut NodeConfig<'a>,
    pub params: &'c Parameters,
    pub timing: &'c Timing,
    pub queue: &'c mut ActionQueue,
    pub transport: &'c mut dyn Transport,
    pub restart: &'c mut dyn Restart,
}

impl Context<'_, '_> {
    pub fn node_number(&self) -> u16 {
        self.config.node_number()
    }

    /// Whether a node-addressed message targets this node
    pub fn is_for_me(&self, msg: &Message) -> bool {
        msg.node_number() == Some(self.config.node_number())
    }

    pub fn put(&mut self, action: Action) {
        self.queue.put(action);
    }

    pub fn send(&mut self, msg: Message) {
        self.queue.put(Action::MessageOut(msg));
    }

    /// Queues `[opcode, nn_hi, nn_lo, args...]` carrying our node number.
    pub fn reply(&mut self, opcode: u8, args: &[u8]) {
        let node_number = self.config.node_number();
        self.send(Message::with_node_number(opcode, node_number, args));
    }

    /// Transmits immediately, bypassing the action queue.
    pub fn send_now(&mut self, msg: &Message) -> Result<(), SendError> {
        let header = Header::new(self.config.bus_address());
        self.transport.send(&Frame::new(header, *msg.data()))
    }

    pub fn send_write_ack(&mut self) {
        self.reply(opcodes::WRACK, &[]);
    }

    pub fn send_response(&mut self, opcode: u8, service: ServiceId, code: ResponseCode) {
        self.reply(
            opcodes::GRSP,
            &[opcode, service.into_u8(), code.into_u8()],
        );
    }

    /// Reports a failed command with both CMDERR and GRSP.
    pub fn send_command_error(&mut self, opcode: u8, service: ServiceId, error: CommandError) {
        debug!(
            "Command {:02x} rejected with error {}",
            opcode,
            error.into_u8()
        );
        self.reply(opcodes::CMDERR, &[error.into_u8()]);
        self.send_response(opcode, service, error.into());
    }

    /// Acknowledges a successful write with both WRACK and GRSP.
    pub fn send_success(&mut self, opcode: u8, service: ServiceId) {
        self.send_write_ack();
        self.send_response(opcode, service, ResponseCode::OK);
    }
}
