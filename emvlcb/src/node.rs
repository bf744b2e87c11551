//! Node coordinator
//!
//! The coordinator owns everything a node needs: the persistent configuration, the transport,
//! the parameter block, the action queue and the ordered service list. It is driven by calling
//! [`Coordinator::process`] periodically, either from a superloop or through the async
//! [`Runner`].
//!
//! Each call pops at most one action from the queue and offers it to every service in list
//! order, followed by the service's diagnostics reporter. Services that have nothing to react to
//! still get the call, so timers and polling run every cycle.
//!
//! ## Examples
//!
//! ```
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex as Mutex;
//! use emvlcb::config::{Layout, NodeConfig};
//! use emvlcb::link::Link;
//! use emvlcb::node::{Coordinator, Timing};
//! use emvlcb::params::ModuleInfo;
//! use emvlcb::service::{CanService, MinimumNodeService, NodeVariableService};
//! use emvlcb::store::{RamStore, Restart};
//! use emvlcb::time::Instant;
//!
//! struct Reboot;
//!
//! impl Restart for Reboot {
//!     fn restart(&mut self) -> ! {
//!         panic!("reboot")
//!     }
//! }
//!
//! let mut store = RamStore::<256>::new();
//! let link = Link::<Mutex, 8, 8>::new();
//! let (driver, mut port) = link.split();
//! let mut reboot = Reboot;
//!
//! let mut config = NodeConfig::new(&mut store, Layout::new(4, 16, 2)).unwrap();
//! // Format the store so that start-up does not take the virgin store path
//! config.factory_reset();
//!
//! let services = [
//!     MinimumNodeService::new().into(),
//!     CanService::new().into(),
//!     NodeVariableService::new().into(),
//! ];
//! let module = ModuleInfo::default();
//! let mut node =
//!     Coordinator::new(config, &mut port, &mut reboot, &module, Timing::default(), services)
//!         .unwrap();
//! node.begin();
//!
//! // A button press starts the node number negotiation
//! node.request_mode_change();
//! for ms in 0..4 {
//!     node.process(Instant::from_millis(ms));
//! }
//! assert!(driver.pop_outgoing().is_some());
//! ```

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::action::Action;
use crate::config::NodeConfig;
use crate::core::Mode;
use crate::params::{ModuleInfo, Parameters};
use crate::service::{
    Capability, ConsumedEvent, Context, DiagnosticReporter, LongMessageService, ProduceError,
    Service, ServiceInfo,
};
use crate::store::Restart;
use crate::transport::Transport;
use crate::utils::{QueueStats, RingQueue};

mod runner;

pub use runner::Runner;

/// Maximal number of services per node
pub const MAX_SERVICES: usize = 12;
pub const ACTION_QUEUE_CAPACITY: usize = 32;

pub(crate) type ActionQueue = RingQueue<Action, ACTION_QUEUE_CAPACITY>;

/// Protocol timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Timing {
    /// Node number negotiation deadline
    pub setup_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Time to collect enumeration answers
    pub enumeration_window: Duration,
    /// Gap between frames of a multi-frame reply
    pub burst_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            setup_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(5),
            enumeration_window: Duration::from_millis(100),
            burst_interval: Duration::from_millis(10),
        }
    }
}

/// State to be shown on the user interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Indication {
    pub mode: Mode,
    /// Set when something noteworthy happened, see [`Coordinator::take_activity`]
    pub activity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceError {
    TooManyServices,
    /// The node has no service of the required kind
    NotRegistered,
    Produce(ProduceError),
}

impl From<ProduceError> for ServiceError {
    fn from(value: ProduceError) -> Self {
        ServiceError::Produce(value)
    }
}

struct Entry<'a> {
    service: Service<'a>,
    diagnostics: DiagnosticReporter,
}

pub struct Coordinator<'a> {
    config: NodeConfig<'a>,
    transport: &'a mut dyn Transport,
    restart: &'a mut dyn Restart,
    params: Parameters,
    timing: Timing,
    queue: ActionQueue,
    services: Vec<Entry<'a>, MAX_SERVICES>,
    service_info: Vec<ServiceInfo, MAX_SERVICES>,
    indication: Indication,
}

/// Lends the coordinator state to the service at `index` (0-based).
macro_rules! context {
    ($self:ident, $now:expr, $index:expr) => {
        Context {
            now: $now,
            index: $index as u8 + 1,
            services: &$self.service_info,
            config: &mut $self.config,
            params: &$self.params,
            timing: &$self.timing,
            queue: &mut $self.queue,
            transport: &mut *$self.transport,
            restart: &mut *$self.restart,
        }
    };
}

impl<'a> Coordinator<'a> {
    pub fn new(
        config: NodeConfig<'a>,
        transport: &'a mut dyn Transport,
        restart: &'a mut dyn Restart,
        module: &ModuleInfo,
        timing: Timing,
        services: impl IntoIterator<Item = Service<'a>>,
    ) -> Result<Self, ServiceError> {
        let mut entries = Vec::new();
        let mut service_info = Vec::new();
        let mut service_flags = 0;
        for service in services {
            service_flags |= service.parameter_flags();
            service_info
                .push(service.info())
                .map_err(|_| ServiceError::TooManyServices)?;
            let entry = Entry {
                service,
                diagnostics: DiagnosticReporter::new(),
            };
            if entries.push(entry).is_err() {
                return Err(ServiceError::TooManyServices);
            }
        }
        let params = Parameters::new(module, config.layout(), service_flags);

        Ok(Self {
            config,
            transport,
            restart,
            params,
            timing,
            queue: RingQueue::new(),
            services: entries,
            service_info,
            indication: Indication {
                mode: Mode::Uninitialised,
                activity: false,
            },
        })
    }

    /// Loads the configuration. Restarts the device if the store is virgin.
    pub fn begin(&mut self) {
        self.config.begin(&mut *self.restart);
        self.transport.reset();
        self.indication.mode = self.config.mode();
        info!("Node started in mode {}", self.config.mode().into_u8());
    }

    /// Runs one processing cycle.
    pub fn process(&mut self, now: Instant) {
        let action = self.queue.pop().ok();
        match action {
            Some(Action::IndicateMode(mode)) => self.indication.mode = mode,
            Some(Action::IndicateActivity) => self.indication.activity = true,
            _ => {}
        }

        for (index, entry) in self.services.iter_mut().enumerate() {
            let mut ctx = context!(self, now, index);
            entry.service.process(&mut ctx, action.as_ref());
            entry
                .diagnostics
                .process(&entry.service, &mut ctx, action.as_ref());
        }
    }

    pub fn put_action(&mut self, action: Action) {
        self.queue.put(action);
    }

    /// Advances the mode state machine, as a button press would.
    pub fn request_mode_change(&mut self) {
        self.queue.put(Action::ChangeMode);
    }

    /// Requests a new node number negotiation keeping the current number meanwhile.
    pub fn request_renegotiation(&mut self) {
        self.queue.put(Action::Renegotiate);
    }

    pub fn config(&self) -> &NodeConfig<'a> {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut NodeConfig<'a> {
        &mut self.config
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn services(&self) -> &[ServiceInfo] {
        &self.service_info
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn indication(&self) -> Indication {
        self.indication
    }

    /// Returns and clears the activity flag.
    pub fn take_activity(&mut self) -> bool {
        core::mem::take(&mut self.indication.activity)
    }

    /// Sends the event learned in `slot` through the producer service.
    pub fn produce_event(
        &mut self,
        now: Instant,
        slot: u8,
        on: bool,
        data: &[u8],
    ) -> Result<(), ServiceError> {
        for (index, entry) in self.services.iter_mut().enumerate() {
            if let Service::EventProducer(producer) = &mut entry.service {
                let mut ctx = context!(self, now, index);
                return producer.produce(&mut ctx, slot, on, data).map_err(Into::into);
            }
        }
        Err(ServiceError::NotRegistered)
    }

    /// Next event matched by the consumer service
    pub fn take_consumed_event(&mut self) -> Option<ConsumedEvent> {
        self.services
            .iter_mut()
            .find_map(|entry| match &mut entry.service {
                Service::EventConsumer(consumer) => consumer.take_event(),
                _ => None,
            })
    }

    pub fn long_message(&mut self) -> Option<&mut LongMessageService<'a>> {
        self.services
            .iter_mut()
            .find_map(|entry| match &mut entry.service {
                Service::LongMessage(service) => Some(service),
                _ => None,
            })
    }
}
