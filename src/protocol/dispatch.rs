//! Routing of decoded messages.
//!
//! Precedence, first match wins:
//!
//! 1. `NAME:*:...`  control envelope
//! 2. `B:...`       button
//! 3. `NAME:KA`     keep-alive, no-op
//! 4. `NAME:text`   broadcast `text` to NAME's collection, if it has one
//!
//! The dispatcher never writes to sockets. It returns the deliveries to make
//! and the hub performs them, skipping do-not-send destinations.

use std::collections::HashSet;
use std::time::Instant;

use super::{ControlCommand, Delivery, EffectCommand, Message, ProtocolError};
use crate::choreography::{ButtonAction, ButtonPress, Choreographer};
use crate::config::Config;
use crate::constants::{BUTTON_NAME, KEEP_ALIVE};
use crate::registry::{ConnectionId, EffectRef, EffectRegistry};
use crate::scheduler::EventScheduler;

/// Stateless message router. All mutable state is passed in.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    choreographer: Choreographer,
}

impl Dispatcher {
    /// Create a dispatcher that plans button rounds with `choreographer`.
    pub fn new(choreographer: Choreographer) -> Self {
        Self { choreographer }
    }

    /// Create a dispatcher with round timing taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Choreographer::from_config(config))
    }

    /// Interpret one message. `now` latches the start of any generated round.
    pub fn dispatch(
        &self,
        registry: &mut EffectRegistry,
        scheduler: &mut EventScheduler,
        message: &Message,
        now: Instant,
    ) -> Result<Vec<Delivery>, ProtocolError> {
        if message.is_control() {
            return Ok(self.control(registry, scheduler, message, ControlCommand::parse(message)?));
        }

        if message.name == BUTTON_NAME {
            return self.button(registry, scheduler, message, now);
        }

        match message.field(0) {
            None | Some(KEEP_ALIVE) => Ok(Vec::new()),
            Some(text) => Ok(broadcast_to_collection(registry, message, text)),
        }
    }

    fn control(
        &self,
        registry: &mut EffectRegistry,
        scheduler: &mut EventScheduler,
        message: &Message,
        command: ControlCommand,
    ) -> Vec<Delivery> {
        match command {
            ControlCommand::SetOrder(names) => {
                log::info!("[Registry] {} set round order: {}", message.name, names.join(","));
                registry.set_order(names);
                Vec::new()
            }
            ControlCommand::SetCollection(collection) => {
                log::info!(
                    "[Registry] {} set collection: {}",
                    message.name,
                    collection.members().join(",")
                );
                registry.set_collection(&message.name, collection);
                Vec::new()
            }
            ControlCommand::DoNotSend(flag) => {
                log::info!("[Registry] {} do-not-send = {}", message.name, flag);
                registry.set_do_not_send(&message.name, flag);
                Vec::new()
            }
            ControlCommand::KillAll => {
                let dropped = scheduler.clear();
                log::info!(
                    "[Round] Kill-all from {}: dropped {} pending event(s)",
                    message.name,
                    dropped
                );
                command_each_connection(&registry.get_all(), None, EffectCommand::Deactivate)
            }
        }
    }

    fn button(
        &self,
        registry: &mut EffectRegistry,
        scheduler: &mut EventScheduler,
        message: &Message,
        now: Instant,
    ) -> Result<Vec<Delivery>, ProtocolError> {
        let Some(press) = ButtonPress::parse(message)? else {
            return Ok(Vec::new());
        };
        log::debug!("[Round] Button {} {}", press.button, if press.pressed { "down" } else { "up" });

        let all = registry.get_all();
        let ordered = registry.get_ordered();
        match self.choreographer.on_button(press, &ordered, &all, &message.name) {
            ButtonAction::Broadcast(command) => {
                Ok(command_each_connection(&all, Some(message.origin), command))
            }
            ButtonAction::Round(events) => {
                scheduler.push_sequence(now, events);
                Ok(Vec::new())
            }
            ButtonAction::Ignore => Ok(Vec::new()),
        }
    }
}

/// `command` once to each connection behind `targets`, minus `skip`.
///
/// A connection that announced several names still gets a single send.
fn command_each_connection(
    targets: &[EffectRef],
    skip: Option<ConnectionId>,
    command: EffectCommand,
) -> Vec<Delivery> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .filter(|target| Some(target.connection) != skip)
        .filter(|target| seen.insert(target.connection))
        .map(|target| Delivery::command(target.connection, command))
        .collect()
}

fn broadcast_to_collection(registry: &mut EffectRegistry, message: &Message, text: &str) -> Vec<Delivery> {
    let Some(targets) = registry.collection_targets(&message.name) else {
        log::trace!("[Registry] {} has no collection, dropping {:?}", message.name, text);
        return Vec::new();
    };
    targets
        .iter()
        .filter(|target| target.connection != message.origin)
        .map(|target| Delivery::text(target.connection, text))
        .collect()
}
