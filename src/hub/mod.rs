//! Hub: the server that owns every effect connection.
//!
//! One `Hub` value holds all mutable state: the listener, the connection
//! table, the effect registry and the event scheduler. It runs on a single
//! task, so nothing here is shared or locked.
//!
//! # Flow
//!
//! ```text
//! accept ──> EffectConn (reader task) ──HubEvent──> Hub::handle_hub_event
//!                                                     │
//!                                   RecordDecoder ─> bind ─> Dispatcher
//!                                                     │
//!            scheduler.poll ─────────────────────> deliver (try_write)
//! ```
//!
//! A delivery that cannot be written immediately marks the destination dead;
//! it is torn down exactly like a connection whose read failed.

pub(crate) mod connection;
pub(crate) mod events;
mod run;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::Config;
use crate::protocol::{Delivery, Dispatcher, Message, Record};
use crate::registry::{BindOutcome, ConnectionId, EffectRegistry};
use crate::scheduler::EventScheduler;
use connection::EffectConn;
use events::HubEvent;

pub use run::serve;

/// Server state for the effect network.
#[derive(Debug)]
pub struct Hub {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,

    registry: EffectRegistry,
    scheduler: EventScheduler,
    dispatcher: Dispatcher,

    /// Live connections keyed by id. Ids are never reused.
    connections: HashMap<ConnectionId, EffectConn>,
    next_connection: u64,

    hub_event_tx: UnboundedSender<HubEvent>,
    hub_event_rx: UnboundedReceiver<HubEvent>,
}

impl Hub {
    /// Bind the listener and seed the registry from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound.
    pub async fn bind(config: Config) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;
        let (hub_event_tx, hub_event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            registry: EffectRegistry::with_order(config.round_order.iter().cloned()),
            scheduler: EventScheduler::new(),
            dispatcher: Dispatcher::from_config(&config),
            config,
            listener,
            local_addr,
            connections: HashMap::new(),
            next_connection: 0,
            hub_event_tx,
            hub_event_rx,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Effects known to the hub.
    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// Timed events not yet fired.
    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn accept_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.next_connection += 1;
        let id = ConnectionId::new(self.next_connection);
        let conn = EffectConn::new(
            id,
            stream,
            peer,
            self.config.read_buffer_len,
            self.config.max_record_len(),
            self.hub_event_tx.clone(),
        );
        log::info!("[Hub] Accepted {id} from {peer}");
        self.connections.insert(id, conn);
    }

    fn handle_hub_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Received { connection, data } => self.handle_read(connection, &data),
            HubEvent::Closed { connection } => self.close_connection(connection),
        }
    }

    fn handle_read(&mut self, id: ConnectionId, data: &[u8]) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return; // Torn down while the read was in flight
        };
        let results = conn.decoder_mut().feed(data);

        for result in results {
            match result {
                Ok(record) => self.handle_record(id, record),
                Err(e) => log::debug!("[Hub] Dropping record from {id}: {e}"),
            }
            if !self.connections.contains_key(&id) {
                break;
            }
        }
    }

    /// Bind the sender's name, then dispatch the record.
    fn handle_record(&mut self, id: ConnectionId, record: Record) {
        let Some(peer) = self.connections.get(&id).map(EffectConn::peer) else {
            return;
        };

        match self.registry.bind(&record.name, id, peer.ip().to_canonical()) {
            BindOutcome::Created => log::info!("[Registry] New effect {} on {id}", record.name),
            BindOutcome::Bound => log::info!("[Registry] {} online on {id}", record.name),
            BindOutcome::Unchanged => {}
            BindOutcome::Rebound { stale } => {
                log::info!("[Registry] {} reconnected: {stale} -> {id}", record.name);
                self.close_connection(stale);
            }
            BindOutcome::Rejected { holder } => {
                log::info!(
                    "[Registry] Rejected claim for {} from {peer}: held by {holder}",
                    record.name
                );
                return;
            }
        }

        let message = Message::from_record(record, id);
        match self
            .dispatcher
            .dispatch(&mut self.registry, &mut self.scheduler, &message, Instant::now())
        {
            Ok(deliveries) => self.deliver_all(deliveries),
            Err(e) => log::debug!("[Hub] Ignoring record from {}: {e}", message.name),
        }
    }

    /// Fire everything the scheduler has due.
    fn poll_scheduler(&mut self) {
        let deliveries = self.scheduler.poll(Instant::now());
        self.deliver_all(deliveries);
    }

    fn deliver_all(&mut self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.deliver(&delivery);
        }
    }

    /// Write one delivery. An unwritable destination is torn down.
    fn deliver(&mut self, delivery: &Delivery) {
        let id = delivery.connection;
        if self.registry.is_do_not_send(id) {
            log::trace!("[Hub] Skipping do-not-send {id}");
            return;
        }
        let Some(conn) = self.connections.get(&id) else {
            return;
        };

        if let Err(e) = conn.try_send(&delivery.payload.encode()) {
            log::info!("[Hub] {id} not writable ({e}), closing");
            self.close_connection(id);
        }
    }

    /// Tear down a connection and mark its effects offline. Unknown ids are
    /// ignored.
    fn close_connection(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        conn.close();

        let names = self.registry.unbind(id);
        if names.is_empty() {
            log::info!("[Hub] Closed {id}");
        } else {
            log::info!("[Hub] Closed {id} ({} offline)", names.join(","));
        }
    }
}
