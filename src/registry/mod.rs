//! Registry of named effects and their live connections.
//!
//! The registry is the single source of truth for which effect is reachable
//! on which connection. It owns every [`Effect`] record; everything else
//! (collections, choreography snapshots, cached lists) refers to effects by
//! name and resolves through here.
//!
//! # Modification stamp
//!
//! Every structural mutation (bind, unbind, do-not-send change, order change,
//! collection change) bumps a monotonically increasing stamp. Reads never do.
//! Derived views record the stamp they were built against and are valid only
//! while it is *equal* to the current one:
//!
//! ```text
//! stamp ──► 7        all-cache (7)     ✓ reuse
//!                    ordered-cache (5) ✗ rebuild
//! ```
//!
//! # Binding policy
//!
//! - Unknown name: create the effect, append it to the round order.
//! - Known, offline name: bind it to the new connection.
//! - Known name bound elsewhere from the same peer IP: reconnection. The old
//!   connection is reported back as stale so the transport can close it.
//! - Known name bound elsewhere from a different IP: rejected, no mutation.

pub mod collection;

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

pub use collection::Collection;

/// Opaque handle for one accepted TCP connection.
///
/// Allocated by the transport loop from a counter and never reused, so a
/// stale id can never alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw connection number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw connection number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Name/connection pair for a currently bound effect.
///
/// This is a value snapshot: holding one does not keep the connection alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EffectRef {
    /// Effect name.
    pub name: String,
    /// Connection the effect was bound to when the snapshot was taken.
    pub connection: ConnectionId,
}

/// A named actuator known to the hub.
#[derive(Debug)]
pub struct Effect {
    name: String,
    connection: Option<ConnectionId>,
    /// Peer IP of the most recent binding, kept while offline.
    address: Option<IpAddr>,
    do_not_send: bool,
    collection: Option<Collection>,
}

impl Effect {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connection: None,
            address: None,
            do_not_send: false,
            collection: None,
        }
    }

    /// Effect name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current connection, `None` when offline.
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// Peer IP of the most recent binding.
    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    /// Whether this effect must never be a delivery target.
    pub fn do_not_send(&self) -> bool {
        self.do_not_send
    }

    /// Broadcast group owned by this effect.
    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    /// Returns true if the effect currently has a connection.
    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    fn snapshot(&self) -> Option<EffectRef> {
        self.connection.map(|connection| EffectRef {
            name: self.name.clone(),
            connection,
        })
    }
}

/// Result of [`EffectRegistry::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// First time this name was seen.
    Created,
    /// Known but offline name is now bound.
    Bound,
    /// Name was already bound to this connection.
    Unchanged,
    /// Same device reconnected; `stale` must be closed by the caller.
    Rebound {
        /// Connection the name was previously bound to.
        stale: ConnectionId,
    },
    /// A different device already holds the name. Nothing changed.
    Rejected {
        /// Connection that keeps the name.
        holder: ConnectionId,
    },
}

impl BindOutcome {
    /// Whether the record that triggered the bind should be dispatched.
    pub fn accepted(self) -> bool {
        !matches!(self, BindOutcome::Rejected { .. })
    }

    fn mutates(self) -> bool {
        matches!(
            self,
            BindOutcome::Created | BindOutcome::Bound | BindOutcome::Rebound { .. }
        )
    }
}

/// Derived list tagged with the stamp it was built against.
type StampedList = Option<(u64, Arc<[EffectRef]>)>;

/// Name-keyed store of effects with stamp-validated derived lists.
#[derive(Debug, Default)]
pub struct EffectRegistry {
    effects: HashMap<String, Effect>,
    /// Round order by name; may name effects that have never connected.
    order: Vec<String>,
    stamp: u64,
    all_cache: StampedList,
    ordered_cache: StampedList,
}

impl EffectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with an initial round order.
    pub fn with_order<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        registry.set_order(order);
        registry
    }

    /// Current modification stamp.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Number of known effects, bound or not.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Returns true if no effect has ever been seen.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Current round order by name.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    fn touch(&mut self) {
        self.stamp += 1;
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find an effect by name.
    pub fn lookup_by_name(&self, name: &str) -> Option<&Effect> {
        self.effects.get(name)
    }

    /// Find the first effect bound to a connection.
    ///
    /// Linear scan; the registry holds tens of entries.
    pub fn lookup_by_connection(&self, connection: ConnectionId) -> Option<&Effect> {
        self.effects
            .values()
            .find(|effect| effect.connection == Some(connection))
    }

    /// Whether any effect bound to `connection` is flagged do-not-send.
    pub fn is_do_not_send(&self, connection: ConnectionId) -> bool {
        self.effects
            .values()
            .any(|effect| effect.connection == Some(connection) && effect.do_not_send)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Associate `name` with `connection`, arriving from `address`.
    pub fn bind(&mut self, name: &str, connection: ConnectionId, address: IpAddr) -> BindOutcome {
        let outcome = if let Some(effect) = self.effects.get_mut(name) {
            match effect.connection {
                Some(current) if current == connection => BindOutcome::Unchanged,
                None => {
                    effect.connection = Some(connection);
                    effect.address = Some(address);
                    BindOutcome::Bound
                }
                Some(current) if effect.address == Some(address) => {
                    effect.connection = Some(connection);
                    BindOutcome::Rebound { stale: current }
                }
                Some(current) => BindOutcome::Rejected { holder: current },
            }
        } else {
            let mut effect = Effect::new(name);
            effect.connection = Some(connection);
            effect.address = Some(address);
            self.effects.insert(name.to_string(), effect);
            if !self.order.iter().any(|n| n == name) {
                self.order.push(name.to_string());
            }
            BindOutcome::Created
        };

        if outcome.mutates() {
            self.touch();
        }
        outcome
    }

    /// Mark every effect bound to `connection` as offline.
    ///
    /// Returns the names that were unbound.
    pub fn unbind(&mut self, connection: ConnectionId) -> Vec<String> {
        let names: Vec<String> = self
            .effects
            .values_mut()
            .filter(|effect| effect.connection == Some(connection))
            .map(|effect| {
                effect.connection = None;
                effect.name.clone()
            })
            .collect();

        if !names.is_empty() {
            self.touch();
        }
        names
    }

    /// Set the do-not-send flag. Returns false if the name is unknown.
    pub fn set_do_not_send(&mut self, name: &str, flag: bool) -> bool {
        let Some(effect) = self.effects.get_mut(name) else {
            return false;
        };
        if effect.do_not_send != flag {
            effect.do_not_send = flag;
            self.touch();
        }
        true
    }

    /// Replace the round order. Repeated names keep their first position.
    pub fn set_order<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order: Vec<String> = Vec::new();
        for name in names.into_iter().map(Into::into) {
            if !name.is_empty() && !order.contains(&name) {
                order.push(name);
            }
        }
        self.order = order;
        self.touch();
    }

    /// Attach a broadcast collection to `owner`. An empty collection detaches it.
    ///
    /// Returns false if the owner is unknown.
    pub fn set_collection(&mut self, owner: &str, collection: Collection) -> bool {
        let Some(effect) = self.effects.get_mut(owner) else {
            return false;
        };
        effect.collection = if collection.is_empty() {
            None
        } else {
            Some(collection)
        };
        self.touch();
        true
    }

    // =========================================================================
    // Derived views
    // =========================================================================

    /// All currently bound effects, in ascending connection order.
    pub fn get_all(&mut self) -> Arc<[EffectRef]> {
        if let Some((built, list)) = &self.all_cache {
            if *built == self.stamp {
                return Arc::clone(list);
            }
        }
        let list = self.compute_all();
        self.all_cache = Some((self.stamp, Arc::clone(&list)));
        list
    }

    /// Bound effects in round order.
    pub fn get_ordered(&mut self) -> Arc<[EffectRef]> {
        if let Some((built, list)) = &self.ordered_cache {
            if *built == self.stamp {
                return Arc::clone(list);
            }
        }
        let list = self.compute_ordered();
        self.ordered_cache = Some((self.stamp, Arc::clone(&list)));
        list
    }

    fn compute_all(&self) -> Arc<[EffectRef]> {
        let mut list: Vec<EffectRef> = self.effects.values().filter_map(Effect::snapshot).collect();
        list.sort_by(|a, b| a.connection.cmp(&b.connection).then_with(|| a.name.cmp(&b.name)));
        list.into()
    }

    fn compute_ordered(&self) -> Arc<[EffectRef]> {
        self.order
            .iter()
            .filter_map(|name| self.effects.get(name).and_then(Effect::snapshot))
            .collect()
    }

    /// Live members of `owner`'s collection, excluding nothing.
    ///
    /// Re-resolves member names if the collection was resolved against an
    /// older stamp. Returns `None` if the owner is unknown or has no
    /// collection.
    pub fn collection_targets(&mut self, owner: &str) -> Option<Arc<[EffectRef]>> {
        let stamp = self.stamp;
        let mut collection = self.effects.get_mut(owner)?.collection.take()?;

        let effects = &self.effects;
        let view = collection.refresh_if_stale(stamp, |name| {
            effects.get(name).and_then(|effect| effect.connection)
        });

        if let Some(effect) = self.effects.get_mut(owner) {
            effect.collection = Some(collection);
        }
        Some(view)
    }
}
