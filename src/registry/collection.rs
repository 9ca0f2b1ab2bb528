//! Named broadcast groups owned by individual effects.
//!
//! A [`Collection`] stores member *names*, never connections. Connections are
//! resolved through the registry and cached together with the registry stamp
//! they were resolved against; the cache is rebuilt whenever the stamps
//! differ.

use std::sync::Arc;

use super::{ConnectionId, EffectRef};
use crate::constants::LIST_SEPARATOR;

/// Broadcast group attached to an owner effect.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Member names in the order they were given.
    members: Vec<String>,
    /// Members resolved to live connections, tagged with the registry stamp.
    resolved: Option<(u64, Arc<[EffectRef]>)>,
}

impl Collection {
    /// Create a collection from member names. Blank names are dropped.
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: members
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.is_empty())
                .collect(),
            resolved: None,
        }
    }

    /// Parse a comma separated member list (`LULU,BIGBETTY`).
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(LIST_SEPARATOR).map(str::trim))
    }

    /// Member names.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Returns true if the collection names no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the resolved view was built against a different registry stamp.
    pub fn is_stale(&self, stamp: u64) -> bool {
        !matches!(self.resolved, Some((built, _)) if built == stamp)
    }

    /// Return the resolved members, re-resolving first if the view is stale.
    ///
    /// `resolve` maps a member name to its current connection. Members that
    /// are unknown or offline are left out of the view.
    pub fn refresh_if_stale<F>(&mut self, stamp: u64, resolve: F) -> Arc<[EffectRef]>
    where
        F: Fn(&str) -> Option<ConnectionId>,
    {
        if let Some((built, view)) = &self.resolved {
            if *built == stamp {
                return Arc::clone(view);
            }
        }

        let view: Arc<[EffectRef]> = self
            .members
            .iter()
            .filter_map(|name| {
                resolve(name).map(|connection| EffectRef {
                    name: name.clone(),
                    connection,
                })
            })
            .collect();

        log::trace!(
            "[Registry] Collection refreshed at stamp {}: {}/{} members online",
            stamp,
            view.len(),
            self.members.len()
        );
        self.resolved = Some((stamp, Arc::clone(&view)));
        view
    }
}
