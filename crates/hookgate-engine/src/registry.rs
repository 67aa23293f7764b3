//! In-memory trigger registry.
//!
//! Maps channel keys (prefixed room/user identifiers or sentinels) to the
//! outgoing integrations registered under them. Shared mutable
//! process-wide state: add/remove are synchronous, candidate resolution
//! reads whatever the current state is (no snapshot isolation promised).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{Message, OutgoingIntegration, Room, RoomKind};

/// Sentinel bucket for integrations whose event kind doesn't target
/// channels.
pub const KEY_ANY: &str = "__any";
/// Sentinel bucket for integrations with no channel restriction.
pub const KEY_ALL_PUBLIC_CHANNELS: &str = "all_public_channels";
pub const KEY_ALL_DIRECT_MESSAGES: &str = "all_direct_messages";
pub const KEY_ALL_PRIVATE_GROUPS: &str = "all_private_groups";

/// Thread-safe channel-key → integration index.
///
/// Cheaply cloneable (inner state is `Arc`-wrapped); clones share the same
/// underlying buckets, so a registration through one handle is immediately
/// visible through all others, including in-flight retry attempts
/// re-checking enablement.
#[derive(Clone, Default)]
pub struct TriggerRegistry {
    inner: Arc<RwLock<HashMap<String, BTreeMap<String, Arc<OutgoingIntegration>>>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel keys this integration indexes under.
    fn channel_keys(record: &OutgoingIntegration) -> Vec<String> {
        if !record.event.uses_channel() {
            vec![KEY_ANY.to_string()]
        } else if record.channel.is_empty() {
            vec![KEY_ALL_PUBLIC_CHANNELS.to_string()]
        } else {
            record.channel.clone()
        }
    }

    /// Register an integration under every channel key it applies to.
    /// Re-registering the same id replaces any previous registration.
    pub fn register(&self, record: OutgoingIntegration) {
        tracing::debug!(
            integration = %record.name,
            event = %record.event,
            "adding the integration"
        );

        let keys = Self::channel_keys(&record);
        let record = Arc::new(record);

        let mut buckets = self.inner.write();
        for bucket in buckets.values_mut() {
            bucket.remove(&record.id);
        }
        buckets.retain(|_, bucket| !bucket.is_empty());

        for key in keys {
            buckets
                .entry(key)
                .or_default()
                .insert(record.id.clone(), Arc::clone(&record));
        }
    }

    /// Remove an integration from every bucket.
    pub fn unregister(&self, id: &str) {
        let mut buckets = self.inner.write();
        for bucket in buckets.values_mut() {
            bucket.remove(id);
        }
        buckets.retain(|_, bucket| !bucket.is_empty());
    }

    /// Flip a registered integration to disabled in every bucket it
    /// occupies, so in-flight retries observe the change at their next
    /// enablement gate. Returns whether the integration was found.
    pub fn disable(&self, id: &str) -> bool {
        let mut buckets = self.inner.write();

        let disabled = buckets.values().find_map(|bucket| {
            bucket.get(id).map(|record| {
                let mut record = (**record).clone();
                record.enabled = false;
                Arc::new(record)
            })
        });

        let Some(disabled) = disabled else {
            return false;
        };

        for bucket in buckets.values_mut() {
            if bucket.contains_key(id) {
                bucket.insert(id.to_string(), Arc::clone(&disabled));
            }
        }
        true
    }

    /// Whether the integration is registered somewhere and enabled.
    /// Absent integrations report `false`, never an error.
    pub fn is_enabled(&self, id: &str) -> bool {
        let buckets = self.inner.read();
        buckets
            .values()
            .find_map(|bucket| bucket.get(id))
            .is_some_and(|record| record.enabled)
    }

    /// Deduplicated set of integrations that could apply to this
    /// room/message, by room-type rules. The `__any` bucket is always
    /// appended, so executor-level event filtering remains mandatory.
    /// A missing room yields only the `__any` bucket.
    pub fn resolve_candidates(
        &self,
        room: Option<&Room>,
        message: Option<&Message>,
    ) -> Vec<Arc<OutgoingIntegration>> {
        let buckets = self.inner.read();
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<Arc<OutgoingIntegration>> = Vec::new();

        let collect = |key: &str,
                       seen: &mut HashSet<String>,
                       out: &mut Vec<Arc<OutgoingIntegration>>| {
            if let Some(bucket) = buckets.get(key) {
                for record in bucket.values() {
                    if seen.insert(record.id.clone()) {
                        out.push(Arc::clone(record));
                    }
                }
            }
        };

        if let Some(room) = room {
            match room.kind {
                RoomKind::Direct => {
                    collect(KEY_ALL_DIRECT_MESSAGES, &mut seen, &mut candidates);

                    for uid in &room.uids {
                        collect(&format!("@{uid}"), &mut seen, &mut candidates);
                    }

                    let author = message.map(|m| m.author.username.as_str());
                    for username in &room.usernames {
                        if Some(username.as_str()) == author {
                            continue;
                        }
                        collect(&format!("@{username}"), &mut seen, &mut candidates);
                    }
                }
                RoomKind::Public => {
                    collect(KEY_ALL_PUBLIC_CHANNELS, &mut seen, &mut candidates);
                    collect(&format!("#{}", room.id), &mut seen, &mut candidates);
                    if let Some(name) = &room.name {
                        if *name != room.id {
                            collect(&format!("#{name}"), &mut seen, &mut candidates);
                        }
                    }
                }
                _ => {
                    collect(KEY_ALL_PRIVATE_GROUPS, &mut seen, &mut candidates);
                    collect(&format!("#{}", room.id), &mut seen, &mut candidates);
                    if let Some(name) = &room.name {
                        if *name != room.id {
                            collect(&format!("#{name}"), &mut seen, &mut candidates);
                        }
                    }
                }
            }
        }

        // Channel-independent integrations apply to every event.
        collect(KEY_ANY, &mut seen, &mut candidates);

        candidates
    }
}
