//! Engine facade and builder.
//!
//! [`TriggerEngine`] is the entry point the rest of the system talks to:
//! register/unregister integrations, feed it application events, replay a
//! stored execution. It is cheaply cloneable; clones share the registry
//! and collaborators, which is what lets spawned retry attempts re-enter
//! the state machine.

use std::sync::Arc;

use crate::defaults::{
    DefaultScriptEngine, InMemoryChatDirectory, InMemoryHistorySink, ReqwestTransport,
    StaticSettings,
};
use crate::dispatcher::MessageDispatcher;
use crate::errors::ExecuteError;
use crate::events::{normalize_event, EventArgs, NormalizedEvent};
use crate::history::HistoryEntry;
use crate::registry::TriggerRegistry;
use crate::traits::{
    ChangeNotifier, ChatDirectory, HistorySink, HttpTransport, NoopChangeNotifier, ScriptEngine,
    SettingsProvider,
};
use crate::types::OutgoingIntegration;

pub(crate) struct EngineInner {
    pub(crate) registry: TriggerRegistry,
    pub(crate) script_engine: Arc<dyn ScriptEngine>,
    pub(crate) directory: Arc<dyn ChatDirectory>,
    pub(crate) dispatcher: MessageDispatcher,
    pub(crate) history: Arc<dyn HistorySink>,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) notifier: Arc<dyn ChangeNotifier>,
}

/// The outgoing integration trigger engine.
#[derive(Clone)]
pub struct TriggerEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl TriggerEngine {
    pub fn builder() -> TriggerEngineBuilder {
        TriggerEngineBuilder::new()
    }

    /// Index an integration under every channel key it applies to.
    pub fn add_integration(&self, record: OutgoingIntegration) {
        self.inner.registry.register(record);
    }

    /// Remove an integration from the registry entirely.
    pub fn remove_integration(&self, id: &str) {
        self.inner.registry.unregister(id);
    }

    /// Whether the integration is registered and enabled. Absent
    /// integrations report `false`.
    pub fn is_trigger_enabled(&self, id: &str) -> bool {
        self.inner.registry.is_enabled(id)
    }

    /// Entry point for application events: normalize, select candidate
    /// integrations, and run each matching enabled one. Failures inside
    /// one trigger never abort the others.
    pub async fn execute_triggers(&self, event_name: &str, args: EventArgs) {
        tracing::debug!(event = event_name, "execute trigger");

        let event = normalize_event(event_name, args);
        let Some(kind) = event.kind else {
            return;
        };

        tracing::debug!(
            room = event.room.as_ref().map(|r| r.id.as_str()).unwrap_or("__any"),
            "starting search for triggers for the room"
        );

        let candidates = self
            .inner
            .registry
            .resolve_candidates(event.room.as_ref(), event.message.as_ref());

        tracing::debug!(
            count = candidates.len(),
            "found triggers to iterate over and see if they match the event"
        );

        for trigger in candidates {
            tracing::debug!(
                integration = %trigger.name,
                enabled = trigger.enabled,
                event = %trigger.event,
                "considering trigger"
            );
            if trigger.enabled && trigger.event == kind {
                self.execute_trigger(trigger, &event).await;
            }
        }
    }

    /// Re-run a single URL execution from a stored history entry,
    /// re-deriving the event from the entry's embedded ids.
    pub async fn replay(
        &self,
        integration: &OutgoingIntegration,
        entry: &HistoryEntry,
    ) -> Result<(), ExecuteError> {
        let Some(data) = &entry.data else {
            return Err(ExecuteError::HistoryDataMissing);
        };

        let directory = &self.inner.directory;

        let mut event = NormalizedEvent {
            kind: entry.event,
            ..NormalizedEvent::default()
        };
        if let Some(owner) = &data.owner {
            event.owner = directory.find_user_by_id(&owner.id).await;
        }
        if let Some(message_id) = &data.message_id {
            event.message = directory.find_message_by_id(message_id).await;
        }
        if let Some(channel_id) = &data.channel_id {
            event.room = directory.find_room_by_id(channel_id).await;
        }
        if let Some(user_id) = &data.user_id {
            event.user = directory.find_user_by_id(user_id).await;
        }

        let Some(url) = entry.url.clone() else {
            return Ok(());
        };

        self.execute_trigger_url(url, Arc::new(integration.clone()), event, 0)
            .await
    }
}

/// Builder for assembling a [`TriggerEngine`].
///
/// All collaborator slots are optional; defaults are applied during
/// [`build()`](TriggerEngineBuilder::build).
pub struct TriggerEngineBuilder {
    script_engine: Option<Arc<dyn ScriptEngine>>,
    directory: Option<Arc<dyn ChatDirectory>>,
    history: Option<Arc<dyn HistorySink>>,
    transport: Option<Arc<dyn HttpTransport>>,
    settings: Option<Arc<dyn SettingsProvider>>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl TriggerEngineBuilder {
    fn new() -> Self {
        Self {
            script_engine: None,
            directory: None,
            history: None,
            transport: None,
            settings: None,
            notifier: None,
        }
    }

    /// Set the script engine. Default: [`DefaultScriptEngine`].
    pub fn script_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.script_engine = Some(engine);
        self
    }

    /// Set the chat directory. Default: [`InMemoryChatDirectory`].
    pub fn directory(mut self, directory: Arc<dyn ChatDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the history sink. Default: [`InMemoryHistorySink`].
    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Set the HTTP transport. Default: [`ReqwestTransport`].
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the settings provider. Default: empty [`StaticSettings`].
    pub fn settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the change notifier. Default: [`NoopChangeNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> TriggerEngine {
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(InMemoryChatDirectory::new()));

        TriggerEngine {
            inner: Arc::new(EngineInner {
                registry: TriggerRegistry::new(),
                script_engine: self
                    .script_engine
                    .unwrap_or_else(|| Arc::new(DefaultScriptEngine)),
                dispatcher: MessageDispatcher::new(Arc::clone(&directory)),
                directory,
                history: self
                    .history
                    .unwrap_or_else(|| Arc::new(InMemoryHistorySink::new())),
                transport: self.transport.unwrap_or_else(|| Arc::new(ReqwestTransport)),
                settings: self.settings.unwrap_or_else(|| Arc::new(StaticSettings::new())),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(NoopChangeNotifier)),
            }),
        }
    }
}

impl Default for TriggerEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
