//! The registry of providers, chats, sessions and knowledge contexts.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use brunch::{Conversation, EnvConfig, Snapshot};
use chat_provider::{ChatProvider, ContextSettings, ProviderSettings};
use chat_store::{json_key, DirectoryStore, InstallLayout, KeyValueStore, MemoryStore};

use crate::commands::{Command, LoadChat, NewChat, NewProvider};
use crate::error::CoreError;
use crate::session::{normalize_session_id, Session};

/// Conversation shared between the registry and the front-end that loaded it.
pub type SharedConversation = Arc<Mutex<Conversation>>;

/// Owns every loaded resource behind coarse locks.
///
/// No lock is held while a provider runs: [`Core::submit_message`] prepares
/// the turn, releases the conversation, calls the provider and re-locks to
/// apply the reply.
pub struct Core {
    layout: Option<InstallLayout>,
    chat_store: Arc<dyn KeyValueStore>,
    provider_store: Arc<dyn KeyValueStore>,
    base_providers: HashMap<String, Arc<dyn ChatProvider>>,
    default_provider: Option<String>,
    providers: Mutex<HashMap<String, Arc<dyn ChatProvider>>>,
    sessions: Mutex<HashMap<String, Session>>,
    active_chats: Mutex<HashMap<String, SharedConversation>>,
    contexts: Mutex<HashMap<String, ContextSettings>>,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("layout", &self.layout)
            .field("providers", &self.provider_names())
            .field("sessions", &self.session_list())
            .finish_non_exhaustive()
    }
}

impl Core {
    /// Opens the stores of an installed layout.
    pub fn open(
        layout: InstallLayout,
        base_providers: Vec<Arc<dyn ChatProvider>>,
    ) -> Result<Self, CoreError> {
        if !layout.is_installed() {
            return Err(CoreError::NotInstalled {
                path: layout.root().to_path_buf(),
            });
        }

        let chat_store = DirectoryStore::open(layout.chat_store())?;
        let provider_store = DirectoryStore::open(layout.provider_store())?;
        tracing::info!(root = %layout.root().display(), "opened brunch core");

        Ok(Self::with_stores(
            Some(layout),
            Arc::new(chat_store),
            Arc::new(provider_store),
            base_providers,
        ))
    }

    /// Opens the installation named by `config` and restores its providers.
    pub fn from_config(
        config: &EnvConfig,
        base_providers: Vec<Arc<dyn ChatProvider>>,
    ) -> Result<Self, CoreError> {
        let mut core = Self::open(InstallLayout::new(config.home.clone()), base_providers)?;
        core.default_provider = config.default_provider.clone();
        core.load_providers()?;
        Ok(core)
    }

    /// Registry backed by in-memory stores; sessions get no directory.
    #[must_use]
    pub fn in_memory(base_providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self::with_stores(
            None,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            base_providers,
        )
    }

    #[must_use]
    pub fn with_stores(
        layout: Option<InstallLayout>,
        chat_store: Arc<dyn KeyValueStore>,
        provider_store: Arc<dyn KeyValueStore>,
        base_providers: Vec<Arc<dyn ChatProvider>>,
    ) -> Self {
        let base_providers: HashMap<String, Arc<dyn ChatProvider>> = base_providers
            .into_iter()
            .map(|provider| (provider.settings().name, provider))
            .collect();

        Self {
            layout,
            chat_store,
            provider_store,
            providers: Mutex::new(base_providers.clone()),
            base_providers,
            default_provider: None,
            sessions: Mutex::new(HashMap::new()),
            active_chats: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Provider used by `new-chat` when the command names none.
    #[must_use]
    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Runs `command` in the session `session_id`, creating the session on
    /// first use. `chat` hands back the loaded conversation.
    pub fn execute(
        &self,
        session_id: &str,
        command: Command,
    ) -> Result<Option<SharedConversation>, CoreError> {
        let session_id = normalize_session_id(session_id).ok_or(CoreError::SessionIdRequired)?;
        lock_unpoisoned(&self.sessions)
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, None));

        tracing::debug!(session = session_id, command = command.keyword(), "executing command");
        match command {
            Command::NewProvider(command) => {
                self.new_provider(&command)?;
                Ok(None)
            }
            Command::NewChat(command) => {
                self.new_chat_command(&command)?;
                Ok(None)
            }
            Command::Chat(LoadChat { name, hash }) => {
                let chat = self.load_chat(&name, hash.as_deref())?;
                if let Some(session) = lock_unpoisoned(&self.sessions).get_mut(session_id) {
                    session.set_active_chat(name);
                }
                Ok(Some(chat))
            }
        }
    }

    /// Clones the base provider `host` with the command's overrides and
    /// registers it.
    pub fn new_provider(&self, command: &NewProvider) -> Result<(), CoreError> {
        if lock_unpoisoned(&self.providers).contains_key(&command.name) {
            return Err(CoreError::ProviderExists {
                name: command.name.clone(),
            });
        }
        let base = self
            .base_providers
            .get(&command.host)
            .ok_or_else(|| CoreError::HostNotFound {
                host: command.host.clone(),
            })?;

        let base_settings = base.settings();
        let max_tokens = if command.max_tokens == 0 || command.max_tokens > base_settings.max_tokens
        {
            base_settings.max_tokens
        } else {
            command.max_tokens
        };
        let temperature = if command.temperature == 0.0 || command.temperature > 1.0 {
            base_settings.temperature
        } else {
            command.temperature
        };

        let settings = ProviderSettings {
            name: command.name.clone(),
            host: command.host.clone(),
            base_url: command.base_url.clone(),
            model: base_settings.model,
            max_tokens,
            temperature,
            system_prompt: command.system_prompt.clone(),
        };
        let provider =
            base.clone_with_settings(settings)
                .map_err(|source| CoreError::ProviderInit {
                    name: command.name.clone(),
                    source,
                })?;

        self.add_provider(&command.name, provider)
    }

    /// Registers `provider` under `name` and persists its settings.
    pub fn add_provider(
        &self,
        name: &str,
        provider: Arc<dyn ChatProvider>,
    ) -> Result<(), CoreError> {
        let settings = provider.settings();
        let document =
            serde_json::to_vec(&settings).map_err(|source| CoreError::SettingsEncode {
                name: name.to_string(),
                source,
            })?;

        {
            let mut providers = lock_unpoisoned(&self.providers);
            if providers.contains_key(name) {
                return Err(CoreError::ProviderExists {
                    name: name.to_string(),
                });
            }
            providers.insert(name.to_string(), provider);
        }

        self.provider_store.put(&json_key(name), &document)?;
        tracing::info!(provider = name, host = %settings.host, "provider added");
        Ok(())
    }

    /// Re-creates every persisted provider from its host base provider.
    ///
    /// Returns how many providers were loaded.
    pub fn load_providers(&self) -> Result<usize, CoreError> {
        let mut loaded = 0;
        for key in self.provider_store.keys()? {
            if !key.ends_with(".json") {
                continue;
            }
            let Some(document) = self.provider_store.get(&key)? else {
                continue;
            };
            let settings: ProviderSettings = serde_json::from_slice(&document)
                .map_err(|source| CoreError::SettingsDecode {
                    key: key.clone(),
                    source,
                })?;

            let base = self
                .base_providers
                .get(&settings.host)
                .ok_or_else(|| CoreError::HostNotFound {
                    host: settings.host.clone(),
                })?;
            let name = settings.name.clone();
            let provider =
                base.clone_with_settings(settings)
                    .map_err(|source| CoreError::ProviderInit {
                        name: name.clone(),
                        source,
                    })?;

            let mut providers = lock_unpoisoned(&self.providers);
            if providers.contains_key(&name) {
                return Err(CoreError::ProviderExists { name });
            }
            providers.insert(name, provider);
            loaded += 1;
        }

        tracing::debug!(loaded, "providers loaded from store");
        Ok(loaded)
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<dyn ChatProvider>> {
        lock_unpoisoned(&self.providers).get(name).cloned()
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock_unpoisoned(&self.providers).keys().cloned().collect();
        names.sort();
        names
    }

    fn new_chat_command(&self, command: &NewChat) -> Result<(), CoreError> {
        let provider = command
            .provider
            .as_deref()
            .or(self.default_provider.as_deref())
            .ok_or(CoreError::MissingProperty {
                command: "new-chat",
                key: "provider",
            })?;
        self.new_chat(&command.name, provider)
    }

    /// Creates an empty conversation and writes its initial snapshot.
    ///
    /// The chat is not loaded; `chat` loads it.
    pub fn new_chat(&self, name: &str, provider_name: &str) -> Result<(), CoreError> {
        let key = json_key(name);
        if self.chat_store.get(&key)?.is_some() {
            return Err(CoreError::ChatExists {
                name: name.to_string(),
            });
        }

        let provider = self
            .provider(provider_name)
            .ok_or_else(|| CoreError::ProviderNotFound {
                name: provider_name.to_string(),
            })?;

        let conversation = Conversation::new(provider);
        self.write_snapshot(name, &conversation.snapshot()?)?;
        tracing::info!(chat = name, provider = provider_name, "chat created");
        Ok(())
    }

    /// Returns the loaded chat `name`, restoring it from the chat store if
    /// needed, and moves it to `hash` when one is given.
    ///
    /// A restored chat only becomes active once it has reached `hash`.
    pub fn load_chat(&self, name: &str, hash: Option<&str>) -> Result<SharedConversation, CoreError> {
        let active = lock_unpoisoned(&self.active_chats).get(name).cloned();
        let chat = match active {
            Some(chat) => chat,
            None => {
                let mut conversation = self.restore_chat(name)?;
                if let Some(hash) = hash {
                    conversation.goto(hash)?;
                }
                let restored = Arc::new(Mutex::new(conversation));
                let chat = lock_unpoisoned(&self.active_chats)
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(&restored))
                    .clone();
                if Arc::ptr_eq(&chat, &restored) {
                    return Ok(chat);
                }
                chat
            }
        };

        if let Some(hash) = hash {
            lock_unpoisoned(&chat).goto(hash)?;
        }
        Ok(chat)
    }

    fn restore_chat(&self, name: &str) -> Result<Conversation, CoreError> {
        let document = self
            .chat_store
            .get(&json_key(name))?
            .ok_or_else(|| CoreError::ChatNotFound {
                name: name.to_string(),
            })?;
        let snapshot = Snapshot::from_json(&document)?;

        let provider = self
            .provider(&snapshot.provider_name)
            .ok_or_else(|| CoreError::ProviderNotFound {
                name: snapshot.provider_name.clone(),
            })?;
        let contexts = lock_unpoisoned(&self.contexts).clone();

        let conversation = Conversation::restore(provider, &snapshot, &contexts)?;
        tracing::info!(
            chat = name,
            nodes = conversation.tree().node_count(),
            "chat restored from store"
        );
        Ok(conversation)
    }

    /// A chat that has been loaded in this process.
    pub fn active_chat(&self, name: &str) -> Result<SharedConversation, CoreError> {
        lock_unpoisoned(&self.active_chats)
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ChatNotActive {
                name: name.to_string(),
            })
    }

    /// Snapshots the session's active chat into the chat store.
    pub fn save_active_chat(&self, session_id: &str) -> Result<(), CoreError> {
        let session_id = normalize_session_id(session_id).ok_or(CoreError::SessionIdRequired)?;
        let name = lock_unpoisoned(&self.sessions)
            .get(session_id)
            .ok_or_else(|| CoreError::SessionNotFound {
                id: session_id.to_string(),
            })?
            .active_chat()
            .map(str::to_string)
            .ok_or_else(|| CoreError::NoActiveChat {
                session: session_id.to_string(),
            })?;

        let chat = self.active_chat(&name)?;
        let snapshot = lock_unpoisoned(&chat).snapshot()?;
        self.write_snapshot(&name, &snapshot)
    }

    fn write_snapshot(&self, name: &str, snapshot: &Snapshot) -> Result<(), CoreError> {
        self.chat_store.put(&json_key(name), &snapshot.to_json()?)?;
        tracing::debug!(
            chat = name,
            active_branch = %snapshot.active_branch,
            "snapshot written"
        );
        Ok(())
    }

    /// Sends `question` on an active chat without holding any lock during the
    /// provider call.
    ///
    /// Returns `Ok(None)` when the chat is disabled. If the cursor moved while
    /// the provider was running, the reply still lands under the node the
    /// question was asked from.
    pub fn submit_message(&self, chat_name: &str, question: &str) -> Result<Option<String>, CoreError> {
        let chat = self.active_chat(chat_name)?;

        let (provider, turn) = {
            let conversation = lock_unpoisoned(&chat);
            if !conversation.chat_enabled() {
                return Ok(None);
            }
            (
                Arc::clone(conversation.provider()),
                conversation.prepare_turn(question)?,
            )
        };

        let reply = provider.complete(turn.request().clone()).map_err(|error| {
            tracing::warn!(chat = chat_name, %error, "provider call failed");
            brunch::BrunchError::from(error)
        })?;

        lock_unpoisoned(&chat).apply_turn(turn, &reply)?;
        Ok(Some(reply))
    }

    /// Starts a session with a generated id.
    ///
    /// With an installed layout a scratch directory is created under
    /// `<root>/<bucket>/chat-store/<id>`.
    pub fn new_session(&self, bucket: Option<&str>) -> Result<Session, CoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let directory = match &self.layout {
            Some(layout) => {
                let directory = layout.session_dir(bucket.unwrap_or_default(), &id);
                fs::create_dir_all(&directory).map_err(|source| {
                    chat_store::ChatStoreError::io("creating session directory", &directory, source)
                })?;
                Some(directory)
            }
            None => None,
        };

        let session = Session::new(id.clone(), directory);
        lock_unpoisoned(&self.sessions).insert(id.clone(), session.clone());
        tracing::info!(session = %id, "session started");
        Ok(session)
    }

    #[must_use]
    pub fn session(&self, id: &str) -> Option<Session> {
        let id = normalize_session_id(id)?;
        lock_unpoisoned(&self.sessions).get(id).cloned()
    }

    /// Ids of live sessions, sorted.
    #[must_use]
    pub fn session_list(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock_unpoisoned(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn end_session(&self, id: &str) -> Result<(), CoreError> {
        let id = normalize_session_id(id).ok_or(CoreError::SessionIdRequired)?;
        if lock_unpoisoned(&self.sessions).remove(id).is_none() {
            return Err(CoreError::SessionNotFound { id: id.to_string() });
        }
        tracing::debug!(session = id, "session ended");
        Ok(())
    }

    /// Makes a knowledge context available to chats by name.
    pub fn register_context(&self, context: ContextSettings) -> Result<(), CoreError> {
        let mut contexts = lock_unpoisoned(&self.contexts);
        if contexts.contains_key(&context.name) {
            return Err(CoreError::ContextExists { name: context.name });
        }
        tracing::debug!(context = %context.name, "context registered");
        contexts.insert(context.name.clone(), context);
        Ok(())
    }

    /// Registered context names, sorted.
    #[must_use]
    pub fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock_unpoisoned(&self.contexts).keys().cloned().collect();
        names.sort();
        names
    }

    /// Attaches the registered context `context_name` to an active chat.
    pub fn attach_context(&self, chat_name: &str, context_name: &str) -> Result<(), CoreError> {
        let context = lock_unpoisoned(&self.contexts)
            .get(context_name)
            .cloned()
            .ok_or_else(|| CoreError::ContextNotFound {
                name: context_name.to_string(),
            })?;
        let chat = self.active_chat(chat_name)?;
        lock_unpoisoned(&chat).attach_context(context)?;
        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
