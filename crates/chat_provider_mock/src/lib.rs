//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and contract-level integration testing. Replies are scripted
//! up front; once the script runs dry the provider echoes the question.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chat_provider::{
    ChatProvider, CompletionRequest, ContextSettings, ProviderError, ProviderInitError,
    ProviderSettings,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Model identifier reported by the default mock settings.
pub const MOCK_MODEL_ID: &str = "mock-model";

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<String, ProviderError>>,
    requests: Vec<CompletionRequest>,
    contexts: Vec<String>,
    reject_contexts: bool,
}

/// Deterministic mock provider used by engine and registry tests.
///
/// Clones produced by [`ChatProvider::clone_with_settings`] share the reply
/// script and the request log with the instance they were cloned from.
#[derive(Debug, Clone)]
pub struct MockProvider {
    settings: ProviderSettings,
    script: Arc<Mutex<Script>>,
}

impl MockProvider {
    /// Creates a mock provider with default settings and an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(ProviderSettings::base(MOCK_PROVIDER_ID, MOCK_MODEL_ID))
    }

    /// Creates a mock provider with explicit settings.
    #[must_use]
    pub fn with_settings(settings: ProviderSettings) -> Self {
        Self {
            settings: sanitize_settings(settings),
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// Creates a mock provider that answers with `replies` in order.
    #[must_use]
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for reply in replies {
            provider.push_reply(reply);
        }
        provider
    }

    /// Queues a successful reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        lock_unpoisoned(&self.script)
            .replies
            .push_back(Ok(reply.into()));
    }

    /// Queues a failure returned by the next completion.
    pub fn push_failure(&self, message: impl Into<String>) {
        lock_unpoisoned(&self.script)
            .replies
            .push_back(Err(ProviderError::new(message)));
    }

    /// Makes `attach_context` fail for every context.
    pub fn reject_contexts(&self) {
        lock_unpoisoned(&self.script).reject_contexts = true;
    }

    /// Returns every request received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock_unpoisoned(&self.script).requests.clone()
    }

    /// Returns the names of contexts attached so far.
    #[must_use]
    pub fn attached_contexts(&self) -> Vec<String> {
        lock_unpoisoned(&self.script).contexts.clone()
    }

    /// Number of scripted replies not yet consumed.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        lock_unpoisoned(&self.script).replies.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatProvider for MockProvider {
    fn settings(&self) -> ProviderSettings {
        self.settings.clone()
    }

    fn clone_with_settings(
        &self,
        settings: ProviderSettings,
    ) -> Result<Arc<dyn ChatProvider>, ProviderInitError> {
        if settings.name.trim().is_empty() {
            return Err(ProviderInitError::new("mock provider requires a name"));
        }

        Ok(Arc::new(Self {
            settings: sanitize_settings(settings),
            script: Arc::clone(&self.script),
        }))
    }

    fn attach_context(&self, context: &ContextSettings) -> Result<(), ProviderError> {
        let mut script = lock_unpoisoned(&self.script);
        if script.reject_contexts {
            return Err(ProviderError::new(format!(
                "mock provider rejected context '{}'",
                context.name
            )));
        }
        script.contexts.push(context.name.clone());
        Ok(())
    }

    fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let mut script = lock_unpoisoned(&self.script);
        let question = request.question.clone();
        script.requests.push(request);

        match script.replies.pop_front() {
            Some(reply) => reply,
            None => Ok(format!("mock reply to: {question}")),
        }
    }
}

fn sanitize_settings(mut settings: ProviderSettings) -> ProviderSettings {
    settings.model = settings.model.trim().to_string();
    if settings.model.is_empty() {
        settings.model = MOCK_MODEL_ID.to_string();
    }
    if settings.host.trim().is_empty() {
        settings.host = MOCK_PROVIDER_ID.to_string();
    }
    settings
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use chat_provider::ChatMessage;

    use super::*;

    fn request(question: &str) -> CompletionRequest {
        CompletionRequest {
            question: question.to_string(),
            history: vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")],
            images: Vec::new(),
        }
    }

    #[test]
    fn settings_expose_explicit_mock_provider_identity() {
        let settings = MockProvider::new().settings();

        assert_eq!(settings.name, MOCK_PROVIDER_ID);
        assert_eq!(settings.host, MOCK_PROVIDER_ID);
        assert_eq!(settings.model, MOCK_MODEL_ID);
    }

    #[test]
    fn scripted_replies_are_returned_in_order_then_echo() {
        let provider = MockProvider::with_replies(["first", "second"]);

        assert_eq!(provider.complete(request("a")).as_deref(), Ok("first"));
        assert_eq!(provider.complete(request("b")).as_deref(), Ok("second"));
        assert_eq!(
            provider.complete(request("c")).as_deref(),
            Ok("mock reply to: c")
        );
        assert_eq!(provider.pending_replies(), 0);
    }

    #[test]
    fn scripted_failure_is_returned_verbatim_and_request_is_recorded() {
        let provider = MockProvider::new();
        provider.push_failure("upstream timeout");

        let error = provider
            .complete(request("hello"))
            .expect_err("scripted failure should surface");

        assert_eq!(error.message(), "upstream timeout");
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(provider.requests()[0].history.len(), 2);
    }

    #[test]
    fn clones_share_script_but_carry_their_own_settings() {
        let provider = MockProvider::new();
        let mut settings = provider.settings();
        settings.name = "cold".to_string();
        settings.temperature = 0.2;

        let clone = provider
            .clone_with_settings(settings)
            .expect("clone should succeed");
        provider.push_reply("shared");

        assert_eq!(clone.settings().name, "cold");
        assert_eq!(clone.complete(request("x")).as_deref(), Ok("shared"));
        assert_eq!(provider.requests().len(), 1);
    }

    #[test]
    fn clone_requires_a_name() {
        let provider = MockProvider::new();
        let mut settings = provider.settings();
        settings.name = "  ".to_string();

        assert!(provider.clone_with_settings(settings).is_err());
    }

    #[test]
    fn contexts_are_recorded_unless_rejected() {
        let provider = MockProvider::new();
        provider
            .attach_context(&ContextSettings::new("docs"))
            .expect("context should attach");
        assert_eq!(provider.attached_contexts(), vec!["docs".to_string()]);

        provider.reject_contexts();
        assert!(provider
            .attach_context(&ContextSettings::new("more"))
            .is_err());
    }

    #[test]
    fn empty_model_and_host_fallback_to_safe_defaults() {
        let mut settings = ProviderSettings::base("custom", " ");
        settings.host = String::new();

        let provider = MockProvider::with_settings(settings);

        assert_eq!(provider.settings().model, MOCK_MODEL_ID);
        assert_eq!(provider.settings().host, MOCK_PROVIDER_ID);
    }
}
