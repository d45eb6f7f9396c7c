//! Guard builder with eager validation.

use super::guard::Guard;
use super::retry::RetryPolicy;
use crate::checks::{Check, CheckChain};
use crate::client::Generator;
use crate::config::GuardSettings;
use crate::contracts::{Schema, SchemaError};
use crate::errors::ConfigError;
use crate::events::{EventSink, NoOpEventSink};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`Guard`].
///
/// Everything except the client is optional. Invalid combinations are
/// reported by [`GuardBuilder::build`], never at run time.
pub struct GuardBuilder {
    client: Option<Arc<dyn Generator>>,
    pre_checks: CheckChain,
    post_checks: CheckChain,
    schema: Option<Result<Schema, SchemaError>>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    strict_schema: Option<bool>,
    events: Arc<dyn EventSink>,
}

impl Default for GuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardBuilder {
    /// Creates a builder with the default retry policy and no checks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: None,
            pre_checks: CheckChain::new(),
            post_checks: CheckChain::new(),
            schema: None,
            retry: RetryPolicy::default(),
            timeout: None,
            strict_schema: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the generation client.
    #[must_use]
    pub fn client<G: Generator + 'static>(self, client: G) -> Self {
        self.shared_client(Arc::new(client))
    }

    /// Sets a generation client shared with other owners.
    #[must_use]
    pub fn shared_client(mut self, client: Arc<dyn Generator>) -> Self {
        self.client = Some(client);
        self
    }

    /// Appends a pre-check.
    #[must_use]
    pub fn pre_check<C: Check + 'static>(mut self, check: C) -> Self {
        self.pre_checks.push(Arc::new(check));
        self
    }

    /// Appends several pre-checks, preserving their order.
    #[must_use]
    pub fn pre_checks<I>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Check>>,
    {
        for check in checks {
            self.pre_checks.push(check);
        }
        self
    }

    /// Appends a post-check.
    #[must_use]
    pub fn post_check<C: Check + 'static>(mut self, check: C) -> Self {
        self.post_checks.push(Arc::new(check));
        self
    }

    /// Appends several post-checks, preserving their order.
    #[must_use]
    pub fn post_checks<I>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Check>>,
    {
        for check in checks {
            self.post_checks.push(check);
        }
        self
    }

    /// Sets the structural schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(Ok(schema));
        self
    }

    /// Derives the schema from a template value.
    #[must_use]
    pub fn schema_from<T>(mut self, template: &T) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.schema = Some(Schema::from_template(template));
        self
    }

    /// Derives the schema from `T::default()`.
    #[must_use]
    pub fn schema_for<T>(mut self) -> Self
    where
        T: Serialize + DeserializeOwned + Default + 'static,
    {
        self.schema = Some(Schema::for_type::<T>());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets only the attempt count of the current retry policy.
    #[must_use]
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Bounds the whole run, all attempts and waits included.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets schema strictness, regardless of when the schema is given.
    #[must_use]
    pub fn strict_schema(mut self, strict: bool) -> Self {
        self.strict_schema = Some(strict);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Applies loaded settings: retry policy, timeout and strictness.
    #[must_use]
    pub fn with_settings(mut self, settings: &GuardSettings) -> Self {
        self.retry = settings.retry.clone();
        self.timeout = settings.timeout();
        self.strict_schema = Some(settings.strict_schema);
        self
    }

    /// Validates the configuration and builds the guard.
    ///
    /// # Errors
    ///
    /// Returns an error if no client was given, the retry policy is
    /// invalid, the timeout is zero or the schema template was rejected.
    pub fn build(self) -> Result<Guard, ConfigError> {
        let client = self.client.ok_or(ConfigError::NoClient)?;

        self.retry
            .validate()
            .map_err(ConfigError::InvalidRetryPolicy)?;

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidTimeout);
        }

        let mut schema = self
            .schema
            .transpose()
            .map_err(ConfigError::InvalidSchema)?;
        if let (Some(schema), Some(strict)) = (schema.as_mut(), self.strict_schema) {
            schema.set_strict(strict);
        }

        Ok(Guard::from_parts(
            client,
            self.pre_checks,
            self.post_checks,
            schema,
            self.retry,
            self.timeout,
            self.events,
        ))
    }
}

impl fmt::Debug for GuardBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardBuilder")
            .field("has_client", &self.client.is_some())
            .field("pre_checks", &self.pre_checks)
            .field("post_checks", &self.post_checks)
            .field("schema", &self.schema)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("strict_schema", &self.strict_schema)
            .finish_non_exhaustive()
    }
}
