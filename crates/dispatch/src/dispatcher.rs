//! Command execution with method-aware retry and bounded batch requests.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::Instrument;

use objects::{
    map_error_body, map_error_value, map_response, split, ClientConfig, CommandDescriptor,
    CredentialProvider, HttpTransport, Method, RawResponse, RequestBody, RetryDecision,
    RetryPolicy, SkipPolicy, StoreError, TransportOutcome,
};

/// Path of the batch endpoint.
pub const BATCH_PATH: &str = "/batch";

/// Executes commands against the remote store.
///
/// Holds no per-operation state; concurrent calls share only the transport
/// and credential provider.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryPolicy,
    batch_limit: usize,
    mount_path: String,
    save_policy: SkipPolicy,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("retry", &self.retry)
            .field("batch_limit", &self.batch_limit)
            .field("mount_path", &self.mount_path)
            .field("save_policy", &self.save_policy)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher from validated configuration.
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            transport,
            credentials,
            retry: config.retry,
            batch_limit: config.batch_limit.max(1),
            mount_path: config.mount_path().to_owned(),
            save_policy: SkipPolicy::SaveEndpoint,
        }
    }

    /// Sends client-assigned object ids when creating objects.
    #[must_use]
    pub fn with_custom_object_ids(mut self) -> Self {
        self.save_policy = SkipPolicy::CustomObjectId;
        self
    }

    /// The retry policy used by [`Dispatcher::execute`].
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Maximum sub-requests per batch request.
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    pub(crate) fn save_policy(&self) -> SkipPolicy {
        self.save_policy
    }

    /// Executes `command` with the configured retry policy and decodes its body.
    pub async fn execute(&self, command: &CommandDescriptor) -> Result<Value, StoreError> {
        self.execute_with(command, &self.retry).await
    }

    /// Executes `command` with an explicit retry policy.
    ///
    /// A 2xx response decodes to its JSON body (`Value::Null` when empty); any
    /// other outcome maps to a [`StoreError`].
    pub async fn execute_with(
        &self,
        command: &CommandDescriptor,
        policy: &RetryPolicy,
    ) -> Result<Value, StoreError> {
        let response = self.execute_raw(command, policy).await?;
        map_response(&response)
    }

    /// Executes `command` and hands the body to `decode`.
    ///
    /// An error returned by `decode` reaches the caller unchanged.
    pub async fn execute_decoded<T, F>(
        &self,
        command: &CommandDescriptor,
        decode: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(Value) -> Result<T, StoreError>,
    {
        let body = self.execute(command).await?;
        decode(body)
    }

    /// Runs the attempt loop and returns the final 2xx response.
    pub(crate) async fn execute_raw(
        &self,
        command: &CommandDescriptor,
        policy: &RetryPolicy,
    ) -> Result<RawResponse, StoreError> {
        let span = tracing::debug_span!(
            "execute",
            method = %command.method(),
            path = command.path(),
        );
        async {
            let (outcome, attempts) = self.attempt(command, policy).await;
            match outcome {
                Ok(response) if response.is_success() => {
                    tracing::debug!(status = response.status, attempts, "command succeeded");
                    Ok(response)
                }
                Ok(response) => {
                    let err = map_error_body(response.status, &response.body);
                    tracing::debug!(
                        status = response.status,
                        attempts,
                        error = %err,
                        "command rejected"
                    );
                    Err(err)
                }
                Err(err) => {
                    tracing::warn!(attempts, error = %err, "command failed without a response");
                    Err(StoreError::connection(err.failure, err.message))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        command: &CommandDescriptor,
        policy: &RetryPolicy,
    ) -> (TransportOutcome, u32) {
        let credentials = self.credentials.credentials();
        let mut attempt = 1;
        loop {
            let outcome = self.transport.send(command, &credentials).await;
            match policy.decide(command.method(), &outcome, attempt) {
                RetryDecision::Retryable { after } => {
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(after).await;
                    attempt += 1;
                }
                RetryDecision::NonRetryable => return (outcome, attempt),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    /// Executes `commands` through the batch endpoint.
    ///
    /// Commands are split into segments of at most [`Dispatcher::batch_limit`]
    /// and sent in order. The result list has one entry per command, in input
    /// order. A segment that fails as a whole marks each of its entries with
    /// that error; earlier and later segments are unaffected.
    pub async fn execute_batch(
        &self,
        commands: Vec<CommandDescriptor>,
    ) -> Vec<Result<Value, StoreError>> {
        if commands.is_empty() {
            return Vec::new();
        }
        let total = commands.len();
        let segments = split(commands, self.batch_limit);
        tracing::debug!(total, segments = segments.len(), "executing batch");

        let mut results = Vec::with_capacity(total);
        for (index, segment) in segments.into_iter().enumerate() {
            let len = segment.len();
            match self.execute_segment(&segment).await {
                Ok(items) => results.extend(items),
                Err(err) => {
                    tracing::warn!(segment = index, len, error = %err, "batch segment failed");
                    results.extend(std::iter::repeat(Err(err)).take(len));
                }
            }
        }
        results
    }

    async fn execute_segment(
        &self,
        segment: &[CommandDescriptor],
    ) -> Result<Vec<Result<Value, StoreError>>, StoreError> {
        let requests = segment
            .iter()
            .map(|command| self.sub_request(command))
            .collect::<Result<Vec<_>, _>>()?;
        let envelope = CommandDescriptor::new(Method::Post, BATCH_PATH)
            .with_json(json!({ "requests": requests }));
        let response = self.execute_raw(&envelope, &self.retry).await?;
        let status = response.status;
        let items = match map_response(&response)? {
            Value::Array(items) => items,
            other => {
                return Err(StoreError::protocol(format!(
                    "batch response is not an array: {other}"
                )))
            }
        };
        if items.len() != segment.len() {
            return Err(StoreError::protocol(format!(
                "batch of {} returned {} results",
                segment.len(),
                items.len()
            )));
        }
        Ok(items
            .into_iter()
            .map(|item| batch_item(status, item))
            .collect())
    }

    fn sub_request(&self, command: &CommandDescriptor) -> Result<Value, StoreError> {
        let mut path = format!("{}{}", self.mount_path, command.path());
        if !command.params().is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(command.params())
                .finish();
            path = format!("{path}?{query}");
        }
        let mut request = json!({
            "method": command.method().as_str(),
            "path": path,
        });
        match command.body() {
            None => {}
            Some(RequestBody::Json(body)) => request["body"] = body.clone(),
            Some(RequestBody::Bytes { .. }) => {
                return Err(StoreError::encoding(format!(
                    "{} {} carries raw bytes and cannot be batched",
                    command.method(),
                    command.path()
                )))
            }
        }
        Ok(request)
    }
}

fn batch_item(status: u16, item: Value) -> Result<Value, StoreError> {
    match item {
        Value::Object(mut entry) => {
            if let Some(success) = entry.remove("success") {
                return Ok(success);
            }
            match entry.remove("error") {
                Some(error) => Err(map_error_value(status, &error)),
                None => Err(StoreError::protocol(format!(
                    "batch item without success or error: {}",
                    Value::Object(entry)
                ))),
            }
        }
        other => Err(StoreError::protocol(format!("batch item is not an object: {other}"))),
    }
}
