//! Immutable job definitions and the builder that produces them.
//!
//! A [`JobBuilder`] accumulates settings and is consumed by
//! [`JobBuilder::build`], which validates the definition and freezes it
//! into a [`Job`]. Built jobs are plain values: executing one never
//! mutates it, and the same `Job` can be executed any number of times.
//! Fallbacks and continuations are themselves built `Job`s, so a
//! definition is a tree assembled leaves-first.

use std::collections::HashMap;
use std::time::Duration;

use floodgate_types::error::FloodgateError;
use floodgate_types::job::{
    DedupStrategy, ExecutionMode, JobSpec, RegionPolicy, RetryPolicy, TriggerCondition,
    WebhookSubscription,
};
use uuid::Uuid;

/// Status codes that escalate a local-first job when no explicit set is
/// configured.
pub const DEFAULT_ESCALATE_ON: [u16; 5] = [429, 500, 502, 503, 504];

/// Per-attempt timeout for local calls when none is configured.
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Strategy and fallback entries
// ---------------------------------------------------------------------------

/// How a job is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStrategy {
    /// Submit straight to the remote execution service.
    Delegate,
    /// Call the target directly; walk the local fallback chain on failure
    /// and delegate the full definition only when the chain is exhausted.
    LocalFirst {
        /// Status codes that count as a local failure.
        escalate_on: Vec<u16>,
        /// Timeout for each local attempt.
        local_timeout: Duration,
    },
}

impl ExecutionStrategy {
    pub fn is_local_first(&self) -> bool {
        matches!(self, ExecutionStrategy::LocalFirst { .. })
    }
}

/// One fallback entry: the job to attempt and the condition gating it.
/// A `None` trigger means the fallback always applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    pub job: Job,
    pub trigger: Option<TriggerCondition>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A validated, immutable job definition.
///
/// Construct via [`Job::builder`]. Every accessor borrows; turning the
/// definition into a wire payload goes through [`Job::to_spec`].
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    url: String,
    method: String,
    headers: HashMap<String, String>,
    body: Option<String>,
    metadata: HashMap<String, String>,
    webhooks: Vec<WebhookSubscription>,
    webhook_quorum: u32,
    regions: Option<Vec<String>>,
    region_policy: Option<RegionPolicy>,
    execution_mode: Option<ExecutionMode>,
    retry_policy: Option<RetryPolicy>,
    retry_at: Option<i64>,
    dedup_key: Option<String>,
    strategy: ExecutionStrategy,
    fallbacks: Vec<Fallback>,
    on_success: Option<Box<Job>>,
    on_failure: Option<Box<Job>>,
    on_failure_timeout_ms: Option<u64>,
}

impl Job {
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn webhooks(&self) -> &[WebhookSubscription] {
        &self.webhooks
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    pub fn fallbacks(&self) -> &[Fallback] {
        &self.fallbacks
    }

    pub fn on_success(&self) -> Option<&Job> {
        self.on_success.as_deref()
    }

    pub fn on_failure(&self) -> Option<&Job> {
        self.on_failure.as_deref()
    }

    /// The deduplication key, if one is set. Always present after `build`
    /// under [`DedupStrategy::Unique`].
    pub fn dedup_key(&self) -> Option<&str> {
        self.dedup_key.as_deref()
    }

    /// Serialize the full definition, fallback chain and continuations
    /// included, into the wire payload.
    ///
    /// Fallbacks flatten into a singly-linked `fallback_job` chain in
    /// declaration order, each entry carrying its trigger. When a fallback
    /// has its own nested chain, that chain runs first and the remaining
    /// siblings are appended at its tail.
    pub fn to_spec(&self) -> JobSpec {
        let mut spec = JobSpec::new(&self.url, &self.method);
        spec.headers = self.headers.clone();
        spec.body = self.body.clone();
        spec.metadata = self.metadata.clone();
        spec.webhooks = self.webhooks.clone();
        if self.webhook_quorum != 1 {
            spec.webhook_quorum = Some(self.webhook_quorum);
        }
        spec.regions = self.regions.clone();
        spec.region_policy = self.region_policy;
        spec.execution_mode = self.execution_mode;
        spec.retry_policy = self.retry_policy.clone();
        spec.retry_at = self.retry_at;
        spec.idempotent_key = self.dedup_key.clone();
        spec.fallback_job = self.chain_spec().map(Box::new);
        spec.on_success = self.on_success.as_ref().map(|job| Box::new(job.to_spec()));
        spec.on_failure = self.on_failure.as_ref().map(|job| Box::new(job.to_spec()));
        spec.on_failure_timeout_ms = self.on_failure_timeout_ms;
        spec
    }

    fn chain_spec(&self) -> Option<JobSpec> {
        let mut chained: Option<JobSpec> = None;
        for fallback in self.fallbacks.iter().rev() {
            let mut spec = fallback.job.to_spec();
            spec.trigger = fallback.trigger.clone();
            if let Some(rest) = chained.take() {
                append_to_tail(&mut spec, rest);
            }
            chained = Some(spec);
        }
        chained
    }
}

fn append_to_tail(spec: &mut JobSpec, rest: JobSpec) {
    match spec.fallback_job.as_deref_mut() {
        Some(inner) => append_to_tail(inner, rest),
        None => spec.fallback_job = Some(Box::new(rest)),
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Consuming builder for [`Job`].
///
/// All methods take and return `self`; nothing is validated until
/// [`JobBuilder::build`].
#[derive(Debug, Clone)]
pub struct JobBuilder {
    url: String,
    method: String,
    headers: HashMap<String, String>,
    body: Option<String>,
    metadata: HashMap<String, String>,
    webhooks: Vec<WebhookSubscription>,
    webhook_quorum: u32,
    regions: Option<Vec<String>>,
    region_policy: Option<RegionPolicy>,
    execution_mode: Option<ExecutionMode>,
    retry_policy: Option<RetryPolicy>,
    retry_at: Option<i64>,
    dedup_key: Option<String>,
    dedup_strategy: DedupStrategy,
    local_first: bool,
    escalate_on: Vec<u16>,
    local_timeout: Duration,
    fallbacks: Vec<Fallback>,
    on_success: Option<Box<Job>>,
    on_failure: Option<Box<Job>>,
    on_failure_timeout_ms: Option<u64>,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
            metadata: HashMap::new(),
            webhooks: Vec::new(),
            webhook_quorum: 1,
            regions: None,
            region_policy: None,
            execution_mode: None,
            retry_policy: None,
            retry_at: None,
            dedup_key: None,
            dedup_strategy: DedupStrategy::default(),
            local_first: false,
            escalate_on: DEFAULT_ESCALATE_ON.to_vec(),
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
            fallbacks: Vec::new(),
            on_success: None,
            on_failure: None,
            on_failure_timeout_ms: None,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// HTTP method; normalized to uppercase at build time.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a metadata entry, echoed back in webhook deliveries.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn webhook(mut self, subscription: WebhookSubscription) -> Self {
        self.webhooks.push(subscription);
        self
    }

    /// Minimum quorum-eligible webhooks that must report success before the
    /// job counts as delivered. Defaults to 1.
    pub fn webhook_quorum(mut self, quorum: u32) -> Self {
        self.webhook_quorum = quorum;
        self
    }

    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    pub fn region_policy(mut self, policy: RegionPolicy) -> Self {
        self.region_policy = Some(policy);
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Earliest retry instant in unix milliseconds.
    pub fn retry_at(mut self, retry_at_ms: i64) -> Self {
        self.retry_at = Some(retry_at_ms);
        self
    }

    /// Explicit deduplication key. Overrides strategy-driven generation.
    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn dedup_strategy(mut self, strategy: DedupStrategy) -> Self {
        self.dedup_strategy = strategy;
        self
    }

    /// Execute against the target directly, delegating only when the local
    /// chain is exhausted.
    pub fn local_first(mut self) -> Self {
        self.local_first = true;
        self
    }

    /// Submit straight to the remote service. This is the default.
    pub fn delegate(mut self) -> Self {
        self.local_first = false;
        self
    }

    /// Status codes that count as a local failure. Only meaningful together
    /// with [`JobBuilder::local_first`].
    pub fn escalate_on(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.escalate_on = codes.into_iter().collect();
        self
    }

    /// Timeout for each local attempt. Only meaningful together with
    /// [`JobBuilder::local_first`].
    pub fn local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    /// Append an unconditional fallback.
    pub fn fallback(mut self, job: Job) -> Self {
        self.fallbacks.push(Fallback { job, trigger: None });
        self
    }

    /// Append a fallback gated on the primary failing with one of `codes`.
    pub fn fallback_on_error(mut self, job: Job, codes: impl IntoIterator<Item = u16>) -> Self {
        self.fallbacks.push(Fallback {
            job,
            trigger: Some(TriggerCondition::OnError {
                codes: codes.into_iter().collect(),
            }),
        });
        self
    }

    /// Append a fallback gated on the primary taking at least `timeout_ms`.
    pub fn fallback_on_timeout(mut self, job: Job, timeout_ms: u64) -> Self {
        self.fallbacks.push(Fallback {
            job,
            trigger: Some(TriggerCondition::OnTimeout { timeout_ms }),
        });
        self
    }

    /// Continuation executed when this job succeeds.
    pub fn on_success(mut self, job: Job) -> Self {
        self.on_success = Some(Box::new(job));
        self
    }

    /// Continuation executed when this job fails.
    pub fn on_failure(mut self, job: Job) -> Self {
        self.on_failure = Some(Box::new(job));
        self
    }

    /// Deadline after which the failure continuation fires even without a
    /// delivery.
    pub fn on_failure_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.on_failure_timeout_ms = Some(timeout_ms);
        self
    }

    /// Validate and freeze the definition.
    ///
    /// Fails when the URL is missing, the quorum is zero, or the quorum
    /// exceeds the quorum-eligible subscriber count. A quorum of 1 with no
    /// webhooks at all is the untouched default and passes. Under
    /// [`DedupStrategy::Unique`] a fresh key is generated here when none
    /// was set, so two builds of identical settings never collide.
    pub fn build(self) -> Result<Job, FloodgateError> {
        if self.url.trim().is_empty() {
            return Err(FloodgateError::Config("target URL is required".to_string()));
        }
        if self.webhook_quorum == 0 {
            return Err(FloodgateError::Config(
                "webhook quorum must be at least 1".to_string(),
            ));
        }
        let eligible = self
            .webhooks
            .iter()
            .filter(|hook| hook.has_quorum_vote)
            .count();
        if self.webhook_quorum as usize > eligible
            && !(self.webhooks.is_empty() && self.webhook_quorum == 1)
        {
            return Err(FloodgateError::Config(format!(
                "webhook quorum {} exceeds quorum-eligible subscribers ({eligible})",
                self.webhook_quorum
            )));
        }

        let dedup_key = match self.dedup_strategy {
            DedupStrategy::Unique => self
                .dedup_key
                .or_else(|| Some(Uuid::now_v7().to_string())),
            DedupStrategy::Hash => self.dedup_key,
        };

        let strategy = if self.local_first {
            ExecutionStrategy::LocalFirst {
                escalate_on: self.escalate_on,
                local_timeout: self.local_timeout,
            }
        } else {
            ExecutionStrategy::Delegate
        };

        Ok(Job {
            url: self.url,
            method: self.method.to_ascii_uppercase(),
            headers: self.headers,
            body: self.body,
            metadata: self.metadata,
            webhooks: self.webhooks,
            webhook_quorum: self.webhook_quorum,
            regions: self.regions,
            region_policy: self.region_policy,
            execution_mode: self.execution_mode,
            retry_policy: self.retry_policy,
            retry_at: self.retry_at,
            dedup_key,
            strategy,
            fallbacks: self.fallbacks,
            on_success: self.on_success,
            on_failure: self.on_failure,
            on_failure_timeout_ms: self.on_failure_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(url: &str) -> Job {
        Job::builder().url(url).build().unwrap()
    }

    #[test]
    fn build_requires_a_url() {
        let err = Job::builder().build().unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));

        let err = Job::builder().url("   ").build().unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn defaults_are_delegate_get() {
        let job = simple("https://api.example.com");
        assert_eq!(job.method(), "GET");
        assert_eq!(job.strategy(), &ExecutionStrategy::Delegate);
        assert!(job.dedup_key().is_none());
        assert!(job.fallbacks().is_empty());
    }

    #[test]
    fn method_is_normalized_to_uppercase() {
        let job = Job::builder()
            .url("https://api.example.com")
            .method("post")
            .build()
            .unwrap();
        assert_eq!(job.method(), "POST");
    }

    #[test]
    fn local_first_carries_escalation_defaults() {
        let job = Job::builder()
            .url("https://api.example.com")
            .local_first()
            .build()
            .unwrap();
        match job.strategy() {
            ExecutionStrategy::LocalFirst {
                escalate_on,
                local_timeout,
            } => {
                assert_eq!(escalate_on, &DEFAULT_ESCALATE_ON);
                assert_eq!(*local_timeout, DEFAULT_LOCAL_TIMEOUT);
            }
            other => panic!("expected local-first, got {other:?}"),
        }
    }

    #[test]
    fn quorum_larger_than_eligible_subscribers_is_rejected() {
        let err = Job::builder()
            .url("https://api.example.com")
            .webhook(WebhookSubscription::voting("https://hooks.example.com/a"))
            .webhook_quorum(2)
            .build()
            .unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn non_voting_webhooks_do_not_count_toward_quorum() {
        let silent = WebhookSubscription {
            url: "https://hooks.example.com/audit".to_string(),
            region: None,
            has_quorum_vote: false,
        };
        let err = Job::builder()
            .url("https://api.example.com")
            .webhook(silent)
            .webhook_quorum(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn default_quorum_without_webhooks_passes() {
        assert!(Job::builder().url("https://api.example.com").build().is_ok());
    }

    #[test]
    fn zero_quorum_is_rejected() {
        let err = Job::builder()
            .url("https://api.example.com")
            .webhook_quorum(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn unique_strategy_generates_a_fresh_key_per_build() {
        let template = Job::builder()
            .url("https://api.example.com/poll")
            .dedup_strategy(DedupStrategy::Unique);

        let first = template.clone().build().unwrap();
        let second = template.build().unwrap();

        assert!(first.dedup_key().is_some());
        assert_ne!(first.dedup_key(), second.dedup_key());
    }

    #[test]
    fn explicit_key_survives_any_strategy() {
        let job = Job::builder()
            .url("https://api.example.com")
            .dedup_strategy(DedupStrategy::Unique)
            .dedup_key("caller-chosen")
            .build()
            .unwrap();
        assert_eq!(job.dedup_key(), Some("caller-chosen"));
    }

    #[test]
    fn to_spec_flattens_fallbacks_in_declaration_order() {
        let job = Job::builder()
            .url("https://primary.example.com")
            .fallback_on_error(simple("https://second.example.com"), [500, 503])
            .fallback_on_timeout(simple("https://third.example.com"), 250)
            .build()
            .unwrap();

        let spec = job.to_spec();
        assert_eq!(spec.fallback_depth(), 2);

        let first = spec.fallback_job.as_deref().unwrap();
        assert_eq!(first.url, "https://second.example.com");
        assert_eq!(
            first.trigger,
            Some(TriggerCondition::OnError {
                codes: vec![500, 503]
            })
        );

        let second = first.fallback_job.as_deref().unwrap();
        assert_eq!(second.url, "https://third.example.com");
        assert_eq!(
            second.trigger,
            Some(TriggerCondition::OnTimeout { timeout_ms: 250 })
        );
    }

    #[test]
    fn nested_fallback_chains_keep_their_inner_order() {
        // b has its own fallback b2; when b is a fallback of a alongside c,
        // the flattened chain is b -> b2 -> c.
        let b = Job::builder()
            .url("https://b.example.com")
            .fallback(simple("https://b2.example.com"))
            .build()
            .unwrap();
        let job = Job::builder()
            .url("https://a.example.com")
            .fallback(b)
            .fallback(simple("https://c.example.com"))
            .build()
            .unwrap();

        let spec = job.to_spec();
        let chain: Vec<&str> = {
            let mut urls = Vec::new();
            let mut current = spec.fallback_job.as_deref();
            while let Some(entry) = current {
                urls.push(entry.url.as_str());
                current = entry.fallback_job.as_deref();
            }
            urls
        };
        assert_eq!(
            chain,
            [
                "https://b.example.com",
                "https://b2.example.com",
                "https://c.example.com"
            ]
        );
    }

    #[test]
    fn to_spec_omits_default_quorum_and_carries_continuations() {
        let job = Job::builder()
            .url("https://api.example.com/charge")
            .method("post")
            .body(r#"{"amount":100}"#)
            .on_success(simple("https://api.example.com/receipt"))
            .on_failure(simple("https://api.example.com/alert"))
            .on_failure_timeout_ms(60_000)
            .build()
            .unwrap();

        let spec = job.to_spec();
        assert_eq!(spec.webhook_quorum, None);
        assert_eq!(spec.method, "POST");
        assert_eq!(
            spec.on_success.as_deref().map(|s| s.url.as_str()),
            Some("https://api.example.com/receipt")
        );
        assert_eq!(
            spec.on_failure.as_deref().map(|s| s.url.as_str()),
            Some("https://api.example.com/alert")
        );
        assert_eq!(spec.on_failure_timeout_ms, Some(60_000));
    }

    #[test]
    fn to_spec_emits_non_default_quorum() {
        let job = Job::builder()
            .url("https://api.example.com")
            .webhook(WebhookSubscription::voting("https://hooks.example.com/a"))
            .webhook(WebhookSubscription::voting("https://hooks.example.com/b"))
            .webhook_quorum(2)
            .build()
            .unwrap();
        assert_eq!(job.to_spec().webhook_quorum, Some(2));
    }
}
