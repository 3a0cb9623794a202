//! Verification orchestrator.
//!
//! Pipeline flow:
//! Context → Classifier → RiskLevel::parse → RecommendationPolicy → Decision
//!
//! Any stage failing ends the request with an error. There is no partial or
//! default decision.

use crate::client::{ChatClassifier, ClassificationTask, RiskClassifier};
use crate::models::{
    Config, Result, RiskLevel, TriageError, UnavailableCause, UserContext, VerificationDecision,
};
use crate::policy::RecommendationPolicy;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Composes classification, validation and recommendation.
///
/// Cheap to clone: the classifier and policy are shared read-only.
#[derive(Clone)]
pub struct VerificationOrchestrator {
    classifier: Arc<dyn RiskClassifier>,
    policy: Arc<RecommendationPolicy>,
    classify_timeout: Duration,
}

impl VerificationOrchestrator {
    pub fn new(
        classifier: Arc<dyn RiskClassifier>,
        policy: Arc<RecommendationPolicy>,
        classify_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            policy,
            classify_timeout,
        }
    }

    /// Build the production pipeline from configuration.
    ///
    /// Fails with `TriageError::Config` when a required classifier value is
    /// missing, so a misconfigured process never serves a request.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let settings = config.resolve_classifier()?;

        let task = match &config.classifier.prompt {
            Some(path) => ClassificationTask::load(config.classifier.task.as_str(), path)?,
            None => ClassificationTask::builtin(config.classifier.task.as_str()),
        };

        info!(
            endpoint = %settings.endpoint,
            deployment = %settings.deployment,
            task = %task.id(),
            timeout_secs = settings.timeout.as_secs(),
            "Classifier configured"
        );

        let classifier = ChatClassifier::new(&settings, task)?;
        Ok(Self::new(
            Arc::new(classifier),
            Arc::new(RecommendationPolicy::canonical()),
            settings.timeout,
        ))
    }

    pub fn policy(&self) -> &RecommendationPolicy {
        &self.policy
    }

    /// Decide on raw context text.
    ///
    /// Empty or whitespace-only text fails with `InvalidInput` before the
    /// classifier is called.
    pub async fn decide(&self, context: &str) -> Result<VerificationDecision> {
        let context = UserContext::new(context)?;
        self.decide_context(&context).await
    }

    /// Decide on a validated context.
    pub async fn decide_context(&self, context: &UserContext) -> Result<VerificationDecision> {
        let span = info_span!(
            "decide",
            request_id = %Uuid::new_v4(),
            classifier = %self.classifier.name()
        );
        self.run(context).instrument(span).await
    }

    async fn run(&self, context: &UserContext) -> Result<VerificationDecision> {
        let raw = self.classify(context).await?;

        let risk = RiskLevel::parse(&raw).inspect_err(|_| {
            error!(label = %raw, "Classifier returned an unrecognized risk label");
        })?;

        let steps = self.policy.resolve(risk)?;
        let decision = VerificationDecision::new(risk, steps.to_vec())?;

        debug!(risk = %risk, steps = decision.required_steps().len(), "Decision made");
        Ok(decision)
    }

    /// Classifier call bounded by the configured timeout.
    async fn classify(&self, context: &UserContext) -> Result<String> {
        let outcome = tokio::time::timeout(self.classify_timeout, self.classifier.classify(context))
            .await
            .unwrap_or_else(|_| Err(UnavailableCause::Timeout(self.classify_timeout).into()));

        if let Err(e) = &outcome {
            log_classifier_failure(e);
        }
        outcome
    }
}

fn log_classifier_failure(e: &TriageError) {
    if e.is_retryable() {
        warn!(error = %e, retryable = true, "Classifier unavailable");
    } else {
        error!(error = %e, kind = %e.kind(), retryable = false, "Classifier call failed");
    }
}
