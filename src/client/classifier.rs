//! Classifier seam.
//!
//! K_i: A classifier turns context into an untyped label, nothing more.
//! B_i: The label may be anything → validated downstream by `RiskLevel::parse`.

use crate::models::{Result, UserContext};
use async_trait::async_trait;

/// External risk classification capability.
///
/// Implementations perform one external invocation per call and keep no
/// per-request state, so a single instance serves concurrent requests.
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    /// Return the raw risk label for a context.
    async fn classify(&self, context: &UserContext) -> Result<String>;

    /// Short name for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory classifiers for pipeline tests.

    use super::*;
    use crate::models::{TriageError, UnavailableCause};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns the same label for every call.
    pub struct FixedClassifier {
        label: String,
        pub calls: AtomicUsize,
    }

    impl FixedClassifier {
        pub fn new(label: impl Into<String>) -> Self {
            Self {
                label: label.into(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RiskClassifier for FixedClassifier {
        async fn classify(&self, _context: &UserContext) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Echoes a label embedded in the context as `label=<value>;...`,
    /// after a delay also read from the context (`delay_ms=<n>`).
    pub struct EchoClassifier;

    #[async_trait]
    impl RiskClassifier for EchoClassifier {
        async fn classify(&self, context: &UserContext) -> Result<String> {
            let field = |key: &str| {
                context
                    .as_str()
                    .split(';')
                    .find_map(|kv| kv.trim().strip_prefix(key).map(str::to_string))
            };
            if let Some(ms) = field("delay_ms=").and_then(|v| v.parse::<u64>().ok()) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            field("label=").ok_or_else(|| TriageError::MalformedResponse("no label".to_string()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Never answers.
    pub struct HangingClassifier;

    #[async_trait]
    impl RiskClassifier for HangingClassifier {
        async fn classify(&self, _context: &UserContext) -> Result<String> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    /// Plays back a script of responses, then repeats the last one.
    /// `None` stands for a 503 from the classifier.
    pub struct ScriptedClassifier {
        script: Mutex<VecDeque<Option<String>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        pub fn new(script: Vec<Option<&str>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().map(|s| s.map(str::to_string)).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn unavailable_then(label: &str, failures: usize) -> Self {
            let mut script = vec![None; failures];
            script.push(Some(label));
            Self::new(script)
        }
    }

    #[async_trait]
    impl RiskClassifier for ScriptedClassifier {
        async fn classify(&self, _context: &UserContext) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().flatten()
                } else {
                    script.front().cloned().flatten()
                }
            };
            next.ok_or_else(|| {
                TriageError::from(UnavailableCause::ServerError {
                    status: 503,
                    message: "overloaded".to_string(),
                })
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
