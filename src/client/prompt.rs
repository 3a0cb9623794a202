//! Classification task: identifier plus prompt template.
//!
//! A template containing `{{$userContext}}` is rendered into a single user
//! message. Otherwise it is sent as the system message and the context
//! follows as the user message.

use crate::client::Message;
use crate::models::{ConfigError, UserContext};
use std::path::Path;

/// Placeholder replaced by the applicant context.
pub const USER_CONTEXT_PLACEHOLDER: &str = "{{$userContext}}";

/// File name of a template inside a prompt directory.
pub const PROMPT_FILE_NAME: &str = "skprompt.txt";

const DEFAULT_TEMPLATE: &str = r#"You are a KYC (know your customer) risk analyst.
Classify the identity verification risk of the applicant described below.

Answer with exactly one word: Low, Medium, or High.
Do not add punctuation, explanations, or any other text.

Applicant context:
{{$userContext}}"#;

/// Named classification prompt sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationTask {
    id: String,
    template: String,
}

impl ClassificationTask {
    pub fn new(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
        }
    }

    /// Built-in risk classification prompt under the given task id.
    pub fn builtin(id: impl Into<String>) -> Self {
        Self::new(id, DEFAULT_TEMPLATE)
    }

    /// Load a template from disk.
    ///
    /// `path` is either a template file or a prompt directory laid out as
    /// `<path>/<id>/skprompt.txt`.
    pub fn load(id: impl Into<String>, path: &Path) -> Result<Self, ConfigError> {
        let id = id.into();
        let file = if path.is_dir() {
            path.join(&id).join(PROMPT_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        let template = std::fs::read_to_string(&file).map_err(|e| ConfigError::PromptRead {
            path: file.clone(),
            source: e,
        })?;

        if template.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "prompt",
                reason: format!("{} is empty", file.display()),
            });
        }

        Ok(Self::new(id, template))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Chat messages for one classification request.
    pub fn messages(&self, context: &UserContext) -> Vec<Message> {
        if self.template.contains(USER_CONTEXT_PLACEHOLDER) {
            vec![Message::user(
                self.template
                    .replace(USER_CONTEXT_PLACEHOLDER, context.as_str()),
            )]
        } else {
            vec![
                Message::system(self.template.as_str()),
                Message::user(context.as_str()),
            ]
        }
    }
}

impl Default for ClassificationTask {
    fn default() -> Self {
        Self::builtin("ClassifyRisk")
    }
}
