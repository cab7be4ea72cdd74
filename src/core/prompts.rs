//! Prompt templates and per-role generation presets.

use minijinja::{Environment, UndefinedBehavior, context};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

const TUTOR_TEMPLATE: &str = r#"
You are Codezy AI Tutor for individual learners.

Your role:
- Explain programming concepts clearly
- Use simple examples
- Be beginner-friendly

Rules:
- Do NOT solve coding platform problems
- Do NOT provide full project or lab solutions
- Prefer explanations, examples, and pseudocode

Student question:
{{ question }}
"#;

const INTENT_TEMPLATE: &str = r#"
Classify the user's question into ONE category:

- programming_concept
- coding_example
- unknown

Question: {{ question }}

Return only the category.
"#;

#[derive(Error, Debug)]
#[error("failed to render {role} prompt: {source}")]
pub struct PromptError {
    role: Role,
    #[source]
    source: minijinja::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Tutor,
    IntentClassifier,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Tutor => write!(f, "tutor"),
            Role::IntentClassifier => write!(f, "intent classifier"),
        }
    }
}

/// Fixed template and sampling parameters for a role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolePreset {
    pub template: &'static str,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Role {
    pub const fn preset(self) -> RolePreset {
        match self {
            Role::Tutor => RolePreset {
                template: TUTOR_TEMPLATE,
                temperature: 0.4,
                max_tokens: None,
            },
            Role::IntentClassifier => RolePreset {
                template: INTENT_TEMPLATE,
                temperature: 0.0,
                max_tokens: None,
            },
        }
    }
}

/// Category the intent classifier puts a question in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProgrammingConcept,
    CodingExample,
    Unknown,
}

impl Intent {
    /// Reads the classifier's raw reply. Anything unexpected is `Unknown`.
    pub fn from_reply(reply: &str) -> Self {
        let reply = reply.trim().to_lowercase();
        let reply = reply.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');

        match reply {
            "programming_concept" => Intent::ProgrammingConcept,
            "coding_example" => Intent::CodingExample,
            _ => Intent::Unknown,
        }
    }
}

pub struct PromptBook {
    env: Environment<'static>,
}

impl Default for PromptBook {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBook {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    pub fn render(&self, role: Role, question: &str) -> Result<String, PromptError> {
        self.env
            .render_str(role.preset().template, context! { question => question })
            .map_err(|source| PromptError { role, source })
    }
}
