use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::CrmObjectType;

/// Deepest conditional chain a question may sit in.
pub const MAX_NESTING_LEVEL: u8 = 3;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier wrapper for form definitions.
    FormId
);
string_id!(
    /// Identifier wrapper for steps within a form.
    StepId
);
string_id!(
    /// Identifier wrapper for questions within a step.
    QuestionId
);
string_id!(ResponseId);

/// Visual theme rendered by the public form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    pub logo_url: Option<String>,
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            logo_url: None,
            primary_color: "#171717".to_string(),
            secondary_color: "#2563eb".to_string(),
            background_color: "#ffffff".to_string(),
            text_color: "#000000".to_string(),
        }
    }
}

/// Partial branding payload; present fields overwrite the stored theme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingUpdate {
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
}

impl Branding {
    pub fn merge(&mut self, update: BrandingUpdate) {
        if let Some(logo_url) = update.logo_url {
            self.logo_url = Some(logo_url);
        }
        if let Some(color) = update.primary_color {
            self.primary_color = color;
        }
        if let Some(color) = update.secondary_color {
            self.secondary_color = color;
        }
        if let Some(color) = update.background_color {
            self.background_color = color;
        }
        if let Some(color) = update.text_color {
            self.text_color = color;
        }
    }
}

/// Lifecycle bucket derived from the active/published flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Draft,
    Published,
    Archived,
}

/// Persisted survey definition. Steps and questions hang off it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: FormId,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub form_type: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub branding: Branding,
    pub settings: serde_json::Value,
    pub metadata: serde_json::Value,
    #[serde(rename = "hubspotAccount")]
    pub crm_account: String,
    #[serde(rename = "hubspotTargetType")]
    pub crm_target_type: Option<CrmObjectType>,
    #[serde(rename = "hubspotTargetIdParam")]
    pub crm_target_id_param: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Form {
    pub fn status(&self) -> FormStatus {
        match (self.is_active, self.is_published) {
            (false, _) => FormStatus::Archived,
            (true, true) => FormStatus::Published,
            (true, false) => FormStatus::Draft,
        }
    }
}

/// An ordered page of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    pub form_id: FormId,
    pub order: u32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Dropdown,
    Checkbox,
    Text,
    Textarea,
    Date,
    Email,
    Phone,
    Rating,
    Nps,
    Number,
}

/// A single prompt. `parent_question_id` + `condition_value` form the
/// conditional-display edge evaluated by [`crate::forms::visibility`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub step_id: StepId,
    pub order: u32,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub is_required: bool,
    #[serde(rename = "hubspotProperty")]
    pub crm_property: String,
    pub parent_question_id: Option<QuestionId>,
    pub condition_value: Option<AnswerValue>,
    pub nesting_level: u8,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn crm_property(&self) -> Option<&str> {
        let key = self.crm_property.trim();
        (!key.is_empty()).then_some(key)
    }
}

/// Submitted value: free text and single choice arrive as a string,
/// multi-select as an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Single(value) => value.trim().is_empty(),
            AnswerValue::Multiple(values) => values.iter().all(|value| value.trim().is_empty()),
        }
    }

    pub fn flatten(&self, delimiter: &str) -> String {
        match self {
            AnswerValue::Single(value) => value.clone(),
            AnswerValue::Multiple(values) => values.join(delimiter),
        }
    }

    /// Whether this stored answer triggers a child question carrying `condition`.
    pub fn satisfies(&self, condition: &AnswerValue) -> bool {
        match (self, condition) {
            (AnswerValue::Single(answer), AnswerValue::Single(expected)) => answer == expected,
            (AnswerValue::Multiple(answers), AnswerValue::Single(expected)) => {
                answers.iter().any(|answer| answer == expected)
            }
            (AnswerValue::Single(answer), AnswerValue::Multiple(expected)) => {
                expected.iter().any(|candidate| candidate == answer)
            }
            (AnswerValue::Multiple(answers), AnswerValue::Multiple(expected)) => answers
                .iter()
                .any(|answer| expected.iter().any(|candidate| candidate == answer)),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Single(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: QuestionId,
    pub value: AnswerValue,
}

impl Answer {
    pub fn new(question_id: impl Into<QuestionId>, value: impl Into<AnswerValue>) -> Self {
        Self {
            question_id: question_id.into(),
            value: value.into(),
        }
    }
}

impl From<String> for QuestionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Vec<String>> for AnswerValue {
    fn from(value: Vec<String>) -> Self {
        AnswerValue::Multiple(value)
    }
}

/// Per-respondent aggregate keyed by (email, form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub id: ResponseId,
    pub email: String,
    pub form_id: FormId,
    pub responses: Vec<Answer>,
    pub current_step: u32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormResponse {
    pub fn answer(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.responses
            .iter()
            .find(|answer| &answer.question_id == question_id)
            .map(|answer| &answer.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepWithQuestions {
    #[serde(flatten)]
    pub step: Step,
    pub questions: Vec<Question>,
}

/// A form with its ordered steps and questions, as rendered to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormTree {
    #[serde(flatten)]
    pub form: Form,
    pub steps: Vec<StepWithQuestions>,
    pub response_count: usize,
}

impl FormTree {
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.steps.iter().flat_map(|entry| entry.questions.iter())
    }

    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions().find(|question| &question.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    #[serde(flatten)]
    pub form: Form,
    pub response_count: usize,
}
