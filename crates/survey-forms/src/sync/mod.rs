//! Best-effort forwarding of survey answers to the CRM and a spreadsheet.
//!
//! Nothing in this module reports failures to HTTP callers: jobs run detached
//! from the request, errors are logged, and the only retry is a single delayed
//! resend after a 429.

pub mod crm;
pub mod dispatcher;
mod http;
pub mod properties;
pub mod sheets;

use serde::{Deserialize, Serialize};

use crate::forms::domain::{Answer, AnswerValue, FormTree, QuestionId};

pub use crm::{CrmAccounts, CrmError, CrmGateway, CrmProperty, HubSpotClient};
pub use dispatcher::{CrmTarget, SheetDestination, SyncDispatcher, SyncJob, SyncTargets};
pub use properties::{ConnectionStatus, PropertyCatalog};
pub use sheets::{GoogleSheetsClient, SheetsError, SheetsGateway};

/// Joins multi-select answers before they leave the service.
pub const VALUE_DELIMITER: &str = ", ";

/// CRM object a form writes its answers onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrmObjectType {
    Contact,
    Deal,
}

impl CrmObjectType {
    pub const fn api_path(self) -> &'static str {
        match self {
            CrmObjectType::Contact => "contacts",
            CrmObjectType::Deal => "deals",
        }
    }
}

/// An answer paired with the CRM property it is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedAnswer {
    pub question_id: QuestionId,
    pub property: String,
    pub value: AnswerValue,
}

impl MappedAnswer {
    pub fn flattened(&self) -> String {
        self.value.flatten(VALUE_DELIMITER)
    }
}

/// Keeps answers whose question carries a non-empty CRM property key.
pub fn map_answers(tree: &FormTree, answers: &[Answer]) -> Vec<MappedAnswer> {
    answers
        .iter()
        .filter_map(|answer| {
            let question = tree.question(&answer.question_id)?;
            let property = question.crm_property()?;
            Some(MappedAnswer {
                question_id: answer.question_id.clone(),
                property: property.to_string(),
                value: answer.value.clone(),
            })
        })
        .collect()
}
