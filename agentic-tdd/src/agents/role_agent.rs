//! Prompt, call, parse and validate for one role.

use tracing::{debug, instrument};

use super::{AgentError, PromptContext, Reply};
use crate::core::parse::{Proposal, parse_response};
use crate::core::types::{Role, SourceLayout};
use crate::io::llm::LlmClient;
use crate::io::prompt::{PromptBuilder, PromptInputs};

/// An agent bound to a role, a model client and the project layout.
pub struct RoleAgent<'a, L> {
    role: Role,
    llm: &'a L,
    prompts: &'a PromptBuilder,
    layout: &'a SourceLayout,
    language: &'a str,
}

impl<'a, L: LlmClient> RoleAgent<'a, L> {
    pub fn new(
        role: Role,
        llm: &'a L,
        prompts: &'a PromptBuilder,
        layout: &'a SourceLayout,
        language: &'a str,
    ) -> Self {
        Self {
            role,
            llm,
            prompts,
            layout,
            language,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Ask the model for this role's next proposal.
    ///
    /// Edits are checked against the role's scope before they are returned, so
    /// the caller only ever applies edits the role is allowed to make.
    #[instrument(skip_all, fields(role = %self.role))]
    pub fn propose(&self, context: &PromptContext<'_>) -> Result<Reply, AgentError> {
        let prompt = self
            .prompts
            .build(&PromptInputs {
                role: self.role,
                language: self.language,
                layout: self.layout,
                rules: context.rules,
                tree: context.tree,
                failing_test: context.failing_test,
                test_log: context.test_log,
                feedback: context.feedback,
            })
            .map_err(AgentError::Prompt)?;
        debug!(
            system_bytes = prompt.system.len(),
            user_bytes = prompt.user.len(),
            "prompt built"
        );

        let response = self.llm.complete(&prompt)?;

        let validated = parse_response(self.role, self.layout, &response).and_then(|proposal| {
            if let Proposal::Edits(edits) = &proposal {
                edits.check_scope(self.role, self.layout, context.tree)?;
            }
            Ok(proposal)
        });
        match validated {
            Ok(proposal) => Ok(Reply { proposal, response }),
            Err(source) => Err(AgentError::Parse { source, response }),
        }
    }
}
