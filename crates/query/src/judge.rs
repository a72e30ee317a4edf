use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use extract::LanguageModel;
use extract::prompt::build_judge_prompt;

/// Fenced input block followed by the fenced evidence block.
///
/// `label` is `Question` for the answerer and `Source` for the verifier.
pub fn evidence_block<S: AsRef<str>>(label: &str, text: &str, lines: &[S]) -> String {
    let evidence = lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "[{}]\n```\n{}\n```\n\n[Evidence]\n```\n{}\n```",
        label,
        text.trim(),
        evidence
    )
}

/// Final LLM call over the assembled evidence block.
pub struct Judge {
    llm: Arc<dyn LanguageModel>,
    role: String,
}

impl Judge {
    pub fn new(llm: Arc<dyn LanguageModel>, role: impl Into<String>) -> Self {
        Self {
            llm,
            role: role.into(),
        }
    }

    pub async fn judge(&self, block: &str) -> Result<String> {
        let prompt = build_judge_prompt(&self.role, block);

        let verdict = self.llm
            .generate(&prompt)
            .await
            .context("Judgment request failed")?;

        let verdict = verdict.trim().to_string();
        info!(chars = verdict.len(), "Received verdict");
        Ok(verdict)
    }
}
