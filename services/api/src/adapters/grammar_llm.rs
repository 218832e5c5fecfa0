//! services/api/src/adapters/grammar_llm.rs
//!
//! This module contains the adapter for the grammar-checking LLM.
//! It implements the `GrammarAnalysisService` port from the `core` crate.
//!
//! Only the tail of the document is sent to the model. Offsets in the reply are
//! shifted back into whole-document coordinates and re-anchored against the
//! text, since models routinely miscount characters.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use writing_assistant_core::{
    domain::{GrammarAnalysis, ProposedSuggestion, SuggestionKind, TextRange},
    ports::{GrammarAnalysisService, PortError, PortResult},
};

const SYSTEM_INSTRUCTIONS: &str = r#"You are a writing assistant focused on grammar, spelling, and style improvements.

Analyze the provided text and identify issues that need correction. For each issue, provide:
1. The exact text that needs correction
2. The suggested replacement
3. A brief explanation of why the change is needed
4. The character positions (start and end) where the issue occurs, counted from the first character of the text

Focus on:
- Grammar errors (subject-verb agreement, tense consistency, etc.)
- Spelling mistakes
- Style improvements (wordiness, clarity, flow)

Respond ONLY with valid JSON in this exact format (no markdown formatting):
{
  "suggestions": [
    {
      "type": "grammar|spelling|style",
      "start": number,
      "end": number,
      "original_text": "exact text to replace",
      "suggestion": "corrected text",
      "explanation": "brief explanation"
    }
  ]
}

Only suggest changes that significantly improve the writing. Be conservative - don't over-correct.
If no issues are found, return: {"suggestions": []}"#;

/// How far either end of a reported range may drift before we give up on the
/// neighbourhood and search the whole text.
const SEARCH_RADIUS: i64 = 5;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GrammarAnalysisService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGrammarAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    context_window: usize,
}

impl OpenAiGrammarAdapter {
    /// Creates a new `OpenAiGrammarAdapter` that examines the last `context_window` chars.
    pub fn new(client: Client<OpenAIConfig>, model: String, context_window: usize) -> Self {
        Self {
            client,
            model,
            context_window,
        }
    }

    async fn complete(&self, window: &str) -> PortResult<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!(
                    "Please analyze this text for grammar, spelling, and style issues:\n\n{}",
                    window
                ))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .max_completion_tokens(1000u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Unexpected("Grammar LLM returned no content.".to_string()))
    }
}

//=========================================================================================
// `GrammarAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GrammarAnalysisService for OpenAiGrammarAdapter {
    async fn analyze_grammar(&self, text: &str) -> PortResult<GrammarAnalysis> {
        let (window, offset) = trailing_window(text, self.context_window);
        if window.trim().is_empty() {
            return Ok(GrammarAnalysis::default());
        }

        let content = self.complete(window).await?;
        let reply: RawReply = serde_json::from_str(extract_json(&content)).map_err(|e| {
            PortError::Unexpected(format!("Grammar LLM returned malformed JSON: {}", e))
        })?;

        let suggestions = reply
            .suggestions
            .into_iter()
            .filter_map(|raw| raw.into_proposal(text, offset))
            .collect::<Vec<_>>();
        tracing::debug!(count = suggestions.len(), offset, "grammar analysis parsed");

        Ok(GrammarAnalysis { suggestions })
    }
}

//=========================================================================================
// Reply parsing
//=========================================================================================

#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    suggestions: Vec<RawSuggestion>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(rename = "type")]
    kind: String,
    start: i64,
    end: i64,
    original_text: String,
    suggestion: String,
    #[serde(default)]
    explanation: String,
}

impl RawSuggestion {
    fn into_proposal(self, text: &str, offset: usize) -> Option<ProposedSuggestion> {
        let kind = match self.kind.parse::<SuggestionKind>() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(error = %e, "dropping grammar suggestion");
                return None;
            }
        };
        // Model offsets are untrusted; a saturated value lands out of bounds
        // and falls through to the plain text search.
        let shift = offset as i64;
        let start = self.start.saturating_add(shift);
        let end = self.end.saturating_add(shift);
        let Some(range) = reanchor(text, start, end, &self.original_text) else {
            tracing::warn!(
                original = %self.original_text,
                start,
                end,
                "could not locate suggestion in text"
            );
            return None;
        };

        Some(ProposedSuggestion {
            kind,
            range,
            original_text: self.original_text,
            replacement_text: self.suggestion,
            explanation: self.explanation,
        })
    }
}

/// Strips a Markdown code fence around the JSON payload, if there is one.
pub(crate) fn extract_json(content: &str) -> &str {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*(\{[\s\S]*\})\s*```").ok());

    fence
        .as_ref()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| content.trim())
}

/// The last `window` chars of `text` and the char offset at which they start.
fn trailing_window(text: &str, window: usize) -> (&str, usize) {
    let total = text.chars().count();
    let offset = total.saturating_sub(window);
    let byte = text
        .char_indices()
        .nth(offset)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len());
    (&text[byte..], offset)
}

/// Finds where `original` really sits in `text`, given the (possibly wrong)
/// char range `start..end` the model reported.
fn reanchor(text: &str, start: i64, end: i64, original: &str) -> Option<TextRange> {
    if original.is_empty() {
        return None;
    }
    let len = text.chars().count() as i64;

    if start >= 0 && end <= len {
        let reported = TextRange::new(start as usize, end as usize);
        if reported.slice(text) == Some(original) {
            return Some(reported);
        }

        for ds in -SEARCH_RADIUS..=SEARCH_RADIUS {
            for de in -SEARCH_RADIUS..=SEARCH_RADIUS {
                let test_start = (start + ds).max(0);
                let test_end = (end + de).min(len);
                if test_start >= test_end {
                    continue;
                }
                let candidate = TextRange::new(test_start as usize, test_end as usize);
                if candidate.slice(text) == Some(original) {
                    return Some(candidate);
                }
            }
        }
    }

    let byte = text.find(original)?;
    let char_start = text[..byte].chars().count();
    Some(TextRange::new(char_start, char_start + original.chars().count()))
}
