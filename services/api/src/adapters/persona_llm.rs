//! services/api/src/adapters/persona_llm.rs
//!
//! This module contains the adapter for the persona commentary LLM.
//! It implements the `PersonaAnalysisService` port from the `core` crate.

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
use serde::Deserialize;
use writing_assistant_core::{
    domain::{PersonaAnalysis, PersonaOutputKind},
    persona::PersonaType,
    ports::{PersonaAnalysisService, PortError, PortResult},
};

use super::grammar_llm::extract_json;

const RESPONSE_FORMAT: &str = r#"Respond ONLY with valid JSON in this exact format (no markdown formatting):
{
  "output_content": "what you want to say to the writer",
  "output_type": "tweet|insight|challenge|encouragement",
  "reasoning": "one sentence on why this part of the writing stood out"
}"#;

/// The voice each persona writes in.
fn persona_instructions(persona: PersonaType) -> &'static str {
    match persona {
        PersonaType::TwitterNaval => {
            "You are Naval Ravikant reading someone's draft. Pull out the single most \
             leveraged idea and restate it as a short, timeless aphorism fit for a tweet. \
             Favor clarity over cleverness. Use output_type \"tweet\"."
        }
        PersonaType::TwitterPg => {
            "You are Paul Graham reading someone's draft. Find the most surprising or \
             counterintuitive idea and phrase it as a plain, essay-style tweet. \
             Use output_type \"tweet\"."
        }
        PersonaType::TwitterElon => {
            "You are Elon Musk reading someone's draft. Reduce the idea to first principles \
             and write a bold, punchy tweet about it. Use output_type \"tweet\"."
        }
        PersonaType::TwitterSam => {
            "You are Sam Altman reading someone's draft. Extract the insight about ambition, \
             startups or the long-term future and write a calm, optimistic tweet. \
             Use output_type \"tweet\"."
        }
        PersonaType::TwitterSolbrah => {
            "You are SolBrah reading someone's draft. Turn the strongest idea into a high-energy \
             tweet about discipline, health and living well. Use output_type \"tweet\"."
        }
        PersonaType::TwitterAusten => {
            "You are Austen Allred reading someone's draft. Find the practical lesson about \
             learning, building or hustle and write a direct, no-nonsense tweet. \
             Use output_type \"tweet\"."
        }
        PersonaType::Anima => {
            "You are the writer's Anima: their intuitive, emotional and creative inner voice. \
             Respond to what they have written with gentle insight or encouragement that helps \
             them trust their feelings and keep writing. Use output_type \"insight\" or \
             \"encouragement\"."
        }
        PersonaType::Animus => {
            "You are the writer's Animus: their rational, strategic inner voice. Respond to \
             what they have written with a clear-eyed challenge or insight that sharpens their \
             thinking and pushes them toward action. Use output_type \"challenge\" or \"insight\"."
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PersonaAnalysisService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiPersonaAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiPersonaAdapter {
    /// Creates a new `OpenAiPersonaAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `PersonaAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl PersonaAnalysisService for OpenAiPersonaAdapter {
    async fn analyze_persona(&self, text: &str, persona: PersonaType) -> PortResult<PersonaAnalysis> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(format!("{}\n\n{}", persona_instructions(persona), RESPONSE_FORMAT))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("Here is what I'm writing:\n\n{}", text))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .max_completion_tokens(300u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Unexpected("Persona LLM returned no content.".to_string()))?;

        parse_reply(&content)
    }
}

#[derive(Debug, Deserialize)]
struct RawPersonaReply {
    output_content: String,
    #[serde(default)]
    output_type: String,
    #[serde(default)]
    reasoning: Option<String>,
}

fn parse_reply(content: &str) -> PortResult<PersonaAnalysis> {
    let raw: RawPersonaReply = serde_json::from_str(extract_json(content)).map_err(|e| {
        PortError::Unexpected(format!("Persona LLM returned malformed JSON: {}", e))
    })?;

    if raw.output_content.trim().is_empty() {
        return Err(PortError::Unexpected("Persona LLM returned empty output.".to_string()));
    }

    let kind = raw.output_type.parse().unwrap_or_else(|_| {
        tracing::debug!(output_type = %raw.output_type, "unknown persona output type, using insight");
        PersonaOutputKind::Insight
    });

    Ok(PersonaAnalysis {
        content: raw.output_content.trim().to_string(),
        kind,
        reasoning: raw.reasoning.filter(|r| !r.trim().is_empty()),
    })
}
