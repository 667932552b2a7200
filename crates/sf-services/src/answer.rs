//! # AI Answer Generator
//!
//! Turns a forum question into a provider prompt and scores what comes back.
//! The provider itself is any [`TextGenerator`]; this layer owns the prompt
//! templates, the timeout, the confidence heuristic and follow-up parsing.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use sf_core::error::{AppError, Result};
use sf_core::models::Category;
use sf_core::traits::TextGenerator;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_FOLLOW_UPS: usize = 3;
pub const MAX_FOLLOW_UP_CHARS: usize = 200;

/// Lines this short (as received) are never treated as questions.
const MIN_FOLLOW_UP_LINE_CHARS: usize = 10;

static LEADING_ENUMERATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.?\s*").expect("enumeration pattern compiles"));

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub answer: String,
    /// Heuristic, see [`calculate_confidence`]
    pub confidence: f64,
}

pub struct AnswerGenerator {
    provider: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Fails with `ProviderFailure` on provider error, timeout or an empty answer.
    pub async fn generate_answer(&self, question: &str, category: &str, context: &str) -> Result<GeneratedAnswer> {
        let prompt = build_prompt(question, category, context);
        let answer = self.complete(&prompt).await?;
        let confidence = calculate_confidence(&answer, category);
        debug!(category, chars = answer.chars().count(), confidence, "answer generated");
        Ok(GeneratedAnswer { answer, confidence })
    }

    /// Best effort: any failure yields an empty list.
    pub async fn generate_follow_up_questions(&self, question: &str, answer: &str, category: &str) -> Vec<String> {
        let prompt = build_follow_up_prompt(question, answer, category);
        match self.complete(&prompt).await {
            Ok(text) => parse_follow_up_questions(&text),
            Err(err) => {
                warn!(category, error = %err, "follow-up generation failed");
                Vec::new()
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let text = tokio::time::timeout(self.timeout, self.provider.generate(prompt))
            .await
            .map_err(|_| AppError::ProviderFailure(format!("no response within {:?}", self.timeout)))?
            .map_err(|e| AppError::ProviderFailure(format!("{e:#}")))?;

        if text.trim().is_empty() {
            return Err(AppError::ProviderFailure("provider returned an empty answer".into()));
        }
        Ok(text)
    }
}

/// The persona line for a category label. Unknown labels get the general one.
pub fn category_template(category: &str) -> &'static str {
    match Category::from_str(category).unwrap_or(Category::General) {
        Category::General => {
            "You are a helpful student assistant. Provide a clear, informative answer to this general question."
        }
        Category::Homework => {
            "You are a homework tutor. Help the student understand the concept and guide them toward the solution without giving direct answers. Encourage learning."
        }
        Category::Programming => {
            "You are a programming mentor. Provide code examples, explain concepts, and suggest best practices. Include debugging tips if relevant."
        }
        Category::Math => {
            "You are a math tutor. Break down the problem step by step, explain the mathematical concepts, and show the solution process clearly."
        }
        Category::Science => {
            "You are a science teacher. Explain scientific concepts clearly, provide examples, and relate to real-world applications when possible."
        }
        Category::Literature => {
            "You are a literature teacher. Analyze themes, characters, and literary devices. Provide context and encourage critical thinking."
        }
    }
}

pub fn build_prompt(question: &str, category: &str, context: &str) -> String {
    let mut prompt = format!("{}\n\nQuestion: {question}\n\n", category_template(category));
    if !context.trim().is_empty() {
        prompt.push_str(&format!("Additional Context: {context}\n\n"));
    }
    prompt.push_str(
        "Please provide a helpful, educational response that:\n\
         1. Directly addresses the question\n\
         2. Is appropriate for students\n\
         3. Encourages learning and understanding\n\
         4. Is well-structured and easy to read\n\
         5. Includes examples when helpful\n\n\
         Keep your response concise but comprehensive (aim for 200-500 words).",
    );
    prompt
}

fn build_follow_up_prompt(question: &str, answer: &str, category: &str) -> String {
    format!(
        "Based on this question and answer, suggest 2-3 short follow-up questions (max 150 characters each) \
         that would help the student learn more:\n\n\
         Original Question: {question}\n\
         Answer: {answer}\n\
         Category: {category}\n\n\
         Generate concise follow-up questions that:\n\
         1. Deepen understanding of the topic\n\
         2. Explore related concepts\n\
         3. Encourage practical application\n\n\
         Keep each question under 150 characters. Format as a simple numbered list."
    )
}

/// Length and keyword heuristic in `[0.70, 0.95]`. Substring checks are
/// case-sensitive.
pub fn calculate_confidence(answer: &str, category: &str) -> f64 {
    let length = answer.chars().count();
    let has_examples = answer.contains("example") || answer.contains("for instance");
    let has_steps = answer.contains("step") || answer.contains("first") || answer.contains("then");

    let mut confidence: f64 = 0.70;
    if length > 100 {
        confidence += 0.10;
    }
    if length > 300 {
        confidence += 0.10;
    }
    if has_examples {
        confidence += 0.05;
    }
    if has_steps {
        confidence += 0.05;
    }

    let rewards_steps = Category::from_str(category).map(|c| c.rewards_steps()).unwrap_or(false);
    if rewards_steps && has_steps {
        confidence += 0.10;
    }

    confidence.min(0.95)
}

/// Extracts up to three questions from a numbered list.
pub fn parse_follow_up_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > MIN_FOLLOW_UP_LINE_CHARS)
        .map(|line| LEADING_ENUMERATION.replace(line, "").trim().to_string())
        .filter(|q| !q.is_empty())
        .take(MAX_FOLLOW_UPS)
        .map(|q| truncate_follow_up(&q))
        .collect()
}

pub fn truncate_follow_up(question: &str) -> String {
    if question.chars().count() <= MAX_FOLLOW_UP_CHARS {
        return question.to_string();
    }
    let mut cut: String = question.chars().take(MAX_FOLLOW_UP_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

/// Stands in for a provider when none is configured. Every call fails.
pub struct UnconfiguredGenerator;

#[async_trait::async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("AI provider is not configured")
    }
}
