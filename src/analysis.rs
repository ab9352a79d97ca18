//! Analysis provider seam for the `ask` command.
//!
//! Retrieval-augmented question answering: the question is run against
//! the index, the top matches are assembled into a prompt, and an
//! OpenAI-compatible chat endpoint produces the answer. There is no
//! retry here; a failed completion surfaces to the caller so the
//! operator can decide whether to re-ask.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{AnalysisConfig, Config};
use crate::embedding;
use crate::index::InMemoryIndex;
use crate::index::VectorIndex;
use crate::models::SearchMatch;

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
    fn model_name(&self) -> &str;
}

/// Placeholder provider used when analysis is not configured.
pub struct DisabledAnalysis;

#[async_trait]
impl AnalysisProvider for DisabledAnalysis {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Analysis provider is disabled; set analysis.provider in the config")
    }
    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Chat-completions client for OpenAI-compatible endpoints. Requires
/// `OPENAI_API_KEY`; `analysis.url` overrides the default endpoint.
pub struct OpenAIAnalysis {
    model: String,
    base: String,
    timeout: Duration,
}

impl OpenAIAnalysis {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("analysis.model required for OpenAI provider"))?;
        let base = config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            model,
            base,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl AnalysisProvider for OpenAIAnalysis {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
        });

        let response = client
            .post(format!("{}/v1/chat/completions", self.base))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Analysis request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Analysis API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        extract_answer(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

pub fn create_provider(config: &AnalysisConfig) -> Result<Box<dyn AnalysisProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledAnalysis)),
        "openai" => Ok(Box::new(OpenAIAnalysis::new(config)?)),
        other => bail!("Unknown analysis provider: {}", other),
    }
}

fn extract_answer(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid analysis response: missing choices[0].message.content"))
}

/// Builds the grounding prompt from retrieved chunks.
fn build_prompt(question: &str, matches: &[SearchMatch]) -> String {
    let mut prompt = String::from(
        "You are assisting a financial forensics review. Answer the question \
         using only the document excerpts below. Cite file names. If the \
         excerpts do not contain the answer, say so.\n\n",
    );
    for (i, m) in matches.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {} ({})\n{}\n\n",
            i + 1,
            m.document.relative_path,
            m.document.category,
            m.snippet
        ));
    }
    prompt.push_str(&format!("Question: {}\n", question));
    prompt
}

/// CLI entry: retrieve, prompt, answer, cite.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let provider = create_provider(&config.analysis)?;

    let index = InMemoryIndex::load_snapshot(&config.indexing.snapshot)
        .context("No index snapshot; run `ftr index` first")?;
    let query_vec = if config.embedding.is_enabled() {
        let embedder = embedding::create_provider(&config.embedding)?;
        Some(embedder.embed_query(question).await?)
    } else {
        None
    };
    let matches = index
        .search(question, query_vec.as_deref(), config.analysis.top_k)
        .await?;

    if matches.is_empty() {
        println!("No indexed documents matched the question.");
        return Ok(());
    }

    let prompt = build_prompt(question, &matches);
    let answer = provider.complete(&prompt).await?;

    println!("{}", answer.trim());
    println!("\nSources:");
    for m in &matches {
        println!("  - {} ({})", m.document.relative_path, m.document.category);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexedDocument;

    fn sample_match(name: &str, snippet: &str) -> SearchMatch {
        SearchMatch {
            chunk_id: "c1".to_string(),
            score: 1.0,
            snippet: snippet.to_string(),
            document: IndexedDocument {
                content_hash: "h".to_string(),
                file_name: name.to_string(),
                relative_path: name.to_string(),
                category: "bank_statements".to_string(),
                modified_time: "2024-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        let provider = DisabledAnalysis;
        let err = provider.complete("anything").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = AnalysisConfig {
            provider: "oracle".to_string(),
            ..AnalysisConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn prompt_carries_excerpts_and_question() {
        let matches = vec![sample_match("jan.pdf", "Balance: $100")];
        let prompt = build_prompt("What was the January balance?", &matches);
        assert!(prompt.contains("jan.pdf"));
        assert!(prompt.contains("Balance: $100"));
        assert!(prompt.contains("Question: What was the January balance?"));
    }

    #[test]
    fn parses_chat_completion_payload() {
        let json = serde_json::json!({
            "choices": [
                {"message": {"content": "The balance was $100."}}
            ]
        });
        assert_eq!(extract_answer(&json).unwrap(), "The balance was $100.");
        assert!(extract_answer(&serde_json::json!({})).is_err());
    }
}
