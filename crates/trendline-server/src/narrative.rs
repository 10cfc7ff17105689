//! OpenAI chat-completions narrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use trendline_core::analysis::{
    parse_analysis_text, GeneratedNarrative, NarrativeError, NarrativeGenerator, NarrativeInput,
};
use trendline_core::config::OpenAiConfig;

pub const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are an analytics strategist reviewing Google Analytics 4 \
performance for a website. Respond with a single JSON object with the keys \
summary (string), perMetric (array of {metric, insight, impact} where impact is \
positive, negative or neutral), anomalies (array of strings), seoRecommendations \
(array of strings) and technicalRecommendations (array of strings). Keep every \
sentence under 25 words.";

pub struct OpenAiNarrator {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiNarrator {
    /// `None` when no API key is configured.
    pub fn try_new(config: &OpenAiConfig, http: reqwest::Client) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http,
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// The user message: both ranges and one line per metric.
pub fn build_prompt(input: &NarrativeInput<'_>) -> String {
    let mut prompt = format!(
        "Report: {}\nCurrent period: {} to {}\nComparison period: {} to {}\n\nMetrics:\n",
        input.title,
        input.current_range.start(),
        input.current_range.end(),
        input.comparison_range.start(),
        input.comparison_range.end(),
    );
    for m in input.metrics {
        prompt.push_str(&format!(
            "- {}: current {:.2}, comparison {:.2}, change {:+.2} ({:+.2}%)\n",
            m.metric, m.current, m.comparison, m.abs_change, m.pct_change
        ));
    }
    if input.metrics.is_empty() {
        prompt.push_str("- no metrics returned for either period\n");
    }
    prompt.push_str(
        "\nExplain the most important changes, flag anything unusual and suggest next actions.",
    );
    prompt
}

fn read_reply(response: ChatResponse, fallback_model: &str) -> Result<GeneratedNarrative, NarrativeError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(NarrativeError::EmptyResponse)?;
    let analysis = parse_analysis_text(&content).ok_or(NarrativeError::EmptyResponse)?;
    Ok(GeneratedNarrative {
        analysis,
        model: response.model.unwrap_or_else(|| fallback_model.to_string()),
    })
}

#[async_trait]
impl NarrativeGenerator for OpenAiNarrator {
    async fn generate(
        &self,
        input: &NarrativeInput<'_>,
    ) -> Result<GeneratedNarrative, NarrativeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(input),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.4,
        };

        let resp = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NarrativeError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| NarrativeError::RequestFailed(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(NarrativeError::RequestFailed(format!("{status}: {message}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| NarrativeError::RequestFailed(format!("invalid response: {e}")))?;
        debug!(model = ?parsed.model, "Narrative received");
        read_reply(parsed, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use trendline_core::comparison::{compute_change, DateRange};

    use super::*;

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(
            NaiveDate::parse_from_str(start, "%Y-%m-%d").expect("start"),
            NaiveDate::parse_from_str(end, "%Y-%m-%d").expect("end"),
        )
        .expect("range")
    }

    #[test]
    fn no_key_means_no_narrator() {
        let config = OpenAiConfig {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
        };
        assert!(OpenAiNarrator::try_new(&config, reqwest::Client::new()).is_none());

        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            ..config
        };
        let narrator = OpenAiNarrator::try_new(&config, reqwest::Client::new()).expect("narrator");
        assert_eq!(narrator.model(), "gpt-4o-mini");
    }

    #[test]
    fn prompt_lists_ranges_and_metrics() {
        let metrics = vec![compute_change("sessions", 120.0, 100.0)];
        let prompt = build_prompt(&NarrativeInput {
            title: "Weekly",
            current_range: range("2024-03-01", "2024-03-07"),
            comparison_range: range("2024-02-23", "2024-02-29"),
            metrics: &metrics,
        });
        assert!(prompt.contains("Report: Weekly"));
        assert!(prompt.contains("Current period: 2024-03-01 to 2024-03-07"));
        assert!(prompt.contains("Comparison period: 2024-02-23 to 2024-02-29"));
        assert!(prompt.contains("- sessions: current 120.00, comparison 100.00, change +20.00 (+20.00%)"));
    }

    #[test]
    fn reply_parsed_into_analysis() {
        let response: ChatResponse = serde_json::from_str(
            r#"{
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{ "message": { "content": "```json\n{\"summary\":\"Traffic up\",\"anomalies\":[\"spike on Friday\"]}\n```" } }]
            }"#,
        )
        .expect("parse");
        let narrative = read_reply(response, "gpt-4o-mini").expect("narrative");
        assert_eq!(narrative.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(narrative.analysis.summary, "Traffic up");
        assert_eq!(narrative.analysis.anomalies, vec!["spike on Friday"]);
    }

    #[test]
    fn empty_reply_is_an_error() {
        let response: ChatResponse =
            serde_json::from_str(r#"{ "choices": [{ "message": { "content": "   " } }] }"#)
                .expect("parse");
        assert!(matches!(
            read_reply(response, "gpt-4o-mini"),
            Err(NarrativeError::EmptyResponse)
        ));

        let response: ChatResponse = serde_json::from_str(r#"{ "choices": [] }"#).expect("parse");
        assert!(read_reply(response, "gpt-4o-mini").is_err());
    }
}
