//! Narrative layer: the optional language-model commentary on a comparison.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::comparison::{DateRange, MetricChange};

/// Summary text used whenever no narrative could be produced.
pub const ANALYSIS_UNAVAILABLE: &str =
    "AI insights unavailable: set OPENAI_API_KEY to enable generated narratives.";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub per_metric: Vec<MetricInsight>,
    #[serde(default)]
    pub anomalies: Vec<String>,
    #[serde(default)]
    pub seo_recommendations: Vec<String>,
    #[serde(default)]
    pub technical_recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricInsight {
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub insight: String,
    #[serde(default)]
    pub impact: String,
}

impl AiAnalysis {
    pub fn unavailable() -> Self {
        Self {
            summary: ANALYSIS_UNAVAILABLE.to_string(),
            ..Self::default()
        }
    }
}

/// Everything the narrator sees about a report.
#[derive(Debug, Clone)]
pub struct NarrativeInput<'a> {
    pub title: &'a str,
    pub current_range: DateRange,
    pub comparison_range: DateRange,
    pub metrics: &'a [MetricChange],
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedNarrative {
    pub analysis: AiAnalysis,
    pub model: String,
}

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("narrative generator not configured")]
    NotConfigured,

    #[error("narrative request failed: {0}")]
    RequestFailed(String),

    #[error("narrative response was empty")]
    EmptyResponse,
}

/// Outcome of the narrative step. `Unavailable` is an expected state, not a
/// failure of the surrounding operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Narrative {
    Generated { analysis: AiAnalysis, model: String },
    Unavailable { reason: String },
}

impl Narrative {
    pub fn into_analysis(self) -> AiAnalysis {
        match self {
            Narrative::Generated { analysis, .. } => analysis,
            Narrative::Unavailable { .. } => AiAnalysis::unavailable(),
        }
    }
}

impl From<Result<GeneratedNarrative, NarrativeError>> for Narrative {
    fn from(result: Result<GeneratedNarrative, NarrativeError>) -> Self {
        match result {
            Ok(generated) => Narrative::Generated {
                analysis: generated.analysis,
                model: generated.model,
            },
            Err(e) => Narrative::Unavailable {
                reason: e.to_string(),
            },
        }
    }
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync + 'static {
    async fn generate(
        &self,
        input: &NarrativeInput<'_>,
    ) -> Result<GeneratedNarrative, NarrativeError>;
}

/// Run the narrator if there is one, folding every failure into
/// [`Narrative::Unavailable`].
pub async fn narrate(
    generator: Option<&dyn NarrativeGenerator>,
    input: &NarrativeInput<'_>,
) -> Narrative {
    match generator {
        None => Narrative::from(Err(NarrativeError::NotConfigured)),
        Some(generator) => Narrative::from(generator.generate(input).await),
    }
}

/// Interpret model output as an [`AiAnalysis`].
///
/// The text is untrusted. Markdown code fences are stripped and the JSON is
/// parsed leniently; anything that does not parse becomes the summary.
/// Returns `None` for blank text.
pub fn parse_analysis_text(text: &str) -> Option<AiAnalysis> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let body = strip_code_fence(trimmed);
    match serde_json::from_str::<AiAnalysis>(body) {
        Ok(analysis) if !analysis.summary.trim().is_empty() => Some(analysis),
        Ok(mut analysis) => {
            analysis.summary = "Model returned no summary.".to_string();
            Some(analysis)
        }
        Err(_) => Some(AiAnalysis {
            summary: trimmed.to_string(),
            ..AiAnalysis::default()
        }),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    struct Failing;

    #[async_trait]
    impl NarrativeGenerator for Failing {
        async fn generate(
            &self,
            _input: &NarrativeInput<'_>,
        ) -> Result<GeneratedNarrative, NarrativeError> {
            Err(NarrativeError::RequestFailed("HTTP 500".to_string()))
        }
    }

    fn input(metrics: &[MetricChange]) -> NarrativeInput<'_> {
        let d = |raw: &str| NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date");
        NarrativeInput {
            title: "Weekly",
            current_range: DateRange::new(d("2024-03-08"), d("2024-03-14")).expect("range"),
            comparison_range: DateRange::new(d("2024-03-01"), d("2024-03-07")).expect("range"),
            metrics,
        }
    }

    #[test]
    fn parses_structured_json() {
        let text = r#"{
            "summary": "Traffic grew.",
            "perMetric": [{"metric": "sessions", "insight": "Up 20%", "impact": "positive"}],
            "anomalies": ["Spike on Tuesday"],
            "seoRecommendations": [],
            "technicalRecommendations": ["Check tagging"]
        }"#;
        let analysis = parse_analysis_text(text).expect("analysis");
        assert_eq!(analysis.summary, "Traffic grew.");
        assert_eq!(analysis.per_metric.len(), 1);
        assert_eq!(analysis.per_metric[0].impact, "positive");
        assert_eq!(analysis.technical_recommendations, vec!["Check tagging"]);
    }

    #[test]
    fn parses_fenced_json_with_missing_lists() {
        let text = "```json\n{\"summary\": \"Flat week.\"}\n```";
        let analysis = parse_analysis_text(text).expect("analysis");
        assert_eq!(analysis.summary, "Flat week.");
        assert!(analysis.anomalies.is_empty());
    }

    #[test]
    fn unparseable_text_becomes_summary() {
        let analysis = parse_analysis_text("- sessions up\n- users flat").expect("analysis");
        assert_eq!(analysis.summary, "- sessions up\n- users flat");
        assert!(analysis.per_metric.is_empty());
    }

    #[test]
    fn blank_text_is_none() {
        assert!(parse_analysis_text("   \n").is_none());
    }

    #[tokio::test]
    async fn missing_generator_yields_sentinel() {
        let narrative = narrate(None, &input(&[])).await;
        assert!(matches!(narrative, Narrative::Unavailable { .. }));
        let analysis = narrative.into_analysis();
        assert_eq!(analysis.summary, ANALYSIS_UNAVAILABLE);
        assert!(analysis.per_metric.is_empty());
    }

    #[tokio::test]
    async fn failing_generator_yields_sentinel_with_reason() {
        let narrative = narrate(Some(&Failing), &input(&[])).await;
        match &narrative {
            Narrative::Unavailable { reason } => assert!(reason.contains("HTTP 500")),
            other => panic!("unexpected narrative: {other:?}"),
        }
        assert_eq!(narrative.into_analysis(), AiAnalysis::unavailable());
    }
}
