//! Built-in tool implementations.
//!
//! Search, maps, and delegated-reasoning tools fan out to the provider's
//! HTTP generateContent endpoint with per-tool model and thinking settings.
//! Reminder and time tools are handled locally. Each call yields a
//! natural-language string the live model speaks back to the user.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{GeoLocation, ProviderConfig, ToolsConfig};
use crate::tools::reminders::ReminderScheduler;
use crate::tools::{ToolCallRequest, ToolExecutor};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result text for a tool the assistant does not know.
const UNKNOWN_TOOL_REPLY: &str = "I'm not able to do that right now.";

/// Parameters for one generateContent call.
struct GenerateRequest<'a> {
    prompt: &'a str,
    grounding: Option<Value>,
    thinking_budget: Option<u32>,
    location: Option<GeoLocation>,
}

/// Build the generateContent request body. Grounding tools, the thinking
/// budget, and a retrieval location are each optional.
fn request_body(request: &GenerateRequest<'_>) -> Value {
    let mut body = json!({
        "contents": [{"parts": [{"text": request.prompt}]}],
    });
    if let Some(tools) = &request.grounding {
        body["tools"] = tools.clone();
    }
    if let Some(budget) = request.thinking_budget {
        body["generationConfig"] = json!({"thinkingConfig": {"thinkingBudget": budget}});
    }
    if let Some(loc) = request.location {
        body["toolConfig"] = json!({
            "retrievalConfig": {
                "latLng": {"latitude": loc.latitude, "longitude": loc.longitude}
            }
        });
    }
    body
}

/// Executes the default tool surface against the provider API and the
/// local reminder scheduler.
pub struct BuiltinToolExecutor {
    http: reqwest::Client,
    provider: ProviderConfig,
    tools: ToolsConfig,
    reminders: ReminderScheduler,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl BuiltinToolExecutor {
    pub fn new(
        provider: ProviderConfig,
        tools: ToolsConfig,
        reminders: ReminderScheduler,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            provider,
            tools,
            reminders,
        }
    }

    async fn run_one(&self, call: &ToolCallRequest) -> anyhow::Result<String> {
        debug!("executing tool '{}'", call.name);
        match call.name.as_str() {
            "performGoogleSearch" => {
                let query = str_arg(&call.args, "query")?;
                self.generate(
                    &self.tools.fast_model,
                    GenerateRequest {
                        prompt: &query,
                        grounding: Some(json!([{"googleSearch": {}}])),
                        thinking_budget: None,
                        location: None,
                    },
                )
                .await
            }
            "findPlacesOnMap" => {
                let query = str_arg(&call.args, "query")?;
                self.generate(
                    &self.tools.fast_model,
                    GenerateRequest {
                        prompt: &query,
                        grounding: Some(json!([{"googleMaps": {}}])),
                        thinking_budget: None,
                        location: self.tools.location,
                    },
                )
                .await
            }
            "performComplexTask" => {
                let prompt = str_arg(&call.args, "prompt")?;
                self.generate(
                    &self.tools.reasoning_model,
                    GenerateRequest {
                        prompt: &prompt,
                        grounding: None,
                        thinking_budget: Some(self.tools.thinking_budget),
                        location: None,
                    },
                )
                .await
            }
            "performSimpleTask" => {
                let prompt = str_arg(&call.args, "prompt")?;
                self.generate(
                    &self.tools.fast_model,
                    GenerateRequest {
                        prompt: &prompt,
                        grounding: None,
                        thinking_budget: Some(0),
                        location: None,
                    },
                )
                .await
            }
            "setReminder" => {
                let duration = num_arg(&call.args, "duration")?;
                let unit = str_arg(&call.args, "unit")?;
                let text = str_arg(&call.args, "reminderText")?;
                let secs = match unit.to_lowercase().as_str() {
                    "seconds" | "second" => duration,
                    "minutes" | "minute" => duration * 60.0,
                    "hours" | "hour" => duration * 3600.0,
                    other => anyhow::bail!("unrecognized time unit '{other}'"),
                };
                self.reminders
                    .set_after(Duration::from_secs_f64(secs.max(0.0)), &text);
                Ok(format!(
                    "Okay, I will remind you to {text} in {duration} {unit}."
                ))
            }
            "setReminderAtTime" => {
                let time = str_arg(&call.args, "time")?;
                let text = str_arg(&call.args, "reminderText")?;
                self.reminders.set_at(&time, &text)?;
                Ok(format!("Okay, I will remind you to {text} at {time}."))
            }
            "getCurrentTime" => Ok(format!(
                "The current time is {}.",
                Local::now().format("%-I:%M %p")
            )),
            "openApplication" => {
                let app = str_arg(&call.args, "appName")?;
                info!("open-application request for '{app}'");
                Ok(format!("Opening {app}."))
            }
            other => {
                warn!("unknown tool requested: '{other}'");
                Ok(UNKNOWN_TOOL_REPLY.to_string())
            }
        }
    }

    /// One-shot generateContent call.
    async fn generate(&self, model: &str, request: GenerateRequest<'_>) -> anyhow::Result<String> {
        let body = request_body(&request);
        let url = format!(
            "{}/models/{}:generateContent",
            self.provider.api_base.trim_end_matches('/'),
            model
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.provider.resolved_api_key())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("model call failed with {status}: {detail}");
        }
        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            anyhow::bail!("model returned no text");
        }
        Ok(text)
    }
}

#[async_trait]
impl ToolExecutor for BuiltinToolExecutor {
    async fn execute(&self, batch: &[ToolCallRequest]) -> anyhow::Result<String> {
        // When calls arrive batched, later results overwrite earlier ones;
        // the single response slot carries the final text.
        let mut last = String::new();
        for call in batch {
            last = self.run_one(call).await?;
        }
        Ok(last)
    }
}

fn str_arg(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing string argument '{key}'"))
}

fn num_arg(args: &Value, key: &str) -> anyhow::Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow::anyhow!("missing numeric argument '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::reminders::AnnounceFn;
    use std::sync::Arc;
    use tokio::sync::watch;

    fn executor() -> BuiltinToolExecutor {
        let announce: AnnounceFn = Arc::new(|_| Box::pin(async {}));
        let (_alive_tx, alive_rx) = watch::channel(false);
        let (reminders, _events) = ReminderScheduler::new(announce, alive_rx);
        BuiltinToolExecutor::new(ProviderConfig::default(), ToolsConfig::default(), reminders)
    }

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "1".into(),
            name: name.into(),
            args,
        }
    }

    #[tokio::test]
    async fn current_time_answers_locally() {
        let result = executor()
            .execute(&[call("getCurrentTime", json!({}))])
            .await
            .unwrap();
        assert!(result.starts_with("The current time is"));
    }

    #[tokio::test]
    async fn set_reminder_confirms_and_schedules() {
        let announce: AnnounceFn = Arc::new(|_| Box::pin(async {}));
        let (_alive_tx, alive_rx) = watch::channel(false);
        let (reminders, _events) = ReminderScheduler::new(announce, alive_rx);
        let exec = BuiltinToolExecutor::new(
            ProviderConfig::default(),
            ToolsConfig::default(),
            reminders.clone(),
        );
        let result = exec
            .execute(&[call(
                "setReminder",
                json!({"duration": 5.0, "unit": "minutes", "reminderText": "stretch"}),
            )])
            .await
            .unwrap();
        assert!(result.contains("stretch"));
        assert_eq!(reminders.list().len(), 1);
    }

    #[tokio::test]
    async fn set_reminder_rejects_bad_unit() {
        let result = executor()
            .execute(&[call(
                "setReminder",
                json!({"duration": 1.0, "unit": "fortnights", "reminderText": "x"}),
            )])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_tool_gets_polite_refusal() {
        let result = executor()
            .execute(&[call("launchMissiles", json!({}))])
            .await
            .unwrap();
        assert_eq!(result, UNKNOWN_TOOL_REPLY);
    }

    #[tokio::test]
    async fn open_application_acknowledges() {
        let result = executor()
            .execute(&[call("openApplication", json!({"appName": "Terminal"}))])
            .await
            .unwrap();
        assert_eq!(result, "Opening Terminal.");
    }

    #[test]
    fn maps_request_carries_configured_location() {
        let body = request_body(&GenerateRequest {
            prompt: "coffee near me",
            grounding: Some(json!([{"googleMaps": {}}])),
            thinking_budget: None,
            location: Some(GeoLocation {
                latitude: 52.52,
                longitude: 13.405,
            }),
        });
        let lat_lng = &body["toolConfig"]["retrievalConfig"]["latLng"];
        assert_eq!(lat_lng["latitude"], 52.52);
        assert_eq!(lat_lng["longitude"], 13.405);
        assert_eq!(body["tools"][0]["googleMaps"], json!({}));
    }

    #[test]
    fn request_omits_tool_config_without_location() {
        let body = request_body(&GenerateRequest {
            prompt: "coffee near me",
            grounding: Some(json!([{"googleMaps": {}}])),
            thinking_budget: None,
            location: None,
        });
        assert!(body.get("toolConfig").is_none());
    }

    #[tokio::test]
    async fn missing_argument_is_an_error() {
        let result = executor()
            .execute(&[call("performGoogleSearch", json!({}))])
            .await;
        assert!(result.is_err());
    }
}
