//! OpenAI / Anthropic adapters for the optional AI extractor and scorer.
//!
//! One request per call, bounded by the configured timeout. Whatever comes back
//! is handed to the core as raw text; validation happens there.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use murmur_core::{IntentExtractor, Task, TaskScorer};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => bail!("unknown llm provider {other:?} (expected openai or anthropic)"),
        }
    }
}

pub struct LlmClient {
    provider: Provider,
    model: String,
    temperature: f32,
    key: String,
    tz: Tz,
    http: reqwest::Client,
}

impl LlmClient {
    /// `None` when the LLM is disabled or no key is available for the provider.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        if !cfg.llm.enabled {
            return Ok(None);
        }
        let provider = Provider::parse(&cfg.llm.provider)?;
        let auth = auth::load_auth()?;
        let key = match provider {
            Provider::OpenAI => auth.openai_key(),
            Provider::Anthropic => auth.anthropic_key(),
        };
        let Some(key) = key else {
            debug!(?provider, "llm enabled but no key stored, using heuristics");
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(cfg.llm_timeout())
            .build()
            .context("build http client")?;
        Ok(Some(Self {
            provider,
            model: cfg.llm.model.clone(),
            temperature: cfg.llm.temperature,
            key,
            tz: cfg.tz()?,
            http,
        }))
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        match self.provider {
            Provider::Anthropic => self.anthropic_complete(system, user).await,
            Provider::OpenAI => self.openai_complete(system, user).await,
        }
    }

    async fn anthropic_complete(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: i32,
            temperature: f32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = Req {
            model: &self.model,
            max_tokens: 1024,
            temperature: self.temperature,
            system,
            messages: vec![Msg {
                role: "user",
                content: user,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.key)?);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("anthropic error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse anthropic response")?;
        let text: String = out
            .content
            .into_iter()
            .filter(|b| b.t == "text")
            .filter_map(|b| b.text)
            .collect();
        Ok(text.trim().to_string())
    }

    async fn openai_complete(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .header(AUTHORIZATION, format!("Bearer {}", self.key))
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse openai response")?;
        out.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("openai returned no content"))
    }
}

const EXTRACT_SYSTEM: &str = "You turn one short voice command into a single JSON object and nothing else.\n\
Fields:\n\
- type: \"task\" or \"event\". Meetings, appointments, lunches and calls at a set time are events. Reminders and obligations are tasks.\n\
- title: short imperative title without date, time or priority words. Required.\n\
- description: optional extra detail.\n\
- dueDate: tasks only, RFC 3339 with offset.\n\
- startTime, endTime: events only, RFC 3339 with offset.\n\
- location: optional place.\n\
- priority: \"low\", \"medium\" or \"high\".\n\
Omit any field you cannot fill. Never invent a date that was not said.";

const SCORE_SYSTEM: &str = "You rank a user's tasks by how much attention each needs now.\n\
Reply with a JSON array only, one entry per input task, each {\"id\": string, \"score\": number, \"reasoning\": string}.\n\
Use every id exactly once. Scores are non-negative; higher means more urgent. Roughly: overdue 300+, due within hours 150-250, within days 50-125, no deadline 25-100.";

#[derive(Serialize)]
struct TaskBrief<'a> {
    id: &'a str,
    title: &'a str,
    priority: &'a str,
    completed: bool,
    due: Option<String>,
    created_at: String,
}

#[async_trait]
impl IntentExtractor for LlmClient {
    async fn extract(&self, utterance: &str, reference: DateTime<Utc>) -> Result<String> {
        let local = reference.with_timezone(&self.tz);
        let user = format!(
            "Current time: {} ({}, {}).\nCommand: {utterance}",
            local.to_rfc3339(),
            local.format("%A"),
            self.tz.name()
        );
        self.complete(EXTRACT_SYSTEM, &user).await
    }
}

#[async_trait]
impl TaskScorer for LlmClient {
    async fn score(&self, tasks: &[Task], reference: DateTime<Utc>) -> Result<String> {
        let briefs: Vec<TaskBrief<'_>> = tasks
            .iter()
            .map(|t| TaskBrief {
                id: &t.id,
                title: &t.title,
                priority: t.priority.as_str(),
                completed: t.completed,
                due: t.due.map(murmur_core::time::to_rfc3339_utc),
                created_at: murmur_core::time::to_rfc3339_utc(t.created_at),
            })
            .collect();
        let user = format!(
            "Current time: {}\nTasks:\n{}",
            murmur_core::time::to_rfc3339_utc(reference),
            serde_json::to_string_pretty(&briefs)?
        );
        self.complete(SCORE_SYSTEM, &user).await
    }
}
