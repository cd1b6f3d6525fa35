//! Enrichment engine: batched LLM translation/summarization with a per-item fallback.
//!
//! Items are handled in batches of [`BATCH_SIZE`], one LLM call per batch. Any
//! item the batch call does not cover (call failure, unparseable output, missing
//! or blank entry) is retried on its own. Items that fail both ways stay
//! unenriched and are picked up by a later pass.

pub mod llm;
pub mod prompt;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;

use crate::config::ai::AiSettings;
use crate::db::Db;
use crate::enrich::llm::{build_client, DynLlmClient};
use crate::enrich::prompt::{
    batch_prompt, clean_template_output, parse_batch_response, summarize_prompt, template_prompt,
    translate_prompt, TargetLang, BATCH_TEMPERATURE, SUMMARIZE_TEMPERATURE, TEMPLATE_TEMPERATURE,
    TRANSLATE_TEMPERATURE,
};
use crate::models::{Enrichment, NewsItem};

pub const BATCH_SIZE: usize = 5;

/// Length of the body excerpt used when summaries are switched off.
const EXCERPT_CHARS: usize = 200;

/// Client and settings in effect for a run. Replaced as a whole on reload.
struct AiState {
    settings: AiSettings,
    lang: TargetLang,
    client: DynLlmClient,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
    pub enriched: usize,
    pub failed: usize,
    /// Items that went through the per-item path.
    pub fallbacks: usize,
}

pub struct Enricher {
    db: Db,
    state: RwLock<Arc<AiState>>,
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

impl Enricher {
    pub fn new(db: Db, settings: AiSettings) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self::with_client(db, settings, client))
    }

    pub fn with_client(db: Db, settings: AiSettings, client: DynLlmClient) -> Self {
        crate::metrics::describe_pipeline_metrics();
        let lang = TargetLang::parse(&settings.target_lang);
        Self {
            db,
            state: RwLock::new(Arc::new(AiState {
                settings,
                lang,
                client,
            })),
        }
    }

    fn snapshot(&self) -> Arc<AiState> {
        self.state.read().expect("ai state lock poisoned").clone()
    }

    pub fn settings(&self) -> AiSettings {
        self.snapshot().settings.clone()
    }

    pub fn is_available(&self) -> bool {
        self.snapshot().client.is_available()
    }

    /// Replace settings and client. Calls already running keep the previous pair.
    pub fn swap(&self, settings: AiSettings, client: DynLlmClient) {
        let lang = TargetLang::parse(&settings.target_lang);
        let next = Arc::new(AiState {
            settings,
            lang,
            client,
        });
        *self.state.write().expect("ai state lock poisoned") = next;
    }

    /// Build a client for `settings` and swap it in.
    pub fn reload(&self, settings: AiSettings) -> Result<()> {
        let client = build_client(&settings)?;
        tracing::info!(
            target: "enrich",
            provider = client.provider_name(),
            model = %settings.model,
            lang = %settings.target_lang,
            "ai client reloaded"
        );
        self.swap(settings, client);
        Ok(())
    }

    /// Enrich `items` and move every success into the reading window.
    pub async fn process_and_move_to_reading(&self, items: &[NewsItem]) -> Result<EnrichReport> {
        let ai = self.snapshot();
        let mut report = EnrichReport::default();
        if items.is_empty() {
            return Ok(report);
        }
        if !ai.client.is_available() {
            tracing::warn!(target: "enrich", count = items.len(), "AI not configured, skipping enrichment");
            return Ok(report);
        }

        for batch in items.chunks(BATCH_SIZE) {
            let covered = match self.run_batch(&ai, batch).await {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(target: "enrich", error = ?e, size = batch.len(), "batch enrichment failed, falling back to per-item");
                    HashMap::new()
                }
            };

            for (i, item) in batch.iter().enumerate() {
                let enrichment = match covered.get(&i) {
                    Some(e) => e.clone(),
                    None => {
                        report.fallbacks += 1;
                        counter!("enrich_batch_fallback_total").increment(1);
                        match self.enrich_one(&ai, item).await {
                            Ok(e) => e,
                            Err(e) => {
                                tracing::warn!(target: "enrich", error = ?e, id = %item.id, "item enrichment failed");
                                counter!("enrich_item_failures_total").increment(1);
                                report.failed += 1;
                                continue;
                            }
                        }
                    }
                };

                match self.db.mark_enriched(&item.id, &enrichment, Utc::now()).await {
                    Ok(true) => {
                        report.enriched += 1;
                        counter!("enrich_items_total").increment(1);
                        tracing::debug!(target: "enrich", id = %item.id, title = %item.title, "moved to reading window");
                    }
                    Ok(false) => {
                        tracing::warn!(target: "enrich", id = %item.id, "item disappeared before update");
                        report.failed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(target: "enrich", error = ?e, id = %item.id, "failed to update news");
                        report.failed += 1;
                    }
                }
            }
        }

        if let Ok(n) = self.db.count_pending().await {
            gauge!("reading_pending_items").set(n as f64);
        }
        tracing::info!(
            target: "enrich",
            enriched = report.enriched,
            failed = report.failed,
            fallbacks = report.fallbacks,
            "enrichment pass finished"
        );
        Ok(report)
    }

    /// One LLM call for the batch. Returns enrichments keyed by position in `batch`;
    /// positions absent from the map need the per-item path.
    async fn run_batch(&self, ai: &AiState, batch: &[NewsItem]) -> Result<HashMap<usize, Enrichment>> {
        let s = &ai.settings;
        if !s.enable_trans && !s.enable_summary {
            return Ok(batch
                .iter()
                .enumerate()
                .map(|(i, item)| (i, passthrough(item)))
                .collect());
        }

        let raw = ai
            .client
            .chat(&s.model, &batch_prompt(batch, &ai.lang), BATCH_TEMPERATURE)
            .await?;
        let entries = parse_batch_response(&raw)?;

        let mut out = HashMap::new();
        for entry in entries {
            if entry.index == 0 || entry.index > batch.len() {
                continue;
            }
            let pos = entry.index - 1;
            let item = &batch[pos];
            let title = entry.trans_title.trim();
            let summary = entry.trans_summary.trim();
            if s.enable_trans && title.is_empty() && !item.title.trim().is_empty() {
                continue;
            }
            if s.enable_summary && summary.is_empty() && !item.summary_input().trim().is_empty() {
                continue;
            }
            out.insert(
                pos,
                Enrichment {
                    trans_title: if s.enable_trans {
                        title.to_string()
                    } else {
                        item.title.clone()
                    },
                    trans_summary: if s.enable_summary {
                        summary.to_string()
                    } else {
                        excerpt(item.summary_input())
                    },
                },
            );
        }
        Ok(out)
    }

    /// Per-item path: translate the title, summarize the body (or title).
    async fn enrich_one(&self, ai: &AiState, item: &NewsItem) -> Result<Enrichment> {
        let s = &ai.settings;
        let trans_title = if s.enable_trans && !item.title.trim().is_empty() {
            let p = translate_prompt(&item.title, &ai.lang);
            ai.client.chat(&s.model, &p, TRANSLATE_TEMPERATURE).await?
        } else {
            item.title.clone()
        };

        let input = item.summary_input();
        let trans_summary = if !s.enable_summary {
            excerpt(input)
        } else if input.trim().is_empty() {
            String::new()
        } else {
            let p = summarize_prompt(input, &ai.lang);
            ai.client.chat(&s.model, &p, SUMMARIZE_TEMPERATURE).await?
        };

        let trans_title = trans_title.trim().to_string();
        let trans_summary = trans_summary.trim().to_string();
        if trans_title.is_empty() && !item.title.trim().is_empty() {
            return Err(anyhow!("empty translation for {}", item.id));
        }
        if s.enable_summary && trans_summary.is_empty() && !input.trim().is_empty() {
            return Err(anyhow!("empty summary for {}", item.id));
        }
        Ok(Enrichment {
            trans_title,
            trans_summary,
        })
    }

    /// Enrich a single item through the per-item path and persist it.
    pub async fn process_news(&self, item: &NewsItem) -> Result<Enrichment> {
        let ai = self.snapshot();
        let enrichment = self.enrich_one(&ai, item).await?;
        if !self.db.mark_enriched(&item.id, &enrichment, Utc::now()).await? {
            return Err(anyhow!("news {} not found", item.id));
        }
        counter!("enrich_items_total").increment(1);
        Ok(enrichment)
    }

    /// Pick up to `limit` unenriched items from the store and enrich them.
    pub async fn process_unprocessed_news(&self, limit: i64) -> Result<EnrichReport> {
        let items = self.db.unprocessed_news(limit).await?;
        tracing::info!(target: "enrich", count = items.len(), "processing unprocessed news");
        self.process_and_move_to_reading(&items).await
    }

    /// Ad hoc translation; `lang` overrides the configured target.
    pub async fn translate(&self, text: &str, lang: Option<&str>) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let ai = self.snapshot();
        let lang = lang.map(TargetLang::parse).unwrap_or_else(|| ai.lang.clone());
        ai.client
            .chat(&ai.settings.model, &translate_prompt(text, &lang), TRANSLATE_TEMPERATURE)
            .await
    }

    pub async fn summarize(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let ai = self.snapshot();
        ai.client
            .chat(&ai.settings.model, &summarize_prompt(text, &ai.lang), SUMMARIZE_TEMPERATURE)
            .await
    }

    /// Draft an email template from a free-text description.
    pub async fn generate_template(&self, description: &str, current: &str) -> Result<String> {
        let ai = self.snapshot();
        let raw = ai
            .client
            .chat(
                &ai.settings.model,
                &template_prompt(description, current),
                TEMPLATE_TEMPERATURE,
            )
            .await?;
        Ok(clean_template_output(&raw))
    }
}

/// Enrichment that copies source fields (both LLM features switched off).
fn passthrough(item: &NewsItem) -> Enrichment {
    Enrichment {
        trans_title: item.title.clone(),
        trans_summary: excerpt(item.summary_input()),
    }
}
