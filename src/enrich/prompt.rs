//! Prompt construction and parsing of the batch response format.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer};

use crate::models::NewsItem;

pub const TRANSLATE_TEMPERATURE: f32 = 0.3;
pub const SUMMARIZE_TEMPERATURE: f32 = 0.5;
pub const BATCH_TEMPERATURE: f32 = 0.3;
pub const TEMPLATE_TEMPERATURE: f32 = 0.7;

/// Body text included per item in a batch prompt.
const BATCH_CONTENT_CHARS: usize = 800;

pub const LABEL_ZH: &str = "【中文】";
pub const LABEL_UG: &str = "【ئۇيغۇرچە】";

/// Output language mode selected by `AiSettings::target_lang`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetLang {
    /// Two labelled sections (Chinese, then Uyghur) in one field.
    Bilingual,
    Uyghur,
    Tag(String),
}

impl TargetLang {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        match s.to_ascii_lowercase().as_str() {
            "zh-ug" => Self::Bilingual,
            "ug" => Self::Uyghur,
            "" => Self::Tag("zh-CN".to_string()),
            _ => Self::Tag(s.to_string()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Bilingual => format!(
                "both Chinese and Uyghur, formatted as two sections: \"{LABEL_ZH}<Chinese text>\" \
                 on the first line and \"{LABEL_UG}<Uyghur text>\" on the second line"
            ),
            Self::Uyghur => "Uyghur (ug)".to_string(),
            Self::Tag(tag) => format!("the language identified by \"{tag}\""),
        }
    }
}

pub fn translate_prompt(text: &str, lang: &TargetLang) -> String {
    format!(
        "Translate the following text into {}. Return only the translation, without any \
         explanation.\n\n{text}",
        lang.describe()
    )
}

pub fn summarize_prompt(text: &str, lang: &TargetLang) -> String {
    format!(
        "Write a concise summary (at most 100 words) of the following news article in {}. \
         Return only the summary.\n\n{text}",
        lang.describe()
    )
}

/// One prompt covering a whole batch; items are numbered from 1 in input order.
pub fn batch_prompt(items: &[NewsItem], lang: &TargetLang) -> String {
    let mut out = format!(
        "For each news item below, translate the title and write a concise summary \
         (at most 100 words), both in {}.\n\
         Respond with ONLY a JSON array, one object per item, shaped exactly like:\n\
         [{{\"index\": 1, \"trans_title\": \"...\", \"trans_summary\": \"...\"}}]\n\
         `index` is the item number given below.\n",
        lang.describe()
    );
    for (i, item) in items.iter().enumerate() {
        let body: String = item.summary_input().chars().take(BATCH_CONTENT_CHARS).collect();
        out.push_str(&format!(
            "\n### Item {}\nTitle: {}\nContent: {}\n",
            i + 1,
            item.title,
            body
        ));
    }
    out
}

pub fn template_prompt(description: &str, current: &str) -> String {
    let mut out = String::from(
        "You write HTML email templates for a news digest. Use inline CSS only.\n\
         Available placeholders: {{date}}, {{count}}, {{generated}}, and a loop \
         {{#each news}} ... {{/each}} in which {{title}}, {{original_title}}, {{summary}}, \
         {{url}}, {{source}}, {{category}}, {{image_url}} and {{author}} are available.\n\
         Return ONLY the complete HTML document.\n\n",
    );
    out.push_str("Requirements: ");
    out.push_str(description.trim());
    if !current.trim().is_empty() {
        out.push_str("\n\nStart from this existing template:\n");
        out.push_str(current);
    }
    out
}

/// One element of the batch response array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchEntry {
    #[serde(deserialize_with = "index_from_any")]
    pub index: usize,
    #[serde(default)]
    pub trans_title: String,
    #[serde(default)]
    pub trans_summary: String,
}

fn index_from_any<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Idx {
        Num(u64),
        Text(String),
    }
    match Idx::deserialize(d)? {
        Idx::Num(n) => Ok(n as usize),
        Idx::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // drop the info string ("json") on the opening line
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Parse the batch response, tolerating code fences and prose around the array.
pub fn parse_batch_response(raw: &str) -> Result<Vec<BatchEntry>> {
    let s = strip_code_fence(raw);
    let start = s.find('[').ok_or_else(|| anyhow!("no JSON array in batch response"))?;
    let end = s.rfind(']').ok_or_else(|| anyhow!("unterminated JSON array in batch response"))?;
    if end < start {
        return Err(anyhow!("malformed JSON array in batch response"));
    }
    serde_json::from_str(&s[start..=end]).context("decoding batch response")
}

/// Model output for templates may be fenced; keep only the document.
pub fn clean_template_output(raw: &str) -> String {
    strip_code_fence(raw).to_string()
}
