//! Minimal placeholder templates for digest emails.
//!
//! Top level: `{{date}}`, `{{count}}`, `{{generated}}` and one or more
//! `{{#each news}} ... {{/each}}` blocks. Inside a block every item exposes
//! `{{title}}`, `{{original_title}}`, `{{summary}}`, `{{url}}`, `{{source}}`,
//! `{{category}}`, `{{image_url}}`, `{{author}}` and `{{published}}`, and
//! `{{#if field}} ... {{/if}}` renders only when the field is non-empty.
//! All substituted values are HTML-escaped. Unknown placeholders are left as is.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};

use crate::models::NewsItem;

fn re_each() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{#each news\}\}(.*?)\{\{/each\}\}").expect("each regex"))
}

fn re_if() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{#if (\w+)\}\}(.*?)\{\{/if\}\}").expect("if regex"))
}

fn re_var() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("var regex"))
}

fn escape(s: &str) -> String {
    html_escape::encode_quoted_attribute(s).into_owned()
}

fn item_field(item: &NewsItem, name: &str) -> Option<String> {
    let v = match name {
        "title" => item.display_title().to_string(),
        "original_title" => item.title.clone(),
        "summary" => item.display_summary().to_string(),
        "url" => item.url.clone(),
        "source" => item.source.clone(),
        "category" => item.category.clone(),
        "image_url" => item.image_url.clone(),
        "author" => item.author.clone(),
        "published" => item
            .published_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        _ => return None,
    };
    Some(v)
}

fn render_item(block: &str, item: &NewsItem) -> String {
    let with_ifs = re_if().replace_all(block, |c: &Captures| {
        let present = item_field(item, &c[1]).is_some_and(|v| !v.trim().is_empty());
        if present {
            c[2].to_string()
        } else {
            String::new()
        }
    });
    re_var()
        .replace_all(&with_ifs, |c: &Captures| match item_field(item, &c[1]) {
            Some(v) => escape(&v),
            None => c[0].to_string(),
        })
        .into_owned()
}

/// Render `template` against `items`.
pub fn render(template: &str, items: &[NewsItem], now: DateTime<Utc>) -> String {
    let expanded = re_each().replace_all(template, |c: &Captures| {
        items.iter().map(|it| render_item(&c[1], it)).collect::<String>()
    });

    let date = now.format("%Y-%m-%d").to_string();
    let generated = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let count = items.len().to_string();
    re_var()
        .replace_all(&expanded, |c: &Captures| match &c[1] {
            "date" => date.clone(),
            "generated" => generated.clone(),
            "count" => count.clone(),
            _ => c[0].to_string(),
        })
        .into_owned()
}

/// Placeholder items for previewing a template when the window is empty.
pub fn sample_items() -> Vec<NewsItem> {
    let now = Utc::now();
    vec![
        NewsItem {
            id: "sample-1".into(),
            title: "OpenAI ships a new reasoning model".into(),
            trans_title: "OpenAI 发布新的推理模型".into(),
            trans_summary: "新模型在数学与编程基准上表现显著提升。".into(),
            url: "https://example.com/news/1".into(),
            source: "Hacker News".into(),
            category: "ai".into(),
            published_at: Some(now),
            ..Default::default()
        },
        NewsItem {
            id: "sample-2".into(),
            title: "Rust 1.x released".into(),
            trans_title: "Rust 新版本发布".into(),
            trans_summary: "新版本带来更快的编译速度和若干语言改进。".into(),
            url: "https://example.com/news/2".into(),
            source: "The Verge".into(),
            category: "tech".into(),
            published_at: Some(now),
            ..Default::default()
        },
    ]
}

pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f4f5f7; margin: 0; padding: 20px; }
        .container { max-width: 680px; margin: 0 auto; background: #fff; border-radius: 10px; overflow: hidden; }
        .header { background: #2f3b69; color: #fff; padding: 28px; text-align: center; }
        .header h1 { margin: 0; font-size: 22px; }
        .header p { margin: 8px 0 0; opacity: 0.85; }
        .content { padding: 16px 24px; }
        .item { border-bottom: 1px solid #eee; padding: 18px 0; }
        .item:last-child { border-bottom: none; }
        .item h2 { font-size: 17px; margin: 0 0 8px; }
        .item h2 a { color: #2f3b69; text-decoration: none; }
        .meta { font-size: 12px; color: #999; margin-bottom: 8px; }
        .tag { background: #eef0f6; padding: 2px 8px; border-radius: 4px; margin-right: 10px; }
        .summary { color: #555; line-height: 1.7; margin: 0; white-space: pre-line; }
        .footer { background: #fafafa; padding: 16px; text-align: center; color: #999; font-size: 12px; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>News Intel Daily</h1>
            <p>{{date}} · {{count}} stories</p>
        </div>
        <div class="content">
            {{#each news}}
            <div class="item">
                <h2><a href="{{url}}" target="_blank">{{title}}</a></h2>
                <div class="meta"><span class="tag">{{category}}</span><span>{{source}}</span></div>
                <p class="summary">{{summary}}</p>
            </div>
            {{/each}}
        </div>
        <div class="footer">Generated by News Intel at {{generated}}</div>
    </div>
</body>
</html>"#;

pub const BILINGUAL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f4f5f7; margin: 0; padding: 20px; }
        .container { max-width: 720px; margin: 0 auto; background: #fff; border-radius: 10px; overflow: hidden; }
        .header { background: #2f3b69; color: #fff; padding: 28px; text-align: center; }
        .header h1 { margin: 0; font-size: 22px; }
        .header .ug { direction: rtl; font-size: 19px; margin-top: 6px; }
        .content { padding: 16px 24px; }
        .item { border-bottom: 1px solid #eee; padding: 20px 0; }
        .item:last-child { border-bottom: none; }
        .item h2 { font-size: 17px; margin: 0 0 10px; }
        .item h2 a { color: #2f3b69; text-decoration: none; }
        .meta { font-size: 12px; color: #999; margin-bottom: 10px; }
        .tag { background: #2f3b69; color: #fff; padding: 2px 8px; border-radius: 4px; margin-right: 10px; }
        .bilingual { background: #fafafa; border-radius: 8px; padding: 14px; }
        .bilingual .title { font-weight: 600; margin: 0 0 8px; white-space: pre-line; }
        .bilingual .text { color: #555; line-height: 1.8; margin: 0; white-space: pre-line; unicode-bidi: plaintext; }
        .footer { background: #fafafa; padding: 16px; text-align: center; color: #999; font-size: 12px; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>新闻情报日报</h1>
            <div class="ug">خەۋەر ئۇچۇرلىرى كۈندىلىك</div>
            <p>{{date}} · {{count}}</p>
        </div>
        <div class="content">
            {{#each news}}
            <div class="item">
                <h2><a href="{{url}}" target="_blank">{{original_title}}</a></h2>
                <div class="meta"><span class="tag">{{category}}</span><span>{{source}}</span></div>
                <div class="bilingual">
                    <p class="title">{{title}}</p>
                    <p class="text">{{summary}}</p>
                </div>
            </div>
            {{/each}}
        </div>
        <div class="footer">News Intel · {{generated}}</div>
    </div>
</body>
</html>"#;
