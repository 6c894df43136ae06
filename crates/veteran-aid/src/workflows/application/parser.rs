use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const TAGS: [&str; 4] = ["TO", "FROM", "BODY", "ATTACHMENTS"];

/// Sections of a generated application letter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedApplication {
    pub to: String,
    pub from: String,
    pub body: String,
    pub attachments: Vec<String>,
}

impl ParsedApplication {
    /// Splits `text` on the `[TO]`, `[FROM]`, `[BODY]` and `[ATTACHMENTS]` markers.
    /// Missing sections come back empty; unknown text before the first marker is ignored.
    pub fn parse(text: &str) -> Self {
        let [to, from, body, attachments] = TAGS.map(|tag| section(text, tag));

        Self {
            to,
            from,
            body,
            attachments: attachment_lines(&attachments),
        }
    }

    /// Renders the sections back into tagged text that [`ParsedApplication::parse`] accepts.
    pub fn to_tagged_text(&self) -> String {
        let attachments = self
            .attachments
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "[TO]\n{}\n[FROM]\n{}\n[BODY]\n{}\n[ATTACHMENTS]\n{}\n",
            self.to, self.from, self.body, attachments
        )
    }

    pub fn is_empty(&self) -> bool {
        self.to.is_empty()
            && self.from.is_empty()
            && self.body.is_empty()
            && self.attachments.is_empty()
    }
}

fn next_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\n\[[A-Z_]+\]").expect("marker pattern is valid"))
}

fn section(text: &str, tag: &str) -> String {
    let marker = format!("[{tag}]");
    let Some(start) = text.find(&marker) else {
        return String::new();
    };
    let rest = &text[start + marker.len()..];
    let end = next_marker()
        .find(rest)
        .map_or(rest.len(), |found| found.start());
    rest[..end].trim().to_string()
}

fn attachment_lines(section: &str) -> Vec<String> {
    section
        .lines()
        .map(str::trim)
        .map(|line| {
            line.strip_prefix(['-', '*', '•'])
                .map_or(line, str::trim_start)
                .trim_end()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
