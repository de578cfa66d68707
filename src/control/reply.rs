// src/control/reply.rs

use crate::key_manager::KeyRow;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};

/// One piece of a command reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Line(String),
    /// Titled label/value pairs.
    Section { title: String, rows: Vec<(String, String)> },
    Keys(Vec<KeyRow>),
    /// Preformatted text, e.g. a prompt.
    Code { title: String, text: String },
}

/// Output of a control command, rendered either as inline markup for chat
/// bridges or as tables for a local terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    blocks: Vec<Block>,
}

impl Reply {
    pub fn line(text: impl Into<String>) -> Self {
        Self::default().with(Block::Line(text.into()))
    }

    #[must_use]
    pub fn with(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    #[must_use]
    pub fn with_line(self, text: impl Into<String>) -> Self {
        self.with(Block::Line(text.into()))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// `*bold*` / `` `code` `` markup understood by chat bridges.
    pub fn to_markup(&self) -> String {
        let mut out: Vec<String> = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Line(text) => out.push(text.clone()),
                Block::Section { title, rows } => {
                    out.push(format!("*{title}*"));
                    out.extend(rows.iter().map(|(label, value)| format!("*{label}:* `{value}`")));
                }
                Block::Keys(rows) => {
                    out.push("*🔑 API keys*".to_string());
                    out.extend(rows.iter().map(|row| {
                        format!(
                            "`[{:2}]` • `{:7}` • {} calls{}",
                            row.index,
                            row.preview,
                            row.calls,
                            key_status(row).map(|s| format!(" ({s})")).unwrap_or_default()
                        )
                    }));
                }
                Block::Code { title, text } => {
                    out.push(format!("*{title}:*\n```\n{text}\n```"));
                }
            }
        }
        out.join("\n")
    }

    /// Table rendering for the local console.
    pub fn to_terminal(&self) -> String {
        let mut out: Vec<String> = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Line(text) => out.push(strip_markup(text)),
                Block::Section { title, rows } => {
                    let mut table = new_table();
                    table.set_header(vec![Cell::new(title).fg(Color::Cyan), Cell::new("")]);
                    for (label, value) in rows {
                        table.add_row(vec![Cell::new(label), Cell::new(value)]);
                    }
                    out.push(table.to_string());
                }
                Block::Keys(rows) => {
                    let mut table = new_table();
                    table.set_header(vec!["Index", "Key", "Status", "Calls"]);
                    for row in rows {
                        let status = match key_status(row) {
                            Some(status) if row.blacklisted => Cell::new(status).fg(Color::Red),
                            Some(status) => Cell::new(status).fg(Color::Green),
                            None => Cell::new(""),
                        };
                        table.add_row(vec![
                            Cell::new(row.index),
                            Cell::new(&row.preview),
                            status,
                            Cell::new(row.calls),
                        ]);
                    }
                    out.push(table.to_string());
                }
                Block::Code { title, text } => {
                    let mut table = new_table();
                    table.set_header(vec![Cell::new(title).fg(Color::Cyan)]);
                    table.add_row(vec![text]);
                    out.push(table.to_string());
                }
            }
        }
        out.join("\n")
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn key_status(row: &KeyRow) -> Option<&'static str> {
    if row.blacklisted {
        Some("❌ BLACKLISTED")
    } else if row.active {
        Some("✅ ACTIVE")
    } else {
        None
    }
}

/// Drops the `*` and `` ` `` markers of the inline markup.
pub fn strip_markup(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '*' | '`')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<KeyRow> {
        vec![
            KeyRow { index: 0, preview: "...aaaa".into(), calls: 3, active: true, blacklisted: false },
            KeyRow { index: 1, preview: "...bbbb".into(), calls: 0, active: false, blacklisted: true },
            KeyRow { index: 2, preview: "...cccc".into(), calls: 1, active: false, blacklisted: false },
        ]
    }

    #[test]
    fn test_markup_key_table() {
        let markup = Reply::default().with(Block::Keys(rows())).to_markup();
        let lines: Vec<&str> = markup.lines().collect();
        assert_eq!(lines[0], "*🔑 API keys*");
        assert_eq!(lines[1], "`[ 0]` • `...aaaa` • 3 calls (✅ ACTIVE)");
        assert_eq!(lines[2], "`[ 1]` • `...bbbb` • 0 calls (❌ BLACKLISTED)");
        assert_eq!(lines[3], "`[ 2]` • `...cccc` • 1 calls");
    }

    #[test]
    fn test_markup_section() {
        let reply = Reply::line("ok").with(Block::Section {
            title: "RPM".into(),
            rows: vec![("Limit".into(), "10/min".into())],
        });
        assert_eq!(reply.to_markup(), "ok\n*RPM*\n*Limit:* `10/min`");
    }

    #[test]
    fn test_terminal_rendering_contains_values() {
        let reply = Reply::line("*bold* `code`")
            .with(Block::Keys(rows()))
            .with(Block::Code { title: "Last prompt".into(), text: "Translate {x}".into() });
        let text = reply.to_terminal();
        assert!(text.starts_with("bold code"));
        assert!(text.contains("...bbbb"));
        assert!(text.contains("BLACKLISTED"));
        assert!(text.contains("Translate {x}"));
    }
}
