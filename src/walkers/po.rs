// src/walkers/po.rs

//! Minimal gettext catalog reader and writer.
//!
//! Keeps comments, flags and obsolete `#~` entries so that a catalog written
//! back differs from its source only in the translated `msgstr` values.

use super::{Document, Unit};
use crate::classifier::is_translatable;
use crate::error::{AppError, Result};
use crate::pipeline::join_context;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoEntry {
    /// Comment lines (`#`, `#.`, `#:`, `#,`, `#|`) as written.
    pub comments: Vec<String>,
    pub msgctxt: Option<String>,
    pub msgid: String,
    pub msgid_plural: Option<String>,
    /// `msgstr`, or `msgstr[n]` by index for plural entries.
    pub msgstr: Vec<String>,
    /// 1-based line of the `msgid` keyword.
    pub line: usize,
}

impl PoEntry {
    pub fn is_header(&self) -> bool {
        self.msgid.is_empty() && self.msgctxt.is_none()
    }

    fn is_plural(&self) -> bool {
        self.msgid_plural.is_some()
    }

    fn set_singular(&mut self, value: &str) {
        if self.msgstr.is_empty() {
            self.msgstr.push(String::new());
        }
        self.msgstr[0] = value.to_string();
    }

    fn set_plural_forms(&mut self, value: &str) {
        if self.msgstr.len() < 2 {
            self.msgstr.resize(2, String::new());
        }
        for form in self.msgstr.iter_mut().skip(1) {
            *form = value.to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Entry(PoEntry),
    /// Lines kept verbatim, e.g. obsolete entries.
    Raw(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoForm {
    Singular,
    Plural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoLocation {
    pub item: usize,
    pub form: PoForm,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Ctxt,
    Id,
    Plural,
    Str(usize),
}

#[derive(Debug, Clone)]
pub struct PoDocument {
    name: String,
    items: Vec<Item>,
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

/// Content between the first and the last double quote of `line`.
fn quoted(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let end = line.rfind('"')?;
    (end > start).then(|| unescape(&line[start + 1..end]))
}

struct Parser {
    items: Vec<Item>,
    entry: PoEntry,
    has_keyword: bool,
    field: Option<Field>,
    obsolete: Vec<String>,
}

impl Parser {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            entry: PoEntry::default(),
            has_keyword: false,
            field: None,
            obsolete: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if !self.obsolete.is_empty() {
            self.items.push(Item::Raw(std::mem::take(&mut self.obsolete)));
        }
        let entry = std::mem::take(&mut self.entry);
        if self.has_keyword {
            self.items.push(Item::Entry(entry));
        } else if !entry.comments.is_empty() {
            self.items.push(Item::Raw(entry.comments));
        }
        self.has_keyword = false;
        self.field = None;
    }

    fn target(&mut self, field: Field) -> &mut String {
        match field {
            Field::Ctxt => self.entry.msgctxt.get_or_insert_with(String::new),
            Field::Id => &mut self.entry.msgid,
            Field::Plural => self.entry.msgid_plural.get_or_insert_with(String::new),
            Field::Str(index) => {
                if self.entry.msgstr.len() <= index {
                    self.entry.msgstr.resize(index + 1, String::new());
                }
                &mut self.entry.msgstr[index]
            }
        }
    }

    fn keyword(&mut self, field: Field, line: &str, number: usize) -> std::result::Result<(), String> {
        let value = quoted(line).ok_or_else(|| format!("line {number}: missing quoted string"))?;
        // A new msgctxt or msgid after a complete entry starts the next one.
        if matches!(field, Field::Ctxt | Field::Id) && matches!(self.field, Some(Field::Str(_))) {
            self.flush();
        }
        if let Field::Id = field {
            self.entry.line = number;
        }
        self.has_keyword = true;
        self.field = Some(field);
        *self.target(field) = value;
        Ok(())
    }

    fn line(&mut self, raw: &str, number: usize) -> std::result::Result<(), String> {
        let line = raw.trim();
        if line.is_empty() {
            self.flush();
        } else if line.starts_with("#~") {
            if self.has_keyword {
                self.flush();
            }
            // Comments directly above an obsolete entry belong to it.
            let comments = std::mem::take(&mut self.entry.comments);
            self.obsolete.extend(comments);
            self.obsolete.push(raw.trim_end().to_string());
        } else if line.starts_with('#') {
            if self.has_keyword || !self.obsolete.is_empty() {
                self.flush();
            }
            self.entry.comments.push(raw.trim_end().to_string());
        } else if line.starts_with('"') {
            let field = self.field.ok_or_else(|| format!("line {number}: string without a keyword"))?;
            let value = quoted(line).ok_or_else(|| format!("line {number}: unterminated string"))?;
            self.target(field).push_str(&value);
        } else if line.starts_with("msgctxt") {
            self.keyword(Field::Ctxt, line, number)?;
        } else if line.starts_with("msgid_plural") {
            self.keyword(Field::Plural, line, number)?;
        } else if line.starts_with("msgid") {
            self.keyword(Field::Id, line, number)?;
        } else if let Some(rest) = line.strip_prefix("msgstr[") {
            let index = rest
                .split(']')
                .next()
                .and_then(|i| i.trim().parse::<usize>().ok())
                .ok_or_else(|| format!("line {number}: invalid plural index"))?;
            self.keyword(Field::Str(index), line, number)?;
        } else if line.starts_with("msgstr") {
            self.keyword(Field::Str(0), line, number)?;
        } else {
            return Err(format!("line {number}: unexpected content '{line}'"));
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Item> {
        self.flush();
        self.items
    }
}

fn parse(content: &str) -> std::result::Result<Vec<Item>, String> {
    let mut parser = Parser::new();
    for (i, line) in content.trim_start_matches('\u{feff}').lines().enumerate() {
        parser.line(line, i + 1)?;
    }
    Ok(parser.finish())
}

fn write_field(out: &mut String, key: &str, value: &str) {
    let segments: Vec<&str> = value.split_inclusive('\n').collect();
    if segments.len() > 1 {
        out.push_str(&format!("{key} \"\"\n"));
        for segment in segments {
            out.push_str(&format!("\"{}\"\n", escape(segment)));
        }
    } else {
        out.push_str(&format!("{key} \"{}\"\n", escape(value)));
    }
}

fn render(items: &[Item]) -> String {
    let blocks: Vec<String> = items
        .iter()
        .map(|item| match item {
            Item::Raw(lines) => {
                let mut block = lines.join("\n");
                block.push('\n');
                block
            }
            Item::Entry(entry) => {
                let mut block = String::new();
                for comment in &entry.comments {
                    block.push_str(comment);
                    block.push('\n');
                }
                if let Some(ctxt) = &entry.msgctxt {
                    write_field(&mut block, "msgctxt", ctxt);
                }
                write_field(&mut block, "msgid", &entry.msgid);
                match &entry.msgid_plural {
                    Some(plural) => {
                        write_field(&mut block, "msgid_plural", plural);
                        let forms = entry.msgstr.len().max(2);
                        for i in 0..forms {
                            let value = entry.msgstr.get(i).map(String::as_str).unwrap_or("");
                            write_field(&mut block, &format!("msgstr[{i}]"), value);
                        }
                    }
                    None => {
                        write_field(&mut block, "msgstr", entry.msgstr.first().map(String::as_str).unwrap_or(""));
                    }
                }
                block
            }
        })
        .collect();
    blocks.join("\n")
}

impl PoDocument {
    /// Parses `path`. Entries whose msgid is not prose get it copied to msgstr.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| AppError::io(format!("read {}", path.display()), &e))?;
        let items = parse(&content).map_err(|message| AppError::FormatParse {
            format: "PO",
            path: path.display().to_string(),
            message,
        })?;
        let mut doc = Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            items,
        };
        doc.copy_untranslatable();
        Ok(doc)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PoEntry> {
        self.items.iter().filter_map(|item| match item {
            Item::Entry(entry) => Some(entry),
            Item::Raw(_) => None,
        })
    }

    fn copy_untranslatable(&mut self) {
        for item in &mut self.items {
            let Item::Entry(entry) = item else { continue };
            if entry.msgid.is_empty() || is_translatable(&entry.msgid) {
                continue;
            }
            let msgid = entry.msgid.clone();
            entry.set_singular(&msgid);
            if let Some(plural) = entry.msgid_plural.clone().filter(|p| !is_translatable(p)) {
                entry.set_plural_forms(&plural);
            }
        }
    }
}

impl Document for PoDocument {
    type Location = PoLocation;

    fn texts(&self) -> Vec<String> {
        self.entries()
            .flat_map(|entry| [Some(&entry.msgid), entry.msgid_plural.as_ref()])
            .flatten()
            .filter(|text| is_translatable(text))
            .cloned()
            .collect()
    }

    fn units(&self) -> Vec<Unit<PoLocation>> {
        let mut units = Vec::new();
        for (index, item) in self.items.iter().enumerate() {
            let Item::Entry(entry) = item else { continue };
            if is_translatable(&entry.msgid) {
                units.push(Unit {
                    location: PoLocation { item: index, form: PoForm::Singular },
                    text: entry.msgid.clone(),
                    entry_context: entry.msgctxt.clone(),
                    label: format!("PO '{}' | Line {} (msgid)", self.name, entry.line),
                });
            }
            if let Some(plural) = entry.msgid_plural.as_ref().filter(|p| is_translatable(p)) {
                units.push(Unit {
                    location: PoLocation { item: index, form: PoForm::Plural },
                    text: plural.clone(),
                    entry_context: entry.msgctxt.clone(),
                    label: format!("PO '{}' | Line {} (msgid_plural)", self.name, entry.line),
                });
            }
        }
        units
    }

    fn apply(&mut self, unit: &Unit<PoLocation>, translated: &str) {
        let Some(Item::Entry(entry)) = self.items.get_mut(unit.location.item) else {
            return;
        };
        match unit.location.form {
            PoForm::Singular => entry.set_singular(translated),
            PoForm::Plural if entry.is_plural() => entry.set_plural_forms(translated),
            PoForm::Plural => {}
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, render(&self.items)).map_err(|e| AppError::io(format!("write {}", path.display()), &e))
    }

    /// Prefixes the msgctxt of the entry with the file context.
    fn dynamic_context(&self, file_context: Option<&str>, unit: &Unit<PoLocation>) -> Option<String> {
        join_context(file_context, unit.entry_context.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG: &str = r#"# Translation of the main menu
msgid ""
msgstr ""
"Project-Id-Version: demo\n"
"Content-Type: text/plain; charset=UTF-8\n"

#: menu.c:10
msgctxt "main menu"
msgid "Start game"
msgstr ""

#, c-format
msgid ""
"Line one\n"
"Line \"two\""
msgstr ""

msgid "item_id"
msgstr ""

msgid "One apple"
msgid_plural "%d apples"
msgstr[0] ""
msgstr[1] ""

#~ msgid "Old entry"
#~ msgstr "Vecchia voce"
"#;

    fn load(dir: &TempDir) -> PoDocument {
        let path = dir.path().join("menu.po");
        fs::write(&path, CATALOG).unwrap();
        PoDocument::load(&path).unwrap()
    }

    #[test]
    fn test_parse_entries_and_escapes() {
        let dir = TempDir::new().unwrap();
        let doc = load(&dir);
        let entries: Vec<&PoEntry> = doc.entries().collect();
        assert_eq!(entries.len(), 5);
        assert!(entries[0].is_header());
        assert_eq!(entries[0].msgstr[0], "Project-Id-Version: demo\nContent-Type: text/plain; charset=UTF-8\n");
        assert_eq!(entries[1].msgctxt.as_deref(), Some("main menu"));
        assert_eq!(entries[1].comments, vec!["#: menu.c:10"]);
        assert_eq!(entries[1].line, 9);
        assert_eq!(entries[2].msgid, "Line one\nLine \"two\"");
        assert_eq!(entries[4].msgstr.len(), 2);
    }

    #[test]
    fn test_untranslatable_msgid_is_copied() {
        let dir = TempDir::new().unwrap();
        let doc = load(&dir);
        let entry = doc.entries().find(|e| e.msgid == "item_id").unwrap();
        assert_eq!(entry.msgstr, vec!["item_id"]);
        // The header keeps its metadata.
        assert!(doc.entries().next().unwrap().msgstr[0].starts_with("Project-Id-Version"));
    }

    #[test]
    fn test_units_carry_msgctxt_and_plural_forms() {
        let dir = TempDir::new().unwrap();
        let doc = load(&dir);
        let units = doc.units();
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["Start game", "Line one\nLine \"two\"", "One apple", "%d apples"]);
        assert_eq!(units[0].entry_context.as_deref(), Some("main menu"));
        assert_eq!(units[0].label, "PO 'menu.po' | Line 9 (msgid)");
        assert_eq!(
            doc.dynamic_context(Some("A fantasy RPG."), &units[0]).as_deref(),
            Some("General context: A fantasy RPG. - Entry context: main menu")
        );
        assert_eq!(doc.dynamic_context(None, &units[2]), None);
    }

    #[test]
    fn test_write_back_translations() {
        let dir = TempDir::new().unwrap();
        let mut doc = load(&dir);
        for unit in doc.units() {
            let translated = match unit.text.as_str() {
                "Start game" => "Inizia partita",
                "One apple" => "Una mela",
                "%d apples" => "%d mele",
                _ => "Riga uno\nRiga \"due\"",
            };
            doc.apply(&unit, translated);
        }
        let out = dir.path().join("out.po");
        doc.write(&out).unwrap();
        let written = fs::read_to_string(&out).unwrap();

        assert!(written.contains("msgctxt \"main menu\"\nmsgid \"Start game\"\nmsgstr \"Inizia partita\"\n"));
        assert!(written.contains("msgstr \"\"\n\"Riga uno\\n\"\n\"Riga \\\"due\\\"\"\n"));
        assert!(written.contains("msgstr[0] \"Una mela\"\nmsgstr[1] \"%d mele\"\n"));
        assert!(written.contains("#~ msgid \"Old entry\"\n#~ msgstr \"Vecchia voce\"\n"));
        assert!(written.starts_with("# Translation of the main menu\nmsgid \"\"\nmsgstr \"\"\n\"Project-Id-Version: demo\\n\"\n"));

        let reparsed = PoDocument::load(&out).unwrap();
        assert_eq!(reparsed.entries().count(), 5);
    }

    #[test]
    fn test_stray_content_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.po");
        fs::write(&path, "msgid \"a\"\nnonsense\n").unwrap();
        let err = PoDocument::load(&path).unwrap_err();
        assert!(matches!(err, AppError::FormatParse { format: "PO", .. }));
    }
}
