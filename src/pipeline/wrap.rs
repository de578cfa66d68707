// src/pipeline/wrap.rs

use crate::config::WrapOptions;

/// Greedy word wrap.
///
/// Existing line breaks are kept, each line is filled up to `width` characters
/// and the produced lines are joined with the configured newline token. Words
/// longer than the width are split.
pub fn wrap(text: &str, options: &WrapOptions) -> String {
    if options.width == 0 {
        return text.to_string();
    }
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        wrap_line(line, options.width, &mut lines);
    }
    if lines.is_empty() {
        return String::new();
    }
    lines.join(&options.newline)
}

fn wrap_line(line: &str, width: usize, out: &mut Vec<String>) {
    let mut current = String::new();
    let mut current_len = 0;
    let mut produced = false;

    for word in line.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if current_len > 0 {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(width);
            out.push(word.into_iter().collect());
            produced = true;
            word = rest;
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > width {
            out.push(std::mem::take(&mut current));
            produced = true;
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if current_len > 0 || !produced {
        out.push(current);
    }
}
