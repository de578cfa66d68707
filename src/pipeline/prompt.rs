// src/pipeline/prompt.rs

use crate::classifier::EXCLUDED_TERMS;
use crate::config::{PromptSettings, TEXT_PLACEHOLDER};
use crate::error::{AppError, Result};

/// Builds the prompt sent for one unit.
///
/// A custom template only gets the text substituted. The generated template
/// names the languages and domain, lists the do-not-translate terms and appends
/// the optional static and dynamic context.
pub fn translation_prompt(
    settings: &PromptSettings,
    text: &str,
    dynamic_context: Option<&str>,
) -> Result<String> {
    if let Some(template) = &settings.custom_template {
        if !template.contains(TEXT_PLACEHOLDER) {
            return Err(AppError::config_validation(
                format!("the custom prompt does not contain '{TEXT_PLACEHOLDER}'"),
                Some("custom_prompt"),
            ));
        }
        return Ok(template.replace(TEXT_PLACEHOLDER, text));
    }

    let mut prompt = format!(
        "Translate the following text from {src} to {dst}, taking into account the context of \
         '{domain}' and using a style that includes slang or colloquial expressions appropriate \
         to that context, adapting the text where needed. CRITICAL INSTRUCTION: preserve exactly \
         every original line break (such as `\\n` or `\\r\\n`) present in the text. Also preserve \
         any HTML tags, placeholders (such as [p] or {{player_name}}) and special codes (such as \
         strings like talk_id_player). Keep the following terms identical, they must NOT be \
         translated even inside longer sentences: {terms}. When the grammatical gender is \
         unclear, use the masculine.",
        src = settings.source_lang,
        dst = settings.target_lang,
        domain = settings.domain,
        terms = EXCLUDED_TERMS.join(", "),
    );
    if let Some(extra) = settings.extra_context.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("\nAdditional instruction: {extra}."));
    }
    if let Some(dynamic) = dynamic_context.filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("\nAdditional context for this translation: '{dynamic}'."));
    }
    prompt.push_str("\nReply only with the direct translation.");
    Ok(format!(
        "{prompt}\nOriginal text:\n{text}\n\nTranslation into {}:",
        settings.target_lang
    ))
}

/// Prompt asking the model to summarise what a file is about.
pub fn file_context_prompt(domain: &str, sample: &str) -> String {
    format!(
        "Analyse the following text sample, taken from a translation file for '{domain}'. \
         Determine, in no more than two concise sentences, the main topic, general context or \
         most likely setting of this file. This context will be used to improve the quality of \
         the following translations. Reply only with the generated context.\n\
         Text sample:\n---\n{sample}\n---\nGenerated context:"
    )
}

/// Joins the file-level and entry-level context into one dynamic context.
pub fn join_context(file_context: Option<&str>, entry_context: Option<&str>) -> Option<String> {
    let parts: Vec<String> = [
        file_context.filter(|c| !c.is_empty()).map(|c| format!("General context: {c}")),
        entry_context.filter(|c| !c.is_empty()).map(|c| format!("Entry context: {c}")),
    ]
    .into_iter()
    .flatten()
    .collect();
    (!parts.is_empty()).then(|| parts.join(" - "))
}
