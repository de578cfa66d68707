// src/pipeline/mod.rs

//! Per-unit translation: classify, cache lookup, prompt, model call with
//! failure recovery, cache store.

pub mod prompt;
pub mod wrap;

use crate::classifier::{context_fingerprint, is_excluded, is_translatable, translation_fingerprint};
use crate::error::{AppError, Halt};
use crate::key_manager::{KeyChange, RotationReason, MAX_MAJOR_FAILURES};
use crate::state::RunContext;
use tracing::{debug, error, info, instrument, warn};

pub use prompt::{file_context_prompt, join_context, translation_prompt};
pub use wrap::wrap;

/// Number of texts sampled for a file context unless the full sample is requested.
pub const FILE_CONTEXT_SAMPLE_SIZE: usize = 15;

/// Translates one unit.
///
/// Never fails for a single unit: excluded, untranslatable or unrecoverable
/// texts come back unchanged. Only a skip-file request or an exhausted key set
/// end the call early.
#[instrument(level = "debug", skip_all, fields(unit = %label))]
pub async fn translate(
    ctx: &RunContext,
    text: &str,
    label: &str,
    dynamic_context: Option<&str>,
) -> Result<String, Halt> {
    if is_excluded(text) || !is_translatable(text) {
        return Ok(text.to_string());
    }

    let settings = &ctx.settings.prompt;
    let fingerprint = translation_fingerprint(
        text,
        &settings.source_lang,
        &settings.target_lang,
        &settings.domain,
        settings.extra_context.as_deref(),
    );
    if let Some(hit) = ctx.cache.get(&fingerprint) {
        ctx.counters.record_cache_hit();
        info!(unit = %label, original = %text, translation = %hit, "Cache hit");
        return Ok(hit);
    }

    let prompt = match translation_prompt(settings, text, dynamic_context) {
        Ok(prompt) => prompt,
        Err(e) => {
            error!(unit = %label, error = %e, "Prompt could not be built, unit skipped");
            return Ok(text.to_string());
        }
    };
    ctx.flags().last_prompt = Some(prompt.clone());

    match call_model(ctx, &prompt, label).await? {
        Some(reply) => {
            let translated = match &ctx.settings.wrap {
                Some(options) => wrap(&reply, options),
                None => reply,
            };
            info!(unit = %label, original = %text, translation = %translated, "Translated");
            ctx.cache.put(fingerprint, translated.clone());
            Ok(translated)
        }
        None => {
            warn!(unit = %label, "Translation failed, keeping the original text");
            Ok(text.to_string())
        }
    }
}

/// Generates (or fetches from the cache) a short description of a file.
///
/// Failures yield `None` and the file is processed without dynamic context.
#[instrument(level = "debug", skip(ctx, samples), fields(samples = samples.len()))]
pub async fn file_context(
    ctx: &RunContext,
    file_id: &str,
    samples: &[String],
) -> Result<Option<String>, Halt> {
    if samples.is_empty() {
        return Ok(None);
    }

    let settings = &ctx.settings.prompt;
    let fingerprint = context_fingerprint(
        file_id,
        &settings.domain,
        settings.extra_context.as_deref(),
        ctx.settings.full_context_sample,
    );
    if let Some(hit) = ctx.cache.get(&fingerprint) {
        ctx.counters.record_cache_hit();
        info!(file = %file_id, "File context found in cache");
        return Ok(Some(hit));
    }

    info!(file = %file_id, samples = samples.len(), "Generating file context");
    let prompt = file_context_prompt(&settings.domain, &samples.join("\n"));
    let label = format!("file context {file_id}");

    Ok(call_model(ctx, &prompt, &label).await?.map(|reply| {
        let generated = match &ctx.settings.wrap {
            Some(options) => wrap(&reply, options),
            None => reply,
        };
        info!(file = %file_id, context = %generated, "File context generated");
        ctx.cache.put(fingerprint, generated.clone());
        generated
    }))
}

/// `true` when every text already has a cached translation. An empty list is
/// never considered cached.
pub fn all_cached<'a>(ctx: &RunContext, texts: impl IntoIterator<Item = &'a str>) -> bool {
    let settings = &ctx.settings.prompt;
    let mut any = false;
    for text in texts {
        any = true;
        let fingerprint = translation_fingerprint(
            text,
            &settings.source_lang,
            &settings.target_lang,
            &settings.domain,
            settings.extra_context.as_deref(),
        );
        if !ctx.cache.contains(&fingerprint) {
            return false;
        }
    }
    any
}

/// Calls the model until it answers or recovery gives up (`Ok(None)`).
async fn call_model(ctx: &RunContext, prompt: &str, label: &str) -> Result<Option<String>, Halt> {
    loop {
        ctx.pause.wait_if_paused(label).await;
        // Keys can be removed or blacklisted from the control plane.
        if ctx.keys.usable() == 0 {
            return Err(Halt::Fatal(AppError::KeysExhausted));
        }
        if ctx.take_skip_api() {
            info!(unit = %label, "Skipping the active API key on request");
            ctx.keys.rotate(RotationReason::User)?;
        }
        if ctx.skip_file_requested() {
            return Err(Halt::SkipFile);
        }

        let err = match ctx.gateway.call(prompt, ctx.call_context()).await {
            Ok(reply) => {
                ctx.keys.record_call();
                ctx.keys.reset_major_failures();
                return Ok(Some(reply));
            }
            Err(e) => e,
        };

        match err {
            AppError::Model(e) if e.is_authorization() => {
                error!(
                    unit = %label,
                    api_key.preview = %ctx.keys.active_preview(),
                    error = %e,
                    "API key rejected, blacklisting it"
                );
                match ctx.keys.blacklist_active()? {
                    KeyChange::Blacklisted { .. } => continue,
                    other => {
                        warn!(unit = %label, change = ?other, "Active key could not be blacklisted");
                        return Ok(None);
                    }
                }
            }
            AppError::Model(e) if e.is_transient() => {
                let failures = ctx.keys.record_major_failure();
                warn!(
                    unit = %label,
                    api_key.preview = %ctx.keys.active_preview(),
                    failures,
                    threshold = MAX_MAJOR_FAILURES,
                    error = %e,
                    "Model call failed after retries"
                );
                if ctx.settings.rotate_on_limit_or_error && ctx.keys.rotate(RotationReason::ApiError)? {
                    continue;
                }
                if failures >= MAX_MAJOR_FAILURES && ctx.keys.rotate(RotationReason::FailureThreshold)? {
                    continue;
                }
                debug!(unit = %label, "No rotation available, giving up on this unit");
                return Ok(None);
            }
            e if e.is_run_fatal() => return Err(Halt::Fatal(e)),
            e => {
                error!(unit = %label, error = %e, "Unhandled error during the model call");
                return Ok(None);
            }
        }
    }
}
