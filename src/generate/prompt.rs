//! Prompt assembly for the generation and revision turns.

use std::fmt::Write as _;

use super::colors::ColorGuidance;
use super::parser::{WRAPPER_CLOSE, WRAPPER_OPEN};
use super::types::{FileSet, GenerationContext, ImageRef};
use crate::error::truncate_chars;
use crate::ports::llm::{ChatMessage, ContentPart};

/// User turn appended after a truncated assistant turn.
pub const CONTINUE_DIRECTIVE: &str = "Continue exactly from where you left off. Do not repeat \
     text you already wrote and do not restart the artifact. If you stopped inside an action, \
     resume its body mid-line. Close every open action and finish with </artifact>.";

/// Extensions worth showing the model during revision.
const ESSENTIAL_EXTENSIONS: &[&str] = &[
    "tsx", "ts", "jsx", "js", "mjs", "css", "scss", "html", "vue", "svelte",
];

/// File stems treated as entry points and listed first.
const ENTRY_STEMS: &[&str] = &["page", "layout", "index", "app", "main", "globals"];

/// Marker appended to a file cut short in the revision prompt.
const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Size limits applied while building prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    /// Images attached per prompt.
    pub max_images: usize,
    /// Characters of sanitized markup quoted.
    pub markup_sample_chars: usize,
    /// Files serialized into the revision prompt.
    pub max_essential_files: usize,
    /// Characters kept per serialized file.
    pub essential_file_chars: usize,
}

/// System message describing the output contract.
#[must_use]
pub fn system_instructions() -> String {
    let mut out = String::from(
        "You are a senior front-end engineer. You rebuild websites as complete, runnable \
         Next.js projects using React, TypeScript and Tailwind CSS.\n\n",
    );
    let _ = writeln!(out, "Reply with exactly one artifact and nothing else:");
    let _ = writeln!(out, "{WRAPPER_OPEN} id=\"site\" title=\"Generated site\">");
    let _ = writeln!(out, "<action type=\"file\" path=\"app/page.tsx\">");
    let _ = writeln!(out, "...full file content...");
    let _ = writeln!(out, "</action>");
    let _ = writeln!(out, "{WRAPPER_CLOSE}\n");
    let _ = writeln!(out, "Rules:");
    let _ = writeln!(
        out,
        "- One <action type=\"file\"> per file, always with the complete content."
    );
    let _ = writeln!(out, "- Paths are relative to the project root.");
    let _ = writeln!(
        out,
        "- Include package.json, app/layout.tsx, app/page.tsx and app/globals.css."
    );
    let _ = writeln!(out, "- Do not wrap files in markdown fences.");
    let _ = write!(
        out,
        "- Close the artifact with {WRAPPER_CLOSE} once every file is written."
    );
    out
}

/// System message for the revision pass, which may also emit diffs.
#[must_use]
pub fn revision_instructions() -> String {
    let mut out = system_instructions();
    out.push_str("\n\nYou are now revising an existing project. Prefer small edits:\n");
    let _ = writeln!(out, "<action type=\"diff\" path=\"app/page.tsx\">");
    let _ = writeln!(out, "<old>exact text currently in the file</old>");
    let _ = writeln!(out, "<new>replacement text</new>");
    let _ = writeln!(out, "</action>");
    let _ = writeln!(
        out,
        "The <old> text must appear verbatim in the file. Only the first match is replaced."
    );
    let _ = write!(
        out,
        "Use a full file action when a file needs to be rewritten or created."
    );
    out
}

/// Builds the initial generation conversation.
#[must_use]
pub fn initial_messages(
    ctx: &GenerationContext,
    markup: &str,
    guidance: &ColorGuidance,
    limits: &PromptLimits,
) -> Vec<ChatMessage> {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "Recreate the website at {} as a new project.",
        ctx.site_url
    );
    if let Some(intent) = ctx.user_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        let _ = writeln!(text, "\nThe user asked for: {}", intent.trim());
    }
    push_guidance(&mut text, guidance);

    let sample = truncate_chars(markup, limits.markup_sample_chars);
    if !sample.is_empty() {
        let _ = writeln!(text, "\nCaptured markup (sanitized, possibly truncated):");
        let _ = writeln!(text, "```html\n{sample}\n```");
    }
    push_image_note(&mut text, &ctx.images, limits.max_images);

    vec![
        ChatMessage::system(system_instructions()),
        user_turn(text, &ctx.images, limits.max_images),
    ]
}

/// Builds the revision conversation around the current files.
#[must_use]
pub fn revision_messages(
    ctx: &GenerationContext,
    files: &FileSet,
    guidance: &ColorGuidance,
    limits: &PromptLimits,
) -> Vec<ChatMessage> {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "Compare the project below with the reference screenshots of {} and fix every visual \
         difference: layout, spacing, typography, colors and missing sections.",
        ctx.site_url
    );
    if let Some(intent) = ctx.user_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        let _ = writeln!(
            text,
            "Keep honoring the original request: {}",
            intent.trim()
        );
    }
    push_guidance(&mut text, guidance);

    let _ = writeln!(text, "\nCurrent project files:");
    for (path, content) in essential_files(
        files,
        limits.max_essential_files,
        limits.essential_file_chars,
    ) {
        let _ = writeln!(text, "\n--- {path} ---\n{content}");
    }
    push_image_note(&mut text, &ctx.images, limits.max_images);

    vec![
        ChatMessage::system(revision_instructions()),
        user_turn(text, &ctx.images, limits.max_images),
    ]
}

/// Picks the files shown during revision, entry points first, each cut to
/// `max_chars` characters.
#[must_use]
pub fn essential_files(
    files: &FileSet,
    max_files: usize,
    max_chars: usize,
) -> Vec<(String, String)> {
    let mut picked: Vec<_> = files.iter().filter(|f| is_essential(&f.path)).collect();
    picked.sort_by_key(|f| !is_entry_point(&f.path));
    picked
        .into_iter()
        .take(max_files)
        .map(|f| {
            let mut content = truncate_chars(&f.content, max_chars);
            if content.len() < f.content.len() {
                content.push_str(TRUNCATION_MARKER);
            }
            (f.path.clone(), content)
        })
        .collect()
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    name.rsplit_once('.').map(|(_, ext)| ext)
}

fn is_essential(path: &str) -> bool {
    extension(path).is_some_and(|ext| {
        ESSENTIAL_EXTENSIONS
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    })
}

fn is_entry_point(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = name.split('.').next().unwrap_or(name);
    ENTRY_STEMS.iter().any(|s| s.eq_ignore_ascii_case(stem))
}

fn push_guidance(text: &mut String, guidance: &ColorGuidance) {
    let summary = guidance.summary();
    if !summary.is_empty() {
        let _ = write!(text, "\nColor guidance from the screenshots:\n{summary}");
    }
}

fn push_image_note(text: &mut String, images: &[ImageRef], max_images: usize) {
    let attached = images.len().min(max_images);
    if attached > 0 {
        let _ = writeln!(
            text,
            "\n{attached} reference screenshot(s) are attached, top of page first."
        );
    }
}

fn user_turn(text: String, images: &[ImageRef], max_images: usize) -> ChatMessage {
    let mut parts = vec![ContentPart::text(text)];
    parts.extend(
        images
            .iter()
            .take(max_images)
            .map(|image| ContentPart::image(image.url.clone())),
    );
    ChatMessage::user_parts(parts)
}
