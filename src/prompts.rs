//! System prompts for the extraction and synthesis stages.
//!
//! Every prompt lives here so a wording change touches exactly one place and
//! unit tests can inspect the text without calling a model.
//!
//! Callers can override either prompt via
//! [`crate::config::BatchConfig::extraction_prompt`] and
//! [`crate::config::BatchConfig::synthesis_prompt`]; the constants here are
//! used only when no override is provided.

/// Marker the extraction stage puts where a highlighted or underlined word
/// was, so the card front can show a gap.
pub const BLANK_MARKER: &str = "{{BLANK}}";

/// Default system prompt for transcribing a photographed page of notes.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are an expert at digitising photographed study material.

TASK
Transcribe the question, its answer options, and every visual marking in the photo.

RULES
1. STRUCTURE
   - When you meet a table, rewrite it as a clear text list; never merge columns together.
   - Keep the original reading order and numbering of questions and options.
2. MARKINGS
   - Find yellow highlights, red boxes, and underlines. Replace the marked words with {{BLANK}}.
3. CLEAN OUTPUT
   - Output ONLY the transcribed text.
   - Do NOT describe the photo ("This image shows ...").
   - Do NOT wrap the output in Markdown code fences."#;

/// Default system prompt for turning a transcript into one flashcard.
pub const DEFAULT_SYNTHESIS_PROMPT: &str = r#"You are an expert at writing Anki flashcards.

TASK
Turn the transcribed question below into a single question/answer pair suitable for Anki import.

RULES
1. FRONT: the full question text plus all options. Keep every {{BLANK}} marker.
2. BACK: the correct option and the core answer text only. No long explanations, background, or step-by-step teaching.
3. FORMATTING: use Markdown bold for key terms. Leave a blank line between paragraphs.

OUTPUT
Respond with a single JSON object and nothing else. No Markdown code fence around it.
{
  "front": "question text ...",
  "back": "correct answer ..."
}"#;

/// User-turn text accompanying the photo in the extraction request.
pub const EXTRACTION_USER_TEXT: &str = "Transcribe this photo.";
