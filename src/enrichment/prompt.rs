use crate::chunking::types::truncate_chars;

/// Situating-note prompt for one chunk.
///
/// `document_preview` is already bounded by the caller; the chunk is cut to
/// `chunk_chars` characters.
pub fn context_prompt(document_preview: &str, chunk: &str, chunk_chars: usize) -> String {
    format!(
        "Given the document below, provide a brief context (1-2 sentences) explaining what \
         this chunk discusses within the broader document.\n\n\
         DOCUMENT: {}\n\n\
         CHUNK: {}\n\n\
         Context:",
        document_preview,
        truncate_chars(chunk, chunk_chars)
    )
}
