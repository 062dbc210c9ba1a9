use super::types::RetrievalResult;

/// Header of the retrieved-facts section inside a context block.
pub const FACTS_HEADER: &str = "### 📚 Relevant Medical Information";

/// Header of the model-facing instructions appended after the facts.
pub const INSTRUCTIONS_HEADER: &str = "### ⚠️ Critical Instructions";

/// Appended once when a context block has been shortened.
pub const TRUNCATION_MARKER: &str = "[Context truncated]";

/// Render retrieved chunks as a context block for the system prompt.
///
/// Empty input yields an empty string so the prompt builder can append the
/// result unconditionally.
pub fn format_retrieved_docs(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let sections: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            format!(
                "[Reference {}] (Source: {}, Type: {}, Relevance: {:.1}%)\n{}",
                index + 1,
                result.chunk.metadata.source,
                result.chunk.metadata.document_type,
                result.similarity * 100.0,
                result.chunk.content,
            )
        })
        .collect();

    format!(
        "\n\n{FACTS_HEADER}\n\
         The following information has been retrieved from medical knowledge bases to help \
         answer the user's question. Use this information as the PRIMARY source for your \
         response. If the information doesn't directly address the question, you may \
         supplement with your general knowledge, but always prioritize the retrieved \
         information.\n\n\
         {}\n\n\
         {INSTRUCTIONS_HEADER}\n\
         - **Base your response primarily on the retrieved information above**\n\
         - If the retrieved information doesn't fully answer the question, acknowledge this \
         and provide what you can from the retrieved context\n\
         - **DO NOT make up or hallucinate information** that isn't in the retrieved context \
         or your verified medical knowledge\n\
         - If you're uncertain, say so clearly\n\
         - Always cite that information comes from medical knowledge bases when using \
         retrieved context\n\
         - Maintain empathy and clarity in your communication",
        sections.join("\n\n"),
    )
}

/// Shrinks context blocks to a character budget without breaking structure.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudgeter {
    max_len: usize,
}

impl ContextBudgeter {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn compact(&self, context: &str) -> String {
        compact(context, self.max_len)
    }
}

impl Default for ContextBudgeter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONTEXT_BUDGET)
    }
}

/// Joiner newlines added around the truncation marker.
const COMPACT_SLACK: usize = 4;

/// Fit `context` into `max_len` characters.
///
/// Text within budget passes through unchanged, as does already-compacted
/// output (marker present and within the output bound), which makes the
/// operation idempotent. Text that merely quotes the marker but exceeds the
/// bound is still truncated. Otherwise the instructions section is
/// preserved intact and only the facts portion is truncated, at a char
/// boundary. Output length never exceeds
/// `max_len + marker + COMPACT_SLACK` characters.
pub fn compact(context: &str, max_len: usize) -> String {
    let len = context.chars().count();
    if len <= max_len {
        return context.to_string();
    }
    let bound = max_len + TRUNCATION_MARKER.chars().count() + COMPACT_SLACK;
    if len <= bound && context.contains(TRUNCATION_MARKER) {
        return context.to_string();
    }

    if let Some(pos) = context.find(INSTRUCTIONS_HEADER) {
        let instructions = &context[pos..];
        let instructions_len = instructions.chars().count();
        if instructions_len < max_len {
            let facts_budget = max_len - instructions_len;
            let facts = truncate_at_char_boundary(&context[..pos], facts_budget);
            tracing::debug!(
                original = context.chars().count(),
                budget = max_len,
                "context compacted, instructions preserved"
            );
            return format!("{}\n\n{TRUNCATION_MARKER}\n\n{instructions}", facts.trim_end());
        }
    }

    // No instructions section to protect, or it alone blows the budget.
    format!(
        "{}\n\n{TRUNCATION_MARKER}",
        truncate_at_char_boundary(context, max_len).trim_end()
    )
}

fn truncate_at_char_boundary(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &s[..byte_index],
        None => s,
    }
}
