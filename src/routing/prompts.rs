//! Instruction text paired with each format family.

pub const PDF_PROMPT: &str = "Convert the following PDF page to markdown. Return only the markdown with no explanation text. Do not exclude any content from the page.";

pub const IMAGE_PROMPT: &str = "Analyze this image in detail, including any visible text, objects, and EXIF metadata if available. Extract text and nothing more.";

pub const AUDIO_PROMPT: &str = "Transcribe this audio content and include any available metadata. Provide a detailed transcript of the speech.";

pub const EXCEL_PROMPT: &str = "Extract and structure the data from this Excel file, maintaining table formats where possible.";

pub const TEXT_PROMPT: &str = "Parse and structure this content, maintaining its original format while making it readable.";

pub const HTML_PROMPT: &str = "Extract the main content from this HTML, preserving important structure but removing unnecessary markup.";

pub const DEFAULT_PROMPT: &str =
    "Convert this document to markdown format, preserving structure and content.";

/// Prompt for a format id. Unknown ids get [`DEFAULT_PROMPT`].
pub fn prompt_for(format_id: &str) -> &'static str {
    match format_id {
        "pdf" => PDF_PROMPT,
        "image" => IMAGE_PROMPT,
        "audio" => AUDIO_PROMPT,
        "excel" => EXCEL_PROMPT,
        "text" => TEXT_PROMPT,
        "html" => HTML_PROMPT,
        _ => DEFAULT_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::formats::FORMAT_RULES;
    use std::collections::HashSet;

    #[test]
    fn total_over_known_and_unknown_ids() {
        for id in FORMAT_RULES.iter().map(|r| r.id).chain(["", "video", "PDF"]) {
            assert!(!prompt_for(id).is_empty(), "empty prompt for {id:?}");
        }
    }

    #[test]
    fn specialised_families_have_distinct_wording() {
        let prompts: HashSet<_> = ["pdf", "image", "audio", "excel", "text", "html"]
            .into_iter()
            .map(prompt_for)
            .collect();
        assert_eq!(prompts.len(), 6);
        assert!(!prompts.contains(DEFAULT_PROMPT));
    }

    #[test]
    fn office_documents_use_the_generic_prompt() {
        assert_eq!(prompt_for("word"), DEFAULT_PROMPT);
        assert_eq!(prompt_for("powerpoint"), DEFAULT_PROMPT);
    }
}
