//! System prompt for reading a technical rider into a patch list.
//!
//! The prompt names every JSON key the normalizer reads. Terminology drift
//! ("Input List", "Channel List", "Stage Plot") is handled here, in natural
//! language, and nowhere else: [`crate::pipeline::normalize`] matches keys
//! exactly.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`].

/// Default system prompt for extracting a patch list from rider page images.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are an experienced live-sound engineer reading a band's technical rider. The pages of the rider are attached as images, in order.

Extract the following and answer with a single JSON object:

1. "main_artist" (string): the name of the headlining artist or band the rider belongs to.

2. "instruments_and_backlines" (array of strings): every instrument, amplifier and backline item the rider lists, one item per string.

3. "patch_list_table" (array of objects): the patch list, one object per console channel, in channel order. The table may be titled "Patch List", "Input List", "Channel List", "Inputs" or similar; treat these as the same thing. Each object has exactly these keys:
   - "channelNumber": the channel number as printed (number, or string if it contains letters)
   - "micOrDi": the microphone model or "DI"
   - "patchName": what the channel carries (e.g. "Kick In", "Snare Top", "Bass DI")
   - "commentsOrStand": stand type, phantom power or any other note for the channel; use "" when the rider gives none

RULES
- Use exactly the key names above.
- Do not invent channels that are not in the rider.
- If a value is not printed in the rider, use "" rather than omitting the key.
- Output ONLY the JSON object. No commentary, no explanations."#;

/// User-turn text accompanying the page images.
pub fn page_manifest(rendered_pages: usize, total_pages: usize) -> String {
    if rendered_pages < total_pages {
        format!(
            "Rider pages 1-{rendered_pages} of {total_pages} are attached. Extract the patch list."
        )
    } else {
        format!("All {total_pages} rider page(s) are attached. Extract the patch list.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::{MAIN_ARTIST, PATCH_LIST_TABLE};

    #[test]
    fn prompt_names_every_key_the_normalizer_reads() {
        for key in [
            MAIN_ARTIST,
            PATCH_LIST_TABLE,
            "instruments_and_backlines",
            "channelNumber",
            "micOrDi",
            "patchName",
            "commentsOrStand",
        ] {
            assert!(
                DEFAULT_EXTRACTION_PROMPT.contains(&format!("\"{key}\"")),
                "prompt does not mention {key}"
            );
        }
    }

    #[test]
    fn manifest_mentions_truncation() {
        assert!(page_manifest(8, 12).contains("1-8 of 12"));
        assert!(page_manifest(3, 3).starts_with("All 3"));
    }
}
