//! Prompt builders for the story generation pipeline.

use super::outline::OutlineDraft;
use super::types::TOTAL_SEGMENTS;

/// Phase 1: the outline request. The schema here is the contract the
/// validator and unlock engine depend on: 10 segments, one keyword each
/// for 0-6, two each for 7-9, all lowercase common words of 4-8 letters.
pub fn outline_prompt(identity: &str) -> String {
    format!(
        r#"You are writing an interactive story for a small creature that unlocks narrative by eating and speaking words.

The creature describes itself as: "{identity}"

Write a {TOTAL_SEGMENTS}-segment story shaped as a four-act arc:
- Segments 0-2: discovery (something strange is found)
- Segments 3-5: rising tension (the strangeness has a cost)
- Segments 6-7: twist (what was assumed is wrong)
- Segments 8-9: resolution (a changed understanding)

Respond with ONLY a JSON object, no other text:
{{
  "title": "evocative story title",
  "tagline": "one-sentence teaser",
  "setting": "one-sentence description of where this happens",
  "segments": [
    {{"keywords": ["word"], "hint": "short locked teaser", "narrative": "2-4 sentence segment text"}}
  ]
}}

Hard rules for keywords:
- Exactly {TOTAL_SEGMENTS} segments.
- Segments 1-7 (the first seven) have exactly ONE keyword; segments 8-10 (the last three) have exactly TWO. 13 keywords total.
- Every keyword is a common lowercase noun or adjective of 4-8 letters. No proper nouns, no plurals of the same word twice, no duplicates.
- Each segment's narrative should make its keywords feel earned."#
    )
}

/// Phase 2: journal-style background passages that must carry every
/// outline keyword at least twice across the collection.
pub fn background_prompt(outline: &OutlineDraft) -> String {
    let keywords = outline.all_keywords().join(", ");
    format!(
        r#"You are ghost-writing fragments of a found journal for a story titled "{title}", set in {setting}.

Write at least 20 short journal-style passages (1-3 sentences each). Weave each of these words into AT LEAST TWO different passages, as naturally as possible: {keywords}

Respond with ONLY a JSON array of strings, no other text:
["passage one...", "passage two...", ...]"#,
        title = outline.title,
        setting = outline.setting,
    )
}

/// Phase 3: ambient stream fragments. Tone shifts across the list; no
/// keyword obligation.
pub fn stream_prompt(outline: &OutlineDraft) -> String {
    format!(
        r#"For a story titled "{title}", set in {setting}, write 15 very short overheard fragments (one sentence each), as if picked up from a distant radio.

Tone: the first five are mundane, the middle five are quietly mysterious, the final five are openly surreal.

Respond with ONLY a JSON array of 15 strings, no other text."#,
        title = outline.title,
        setting = outline.setting,
    )
}
