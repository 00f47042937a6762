//! The marker-delimited state block the inference daemon emits for
//! `create_game`/`player_action`, and the validation §8 requires before a
//! transition is allowed to resolve VALID.

const BEGIN_MARKER: &str = "<<BEGIN_PLAYER_STATE>>";
const END_MARKER: &str = "<<END_PLAYER_STATE>>";

/// The six header lines a committed state transition must carry.
const REQUIRED_HEADERS: &[&str] = &[
    "Player_Location",
    "Player_Health",
    "Player_Score",
    "Player_Inventory",
    "Game_Status",
    "Turn_Count",
];

/// Extract the state block from raw daemon output: the LAST `BEGIN` marker,
/// paired with the first `END` marker found after it, trimmed.
pub fn extract_state_block(raw: &str) -> Option<String> {
    let begin_at = raw.rfind(BEGIN_MARKER)?;
    let after_begin = &raw[begin_at + BEGIN_MARKER.len()..];
    let end_at = after_begin.find(END_MARKER)?;
    Some(after_begin[..end_at].trim().to_string())
}

/// Substring heuristics that mark daemon output as an inference failure
/// rather than a candidate transition (§4.7 step 2, §7).
pub fn looks_like_error(raw: &str) -> bool {
    if raw.trim().is_empty() {
        return true;
    }
    let lower = raw.to_ascii_lowercase();
    ["error:", "failed", "invalid"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// A state block is well-formed only if it carries all six required headers.
/// Per §8, a block missing any of them must be treated as INVALID
/// retroactively even if the jury would otherwise have approved it.
pub fn has_all_required_headers(block: &str) -> bool {
    REQUIRED_HEADERS
        .iter()
        .all(|header| block.lines().any(|line| line.trim_start().starts_with(header)))
}

/// Pull a single `Key: value` field out of a state block.
pub fn field(block: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}:");
    block.lines().find_map(|line| {
        let trimmed = line.trim_start();
        trimmed.strip_prefix(&prefix).map(|v| v.trim().to_string())
    })
}

/// Read `Game_Status` off a state block, if present.
pub fn game_status(block: &str) -> Option<crate::types::GameStatus> {
    field(block, "Game_Status").and_then(|v| crate::types::GameStatus::parse(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> String {
        "Player_Location: tunnel\nPlayer_Health: 80\nPlayer_Score: 10\nPlayer_Inventory: [\"rope\"]\nGame_Status: active\nMessages: [\"You proceed deeper.\"]\nTurn_Count: 2".to_string()
    }

    #[test]
    fn extracts_last_begin_first_end_after_it() {
        let raw = format!(
            "noise {b} stale {e} more noise {b} Player_Location: tunnel\nGame_Status: active\n{e} trailing",
            b = BEGIN_MARKER,
            e = END_MARKER
        );
        let extracted = extract_state_block(&raw).unwrap();
        assert!(extracted.contains("Player_Location: tunnel"));
        assert!(!extracted.contains("stale"));
    }

    #[test]
    fn missing_markers_returns_none() {
        assert!(extract_state_block("just plain text").is_none());
    }

    #[test]
    fn well_formed_block_has_all_headers() {
        assert!(has_all_required_headers(&sample_block()));
    }

    #[test]
    fn block_missing_a_header_is_rejected() {
        let partial = "Player_Location: tunnel\nPlayer_Health: 80\n";
        assert!(!has_all_required_headers(partial));
    }

    #[test]
    fn error_heuristics_catch_common_failure_substrings() {
        assert!(looks_like_error(""));
        assert!(looks_like_error("Error: model overloaded"));
        assert!(looks_like_error("generation failed unexpectedly"));
        assert!(!looks_like_error(&sample_block()));
    }

    #[test]
    fn game_status_parses_from_block() {
        assert_eq!(game_status(&sample_block()), Some(crate::types::GameStatus::Active));
    }
}
