//! Game State Store (C5).
//!
//! Two plain-UTF-8 text files per game: `world_<id>.txt` (static, written
//! once at creation) and `state_<id>.txt` (dynamic, rewritten on every
//! accepted transition). Modeled on the data-dir-rooted persistence helpers
//! used elsewhere in this codebase (`PersistenceManager`): every method takes
//! a `GameId`, resolves it to a path under the configured data directory, and
//! returns a `Result` rather than panicking on I/O failure.

use crate::error::{Error, Result};
use crate::types::GameId;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Headers that classify a line of daemon output as belonging to the World
/// (static lore/rules) half of a `create_game` response.
const WORLD_HEADERS: &[&str] = &[
    "Game Title:",
    "World Description:",
    "World Lore:",
    "Objectives:",
    "Win Conditions:",
    "Game Rules:",
];

/// Headers that classify a line as belonging to the State (dynamic) half.
const STATE_HEADERS: &[&str] = &["Current Situation:", "Location:", "Starting Status:"];

/// Keyword heuristics used when a line carries neither header: content
/// mentioning inventory/health/score reads as dynamic State, everything else
/// as static World. This is a known fragility (see design notes §9) — a model
/// output that doesn't use these words could land in the wrong file.
const STATE_KEYWORDS: &[&str] = &["you have", "inventory", "health", "score"];

const DEFAULT_STATE: &str = "Current Situation: You find yourself at the start of your journey.\n";

pub struct GameStateStore {
    data_dir: PathBuf,
}

impl GameStateStore {
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).await?;
        Ok(Self { data_dir })
    }

    fn world_path(&self, id: &GameId) -> PathBuf {
        self.data_dir.join(format!("game_world_{}.txt", id.0))
    }

    fn state_path(&self, id: &GameId) -> PathBuf {
        self.data_dir.join(format!("game_state_{}.txt", id.0))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Partition a daemon's free-form `create_game` narrative into its World
    /// and State halves and persist both. Always writes a non-empty State,
    /// synthesizing a default if the narrative carried none.
    pub async fn create_game(&self, id: &GameId, narrative: &str) -> Result<()> {
        let (world, state) = partition_narrative(narrative);
        fs::write(self.world_path(id), world).await?;
        fs::write(self.state_path(id), state).await?;
        Ok(())
    }

    pub async fn load_world(&self, id: &GameId) -> Result<String> {
        fs::read_to_string(self.world_path(id))
            .await
            .map_err(|e| Error::GameNotFound(format!("{id}: world read failed: {e}")))
    }

    pub async fn load_state(&self, id: &GameId) -> Result<String> {
        fs::read_to_string(self.state_path(id))
            .await
            .map_err(|e| Error::GameNotFound(format!("{id}: state read failed: {e}")))
    }

    /// Overwrite the State file. Used both for tentative writes of a proposed
    /// transition and for the revert-to-`old_text` path when the jury
    /// resolves a transition invalid.
    pub async fn save_state(&self, id: &GameId, text: &str) -> Result<()> {
        fs::write(self.state_path(id), text)
            .await
            .map_err(|e| Error::Storage(format!("save_state({id}) failed: {e}")))
    }

    pub async fn game_exists(&self, id: &GameId) -> bool {
        fs::metadata(self.world_path(id)).await.is_ok()
    }

    /// Enumerate all GameIds by scanning for `game_world_*.txt` files.
    pub async fn list_games(&self) -> Result<Vec<GameId>> {
        let mut games = Vec::new();
        let mut entries = fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name
                .strip_prefix("game_world_")
                .and_then(|r| r.strip_suffix(".txt"))
            {
                games.push(GameId(rest.to_string()));
            }
        }
        games.sort();
        Ok(games)
    }
}

fn partition_narrative(narrative: &str) -> (String, String) {
    let mut world = String::new();
    let mut state = String::new();

    for line in narrative.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if WORLD_HEADERS.iter().any(|h| trimmed.starts_with(h)) {
            world.push_str(line);
            world.push('\n');
        } else if STATE_HEADERS.iter().any(|h| trimmed.starts_with(h)) {
            state.push_str(line);
            state.push('\n');
        } else {
            let lower = trimmed.to_ascii_lowercase();
            if STATE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                state.push_str(line);
                state.push('\n');
            } else {
                world.push_str(line);
                world.push('\n');
            }
        }
    }

    if state.trim().is_empty() {
        state.push_str(DEFAULT_STATE);
    }

    (world, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partition_routes_headers_correctly() {
        let narrative = "Game Title: Cave Survival\nWorld Lore: ancient caverns\nCurrent Situation: you stand at the entrance\nYou have a torch and some rope.\n";
        let (world, state) = partition_narrative(narrative);
        assert!(world.contains("Game Title"));
        assert!(world.contains("World Lore"));
        assert!(state.contains("Current Situation"));
        assert!(state.contains("You have a torch"));
        assert!(!world.contains("Current Situation"));
    }

    #[test]
    fn partition_synthesizes_default_state_when_absent() {
        let narrative = "Game Title: Empty\nWorld Lore: nothing dynamic here\n";
        let (_world, state) = partition_narrative(narrative);
        assert_eq!(state, DEFAULT_STATE);
    }

    #[tokio::test]
    async fn create_game_and_round_trip_state() {
        let dir = tempdir().unwrap();
        let store = GameStateStore::new(dir.path()).await.unwrap();
        let id = GameId("abc123".to_string());

        let narrative = "Game Title: Test\nCurrent Situation: start\n";
        store.create_game(&id, narrative).await.unwrap();

        assert!(store.game_exists(&id).await);
        let world = store.load_world(&id).await.unwrap();
        assert!(world.contains("Game Title"));
        let state = store.load_state(&id).await.unwrap();
        assert!(state.contains("Current Situation"));

        store.save_state(&id, "Current Situation: moved on\n").await.unwrap();
        let state = store.load_state(&id).await.unwrap();
        assert!(state.contains("moved on"));
    }

    #[tokio::test]
    async fn list_games_enumerates_world_files() {
        let dir = tempdir().unwrap();
        let store = GameStateStore::new(dir.path()).await.unwrap();
        store
            .create_game(&GameId("one".into()), "Game Title: One\nCurrent Situation: s\n")
            .await
            .unwrap();
        store
            .create_game(&GameId("two".into()), "Game Title: Two\nCurrent Situation: s\n")
            .await
            .unwrap();

        let mut games: Vec<String> = store.list_games().await.unwrap().into_iter().map(|g| g.0).collect();
        games.sort();
        assert_eq!(games, vec!["one".to_string(), "two".to_string()]);
    }
}
