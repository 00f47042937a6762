//! Parses the external client message grammar (§6) into a [`ClientMessage`].
//!
//! The grammar is a loose union of object shapes keyed by which field is
//! present (`{"create_game": "..."}`, `{"mint_nft": "..."}`, ...) rather than
//! a single discriminant tag, plus a legacy colon-delimited string form kept
//! for backward compatibility with older clients. `types::ClientMessage`
//! itself uses a clean internally-tagged `#[serde(tag = "kind")]` shape
//! internally; this module is the adapter between that and the wire grammar.

use crate::error::{Error, Result};
use crate::types::{ClientMessage, GameId};
use serde_json::Value;

pub fn parse_client_message(value: &Value) -> Result<ClientMessage> {
    match value {
        Value::String(legacy) => parse_legacy_colon_form(legacy),
        Value::Object(map) => parse_object_form(map),
        other => Err(Error::InvalidMessage(format!(
            "expected a JSON object or legacy string, got {other}"
        ))),
    }
}

fn parse_object_form(map: &serde_json::Map<String, Value>) -> Result<ClientMessage> {
    if let Some(Value::String(t)) = map.get("type") {
        if t == "stat" {
            return Ok(ClientMessage::Stat);
        }
    }
    if let Some(prompt) = map.get("create_game") {
        return Ok(ClientMessage::CreateGame {
            prompt: as_str(prompt, "create_game")?.to_string(),
        });
    }
    if map.contains_key("list_games") {
        return Ok(ClientMessage::ListGames);
    }
    if let Some(game_id) = map.get("get_game_state") {
        return Ok(ClientMessage::GetGameState {
            game_id: GameId(as_str(game_id, "get_game_state")?.to_string()),
        });
    }
    if let Some(game_id) = map.get("mint_nft") {
        return Ok(ClientMessage::MintNft {
            game_id: GameId(as_str(game_id, "mint_nft")?.to_string()),
        });
    }
    if let (Some(game_id), Some(action)) = (map.get("game_id"), map.get("action")) {
        let continue_conversation = match map.get("continue_conversation") {
            Some(Value::String(s)) => s == "true",
            Some(Value::Bool(b)) => *b,
            _ => false,
        };
        return Ok(ClientMessage::PlayerAction {
            game_id: GameId(as_str(game_id, "game_id")?.to_string()),
            action: as_str(action, "action")?.to_string(),
            continue_conversation,
        });
    }
    if let (Some(game_id), Some(text)) = (map.get("query_game_id"), map.get("query")) {
        return Ok(ClientMessage::Query {
            game_id: GameId(as_str(game_id, "query_game_id")?.to_string()),
            text: as_str(text, "query")?.to_string(),
        });
    }

    Err(Error::InvalidMessage(format!(
        "unrecognised message shape: {}",
        Value::Object(map.clone())
    )))
}

/// Legacy `"<action>:<data>"` form, retained for older clients (§6).
fn parse_legacy_colon_form(raw: &str) -> Result<ClientMessage> {
    let (action, rest) = raw
        .split_once(':')
        .ok_or_else(|| Error::InvalidMessage(format!("malformed legacy message: {raw}")))?;

    match action {
        "stat" => Ok(ClientMessage::Stat),
        "create_game" => Ok(ClientMessage::CreateGame { prompt: rest.to_string() }),
        "list_games" => Ok(ClientMessage::ListGames),
        "get_game_state" => Ok(ClientMessage::GetGameState {
            game_id: GameId(rest.to_string()),
        }),
        "mint_nft" => Ok(ClientMessage::MintNft {
            game_id: GameId(rest.to_string()),
        }),
        "player_action" => {
            let mut parts = rest.splitn(3, ':');
            let game_id = parts
                .next()
                .ok_or_else(|| Error::InvalidMessage("player_action missing game_id".to_string()))?;
            let player_action = parts
                .next()
                .ok_or_else(|| Error::InvalidMessage("player_action missing action text".to_string()))?;
            let continue_conversation = parts.next() == Some("true");
            Ok(ClientMessage::PlayerAction {
                game_id: GameId(game_id.to_string()),
                action: player_action.to_string(),
                continue_conversation,
            })
        }
        other => Err(Error::InvalidMessage(format!("unrecognised legacy action: {other}"))),
    }
}

fn as_str<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::InvalidMessage(format!("field {field} must be a string")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_stat() {
        assert_eq!(parse_client_message(&json!({"type": "stat"})).unwrap(), ClientMessage::Stat);
    }

    #[test]
    fn parses_create_game() {
        let msg = parse_client_message(&json!({"create_game": "a cave"})).unwrap();
        assert_eq!(msg, ClientMessage::CreateGame { prompt: "a cave".to_string() });
    }

    #[test]
    fn parses_player_action_with_string_continue_flag() {
        let msg = parse_client_message(&json!({
            "game_id": "abc",
            "action": "go north",
            "continue_conversation": "true",
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::PlayerAction {
                game_id: GameId("abc".to_string()),
                action: "go north".to_string(),
                continue_conversation: true,
            }
        );
    }

    #[test]
    fn parses_mint_nft() {
        let msg = parse_client_message(&json!({"mint_nft": "abc"})).unwrap();
        assert_eq!(msg, ClientMessage::MintNft { game_id: GameId("abc".to_string()) });
    }

    #[test]
    fn parses_legacy_colon_form() {
        let msg = parse_client_message(&json!("create_game:a cave")).unwrap();
        assert_eq!(msg, ClientMessage::CreateGame { prompt: "a cave".to_string() });
    }

    #[test]
    fn parses_legacy_player_action() {
        let msg = parse_client_message(&json!("player_action:abc:go north:true")).unwrap();
        assert_eq!(
            msg,
            ClientMessage::PlayerAction {
                game_id: GameId("abc".to_string()),
                action: "go north".to_string(),
                continue_conversation: true,
            }
        );
    }

    #[test]
    fn rejects_unrecognised_shape() {
        assert!(parse_client_message(&json!({"nonsense": true})).is_err());
    }
}
