//! Fixed policy for bot seats.
//!
//! Bots take every win, call pon and open kan, never chii, never riichi and
//! never declare a concealed or added kan. They abort on nine terminals and
//! otherwise discard the tile they just drew.

use super::action::{ActionChoice, AvailableAction};
use super::claim::Eligibility;
use super::player::PlayerState;
use super::tile::Tile;

/// Pick a bot's action on its own turn.
pub fn turn_choice(player: &PlayerState, actions: &[AvailableAction]) -> ActionChoice {
    if actions.iter().any(|a| matches!(a, AvailableAction::Tsumo)) {
        return ActionChoice::Tsumo;
    }
    if actions
        .iter()
        .any(|a| matches!(a, AvailableAction::KyuushuKyuuhai))
    {
        return ActionChoice::KyuushuKyuuhai;
    }
    match default_discard(player).or(player.drawn()) {
        Some(tile) => ActionChoice::Discard(tile),
        None => ActionChoice::Pass,
    }
}

/// Pick a bot's answer to a claim window.
pub fn claim_choice(eligibility: &Eligibility) -> ActionChoice {
    if eligibility.ron {
        ActionChoice::Ron
    } else if eligibility.minkan {
        ActionChoice::Minkan
    } else if eligibility.pon {
        ActionChoice::Pon
    } else {
        ActionChoice::Pass
    }
}

/// Tile discarded for bots and for seats that let their turn time out.
///
/// The drawn tile if legal, otherwise the right-most legal tile in hand.
/// `None` when nothing in hand may be discarded.
pub fn default_discard(player: &PlayerState) -> Option<Tile> {
    if let Some(drawn) = player.drawn() {
        if player.can_discard(drawn) {
            return Some(drawn);
        }
    }
    player
        .hand()
        .iter()
        .rev()
        .copied()
        .find(|&t| player.can_discard(t))
}
