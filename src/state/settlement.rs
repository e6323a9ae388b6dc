//! Round results and point settlement.
//!
//! The engine reports a [`RoundResult`]; [`settle`] turns it into per-seat
//! point deltas. Presentation values ([`ScoreSettlement`],
//! [`YakuSettlement`]) are built from the same data for the host to show.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::meld::Meld;
use super::round::RoundCounter;
use super::rule::{RuleSet, RIICHI_DEPOSIT};
use super::scoring::{ScoringResult, Yaku};
use super::tile::Tile;

/// Noten penalty split between tenpai and noten seats.
pub const NOTEN_PENALTY: i32 = 3000;

/// Honba bonus on a ron, paid by the discarder.
pub const HONBA_RON: i32 = 300;

/// Honba bonus per payer on a tsumo.
pub const HONBA_TSUMO: i32 = 100;

/// Nagashi mangan value for a non-dealer.
pub const MANGAN: i32 = 8000;

/// Ways an exhaustive or abortive draw happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawKind {
    /// Live wall exhausted.
    Normal,
    /// Nine distinct terminals and honors on the first draw.
    KyuushuKyuuhai,
    /// Same wind discarded by all four seats in the first go-around.
    SuufonRenda,
    /// Fourth riichi accepted.
    SuuchaRiichi,
    /// Fourth kan by more than one seat.
    SuuKaikan,
}

impl DrawKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::KyuushuKyuuhai => "kyuushu_kyuuhai",
            Self::SuufonRenda => "suufon_renda",
            Self::SuuchaRiichi => "suucha_riichi",
            Self::SuuKaikan => "suu_kaikan",
        }
    }

    pub fn is_abortive(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum RoundEndReason {
    Tsumo,
    Ron,
    ExhaustiveDraw(DrawKind),
}

impl RoundEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tsumo => "tsumo",
            Self::Ron => "ron",
            Self::ExhaustiveDraw(kind) => kind.as_str(),
        }
    }
}

/// One winning hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinRecord {
    pub seat: usize,
    /// Discarder for ron, `None` for tsumo.
    pub from: Option<usize>,
    pub tile: Tile,
    pub hand: Vec<Tile>,
    pub melds: Vec<Meld>,
    pub riichi: bool,
    pub dora_indicators: Vec<Tile>,
    pub ura_indicators: Vec<Tile>,
    pub result: ScoringResult,
}

/// Everything the engine knows when a round ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_id: u64,
    pub counter: RoundCounter,
    pub reason: RoundEndReason,
    /// Winners, nearest downstream of the discarder first.
    pub wins: Vec<WinRecord>,
    pub tenpai: [bool; 4],
    /// Seats qualifying for nagashi mangan on a normal draw.
    pub nagashi: Vec<usize>,
    /// Seats whose riichi was accepted this round.
    pub riichi_paid: [bool; 4],
    /// Riichi sticks on the table at the end, carried ones included.
    pub deposits: u32,
    pub uuids: [String; 4],
}

impl RoundResult {
    pub fn dealer(&self) -> usize {
        self.counter.dealer()
    }

    /// Dealer keeps the seat: dealer won, dealer tenpai on a draw, or abort.
    pub fn dealer_repeats(&self) -> bool {
        let dealer = self.dealer();
        match self.reason {
            RoundEndReason::Tsumo | RoundEndReason::Ron => {
                self.wins.iter().any(|w| w.seat == dealer)
            }
            RoundEndReason::ExhaustiveDraw(DrawKind::Normal) => self.tenpai[dealer],
            RoundEndReason::ExhaustiveDraw(_) => true,
        }
    }
}

/// Ledger entry for one finished round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub round_id: u64,
    pub counter: RoundCounter,
    pub reason: RoundEndReason,
    pub deltas: [i32; 4],
    /// Riichi sticks left on the table for the next round.
    pub deposits_left: u32,
    pub dealer_repeats: bool,
    pub winners: Vec<usize>,
    pub tenpai: [bool; 4],
    pub yaku: Vec<YakuSettlement>,
}

fn round_up_100(points: i32) -> i32 {
    (points + 99) / 100 * 100
}

/// Compute point movements for a finished round.
pub fn settle(result: &RoundResult, rule: &RuleSet) -> Settlement {
    let mut deltas = [0i32; 4];
    let honba = result.counter.honba as i32;
    let dealer = result.dealer();

    for (seat, paid) in result.riichi_paid.iter().enumerate() {
        if *paid {
            deltas[seat] -= RIICHI_DEPOSIT;
        }
    }

    let mut deposits_left = result.deposits;
    let mut yaku = Vec::new();

    match result.reason {
        RoundEndReason::Tsumo => {
            if let Some(win) = result.wins.first() {
                pay_tsumo(&mut deltas, win.seat, dealer, win.result.score, honba);
                deltas[win.seat] += deposits_left as i32 * RIICHI_DEPOSIT;
                deposits_left = 0;
                yaku.push(YakuSettlement::from_win(win, &result.uuids));
            }
        }
        RoundEndReason::Ron => {
            for (i, win) in result.wins.iter().enumerate() {
                let Some(from) = win.from else {
                    continue;
                };
                // Honba and the pool go to the head winner only.
                let bonus = if i == 0 { honba * HONBA_RON } else { 0 };
                let payment = win.result.score + bonus;
                deltas[from] -= payment;
                deltas[win.seat] += payment;
                if i == 0 {
                    deltas[win.seat] += deposits_left as i32 * RIICHI_DEPOSIT;
                }
                yaku.push(YakuSettlement::from_win(win, &result.uuids));
            }
            if !result.wins.is_empty() {
                deposits_left = 0;
            }
        }
        RoundEndReason::ExhaustiveDraw(DrawKind::Normal) => {
            if rule.nagashi_mangan && !result.nagashi.is_empty() {
                for &seat in &result.nagashi {
                    let value = if seat == dealer { MANGAN * 3 / 2 } else { MANGAN };
                    pay_tsumo(&mut deltas, seat, dealer, value, 0);
                    yaku.push(YakuSettlement::nagashi(seat, &result.uuids, value));
                }
            } else {
                pay_noten(&mut deltas, &result.tenpai);
            }
        }
        RoundEndReason::ExhaustiveDraw(_) => {}
    }

    Settlement {
        round_id: result.round_id,
        counter: result.counter,
        reason: result.reason,
        deltas,
        deposits_left,
        dealer_repeats: result.dealer_repeats(),
        winners: result.wins.iter().map(|w| w.seat).collect(),
        tenpai: result.tenpai,
        yaku,
    }
}

fn pay_tsumo(deltas: &mut [i32; 4], winner: usize, dealer: usize, score: i32, honba: i32) {
    for payer in (0..4).filter(|&s| s != winner) {
        let share = if winner == dealer {
            round_up_100(score / 3 + i32::from(score % 3 != 0))
        } else if payer == dealer {
            round_up_100(score / 2 + i32::from(score % 2 != 0))
        } else {
            round_up_100(score / 4 + i32::from(score % 4 != 0))
        };
        let amount = share + honba * HONBA_TSUMO;
        deltas[payer] -= amount;
        deltas[winner] += amount;
    }
}

fn pay_noten(deltas: &mut [i32; 4], tenpai: &[bool; 4]) {
    let ready = tenpai.iter().filter(|&&t| t).count() as i32;
    if ready == 0 || ready == 4 {
        return;
    }
    let gain = NOTEN_PENALTY / ready;
    let loss = NOTEN_PENALTY / (4 - ready);
    for (seat, &t) in tenpai.iter().enumerate() {
        deltas[seat] += if t { gain } else { -loss };
    }
}

/// Per-winner breakdown for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YakuSettlement {
    pub seat: usize,
    pub uuid: String,
    pub yaku: Vec<Yaku>,
    pub riichi: bool,
    pub winning_tile: Option<Tile>,
    pub hand: Vec<Tile>,
    pub melds: Vec<Meld>,
    pub dora_indicators: Vec<Tile>,
    pub ura_indicators: Vec<Tile>,
    pub fu: u32,
    pub han: u32,
    pub score: i32,
    pub nagashi: bool,
}

impl YakuSettlement {
    fn from_win(win: &WinRecord, uuids: &[String; 4]) -> Self {
        Self {
            seat: win.seat,
            uuid: uuids[win.seat].clone(),
            yaku: win.result.yaku.clone(),
            riichi: win.riichi,
            winning_tile: Some(win.tile),
            hand: win.hand.clone(),
            melds: win.melds.clone(),
            dora_indicators: win.dora_indicators.clone(),
            ura_indicators: win.ura_indicators.clone(),
            fu: win.result.fu,
            han: win.result.han,
            score: win.result.score,
            nagashi: false,
        }
    }

    fn nagashi(seat: usize, uuids: &[String; 4], score: i32) -> Self {
        Self {
            seat,
            uuid: uuids[seat].clone(),
            yaku: vec![Yaku::new("nagashi_mangan", 5)],
            riichi: false,
            winning_tile: None,
            hand: Vec::new(),
            melds: Vec::new(),
            dora_indicators: Vec::new(),
            ura_indicators: Vec::new(),
            fu: 0,
            han: 5,
            score,
            nagashi: true,
        }
    }
}

/// One row of a score table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreItem {
    pub display_name: String,
    pub uuid: String,
    pub is_real_player: bool,
    pub score_origin: i32,
    pub score_change: i32,
}

impl ScoreItem {
    pub fn total(&self) -> i32 {
        self.score_origin + self.score_change
    }
}

/// A score row with rank movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedScore {
    pub item: ScoreItem,
    pub rank: usize,
    /// `↑`, `↓` or empty.
    pub arrow: &'static str,
    /// Signed change such as `+8000`, empty when zero.
    pub change_text: String,
}

/// Score table broadcast after a round or at match end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSettlement {
    pub title: String,
    pub items: Vec<ScoreItem>,
}

impl ScoreSettlement {
    pub fn new(title: impl Into<String>, items: Vec<ScoreItem>) -> Self {
        Self {
            title: title.into(),
            items,
        }
    }

    /// Rows sorted by new total (ties by uuid) with rank movement.
    pub fn ranked(&self) -> Vec<RankedScore> {
        let order = |key: fn(&ScoreItem) -> i32| {
            let mut items: Vec<&ScoreItem> = self.items.iter().collect();
            items.sort_by(|a, b| match key(b).cmp(&key(a)) {
                Ordering::Equal => a.uuid.cmp(&b.uuid),
                other => other,
            });
            items.into_iter().map(|i| i.uuid.clone()).collect::<Vec<_>>()
        };
        let before = order(|i| i.score_origin);
        let after = order(ScoreItem::total);

        after
            .iter()
            .enumerate()
            .filter_map(|(rank, uuid)| {
                let item = self.items.iter().find(|i| &i.uuid == uuid)?;
                let old_rank = before.iter().position(|u| u == uuid).unwrap_or(rank);
                let arrow = match rank.cmp(&old_rank) {
                    Ordering::Less => "↑",
                    Ordering::Greater => "↓",
                    Ordering::Equal => "",
                };
                let change_text = match item.score_change.cmp(&0) {
                    Ordering::Greater => format!("+{}", item.score_change),
                    Ordering::Less => item.score_change.to_string(),
                    Ordering::Equal => String::new(),
                };
                Some(RankedScore {
                    item: item.clone(),
                    rank: rank + 1,
                    arrow,
                    change_text,
                })
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .ranked()
            .into_iter()
            .map(|r| {
                serde_json::json!({
                    "rank": r.rank,
                    "display_name": r.item.display_name,
                    "uuid": r.item.uuid,
                    "is_real_player": r.item.is_real_player,
                    "total": r.item.total(),
                    "change": r.change_text,
                    "arrow": r.arrow
                })
            })
            .collect();
        serde_json::json!({
            "title": self.title,
            "rows": rows
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tile::{parse_tiles, Wind};
    use pretty_assertions::assert_eq;

    fn uuids() -> [String; 4] {
        std::array::from_fn(|i| format!("p{}", i))
    }

    fn win(seat: usize, from: Option<usize>, score: i32) -> WinRecord {
        WinRecord {
            seat,
            from,
            tile: parse_tiles("1m").unwrap()[0],
            hand: Vec::new(),
            melds: Vec::new(),
            riichi: false,
            dora_indicators: Vec::new(),
            ura_indicators: Vec::new(),
            result: ScoringResult {
                yaku: vec![Yaku::new("tsumo", 1)],
                han: 1,
                fu: 30,
                score,
            },
        }
    }

    fn result(reason: RoundEndReason, wins: Vec<WinRecord>) -> RoundResult {
        RoundResult {
            round_id: 1,
            counter: RoundCounter::new(Wind::East),
            reason,
            wins,
            tenpai: [false; 4],
            nagashi: Vec::new(),
            riichi_paid: [false; 4],
            deposits: 0,
            uuids: uuids(),
        }
    }

    #[test]
    fn test_dealer_tsumo_split() {
        let r = result(RoundEndReason::Tsumo, vec![win(0, None, 12_000)]);
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [12_000, -4000, -4000, -4000]);
        assert!(s.dealer_repeats);
    }

    #[test]
    fn test_non_dealer_tsumo_split_with_honba() {
        let mut r = result(RoundEndReason::Tsumo, vec![win(2, None, 8000)]);
        r.counter.honba = 2;
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [-4200, -2200, 8600, -2200]);
        assert!(!s.dealer_repeats);
    }

    #[test]
    fn test_tsumo_rounds_up() {
        // 1000 / 4 = 250 -> 300, 1000 / 2 = 500.
        let r = result(RoundEndReason::Tsumo, vec![win(1, None, 1000)]);
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [-500, 1100, -300, -300]);
    }

    #[test]
    fn test_ron_with_deposits_and_riichi() {
        let mut r = result(RoundEndReason::Ron, vec![win(3, Some(1), 3900)]);
        r.counter.honba = 1;
        r.deposits = 2;
        r.riichi_paid = [false, false, false, true];
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [0, -4200, 0, 4200 + 2000 - 1000]);
        assert_eq!(s.deposits_left, 0);
        assert_eq!(s.yaku.len(), 1);
        assert_eq!(s.yaku[0].uuid, "p3");
    }

    #[test]
    fn test_double_ron_bonus_to_head_winner() {
        let mut r = result(
            RoundEndReason::Ron,
            vec![win(1, Some(0), 2000), win(3, Some(0), 1000)],
        );
        r.counter.honba = 1;
        r.deposits = 1;
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [-3300, 3300, 0, 1000]);
        assert_eq!(s.winners, vec![1, 3]);
    }

    #[test]
    fn test_noten_payments() {
        let mut r = result(RoundEndReason::ExhaustiveDraw(DrawKind::Normal), Vec::new());
        r.tenpai = [true, false, false, true];
        r.deposits = 1;
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [1500, -1500, -1500, 1500]);
        assert_eq!(s.deposits_left, 1);
        assert!(s.dealer_repeats);

        r.tenpai = [false, true, false, false];
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [-1000, 3000, -1000, -1000]);
        assert!(!s.dealer_repeats);
    }

    #[test]
    fn test_nagashi_replaces_noten() {
        let mut r = result(RoundEndReason::ExhaustiveDraw(DrawKind::Normal), Vec::new());
        r.tenpai = [false, true, false, false];
        r.nagashi = vec![2];
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [-4000, -2000, 8000, -2000]);
        assert!(s.yaku[0].nagashi);

        let rule = RuleSet {
            nagashi_mangan: false,
            ..RuleSet::default()
        };
        let s = settle(&r, &rule);
        assert_eq!(s.deltas, [-1000, 3000, -1000, -1000]);
    }

    #[test]
    fn test_abortive_draw_moves_nothing() {
        let mut r = result(
            RoundEndReason::ExhaustiveDraw(DrawKind::SuuchaRiichi),
            Vec::new(),
        );
        r.riichi_paid = [true; 4];
        r.deposits = 4;
        let s = settle(&r, &RuleSet::default());
        assert_eq!(s.deltas, [-1000; 4]);
        assert_eq!(s.deposits_left, 4);
        assert!(s.dealer_repeats);
    }

    #[test]
    fn test_ranked_scores() {
        let item = |uuid: &str, origin: i32, change: i32| ScoreItem {
            display_name: uuid.to_uppercase(),
            uuid: uuid.to_string(),
            is_real_player: true,
            score_origin: origin,
            score_change: change,
        };
        let table = ScoreSettlement::new(
            "East 1",
            vec![
                item("a", 30_000, -8000),
                item("b", 25_000, 8000),
                item("c", 24_000, 0),
                item("d", 21_000, 0),
            ],
        );
        let ranked = table.ranked();
        let order: Vec<&str> = ranked.iter().map(|r| r.item.uuid.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a", "d"]);
        assert_eq!(ranked[0].arrow, "↑");
        assert_eq!(ranked[0].change_text, "+8000");
        assert_eq!(ranked[1].arrow, "↑");
        assert_eq!(ranked[2].arrow, "↓");
        assert_eq!(ranked[2].change_text, "-8000");
        assert_eq!(ranked[3].arrow, "");
        assert_eq!(ranked[3].change_text, "");
    }
}
