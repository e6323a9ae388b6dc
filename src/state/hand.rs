//! Hand shape analysis.
//!
//! Works on kind counts only. Whether a complete shape actually scores is
//! the scoring oracle's call; this module answers "is it a winning shape",
//! "what does it wait on" and "which discards keep it ready".

use super::tile::{kind_counts, Tile, TILE_KINDS};

/// Kinds that are terminals or honors.
const YAOCHU: [usize; 13] = [0, 8, 9, 17, 18, 26, 27, 28, 29, 30, 31, 32, 33];

/// Complete hand shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Four sets and a pair (sets in melds included).
    Standard,
    SevenPairs,
    ThirteenOrphans,
}

/// Shape of a complete hand, if it is one.
///
/// `concealed` must hold `14 - 3 * meld_count` tiles.
pub fn complete_shape(concealed: &[Tile], meld_count: usize) -> Option<Shape> {
    if meld_count > 4 || concealed.len() + 3 * meld_count != 14 {
        return None;
    }
    let counts = kind_counts(concealed);
    shape_of(&counts, meld_count)
}

pub fn is_complete(concealed: &[Tile], meld_count: usize) -> bool {
    complete_shape(concealed, meld_count).is_some()
}

fn shape_of(counts: &[u8; TILE_KINDS], meld_count: usize) -> Option<Shape> {
    if meld_count == 0 {
        if is_thirteen_orphans(counts) {
            return Some(Shape::ThirteenOrphans);
        }
        if is_seven_pairs(counts) {
            return Some(Shape::SevenPairs);
        }
    }
    if is_standard(counts, 4 - meld_count) {
        return Some(Shape::Standard);
    }
    None
}

fn is_thirteen_orphans(counts: &[u8; TILE_KINDS]) -> bool {
    let mut pair = false;
    for &k in &YAOCHU {
        match counts[k] {
            1 => {}
            2 if !pair => pair = true,
            _ => return false,
        }
    }
    pair && counts.iter().sum::<u8>() == 14
}

fn is_seven_pairs(counts: &[u8; TILE_KINDS]) -> bool {
    counts.iter().filter(|&&c| c == 2).count() == 7
}

fn is_standard(counts: &[u8; TILE_KINDS], sets: usize) -> bool {
    let mut work = *counts;
    for pair in 0..TILE_KINDS {
        if work[pair] >= 2 {
            work[pair] -= 2;
            if decompose(&mut work, sets) {
                return true;
            }
            work[pair] += 2;
        }
    }
    false
}

fn decompose(counts: &mut [u8; TILE_KINDS], sets: usize) -> bool {
    let first = match counts.iter().position(|&c| c > 0) {
        Some(i) => i,
        None => return sets == 0,
    };
    if sets == 0 {
        return false;
    }

    if counts[first] >= 3 {
        counts[first] -= 3;
        let ok = decompose(counts, sets - 1);
        counts[first] += 3;
        if ok {
            return true;
        }
    }

    if first < 27 && first % 9 <= 6 && counts[first + 1] > 0 && counts[first + 2] > 0 {
        counts[first] -= 1;
        counts[first + 1] -= 1;
        counts[first + 2] -= 1;
        let ok = decompose(counts, sets - 1);
        counts[first] += 1;
        counts[first + 1] += 1;
        counts[first + 2] += 1;
        if ok {
            return true;
        }
    }

    false
}

/// Kinds that would complete a 13-tile (minus melds) hand.
///
/// Kinds already held four times are not counted as waits.
pub fn waits(concealed: &[Tile], meld_count: usize) -> Vec<u8> {
    if meld_count > 4 || concealed.len() + 3 * meld_count != 13 {
        return Vec::new();
    }
    let mut counts = kind_counts(concealed);
    let mut result = Vec::new();
    for kind in 0..TILE_KINDS {
        if counts[kind] >= 4 {
            continue;
        }
        counts[kind] += 1;
        if shape_of(&counts, meld_count).is_some() {
            result.push(kind as u8);
        }
        counts[kind] -= 1;
    }
    result
}

pub fn is_tenpai(concealed: &[Tile], meld_count: usize) -> bool {
    !waits(concealed, meld_count).is_empty()
}

/// Distinct tiles whose discard from a 14-tile hand leaves it ready.
pub fn tenpai_discards(concealed: &[Tile], meld_count: usize) -> Vec<Tile> {
    let mut result: Vec<Tile> = Vec::new();
    for (i, &tile) in concealed.iter().enumerate() {
        if result.contains(&tile) {
            continue;
        }
        let mut rest = concealed.to_vec();
        rest.remove(i);
        if is_tenpai(&rest, meld_count) {
            result.push(tile);
        }
    }
    result
}

/// Number of distinct terminal and honor kinds held.
pub fn yaochu_kinds(tiles: &[Tile]) -> usize {
    let counts = kind_counts(tiles);
    YAOCHU.iter().filter(|&&k| counts[k] > 0).count()
}

/// Whether `tile` completes a thirteen orphans shape.
pub fn completes_thirteen_orphans(concealed: &[Tile], tile: Tile) -> bool {
    if concealed.len() != 13 {
        return false;
    }
    let mut counts = kind_counts(concealed);
    counts[tile.kind() as usize] += 1;
    is_thirteen_orphans(&counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tile::parse_tiles;

    fn tiles(s: &str) -> Vec<Tile> {
        parse_tiles(s).unwrap()
    }

    #[test]
    fn test_standard_complete() {
        let hand = tiles("123m456p789s111z22z");
        assert_eq!(complete_shape(&hand, 0), Some(Shape::Standard));
    }

    #[test]
    fn test_ambiguous_decomposition() {
        // 111222333m can be three triplets or three sequences.
        let hand = tiles("111222333m789p55s");
        assert!(is_complete(&hand, 0));
        let hand = tiles("112233m456p789s11z");
        assert!(is_complete(&hand, 0));
    }

    #[test]
    fn test_with_melds() {
        let hand = tiles("456p11z");
        assert!(is_complete(&hand, 3));
        assert!(!is_complete(&hand, 2));
    }

    #[test]
    fn test_seven_pairs_and_orphans() {
        let pairs = tiles("1133m2255p6699s11z");
        assert_eq!(complete_shape(&pairs, 0), Some(Shape::SevenPairs));

        let orphans = tiles("19m19p19s12345677z");
        assert_eq!(complete_shape(&orphans, 0), Some(Shape::ThirteenOrphans));

        let four_of_kind = tiles("1111m2255p6699s11z");
        assert_eq!(complete_shape(&four_of_kind, 0), None);
    }

    #[test]
    fn test_waits() {
        let hand = tiles("23m456p789s111z22z");
        assert_eq!(waits(&hand, 0), vec![0, 3]);

        let tanki = tiles("123m456p789s111z2z");
        assert_eq!(waits(&tanki, 0), vec![28]);

        let noten = tiles("159m159p159s1234z");
        assert!(!is_tenpai(&noten, 0));
    }

    #[test]
    fn test_tenpai_discards() {
        let hand = tiles("23m456p789s111z22z9m");
        let discards = tenpai_discards(&hand, 0);
        assert_eq!(discards, tiles("9m"));
    }

    #[test]
    fn test_yaochu_kinds() {
        let hand = tiles("19m19p1s1234z5m5p5s");
        assert_eq!(yaochu_kinds(&hand), 9);
    }

    #[test]
    fn test_thirteen_orphans_wait() {
        let hand = tiles("19m19p19s1234567z");
        assert!(completes_thirteen_orphans(&hand, tiles("1m")[0]));
        assert!(!completes_thirteen_orphans(&hand, tiles("2m")[0]));
    }
}
