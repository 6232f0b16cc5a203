//! Single-elimination bracket layouts for 2 to 10 teams.
//!
//! Layouts are fixed per team count and applied to a shuffled seed order. Non-power-of-two counts
//! use play-in rounds or byes. The 5 and 6 team layouts chain or share semifinal winners; they
//! are kept exactly as played in the community.

use rand::{Rng, seq::SliceRandom};

use crate::state::session::{MatchBracket, Slot, TeamId};

/// Smallest supported number of teams.
pub const MIN_TEAMS: usize = 2;
/// Largest supported number of teams.
pub const MAX_TEAMS: usize = 10;

#[derive(Clone, Copy)]
enum Pick {
    /// Seed at the given position of the shuffled order.
    T(usize),
    /// Winner of the bracket at the given index.
    W(usize),
}

use Pick::{T, W};

type Layout = &'static [(Pick, Pick, &'static str)];

const TWO: Layout = &[(T(0), T(1), "Final")];

const THREE: Layout = &[(T(0), T(1), "Semifinal"), (W(0), T(2), "Final")];

const FOUR: Layout = &[
    (T(0), T(1), "Semifinal 1"),
    (T(2), T(3), "Semifinal 2"),
    (W(0), W(1), "Final"),
];

const FIVE: Layout = &[
    (T(0), T(1), "Quarterfinal 1"),
    (T(2), T(3), "Quarterfinal 2"),
    (W(0), T(4), "Semifinal 1"),
    (W(1), W(2), "Semifinal 2"),
    (W(2), W(3), "Final"),
];

const SIX: Layout = &[
    (T(0), T(1), "Quarterfinal 1"),
    (T(2), T(3), "Quarterfinal 2"),
    (T(4), T(5), "Quarterfinal 3"),
    (W(0), W(1), "Semifinal 1"),
    (W(2), W(0), "Semifinal 2"),
    (W(3), W(4), "Final"),
];

const SEVEN: Layout = &[
    (T(0), T(1), "Quarterfinal 1"),
    (T(2), T(3), "Quarterfinal 2"),
    (T(4), T(5), "Quarterfinal 3"),
    (W(0), T(6), "Semifinal 1"),
    (W(1), W(2), "Semifinal 2"),
    (W(3), W(4), "Final"),
];

const EIGHT: Layout = &[
    (T(0), T(1), "Quarterfinal 1"),
    (T(2), T(3), "Quarterfinal 2"),
    (T(4), T(5), "Quarterfinal 3"),
    (T(6), T(7), "Quarterfinal 4"),
    (W(0), W(1), "Semifinal 1"),
    (W(2), W(3), "Semifinal 2"),
    (W(4), W(5), "Final"),
];

const NINE: Layout = &[
    (T(0), T(1), "Play-in"),
    (W(0), T(2), "Quarterfinal 1"),
    (T(3), T(4), "Quarterfinal 2"),
    (T(5), T(6), "Quarterfinal 3"),
    (T(7), T(8), "Quarterfinal 4"),
    (W(1), W(2), "Semifinal 1"),
    (W(3), W(4), "Semifinal 2"),
    (W(5), W(6), "Final"),
];

const TEN: Layout = &[
    (T(0), T(1), "Play-in 1"),
    (T(2), T(3), "Play-in 2"),
    (W(0), T(4), "Quarterfinal 1"),
    (W(1), T(5), "Quarterfinal 2"),
    (T(6), T(7), "Quarterfinal 3"),
    (T(8), T(9), "Quarterfinal 4"),
    (W(2), W(3), "Semifinal 1"),
    (W(4), W(5), "Semifinal 2"),
    (W(6), W(7), "Final"),
];

fn layout_for(team_count: usize) -> Option<Layout> {
    let layout = match team_count {
        2 => TWO,
        3 => THREE,
        4 => FOUR,
        5 => FIVE,
        6 => SIX,
        7 => SEVEN,
        8 => EIGHT,
        9 => NINE,
        10 => TEN,
        _ => return None,
    };
    Some(layout)
}

/// Whether a bracket layout exists for `team_count` teams.
pub fn supports(team_count: usize) -> bool {
    (MIN_TEAMS..=MAX_TEAMS).contains(&team_count)
}

/// Lay out brackets for `seeds` in the given order. Returns `None` for unsupported counts.
pub fn layout(seeds: &[TeamId]) -> Option<Vec<MatchBracket>> {
    let layout = layout_for(seeds.len())?;
    let slot = |pick: Pick| match pick {
        T(position) => Slot::Seed(seeds[position]),
        W(index) => Slot::WinnerOf(index),
    };

    Some(
        layout
            .iter()
            .map(|&(a, b, phase)| MatchBracket::new(slot(a), slot(b), phase))
            .collect(),
    )
}

/// Shuffle the seed order of `teams` and lay out their brackets.
pub fn generate<R>(rng: &mut R, teams: &[TeamId]) -> Option<Vec<MatchBracket>>
where
    R: Rng + ?Sized,
{
    let mut seeds = teams.to_vec();
    seeds.shuffle(rng);
    layout(&seeds)
}
