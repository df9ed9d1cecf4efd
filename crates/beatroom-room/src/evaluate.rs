//! Ranking round results by the room's win condition.
//!
//! [`evaluate`] is a pure function: the same entries, condition and
//! parameters always produce the same [`Ranking`].

use std::cmp::Ordering;

use beatroom_protocol::PlayerId;
use serde::{Deserialize, Serialize};

use crate::round::{RawResult, SubmittedResult};
use crate::{Team, TeamMode, WinCondition};

/// Baseline the ScoreV2 components are normalized against when the
/// beatmap rules don't know the beatmap's maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreNormalization {
    pub max_score: f64,
    pub max_accuracy: f64,
}

impl Default for ScoreNormalization {
    fn default() -> Self {
        Self {
            max_score: 1_000_000.0,
            max_accuracy: 1.0,
        }
    }
}

/// Numbers the evaluator needs beyond the results themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    /// Weight of the score component in ScoreV2.
    pub score_portion: f64,
    pub max_score: f64,
    pub max_accuracy: f64,
}

/// One participant as seen by the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub player: PlayerId,
    pub team: Option<Team>,
    pub result: Option<&'a SubmittedResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStanding {
    /// 1-based.
    pub rank: usize,
    pub player: PlayerId,
    pub team: Option<Team>,
    /// The win condition metric, `None` if the player never submitted or
    /// the result lacks the value.
    pub value: Option<f64>,
    pub submitted_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStanding {
    pub rank: usize,
    pub team: Team,
    /// Average of the members' metric values.
    pub value: Option<f64>,
    /// Members whose value went into the average.
    pub counted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Player(PlayerId),
    Team(Team),
}

/// A strict total order over participants, and over teams in team
/// versus mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub condition: WinCondition,
    pub players: Vec<PlayerStanding>,
    /// Empty in head-to-head.
    pub teams: Vec<TeamStanding>,
}

impl Ranking {
    /// Player ids best first.
    pub fn order(&self) -> Vec<PlayerId> {
        self.players.iter().map(|s| s.player).collect()
    }

    /// The top team in team versus, the top player otherwise. `None` if
    /// nobody has a value.
    pub fn winner(&self) -> Option<Winner> {
        if let Some(top) = self.teams.first() {
            return top.value.map(|_| Winner::Team(top.team));
        }
        let top = self.players.first()?;
        top.value.map(|_| Winner::Player(top.player))
    }
}

/// The metric a result scores under `condition`.
pub fn metric(condition: WinCondition, result: &RawResult, params: &ScoringParams) -> Option<f64> {
    let value = match condition {
        WinCondition::ScoreV1 => result.score as f64,
        WinCondition::ScoreV2 => {
            if params.max_score <= 0.0 || params.max_accuracy <= 0.0 {
                return None;
            }
            let score = (result.score as f64 / params.max_score).min(1.0);
            let accuracy = (result.accuracy / params.max_accuracy).min(1.0);
            1_000_000.0 * (params.score_portion * score + (1.0 - params.score_portion) * accuracy)
        }
        WinCondition::Accuracy => result.accuracy,
        WinCondition::MaxCombo => f64::from(result.max_combo),
        WinCondition::Most300 => f64::from(result.judgements.n300),
        WinCondition::Least100 => f64::from(result.judgements.n100),
        WinCondition::Least50 => f64::from(result.judgements.n50),
        WinCondition::LeastMiss => f64::from(result.misses),
        WinCondition::LeastUnstableRate => result.unstable_rate?,
        WinCondition::MostDroidPp => result.droid_pp?,
        WinCondition::MostPcPp => result.pc_pp?,
    };
    (!value.is_nan()).then_some(value)
}

/// Better metric first.
fn compare_values(condition: WinCondition, a: f64, b: f64) -> Ordering {
    if condition.is_ascending() {
        a.total_cmp(&b)
    } else {
        b.total_cmp(&a)
    }
}

struct Scored<'a> {
    index: usize,
    entry: Entry<'a>,
    value: Option<f64>,
}

impl Scored<'_> {
    /// 0: has a value, 1: submitted without one, 2: never submitted.
    fn class(&self) -> u8 {
        match (self.value, self.entry.result) {
            (Some(_), _) => 0,
            (None, Some(_)) => 1,
            (None, None) => 2,
        }
    }
}

/// Ranks `entries` under `condition`.
///
/// Players are ordered by metric, then earliest submission, then
/// submission sequence, then input order, so no two players tie. Players
/// who never submitted come last. In team versus, each team's value is
/// the average over members with a value; a team with none ranks last.
pub fn evaluate(
    entries: &[Entry<'_>],
    condition: WinCondition,
    team_mode: TeamMode,
    params: &ScoringParams,
) -> Ranking {
    let mut scored: Vec<Scored<'_>> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| Scored {
            index,
            entry: *entry,
            value: entry.result.and_then(|r| metric(condition, &r.result, params)),
        })
        .collect();

    scored.sort_by(|a, b| {
        a.class()
            .cmp(&b.class())
            .then_with(|| match (a.value, b.value) {
                (Some(x), Some(y)) => compare_values(condition, x, y),
                _ => Ordering::Equal,
            })
            .then_with(|| {
                let at = |s: &Scored<'_>| s.entry.result.map(|r| (r.submitted_at, r.seq));
                match (at(a), at(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => Ordering::Equal,
                }
            })
            .then_with(|| a.index.cmp(&b.index))
    });

    let players = scored
        .iter()
        .enumerate()
        .map(|(i, s)| PlayerStanding {
            rank: i + 1,
            player: s.entry.player,
            team: s.entry.team,
            value: s.value,
            submitted_at: s.entry.result.map(|r| r.submitted_at),
        })
        .collect();

    let teams = match team_mode {
        TeamMode::HeadToHead => Vec::new(),
        TeamMode::TeamVs => rank_teams(&scored, condition),
    };

    Ranking {
        condition,
        players,
        teams,
    }
}

fn rank_teams(scored: &[Scored<'_>], condition: WinCondition) -> Vec<TeamStanding> {
    let mut teams: Vec<(TeamStanding, Option<u64>)> = [Team::Red, Team::Blue]
        .into_iter()
        .map(|team| {
            let members = scored.iter().filter(|s| s.entry.team == Some(team));
            let values: Vec<f64> = members.clone().filter_map(|s| s.value).collect();
            let earliest = members.filter_map(|s| s.entry.result).map(|r| r.submitted_at).min();
            let value = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
            let standing = TeamStanding {
                rank: 0,
                team,
                value,
                counted: values.len(),
            };
            (standing, earliest)
        })
        .collect();

    teams.sort_by(|(a, a_at), (b, b_at)| {
        let by_value = match (a.value, b.value) {
            (Some(x), Some(y)) => compare_values(condition, x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let by_time = match (a_at, b_at) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_value.then(by_time).then(a.team.cmp(&b.team))
    });

    teams
        .into_iter()
        .enumerate()
        .map(|(i, (standing, _))| TeamStanding {
            rank: i + 1,
            ..standing
        })
        .collect()
}
