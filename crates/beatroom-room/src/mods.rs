//! Gameplay mods and the rules the beatmap module supplies about them.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A gameplay modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mod {
    NoFail,
    Easy,
    Hidden,
    HardRock,
    DoubleTime,
    NightCore,
    HalfTime,
    Flashlight,
    SuddenDeath,
    Perfect,
    Precise,
    ReallyEasy,
    Relax,
    Autopilot,
}

impl Mod {
    /// The two-letter acronym players know the mod by.
    pub fn acronym(self) -> &'static str {
        match self {
            Self::NoFail => "NF",
            Self::Easy => "EZ",
            Self::Hidden => "HD",
            Self::HardRock => "HR",
            Self::DoubleTime => "DT",
            Self::NightCore => "NC",
            Self::HalfTime => "HT",
            Self::Flashlight => "FL",
            Self::SuddenDeath => "SD",
            Self::Perfect => "PF",
            Self::Precise => "PR",
            Self::ReallyEasy => "RE",
            Self::Relax => "RX",
            Self::Autopilot => "AP",
        }
    }

    /// Returns `true` for mods that fix the playback rate themselves.
    pub fn changes_rate(self) -> bool {
        matches!(self, Self::DoubleTime | Self::NightCore | Self::HalfTime)
    }
}

/// A set of mods. Ordered so documents and summaries are stable.
pub type Mods = BTreeSet<Mod>;

/// Renders mods as concatenated acronyms, `NM` for none.
pub fn acronyms(mods: &Mods) -> String {
    if mods.is_empty() {
        return "NM".to_string();
    }
    mods.iter().map(|m| m.acronym()).collect()
}

/// What the beatmap/mods module tells the room layer.
///
/// The room layer doesn't know anything about beatmap files. It asks this
/// trait whether a mod combination is playable and, optionally, for the
/// numbers needed to score and time a round.
pub trait BeatmapRules: Send + Sync + 'static {
    /// Checks that `mods` played at `speed_multiplier` is a consistent
    /// combination. `Err` carries a reason shown to the host.
    fn check_mods(&self, mods: &Mods, speed_multiplier: f64) -> Result<(), String>;

    /// Maximum achievable score for the beatmap with these mods, used to
    /// normalize ScoreV2. `None` falls back to the configured baseline.
    fn max_score(&self, _beatmap_hash: &str, _mods: &Mods) -> Option<f64> {
        None
    }

    /// Playable length of the beatmap at normal speed, used to size the
    /// round timeout. `None` falls back to the configured timeout.
    fn beatmap_length(&self, _beatmap_hash: &str) -> Option<Duration> {
        None
    }
}

/// Mod pairs that can never be enabled together.
const EXCLUSIVE: &[(Mod, Mod)] = &[
    (Mod::Easy, Mod::HardRock),
    (Mod::DoubleTime, Mod::HalfTime),
    (Mod::NightCore, Mod::HalfTime),
    (Mod::DoubleTime, Mod::NightCore),
    (Mod::NoFail, Mod::SuddenDeath),
    (Mod::NoFail, Mod::Perfect),
    (Mod::SuddenDeath, Mod::Perfect),
    (Mod::Relax, Mod::Autopilot),
];

/// The default rule set: fixed exclusive pairs, and no custom speed on top
/// of a rate-changing mod.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl BeatmapRules for StandardRules {
    fn check_mods(&self, mods: &Mods, speed_multiplier: f64) -> Result<(), String> {
        for (a, b) in EXCLUSIVE {
            if mods.contains(a) && mods.contains(b) {
                return Err(format!("{} cannot be combined with {}", a.acronym(), b.acronym()));
            }
        }
        if speed_multiplier != 1.0 {
            if let Some(rate) = mods.iter().find(|m| m.changes_rate()) {
                return Err(format!(
                    "{} already sets the rate; custom speed {speed_multiplier}x is not allowed",
                    rate.acronym()
                ));
            }
        }
        Ok(())
    }
}
