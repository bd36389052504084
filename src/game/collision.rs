//! Interaction Rules
//!
//! What happens when a movable steps onto an occupied cell.
//!
//! | Mover  | Mine        | Food                 | Leveled                          |
//! |--------|-------------|----------------------|----------------------------------|
//! | Player | both die    | level up, food eaten | higher effective level wins      |
//! | NPC    | passes      | passes               | higher effective level wins      |
//!
//! Equal effective levels are a standoff: both stay on the cell.

use std::cmp::Ordering;

use crate::core::city::Cities;
use crate::game::entity::{Entity, EntityKind};

/// Outcome of one mover/occupant interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Both stay.
    Nothing,
    /// The occupant is removed.
    RemoveOther,
    /// The mover is removed.
    RemoveSelf,
    /// Both are removed.
    RemoveBoth,
}

/// Resolve `mover` stepping onto `other`.
///
/// Eating food levels the mover up as a side effect.
pub fn interact(mover: &Entity, other: &Entity, cities: &Cities) -> Interaction {
    match (mover.kind(), other.kind()) {
        (EntityKind::Player { .. }, EntityKind::Mine) => Interaction::RemoveBoth,
        (EntityKind::Player { .. }, EntityKind::Food) => {
            mover.level_up();
            Interaction::RemoveOther
        }
        (EntityKind::Npc(_), EntityKind::Mine | EntityKind::Food) => Interaction::Nothing,
        (EntityKind::Player { .. } | EntityKind::Npc(_), EntityKind::Player { .. } | EntityKind::Npc(_)) => {
            fight(mover, other, cities)
        }
        (EntityKind::Food | EntityKind::Mine, _) => Interaction::Nothing,
    }
}

fn fight(mover: &Entity, other: &Entity, cities: &Cities) -> Interaction {
    let (Some(mine), Some(theirs)) = (mover.effective_level(cities), other.effective_level(cities)) else {
        return Interaction::Nothing;
    };
    match mine.cmp(&theirs) {
        Ordering::Greater => Interaction::RemoveOther,
        Ordering::Less => Interaction::RemoveSelf,
        Ordering::Equal => Interaction::Nothing,
    }
}
