//! Cities
//!
//! The grid is split into four 10x10 quadrants, each governed by a city
//! whose temperature drives player climate modifiers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::position::Position;
use crate::{CITY_COUNT, QUADRANT_SIZE};

/// Temperature at or below which the cold modifier applies.
pub const COLD_THRESHOLD: f64 = 10.0;

/// Temperature at or above which the hot modifier applies.
pub const HOT_THRESHOLD: f64 = 25.0;

/// A city governing one quadrant of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// Display name.
    pub name: String,
    /// Current temperature in degrees Celsius.
    pub temperature: f64,
}

impl City {
    /// Create a city.
    pub fn new(name: impl Into<String>, temperature: f64) -> Self {
        Self { name: name.into(), temperature }
    }

    /// Single status line: `name temperature`.
    pub fn pretty_print(&self) -> String {
        format!("{} {:?}", self.name, self.temperature)
    }

    /// Climate the city imposes on players standing in its quadrant.
    pub fn climate(&self) -> Climate {
        if self.temperature <= COLD_THRESHOLD {
            Climate::Cold
        } else if self.temperature >= HOT_THRESHOLD {
            Climate::Hot
        } else {
            Climate::Mild
        }
    }
}

/// Climate band of a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Climate {
    /// Cold modifier applies.
    Cold,
    /// No modifier.
    Mild,
    /// Hot modifier applies.
    Hot,
}

/// Error building a city set.
#[derive(Debug, Error)]
pub enum CityError {
    /// A match needs exactly four cities.
    #[error("expected 4 cities, got {0}")]
    WrongCount(usize),
}

/// The four cities of a match, indexed by quadrant.
///
/// Index is `x / 10 + (y / 10) * 2`: top-left, top-right, bottom-left,
/// bottom-right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<City>", into = "Vec<City>")]
pub struct Cities([City; CITY_COUNT]);

impl Cities {
    /// Build from exactly four cities.
    pub fn new(cities: [City; CITY_COUNT]) -> Self {
        Self(cities)
    }

    /// City governing the quadrant that contains `pos`.
    pub fn governing(&self, pos: Position) -> &City {
        let qx = (pos.x / QUADRANT_SIZE).clamp(0, 1);
        let qy = (pos.y / QUADRANT_SIZE).clamp(0, 1);
        &self.0[(qx + qy * 2) as usize]
    }

    /// Cities in quadrant order.
    pub fn iter(&self) -> impl Iterator<Item = &City> {
        self.0.iter()
    }
}

impl Default for Cities {
    fn default() -> Self {
        Self([
            City::new("Oslo", 4.0),
            City::new("Lisbon", 18.5),
            City::new("Reykjavik", -2.0),
            City::new("Cairo", 31.0),
        ])
    }
}

impl TryFrom<Vec<City>> for Cities {
    type Error = CityError;

    fn try_from(cities: Vec<City>) -> Result<Self, Self::Error> {
        let count = cities.len();
        let array: [City; CITY_COUNT] = cities.try_into().map_err(|_| CityError::WrongCount(count))?;
        Ok(Self(array))
    }
}

impl From<Cities> for Vec<City> {
    fn from(cities: Cities) -> Self {
        cities.0.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrant_lookup() {
        let cities = Cities::default();
        assert_eq!(cities.governing(Position::new(0, 0)).name, "Oslo");
        assert_eq!(cities.governing(Position::new(19, 0)).name, "Lisbon");
        assert_eq!(cities.governing(Position::new(3, 12)).name, "Reykjavik");
        assert_eq!(cities.governing(Position::new(10, 10)).name, "Cairo");
    }

    #[test]
    fn test_climate_thresholds() {
        assert_eq!(City::new("a", 10.0).climate(), Climate::Cold);
        assert_eq!(City::new("a", 10.5).climate(), Climate::Mild);
        assert_eq!(City::new("a", 25.0).climate(), Climate::Hot);
    }

    #[test]
    fn test_pretty_print() {
        assert_eq!(City::new("Oslo", 4.0).pretty_print(), "Oslo 4.0");
        assert_eq!(City::new("Lima", 17.25).pretty_print(), "Lima 17.25");
    }

    #[test]
    fn test_wrong_count_rejected() {
        let json = r#"[{"name":"a","temperature":1.0}]"#;
        assert!(serde_json::from_str::<Cities>(json).is_err());

        let ok = serde_json::to_string(&Cities::default()).unwrap();
        assert_eq!(serde_json::from_str::<Cities>(&ok).unwrap(), Cities::default());
    }
}
