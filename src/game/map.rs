//! Map Rendering
//!
//! Fixed-width text view of the grid broadcast to clients:
//!
//! ```text
//!     1  2  3 ...
//!  1  F     M ...
//!  2    ann   ...
//! ...
//! Oslo 4.0
//! ann (3f2a...): 2
//! ```

use crate::core::city::Cities;
use crate::core::position::Position;
use crate::game::state::WorldState;
use crate::GRID_SIZE;

const EMPTY_CELL: &str = "   ";

/// Render the grid, the city lines and one status line per movable.
pub fn render_map(world: &WorldState, cities: &Cities) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str("    ");
    let header: Vec<String> = (1..=GRID_SIZE).map(|c| format!("{:<2}", c)).collect();
    out.push_str(&header.join(" "));
    out.push('\n');

    for row in 0..GRID_SIZE {
        let label = row + 1;
        out.push_str(&format!("{:>2} ", label));
        for column in 0..GRID_SIZE {
            match world.first_at(Position::new(column, row)) {
                Some(entity) => out.push_str(&entity.glyph()),
                None => out.push_str(EMPTY_CELL),
            }
        }
        out.push('\n');
    }

    for city in cities.iter() {
        out.push_str(&city.pretty_print());
        out.push('\n');
    }
    for movable in world.movables() {
        if let Some(line) = movable.display(cities) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
