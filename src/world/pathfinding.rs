//! A* search over the world grid.
//!
//! Movement is 4-connected with uniform step cost and a Manhattan heuristic.
//! Only passable cells are expanded. Ties in the open set resolve in insertion
//! order, so identical grids always yield identical paths.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::grid::{Grid, Position};

/// Neighbour expansion order: west, east, north, south.
const NEIGHBOURS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Find a path from `start` to `target`.
///
/// The result excludes `start` and ends with `target`. An empty vector means
/// no route exists (including `start == target`, or a target that is out of
/// bounds or impassable).
pub fn find_path(grid: &Grid, start: Position, target: Position) -> Vec<Position> {
    if start == target || !grid.is_passable(target) {
        return Vec::new();
    }

    // (f-score, insertion sequence, cell); Reverse turns the max-heap into a min-heap.
    let mut open: BinaryHeap<Reverse<(u32, u64, Position)>> = BinaryHeap::new();
    let mut costs: HashMap<Position, u32> = HashMap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut closed: HashSet<Position> = HashSet::new();
    let mut sequence: u64 = 0;

    costs.insert(start, 0);
    open.push(Reverse((start.manhattan(target), sequence, start)));

    while let Some(Reverse((_, _, current))) = open.pop() {
        if current == target {
            return rebuild(&came_from, start, target);
        }
        if !closed.insert(current) {
            continue;
        }
        let current_cost = costs.get(&current).copied().unwrap_or(0);

        for (dx, dy) in NEIGHBOURS {
            let next = current.offset(dx, dy);
            if !grid.is_passable(next) || closed.contains(&next) {
                continue;
            }
            let candidate = current_cost + 1;
            if costs.get(&next).map_or(true, |known| candidate < *known) {
                costs.insert(next, candidate);
                came_from.insert(next, current);
                sequence += 1;
                open.push(Reverse((candidate + next.manhattan(target), sequence, next)));
            }
        }
    }

    Vec::new()
}

fn rebuild(came_from: &HashMap<Position, Position>, start: Position, target: Position) -> Vec<Position> {
    let mut path = vec![target];
    let mut current = target;
    while let Some(prev) = came_from.get(&current) {
        if *prev == start {
            break;
        }
        path.push(*prev);
        current = *prev;
    }
    path.reverse();
    path
}
