//! Movement: single steps, admin teleports and timed walks.
//!
//! All three go through [World::apply_move], so bounds checks, terrain checks
//! and the occupancy update are shared. A walk runs as its own task and moves
//! one cell per step delay; it stops when a newer walk, a single step or a
//! teleport bumps the session's walk generation, or when the session closes.

use std::sync::Arc;

use log::debug;

use super::errors::WorldError;
use super::grid::Position;
use super::pathfinding::find_path;
use super::session::ClientSession;
use super::World;
use crate::metrics;
use crate::protocol::ServerEvent;

/// Cardinal single-step directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }
}

impl World {
    /// Move one cell. Failures are reported to the mover as error events.
    pub fn step(&self, session: &ClientSession, direction: Direction) -> Result<Position, WorldError> {
        session.supersede_walks();
        let (dx, dy) = direction.delta();
        let result = self.apply_move(session, |from| Ok(from.offset(dx, dy)));
        match &result {
            Ok(position) => self.announce_move(session, *position),
            Err(e) => {
                session.send_event(&ServerEvent::error(e.to_string()));
            }
        }
        result
    }

    /// Jump straight to `target`, bypassing adjacency. Used by the control plane.
    pub fn teleport(&self, session: &ClientSession, target: Position) -> Result<Position, WorldError> {
        session.supersede_walks();
        let position = self.apply_move(session, |_| Ok(target))?;
        self.announce_move(session, position);
        Ok(position)
    }

    fn announce_move(&self, session: &ClientSession, position: Position) {
        let username = session.username().to_string();
        session.send_event(&ServerEvent::MoveAck {
            username: username.clone(),
            position,
        });
        self.clients
            .broadcast_event(&ServerEvent::UserMoved { username, position }, Some(session.id()));
    }

    /// Plan a path to `target` and start walking it in the background.
    ///
    /// Returns the planned path. When no path exists the mover receives
    /// `Path not found.` and nothing is scheduled.
    pub fn start_walk(
        self: &Arc<Self>,
        session: &Arc<ClientSession>,
        target: Position,
    ) -> Result<Vec<Position>, WorldError> {
        let path = find_path(&self.grid(), session.position(), target);
        if path.is_empty() {
            session.send_event(&ServerEvent::move_error(WorldError::PathNotFound.to_string()));
            return Err(WorldError::PathNotFound);
        }

        let generation = session.begin_walk();
        metrics::inc_walks_started();
        debug!(
            "{} walking {} steps to {} (walk {})",
            session.username(),
            path.len(),
            target,
            generation
        );
        tokio::spawn(run_walk(
            Arc::clone(self),
            Arc::clone(session),
            generation,
            path.clone(),
        ));
        Ok(path)
    }
}

async fn run_walk(world: Arc<World>, session: Arc<ClientSession>, generation: u64, path: Vec<Position>) {
    for next in path {
        tokio::time::sleep(session.step_delay()).await;

        let step = world.apply_move(&session, |from| {
            if !session.is_current_walk(generation) {
                return Err(WorldError::WalkSuperseded);
            }
            if !from.is_adjacent(next) {
                return Err(WorldError::PathBlocked);
            }
            Ok(next)
        });

        match step {
            Ok(position) => {
                world.clients.broadcast_event(
                    &ServerEvent::WalkStep {
                        username: session.username().to_string(),
                        position,
                    },
                    None,
                );
            }
            Err(WorldError::WalkSuperseded) => {
                metrics::inc_walks_superseded();
                debug!("walk {} for {} superseded", generation, session.username());
                return;
            }
            Err(e) => {
                debug!("walk {} for {} stopped: {}", generation, session.username(), e);
                session.send_event(&ServerEvent::move_error(WorldError::PathBlocked.to_string()));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Outbound;
    use crate::world::grid::{CellType, Grid};
    use crate::world::tests::world_with;
    use crate::world::WorldSettings;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn join(world: &World, name: &str) -> (Arc<ClientSession>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (world.admit(name, None, tx).unwrap(), rx)
    }

    fn next_json(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Value {
        match rx.try_recv().unwrap() {
            Outbound::Line(line) => serde_json::from_str(line.trim_end()).unwrap(),
            Outbound::Close => panic!("unexpected close"),
        }
    }

    fn fast() -> WorldSettings {
        WorldSettings {
            step_delay: Duration::from_millis(5),
            ..WorldSettings::default()
        }
    }

    #[test]
    fn step_moves_occupancy_and_notifies() {
        let world = world_with(WorldSettings::default(), Grid::new(5, 5));
        let (alice, mut ra) = join(&world, "alice");
        let (_bob, mut rb) = join(&world, "bob");

        let pos = world.step(&alice, Direction::South).unwrap();
        assert_eq!(pos, Position::new(0, 1));
        assert_eq!(world.grid().locate("alice"), vec![Position::new(0, 1)]);
        assert_eq!(
            next_json(&mut ra),
            serde_json::json!({"action": "move", "username": "alice", "x": 0, "y": 1})
        );
        assert_eq!(next_json(&mut rb)["action"], "user_moved");
    }

    #[test]
    fn step_outside_grid_is_refused() {
        let world = world_with(WorldSettings::default(), Grid::new(5, 5));
        let (alice, mut ra) = join(&world, "alice");
        assert!(matches!(world.step(&alice, Direction::North), Err(WorldError::OutOfBounds)));
        assert_eq!(alice.position(), Position::ORIGIN);
        assert_eq!(
            next_json(&mut ra),
            serde_json::json!({"type": "error", "msg": "You cannot move outside the grid"})
        );
    }

    #[test]
    fn terrain_blocks_steps() {
        let mut grid = Grid::new(5, 5);
        grid.set_terrain(Position::new(1, 0), CellType::Mountain);
        grid.set_terrain(Position::new(0, 1), CellType::Water);
        let world = world_with(WorldSettings::default(), grid);
        let (alice, mut ra) = join(&world, "alice");

        world.step(&alice, Direction::East).unwrap_err();
        assert_eq!(next_json(&mut ra)["msg"], "You cannot move onto a mountain");
        world.step(&alice, Direction::South).unwrap_err();
        assert_eq!(next_json(&mut ra)["msg"], "You cannot move to that location");
        assert_eq!(world.grid().locate("alice"), vec![Position::ORIGIN]);
    }

    #[test]
    fn teleport_skips_adjacency() {
        let world = world_with(WorldSettings::default(), Grid::new(10, 10));
        let (alice, mut ra) = join(&world, "alice");
        assert_eq!(world.teleport(&alice, Position::new(7, 3)).unwrap(), Position::new(7, 3));
        assert_eq!(next_json(&mut ra)["x"], 7);
        assert!(matches!(
            world.teleport(&alice, Position::new(10, 0)),
            Err(WorldError::OutOfBounds)
        ));
        assert_eq!(alice.position(), Position::new(7, 3));
    }

    #[tokio::test]
    async fn walk_reaches_target_one_step_at_a_time() {
        let world = Arc::new(world_with(fast(), Grid::new(5, 5)));
        let (alice, mut ra) = join(&world, "alice");
        let path = world.start_walk(&alice, Position::new(2, 1)).unwrap();
        assert_eq!(path.len(), 3);

        let mut prev = Position::ORIGIN;
        for _ in 0..3 {
            let line = tokio::time::timeout(Duration::from_secs(2), ra.recv())
                .await
                .unwrap()
                .unwrap();
            let Outbound::Line(line) = line else { panic!("unexpected close") };
            let v: Value = serde_json::from_str(line.trim_end()).unwrap();
            assert_eq!(v["type"], "move");
            let pos = Position::new(
                v["position"]["x"].as_i64().unwrap() as i32,
                v["position"]["y"].as_i64().unwrap() as i32,
            );
            assert!(prev.is_adjacent(pos));
            prev = pos;
        }
        assert_eq!(prev, Position::new(2, 1));
        assert_eq!(world.grid().locate("alice"), vec![Position::new(2, 1)]);
    }

    #[tokio::test]
    async fn unreachable_target_reports_path_not_found() {
        let mut grid = Grid::new(5, 5);
        grid.set_terrain(Position::new(4, 4), CellType::Mountain);
        let world = Arc::new(world_with(fast(), grid));
        let (alice, mut ra) = join(&world, "alice");
        assert!(matches!(
            world.start_walk(&alice, Position::new(4, 4)),
            Err(WorldError::PathNotFound)
        ));
        assert_eq!(
            next_json(&mut ra),
            serde_json::json!({"type": "move_error", "message": "Path not found."})
        );
    }

    #[tokio::test]
    async fn single_step_cancels_running_walk() {
        let settings = WorldSettings {
            step_delay: Duration::from_millis(50),
            ..WorldSettings::default()
        };
        let world = Arc::new(world_with(settings, Grid::new(10, 10)));
        let (alice, _ra) = join(&world, "alice");
        world.start_walk(&alice, Position::new(9, 0)).unwrap();
        world.step(&alice, Direction::South).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(alice.position(), Position::new(0, 1));
        assert_eq!(world.grid().locate("alice"), vec![Position::new(0, 1)]);
    }

    #[tokio::test]
    async fn newer_walk_supersedes_older_one() {
        let settings = WorldSettings {
            step_delay: Duration::from_millis(20),
            ..WorldSettings::default()
        };
        let world = Arc::new(world_with(settings, Grid::new(10, 10)));
        let (alice, _ra) = join(&world, "alice");
        world.start_walk(&alice, Position::new(9, 0)).unwrap();
        world.start_walk(&alice, Position::new(0, 2)).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(alice.position(), Position::new(0, 2));
        assert_eq!(world.grid().locate("alice").len(), 1);
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Value {
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let Outbound::Line(line) = message else { panic!("unexpected close") };
        serde_json::from_str(line.trim_end()).unwrap()
    }

    fn paced(step_ms: u64) -> WorldSettings {
        WorldSettings {
            step_delay: Duration::from_millis(step_ms),
            ..WorldSettings::default()
        }
    }

    #[tokio::test]
    async fn walk_stops_when_reload_blocks_the_path() {
        let world = Arc::new(world_with(paced(40), Grid::new(5, 1)));
        let (alice, mut ra) = join(&world, "alice");
        world.start_walk(&alice, Position::new(4, 0)).unwrap();
        assert_eq!(next_event(&mut ra).await["position"]["x"], 1);
        assert_eq!(next_event(&mut ra).await["position"]["x"], 2);

        let mut walled = Grid::new(5, 1);
        walled.set_terrain(Position::new(3, 0), CellType::Mountain);
        world.swap_grid(walled);

        assert_eq!(
            next_event(&mut ra).await,
            serde_json::json!({"type": "move_error", "message": "Path blocked."})
        );
        assert_eq!(alice.position(), Position::new(2, 0));
        assert_eq!(world.grid().locate("alice"), vec![Position::new(2, 0)]);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(ra.try_recv().is_err());
    }

    #[tokio::test]
    async fn walk_stops_when_reload_shrinks_the_grid() {
        let world = Arc::new(world_with(paced(40), Grid::new(10, 1)));
        let (alice, mut ra) = join(&world, "alice");
        world.start_walk(&alice, Position::new(9, 0)).unwrap();
        assert_eq!(next_event(&mut ra).await["position"]["x"], 1);

        world.swap_grid(Grid::new(2, 1));

        assert_eq!(next_event(&mut ra).await["message"], "Path blocked.");
        assert_eq!(alice.position(), Position::new(1, 0));
    }

    #[tokio::test]
    async fn walk_stops_when_reseated_off_its_route() {
        let world = Arc::new(world_with(paced(40), Grid::new(10, 10)));
        let (alice, mut ra) = join(&world, "alice");
        world.start_walk(&alice, Position::new(9, 0)).unwrap();
        assert_eq!(next_event(&mut ra).await["position"]["x"], 1);

        // (1,0) is outside a one-column grid; the closest open cell is the origin.
        world.swap_grid(Grid::new(1, 10));

        assert_eq!(next_event(&mut ra).await["message"], "Path blocked.");
        assert_eq!(alice.position(), Position::ORIGIN);
    }
}
