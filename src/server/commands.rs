//! Slash-command parsing and dispatch.
//!
//! [CommandParser] turns the text after `/` into a [Command]; missing
//! arguments parse to [Command::Usage] carrying the reply to send, so the
//! dispatcher never has to re-check arity. [CommandProcessor] owns the
//! per-line flow: throttle check, parse, run, reply. Lines that do not start
//! with `/` are chat.

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::logutil::escape_log;
use crate::metrics;
use crate::protocol::ServerEvent;
use crate::world::movement::Direction;
use crate::world::{ClientSession, Position, World};

pub const USAGE_MSG: &str = "Usage: /msg [username] [message]";
pub const USAGE_MUTE: &str = "Usage: /mute [username]";
pub const USAGE_UNMUTE: &str = "Usage: /unmute [username]";
pub const USAGE_CREATE: &str = "Usage: /create [channel_name]";
pub const USAGE_JOIN: &str = "Usage: /join [channel_name]";
pub const USAGE_SET_TITLE: &str = "Usage: /setChannelTitle [title]";
pub const USAGE_WHISPER: &str = "Usage: /whisper [username] [message]";
pub const USAGE_MOVE_TO: &str = "Usage: /moveTo [x] [y]";

pub const THROTTLED: &str = "You are sending commands too fast. Please slow down.";
pub const INVALID_COORDINATES: &str = "Invalid coordinates. Please enter integers.";
pub const MUTED: &str = "You are muted and cannot send messages.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Broadcast,
    Msg { target: String, text: String },
    List,
    Mute(String),
    Unmute(String),
    Create(String),
    Join(String),
    Part,
    SetChannelTitle(String),
    Step(Direction),
    Travel,
    Whisper { target: String, text: String },
    MoveTo(Position),
    Help,
    /// Known command with missing arguments; carries the usage line.
    Usage(&'static str),
    InvalidCoordinates,
    /// Unrecognised; carries the text after `/`.
    Unknown(String),
}

/// Slash-command parser. Names are case-sensitive (`setChannelTitle`, `moveTo`).
#[derive(Debug, Default)]
pub struct CommandParser;

impl CommandParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the text after the leading `/`.
    pub fn parse(&self, body: &str) -> Command {
        let args: Vec<&str> = body.split_whitespace().collect();
        let Some((&name, rest)) = args.split_first() else {
            return Command::Unknown(body.to_string());
        };
        let joined = |from: usize| rest[from..].join(" ");

        let command = match name {
            "broadcast" => Command::Broadcast,
            "list" => Command::List,
            "part" => Command::Part,
            "travel" => Command::Travel,
            "help" => Command::Help,
            "north" => Command::Step(Direction::North),
            "east" => Command::Step(Direction::East),
            "south" => Command::Step(Direction::South),
            "west" => Command::Step(Direction::West),
            "msg" if rest.len() >= 2 => Command::Msg {
                target: rest[0].to_string(),
                text: joined(1),
            },
            "msg" => Command::Usage(USAGE_MSG),
            "whisper" if rest.len() >= 2 => Command::Whisper {
                target: rest[0].to_string(),
                text: joined(1),
            },
            "whisper" => Command::Usage(USAGE_WHISPER),
            "mute" => rest.first().map_or(Command::Usage(USAGE_MUTE), |u| Command::Mute(u.to_string())),
            "unmute" => rest
                .first()
                .map_or(Command::Usage(USAGE_UNMUTE), |u| Command::Unmute(u.to_string())),
            "create" => rest
                .first()
                .map_or(Command::Usage(USAGE_CREATE), |c| Command::Create(c.to_string())),
            "join" => rest.first().map_or(Command::Usage(USAGE_JOIN), |c| Command::Join(c.to_string())),
            "setChannelTitle" if !rest.is_empty() => Command::SetChannelTitle(joined(0)),
            "setChannelTitle" => Command::Usage(USAGE_SET_TITLE),
            "moveTo" if rest.len() >= 2 => match (rest[0].parse::<i32>(), rest[1].parse::<i32>()) {
                (Ok(x), Ok(y)) => Command::MoveTo(Position::new(x, y)),
                _ => Command::InvalidCoordinates,
            },
            "moveTo" => Command::Usage(USAGE_MOVE_TO),
            _ => Command::Unknown(body.to_string()),
        };
        trace!("Parsed {:?} from '{}'", command, escape_log(body));
        command
    }
}

/// Runs one session's input lines against the world.
pub struct CommandProcessor {
    world: Arc<World>,
    parser: CommandParser,
}

impl CommandProcessor {
    pub fn new(world: Arc<World>) -> Self {
        Self {
            world,
            parser: CommandParser::new(),
        }
    }

    /// Handle one input line (without its newline).
    pub fn handle_line(&self, session: &Arc<ClientSession>, line: &str) {
        match line.strip_prefix('/') {
            Some(body) => {
                if !session.allow_command() {
                    metrics::inc_commands_throttled();
                    warn!("Throttled {}", session.username());
                    session.send_text(THROTTLED);
                    return;
                }
                metrics::inc_commands_dispatched();
                let command = self.parser.parse(body);
                self.dispatch(session, command);
            }
            None => self.chat(session, line),
        }
    }

    fn dispatch(&self, session: &Arc<ClientSession>, command: Command) {
        let world = &self.world;
        let me = session.username();
        match command {
            Command::Broadcast => {
                world
                    .clients()
                    .broadcast_text(&format!("{} has requested a broadcast!", me), None);
            }
            Command::Msg { target, text } => match world.clients().lookup(&target) {
                Some(to) => {
                    if !to.is_ignoring(me) {
                        to.send_text(&format!("(Private) {}: {}", me, text));
                    }
                }
                None => self.not_found(session, &target),
            },
            Command::List => {
                session.send_text("Connected users:");
                for name in world.clients().usernames() {
                    session.send_text(&format!(" - {}", name));
                }
            }
            Command::Mute(target) => {
                let event = match session.mute_user(&target) {
                    Ok(()) => ServerEvent::success(format!("Muted {}", target)),
                    Err(e) => ServerEvent::failure(e.to_string()),
                };
                session.send_event(&event);
            }
            Command::Unmute(target) => {
                let event = match session.unmute_user(&target) {
                    Ok(()) => ServerEvent::success(format!("Unmuted {}", target)),
                    Err(e) => ServerEvent::failure(e.to_string()),
                };
                session.send_event(&event);
            }
            Command::Create(name) => {
                let reply = match world.channels().create(&name) {
                    Ok(_) => format!("Channel '{}' created.", name),
                    Err(e) => e.to_string(),
                };
                session.send_text(&reply);
            }
            Command::Join(name) => {
                let reply = match world.channels().join(session, &name) {
                    Ok(_) => format!("You have joined the channel '{}'.", name),
                    Err(e) => e.to_string(),
                };
                session.send_text(&reply);
            }
            Command::Part => {
                let reply = match world.channels().leave(session) {
                    Ok(channel) => format!("You have left the channel '{}'.", channel.name()),
                    Err(e) => e.to_string(),
                };
                session.send_text(&reply);
            }
            Command::SetChannelTitle(title) => {
                let reply = match world.channels().set_title(session, &title) {
                    Ok(_) => format!("Channel title set to '{}'.", title),
                    Err(e) => e.to_string(),
                };
                session.send_text(&reply);
            }
            Command::Step(direction) => {
                // Failures are already reported to the mover.
                let _ = world.step(session, direction);
            }
            Command::Travel => match world.travel().issue(world.server_name(), me) {
                Ok(token) => {
                    session.send_text(&format!("Travel token: {}", token));
                }
                Err(e) => {
                    warn!("Travel token for {} failed: {}", me, e);
                    session.send_text("Error generating travel token.");
                }
            },
            Command::Whisper { target, text } => match world.clients().lookup(&target) {
                Some(to) => {
                    if !to.is_ignoring(me) {
                        to.send_event(&ServerEvent::Whisper {
                            from: me.to_string(),
                            message: text,
                        });
                    }
                    session.send_text("Message sent.");
                }
                None => self.not_found(session, &target),
            },
            Command::MoveTo(target) => {
                let _ = world.start_walk(session, target);
            }
            Command::Help => {
                session.send_event(&ServerEvent::Help);
            }
            Command::Usage(usage) => {
                session.send_text(usage);
            }
            Command::InvalidCoordinates => {
                session.send_text(INVALID_COORDINATES);
            }
            Command::Unknown(body) => {
                session.send_text(&format!("Unknown command: /{}", body));
            }
        }
    }

    fn not_found(&self, session: &ClientSession, target: &str) {
        session.send_text(&format!("User '{}' not found.", target));
    }

    /// Plain text: channel chat when in a channel, otherwise echoed back.
    fn chat(&self, session: &ClientSession, text: &str) {
        if session.is_muted() {
            session.send_text(MUTED);
            return;
        }
        match session.channel() {
            Some(channel) => {
                let line = format!("[#{}] {}: {}", channel.name(), session.username(), text);
                let delivered = channel.broadcast_to_members(session, &line);
                debug!(
                    "{} -> #{} ({} recipients): {}",
                    session.username(),
                    channel.name(),
                    delivered,
                    escape_log(text)
                );
            }
            None => {
                session.send_text(&format!("{}: {}", session.username(), text));
            }
        }
    }
}
