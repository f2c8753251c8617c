//! Outbound wire protocol.
//!
//! Every structured line the server writes is a [ServerEvent] encoded by
//! [ServerEvent::encode]. Handlers never build JSON by hand, so each event
//! kind has exactly one shape on the wire. Plain-text replies (usage strings,
//! chat lines, notices) travel as [Outbound::Line] without going through
//! this enum.

use serde::Serialize;
use serde_json::{json, Value};

use crate::world::grid::{CellView, Position};

/// One entry of the `/help` catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HelpEntry {
    pub command: &'static str,
    pub description: &'static str,
}

/// The static command catalogue returned by `/help`.
pub const HELP_CATALOGUE: &[HelpEntry] = &[
    HelpEntry { command: "/help", description: "Show this help message." },
    HelpEntry { command: "/list", description: "List all connected users." },
    HelpEntry { command: "/broadcast", description: "Announce a broadcast request to everyone." },
    HelpEntry { command: "/msg [username] [message]", description: "Send a private message to the specified user." },
    HelpEntry { command: "/whisper [username] [message]", description: "Whisper to the specified user." },
    HelpEntry { command: "/mute [username]", description: "Ignore messages from the specified user." },
    HelpEntry { command: "/unmute [username]", description: "Stop ignoring the specified user." },
    HelpEntry { command: "/create [channel_name]", description: "Create a new channel." },
    HelpEntry { command: "/join [channel_name]", description: "Join a channel, leaving your current one." },
    HelpEntry { command: "/part", description: "Leave your current channel." },
    HelpEntry { command: "/setChannelTitle [title]", description: "Set the title of your current channel." },
    HelpEntry { command: "/north, /east, /south, /west", description: "Move to an adjacent cell." },
    HelpEntry { command: "/moveTo [x] [y]", description: "Walk to a cell along the shortest open path." },
    HelpEntry { command: "/travel", description: "Generate a token to travel to another server." },
];

/// Outbound structured events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Acknowledges a single-step move (or admin teleport) to the mover.
    MoveAck { username: String, position: Position },
    /// Tells everyone else that a client changed cells.
    UserMoved { username: String, position: Position },
    /// One step of a scheduled walk, sent to every client.
    WalkStep { username: String, position: Position },
    /// Movement validation failure.
    Error { msg: String },
    /// Walk could not start or could not continue.
    MoveError { message: String },
    /// Success/error notice for local ignore-list changes.
    Notice { success: bool, message: String },
    Whisper { from: String, message: String },
    Help,
    /// Private message relayed from another server by the control plane.
    PrivateMessage { from: String, from_server: String, message: String },
    CellMessage { message: String },
    /// Public announcement about a user (e.g. a kick).
    Announcement { username: String, message: String },
    Kicked { message: String },
    /// Pre-built JSON forwarded verbatim by the control plane.
    Payload(Value),
    /// Full grid, rows indexed by `y`.
    GridSnapshot(Vec<Vec<CellView>>),
}

impl ServerEvent {
    pub fn error(msg: impl Into<String>) -> Self {
        ServerEvent::Error { msg: msg.into() }
    }

    pub fn move_error(message: impl Into<String>) -> Self {
        ServerEvent::MoveError { message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        ServerEvent::Notice { success: true, message: message.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ServerEvent::Notice { success: false, message: message.into() }
    }

    fn to_value(&self) -> Value {
        match self {
            ServerEvent::MoveAck { username, position } => json!({
                "action": "move",
                "username": username,
                "x": position.x,
                "y": position.y,
            }),
            ServerEvent::UserMoved { username, position } => json!({
                "action": "user_moved",
                "username": username,
                "x": position.x,
                "y": position.y,
            }),
            ServerEvent::WalkStep { username, position } => json!({
                "type": "move",
                "username": username,
                "position": { "x": position.x, "y": position.y },
            }),
            ServerEvent::Error { msg } => json!({ "type": "error", "msg": msg }),
            ServerEvent::MoveError { message } => json!({ "type": "move_error", "message": message }),
            ServerEvent::Notice { success, message } => json!({
                "type": if *success { "success" } else { "error" },
                "message": message,
            }),
            ServerEvent::Whisper { from, message } => json!({
                "type": "whisper",
                "from": from,
                "message": message,
            }),
            ServerEvent::Help => json!({ "type": "help", "commands": HELP_CATALOGUE }),
            ServerEvent::PrivateMessage { from, from_server, message } => json!({
                "type": "private_message",
                "from": from,
                "fromServer": from_server,
                "message": message,
            }),
            ServerEvent::CellMessage { message } => json!({ "type": "cell_message", "message": message }),
            ServerEvent::Announcement { username, message } => json!({
                "action": "announcement",
                "username": username,
                "message": message,
            }),
            ServerEvent::Kicked { message } => json!({ "action": "kicked", "message": message }),
            ServerEvent::Payload(value) => value.clone(),
            ServerEvent::GridSnapshot(rows) => json!(rows),
        }
    }

    /// Encode as one newline-terminated JSON line.
    pub fn encode(&self) -> String {
        let mut line = self.to_value().to_string();
        line.push('\n');
        line
    }
}

/// Messages queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Raw bytes for the socket; always newline-terminated.
    Line(String),
    /// Flush what is queued, then shut the write half down.
    Close,
}

impl Outbound {
    pub fn text(text: &str) -> Self {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        if !line.ends_with('\n') {
            line.push('\n');
        }
        Outbound::Line(line)
    }

    pub fn event(event: &ServerEvent) -> Self {
        Outbound::Line(event.encode())
    }
}
