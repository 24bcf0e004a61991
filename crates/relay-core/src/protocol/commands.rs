//! Text commands sent from the client to the relay.
//!
//! Unlike server messages, client commands are plain text lines.  A command
//! may be prefixed with an identifier in parentheses; the server echoes that
//! identifier as the message id of its reply, which is how replies find their
//! handler in the dispatch table.
//!
//! ```text
//! (buffer_init) hdata buffer:gui_buffers(*) number,name,...\n
//! ```

use crate::protocol::messages::Pointer;

/// Request identifiers the client tags its own requests with.
pub mod request_ids {
    pub const BUFFER_INIT: &str = "buffer_init";
    pub const FIRST_LINES: &str = "first_lines";
    pub const HOTLIST_INIT: &str = "hotlist_init";
    pub const NICKLIST_INIT: &str = "nicklist_init";
    pub const FETCH_LINES: &str = "fetch_lines";
    pub const HOTLIST: &str = "hotlist";
}

const BUFFER_KEYS: &str = "number,name,full_name,short_name,title,hidden,type,local_variables";
const LINE_KEYS: &str = "date,date_printed,displayed,prefix,message,highlight,tags_array,notify_level";

/// A command the client can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticates and negotiates compression.  Must be sent first.
    Init { password: String, compression: bool },
    /// Requests the full buffer list.
    RequestBuffers,
    /// Requests the most recent line of every buffer.
    RequestFirstLines,
    /// Requests the hotlist; `initial` selects the handshake identifier.
    RequestHotlist { initial: bool },
    /// Requests nicklists of every buffer.
    RequestNicklist,
    /// Subscribes to server-side events for every buffer.
    Sync,
    /// Requests the last `count` lines of one buffer.
    FetchLines { buffer: Pointer, count: usize },
    /// Sends text (or a `/command`) to a buffer.
    Input { buffer: Pointer, text: String },
    /// Keepalive; the server answers with `_pong` carrying the same token.
    Ping { token: String },
    /// Closes the connection cleanly.
    Quit,
}

impl Command {
    /// Renders the command as the newline-terminated line sent on the wire.
    pub fn to_line(&self) -> String {
        match self {
            Command::Init {
                password,
                compression,
            } => format!(
                "init password={},compression={}\n",
                escape_init_value(password),
                if *compression { "zlib" } else { "off" }
            ),
            Command::RequestBuffers => format!(
                "({}) hdata buffer:gui_buffers(*) {BUFFER_KEYS}\n",
                request_ids::BUFFER_INIT
            ),
            Command::RequestFirstLines => format!(
                "({}) hdata buffer:gui_buffers(*)/own_lines/last_line(-1)/data {LINE_KEYS}\n",
                request_ids::FIRST_LINES
            ),
            Command::RequestHotlist { initial } => format!(
                "({}) hdata hotlist:gui_hotlist(*)\n",
                if *initial {
                    request_ids::HOTLIST_INIT
                } else {
                    request_ids::HOTLIST
                }
            ),
            Command::RequestNicklist => format!("({}) nicklist\n", request_ids::NICKLIST_INIT),
            Command::Sync => "sync\n".to_string(),
            Command::FetchLines { buffer, count } => format!(
                "({}) hdata buffer:{buffer}/own_lines/last_line(-{count})/data {LINE_KEYS}\n",
                request_ids::FETCH_LINES
            ),
            Command::Input { buffer, text } => {
                // A newline would end the command early and inject a second one.
                let single_line = text.replace(['\r', '\n'], " ");
                format!("input {buffer} {single_line}\n")
            }
            Command::Ping { token } => format!("ping {token}\n"),
            Command::Quit => "quit\n".to_string(),
        }
    }

    /// The commands sent right after `init`, in order.
    pub fn handshake_sequence() -> Vec<Command> {
        vec![
            Command::RequestBuffers,
            Command::RequestFirstLines,
            Command::RequestHotlist { initial: true },
            Command::RequestNicklist,
            Command::Sync,
        ]
    }
}

/// Escapes commas in an `init` option value (`,` separates options).
pub fn escape_init_value(value: &str) -> String {
    value.replace(',', "\\,")
}
