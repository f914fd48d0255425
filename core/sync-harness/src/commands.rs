//! Line-oriented commands and their JSON replies.
//!
//! Each input line is one command; each reply is one JSON object on stdout:
//! `{"ok": true, "data": ...}` or `{"ok": false, "error": {"code", "message"}}`.

use bookmark_sync::{AuthUser, LoopbackBackend, NewRecord, SyncEngine, SyncError};
use bookmark_sync_protocol::ErrorInfo;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Status,
    Add { url: String, title: String },
    Delete { id: String },
    Login,
    Logout,
    RemoteAdd { url: String, title: String },
    RemoteDelete { id: String },
    Help,
    Quit,
}

pub const HELP: &str = "commands: list | status | add <url> <title...> | delete <id> | \
login | logout | remote-add <url> <title...> | remote-delete <id> | help | quit";

pub fn parse_command(line: &str) -> Result<Command, ErrorInfo> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "list" | "ls" => Ok(Command::List),
        "status" => Ok(Command::Status),
        "add" => {
            let (url, title) = split_url_title(rest)?;
            Ok(Command::Add { url, title })
        }
        "delete" | "rm" => Ok(Command::Delete {
            id: require_arg(rest, "id")?,
        }),
        "login" => Ok(Command::Login),
        "logout" => Ok(Command::Logout),
        "remote-add" => {
            let (url, title) = split_url_title(rest)?;
            Ok(Command::RemoteAdd { url, title })
        }
        "remote-delete" => Ok(Command::RemoteDelete {
            id: require_arg(rest, "id")?,
        }),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err(ErrorInfo::new("empty_command", "command was empty")),
        other => Err(ErrorInfo::new(
            "unknown_command",
            format!("unknown command: {}", other),
        )),
    }
}

fn split_url_title(rest: &str) -> Result<(String, String), ErrorInfo> {
    match rest.split_once(char::is_whitespace) {
        Some((url, title)) if !title.trim().is_empty() => {
            Ok((url.to_string(), title.trim().to_string()))
        }
        _ => Err(ErrorInfo::new("invalid_args", "usage: <url> <title...>")),
    }
}

fn require_arg(rest: &str, name: &str) -> Result<String, ErrorInfo> {
    if rest.is_empty() {
        return Err(ErrorInfo::new("invalid_args", format!("{} is required", name)));
    }
    Ok(rest.to_string())
}

#[derive(Debug, Serialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorInfo) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(
                r#"{{"ok":false,"error":{{"code":"serialization_error","message":"{}"}}}}"#,
                err
            )
        })
    }
}

fn sync_error_info(err: &SyncError) -> ErrorInfo {
    let code = match err {
        SyncError::Auth(_) | SyncError::AuthTimeout(_) => "auth_error",
        SyncError::NotAuthenticated => "not_authenticated",
        SyncError::Fetch { .. } => "fetch_error",
        SyncError::Validation { .. } => "validation_error",
        SyncError::Mutation { .. } => "mutation_error",
        SyncError::Channel { .. } => "channel_error",
        SyncError::ConfigMalformed { .. }
        | SyncError::ConfigRead { .. }
        | SyncError::HomeDirNotFound => "config_error",
    };
    ErrorInfo::new(code, err.to_string())
}

/// Everything a command needs: the engine, plus the loopback backend acting
/// as the auth provider and as other devices.
pub struct Session<'a> {
    pub engine: &'a SyncEngine,
    pub backend: &'a LoopbackBackend,
    pub user: &'a AuthUser,
}

impl Session<'_> {
    pub async fn execute(&self, command: Command) -> Reply {
        match command {
            Command::List => Reply::ok(json!(self.engine.bookmarks())),
            Command::Status => Reply::ok(self.status()),
            Command::Add { url, title } => {
                self.mutation(self.engine.add_bookmark(&title, &url).await)
            }
            Command::Delete { id } => self.mutation(self.engine.delete_bookmark(&id).await),
            Command::Login => {
                if let Err(err) = self.engine.login().await {
                    return Reply::error(sync_error_info(&err));
                }
                // The loopback provider completes the redirect immediately.
                self.backend.set_session(Some(self.user.clone()));
                let session = self.engine.complete_login().await;
                Reply::ok(json!(session))
            }
            Command::Logout => Reply::ok(json!(self.engine.logout().await)),
            Command::RemoteAdd { url, title } => {
                let record = self.backend.remote_insert(
                    self.engine.collection(),
                    NewRecord {
                        title,
                        url,
                        user_id: self.user.user_id.clone(),
                    },
                );
                Reply::ok(json!(record))
            }
            Command::RemoteDelete { id } => {
                let removed = self.backend.remote_delete(self.engine.collection(), &id);
                Reply::ok(json!({ "removed": removed }))
            }
            Command::Help => Reply::ok(json!(HELP)),
            Command::Quit => Reply::ok(json!({ "bye": true })),
        }
    }

    fn mutation(&self, result: bookmark_sync::Result<()>) -> Reply {
        match result {
            Ok(()) => Reply::ok(json!({ "submitted": true })),
            Err(err) => Reply::error(sync_error_info(&err)),
        }
    }

    fn status(&self) -> Value {
        json!({
            "session": self.engine.session(),
            "sync": self.engine.status(),
            "bookmarks": self.engine.bookmarks().len(),
            "collection": self.engine.collection(),
        })
    }
}
