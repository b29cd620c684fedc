//! Command table and the shared argument parser.
//!
//! Each command declares who may run it and the shape of its arguments; the
//! processor checks access, parses the arguments once with [`parse_args`] and
//! only then calls the handler.

use crate::errors::CommandError;
use crate::model::{Role, User};
use crate::processor::{CommandProcessor, CommandResult, Ctx};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Largest amount or id accepted from chat input.
pub const MAX_NUMBER: i64 = i32::MAX as i64;

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@?([A-Za-z0-9_]{1,32})$").expect("valid handle regex"));
static INVITE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^team_(\d{1,18})$").expect("valid invite regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anyone,
    Unregistered,
    Registered,
    Athlete,
    Coach,
}

impl Access {
    pub fn allows(&self, sender: Option<&User>) -> bool {
        match (self, sender) {
            (Access::Anyone, _) => true,
            (Access::Unregistered, sender) => sender.is_none(),
            (Access::Registered, sender) => sender.is_some(),
            (Access::Athlete, Some(user)) => user.role == Role::Athlete,
            (Access::Coach, Some(user)) => user.role == Role::Coach,
            (Access::Athlete | Access::Coach, None) => false,
        }
    }

    pub fn check(&self, command: &str, sender: Option<&User>) -> Result<(), CommandError> {
        if self.allows(sender) {
            return Ok(());
        }
        let msg = match (self, sender) {
            (Access::Unregistered, Some(user)) => {
                format!("You are already registered as {}.", user.role)
            }
            (_, None) => "Register first: send /start.".to_string(),
            (Access::Athlete, Some(_)) => format!("/{command} is available to athletes only."),
            (Access::Coach, Some(_)) => format!("/{command} is available to coaches only."),
            _ => format!("You cannot use /{command}."),
        };
        Err(CommandError::unauthorized(msg))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Whole number in `1..=MAX_NUMBER`.
    PositiveInt,
    /// Telegram handle, `@` optional. Stored without the `@`.
    Handle,
    /// A single token.
    Word,
    /// The rest of the line.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

const fn req(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required: true,
    }
}

const fn opt(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required: false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Int(i64),
    Text(String),
}

/// Parsed arguments, positionally matching the command's `ArgSpec`s.
/// Optional arguments that were not given are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(Vec<Option<ArgValue>>);

impl Args {
    pub fn int(&self, idx: usize) -> Option<i64> {
        match self.0.get(idx) {
            Some(Some(ArgValue::Int(n))) => Some(*n),
            _ => None,
        }
    }

    pub fn text(&self, idx: usize) -> Option<&str> {
        match self.0.get(idx) {
            Some(Some(ArgValue::Text(s))) => Some(s.as_str()),
            _ => None,
        }
    }
}

pub type Handler = for<'a> fn(&'a CommandProcessor, Ctx<'a>) -> BoxFuture<'a, CommandResult>;

pub struct CommandSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub access: Access,
    pub args: &'static [ArgSpec],
    pub handler: Handler,
}

impl CommandSpec {
    pub fn usage(&self) -> String {
        let mut usage = format!("/{}", self.name);
        for arg in self.args {
            let shown = match arg.kind {
                ArgKind::Handle => format!("@{}", arg.name),
                ArgKind::Text => format!("{}…", arg.name),
                _ => arg.name.to_string(),
            };
            if arg.required {
                usage.push_str(&format!(" <{shown}>"));
            } else {
                usage.push_str(&format!(" [{shown}]"));
            }
        }
        usage
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

macro_rules! handler {
    ($method:ident) => {{
        fn run<'a>(p: &'a CommandProcessor, cx: Ctx<'a>) -> BoxFuture<'a, CommandResult> {
            Box::pin(p.$method(cx))
        }
        run as Handler
    }};
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "start",
        summary: "greeting, or join a team from an invite link",
        access: Access::Anyone,
        args: &[opt("invite", ArgKind::Word)],
        handler: handler!(start),
    },
    CommandSpec {
        name: "help",
        summary: "list the commands available to you",
        access: Access::Anyone,
        args: &[],
        handler: handler!(help),
    },
    CommandSpec {
        name: "athlete",
        summary: "register as an athlete",
        access: Access::Unregistered,
        args: &[],
        handler: handler!(register_athlete),
    },
    CommandSpec {
        name: "coach",
        summary: "register as a coach",
        access: Access::Unregistered,
        args: &[req("secret", ArgKind::Word)],
        handler: handler!(register_coach),
    },
    CommandSpec {
        name: "request",
        summary: "ask your coach for points",
        access: Access::Athlete,
        args: &[req("points", ArgKind::PositiveInt), req("reason", ArgKind::Text)],
        handler: handler!(request_points),
    },
    CommandSpec {
        name: "my_score",
        summary: "show your score",
        access: Access::Athlete,
        args: &[],
        handler: handler!(my_score),
    },
    CommandSpec {
        name: "ranking",
        summary: "show the leaderboard",
        access: Access::Registered,
        args: &[opt("team id", ArgKind::PositiveInt)],
        handler: handler!(ranking),
    },
    CommandSpec {
        name: "history",
        summary: "show settled points (coaches name an athlete)",
        access: Access::Registered,
        args: &[opt("athlete", ArgKind::Handle)],
        handler: handler!(history),
    },
    CommandSpec {
        name: "pending",
        summary: "list requests awaiting approval",
        access: Access::Coach,
        args: &[opt("team id", ArgKind::PositiveInt)],
        handler: handler!(pending),
    },
    CommandSpec {
        name: "approve",
        summary: "approve a request",
        access: Access::Coach,
        args: &[req("request id", ArgKind::PositiveInt)],
        handler: handler!(approve),
    },
    CommandSpec {
        name: "reject",
        summary: "reject and delete a request",
        access: Access::Coach,
        args: &[req("request id", ArgKind::PositiveInt)],
        handler: handler!(reject),
    },
    CommandSpec {
        name: "give",
        summary: "give points to an athlete directly",
        access: Access::Coach,
        args: &[
            req("points", ArgKind::PositiveInt),
            req("athlete", ArgKind::Handle),
            req("reason", ArgKind::Text),
        ],
        handler: handler!(give),
    },
    CommandSpec {
        name: "athletes",
        summary: "list athletes",
        access: Access::Coach,
        args: &[opt("team id", ArgKind::PositiveInt)],
        handler: handler!(athletes),
    },
    CommandSpec {
        name: "teams",
        summary: "list teams",
        access: Access::Coach,
        args: &[],
        handler: handler!(teams),
    },
    CommandSpec {
        name: "create_team",
        summary: "create a team",
        access: Access::Coach,
        args: &[req("name", ArgKind::Text)],
        handler: handler!(create_team),
    },
    CommandSpec {
        name: "delete_team",
        summary: "delete a team (members keep their accounts)",
        access: Access::Coach,
        args: &[req("team id", ArgKind::PositiveInt)],
        handler: handler!(delete_team),
    },
    CommandSpec {
        name: "assign_team",
        summary: "move an athlete into a team",
        access: Access::Coach,
        args: &[req("athlete", ArgKind::Handle), req("team id", ArgKind::PositiveInt)],
        handler: handler!(assign_team),
    },
    CommandSpec {
        name: "invite",
        summary: "get a sign-up link for a team",
        access: Access::Coach,
        args: &[req("team id", ArgKind::PositiveInt)],
        handler: handler!(invite),
    },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static CommandSpec>> =
    Lazy::new(|| COMMANDS.iter().map(|spec| (spec.name, spec)).collect());

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    BY_NAME.get(name).copied()
}

/// Split `/name@Bot rest` into a lowercase command name and the raw rest.
/// Returns `None` for text that is not a command.
pub fn split_command(text: &str) -> Option<(String, &str)> {
    let trimmed = text.trim_start();
    let body = trimmed.strip_prefix('/')?;
    let (head, rest) = match body.find(char::is_whitespace) {
        Some(pos) => (&body[..pos], &body[pos..]),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some((name.to_lowercase(), rest))
}

/// Parse the text after the command name according to the command's argument
/// shape.
pub fn parse_args(spec: &CommandSpec, rest: &str) -> Result<Args, CommandError> {
    let usage = || CommandError::validation(format!("Usage: {}", spec.usage()));

    let mut values = Vec::with_capacity(spec.args.len());
    let mut rest = rest.trim();
    for arg in spec.args {
        if rest.is_empty() {
            if arg.required {
                return Err(usage());
            }
            values.push(None);
            continue;
        }
        let raw = if arg.kind == ArgKind::Text {
            std::mem::take(&mut rest)
        } else {
            let (token, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            rest = tail.trim_start();
            token
        };
        values.push(Some(parse_value(arg, raw)?));
    }
    if !rest.is_empty() {
        return Err(usage());
    }
    Ok(Args(values))
}

fn parse_value(arg: &ArgSpec, raw: &str) -> Result<ArgValue, CommandError> {
    match arg.kind {
        ArgKind::PositiveInt => {
            let n: i64 = raw.parse().map_err(|_| {
                CommandError::validation(format!("{} must be a positive whole number.", arg.name))
            })?;
            if n <= 0 {
                return Err(CommandError::validation(format!(
                    "{} must be greater than zero.",
                    arg.name
                )));
            }
            if n > MAX_NUMBER {
                return Err(CommandError::validation(format!("{} is too large.", arg.name)));
            }
            Ok(ArgValue::Int(n))
        }
        ArgKind::Handle => HANDLE_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| ArgValue::Text(m.as_str().to_string()))
            .ok_or_else(|| {
                CommandError::validation(format!(
                    "{} must be a Telegram handle like @alice.",
                    arg.name
                ))
            }),
        ArgKind::Word | ArgKind::Text => Ok(ArgValue::Text(raw.to_string())),
    }
}

/// `/start` payload carried by a team invite link.
pub fn invite_payload(team_id: i64) -> String {
    format!("team_{team_id}")
}

pub fn parse_invite_payload(payload: &str) -> Option<i64> {
    INVITE_RE
        .captures(payload)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> &'static CommandSpec {
        lookup(name).unwrap()
    }

    #[test]
    fn every_command_is_reachable_by_name() {
        for cmd in COMMANDS {
            assert_eq!(lookup(cmd.name).unwrap().name, cmd.name);
        }
        assert_eq!(BY_NAME.len(), COMMANDS.len());
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn split_handles_bot_suffix_and_case() {
        assert_eq!(
            split_command("/Give@PointsBot 5 @a  nice heat"),
            Some(("give".to_string(), " 5 @a  nice heat"))
        );
        assert_eq!(split_command("  /ranking"), Some(("ranking".to_string(), "")));
        assert_eq!(split_command("hello"), None);
        assert_eq!(split_command("/"), None);
        assert_eq!(split_command("/@bot"), None);
    }

    #[test]
    fn request_takes_amount_and_rest_of_line() {
        let args = parse_args(spec("request"), "  10   heat  win ").unwrap();
        assert_eq!(args.int(0), Some(10));
        assert_eq!(args.text(1), Some("heat  win"));
    }

    #[test]
    fn give_parses_handle_without_at() {
        let args = parse_args(spec("give"), "5 @Alice_1 great paddle out").unwrap();
        assert_eq!(args.int(0), Some(5));
        assert_eq!(args.text(1), Some("Alice_1"));
        assert_eq!(args.text(2), Some("great paddle out"));
    }

    #[test]
    fn numeric_arguments_must_be_positive_integers() {
        for bad in ["abc 1", "0 reason", "-4 reason", "1.5 reason", "99999999999 reason"] {
            let err = parse_args(spec("request"), bad).unwrap_err();
            assert!(matches!(err, CommandError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn missing_required_argument_reports_usage() {
        let err = parse_args(spec("request"), "10").unwrap_err();
        assert_eq!(err.to_string(), "Usage: /request <points> <reason…>");
        let err = parse_args(spec("give"), "").unwrap_err();
        assert_eq!(err.to_string(), "Usage: /give <points> <@athlete> <reason…>");
    }

    #[test]
    fn extra_tokens_are_rejected() {
        assert!(parse_args(spec("approve"), "4 5").is_err());
        assert!(parse_args(spec("my_score"), "now").is_err());
    }

    #[test]
    fn optional_arguments_may_be_omitted() {
        let args = parse_args(spec("ranking"), "").unwrap();
        assert_eq!(args, Args(vec![None]));
        assert_eq!(args.int(0), None);
        let args = parse_args(spec("ranking"), "3").unwrap();
        assert_eq!(args.int(0), Some(3));
    }

    #[test]
    fn bad_handles_are_rejected() {
        let err = parse_args(spec("history"), "@not-a-handle").unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
    }

    #[test]
    fn invite_payload_round_trip() {
        assert_eq!(parse_invite_payload(&invite_payload(42)), Some(42));
        assert_eq!(parse_invite_payload("team_"), None);
        assert_eq!(parse_invite_payload("club_3"), None);
    }

    #[test]
    fn access_rules() {
        let athlete = User::new(1, "A", Some("a"), Role::Athlete);
        let coach = User::new(2, "C", Some("c"), Role::Coach);

        assert!(Access::Unregistered.allows(None));
        assert!(!Access::Unregistered.allows(Some(&athlete)));
        assert!(Access::Athlete.allows(Some(&athlete)));
        assert!(!Access::Athlete.allows(Some(&coach)));
        assert!(!Access::Coach.allows(None));
        assert!(Access::Registered.allows(Some(&coach)));

        let err = Access::Coach.check("approve", Some(&athlete)).unwrap_err();
        assert!(matches!(err, CommandError::Unauthorized(_)));
        let err = Access::Athlete.check("request", None).unwrap_err();
        assert_eq!(err.to_string(), "Register first: send /start.");
    }
}
