//! Command processor: one inbound chat command in, outbound messages out.
//!
//! The processor knows nothing about Telegram. It receives the sender's chat
//! id, name, handle and raw text, runs at most one repository operation chain,
//! and returns the reply for the sender plus, for approve/reject/give, one
//! notification for the athlete concerned.

use crate::commands::{self, CommandSpec, COMMANDS};
use crate::db::{self, Pool};
use crate::errors::CommandError;
use crate::format;
use crate::model::{Role, User};
use tracing::{info, instrument, warn, Span};

/// Longest team name accepted by `/create_team`.
pub const MAX_TEAM_NAME: usize = 64;

/// A text message received from a user in a private chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub chat_id: i64,
    pub name: String,
    pub username: Option<String>,
    pub text: String,
}

/// URL button attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub chat_id: i64,
    pub text: String,
    pub link: Option<InviteLink>,
}

impl Outbound {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            link: None,
        }
    }
}

/// What a handler produced for a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    text: String,
    link: Option<InviteLink>,
    notify: Option<Outbound>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
            notify: None,
        }
    }

    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.link = Some(InviteLink {
            label: label.into(),
            url: url.into(),
        });
        self
    }

    pub fn notifying(mut self, chat_id: i64, text: impl Into<String>) -> Self {
        self.notify = Some(Outbound::text(chat_id, text));
        self
    }

    fn into_outbound(self, chat_id: i64) -> Vec<Outbound> {
        let mut out = vec![Outbound {
            chat_id,
            text: self.text,
            link: self.link,
        }];
        out.extend(self.notify);
        out
    }
}

pub type CommandResult = Result<Reply, CommandError>;

/// Per-command context handed to a handler after access and argument checks.
pub struct Ctx<'a> {
    pub inbound: &'a Inbound,
    pub sender: Option<User>,
    pub args: commands::Args,
}

impl Ctx<'_> {
    fn chat_id(&self) -> i64 {
        self.inbound.chat_id
    }

    fn new_user(&self, role: Role) -> User {
        User::new(
            self.inbound.chat_id,
            self.inbound.name.as_str(),
            self.inbound.username.as_deref(),
            role,
        )
    }

    /// Access has been checked, so role-gated handlers always have a sender.
    fn sender(&self) -> Result<&User, CommandError> {
        self.sender
            .as_ref()
            .ok_or_else(|| CommandError::unauthorized("Register first: send /start."))
    }

    fn required_int(&self, idx: usize) -> Result<i64, CommandError> {
        self.args
            .int(idx)
            .ok_or_else(|| CommandError::validation("missing number"))
    }

    fn required_text(&self, idx: usize) -> Result<&str, CommandError> {
        self.args
            .text(idx)
            .ok_or_else(|| CommandError::validation("missing argument"))
    }
}

pub struct CommandProcessor {
    pool: Pool,
    coach_secret: String,
    bot_username: String,
}

impl CommandProcessor {
    pub fn new(pool: Pool, coach_secret: impl Into<String>, bot_username: impl Into<String>) -> Self {
        Self {
            pool,
            coach_secret: coach_secret.into(),
            bot_username: bot_username.into(),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Handle one inbound message. Never fails: errors become a reply.
    #[instrument(skip_all, fields(chat_id = inbound.chat_id, command = tracing::field::Empty))]
    pub async fn process(&self, inbound: &Inbound) -> Vec<Outbound> {
        let spec = commands::split_command(&inbound.text)
            .and_then(|(name, rest)| commands::lookup(&name).map(|spec| (spec, rest)));
        let Some((spec, rest)) = spec else {
            return vec![Outbound::text(
                inbound.chat_id,
                "❓ Unknown command. Send /help to see what I can do.",
            )];
        };
        Span::current().record("command", spec.name);

        match self.run(spec, inbound, rest).await {
            Ok(reply) => reply.into_outbound(inbound.chat_id),
            Err(err) => {
                match &err {
                    CommandError::Store(source) => warn!(?source, "command failed"),
                    other => info!(reason = %other, "command refused"),
                }
                vec![Outbound::text(inbound.chat_id, err.user_message())]
            }
        }
    }

    async fn run(&self, spec: &CommandSpec, inbound: &Inbound, rest: &str) -> CommandResult {
        let mut sender = db::get_user_by_id(&self.pool, inbound.chat_id).await?;
        if let Some(user) = sender.as_mut() {
            self.refresh_profile(user, inbound).await;
        }
        spec.access.check(spec.name, sender.as_ref())?;
        let args = commands::parse_args(spec, rest)?;
        (spec.handler)(
            self,
            Ctx {
                inbound,
                sender,
                args,
            },
        )
        .await
    }

    /// Keep the stored name and handle in step with what Telegram reports.
    /// A failed update is logged and the command goes on.
    async fn refresh_profile(&self, user: &mut User, inbound: &Inbound) {
        if user.name == inbound.name && user.username == inbound.username {
            return;
        }
        let updated = db::update_profile(
            &self.pool,
            user.id,
            &inbound.name,
            inbound.username.as_deref(),
        )
        .await;
        match updated {
            Ok(_) => {
                user.name = inbound.name.clone();
                user.username = inbound.username.clone();
            }
            Err(err) => warn!(?err, "failed to refresh profile"),
        }
    }

    pub fn invite_url(&self, team_id: i64) -> String {
        format!(
            "https://t.me/{}?start={}",
            self.bot_username,
            commands::invite_payload(team_id)
        )
    }

    async fn team(&self, team_id: i64) -> Result<crate::model::Team, CommandError> {
        db::get_team_by_id(&self.pool, team_id)
            .await?
            .ok_or_else(|| CommandError::not_found(format!("Team #{team_id} not found.")))
    }

    async fn athlete_by_handle(&self, handle: &str) -> Result<User, CommandError> {
        db::get_athlete_by_username(&self.pool, handle)
            .await?
            .ok_or_else(|| CommandError::not_found(format!("No athlete with handle @{handle}.")))
    }

    pub(crate) async fn start(&self, cx: Ctx<'_>) -> CommandResult {
        let payload = cx.args.text(0);
        match (&cx.sender, payload) {
            (Some(user), payload) => {
                let mut text = match user.role {
                    Role::Coach => format!("👋 Welcome back, coach {}!", user.name),
                    Role::Athlete => {
                        format!("👋 Hi, {}! You are registered as an athlete.", user.name)
                    }
                };
                if payload.is_some() {
                    text.push_str("\nYou are already registered; ask your coach to change your team.");
                }
                Ok(Reply::text(text))
            }
            (None, None) => Ok(Reply::text(
                "👋 Hi! Send /athlete if you are an athlete, or /coach <secret key> if you are a coach.",
            )),
            (None, Some(payload)) => {
                let team_id = commands::parse_invite_payload(payload)
                    .ok_or_else(|| CommandError::validation("This invite link is not valid."))?;
                let team = self.team(team_id).await?;
                db::register_user_in_team(&self.pool, &cx.new_user(Role::Athlete), team.id).await?;
                Ok(Reply::text(format!(
                    "✅ You are registered as an athlete in team {}.",
                    team.name
                )))
            }
        }
    }

    pub(crate) async fn help(&self, cx: Ctx<'_>) -> CommandResult {
        let sender = cx.sender.as_ref();
        let available = COMMANDS.iter().filter(|c| c.access.allows(sender));
        Ok(Reply::text(format::help(available)))
    }

    pub(crate) async fn register_athlete(&self, cx: Ctx<'_>) -> CommandResult {
        db::register_user(&self.pool, &cx.new_user(Role::Athlete)).await?;
        Ok(Reply::text("✅ You are registered as an athlete."))
    }

    pub(crate) async fn register_coach(&self, cx: Ctx<'_>) -> CommandResult {
        if cx.required_text(0)? != self.coach_secret {
            return Err(CommandError::unauthorized("Wrong secret key."));
        }
        db::register_user(&self.pool, &cx.new_user(Role::Coach)).await?;
        Ok(Reply::text("✅ You are registered as a coach."))
    }

    pub(crate) async fn request_points(&self, cx: Ctx<'_>) -> CommandResult {
        let amount = cx.required_int(0)?;
        let reason = cx.required_text(1)?;
        let record = db::create_pending_request(&self.pool, cx.chat_id(), amount, reason).await?;
        Ok(Reply::text(format!(
            "📨 Request #{} for {} sent to your coach for approval.",
            record.id,
            format::points(amount)
        )))
    }

    pub(crate) async fn my_score(&self, cx: Ctx<'_>) -> CommandResult {
        let score = db::get_user_score(&self.pool, cx.chat_id()).await?;
        Ok(Reply::text(format!(
            "🏅 Your current score: {}",
            format::points(score)
        )))
    }

    pub(crate) async fn ranking(&self, cx: Ctx<'_>) -> CommandResult {
        let team = match cx.args.int(0) {
            Some(team_id) => Some(self.team(team_id).await?),
            None => None,
        };
        let entries = db::get_ranking(&self.pool, team.as_ref().map(|t| t.id)).await?;
        Ok(Reply::text(format::ranking(&entries, team.as_ref(), cx.chat_id())))
    }

    pub(crate) async fn history(&self, cx: Ctx<'_>) -> CommandResult {
        let sender = cx.sender()?;
        let (target_id, subject) = match (sender.role, cx.args.text(0)) {
            (Role::Athlete, None) => (sender.id, None),
            (Role::Athlete, Some(_)) => {
                return Err(CommandError::unauthorized(
                    "Only coaches can view another athlete's history.",
                ))
            }
            (Role::Coach, None) => {
                return Err(CommandError::validation(
                    "Coaches must name an athlete: /history @handle",
                ))
            }
            (Role::Coach, Some(handle)) => {
                let athlete = self.athlete_by_handle(handle).await?;
                let shown = athlete.username.clone().unwrap_or_else(|| handle.to_string());
                (athlete.id, Some(shown))
            }
        };
        let entries = db::get_user_history(&self.pool, target_id).await?;
        Ok(Reply::text(format::history(&entries, subject.as_deref())))
    }

    pub(crate) async fn pending(&self, cx: Ctx<'_>) -> CommandResult {
        let team_id = match cx.args.int(0) {
            Some(team_id) => Some(self.team(team_id).await?.id),
            None => None,
        };
        let requests = db::get_pending_requests(&self.pool, team_id).await?;
        Ok(Reply::text(format::pending(&requests)))
    }

    pub(crate) async fn approve(&self, cx: Ctx<'_>) -> CommandResult {
        let id = cx.required_int(0)?;
        let record = db::approve_request(&self.pool, id).await?;
        Ok(
            Reply::text(format!("✅ Request #{id} approved. Points credited."))
                .notifying(
                    record.athlete_id,
                    format!(
                        "✅ Your request #{id} for {} was approved.\n📎 {}",
                        format::points(record.amount),
                        record.reason
                    ),
                ),
        )
    }

    pub(crate) async fn reject(&self, cx: Ctx<'_>) -> CommandResult {
        let id = cx.required_int(0)?;
        let athlete_id = db::reject_request(&self.pool, id).await?;
        Ok(Reply::text(format!("🚫 Request #{id} rejected and removed."))
            .notifying(
                athlete_id,
                format!("🚫 Your points request #{id} was rejected by the coach."),
            ))
    }

    pub(crate) async fn give(&self, cx: Ctx<'_>) -> CommandResult {
        let amount = cx.required_int(0)?;
        let handle = cx.required_text(1)?;
        let reason = cx.required_text(2)?;
        let record = db::give_points(&self.pool, handle, amount, reason).await?;
        Ok(Reply::text(format!(
            "✅ {} credited to @{handle}.\n📎 {reason}",
            format::points(amount)
        ))
        .notifying(
            record.athlete_id,
            format!(
                "🎉 Your coach gave you {}.\n📎 {reason}",
                format::points(amount)
            ),
        ))
    }

    pub(crate) async fn athletes(&self, cx: Ctx<'_>) -> CommandResult {
        let team_id = match cx.args.int(0) {
            Some(team_id) => Some(self.team(team_id).await?.id),
            None => None,
        };
        let athletes = db::list_athletes(&self.pool, team_id).await?;
        let teams = db::list_teams(&self.pool).await?;
        Ok(Reply::text(format::athletes(&athletes, &teams)))
    }

    pub(crate) async fn teams(&self, _cx: Ctx<'_>) -> CommandResult {
        let teams = db::list_teams(&self.pool).await?;
        Ok(Reply::text(format::teams(&teams)))
    }

    pub(crate) async fn create_team(&self, cx: Ctx<'_>) -> CommandResult {
        let name = cx.required_text(0)?;
        if name.chars().count() > MAX_TEAM_NAME {
            return Err(CommandError::validation(format!(
                "Team names are limited to {MAX_TEAM_NAME} characters."
            )));
        }
        let team = db::create_team(&self.pool, name).await?;
        Ok(Reply::text(format!(
            "✅ Team #{} \"{}\" created. Invite athletes with /invite {}.",
            team.id, team.name, team.id
        )))
    }

    pub(crate) async fn delete_team(&self, cx: Ctx<'_>) -> CommandResult {
        let id = cx.required_int(0)?;
        let released = db::delete_team(&self.pool, id).await?;
        Ok(Reply::text(format!(
            "🗑 Team #{id} deleted. {released} member(s) no longer have a team."
        )))
    }

    pub(crate) async fn assign_team(&self, cx: Ctx<'_>) -> CommandResult {
        let handle = cx.required_text(0)?;
        let team_id = cx.required_int(1)?;
        let athlete = self.athlete_by_handle(handle).await?;
        let team = self.team(team_id).await?;
        db::assign_user_to_team(&self.pool, athlete.id, team.id).await?;
        Ok(Reply::text(format!(
            "✅ @{handle} is now in team {}.",
            team.name
        )))
    }

    pub(crate) async fn invite(&self, cx: Ctx<'_>) -> CommandResult {
        let team = self.team(cx.required_int(0)?).await?;
        let url = self.invite_url(team.id);
        Ok(
            Reply::text(format!("🔗 Invite link for team {}:\n{url}", team.name))
                .with_link(format!("Join {}", team.name), url),
        )
    }
}
