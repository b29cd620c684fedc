use crate::processor::{CommandProcessor, Inbound, Outbound};
use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{instrument, warn};

/// Delivers outbound text to a chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn deliver(&self, out: &Outbound) -> Result<()>;
}

#[async_trait]
impl Messenger for Bot {
    async fn deliver(&self, out: &Outbound) -> Result<()> {
        let mut req = self.send_message(ChatId(out.chat_id), out.text.clone());
        if let Some(link) = &out.link {
            let url = reqwest::Url::parse(&link.url)
                .with_context(|| format!("invalid button url {}", link.url))?;
            let button = InlineKeyboardButton::url(link.label.clone(), url);
            req = req.reply_markup(InlineKeyboardMarkup::new(vec![vec![button]]));
        }
        req.await?;
        Ok(())
    }
}

/// Extract the sender and text of a private-chat message. Group chats,
/// service messages and media without text are ignored.
pub fn inbound_from(msg: &Message) -> Option<Inbound> {
    if !msg.chat.is_private() {
        return None;
    }
    let user = msg.from()?;
    let text = msg.text()?;
    Some(Inbound {
        chat_id: msg.chat.id.0,
        name: user.first_name.clone(),
        username: user.username.clone(),
        text: text.to_owned(),
    })
}

/// Run one inbound message through the processor and deliver everything it
/// produced. A failed delivery is logged and does not stop the others; an
/// error is returned only when nothing could be delivered.
#[instrument(skip_all, fields(chat_id = inbound.chat_id))]
pub async fn dispatch(
    processor: &CommandProcessor,
    messenger: &dyn Messenger,
    inbound: &Inbound,
) -> Result<usize> {
    let outbound = processor.process(inbound).await;
    let mut delivered = 0;
    let mut last_err = None;
    for out in &outbound {
        match messenger.deliver(out).await {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(?err, to = out.chat_id, "failed to deliver message");
                last_err = Some(err);
            }
        }
    }
    match last_err {
        Some(err) if delivered == 0 => Err(err.context("no message could be delivered")),
        _ => Ok(delivered),
    }
}

#[instrument(skip_all)]
pub async fn handle_update(bot: &Bot, processor: &CommandProcessor, msg: &Message) -> Result<()> {
    let Some(inbound) = inbound_from(msg) else {
        return Ok(());
    };
    dispatch(processor, bot, &inbound).await?;
    Ok(())
}
