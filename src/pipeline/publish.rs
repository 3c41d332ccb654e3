use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::protocol::message::ALERT_MIN_PRIORITY;
use crate::protocol::{ExecError, Message, Principal};
use crate::store::messages_collection;

use super::Pipeline;

impl Pipeline {
    /// Publish a message to its channel.
    ///
    /// Runs the publication steps in order: sender verification, channel
    /// authorization, identity assignment, default inheritance, relevance
    /// computation, optional persistence, transport delivery. Persistence
    /// is best-effort (a save failure is logged, not returned); transport
    /// failure is a classified error, with any committed save left intact.
    pub fn publish(
        &self,
        mut message: Message,
        requester: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Message, ExecError> {
        let publisher = message
            .publisher
            .clone()
            .ok_or_else(|| ExecError::NotAuthorized("publisher missing".to_string()))?;
        let publisher = Principal::parse(&publisher)
            .map_err(|e| ExecError::InvalidAttr("publisher".to_string(), e.to_string()))?;
        if publisher.bare() != requester.bare() {
            return Err(ExecError::NotAuthorized(format!(
                "publisher {} does not match sender {}",
                publisher.bare(),
                requester.bare()
            )));
        }
        message.publisher = Some(publisher.bare().to_string());

        let chid = message
            .chid
            .clone()
            .ok_or_else(|| ExecError::MissingAttr("chid".to_string()))?;
        let channel = self
            .registry
            .get(&chid)
            .ok_or_else(|| ExecError::NotAuthorized(format!("channel {chid} unknown")))?;
        if !channel.active {
            return Err(ExecError::NotAuthorized(format!("channel {chid} inactive")));
        }
        if !channel.is_authorized(requester.bare()) {
            return Err(ExecError::NotAuthorized(format!(
                "{} may not publish to {chid}",
                requester.bare()
            )));
        }

        // Identity: fresh msgid; absent convid starts a new thread.
        let msgid = self.ids.next();
        message.msgid = Some(msgid.clone());
        if message.convid.is_none() {
            message.convid = Some(msgid.clone());
        }

        // Channel defaults, with the alert floor applied afterwards.
        let mut priority = message.priority.unwrap_or(channel.priority);
        if message.is_alert() {
            priority = priority.max(ALERT_MIN_PRIORITY);
        }
        message.priority = Some(priority);
        if message.location.is_none() {
            message.location = channel.location.clone();
        }

        let published = message.published.unwrap_or(now);
        message.published = Some(published);

        message.relevance = match channel.relevance_offset_secs() {
            Some(offset) => {
                let derived = published + Duration::seconds(offset);
                Some(match message.relevance {
                    Some(explicit) => explicit.max(derived),
                    None => derived,
                })
            }
            None => message.relevance,
        };

        if message.persistent {
            match serde_json::to_value(&message) {
                Ok(document) => {
                    if let Err(err) =
                        self.store.save(&messages_collection(&chid), &msgid, document)
                    {
                        warn!(%chid, %msgid, error = %err, "message save failed; delivering anyway");
                    }
                }
                Err(err) => warn!(%msgid, error = %err, "message not serializable for storage"),
            }
        }

        self.transport
            .publish_to_topic(&chid, &message)
            .map_err(|e| ExecError::Tech(e.to_string()))?;
        debug!(%chid, %msgid, persistent = message.persistent, "message published");
        Ok(message)
    }
}
