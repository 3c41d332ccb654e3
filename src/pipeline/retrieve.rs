use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::filters::FilterEngine;
use crate::protocol::{ExecError, Message, Principal};
use crate::store::{messages_collection, Query};

use super::Pipeline;

impl Pipeline {
    /// Most recent messages of a channel, newest first.
    ///
    /// The count resolves from the request parameter, then the channel's
    /// MAX_MSG_RETRIEVAL header, then the configured default. Candidates
    /// are walked in descending publish order and the walk stops once
    /// `count` messages pass the session's filters, so filtered-out
    /// messages do not consume the budget.
    pub fn retrieve_last(
        &self,
        chid: &str,
        requester: &Principal,
        count: Option<usize>,
        filters: &FilterEngine,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, ExecError> {
        let channel = self.require_member(chid, requester)?;
        let count = count
            .or_else(|| channel.max_msg_retrieval())
            .unwrap_or(self.default_count);

        let mut candidates = self.load_messages(chid, &Query::all())?;
        candidates.sort_by_key(|m| std::cmp::Reverse(m.published));

        Ok(candidates
            .into_iter()
            .filter(|m| filters.evaluate(chid, m, now))
            .take(count)
            .collect())
    }

    /// All messages of one conversation, in ascending publish order.
    ///
    /// Partial thread visibility is disallowed: when the thread's first
    /// message fails the session's filters the whole thread is suppressed.
    pub fn retrieve_thread(
        &self,
        chid: &str,
        convid: &str,
        requester: &Principal,
        filters: &FilterEngine,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, ExecError> {
        self.require_member(chid, requester)?;
        if convid.is_empty() {
            return Err(ExecError::MissingAttr("convid".to_string()));
        }

        let query = Query::by("convid", serde_json::json!(convid));
        let mut thread = self.load_messages(chid, &query)?;
        thread.sort_by_key(|m| m.published);

        match thread.first() {
            Some(first) if !filters.evaluate(chid, first, now) => Ok(Vec::new()),
            _ => Ok(thread),
        }
    }

    /// Conversation ids whose latest state record carries `status`.
    ///
    /// A streaming fold keeps, per convid, only the latest-published
    /// conversation-state message; the fold's survivors are then matched
    /// on `payload.status` and the session's filters.
    pub fn list_threads_by_status(
        &self,
        chid: &str,
        status: &str,
        requester: &Principal,
        filters: &FilterEngine,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, ExecError> {
        self.require_member(chid, requester)?;
        if status.is_empty() {
            return Err(ExecError::MissingAttr("status".to_string()));
        }

        let mut latest: BTreeMap<String, Message> = BTreeMap::new();
        for message in self.load_messages(chid, &Query::all())? {
            if !message.is_conv_state() {
                continue;
            }
            let Some(convid) = message.convid.clone() else {
                continue;
            };
            match latest.get(&convid) {
                Some(current) if current.published >= message.published => {}
                _ => {
                    latest.insert(convid, message);
                }
            }
        }

        Ok(latest
            .into_iter()
            .filter(|(_, state)| {
                state.payload_status() == Some(status) && filters.evaluate(chid, state, now)
            })
            .map(|(convid, _)| convid)
            .collect())
    }

    fn load_messages(&self, chid: &str, query: &Query) -> Result<Vec<Message>, ExecError> {
        let documents = self
            .store
            .stream(&messages_collection(chid), query)
            .map_err(|e| ExecError::Tech(e.to_string()))?;
        Ok(documents
            .filter_map(|doc| serde_json::from_value(doc).ok())
            .collect())
    }
}
