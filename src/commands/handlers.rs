//! Built-in command surface.
//!
//! Each handler is a thin adapter from envelope params to one subsystem
//! operation; all policy lives in the subsystems themselves.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::core::time::wall_now;
use crate::filters::FilterTemplate;
use crate::protocol::{Channel, CommandEnvelope, ExecError, Message};

use super::{CommandDispatcher, CommandHandler, HandlerContext, HandlerFuture};
use crate::core::time::Clock;

fn params<T: DeserializeOwned>(envelope: &CommandEnvelope) -> Result<T, ExecError> {
    serde_json::from_value(envelope.params.clone())
        .map_err(|e| ExecError::InvalidAttr("params".to_string(), e.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ExecError> {
    serde_json::to_value(value).map_err(|e| ExecError::Tech(e.to_string()))
}

/// Register every built-in handler on a dispatcher.
pub fn register_builtins<C: Clock>(dispatcher: &mut CommandDispatcher<C>) {
    dispatcher.register(Arc::new(Echo));
    dispatcher.register(Arc::new(CreateUpdateChannel));
    dispatcher.register(Arc::new(Publish));
    dispatcher.register(Arc::new(GetLastMessages));
    dispatcher.register(Arc::new(GetThread));
    dispatcher.register(Arc::new(GetThreads));
    dispatcher.register(Arc::new(Subscribe));
    dispatcher.register(Arc::new(Unsubscribe));
    dispatcher.register(Arc::new(GetSubscriptions));
    dispatcher.register(Arc::new(SetFilter));
    dispatcher.register(Arc::new(UnsetFilter));
    dispatcher.register(Arc::new(ListFilters));
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Returns its params verbatim.
pub struct Echo;

impl CommandHandler for Echo {
    fn name(&self) -> &'static str {
        "hEcho"
    }

    fn exec(&self, envelope: CommandEnvelope, _ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move { Ok(envelope.params) })
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

pub struct CreateUpdateChannel;

impl CommandHandler for CreateUpdateChannel {
    fn name(&self) -> &'static str {
        "hCreateUpdateChannel"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            if !ctx.capabilities.can_administer {
                return Err(ExecError::NotAuthorized(
                    "session may not administer channels".to_string(),
                ));
            }
            let delta: Channel = params(&envelope)?;
            let (_, channel) = ctx.registry.upsert(delta, &ctx.requester)?;
            to_value(&channel)
        })
    }
}

#[derive(Deserialize)]
struct ChidParams {
    chid: String,
}

pub struct Subscribe;

impl CommandHandler for Subscribe {
    fn name(&self) -> &'static str {
        "hSubscribe"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let ChidParams { chid } = params(&envelope)?;
            let channel = ctx
                .registry
                .get(&chid)
                .ok_or_else(|| ExecError::NotAvailable(format!("channel {chid}")))?;
            if !channel.active {
                return Err(ExecError::NotAuthorized(format!("channel {chid} inactive")));
            }
            if !channel.is_authorized(ctx.requester.bare()) {
                return Err(ExecError::NotAuthorized(format!(
                    "{} is not a member of {chid}",
                    ctx.requester.bare()
                )));
            }
            ctx.subscriptions.subscribe(ctx.requester.bare(), &chid)?;
            if let Err(err) = ctx.transport.subscribe(&chid, ctx.requester.bare()) {
                warn!(%chid, error = %err, "transport subscribe failed");
            }
            Ok(Value::Null)
        })
    }
}

pub struct Unsubscribe;

impl CommandHandler for Unsubscribe {
    fn name(&self) -> &'static str {
        "hUnsubscribe"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let ChidParams { chid } = params(&envelope)?;
            ctx.subscriptions.unsubscribe(ctx.requester.bare(), &chid)?;
            if let Err(err) = ctx.transport.unsubscribe(&chid, ctx.requester.bare()) {
                warn!(%chid, error = %err, "transport unsubscribe failed");
            }
            Ok(Value::Null)
        })
    }
}

/// Lists followed channels, restricted to those currently active.
pub struct GetSubscriptions;

impl CommandHandler for GetSubscriptions {
    fn name(&self) -> &'static str {
        "hGetSubscriptions"
    }

    fn exec(&self, _envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let followed = ctx.subscriptions.list(ctx.requester.bare())?;
            let active: Vec<String> = followed
                .into_iter()
                .filter(|chid| ctx.registry.get(chid).is_some_and(|c| c.active))
                .collect();
            to_value(&active)
        })
    }
}

// ---------------------------------------------------------------------------
// Publish / retrieve
// ---------------------------------------------------------------------------

pub struct Publish;

impl CommandHandler for Publish {
    fn name(&self) -> &'static str {
        "hPublish"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            if !ctx.capabilities.can_publish_as_self {
                return Err(ExecError::NotAuthorized(
                    "session may not publish".to_string(),
                ));
            }
            let draft: Message = params(&envelope)?;
            let message = ctx.pipeline.publish(draft, &ctx.requester, wall_now())?;
            to_value(&message)
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLastParams {
    chid: String,
    #[serde(default)]
    nb_last_msg: Option<usize>,
}

pub struct GetLastMessages;

impl CommandHandler for GetLastMessages {
    fn name(&self) -> &'static str {
        "hGetLastMessages"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let GetLastParams { chid, nb_last_msg } = params(&envelope)?;
            let filters = ctx.filters.lock();
            let messages = ctx.pipeline.retrieve_last(
                &chid,
                &ctx.requester,
                nb_last_msg,
                &filters,
                wall_now(),
            )?;
            to_value(&messages)
        })
    }
}

#[derive(Deserialize)]
struct ThreadParams {
    chid: String,
    convid: String,
}

pub struct GetThread;

impl CommandHandler for GetThread {
    fn name(&self) -> &'static str {
        "hGetThread"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let ThreadParams { chid, convid } = params(&envelope)?;
            let filters = ctx.filters.lock();
            let thread = ctx.pipeline.retrieve_thread(
                &chid,
                &convid,
                &ctx.requester,
                &filters,
                wall_now(),
            )?;
            to_value(&thread)
        })
    }
}

#[derive(Deserialize)]
struct ThreadsParams {
    chid: String,
    status: String,
}

pub struct GetThreads;

impl CommandHandler for GetThreads {
    fn name(&self) -> &'static str {
        "hGetThreads"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let ThreadsParams { chid, status } = params(&envelope)?;
            let filters = ctx.filters.lock();
            let convids = ctx.pipeline.list_threads_by_status(
                &chid,
                &status,
                &ctx.requester,
                &filters,
                wall_now(),
            )?;
            to_value(&convids)
        })
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SetFilterParams {
    actor: String,
    #[serde(flatten)]
    filter: FilterTemplate,
}

pub struct SetFilter;

impl CommandHandler for SetFilter {
    fn name(&self) -> &'static str {
        "hSetFilter"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let SetFilterParams { actor, filter } = params(&envelope)?;
            ctx.filters.lock().set(&actor, filter)?;
            Ok(Value::Null)
        })
    }
}

#[derive(Deserialize)]
struct UnsetFilterParams {
    actor: String,
    name: String,
}

pub struct UnsetFilter;

impl CommandHandler for UnsetFilter {
    fn name(&self) -> &'static str {
        "hUnsetFilter"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let UnsetFilterParams { actor, name } = params(&envelope)?;
            ctx.filters.lock().unset(&actor, &name)?;
            Ok(Value::Null)
        })
    }
}

#[derive(Deserialize)]
struct ListFiltersParams {
    #[serde(default)]
    actor: Option<String>,
}

pub struct ListFilters;

impl CommandHandler for ListFilters {
    fn name(&self) -> &'static str {
        "hListFilters"
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_> {
        Box::pin(async move {
            let ListFiltersParams { actor } = match envelope.params {
                Value::Null => ListFiltersParams { actor: None },
                ref _other => params(&envelope)?,
            };
            let filters = ctx.filters.lock();
            let listed = match actor {
                Some(actor) => filters.list(&actor),
                None => filters.list_all(),
            };
            to_value(&listed)
        })
    }
}
