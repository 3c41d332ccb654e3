//! Per-session filter engine.
//!
//! Filters are named predicate templates scoped to a (session, actor) pair
//! and held in insertion order; they gate what a session sees at retrieval
//! time. They are ephemeral: a session's filters vanish with the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::protocol::{ExecError, Message};

/// Message fields a template may not reference; they are either
/// engine-owned (`relevance`, `published`, `msgid`), storage-owned
/// (`persistent`) or scope-owned (`actor`).
const FORBIDDEN_FIELDS: [&str; 5] = ["relevance", "published", "persistent", "msgid", "actor"];

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error("template may not reference field {0}")]
    ForbiddenField(String),
    #[error("geofencing requires radius, location.lat and location.lng together")]
    IncompleteGeo,
    #[error("no filter named {0} for this actor")]
    UnknownFilter(String),
}

impl From<FilterError> for ExecError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::ForbiddenField(field) => {
                ExecError::InvalidAttr("template".to_string(), format!("field {field} forbidden"))
            }
            FilterError::IncompleteGeo => ExecError::MissingAttr("radius/location".to_string()),
            FilterError::UnknownFilter(name) => ExecError::NotAvailable(format!("filter {name}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Named predicate template.
///
/// A message passes when every specified template field equals the
/// message's field, the geofence (when configured) contains the message's
/// location, and `relevant` (when true) finds the message still current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterTemplate {
    pub name: String,
    #[serde(default)]
    pub template: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant: Option<bool>,
}

impl FilterTemplate {
    fn validate(&self) -> Result<(), FilterError> {
        for field in self.template.keys() {
            if FORBIDDEN_FIELDS.contains(&field.as_str()) {
                return Err(FilterError::ForbiddenField(field.clone()));
            }
        }
        if self.radius.is_some() != self.location.is_some() {
            return Err(FilterError::IncompleteGeo);
        }
        Ok(())
    }

    fn passes(&self, message: &Message, now: DateTime<Utc>) -> bool {
        if self.relevant == Some(true) {
            match message.relevance {
                Some(relevance) if relevance > now => {}
                _ => return false,
            }
        }
        if let (Some(radius), Some(center)) = (self.radius, self.location.as_ref()) {
            match message.location.as_ref() {
                Some(location)
                    if haversine_m(center.lat, center.lng, location.lat, location.lng)
                        <= radius => {}
                _ => return false,
            }
        }
        if self.template.is_empty() {
            return true;
        }
        // Field equality against the message's wire representation, so
        // template keys use wire names ("type", not "kind").
        let wire = match serde_json::to_value(message) {
            Ok(wire) => wire,
            Err(_) => return false,
        };
        self.template
            .iter()
            .all(|(field, expected)| wire.get(field) == Some(expected))
    }
}

/// Great-circle distance in meters.
fn haversine_m(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let d_lat = (lat_b - lat_a).to_radians();
    let d_lng = (lng_b - lng_a).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat_a.to_radians().cos() * lat_b.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Ordered filter collection for one session.
///
/// Filters for an actor evaluate in insertion order; replacing a filter by
/// name keeps its position, removing one leaves the rest untouched. With no
/// filters present every message passes.
#[derive(Debug, Default)]
pub struct FilterEngine {
    by_actor: HashMap<String, Vec<FilterTemplate>>,
    /// Actor insertion order, for flattened listing.
    actor_order: Vec<String>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the end of the actor's order, or replace in place when a
    /// filter with the same name exists.
    pub fn set(&mut self, actor: &str, filter: FilterTemplate) -> Result<(), FilterError> {
        filter.validate()?;
        if !self.by_actor.contains_key(actor) {
            self.actor_order.push(actor.to_string());
        }
        let filters = self.by_actor.entry(actor.to_string()).or_default();
        match filters.iter_mut().find(|f| f.name == filter.name) {
            Some(slot) => *slot = filter,
            None => filters.push(filter),
        }
        Ok(())
    }

    pub fn unset(&mut self, actor: &str, name: &str) -> Result<(), FilterError> {
        let filters = self
            .by_actor
            .get_mut(actor)
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))?;
        let position = filters
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))?;
        filters.remove(position);
        Ok(())
    }

    /// Ordered filters for one actor.
    pub fn list(&self, actor: &str) -> Vec<FilterTemplate> {
        self.by_actor.get(actor).cloned().unwrap_or_default()
    }

    /// All filters, flattened across actors in their stored order.
    pub fn list_all(&self) -> Vec<FilterTemplate> {
        self.actor_order
            .iter()
            .flat_map(|actor| self.by_actor.get(actor).into_iter().flatten().cloned())
            .collect()
    }

    /// Visibility gate: pass only if every template for the actor passes.
    pub fn evaluate(&self, actor: &str, message: &Message, now: DateTime<Utc>) -> bool {
        match self.by_actor.get(actor) {
            Some(filters) => filters.iter().all(|f| f.passes(message, now)),
            None => true,
        }
    }
}
