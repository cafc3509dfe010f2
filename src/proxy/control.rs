//! Control endpoint: authenticated toggle of the logging gate
//!
//! `/run?active=t` turns persistence on, `/run?active=f` turns it off, any
//! other value leaves it unchanged. Calls must carry
//! `Authorization: Bearer <token>`. The endpoint is answered directly and is
//! never proxied or logged as an exchange.

use crate::domain::types::ControlToken;
use crate::infrastructure::log_messages::control as messages;
use crate::proxy::error_response::{ErrorBody, MessageBody};
use crate::proxy::headers::{control_params, AUTHORIZATION, BEARER_PREFIX};
use crate::proxy::logging_gate::LoggingGate;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub const UNAUTHORIZED: &str = "Unauthorized";

/// Requested gate change carried by the `active` query parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateCommand {
    Activate,
    Deactivate,
    Keep,
}

impl GateCommand {
    pub fn from_query(query: Option<&str>) -> Self {
        match query_param(query.unwrap_or_default(), control_params::ACTIVE).as_deref() {
            Some(control_params::ACTIVATE) => Self::Activate,
            Some(control_params::DEACTIVATE) => Self::Deactivate,
            _ => Self::Keep,
        }
    }
}

/// First value of `name` in a raw query string, percent-decoded
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).ok()?;
            (key == name).then(|| urlencoding::decode(value).ok().map(|v| v.into_owned()))?
        })
        .next()
}

/// Whether the headers carry the expected bearer token
pub fn is_authorized(headers: &HeaderMap, expected: Option<&ControlToken>) -> bool {
    let Some(expected) = expected else {
        return false;
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix(BEARER_PREFIX))
        .map(str::trim);

    match presented {
        Some(token) => {
            Sha256::digest(token.as_bytes()) == Sha256::digest(expected.as_ref().as_bytes())
        }
        None => false,
    }
}

/// Answer a control endpoint call
pub fn handle_control(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: Option<&ControlToken>,
    gate: &LoggingGate,
) -> Response {
    if !is_authorized(headers, expected) {
        warn!("{}", messages::UNAUTHORIZED);
        return ErrorBody::new(UNAUTHORIZED).into_response_with_status(StatusCode::UNAUTHORIZED);
    }

    match GateCommand::from_query(query) {
        GateCommand::Activate => gate.set_active(true),
        GateCommand::Deactivate => gate.set_active(false),
        GateCommand::Keep => {}
    }

    let active = gate.is_active();
    info!(active, "{}", messages::GATE_CHANGED);
    MessageBody::new(status_message(active)).into_response()
}

pub fn status_message(active: bool) -> String {
    let state = if active { "active" } else { "inactive" };
    format!("Logging is now {state}")
}
