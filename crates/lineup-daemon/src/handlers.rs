//! Request handlers.
//!
//! Implements handlers for each request type on the daemon socket.

use lineup_core::ipc::{ErrorCode, RequestEnvelope, SpotRequest, SpotResponse};
use lineup_core::signup::{self, SignupError, SpotAction, SpotSignupRequest};
use tracing::{info, warn};

use crate::state::SharedState;

/// Daemon version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dispatch a request to the appropriate handler.
pub async fn dispatch(envelope: RequestEnvelope, state: &SharedState) -> SpotResponse {
    let caller_id = envelope.caller_id;
    match envelope.request {
        SpotRequest::Ping => handle_ping(state),
        SpotRequest::ManageSpot {
            list_id,
            spot_key,
            action,
        } => handle_manage_spot(state, caller_id.as_deref(), &list_id, &spot_key, &action),
        SpotRequest::Shutdown => handle_shutdown(state),
    }
}

/// Handle ping request.
fn handle_ping(state: &SharedState) -> SpotResponse {
    SpotResponse::Pong {
        version: VERSION.to_string(),
        uptime_secs: state.uptime_secs(),
    }
}

/// Handle a spot signup/release request.
fn handle_manage_spot(
    state: &SharedState,
    caller_id: Option<&str>,
    list_id: &str,
    spot_key: &str,
    action: &str,
) -> SpotResponse {
    let request = match validate_spot_request(caller_id, list_id, spot_key, action) {
        Ok(request) => request,
        Err(err) => {
            warn!(list_id, spot_key, action, %err, "rejected spot request");
            return error_response(&err);
        },
    };

    match signup::execute(state.store(), &request, state.config().commit.max_attempts) {
        Ok(message) => SpotResponse::Ok { message },
        Err(err) => {
            warn!(
                list_id,
                spot_key,
                action,
                performer_id = %request.performer_id,
                %err,
                "spot request failed"
            );
            error_response(&err)
        },
    }
}

/// Handle shutdown request.
fn handle_shutdown(state: &SharedState) -> SpotResponse {
    info!("shutdown requested over the socket");
    state.request_shutdown();
    SpotResponse::Ok {
        message: "Daemon shutting down".to_string(),
    }
}

/// Checks the envelope fields the way the transaction contract requires:
/// an authenticated caller, non-empty ids, and a recognized action.
fn validate_spot_request(
    caller_id: Option<&str>,
    list_id: &str,
    spot_key: &str,
    action: &str,
) -> Result<SpotSignupRequest, SignupError> {
    let performer_id = match caller_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(SignupError::Unauthenticated),
    };
    if list_id.is_empty() {
        return Err(SignupError::InvalidArgument {
            field: "listId",
            reason: "must not be empty".to_string(),
        });
    }
    let spot_key = spot_key
        .parse()
        .map_err(|err: lineup_core::slot::SlotKeyError| SignupError::InvalidArgument {
            field: "spotKey",
            reason: err.to_string(),
        })?;
    let Some(action) = SpotAction::parse(action) else {
        return Err(SignupError::InvalidArgument {
            field: "action",
            reason: format!("must be \"signup\" or \"remove\", got {action:?}"),
        });
    };

    Ok(SpotSignupRequest {
        list_id: list_id.to_string(),
        spot_key,
        action,
        performer_id,
    })
}

fn error_response(err: &SignupError) -> SpotResponse {
    SpotResponse::Error {
        code: ErrorCode::from(err),
        message: err.to_string(),
    }
}
