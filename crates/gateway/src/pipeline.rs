//! Per-message orchestration: decode, encode arguments, dispatch, respond.

use {
    ampgate_amp::encode_all,
    ampgate_protocol::{InboundMessage, Rejected, RpcError, decode_request, encode_response},
    tracing::{debug, warn},
};

use crate::{backend::Backend, dispatch::Dispatcher};

/// Handle one inbound frame.
///
/// Returns the response text when one is owed: only requests that carried an
/// `id` get a reply, whether they succeeded or not. Every failure is logged
/// here, once.
pub async fn handle_frame(
    frame: &[u8],
    backend: &dyn Backend,
    dispatcher: &Dispatcher,
) -> Option<String> {
    let InboundMessage { method, id, params } = match decode_request(frame) {
        Ok(message) => message,
        Err(Rejected { id, error }) => {
            warn!(code = error.code(), error = %error, "rejected inbound message");
            return id.map(|id| encode_response(Err(error), Some(id)));
        },
    };
    debug!(%method, notification = id.is_none(), "dispatching");

    let outcome = match encode_all(&params) {
        Ok(arguments) => {
            dispatcher
                .invoke(backend, &method, arguments, id.is_some())
                .await
        },
        Err(e) => Err(RpcError::encoding(e.to_string())),
    };

    match outcome {
        Ok(result) => id.map(|id| encode_response(Ok(result.unwrap_or_default()), Some(id))),
        Err(error) => {
            warn!(
                %method,
                arguments = ?params.keys().collect::<Vec<_>>(),
                code = error.code(),
                error = %error,
                "request failed"
            );
            id.map(|id| encode_response(Err(error), Some(id)))
        },
    }
}
