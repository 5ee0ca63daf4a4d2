use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    ampgate_amp::{AmpBox, decode_answer},
    ampgate_config::{CommandSignature, GatewayConfig},
    ampgate_protocol::RpcError,
    serde_json::{Map, Value},
};

use crate::backend::Backend;

/// Invokes backend commands by name.
#[derive(Clone)]
pub struct Dispatcher {
    commands: Arc<HashMap<String, CommandSignature>>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(commands: HashMap<String, CommandSignature>, call_timeout: Duration) -> Self {
        Self {
            commands: Arc::new(commands),
            call_timeout,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.commands.clone(), config.timeouts.call())
    }

    pub fn signature(&self, method: &str) -> Option<&CommandSignature> {
        self.commands.get(method)
    }

    /// Call `method` on `backend` and decode its answer.
    ///
    /// Resolves to `None` when no answer was asked for.
    pub async fn invoke(
        &self,
        backend: &dyn Backend,
        method: &str,
        arguments: AmpBox,
        requires_answer: bool,
    ) -> Result<Option<Map<String, Value>>, RpcError> {
        let signature = self.signature(method);
        if let Some(signature) = signature {
            signature
                .check_arguments(arguments.keys())
                .map_err(|detail| RpcError::bad_parameters(format!("{method}: {detail}")))?;
        }

        let answer = tokio::time::timeout(
            self.call_timeout,
            backend.call_remote(method, requires_answer, arguments),
        )
        .await
        .map_err(|_| {
            RpcError::timeout(format!(
                "{method} did not answer within {:?}",
                self.call_timeout
            ))
        })??;

        let Some(answer) = answer else {
            return Ok(None);
        };
        decode_answer(&answer, signature.map(|s| &s.response))
            .map(Some)
            .map_err(|e| RpcError::internal(format!("{method}: {e}")))
    }
}
