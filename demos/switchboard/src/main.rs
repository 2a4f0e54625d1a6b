//! Switchboard: a small multiplexing host.
//!
//! Serves a `Target` domain on the root session that attaches and
//! detaches echo targets. Each attached target is a child session with
//! its own `Echo` domain, addressed by the `sessionId` the attach call
//! returns. The same `Echo` domain also sits on the root session, so the
//! protocol works with or without attaching.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde_json::{json, Value};
use tokio::sync::Mutex;

use trunkline::prelude::*;

// ---------------------------------------------------------------------------
// Protocol surface
// ---------------------------------------------------------------------------

fn registry() -> StaticRegistry {
    StaticRegistry::new()
        .define(
            "Target",
            DomainSchema::new()
                .method(
                    "attachToTarget",
                    MethodDescriptor::new()
                        .returns(Scheme::object([("sessionId", Scheme::String)])),
                )
                .method(
                    "detachFromTarget",
                    MethodDescriptor::new()
                        .params(Scheme::object([("sessionId", Scheme::String)])),
                ),
        )
        .define(
            "Echo",
            DomainSchema::new()
                .method(
                    "say",
                    MethodDescriptor::new()
                        .params(Scheme::object([
                            ("text", Scheme::String),
                            ("loud", Scheme::optional(Scheme::Boolean)),
                        ]))
                        .returns(Scheme::object([("text", Scheme::String)])),
                )
                .event("said", Scheme::object([("text", Scheme::String)])),
        )
}

// ---------------------------------------------------------------------------
// Domain handlers
// ---------------------------------------------------------------------------

/// Root-session domain managing the attached targets.
struct TargetHandler {
    dispatcher: Dispatcher,
    attached: Mutex<HashMap<String, Arc<ProtocolSession>>>,
}

impl TargetHandler {
    fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            attached: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DomainHandler for TargetHandler {
    async fn invoke(&self, method: &str, params: Value) -> Result<Option<Value>, HandlerError> {
        match method {
            "attachToTarget" => {
                let session = self.dispatcher.create_session().await;
                let echo = EchoHandler {
                    session: Arc::downgrade(&session),
                };
                session.register_handler("Echo", Arc::new(echo)).await;

                let id = session
                    .session_id()
                    .map(|id| id.as_str().to_owned())
                    .ok_or_else(|| HandlerError::Failed("created session has no id".into()))?;
                self.attached.lock().await.insert(id.clone(), session);

                tracing::info!(session_id = %id, "target attached");
                Ok(Some(json!({ "sessionId": id })))
            }
            "detachFromTarget" => {
                let id = params["sessionId"]
                    .as_str()
                    .ok_or_else(|| HandlerError::Failed("sessionId must be a string".into()))?
                    .to_owned();

                let session = self.attached.lock().await.remove(&id);
                let Some(session) = session else {
                    return Err(HandlerError::Failed(format!(
                        "no attached target with session id \"{id}\""
                    )));
                };

                self.dispatcher
                    .destroy_session(&session)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
                tracing::info!(session_id = %id, "target detached");
                Ok(None)
            }
            other => Err(HandlerError::MethodNotFound(other.to_owned())),
        }
    }

    async fn dispose(&self) -> Result<(), HandlerError> {
        // The dispatcher disposes the sessions themselves at teardown;
        // only the bookkeeping goes here.
        self.attached.lock().await.clear();
        Ok(())
    }
}

/// Says text back, and announces every utterance as an event on its own
/// session before the response goes out.
struct EchoHandler {
    session: Weak<ProtocolSession>,
}

#[async_trait]
impl DomainHandler for EchoHandler {
    async fn invoke(&self, method: &str, params: Value) -> Result<Option<Value>, HandlerError> {
        match method {
            "say" => {
                let text = params["text"]
                    .as_str()
                    .ok_or_else(|| HandlerError::Failed("text must be a string".into()))?;
                let loud = params["loud"].as_bool().unwrap_or(false);
                let text = if loud { text.to_uppercase() } else { text.to_owned() };

                if let Some(session) = self.session.upgrade() {
                    session
                        .emit_event("Echo.said", Some(json!({ "text": text })))
                        .await
                        .map_err(|e| HandlerError::Failed(e.to_string()))?;
                }
                Ok(Some(json!({ "text": text })))
            }
            other => Err(HandlerError::MethodNotFound(other.to_owned())),
        }
    }

    async fn dispose(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

async fn serve_connection(
    registry: Arc<StaticRegistry>,
    connection: WebSocketConnection,
) -> Result<(), TrunklineError> {
    let dispatcher = Dispatcher::builder(registry).build();

    let root = dispatcher.root_session();
    root.register_handler("Target", Arc::new(TargetHandler::new(dispatcher.clone())))
        .await;
    root.register_handler(
        "Echo",
        Arc::new(EchoHandler {
            session: Arc::downgrade(&root),
        }),
    )
    .await;

    dispatcher.run(connection).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,trunkline=info".into()),
        )
        .init();

    let registry = Arc::new(registry());
    let mut transport = WebSocketTransport::bind("127.0.0.1:9222").await?;
    tracing::info!(addr = %transport.local_addr()?, "switchboard listening");

    loop {
        match transport.accept().await {
            Ok(connection) => {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(registry, connection).await {
                        tracing::warn!(error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => tracing::error!(error = %e, "accept failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start() -> String {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap().to_string();
        let registry = Arc::new(registry());
        tokio::spawn(async move {
            loop {
                let Ok(connection) = transport.accept().await else { break };
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let _ = serve_connection(registry, connection).await;
                });
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        addr
    }

    async fn ws(addr: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        ws
    }

    async fn recv(ws: &mut Ws) -> Value {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout")
            .unwrap()
            .unwrap();
        serde_json::from_slice(&msg.into_data()).unwrap()
    }

    async fn send(ws: &mut Ws, message: Value) {
        ws.send(Message::Text(message.to_string().into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_attach_then_echo_on_child_session() {
        let addr = start().await;
        let mut ws = ws(&addr).await;

        send(&mut ws, json!({ "id": 1, "method": "Target.attachToTarget" })).await;
        let reply = recv(&mut ws).await;
        let session_id = reply["result"]["sessionId"].as_str().unwrap().to_owned();
        assert_eq!(reply["id"], 1);

        send(
            &mut ws,
            json!({
                "id": 2,
                "sessionId": session_id,
                "method": "Echo.say",
                "params": { "text": "hello", "loud": true },
            }),
        )
        .await;

        // The event was emitted inside the call, so it precedes the
        // response on the wire.
        let event = recv(&mut ws).await;
        assert_eq!(event["method"], "Echo.said");
        assert_eq!(event["params"]["text"], "HELLO");
        assert_eq!(event["sessionId"], session_id.as_str());

        let reply = recv(&mut ws).await;
        assert_eq!(reply["id"], 2);
        assert_eq!(reply["sessionId"], session_id.as_str());
        assert_eq!(reply["result"]["text"], "HELLO");
    }

    #[tokio::test]
    async fn test_echo_on_root_session() {
        let addr = start().await;
        let mut ws = ws(&addr).await;

        send(
            &mut ws,
            json!({ "id": 1, "method": "Echo.say", "params": { "text": "hi" } }),
        )
        .await;

        let event = recv(&mut ws).await;
        assert_eq!(event["method"], "Echo.said");
        assert!(event.get("sessionId").is_none());

        let reply = recv(&mut ws).await;
        assert_eq!(reply["id"], 1);
        assert!(reply.get("sessionId").is_none());
        assert_eq!(reply["result"]["text"], "hi");
    }

    #[tokio::test]
    async fn test_detached_target_is_unreachable() {
        let addr = start().await;
        let mut ws = ws(&addr).await;

        send(&mut ws, json!({ "id": 1, "method": "Target.attachToTarget" })).await;
        let reply = recv(&mut ws).await;
        let session_id = reply["result"]["sessionId"].as_str().unwrap().to_owned();

        send(
            &mut ws,
            json!({
                "id": 2,
                "method": "Target.detachFromTarget",
                "params": { "sessionId": session_id },
            }),
        )
        .await;
        let reply = recv(&mut ws).await;
        assert_eq!(reply, json!({ "id": 2 }));

        send(
            &mut ws,
            json!({
                "id": 3,
                "sessionId": session_id,
                "method": "Echo.say",
                "params": { "text": "anyone?" },
            }),
        )
        .await;
        let reply = recv(&mut ws).await;
        assert_eq!(
            reply["error"]["message"],
            format!("ERROR: cannot find session with id \"{session_id}\"")
        );
    }

    #[tokio::test]
    async fn test_detach_unknown_target_fails() {
        let addr = start().await;
        let mut ws = ws(&addr).await;

        send(
            &mut ws,
            json!({
                "id": 1,
                "method": "Target.detachFromTarget",
                "params": { "sessionId": "nope" },
            }),
        )
        .await;

        let reply = recv(&mut ws).await;
        assert_eq!(
            reply["error"]["message"],
            "no attached target with session id \"nope\""
        );
    }
}
