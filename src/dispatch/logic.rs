//! Tarea de difusión de mensajes de push.
//!
//! Recibe por canal los mensajes que la tarea listener tradujo desde la cola
//! y los difunde a todos los clientes registrados. El canal es el punto único
//! de entrega entre hilos: orden explícito, backpressure acotado y sin
//! repetición para suscriptores tardíos.


use tokio::sync::mpsc;
use tracing::{error, info, instrument};
use crate::context::domain::AppContext;
use crate::message::domain::PushMessage;


/// Ejecuta el bucle de difusión.
#[instrument(name = "run_dispatch_task", skip(rx, app_context))]
pub async fn run_dispatch(mut rx: mpsc::Receiver<PushMessage>,
                          app_context: AppContext) {

    info!("Info: tarea de difusión creada");

    while let Some(message) = rx.recv().await {
        broadcast(&message, &app_context).await;
    }
    info!("Info: canal de difusión cerrado, terminando tarea");
}


/// Difunde un mensaje a todos los clientes registrados.
///
/// Serializa el mensaje una sola vez e itera sobre una copia del registro.
/// Una falla de entrega hacia un token se registra y no interrumpe la
/// entrega al resto de los clientes.
pub async fn broadcast(message: &PushMessage, ctx: &AppContext) {

    info!("Info: difundiendo el mensaje a todos los clientes registrados");

    let payload = match serde_json::to_value(message) {
        Ok(value) => value,
        Err(e) => {
            error!("Error: no se pudo serializar el mensaje de difusión: {e}");
            return;
        }
    };

    for token in ctx.registry.snapshot() {
        if let Err(e) = ctx.gateway.send(&token, &payload).await {
            error!("Error: no se pudo enviar el mensaje al dispositivo {token}: {e:?}");
        }
    }
}


/// Inicializa la tarea de difusión en segundo plano (tokio task).
pub fn start_dispatch(rx_from_listener: mpsc::Receiver<PushMessage>,
                      app_context: AppContext) {

    info!("Info: iniciando tarea dispatch");
    tokio::spawn(async move {
        run_dispatch(
            rx_from_listener,
            app_context,
        ).await;
    });
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use async_trait::async_trait;
    use serde_json::Value;
    use crate::gateway::domain::{GatewayError, PushSender};
    use crate::message::domain::QueueEvent;
    use crate::registry::domain::ClientRegistry;
    use crate::system::domain::System;

    struct MockSender {
        sent: Mutex<Vec<(String, Value)>>,
        fail_tokens: Vec<String>,
    }

    #[async_trait]
    impl PushSender for MockSender {
        async fn send(&self, token: &str, payload: &Value) -> Result<(), GatewayError> {
            if self.fail_tokens.iter().any(|t| t == token) {
                return Err(GatewayError::Device("NotRegistered".to_string()));
            }
            self.sent.lock().expect("lock").push((token.to_string(), payload.clone()));
            Ok(())
        }
    }

    fn test_system() -> System {
        System {
            gcm_api_key: "clave-de-prueba".to_string(),
            gcm_sender_id: "12345".to_string(),
            beanstalk_host: "127.0.0.1".to_string(),
            beanstalk_port: 11300,
            tube_events: "alert_gcm".to_string(),
            tube_commands: "commands".to_string(),
            fcm_endpoint: "http://127.0.0.1:9".to_string(),
            upstream_host: "127.0.0.1".to_string(),
            upstream_port: 5235,
            environment: "test".to_string(),
            rust_log: "debug".to_string(),
        }
    }

    fn test_context(sender: Arc<MockSender>) -> AppContext {
        AppContext {
            system: Arc::new(test_system()),
            registry: ClientRegistry::new(),
            gateway: sender,
        }
    }

    fn sample_message() -> PushMessage {
        PushMessage::from_queue_event(&QueueEvent {
            event_type: "alarm".to_string(),
            raw: "r".to_string(),
            code: "c".to_string(),
            message: "m".to_string(),
            timestamp: "1".to_string(),
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client() {
        let sender = Arc::new(MockSender { sent: Mutex::new(Vec::new()), fail_tokens: Vec::new() });
        let ctx = test_context(sender.clone());
        ctx.registry.register("token-1");
        ctx.registry.register("token-2");
        ctx.registry.register("token-3");

        broadcast(&sample_message(), &ctx).await;

        let sent = sender.sent.lock().expect("lock").clone();
        let tokens: Vec<&str> = sent.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tokens, vec!["token-1", "token-2", "token-3"]);
        for (_, payload) in &sent {
            assert_eq!(payload["data"]["type"], "alarm");
            assert_eq!(payload["priority"], "high");
        }
    }

    #[tokio::test]
    async fn delivery_failure_does_not_abort_the_broadcast() {
        let sender = Arc::new(MockSender {
            sent: Mutex::new(Vec::new()),
            fail_tokens: vec!["token-2".to_string()],
        });
        let ctx = test_context(sender.clone());
        ctx.registry.register("token-1");
        ctx.registry.register("token-2");
        ctx.registry.register("token-3");

        broadcast(&sample_message(), &ctx).await;

        let sent = sender.sent.lock().expect("lock").clone();
        let tokens: Vec<&str> = sent.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tokens, vec!["token-1", "token-3"]);
    }

    #[tokio::test]
    async fn broadcast_with_empty_registry_is_a_noop() {
        let sender = Arc::new(MockSender { sent: Mutex::new(Vec::new()), fail_tokens: Vec::new() });
        let ctx = test_context(sender.clone());

        broadcast(&sample_message(), &ctx).await;

        assert!(sender.sent.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn dispatch_loop_broadcasts_each_received_message() {
        let sender = Arc::new(MockSender { sent: Mutex::new(Vec::new()), fail_tokens: Vec::new() });
        let ctx = test_context(sender.clone());
        ctx.registry.register("token-1");

        let (tx, rx) = mpsc::channel::<PushMessage>(10);
        let task = tokio::spawn(run_dispatch(rx, ctx));

        tx.send(sample_message()).await.expect("enviar");
        tx.send(sample_message()).await.expect("enviar");
        drop(tx);
        task.await.expect("tarea");

        assert_eq!(sender.sent.lock().expect("lock").len(), 2);
    }
}
