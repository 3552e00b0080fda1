//! Dominio del gateway de push: tipos de alambre y cliente de envío.
//!
//! El envío hacia los dispositivos usa el endpoint HTTP legacy de FCM
//! (`Authorization: key=...`, campo `to` con el token de registro). El trait
//! [`PushSender`] es la costura que permite reemplazar el cliente real por un
//! doble en los tests.


use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use crate::system::domain::System;
use crate::system::domain::gateway_const::TIMEOUT_SECS;


/// Payload de un mensaje entrante de un dispositivo. Ambos campos son
/// opcionales; sin `command` el mensaje no dispara ninguna acción.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct DeviceMessage {
    pub registration_token: Option<String>,
    pub command: Option<String>,
}


/// Trama completa del flujo de entrada del gateway: remitente más payload.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: String,
    pub data: DeviceMessage,
}


/// Categorización de errores de envío hacia el gateway.
#[derive(Debug)]
pub enum GatewayError {
    /// No se pudo completar el pedido HTTP.
    Transport(reqwest::Error),
    /// El gateway rechazó el pedido (status fuera de 2xx).
    Rejected(u16),
    /// El gateway aceptó el pedido pero reportó la entrega como fallida
    /// para el destinatario (ej. token vencido).
    Device(String),
}


/// Costura de envío de mensajes de push, una entrega por token.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, payload: &Value) -> Result<(), GatewayError>;
}


/// Respuesta del endpoint legacy de FCM. Se parsea de forma laxa: solo
/// interesa saber si la entrega al destinatario falló.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FcmResponse {
    #[serde(default)]
    pub success: i64,
    #[serde(default)]
    pub failure: i64,
    #[serde(default)]
    pub results: Vec<FcmResult>,
}


#[derive(Debug, Clone, Deserialize, Default)]
pub struct FcmResult {
    pub message_id: Option<String>,
    pub error: Option<String>,
}


/// Cliente HTTP del gateway de push.
pub struct FcmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}


impl FcmClient {

    /// # Panics
    /// * Si el cliente HTTP subyacente no se puede construir.
    pub fn new(system: &System) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("no se pudo construir el cliente HTTP del gateway");

        Self {
            http,
            endpoint: system.fcm_endpoint.clone(),
            api_key: system.gcm_api_key.clone(),
        }
    }
}


/// Arma el cuerpo del pedido: el mensaje serializado más el token destino.
pub(crate) fn wire_body(token: &str, payload: &Value) -> Value {
    let mut body = payload.clone();
    if let Some(map) = body.as_object_mut() {
        map.insert("to".to_string(), Value::String(token.to_string()));
    }
    body
}


#[async_trait]
impl PushSender for FcmClient {

    async fn send(&self, token: &str, payload: &Value) -> Result<(), GatewayError> {
        let body = wire_body(token, payload);

        let response = self.http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("key={}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        if !response.status().is_success() {
            return Err(GatewayError::Rejected(response.status().as_u16()));
        }

        let report: FcmResponse = response.json().await.unwrap_or_default();
        if report.failure > 0 {
            let reason = report.results
                .into_iter()
                .find_map(|r| r.error)
                .unwrap_or_else(|| "desconocido".to_string());
            return Err(GatewayError::Device(reason));
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_body_adds_the_destination_token() {
        let payload = json!({
            "priority": "high",
            "time_to_live": 3600,
            "data": { "type": "alarm" },
            "notification": { "body": "m" }
        });

        let body = wire_body("token-1", &payload);

        assert_eq!(body["to"], "token-1");
        assert_eq!(body["priority"], "high");
        assert_eq!(body["data"]["type"], "alarm");
        // El payload original no se modifica.
        assert!(payload.get("to").is_none());
    }

    #[test]
    fn inbound_frame_deserializes_with_optional_fields() {
        let frame = r#"{"from":"gateway","data":{"command":"ping"}}"#;
        let inbound: InboundMessage = serde_json::from_str(frame).expect("parsear");

        assert_eq!(inbound.from, "gateway");
        assert_eq!(inbound.data.command.as_deref(), Some("ping"));
        assert_eq!(inbound.data.registration_token, None);
    }

    #[test]
    fn fcm_response_parses_leniently() {
        let report: FcmResponse = serde_json::from_str(
            r#"{"multicast_id":123,"success":0,"failure":1,"results":[{"error":"NotRegistered"}]}"#,
        ).expect("parsear");

        assert_eq!(report.success, 0);
        assert_eq!(report.failure, 1);
        assert_eq!(report.results[0].message_id, None);
        assert_eq!(report.results[0].error.as_deref(), Some("NotRegistered"));

        let empty: FcmResponse = serde_json::from_str("{}").expect("parsear");
        assert_eq!(empty.failure, 0);
        assert!(empty.results.is_empty());
    }
}
