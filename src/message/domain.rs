//! Dominio de Mensajería y Modelos de Datos.
//!
//! Este módulo define las estructuras de datos fundamentales que se intercambian
//! entre los distintos componentes del sistema: el evento crudo que llega por la
//! cola, el mensaje de push que se envía al gateway y el vocabulario de comandos
//! aceptados desde los dispositivos.
//!


use std::collections::HashMap;
use chrono::Utc;
use serde::{Serialize, Deserialize};


/// Tipos de evento que se retransmiten a los clientes registrados.
/// Cualquier otro tipo se descarta (se registra en el log, no se difunde).
pub const ALERT_TYPES: [&str; 5] = ["alarm", "recovery", "fault", "armed", "disarmed"];

/// Marcador fijo usado en los campos de relleno de las respuestas de estado.
pub const STATUS_MARKER: &str = "ALARMRELAY";

/// Estado de la alarma para las respuestas a `ping`. El relé no mantiene una
/// máquina de estados de la alarma, por lo que responde con un marcador.
pub const ALARM_STATE_UNKNOWN: &str = "unknown";

/// TTL por defecto (1 hora) para la entrega de mensajes de push.
pub const DEFAULT_TTL_SECS: u32 = 3600;


/// Prioridad de entrega del gateway de push. Los eventos de alarma siempre se
/// envían con prioridad alta para evitar que el proveedor los demore.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}


/// Mensaje de push hacia los dispositivos móviles.
///
/// Se construye fresco para cada evento saliente (desde un payload de la cola)
/// o para cada respuesta a un `ping` (estado sintetizado). Su serialización JSON
/// es exactamente la forma de alambre que espera el gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    pub priority: Priority,
    pub time_to_live: u32,
    pub data: HashMap<String, String>,
    pub notification: HashMap<String, String>,
}


impl PushMessage {

    pub fn new() -> Self {
        Self {
            priority: Priority::High,
            time_to_live: DEFAULT_TTL_SECS,
            data: HashMap::new(),
            notification: HashMap::new(),
        }
    }

    /// Empaqueta un evento recibido de la cola en un mensaje de push.
    ///
    /// El mapa `data` replica los campos del evento tal como los documenta la
    /// cola; el mapa `notification` alimenta el centro de notificaciones de los
    /// dispositivos (título con el tipo de evento, cuerpo con el mensaje).
    pub fn from_queue_event(event: &QueueEvent) -> Self {
        let mut message = Self::new();

        message.data.insert("raw".to_string(), event.raw.clone());
        message.data.insert("code".to_string(), event.code.clone());
        message.data.insert("type".to_string(), event.event_type.clone());
        message.data.insert("message".to_string(), event.message.clone());
        message.data.insert("timestamp".to_string(), event.timestamp.clone());

        message.notification.insert("badge".to_string(), "0".to_string());
        message.notification.insert("sound".to_string(), "default".to_string());
        message.notification.insert("title".to_string(), format!("Alarm event {}", event.event_type));
        message.notification.insert("body".to_string(), event.message.clone());

        message
    }

    /// Empaqueta el estado actual de la alarma como respuesta a un `ping`.
    ///
    /// Usa TTL 0 para que el mensaje se entregue de inmediato o se abandone:
    /// un estado desactualizado es peor que ningún estado. No llena el mapa
    /// `notification`, la respuesta es silenciosa para el usuario.
    pub fn alarm_status(alarm_state: &str) -> Self {
        let mut message = Self::new();

        message.data.insert("raw".to_string(), STATUS_MARKER.to_string());
        message.data.insert("code".to_string(), STATUS_MARKER.to_string());
        message.data.insert("type".to_string(), alarm_state.to_string());
        message.data.insert("message".to_string(), STATUS_MARKER.to_string());
        message.data.insert("timestamp".to_string(), Utc::now().timestamp().to_string());

        message.time_to_live = 0;

        message
    }
}


impl Default for PushMessage {
    fn default() -> Self {
        Self::new()
    }
}


/// Evento de alarma tal como llega por el tubo de eventos de la cola.
/// Todos los campos son obligatorios para los tipos aceptados.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub raw: String,
    pub code: String,
    pub message: String,
    pub timestamp: String,
}


impl QueueEvent {
    pub fn accepted(event_type: &str) -> bool {
        ALERT_TYPES.contains(&event_type)
    }
}


/// Vocabulario fijo de comandos aceptados desde los dispositivos.
///
/// Los seis comandos de acción se reenvían tal cual al tubo de comandos;
/// `Ping` se responde localmente con el estado actual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Arm,
    Disarm,
    Fire,
    Medical,
    Police,
    Ping,
}


impl Command {

    pub fn parse(raw: &str) -> Option<Command> {
        match raw {
            "status" => Some(Command::Status),
            "arm" => Some(Command::Arm),
            "disarm" => Some(Command::Disarm),
            "fire" => Some(Command::Fire),
            "medical" => Some(Command::Medical),
            "police" => Some(Command::Police),
            "ping" => Some(Command::Ping),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Arm => "arm",
            Command::Disarm => "disarm",
            Command::Fire => "fire",
            Command::Medical => "medical",
            Command::Police => "police",
            Command::Ping => "ping",
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(event_type: &str) -> QueueEvent {
        QueueEvent {
            event_type: event_type.to_string(),
            raw: "A3144".to_string(),
            code: "601".to_string(),
            message: "Alarma disparada en zona 1".to_string(),
            timestamp: "1467165600".to_string(),
        }
    }

    #[test]
    fn from_queue_event_fills_data_and_notification() {
        let message = PushMessage::from_queue_event(&sample_event("alarm"));

        assert_eq!(message.priority, Priority::High);
        assert_eq!(message.time_to_live, DEFAULT_TTL_SECS);
        assert_eq!(message.data.get("type").map(String::as_str), Some("alarm"));
        assert_eq!(message.data.get("raw").map(String::as_str), Some("A3144"));
        assert_eq!(message.data.get("code").map(String::as_str), Some("601"));
        assert_eq!(message.data.get("timestamp").map(String::as_str), Some("1467165600"));
        assert_eq!(message.notification.get("badge").map(String::as_str), Some("0"));
        assert_eq!(message.notification.get("sound").map(String::as_str), Some("default"));
        assert_eq!(
            message.notification.get("title").map(String::as_str),
            Some("Alarm event alarm")
        );
        assert_eq!(
            message.notification.get("body"),
            message.data.get("message")
        );
    }

    #[test]
    fn alarm_status_uses_zero_ttl_and_silent_notification() {
        let message = PushMessage::alarm_status(ALARM_STATE_UNKNOWN);

        assert_eq!(message.time_to_live, 0);
        assert_eq!(message.priority, Priority::High);
        assert_eq!(message.data.get("type").map(String::as_str), Some("unknown"));
        assert_eq!(message.data.get("raw").map(String::as_str), Some(STATUS_MARKER));
        assert!(message.data.contains_key("timestamp"));
        assert!(message.notification.is_empty());
    }

    #[test]
    fn push_message_serializes_to_wire_shape() {
        let message = PushMessage::from_queue_event(&sample_event("fault"));
        let wire = serde_json::to_value(&message).expect("serializar");

        assert_eq!(wire["priority"], "high");
        assert_eq!(wire["time_to_live"], 3600);
        assert_eq!(wire["data"]["type"], "fault");
        assert_eq!(wire["notification"]["body"], "Alarma disparada en zona 1");
    }

    #[test]
    fn accepted_covers_exactly_the_alert_types() {
        for event_type in ALERT_TYPES {
            assert!(QueueEvent::accepted(event_type));
        }
        assert!(!QueueEvent::accepted("heartbeat"));
        assert!(!QueueEvent::accepted(""));
    }

    #[test]
    fn command_parse_accepts_the_fixed_vocabulary() {
        assert_eq!(Command::parse("status"), Some(Command::Status));
        assert_eq!(Command::parse("arm"), Some(Command::Arm));
        assert_eq!(Command::parse("disarm"), Some(Command::Disarm));
        assert_eq!(Command::parse("fire"), Some(Command::Fire));
        assert_eq!(Command::parse("medical"), Some(Command::Medical));
        assert_eq!(Command::parse("police"), Some(Command::Police));
        assert_eq!(Command::parse("ping"), Some(Command::Ping));
        assert_eq!(Command::parse("reboot"), None);
        assert_eq!(Command::parse("PING"), None);
    }
}
