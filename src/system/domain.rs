//! Módulo de configuración central y gestión del entorno de ejecución.
//!
//! Este módulo actúa como la fuente única de verdad para la configuración de la aplicación.
//! Se encarga de leer las variables de entorno, establecer valores por defecto seguros
//! y proveer las estructuras necesarias para iniciar los subsistemas (Cola, Gateway, Logging).
//!
//! # Funcionalidades Principales
//! * **Carga de Configuración:** Lee de `.env` en desarrollo y variables de sistema en producción.
//! * **Observabilidad:** Configura `tracing_subscriber` para logs estructurados o legibles.
//! * **Constantes Operativas:** Define timeouts y esperas de reintento para I/O.
//!


use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};


/// Representa la configuración global del sistema y el estado del entorno.
///
/// Esta estructura centraliza todas las variables de entorno y configuraciones
/// necesarias para iniciar los servicios (Cola de trabajos, Gateway de push, Logging).
///
#[derive(Debug)]
pub struct System {
    /// Clave de API del gateway de push (FCM).
    /// **Requerido**.
    pub gcm_api_key: String,

    /// Identificador del emisor asignado por el gateway de push.
    /// **Requerido**.
    pub gcm_sender_id: String,

    /// Host del servidor de colas beanstalk.
    /// Por defecto: `127.0.0.1`.
    pub beanstalk_host: String,

    /// Puerto del servidor de colas beanstalk.
    /// Por defecto: `11300`.
    pub beanstalk_port: u16,

    /// Tubo del cual se consumen los eventos de alarma.
    /// Por defecto: `alert_gcm`.
    pub tube_events: String,

    /// Tubo al cual se publican los comandos hacia la alarma.
    /// Por defecto: `commands`.
    pub tube_commands: String,

    /// Endpoint HTTP de envío del gateway de push.
    /// Por defecto: el endpoint legacy de FCM.
    pub fcm_endpoint: String,

    /// Host del flujo de mensajes entrantes (dispositivo → servidor) del gateway.
    /// Por defecto: `127.0.0.1`.
    pub upstream_host: String,

    /// Puerto del flujo de mensajes entrantes.
    /// Por defecto: `5235`.
    pub upstream_port: u16,

    /// Entorno de ejecución actual (`development`, `staging`, `production`).
    /// Afecta el formato de logs y la carga de archivos `.env`.
    pub environment: String,

    /// Nivel de detalle de los logs (ej. `info`, `debug`, `warn`).
    /// Se autoconfigura según el `environment` si no se especifica.
    pub rust_log: String,
}


impl System {

    /// Carga la configuración desde las variables de entorno.
    ///
    /// # Comportamiento
    /// * Si `ENVIRONMENT` es "development", intenta cargar un archivo `.env`.
    /// * Si falta alguna variable requerida (como `GCM_API_KEY`), el programa entrará en pánico (`panic`).
    /// * Establece valores por defecto para variables opcionales.
    ///
    /// # Panics
    /// * Si `GCM_API_KEY` o `GCM_SENDER_ID` no están definidas.
    /// * Si las variables numéricas (`BEANSTALK_PORT`, `GCM_UPSTREAM_PORT`) no son números válidos.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {

        info!("Info: creando objeto system");

        let environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".into());

        if environment == "development" {
            dotenv::dotenv().ok();
        }

        Ok(System {
            gcm_api_key: env::var("GCM_API_KEY")
                .expect("GCM_API_KEY no está configurada"),

            gcm_sender_id: env::var("GCM_SENDER_ID")
                .expect("GCM_SENDER_ID no está configurada"),

            beanstalk_host: env::var("BEANSTALK_HOST")
                .unwrap_or("127.0.0.1".to_string()),

            beanstalk_port: env::var("BEANSTALK_PORT")
                .unwrap_or("11300".to_string())
                .parse()
                .expect("BEANSTALK_PORT debe ser un número"),

            tube_events: env::var("BEANSTALK_TUBES_EVENTS")
                .unwrap_or("alert_gcm".to_string()),

            tube_commands: env::var("BEANSTALK_TUBES_COMMANDS")
                .unwrap_or("commands".to_string()),

            fcm_endpoint: env::var("FCM_ENDPOINT")
                .unwrap_or("https://fcm.googleapis.com/fcm/send".to_string()),

            upstream_host: env::var("GCM_UPSTREAM_HOST")
                .unwrap_or("127.0.0.1".to_string()),

            upstream_port: env::var("GCM_UPSTREAM_PORT")
                .unwrap_or("5235".to_string())
                .parse()
                .expect("GCM_UPSTREAM_PORT debe ser un número"),

            rust_log: env::var("RUST_LOG")
                .unwrap_or_else(|_| {
                    match environment.as_str() {
                        "development" => "debug".to_string(),
                        "staging" => "info".to_string(),
                        _ => "warn".to_string(),
                    }
                }),

            environment,
        })
    }
}


/// Inicializa el sistema de trazabilidad y logs (Tracing).
///
/// Configura el formato de salida basándose en el entorno:
/// * **Production**: Salida JSON (para logs estructurados en la nube).
/// * **Development/Otros**: Salida "Pretty" (colores y formato legible).
///
/// # Argumentos
/// * `system`: Referencia a la configuración cargada para leer el nivel de log (`rust_log`).
pub fn init_tracing(system: &System) {

    let filter = EnvFilter::try_new(&system.rust_log)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(false);

    if system.environment == "production" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}


/// Constantes de configuración para el cliente del gateway de push.
pub mod gateway_const {
    use tokio::time::Duration;
    pub const TIMEOUT_SECS: u64 = 10;
    pub const RETRY_WAIT: Duration = Duration::from_secs(30);
}
