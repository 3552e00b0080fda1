//! Cliente del protocolo de texto de beanstalk.
//!
//! Implementa el subconjunto del protocolo que el relé necesita: `watch` y
//! `reserve-with-timeout` del lado consumidor, `use` y `put` del lado
//! productor, y `delete` para confirmar el consumo de cada trabajo.
//! Cada conexión pertenece a una única tarea; no hay pooling.


use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;


/// Categorización de errores del cliente de la cola.
#[derive(Debug)]
pub enum QueueError {
    /// Falla de transporte (conexión caída, EOF, timeout del SO).
    Io(std::io::Error),
    /// El servidor respondió algo fuera del protocolo esperado.
    Protocol(String),
}


impl From<std::io::Error> for QueueError {
    fn from(e: std::io::Error) -> Self {
        QueueError::Io(e)
    }
}


/// Trabajo reservado del tubo de eventos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: u64,
    pub body: Vec<u8>,
}


/// Conexión a un servidor beanstalk.
pub struct QueueClient {
    stream: BufStream<TcpStream>,
}


impl QueueClient {

    pub async fn connect(host: &str, port: u16) -> Result<Self, QueueError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self { stream: BufStream::new(stream) })
    }

    /// Suscribe la conexión a un tubo para las reservas posteriores.
    pub async fn watch(&mut self, tube: &str) -> Result<(), QueueError> {
        let reply = self.command(&format!("watch {tube}")).await?;
        if reply.starts_with("WATCHING") {
            Ok(())
        } else {
            Err(QueueError::Protocol(reply))
        }
    }

    /// Selecciona el tubo destino de los `put` posteriores.
    pub async fn use_tube(&mut self, tube: &str) -> Result<(), QueueError> {
        let reply = self.command(&format!("use {tube}")).await?;
        if reply.starts_with("USING") {
            Ok(())
        } else {
            Err(QueueError::Protocol(reply))
        }
    }

    /// Reserva bloqueante de hasta `seconds` segundos (long poll).
    ///
    /// Devuelve `Ok(None)` cuando el tiempo se agota sin trabajos, que no es
    /// un error: el bucle del consumidor simplemente vuelve a reservar.
    pub async fn reserve_with_timeout(&mut self, seconds: u64) -> Result<Option<Job>, QueueError> {
        let reply = self.command(&format!("reserve-with-timeout {seconds}")).await?;

        if let Some(rest) = reply.strip_prefix("RESERVED ") {
            let mut parts = rest.split_whitespace();
            let id = parts.next().and_then(|v| v.parse::<u64>().ok());
            let size = parts.next().and_then(|v| v.parse::<usize>().ok());

            match (id, size) {
                (Some(id), Some(size)) => {
                    // El cuerpo viene seguido de un \r\n final.
                    let mut body = vec![0u8; size + 2];
                    self.stream.read_exact(&mut body).await?;
                    body.truncate(size);
                    Ok(Some(Job { id, body }))
                }
                _ => Err(QueueError::Protocol(reply)),
            }
        } else if reply == "TIMED_OUT" || reply == "DEADLINE_SOON" {
            Ok(None)
        } else {
            Err(QueueError::Protocol(reply))
        }
    }

    /// Borra un trabajo ya procesado. `NOT_FOUND` significa que el trabajo
    /// ya no existe, lo cual no es una falla para el consumidor.
    pub async fn delete(&mut self, id: u64) -> Result<(), QueueError> {
        let reply = self.command(&format!("delete {id}")).await?;
        if reply == "DELETED" || reply == "NOT_FOUND" {
            Ok(())
        } else {
            Err(QueueError::Protocol(reply))
        }
    }

    /// Encola un trabajo en el tubo seleccionado con `use_tube`.
    pub async fn put(&mut self, priority: u32, delay: u32, ttr: u32, body: &[u8]) -> Result<u64, QueueError> {
        let header = format!("put {priority} {delay} {ttr} {}\r\n", body.len());
        self.stream.write_all(header.as_bytes()).await?;
        self.stream.write_all(body).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;

        let reply = self.read_line().await?;
        if let Some(raw_id) = reply.strip_prefix("INSERTED ") {
            raw_id.trim().parse::<u64>()
                .map_err(|_| QueueError::Protocol(reply.clone()))
        } else {
            Err(QueueError::Protocol(reply))
        }
    }

    async fn command(&mut self, line: &str) -> Result<String, QueueError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_line().await
    }

    async fn read_line(&mut self) -> Result<String, QueueError> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(QueueError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "conexión cerrada por el servidor de colas",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
