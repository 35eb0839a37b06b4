use log::info;

/// Capacidad de notificación (fallos, peticiones completadas y avisos
/// emitidos por los handlers).
pub trait Notifier: Send + Sync {
  fn notify(&self, subject: &str, message: &str);
}

/// Notificador por defecto: escribe en el log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn notify(&self, subject: &str, message: &str) {
    info!(target: "jobx::notify", "{}: {}", subject, message);
  }
}
