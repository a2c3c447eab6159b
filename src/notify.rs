use log::info;

/// Outbound alerting seam. Delivery (push, mail) lives outside the core;
/// implementations must be fire-and-forget and must never block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notifier that writes alerts to the application log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!("notification: {title}: {body}");
    }
}
