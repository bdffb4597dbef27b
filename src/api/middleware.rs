// Request logging

use actix_web::middleware::Logger;

/// Access log line per request, emitted through the `log` facade that
/// tracing-subscriber picks up.
pub fn request_logger() -> Logger {
    Logger::new("%a \"%r\" %s %b %Dms").exclude("/health")
}
