//! Metric names recorded by the session engine.
//!
//! The library only records; installing an exporter is left to the
//! embedding application.

/// Sessions constructed (counter).
pub const SESSIONS_OPENED_TOTAL: &str = "sockio_sessions_opened_total";
/// Sessions shut down (counter, labels: cause).
pub const SESSIONS_CLOSED_TOTAL: &str = "sockio_sessions_closed_total";
/// Frames read from transports (counter).
pub const FRAMES_RECEIVED_TOTAL: &str = "sockio_frames_received_total";
/// Frames written to transports (counter).
pub const FRAMES_SENT_TOTAL: &str = "sockio_frames_sent_total";
/// Inbound messages dropped without dispatch (counter, labels: reason).
pub const MESSAGES_DROPPED_TOTAL: &str = "sockio_messages_dropped_total";
/// Sends refused because the outbound queue was full (counter, labels: kind).
pub const SEND_OVERFLOWS_TOTAL: &str = "sockio_send_overflows_total";
/// Acknowledged requests that hit their deadline (counter).
pub const ACK_TIMEOUTS_TOTAL: &str = "sockio_ack_timeouts_total";
/// Handler invocations that panicked (counter).
pub const HANDLER_PANICS_TOTAL: &str = "sockio_handler_panics_total";
/// Sessions marked as above the backpressure threshold (counter).
pub const OVERFLOW_MARKS_TOTAL: &str = "sockio_overflow_marks_total";
/// Sessions currently above the backpressure threshold (gauge).
pub const OVERFLOW_SESSIONS: &str = "sockio_overflow_sessions";
