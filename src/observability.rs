use biometrics::{Collector, Counter, Moments};

pub(crate) static SESSION_SENDS: Counter = Counter::new("petchat.session.sends");
pub(crate) static SESSION_SENDS_IGNORED: Counter = Counter::new("petchat.session.sends_ignored");
pub(crate) static SESSION_SENDS_REJECTED: Counter =
    Counter::new("petchat.session.sends_rejected");
pub(crate) static SESSION_FAILURES: Counter = Counter::new("petchat.session.failures");
pub(crate) static SESSION_INTERRUPTS: Counter = Counter::new("petchat.session.interrupts");
pub(crate) static SESSION_SEND_DURATION: Moments =
    Moments::new("petchat.session.send_duration_seconds");

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("petchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("petchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("petchat.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("petchat.client.request_duration_seconds");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("petchat.client.retry_backoff_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("petchat.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("petchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("petchat.stream.bytes");
pub(crate) static STREAM_TTFB: Moments = Moments::new("petchat.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("petchat.stream.duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&SESSION_SENDS);
    collector.register_counter(&SESSION_SENDS_IGNORED);
    collector.register_counter(&SESSION_SENDS_REJECTED);
    collector.register_counter(&SESSION_FAILURES);
    collector.register_counter(&SESSION_INTERRUPTS);
    collector.register_moments(&SESSION_SEND_DURATION);

    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);
}
