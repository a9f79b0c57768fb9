use std::time::Duration;

use async_channel::Receiver;
use sightline_config::EngineConfig;
use sightline_core::EngineEvent;
use tokio::time::timeout;

mod gating;
mod maintenance;
mod retries;

pub(crate) const A_KT: &str = r#"import io.ktor.server.routing.*
import io.opentelemetry.api.GlobalOpenTelemetry
import io.opentelemetry.instrumentation.annotations.WithSpan

class A {
    private val tracer = GlobalOpenTelemetry.getTracer("lib")

    @WithSpan("foo-span")
    fun foo() {
        val span = tracer.spanBuilder("foo-span").startSpan()
        routing {
            get("/x") { call.respondText("ok") }
        }
        span.end()
    }
}
"#;

/// Small pools and short timers so tests finish quickly.
pub(crate) fn test_config() -> EngineConfig {
    EngineConfig::load_from_str(
        r#"
[scheduler]
compute_threads = 1
background_threads = 1
io_threads = 1

[discovery]
debounce_ms = 10
backoff_increment_ms = 1
mutation_blackout_ms = 50
"#,
    )
    .unwrap()
}

/// Waits for the first event matching `pred`, failing the test after one second.
pub(crate) async fn wait_for(
    events: &Receiver<EngineEvent>,
    mut pred: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    loop {
        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("engine event")
            .expect("channel open");
        if pred(&event) {
            return event;
        }
    }
}

/// Collects whatever arrives within `window`.
pub(crate) async fn drain(events: &Receiver<EngineEvent>, window: Duration) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Ok(Ok(event)) = timeout(window, events.recv()).await {
        seen.push(event);
    }
    seen
}
