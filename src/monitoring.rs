use std::fmt::Write;

use tiny_http::{Header, Request, Response, StatusCode};

use crate::scheduler::{CaptureScheduler, SourceMode};

pub fn handle_health_request(req: Request, scheduler: &CaptureScheduler) {
    let running = scheduler.is_running();
    let status = if running { StatusCode(200) } else { StatusCode(503) };
    let body = if running { "ok" } else { "not_running" };
    respond_text(req, body.to_string(), status, "text/plain");
}

pub fn handle_metrics_request(req: Request, scheduler: &CaptureScheduler) {
    respond_text(
        req,
        build_metrics(scheduler),
        StatusCode(200),
        "text/plain; version=0.0.4",
    );
}

fn respond_text(req: Request, body: String, status: StatusCode, content_type: &str) {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

pub fn build_metrics(scheduler: &CaptureScheduler) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# HELP framelift_scheduler_running Whether the tick loop is running.");
    let _ = writeln!(output, "# TYPE framelift_scheduler_running gauge");
    let _ = writeln!(output, "framelift_scheduler_running {}", scheduler.is_running() as u8);

    let _ = writeln!(output, "# HELP framelift_ticks_total Scheduling passes executed.");
    let _ = writeln!(output, "# TYPE framelift_ticks_total counter");
    let _ = writeln!(output, "framelift_ticks_total {}", scheduler.ticks());

    let _ = writeln!(output, "# HELP framelift_cycles_in_flight Cycles dispatched and not yet finished.");
    let _ = writeln!(output, "# TYPE framelift_cycles_in_flight gauge");
    let _ = writeln!(output, "framelift_cycles_in_flight {}", scheduler.in_flight());

    let sources = scheduler.status();
    let series: [(&str, &str, &str, fn(&crate::scheduler::SourceStatus) -> u64); 4] = [
        ("framelift_cycles_total", "counter", "Completed capture cycles per source.", |s| s.cycles),
        ("framelift_cycle_failures_total", "counter", "Cycles that ended without a stored frame.", |s| s.failures),
        ("framelift_relay_failures_total", "counter", "Stored frames that failed to upload.", |s| s.relay_failures),
        ("framelift_source_running", "gauge", "1 when the source is enabled.", |s| {
            (s.mode == SourceMode::Running) as u64
        }),
    ];

    for (name, kind, help, value) in series {
        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} {}", name, kind);
        for source in &sources {
            let _ = writeln!(
                output,
                "{}{{source=\"{}\",name=\"{}\"}} {}",
                name,
                source.id,
                escape_label_value(&source.name),
                value(source)
            );
        }
    }

    output
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(escape_label_value(r#"gate "north"\1"#), r#"gate \"north\"\\1"#);
    }

    #[test]
    fn escapes_newlines() {
        assert_eq!(escape_label_value("gate\nnorth"), r"gate\nnorth");
    }
}
