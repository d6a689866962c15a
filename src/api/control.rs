use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::registry::SourceId;
use crate::scheduler::CaptureScheduler;

#[derive(Deserialize)]
pub struct ControlRequest {
    pub action: String,
    /// Source id, as a number or a numeric string.
    #[serde(default)]
    pub target: Option<Value>,
}

#[derive(Serialize)]
pub struct ControlResponse {
    pub ok: bool,
    pub message: String,
}

pub fn handle_control_request(mut req: Request, scheduler: Arc<CaptureScheduler>) {
    if req.method() != &Method::Post {
        let _ = req.respond(Response::empty(StatusCode(405)));
        return;
    }

    let mut body = String::new();
    if let Err(err) = req.as_reader().read_to_string(&mut body) {
        let _ = req.respond(Response::from_string(err.to_string()).with_status_code(400));
        return;
    }

    let payload: ControlRequest = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(err) => {
            let _ = req.respond(Response::from_string(err.to_string()).with_status_code(400));
            return;
        }
    };

    let (ok, message) = dispatch_control(&scheduler, &payload.action, payload.target.as_ref());
    log::info!("[api] control {} -> {} ({})", payload.action, ok, message);

    let body = serde_json::to_string(&ControlResponse { ok, message })
        .unwrap_or_else(|_| "{\"ok\":false,\"message\":\"serialization_error\"}".to_string());
    let mut response = Response::from_string(body).with_status_code(StatusCode(200));
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

pub fn dispatch_control(
    scheduler: &CaptureScheduler,
    action: &str,
    target: Option<&Value>,
) -> (bool, String) {
    match action {
        "start" => match scheduler.start() {
            Ok(()) => (true, "scheduler started".to_string()),
            Err(err) => (false, format!("failed to start scheduler: {}", err)),
        },
        "stop" => {
            scheduler.stop();
            (true, "scheduler stopped".to_string())
        }
        "enable" | "disable" => {
            let id = match target.and_then(parse_target) {
                Some(id) => id,
                None => return (false, "missing or invalid target".to_string()),
            };
            if action == "enable" {
                scheduler.enable(id);
                (true, format!("source {} enabled", id))
            } else {
                scheduler.disable(id);
                (true, format!("source {} disabled", id))
            }
        }
        "enable_all" => {
            scheduler.enable_all();
            (true, "all sources enabled".to_string())
        }
        "disable_all" => {
            scheduler.disable_all();
            (true, "all sources disabled".to_string())
        }
        _ => (false, "unknown action".to_string()),
    }
}

fn parse_target(value: &Value) -> Option<SourceId> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| SourceId::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
