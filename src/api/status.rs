use serde::Serialize;
use std::sync::Arc;

use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::core::clock::utc_ns_now;
use crate::scheduler::{CaptureScheduler, SourceStatus};

#[derive(Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub ticks: u64,
    pub in_flight: usize,
    pub sources: Vec<SourceStatus>,
    pub timestamp_ms: u64,
}

pub fn handle_status_request(req: Request, scheduler: Arc<CaptureScheduler>) {
    if req.method() != &Method::Get {
        let _ = req.respond(Response::empty(StatusCode(405)));
        return;
    }

    let status = build_status(&scheduler);
    let body = serde_json::to_string(&status).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::from_string(body).with_status_code(StatusCode(200));
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

pub fn build_status(scheduler: &CaptureScheduler) -> StatusResponse {
    StatusResponse {
        running: scheduler.is_running(),
        ticks: scheduler.ticks(),
        in_flight: scheduler.in_flight(),
        sources: scheduler.status(),
        timestamp_ms: utc_ns_now() / 1_000_000,
    }
}
