use std::sync::Arc;
use std::thread;

use tiny_http::{Method, Response, Server, StatusCode};

use crate::monitoring;
use crate::scheduler::CaptureScheduler;

pub mod control;
pub mod status;

pub fn start_api_server(bind: &str, scheduler: Arc<CaptureScheduler>) -> anyhow::Result<()> {
    let server = Server::http(bind).map_err(|e| anyhow::anyhow!(e))?;
    log::info!("[api] server on {}", bind);

    thread::Builder::new().name("api".into()).spawn(move || {
        for req in server.incoming_requests() {
            let url = req.url().to_string();
            let path = url.split_once('?').map(|(p, _)| p).unwrap_or(url.as_str());

            match (req.method(), path) {
                (&Method::Get, "/health") => {
                    monitoring::handle_health_request(req, &scheduler);
                }
                (&Method::Get, "/metrics") => {
                    monitoring::handle_metrics_request(req, &scheduler);
                }
                (&Method::Get, "/api/status") => {
                    status::handle_status_request(req, scheduler.clone());
                }
                (&Method::Post, "/api/control") => {
                    control::handle_control_request(req, scheduler.clone());
                }
                _ => {
                    let _ = req.respond(Response::empty(StatusCode(404)));
                }
            }
        }
    })?;

    Ok(())
}
