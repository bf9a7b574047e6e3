use std::io::{self, Read};
use std::path::Path;

use serde_json::{Value, json};
use tiny_http::{Header, Method, Response, Server};

use crate::{JobEnvelope, UserStore, start_sync, sync_status, sync_tick};

pub(crate) fn parse_json_body(request: &mut tiny_http::Request) -> Result<Value, String> {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .map_err(|e| format!("read body: {e}"))?;
    if body.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&body).map_err(|e| format!("json: {e}"))
}

/// Blocking accept loop for the action endpoint. Requests are POST JSON
/// `{action, user, stake|address, force}`; every response is a JSON body.
pub(crate) fn run_action_server(
    bind: &str,
    port: u16,
    data_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{bind}:{port}");
    let server = Server::http(&addr)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("server: {e}")))?;
    eprintln!("[serve] wallet sync endpoint listening on http://{addr}");

    for mut request in server.incoming_requests() {
        if *request.method() != Method::Post {
            respond_json(request, 405, &error_body("POST only"));
            continue;
        }
        let payload = match parse_json_body(&mut request) {
            Ok(payload) => payload,
            Err(err) => {
                respond_json(request, 400, &error_body(&err));
                continue;
            }
        };
        let (code, body) = handle_action(data_dir, &payload);
        respond_json(request, code, &body);
    }
    Ok(())
}

/// Dispatch one action payload. Split from the accept loop so tests can
/// drive it without a socket.
pub(crate) fn handle_action(data_dir: &Path, payload: &Value) -> (u16, Value) {
    let action = payload.get("action").and_then(Value::as_str).unwrap_or("");
    let user = payload.get("user").and_then(Value::as_str).unwrap_or("");

    let store = match UserStore::open(data_dir, user) {
        Ok(store) => store,
        Err(err) => return (400, error_body(&err.to_string())),
    };

    match action {
        "start_wallet_sync" => {
            let stake = payload.get("stake").and_then(Value::as_str).unwrap_or("");
            let address = payload.get("address").and_then(Value::as_str).unwrap_or("");
            let target = if stake.trim().is_empty() { address } else { stake };
            let force = payload.get("force").and_then(Value::as_bool).unwrap_or(false);
            if target.trim().is_empty() {
                return (400, error_body("Missing stake or address for wallet sync."));
            }
            match start_sync(&store, target.trim(), force) {
                Ok(response) => match serde_json::to_value(&response) {
                    Ok(body) => (200, body),
                    Err(err) => (500, error_body(&err.to_string())),
                },
                Err(err) => (500, error_body(&err.to_string())),
            }
        }
        "wallet_sync_status" => envelope_body(JobEnvelope::success(sync_status(&store))),
        "wallet_sync_tick" => match sync_tick(&store) {
            Ok(job) => envelope_body(JobEnvelope::success(job)),
            Err(err) => (500, error_body(&err.to_string())),
        },
        _ => (400, error_body("Unknown action")),
    }
}

fn envelope_body(envelope: JobEnvelope) -> (u16, Value) {
    match serde_json::to_value(&envelope) {
        Ok(body) => (200, body),
        Err(err) => (500, error_body(&err.to_string())),
    }
}

fn error_body(message: &str) -> Value {
    json!({"status": "error", "error": message})
}

fn respond_json(request: tiny_http::Request, code: u16, body: &Value) {
    let mut response = Response::from_string(body.to_string()).with_status_code(code);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    let _ = request.respond(response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncJob;
    use std::path::PathBuf;

    fn temp_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("walletsyncd_test")
            .join(format!("serve_{}_{name}", std::process::id()));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let dir = temp_data_dir("unknown");
        let (code, body) = handle_action(&dir, &json!({"action": "drain_wallet", "user": "bob"}));
        assert_eq!(code, 400);
        assert_eq!(body["status"], "error");
    }

    #[test]
    fn test_missing_user_is_rejected() {
        let dir = temp_data_dir("nouser");
        let (code, body) = handle_action(&dir, &json!({"action": "wallet_sync_status"}));
        assert_eq!(code, 400);
        assert_eq!(body["error"], "User identity missing.");
    }

    #[test]
    fn test_start_without_target_is_rejected() {
        let dir = temp_data_dir("notarget");
        let (code, body) =
            handle_action(&dir, &json!({"action": "start_wallet_sync", "user": "bob"}));
        assert_eq!(code, 400);
        assert_eq!(body["error"], "Missing stake or address for wallet sync.");
    }

    #[test]
    fn test_status_without_job_reads_idle() {
        let dir = temp_data_dir("idle");
        let (code, body) =
            handle_action(&dir, &json!({"action": "wallet_sync_status", "user": "bob"}));
        assert_eq!(code, 200);
        assert_eq!(body["status"], "success");
        assert_eq!(body["job"]["status"], "idle");
        assert_eq!(body["job"]["done"], true);
    }

    #[test]
    fn test_status_reflects_saved_job() {
        let dir = temp_data_dir("running");
        let store = UserStore::open(&dir, "bob").unwrap();
        store.save_job(&SyncJob::new("stake1abc")).unwrap();

        let (code, body) =
            handle_action(&dir, &json!({"action": "wallet_sync_status", "user": "bob"}));
        assert_eq!(code, 200);
        assert_eq!(body["job"]["status"], "running");
        assert_eq!(body["job"]["message"], "Starting scan...");
        assert_eq!(body["job"]["page"], 1);
    }

    #[test]
    fn test_tick_on_idle_wallet_is_a_noop() {
        let dir = temp_data_dir("ticknoop");
        let (code, body) =
            handle_action(&dir, &json!({"action": "wallet_sync_tick", "user": "bob"}));
        assert_eq!(code, 200);
        assert_eq!(body["job"]["status"], "idle");
    }

    #[test]
    fn test_blank_stake_and_address_rejected() {
        let dir = temp_data_dir("addrpick");
        let payload = json!({
            "action": "start_wallet_sync",
            "user": "bob",
            "stake": "",
            "address": "   ",
        });
        let (code, _) = handle_action(&dir, &payload);
        assert_eq!(code, 400);
    }
}
