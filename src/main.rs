use std::io::{self, BufRead, Write};
use termreportd::config::AppConfig;
use termreportd::{db, ipc, telemetry};

fn main() {
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("termreportd: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = telemetry::init(&config.telemetry) {
        eprintln!("termreportd: {e}");
    }

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = &config.workspace {
        match db::open_db(path) {
            Ok(conn) => {
                tracing::info!(workspace = %path.display(), "workspace opened at startup");
                state.workspace = Some(path.clone());
                state.db = Some(conn);
            }
            Err(e) => tracing::error!(workspace = %path.display(), error = %e, "failed to open workspace"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to.
                tracing::warn!(error = %e, "discarding malformed request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
