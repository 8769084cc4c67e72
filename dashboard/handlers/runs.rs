use std::io::Cursor;

use serde::Serialize;
use tiny_http::Response;

use captcha_trainer::experiment::{list_runs, RunSnapshot, RunStatus};

use crate::render::{html_escape, render_page};
use crate::routes::{html_response, json_response, not_found};
use crate::state::SharedState;

/// One row of the run list.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub model_id: String,
    pub status: RunStatus,
    pub epochs: usize,
    pub best_val_accuracy: Option<f64>,
    pub best_epoch: Option<usize>,
}

impl RunSummary {
    fn from_snapshot(snap: &RunSnapshot) -> RunSummary {
        RunSummary {
            name: snap.metadata.name.clone(),
            model_id: snap.metadata.model_id.clone(),
            status: snap.status,
            epochs: snap.history.len(),
            best_val_accuracy: snap.best.map(|b| b.val_accuracy),
            best_epoch: snap.best.map(|b| b.epoch),
        }
    }
}

/// Runs under the experiment root; unreadable `run.json` files are skipped.
pub fn summaries(state: &SharedState) -> Vec<RunSummary> {
    list_runs(state.root())
        .unwrap_or_default()
        .iter()
        .filter_map(|dir| RunSnapshot::load(dir).ok())
        .map(|snap| RunSummary::from_snapshot(&snap))
        .collect()
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::StoppedEarly => "stopped_early",
        RunStatus::Interrupted => "interrupted",
        RunStatus::Failed => "failed",
    }
}

fn fmt_acc(acc: Option<f64>) -> String {
    acc.map(|a| format!("{:.2}%", a * 100.0)).unwrap_or_else(|| "–".into())
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

pub fn handle_index(state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let runs = summaries(&state);
    let body = if runs.is_empty() {
        format!("<p>No runs under <code>{}</code> yet.</p>", html_escape(&state.root().display().to_string()))
    } else {
        let rows: String = runs
            .iter()
            .map(|r| {
                format!(
                    r#"<tr><td><a href="/runs/{name}">{name}</a></td><td>{model}</td><td class="status-{status}">{status}</td><td>{epochs}</td><td>{acc}</td></tr>"#,
                    name = html_escape(&r.name),
                    model = html_escape(&r.model_id),
                    status = status_label(r.status),
                    epochs = r.epochs,
                    acc = fmt_acc(r.best_val_accuracy),
                )
            })
            .collect();
        format!(
            "<table><tr><th>Run</th><th>Model</th><th>Status</th><th>Epochs</th><th>Best val acc</th></tr>{}</table>",
            rows
        )
    };
    html_response(render_page("Experiments", &body, None))
}

// ---------------------------------------------------------------------------
// GET /runs/<name>
// ---------------------------------------------------------------------------

const LIVE_SCRIPT: &str = r#"
const log = document.getElementById('live');
const es = new EventSource(location.pathname + '/events');
es.addEventListener('scalar', e => {
  const ev = JSON.parse(e.data);
  log.textContent += `epoch ${ev.epoch}  ${ev.name} = ${ev.value.toFixed(4)}\n`;
  log.scrollTop = log.scrollHeight;
});
es.addEventListener('done', () => es.close());
"#;

pub fn render_detail(snap: &RunSnapshot) -> String {
    let m = &snap.metadata;
    let rows: String = snap
        .history
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{:.4}</td><td>{:.4}</td><td>{:.4}</td><td>{:.4}</td><td>{:.2e}</td><td>{}</td></tr>",
                r.epoch, r.train_loss, r.train_accuracy, r.val_loss, r.val_accuracy, r.learning_rate, r.elapsed_ms
            )
        })
        .collect();
    let best = match snap.best {
        Some(b) => format!("best val acc {} at epoch {}", fmt_acc(Some(b.val_accuracy)), b.epoch),
        None => "no completed epoch yet".to_string(),
    };
    format!(
        r#"<p><a href="/">&larr; all runs</a> · <a href="/api/runs/{name}">JSON</a></p>
<p>model <b>{model}</b> · {params} parameters · {train} train / {valid} valid samples · status <span class="status-{status}">{status}</span> · {best}</p>
<table><tr><th>Epoch</th><th>Train loss</th><th>Train acc</th><th>Val loss</th><th>Val acc</th><th>LR</th><th>ms</th></tr>{rows}</table>
<h2>Live events</h2><pre id="live"></pre>"#,
        name = html_escape(&m.name),
        model = html_escape(&m.model_id),
        params = m.num_parameters,
        train = m.train_samples,
        valid = m.valid_samples,
        status = status_label(snap.status),
        best = best,
        rows = rows,
    )
}

pub fn handle_detail(name: &str, state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let snap = match state.run_dir(name).and_then(|dir| RunSnapshot::load(&dir).ok()) {
        Some(s) => s,
        None => return not_found(),
    };
    html_response(render_page(name, &render_detail(&snap), Some(LIVE_SCRIPT)))
}

// ---------------------------------------------------------------------------
// GET /api/runs, GET /api/runs/<name>
// ---------------------------------------------------------------------------

pub fn handle_api_list(state: SharedState) -> Response<Cursor<Vec<u8>>> {
    match serde_json::to_string(&summaries(&state)) {
        Ok(json) => json_response(json),
        Err(_) => not_found(),
    }
}

pub fn handle_api_detail(name: &str, state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let snap = match state.run_dir(name).and_then(|dir| RunSnapshot::load(&dir).ok()) {
        Some(s) => s,
        None => return not_found(),
    };
    match serde_json::to_string(&snap) {
        Ok(json) => json_response(json),
        Err(_) => not_found(),
    }
}
