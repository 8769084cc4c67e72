use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;

use tiny_http::Request;

use captcha_trainer::experiment::{RunSnapshot, RunStatus};
use captcha_trainer::sink::{SinkEvent, EVENTS_FILE};

use crate::state::SharedState;
use crate::util::sse::{format_sse_event, format_sse_keepalive, write_sse, SSE_HEADER};

/// Converts one `events.jsonl` line into an SSE frame named after the event
/// kind. Unparseable lines are skipped.
pub fn frame_for_line(line: &str) -> Option<String> {
    let event: SinkEvent = serde_json::from_str(line.trim()).ok()?;
    let (name, json) = match &event {
        SinkEvent::Scalar(s) => ("scalar", serde_json::to_string(s).ok()?),
        SinkEvent::Figure { .. } => ("figure", serde_json::to_string(&event).ok()?),
        SinkEvent::Text { .. } => ("text", serde_json::to_string(&event).ok()?),
    };
    Some(format_sse_event(name, &json))
}

fn run_finished(run_dir: &Path) -> bool {
    RunSnapshot::load(run_dir).map(|s| s.status != RunStatus::Running).unwrap_or(false)
}

/// `GET /runs/<name>/events`: replays `events.jsonl` and then follows it.
///
/// Every poll without new lines sends a `: ping` comment. When the run is no
/// longer `running` and the file is exhausted a `done` event closes the
/// stream.
pub fn handle(request: Request, name: &str, state: SharedState) {
    let Some(run_dir) = state.run_dir(name) else {
        let _ = request.respond(crate::routes::not_found());
        return;
    };

    let mut writer = request.into_writer();
    if !write_sse(&mut writer, SSE_HEADER) {
        return;
    }

    let mut reader: Option<BufReader<File>> = None;
    // Holds an unterminated tail until the sink finishes the line.
    let mut line = String::new();
    loop {
        if reader.is_none() {
            reader = File::open(run_dir.join(EVENTS_FILE)).ok().map(BufReader::new);
        }

        let mut sent_any = false;
        if let Some(r) = reader.as_mut() {
            loop {
                match r.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) if !line.ends_with('\n') => break,
                    Ok(_) => {}
                }
                if let Some(frame) = frame_for_line(&line) {
                    if !write_sse(&mut writer, &frame) {
                        return;
                    }
                    sent_any = true;
                }
                line.clear();
            }
        }

        if !sent_any {
            if run_finished(&run_dir) {
                let _ = write_sse(&mut writer, &format_sse_event("done", "{}"));
                return;
            }
            if !write_sse(&mut writer, format_sse_keepalive()) {
                return;
            }
        }
        thread::sleep(state.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_lines_become_scalar_frames() {
        let frame = frame_for_line(r#"{"kind":"scalar","name":"valid/loss","value":0.5,"epoch":3}"#).unwrap();
        assert_eq!(frame, "event: scalar\ndata: {\"name\":\"valid/loss\",\"value\":0.5,\"epoch\":3}\n\n");
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(frame_for_line("not json").is_none());
    }
}
