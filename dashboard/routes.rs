use std::io::Cursor;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::handlers;
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn content_type(value: &'static str) -> Header {
    // Static ASCII pair; from_bytes only rejects non-ASCII input.
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).expect("static header")
}

fn respond_with(status: u16, mime: &'static str, body: Vec<u8>) -> Response<Cursor<Vec<u8>>> {
    let len = body.len();
    Response::new(StatusCode(status), vec![content_type(mime)], Cursor::new(body), Some(len), None)
}

pub fn html_response(body: String) -> Response<Cursor<Vec<u8>>> {
    respond_with(200, "text/html; charset=utf-8", body.into_bytes())
}

pub fn json_response(body: String) -> Response<Cursor<Vec<u8>>> {
    respond_with(200, "application/json", body.into_bytes())
}

pub fn not_found() -> Response<Cursor<Vec<u8>>> {
    respond_with(404, "text/plain", b"404 Not Found".to_vec())
}

fn method_not_allowed() -> Response<Cursor<Vec<u8>>> {
    respond_with(405, "text/plain", b"405 Method Not Allowed".to_vec())
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Routes understood by the dashboard.
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Index,
    Run(&'a str),
    Events(&'a str),
    ApiRuns,
    ApiRun(&'a str),
    NotFound,
}

/// Maps a request path (query already stripped) onto a [`Route`].
pub fn parse_route(path: &str) -> Route<'_> {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return Route::Index;
    }
    if path == "/api/runs" {
        return Route::ApiRuns;
    }
    if let Some(name) = path.strip_prefix("/api/runs/") {
        return Route::ApiRun(name);
    }
    if let Some(rest) = path.strip_prefix("/runs/") {
        return match rest.strip_suffix("/events") {
            Some(name) => Route::Events(name),
            None => Route::Run(rest),
        };
    }
    Route::NotFound
}

/// Dispatches one request. The event stream takes ownership of the request
/// and blocks until the client disconnects or the run finishes.
pub fn dispatch(request: Request, state: SharedState) {
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("");

    if *request.method() != Method::Get {
        let _ = request.respond(method_not_allowed());
        return;
    }

    let response = match parse_route(path) {
        Route::Events(name) => {
            handlers::events::handle(request, name, state);
            return;
        }
        Route::Index => handlers::runs::handle_index(state),
        Route::Run(name) => handlers::runs::handle_detail(name, state),
        Route::ApiRuns => handlers::runs::handle_api_list(state),
        Route::ApiRun(name) => handlers::runs::handle_api_detail(name, state),
        Route::NotFound => not_found(),
    };

    let _ = request.respond(response);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_map_to_routes() {
        assert_eq!(parse_route("/"), Route::Index);
        assert_eq!(parse_route("/api/runs"), Route::ApiRuns);
        assert_eq!(parse_route("/api/runs/r1"), Route::ApiRun("r1"));
        assert_eq!(parse_route("/runs/r1"), Route::Run("r1"));
        assert_eq!(parse_route("/runs/r1/events"), Route::Events("r1"));
        assert_eq!(parse_route("/models"), Route::NotFound);
    }
}
