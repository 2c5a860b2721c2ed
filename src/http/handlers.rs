use std::path::{Path, PathBuf};

use crate::fs::FileSystem;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::router::{route, Route};
use crate::server::ServerContext;

/// Routes `req` and runs the selected handler.
pub async fn handle_request<F: FileSystem>(req: &Request, ctx: &ServerContext<F>) -> Response {
    match route(&req.method, &req.path) {
        Route::Root => Response::ok(),
        Route::Echo(rest) => echo(rest),
        Route::UserAgent => user_agent(req),
        Route::Files(rest) => serve_file(&ctx.fs, ctx.config.directory.as_deref(), rest).await,
        Route::NotFound => Response::not_found(),
        Route::MethodNotAllowed => Response::method_not_allowed(),
    }
}

pub fn echo(content: &str) -> Response {
    Response::text(content.as_bytes())
}

/// Reflects the `User-Agent` header. A missing header gives an empty body.
pub fn user_agent(req: &Request) -> Response {
    let agent = req.header("User-Agent").unwrap_or_default();
    Response::text(agent.as_bytes())
}

/// Serves `directory/suffix` as an octet stream.
///
/// Any failure (no directory configured, traversal attempt, open or read
/// error) is a plain 404. Content-Length always reflects the bytes read.
pub async fn serve_file<F: FileSystem>(fs: &F, directory: Option<&Path>, suffix: &str) -> Response {
    let Some(directory) = directory else {
        return Response::not_found();
    };

    let Some(path) = resolve_file_path(directory, suffix) else {
        tracing::debug!(suffix, "Rejected file path with parent segment");
        return Response::not_found();
    };

    let mut handle = match fs.open(&path).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to open file");
            return Response::not_found();
        }
    };

    match fs.read_all(&mut handle).await {
        Ok(data) => Response::octet_stream(data),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to read file");
            Response::not_found()
        }
    }
}

/// Joins the serve directory and the request suffix.
///
/// Returns `None` if the suffix has a `..` segment. Empty segments (doubled
/// separators, including one at the join) are dropped; no other
/// normalization is done. The directory's bytes are kept as-is, so non-UTF-8
/// roots work.
pub fn resolve_file_path(directory: &Path, suffix: &str) -> Option<PathBuf> {
    if suffix.split('/').any(|segment| segment == "..") {
        return None;
    }

    let mut joined = PathBuf::from(directory.as_os_str().to_os_string());
    for segment in suffix.split('/').filter(|s| !s.is_empty()) {
        joined.push(segment);
    }
    Some(joined)
}
