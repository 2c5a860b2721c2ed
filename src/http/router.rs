//! Maps a method and path onto exactly one handler.

use crate::http::request::Method;

pub const ECHO_PREFIX: &str = "/echo/";
pub const FILES_PREFIX: &str = "/files/";

/// The handler selected for a request. Borrowed suffixes point into the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Root,
    /// Everything after `/echo/`.
    Echo(&'a str),
    UserAgent,
    /// Everything after `/files/`.
    Files(&'a str),
    NotFound,
    MethodNotAllowed,
}

/// First match wins: `/`, `/echo/*`, `/user-agent`, `/files/*`, then 404.
/// Every non-GET method gets 405 regardless of path.
pub fn route<'a>(method: &Method, path: &'a str) -> Route<'a> {
    if *method != Method::GET {
        return Route::MethodNotAllowed;
    }

    if path == "/" {
        Route::Root
    } else if let Some(rest) = path.strip_prefix(ECHO_PREFIX) {
        Route::Echo(rest)
    } else if path == "/user-agent" {
        Route::UserAgent
    } else if let Some(rest) = path.strip_prefix(FILES_PREFIX) {
        Route::Files(rest)
    } else {
        Route::NotFound
    }
}
