//! Route builders for every gateway operation.

use percent_encoding::utf8_percent_encode;

use crate::constants::{API_VERSION_PARAM, SESSION_ID_PARAM, STORE_ROOT};
use crate::path::{SEGMENT, StorePath};

/// HTTP verb of a gateway route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Get,
    Put,
    Post,
    Delete,
}

/// A gateway request target: verb, path below the endpoint, and query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: RouteMethod,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
}

impl Route {
    /// `PUT /store/{path}`: single-shot write of a whole object.
    pub fn put_object(path: &StorePath) -> Self {
        Self {
            method: RouteMethod::Put,
            path: format!("{STORE_ROOT}/{}", path.encoded()),
            query: Vec::new(),
        }
    }

    /// `PUT /store/{path}/$/uploadChunk?session-id={id}`.
    pub fn upload_chunk(path: &StorePath, session_id: &str) -> Self {
        Self {
            method: RouteMethod::Put,
            path: format!("{STORE_ROOT}/{}/$/uploadChunk", path.encoded()),
            query: vec![(SESSION_ID_PARAM, session_id.to_string())],
        }
    }

    /// `POST /store/$/commitUploadSession?session-id={id}`.
    pub fn commit_session(session_id: &str) -> Self {
        Self {
            method: RouteMethod::Post,
            path: format!("{STORE_ROOT}/$/commitUploadSession"),
            query: vec![(SESSION_ID_PARAM, session_id.to_string())],
        }
    }

    /// `DELETE /store/$/deleteUploadSession?session-id={id}`.
    pub fn delete_session(session_id: &str) -> Self {
        Self {
            method: RouteMethod::Delete,
            path: format!("{STORE_ROOT}/$/deleteUploadSession"),
            query: vec![(SESSION_ID_PARAM, session_id.to_string())],
        }
    }

    /// `PUT /store/{dir}/_marker`: zero-byte directory marker.
    pub fn put_marker(dir: &StorePath) -> Self {
        Self::put_object(&dir.marker())
    }

    /// `GET /store`: connectivity probe.
    pub fn probe() -> Self {
        Self {
            method: RouteMethod::Get,
            path: STORE_ROOT.to_string(),
            query: Vec::new(),
        }
    }

    /// Full URL below `endpoint`, with `api-version` appended to the query.
    pub fn url(&self, endpoint: &str, api_version: &str) -> String {
        let mut url = format!("{}/{}", endpoint.trim_end_matches('/'), self.path);
        let params = self
            .query
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .chain(std::iter::once((API_VERSION_PARAM, api_version)));

        for (i, (key, value)) in params.enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(&utf8_percent_encode(value, SEGMENT).to_string());
        }
        url
    }
}
