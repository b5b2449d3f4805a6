/// Largest payload sent as one single-shot write (2 MiB, inclusive).
pub const SINGLE_SHOT_THRESHOLD: usize = 2 * 1024 * 1024;

/// Size of each chunk in an upload session (4 MiB). The final chunk may be shorter.
pub const SESSION_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Object name written under a directory to make a flat store render it.
pub const DIRECTORY_MARKER_NAME: &str = "_marker";

/// API version sent with every gateway request unless overridden.
pub const DEFAULT_API_VERSION: &str = "6.0";

/// Root segment of every gateway route.
pub const STORE_ROOT: &str = "store";

/// Query parameter carrying the upload session id.
pub const SESSION_ID_PARAM: &str = "session-id";

/// Query parameter carrying the API version.
pub const API_VERSION_PARAM: &str = "api-version";

/// Content type of single-shot and chunk bodies.
pub const OCTET_STREAM: &str = "application/octet-stream";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_exceeds_single_shot_threshold() {
        assert!(SESSION_CHUNK_SIZE > SINGLE_SHOT_THRESHOLD);
        assert_eq!(SINGLE_SHOT_THRESHOLD, 2_097_152);
        assert_eq!(SESSION_CHUNK_SIZE, 4_194_304);
    }
}
