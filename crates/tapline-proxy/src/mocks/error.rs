use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("failed to read mocks file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse mocks file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid URL pattern '{pattern}' in mock #{index}: {source}")]
    Pattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to watch mocks file: {0}")]
    Watcher(#[source] notify::Error),
}
