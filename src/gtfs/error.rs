use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Missing GTFS file: {0}")]
    MissingFile(String),
    #[error("GTFS parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}
