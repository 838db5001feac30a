//! Error types for the drift synchronization engine.

use snafu::prelude::*;

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// No catalogs configured.
    #[snafu(display("At least one catalog must be configured"))]
    NoCatalogs,

    /// Catalog source path is empty.
    #[snafu(display("Source path cannot be empty for catalog '{catalog}'"))]
    EmptySourcePath { catalog: String },

    /// Application id is empty.
    #[snafu(display("Delivery application_id cannot be empty"))]
    EmptyApplicationId,

    /// Safety margin out of range.
    #[snafu(display("safety_margin_ratio must be in [0, 1), got {ratio}"))]
    InvalidSafetyMargin { ratio: f64 },

    /// Byte quota too small to hold any payload.
    #[snafu(display("byte_quota must be positive, got {quota}"))]
    InvalidByteQuota { quota: usize },
}

/// Errors that can occur while reading a record stream.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to open the stream.
    #[snafu(display("Failed to open record stream {path}"))]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// Failed to read the next line.
    #[snafu(display("Failed to read from record stream {path}"))]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// A line failed to parse as a record.
    #[snafu(display("Malformed record at {path}:{line}"))]
    Parse {
        path: String,
        line: usize,
        source: serde_json::Error,
    },

    /// Keys were not in ascending order.
    #[snafu(display(
        "Record stream {path} is not sorted: key '{key}' follows '{previous}'"
    ))]
    OutOfOrder {
        path: String,
        key: String,
        previous: String,
    },
}

/// Errors that can occur while writing or promoting a snapshot.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SnapshotError {
    /// Failed to create the snapshot directory.
    #[snafu(display("Failed to create snapshot directory {path}"))]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a record to the pending snapshot.
    #[snafu(display("Failed to write snapshot record to {path}"))]
    Write {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize a record.
    #[snafu(display("Failed to serialize snapshot record"))]
    Serialize { source: serde_json::Error },

    /// Failed to promote the pending snapshot.
    #[snafu(display("Failed to promote snapshot {path}"))]
    Promote {
        path: String,
        source: std::io::Error,
    },
}

/// Errors that can occur during chunk delivery.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeliveryError {
    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build HTTP client"))]
    ClientBuild { source: reqwest::Error },

    /// Failed to serialize a chunk payload.
    #[snafu(display("Failed to serialize chunk payload"))]
    SerializePayload { source: serde_json::Error },
}

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize the Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

/// Errors that can occur while persisting a run report.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts with SnapshotError
#[allow(clippy::enum_variant_names)]
pub enum ReportError {
    /// Failed to create the report directory.
    #[snafu(display("Failed to create report directory {path}"))]
    ReportCreateDir {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write the report file.
    #[snafu(display("Failed to write report to {path}"))]
    ReportWrite {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize the report.
    #[snafu(display("Failed to serialize run report"))]
    ReportSerialize { source: serde_json::Error },
}

/// Top-level errors for a synchronization run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Record stream failure (catalog source or snapshot reader).
    #[snafu(display("Record stream failure: {source}"))]
    Stream { source: SourceError },

    /// Snapshot write or promotion failure.
    #[snafu(display("Snapshot failure: {source}"))]
    Snapshot { source: SnapshotError },

    /// Chunk payload could not be built.
    #[snafu(display("Delivery failure: {source}"))]
    Delivery { source: DeliveryError },

    /// Report persistence failure.
    #[snafu(display("Report failure: {source}"))]
    Report { source: ReportError },

    /// Too many failed chunks; the remote service is presumed unavailable.
    #[snafu(display("Aborted after {failed} failed chunks (limit {limit})"))]
    TooManyFailedChunks { failed: usize, limit: usize },

    /// Catalog task panicked or was cancelled.
    #[snafu(display("Catalog task failed: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

impl From<ConfigError> for SyncError {
    fn from(source: ConfigError) -> Self {
        SyncError::Config { source }
    }
}

impl From<SourceError> for SyncError {
    fn from(source: SourceError) -> Self {
        SyncError::Stream { source }
    }
}

impl From<SnapshotError> for SyncError {
    fn from(source: SnapshotError) -> Self {
        SyncError::Snapshot { source }
    }
}

impl From<DeliveryError> for SyncError {
    fn from(source: DeliveryError) -> Self {
        SyncError::Delivery { source }
    }
}

impl From<ReportError> for SyncError {
    fn from(source: ReportError) -> Self {
        SyncError::Report { source }
    }
}
