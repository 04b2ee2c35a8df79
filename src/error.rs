use thiserror::Error;

/// Errors surfaced by the cache and the attraction accessors.
#[derive(Error, Debug)]
pub enum Error {
  #[error("{0} is not available")]
  NotFound(String),

  #[error("Network error: {0}")]
  Connectivity(String),

  #[error("Malformed data: {0}")]
  DataFormat(String),

  #[error("Storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("Invalid URL: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  /// Map a non-success HTTP status for `what` (e.g. "channel wdw.facilitystatus.1_0").
  pub fn from_status(status: reqwest::StatusCode, what: &str) -> Self {
    match status.as_u16() {
      404 => Error::NotFound(what.to_string()),
      _ => Error::Connectivity(format!("{} returned status {}", what, status)),
    }
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      Error::DataFormat(e.to_string())
    } else {
      Error::Connectivity(e.to_string())
    }
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Error::DataFormat(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_maps_missing_to_not_found() {
    let err = Error::from_status(reqwest::StatusCode::NOT_FOUND, "channel x");
    assert!(matches!(err, Error::NotFound(ref what) if what == "channel x"));
  }

  #[test]
  fn test_from_status_maps_server_errors_to_connectivity() {
    let err = Error::from_status(reqwest::StatusCode::BAD_GATEWAY, "schedule");
    assert!(matches!(err, Error::Connectivity(_)));
  }
}
