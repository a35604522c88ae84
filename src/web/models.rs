use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::library::error::LibraryError;
use crate::library::ClipChoice;

#[derive(Deserialize)]
pub struct RandomQuery {
    pub target: Option<String>,
    pub preview: Option<String>,
}

impl RandomQuery {
    pub fn is_preview(&self) -> bool {
        self.preview
            .as_deref()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false)
    }
}

// Times are floored to centiseconds so that start + length never exceeds
// the reported duration.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RandomClip {
    pub file: String,
    pub start: f64,
    pub length: f64,
    pub dur: f64,
}

impl From<ClipChoice> for RandomClip {
    fn from(clip: ClipChoice) -> Self {
        Self {
            file: clip.file,
            start: centis(clip.start),
            length: centis(clip.length),
            dur: centis(clip.duration),
        }
    }
}

fn centis(secs: f64) -> f64 {
    (secs * 100.0).floor() / 100.0
}

#[derive(Deserialize)]
pub struct SessionRequest {
    pub id: String,
}

#[derive(Serialize)]
pub struct SessionStarted {
    pub ok: bool,
    pub id: String,
}

#[derive(Serialize)]
pub struct SessionEnded {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound => write!(f, "video not found"),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody::new(self.to_string()))
    }
}

impl From<LibraryError> for ApiError {
    fn from(e: LibraryError) -> Self {
        match e {
            LibraryError::NotFound(_) => ApiError::NotFound,
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}
