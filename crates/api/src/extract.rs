//! Request extractors whose rejections render as [`AppError`] bodies.

use axum::extract::FromRequest;

use crate::error::AppError;

/// `Json<T>` whose rejection is a 400 `{"error","code"}` body instead of
/// axum's plain-text 4xx.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
