use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

const APPLICATION_JSON: &str = "application/json";

#[derive(Serialize)]
struct Status<'a> {
    status: u16,
    message: &'a str,
}

/// Writes `value` as a JSON response.
pub fn write_json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut resp = (status, body).into_response();
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
            resp
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Writes the `{"status": .., "message": ..}` body used by every
/// response the gate produces itself.
pub fn write_status(status: StatusCode, message: &str) -> Response {
    write_json(
        status,
        &Status {
            status: status.as_u16(),
            message,
        },
    )
}
