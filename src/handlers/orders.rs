//! Order ingestion endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use tracing::instrument;

use crate::error::AppResult;
use crate::models::CreateOrderResponse;
use crate::state::AppState;

/// Accept a new order and publish it as a command.
///
/// The raw body is handed to the service so that malformed JSON produces the
/// same error shape as any other invalid request.
///
/// # Request Body
///
/// ```json
/// {
///   "price": 1500,
///   "customer": {"first_name": "Ana", "last_name": "Kos", "email": "ana@example.com"}
/// }
/// ```
///
/// # Responses
///
/// - `200` with the created command under `data`
/// - `400` when the body is not a valid order request
/// - `422` when the command could not be encoded or published
#[instrument(skip(state, body), fields(body_len = body.len()))]
pub async fn create_order(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<CreateOrderResponse>> {
    let command = state.orders.handle(&body).await?;
    Ok(Json(CreateOrderResponse::accepted(command)))
}
