//! Global search endpoint backing the command palette.

use axum::{
    Router,
    extract::{Query, State},
    response::Response,
    routing::get,
};
use merch_crm_core::HIDDEN_CONTACT;
use serde::Deserialize;
use tracing::instrument;

use crate::db::search::{self, SearchResults};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::routes::ActionResult;
use crate::state::AppState;

/// Build the search router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/search", get(global_search))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Clients, orders and items matching `q`.
///
/// GET /api/search?q=
#[instrument(skip(user, state))]
pub async fn global_search(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let outcome = search::global_search(state.pool(), &query.q)
        .await
        .map(|mut results: SearchResults| {
            if user.hides_client_contacts() {
                for client in &mut results.clients {
                    HIDDEN_CONTACT.clone_into(&mut client.phone);
                }
            }
            results
        })
        .map_err(AppError::from);
    ActionResult::respond(outcome)
}
